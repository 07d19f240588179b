mod admin;
mod sweep;

pub use admin::cmd_grant_admin;
pub use sweep::cmd_sweep;
