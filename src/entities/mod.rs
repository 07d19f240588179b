pub mod prelude;

pub mod events;
pub mod kv_entries;
pub mod password_history;
pub mod password_resets;
pub mod roles;
pub mod user_roles;
pub mod users;
pub mod verification_tokens;
