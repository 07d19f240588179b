pub mod event;
pub mod kv;
pub mod role;
pub mod token;
pub mod user;
