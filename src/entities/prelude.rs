pub use super::events::Entity as Events;
pub use super::kv_entries::Entity as KvEntries;
pub use super::password_history::Entity as PasswordHistory;
pub use super::password_resets::Entity as PasswordResets;
pub use super::roles::Entity as Roles;
pub use super::user_roles::Entity as UserRoles;
pub use super::users::Entity as Users;
pub use super::verification_tokens::Entity as VerificationTokens;
