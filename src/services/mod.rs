pub mod clock;
pub use clock::{Clock, ManualClock, SystemClock};

pub mod credentials;
pub use credentials::{CredentialError, CredentialStore};

pub mod kv;
pub use kv::{DatabaseKeyValueStore, KeyValueStore, KvError, MemoryKeyValueStore};

pub mod session;
pub use session::{SessionError, SessionManager};

pub mod policy;
pub use policy::{Actor, AuthorizationPolicy};

pub mod identity;
pub use identity::IdentityResolver;

pub mod tokens;
pub use tokens::{TokenError, TokenService};

pub mod mailer;
pub use mailer::{LogMailer, MailError, Mailer, WebhookMailer};

pub mod uploads;
pub use uploads::UploadStore;

pub mod event_service;
pub mod event_service_impl;
pub use event_service::{
    EventError, EventInput, EventPage, EventService, EventView, UploadedImage,
};
pub use event_service_impl::SeaOrmEventService;

pub mod auth_service;
pub mod auth_service_impl;
pub use auth_service::{AuthError, AuthService, LoginResult, ProfileRequest, RegisterRequest};
pub use auth_service_impl::SeaOrmAuthService;

pub mod scheduler;
pub use scheduler::Scheduler;
