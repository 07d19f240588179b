use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::db::Store;
use crate::services::kv::build_key_value_store;
use crate::services::mailer::build_mailer;
use crate::services::{
    AuthService, AuthorizationPolicy, Clock, CredentialStore, EventService, IdentityResolver,
    KeyValueStore, Mailer, Scheduler, SeaOrmAuthService, SeaOrmEventService, SessionManager,
    SystemClock, TokenService, UploadStore,
};

/// Every long-lived dependency, built once and handed to each component
/// explicitly.
#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    pub clock: Arc<dyn Clock>,

    pub kv: Arc<dyn KeyValueStore>,

    pub sessions: Arc<SessionManager>,

    pub policy: AuthorizationPolicy,

    pub identity: Arc<IdentityResolver>,

    pub tokens: Arc<TokenService>,

    pub uploads: UploadStore,

    pub mailer: Arc<dyn Mailer>,

    pub event_service: Arc<dyn EventService>,

    pub auth_service: Arc<dyn AuthService>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let mailer = build_mailer(&config.mail);
        Self::build(config, Arc::new(SystemClock), mailer).await
    }

    /// Full control over the time source and mail transport.
    pub async fn build(
        config: Config,
        clock: Arc<dyn Clock>,
        mailer: Arc<dyn Mailer>,
    ) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;
        store.seed_roles().await?;

        let kv = build_key_value_store(config.session.backend, &store, clock.clone());
        let sessions = Arc::new(SessionManager::new(
            kv.clone(),
            Duration::from_secs(config.session.ttl_seconds),
        ));

        let policy = AuthorizationPolicy::new(store.clone());
        let identity = Arc::new(IdentityResolver::new(
            sessions.clone(),
            store.clone(),
            policy.clone(),
        ));

        let credentials = CredentialStore::new(config.security.clone());
        let tokens = Arc::new(TokenService::new(
            store.clone(),
            clock.clone(),
            config.tokens.clone(),
        ));
        let uploads = UploadStore::new(&config.uploads);

        let event_service = Arc::new(SeaOrmEventService::new(
            store.clone(),
            policy.clone(),
            uploads.clone(),
            clock.clone(),
            config.events.clone(),
        )) as Arc<dyn EventService + Send + Sync + 'static>;

        let auth_service = Arc::new(SeaOrmAuthService::new(
            store.clone(),
            credentials,
            sessions.clone(),
            tokens.clone(),
            mailer.clone(),
            config.security.clone(),
        )) as Arc<dyn AuthService + Send + Sync + 'static>;

        Ok(Self {
            config: Arc::new(config),
            store,
            clock,
            kv,
            sessions,
            policy,
            identity,
            tokens,
            uploads,
            mailer,
            event_service,
            auth_service,
        })
    }

    /// A sweep task sharing only the store, clock and session store.
    #[must_use]
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(
            self.store.clone(),
            self.clock.clone(),
            self.kv.clone(),
            self.config.scheduler.clone(),
        )
    }
}
