//! Shared application state

use chatdesk_shared::{db, MemorySessionStore, SessionStore};
use std::sync::Arc;

use crate::auth::JwtManager;
use crate::config::{Config, ConfigError, StoreBackend};
use crate::service::ChatService;
use crate::store::PgSessionStore;
use crate::websocket::WebSocketState;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub jwt: JwtManager,
    pub ws_state: WebSocketState,
    /// Session Store with realtime fan-out
    pub chat: Arc<ChatService>,
    /// Set when running on PostgreSQL; serves attachment bodies
    pub pg_store: Option<Arc<PgSessionStore>>,
}

impl AppState {
    /// Build state around an already constructed backend
    pub fn with_store(
        config: Config,
        store: Arc<dyn SessionStore>,
        pg_store: Option<Arc<PgSessionStore>>,
    ) -> Self {
        let ws_state = WebSocketState::new();
        let jwt = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);
        let chat = Arc::new(ChatService::new(store, ws_state.clone()));
        Self {
            config: Arc::new(config),
            jwt,
            ws_state,
            chat,
            pg_store,
        }
    }

    /// In-memory backend, as used by tests and `STORE_BACKEND=memory`
    pub fn in_memory(config: Config) -> Self {
        let store = Arc::new(MemorySessionStore::with_reopen(
            config.reopen_on_customer_message,
        ));
        Self::with_store(config, store, None)
    }

    /// Connect the configured backend. PostgreSQL runs pending migrations first.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        match config.store_backend {
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory session store; data is lost on restart");
                Ok(Self::in_memory(config))
            }
            StoreBackend::Postgres => {
                let url = config
                    .database_url
                    .clone()
                    .ok_or(ConfigError::Missing("DATABASE_URL"))?;
                let settings = db::PoolSettings::with_max_connections(config.database_max_connections);
                let pool = db::connect(&url, &settings).await?;
                db::migrate(&pool).await?;
                tracing::info!("Database migrations applied");

                let pg = Arc::new(PgSessionStore::new(pool, config.reopen_on_customer_message));
                let store: Arc<dyn SessionStore> = pg.clone();
                Ok(Self::with_store(config, store, Some(pg)))
            }
        }
    }
}
