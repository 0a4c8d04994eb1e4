use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::services::auth::SessionStore;
use crate::services::Recommender;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Loaded once at startup and never mutated
    pub recommender: Arc<Recommender>,
    pub sessions: SessionStore,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: SqlitePool, recommender: Recommender, config: Config) -> Self {
        Self {
            db,
            recommender: Arc::new(recommender),
            sessions: SessionStore::new(config.session_ttl()),
            config: Arc::new(config),
        }
    }
}
