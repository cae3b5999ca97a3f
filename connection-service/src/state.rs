//! Application state for connection service.

use std::sync::Arc;

use broker::{build_session_store, SessionManager};
use common::config::AppConfig;
use common::errors::AppResult;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub manager: Arc<SessionManager>,
}

impl AppState {
    /// Creates the state: opens the configured session store and the broker.
    pub async fn new(config: AppConfig) -> AppResult<Self> {
        let store = build_session_store(&config.session_store).await?;
        let manager = Arc::new(SessionManager::new(&config, store));
        Ok(Self::with_manager(config, manager))
    }

    /// Creates the state around an existing manager.
    pub fn with_manager(config: AppConfig, manager: Arc<SessionManager>) -> Self {
        Self { config, manager }
    }
}
