//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the runtime config, the backend gateway, the session registry
//! (one `SessionContext` per browser) and the read-only catalog.

use std::sync::Arc;

use crate::backend::Backend;
use crate::config::AppConfig;
use crate::services::catalog::Catalog;
use crate::services::registry::SessionRegistry;
use crate::services::snapshot::SnapshotStore;

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; every field is Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub backend: Arc<dyn Backend>,
    pub sessions: Arc<SessionRegistry>,
    pub catalog: Arc<Catalog>,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, backend: Arc<dyn Backend>, store: Arc<dyn SnapshotStore>, catalog: Catalog) -> Self {
        let sessions = SessionRegistry::new(Arc::clone(&backend), store, config.session_idle_ttl());
        Self { config: Arc::new(config), backend, sessions: Arc::new(sessions), catalog: Arc::new(catalog) }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
