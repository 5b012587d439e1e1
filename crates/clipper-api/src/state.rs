//! Application state.

use std::sync::Arc;

use clipper_media::{ClipOrchestrator, MediaResult};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub orchestrator: ClipOrchestrator,
}

impl AppState {
    /// Create new application state.
    pub fn new(config: ApiConfig) -> MediaResult<Self> {
        let orchestrator = ClipOrchestrator::new(config.clip.clone())?;
        Ok(Self {
            config: Arc::new(config),
            orchestrator,
        })
    }
}
