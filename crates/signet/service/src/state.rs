//! Shared handler state.

use signet_lifecycle::LifecycleController;
use std::sync::Arc;

/// State injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<LifecycleController>,
}

impl AppState {
    pub fn new(controller: Arc<LifecycleController>) -> Self {
        Self { controller }
    }
}
