use std::sync::Arc;
use std::time::Duration;

use avatarforge_comfyui::ComfyUiBridge;
use avatarforge_core::job::JobStatusSource;

use crate::config::ServerConfig;
use crate::publisher::PublisherConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Supervisor for the shared engine WebSocket connection.
    pub bridge: Arc<ComfyUiBridge>,
    /// Polling source for persisted job status (fallback data path).
    pub status: Arc<dyn JobStatusSource>,
}

impl AppState {
    /// Publisher settings derived from server configuration.
    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            poll_interval: Duration::from_secs(self.config.poll_interval_secs),
            max_poll_failures: self.config.max_poll_failures,
            total_steps_hint: None,
        }
    }
}
