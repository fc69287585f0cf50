//! Shared-connection supervisor for the engine event socket.
//!
//! [`ComfyUiBridge`] owns the one persistent WebSocket connection per
//! process (connect -> process -> reconnect loop), lazily started when
//! the first consumer subscribes and explicitly stoppable at shutdown.
//! All inbound frames flow through the bridge's [`ProgressHub`], which
//! is the only place mutable per-job state lives.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use avatarforge_core::types::ProgressSample;

use crate::client::ComfyUiClient;
use crate::hub::{JobSubscription, ProgressHub};
use crate::processor::process_messages;
use crate::reconnect::{reconnect_loop, ReconnectConfig};

/// Supervises the process-wide engine connection and exposes
/// per-job progress subscriptions.
///
/// Created once at application startup; the returned `Arc` is cheap to
/// clone into request handlers.
pub struct ComfyUiBridge {
    hub: Arc<ProgressHub>,
    /// `None` when no WebSocket URL is configured -- the push path is
    /// then permanently unavailable and consumers rely on polling.
    client: Option<Arc<ComfyUiClient>>,
    /// Handle of the running connection task, if any.
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl ComfyUiBridge {
    /// Create a bridge. `ws_url` is the engine's WebSocket base URL;
    /// pass `None` to disable the push path entirely.
    pub fn new(ws_url: Option<String>) -> Arc<Self> {
        let client = match ws_url {
            Some(url) if !url.is_empty() => Some(Arc::new(ComfyUiClient::new(url))),
            _ => {
                tracing::warn!("No engine WebSocket URL configured; push path disabled");
                None
            }
        };

        Arc::new(Self {
            hub: Arc::new(ProgressHub::new()),
            client,
            task: Mutex::new(None),
            cancel: CancellationToken::new(),
        })
    }

    /// The hub holding subscriber lists and reconciliation state.
    pub fn hub(&self) -> &Arc<ProgressHub> {
        &self.hub
    }

    /// Subscribe to a job's reconciled progress stream.
    ///
    /// Ensures the shared connection exists first -- no connection is
    /// held while nobody is listening.
    pub fn subscribe(
        &self,
        prompt_id: &str,
    ) -> (JobSubscription, mpsc::UnboundedReceiver<ProgressSample>) {
        self.ensure_connected();
        self.hub.subscribe(prompt_id)
    }

    /// Idempotently start the shared connection task.
    ///
    /// A no-op when the push path is disabled, when the bridge has been
    /// shut down, or when the task is already running. Connection
    /// failures are not surfaced here; the task keeps retrying with
    /// backoff and consumers fall back to status polling meanwhile.
    pub fn ensure_connected(&self) {
        let Some(client) = &self.client else {
            tracing::debug!("Push path disabled, skipping engine connection");
            return;
        };
        if self.cancel.is_cancelled() {
            return;
        }

        let mut task = self.lock_task();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let client = Arc::clone(client);
        let hub = Arc::clone(&self.hub);
        let cancel = self.cancel.clone();
        *task = Some(tokio::spawn(async move {
            tracing::info!(url = client.ws_url(), "Starting engine connection task");
            run_connection_loop(&client, &hub, &cancel).await;
            tracing::info!("Engine connection task exited");
        }));
    }

    /// Whether the shared connection task is currently alive.
    pub fn is_connected(&self) -> bool {
        self.lock_task().as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Tear down the shared connection and reset all per-job
    /// reconciliation state, for every job, unconditionally.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down engine bridge");
        self.cancel.cancel();

        let handle = self.lock_task().take();
        if let Some(handle) = handle {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }

        self.hub.clear_reconciliation();
        tracing::info!("Engine bridge shut down");
    }

    fn lock_task(&self) -> std::sync::MutexGuard<'_, Option<tokio::task::JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Core connection loop: connect -> process messages -> reconnect.
///
/// Runs until the cancellation token is triggered.
async fn run_connection_loop(
    client: &ComfyUiClient,
    hub: &Arc<ProgressHub>,
    cancel: &CancellationToken,
) {
    let reconnect_config = ReconnectConfig::default();

    loop {
        // Attempt to connect (or reconnect).
        let conn = match client.connect().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "Connection failed, entering reconnect loop");
                match reconnect_loop(client, &reconnect_config, cancel).await {
                    Some(conn) => conn,
                    None => return, // cancelled
                }
            }
        };

        // Process messages until the connection drops.
        let mut ws_stream = conn.ws_stream;
        process_messages(&mut ws_stream, hub, cancel).await;

        if cancel.is_cancelled() {
            return;
        }

        // A dropped connection invalidates whatever the engine told us
        // so far; the next connection re-derives progress from scratch.
        hub.clear_reconciliation();

        tracing::info!("Connection lost, entering reconnect loop");
        if reconnect_loop(client, &reconnect_config, cancel).await.is_none() {
            return; // cancelled
        }
    }
}
