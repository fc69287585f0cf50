//! Reconnection policy for the shared engine socket.
//!
//! A dropped connection is routine (engine restarts between jobs, GPU
//! box reboots), so [`reconnect_loop`] retries forever with growing
//! delays. Only the [`CancellationToken`] ends it; there is no attempt
//! cap, because consumers are served by the polling fallback while the
//! socket is down.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::client::{ComfyUiClient, ComfyUiConnection};

/// Backoff tunables. The defaults (1s start, doubling, 30s ceiling)
/// reach the ceiling after five failures.
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// The delay to use after one more failure, capped at `max_delay`.
pub fn next_delay(current: Duration, config: &ReconnectConfig) -> Duration {
    current.mul_f64(config.multiplier).min(config.max_delay)
}

/// Retry connecting until it succeeds or `cancel` fires.
///
/// Each attempt races against cancellation, and so does the sleep
/// between attempts, so shutdown never waits out a backoff window.
pub async fn reconnect_loop(
    client: &ComfyUiClient,
    config: &ReconnectConfig,
    cancel: &CancellationToken,
) -> Option<ComfyUiConnection> {
    let mut delay = config.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(url = client.ws_url(), "Abandoning reconnect, shutdown requested");
                return None;
            }
            result = client.connect() => match result {
                Ok(conn) => {
                    tracing::info!(url = client.ws_url(), attempt, "Engine socket restored");
                    return Some(conn);
                }
                Err(e) => {
                    tracing::warn!(
                        url = client.ws_url(),
                        attempt,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Engine still unreachable",
                    );
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }

        delay = next_delay(delay, config);
    }
}
