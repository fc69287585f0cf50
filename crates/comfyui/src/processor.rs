//! WebSocket message processing loop.
//!
//! Reads raw frames from the engine connection, parses them into typed
//! [`ComfyUiMessage`] variants, and feeds the progress shapes into the
//! [`ProgressHub`] for reconciliation and fan-out. One bad frame never
//! terminates the loop.

use avatarforge_core::types::ProgressSample;
use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::hub::ProgressHub;
use crate::messages::{parse_message, ComfyUiMessage};

/// Process WebSocket messages from an engine connection.
///
/// Loops until the WebSocket closes, a fatal receive error occurs, or
/// `cancel` is triggered. Each text frame is parsed via
/// [`parse_message`] and dispatched into the hub.
///
/// Binary frames (preview images) are intentionally ignored.
pub async fn process_messages(
    ws_stream: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    hub: &ProgressHub,
    cancel: &CancellationToken,
) {
    loop {
        let msg_result = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Receive loop cancelled");
                return;
            }
            frame = ws_stream.next() => match frame {
                Some(result) => result,
                None => return,
            },
        };

        match msg_result {
            Ok(Message::Text(text)) => {
                handle_text_message(&text, hub);
            }
            Ok(Message::Binary(_)) => {
                // The engine sends binary frames for preview images.
                tracing::trace!("Ignoring binary message (preview image)");
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {
                // Handled automatically by tungstenite.
            }
            Ok(Message::Close(frame)) => {
                tracing::info!(?frame, "Engine WebSocket closed");
                return;
            }
            Ok(Message::Frame(_)) => {}
            Err(e) => {
                tracing::error!(error = %e, "WebSocket receive error");
                return;
            }
        }
    }
}

/// Classify a single text frame and apply the reconciliation policy.
fn handle_text_message(text: &str, hub: &ProgressHub) {
    match parse_message(text) {
        Ok(ComfyUiMessage::Progress(data)) => match data.prompt_id {
            Some(prompt_id) => {
                hub.record_step(&prompt_id, ProgressSample::new(data.value, data.max));
            }
            None => {
                tracing::trace!("Progress frame without prompt_id, cannot attribute to a job");
            }
        },
        Ok(ComfyUiMessage::StepProgress(data)) => {
            hub.record_step(&data.prompt_id, ProgressSample::new(data.value, data.max));
        }
        Ok(ComfyUiMessage::ProgressState(data)) => {
            hub.record_node_states(&data.prompt_id, &data.nodes);
        }
        Ok(ComfyUiMessage::Unknown) => {
            tracing::trace!("Ignoring unrecognized engine message type");
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                raw_message = %text,
                "Failed to parse engine message",
            );
        }
    }
}
