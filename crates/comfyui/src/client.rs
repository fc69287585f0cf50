//! WebSocket client for the engine's event socket.
//!
//! [`ComfyUiClient`] holds the connection configuration for the
//! engine's event stream. Call [`ComfyUiClient::connect`] to establish
//! a live [`ComfyUiConnection`] over WebSocket.

use tokio_tungstenite::{connect_async, MaybeTlsStream};

/// Configuration handle for the engine's WebSocket endpoint.
pub struct ComfyUiClient {
    ws_url: String,
}

/// A live WebSocket connection to the engine.
pub struct ComfyUiConnection {
    /// The raw WebSocket stream for reading frames.
    pub ws_stream: tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl ComfyUiClient {
    /// Create a new client.
    ///
    /// * `ws_url` - WebSocket base URL, e.g. `ws://host:8188`.
    pub fn new(ws_url: String) -> Self {
        Self { ws_url }
    }

    /// WebSocket base URL (e.g. `ws://host:8188`).
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Connect to the engine's WebSocket endpoint.
    ///
    /// Generates a unique `client_id` (UUID v4) and appends it as a
    /// query parameter so the engine can address messages back to this
    /// specific client.
    pub async fn connect(&self) -> Result<ComfyUiConnection, ComfyUiClientError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let url = format!("{}/ws?clientId={}", self.ws_url, client_id);

        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            ComfyUiClientError::Connection(format!(
                "Failed to connect to engine at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(
            client_id = %client_id,
            "Connected to engine event socket at {}",
            self.ws_url,
        );

        Ok(ComfyUiConnection { ws_stream })
    }
}

/// Errors that can occur when working with the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUiClientError {
    /// Failed to establish the initial WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),
}
