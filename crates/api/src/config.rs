/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`). Not applied to
    /// the SSE route, which holds connections open by design.
    pub request_timeout_secs: u64,
    /// Engine WebSocket base URL. Unset means the push path is
    /// unavailable and clients are served from status polling alone.
    pub comfyui_ws_url: Option<String>,
    /// Engine HTTP API base URL (default: `http://127.0.0.1:8188`).
    pub comfyui_api_url: String,
    /// Seconds of push-path silence before the progress publisher
    /// starts polling job status, and the polling period thereafter
    /// (default: `2`).
    pub poll_interval_secs: u64,
    /// Consecutive failed status polls tolerated before a stream is
    /// closed with an error (default: `5`).
    pub max_poll_failures: u32,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default                  |
    /// |-------------------------------|--------------------------|
    /// | `HOST`                        | `0.0.0.0`                |
    /// | `PORT`                        | `3000`                   |
    /// | `CORS_ORIGINS`                | `http://localhost:5173`  |
    /// | `REQUEST_TIMEOUT_SECS`        | `30`                     |
    /// | `COMFYUI_WS_URL`              | (unset)                  |
    /// | `COMFYUI_API_URL`             | `http://127.0.0.1:8188`  |
    /// | `PROGRESS_POLL_INTERVAL_SECS` | `2`                      |
    /// | `PROGRESS_MAX_POLL_FAILURES`  | `5`                      |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let comfyui_ws_url = std::env::var("COMFYUI_WS_URL").ok().filter(|s| !s.is_empty());

        let comfyui_api_url = std::env::var("COMFYUI_API_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8188".into());

        let poll_interval_secs: u64 = std::env::var("PROGRESS_POLL_INTERVAL_SECS")
            .unwrap_or_else(|_| "2".into())
            .parse()
            .expect("PROGRESS_POLL_INTERVAL_SECS must be a valid u64");

        let max_poll_failures: u32 = std::env::var("PROGRESS_MAX_POLL_FAILURES")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("PROGRESS_MAX_POLL_FAILURES must be a valid u32");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            comfyui_ws_url,
            comfyui_api_url,
            poll_interval_secs,
            max_poll_failures,
        }
    }
}
