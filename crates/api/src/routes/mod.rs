pub mod health;
pub mod jobs;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree (request/response routes only).
///
/// Route hierarchy:
///
/// ```text
/// /jobs/{prompt_id}/status       one-shot status snapshot
/// ```
///
/// The SSE progress stream is mounted separately via
/// [`jobs::stream_router`] so it can bypass the request timeout.
pub fn api_routes() -> Router<AppState> {
    Router::new().merge(jobs::router())
}
