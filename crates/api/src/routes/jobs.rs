//! Job progress and status endpoints.
//!
//! The progress endpoint is the HTTP face of the stream publisher: one
//! SSE connection per client, each event a single JSON object. The
//! status endpoint exposes the same polling collaborator the publisher
//! falls back to, for callers that just want a one-shot answer.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::Stream;
use serde::Deserialize;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

use avatarforge_core::job::JobStatusSnapshot;

use crate::error::{AppError, AppResult};
use crate::publisher::{spawn_publisher, PublisherConfig};
use crate::state::AppState;

/// Query parameters for the progress stream.
#[derive(Deserialize)]
pub struct ProgressParams {
    /// Optional total-step hint, used for samples that carry no usable
    /// total of their own.
    pub steps: Option<i32>,
}

/// GET /jobs/{prompt_id}/progress -- SSE progress stream for one job.
///
/// Emits `connected` immediately, then `progress` events as reconciled
/// samples arrive, and always ends with exactly one `complete` or
/// `error` event. Client disconnects tear down the underlying
/// subscription promptly. A non-positive `steps` hint is rejected up
/// front with a 400 rather than silently producing nonsense totals.
async fn job_progress(
    State(state): State<AppState>,
    Path(prompt_id): Path<String>,
    Query(params): Query<ProgressParams>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    if let Some(steps) = params.steps {
        if steps <= 0 {
            return Err(AppError::BadRequest(format!(
                "steps must be a positive integer, got {steps}"
            )));
        }
    }

    tracing::debug!(prompt_id = %prompt_id, "New progress stream client");

    let config = PublisherConfig {
        total_steps_hint: params.steps,
        ..state.publisher_config()
    };
    let rx = spawn_publisher(
        state.bridge.clone(),
        state.status.clone(),
        prompt_id,
        config,
    );

    let stream = UnboundedReceiverStream::new(rx).filter_map(|event| {
        match serde_json::to_string(&event) {
            Ok(json) => Some(Ok(Event::default().data(json))),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize progress event");
                None
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

/// GET /jobs/{prompt_id}/status -- one-shot persisted status snapshot.
async fn job_status(
    State(state): State<AppState>,
    Path(prompt_id): Path<String>,
) -> AppResult<Json<JobStatusSnapshot>> {
    let snapshot = state.status.job_status(&prompt_id).await?;
    Ok(Json(snapshot))
}

/// Mount the request/response job routes under `/api/v1`.
pub fn router() -> Router<AppState> {
    Router::new().route("/jobs/{prompt_id}/status", get(job_status))
}

/// Mount the SSE progress stream at its full path.
///
/// Kept separate from [`router`] so the app router can exempt it from
/// the global request timeout -- progress streams stay open for the
/// lifetime of a job.
pub fn stream_router() -> Router<AppState> {
    Router::new().route("/api/v1/jobs/{prompt_id}/progress", get(job_progress))
}
