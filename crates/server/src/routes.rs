use std::path::PathBuf;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use vidpress_transcoder::CompressionRequest;
use vidpress_transcoder::gpu::EncoderCapabilities;
use vidpress_transcoder::supervisor::JobSnapshot;

use crate::error::AppError;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_router() -> Router<AppState> {
    Router::new()
        .route("/compress", post(compress))
        .route("/cancel", post(cancel))
        .route("/jobs", get(list_jobs))
        .route("/capabilities", get(capabilities))
        .route("/events", get(sse_events))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct CompressAccepted {
    source: PathBuf,
    output_path: PathBuf,
}

async fn compress(
    State(state): State<AppState>,
    Json(request): Json<CompressionRequest>,
) -> Result<(StatusCode, Json<CompressAccepted>), AppError> {
    let source = request.file_path.clone();
    let output_path = state.transcoder.launch(request).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(CompressAccepted {
            source,
            output_path,
        }),
    ))
}

#[derive(Deserialize)]
struct CancelRequest {
    #[serde(rename = "filePath", alias = "file_path")]
    file_path: PathBuf,
}

async fn cancel(
    State(state): State<AppState>,
    Json(body): Json<CancelRequest>,
) -> Result<StatusCode, AppError> {
    state.transcoder.cancel(&body.file_path).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobSnapshot>> {
    Json(state.transcoder.list_jobs().await)
}

async fn capabilities(State(state): State<AppState>) -> Json<EncoderCapabilities> {
    Json(state.transcoder.capabilities().await)
}

// ---------------------------------------------------------------------------
// SSE events
// ---------------------------------------------------------------------------

async fn sse_events(
    State(state): State<AppState>,
) -> axum::response::Sse<
    impl futures::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>,
> {
    use axum::response::sse::Event;
    use std::time::Duration;

    let mut rx = state.events.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(evt) => {
                    if let Ok(data) = serde_json::to_string(&evt) {
                        yield Ok(Event::default().event(evt.event_type()).data(data));
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    yield Ok(Event::default()
                        .event("lagged")
                        .data(format!(r#"{{"lagged":{n}}}"#)));
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    axum::response::Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
