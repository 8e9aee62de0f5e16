//! HTTP route handlers for the API.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use router::driver::{RunOptions, RunReport, UnknownWorkerError, run_router};
use router::io::transcript::{TranscriptRequest, generate_run_id, write_transcript};

use crate::state::{AppState, RunEvent};

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/workers", get(list_workers))
        .route("/ask", post(ask))
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct WorkersResponse {
    workers: Vec<String>,
    max_steps: u32,
}

/// GET /api/workers - registered worker names in routing order.
async fn list_workers(State(state): State<AppState>) -> Json<WorkersResponse> {
    Json(WorkersResponse {
        workers: state.registry.names().to_vec(),
        max_steps: state.config.max_steps,
    })
}

#[derive(Debug, Deserialize)]
struct AskBody {
    request: String,
    max_steps: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

/// POST /api/ask - run the router for one request.
///
/// The loop is synchronous and calls out to agent processes, so it runs on
/// the blocking pool. Progress is broadcast to `/events` as it happens.
async fn ask(
    State(state): State<AppState>,
    Json(body): Json<AskBody>,
) -> Result<Json<RunReport>, ApiError> {
    if body.request.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "request must be non-empty"));
    }

    let mut options = RunOptions::from_config(&state.config);
    if let Some(max_steps) = body.max_steps {
        options.max_steps = max_steps;
    }

    let report = tokio::task::spawn_blocking(move || run_blocking(&state, &body.request, &options))
        .await
        .map_err(|err| {
            error!(error = %err, "router task panicked");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "router task failed")
        })?;

    match report {
        Ok(report) => Ok(Json(report)),
        Err(err) => {
            let message = format!("{err:#}");
            if err.downcast_ref::<UnknownWorkerError>().is_some() {
                error!(%message, "supervisor contract violation");
            } else {
                warn!(%message, "run failed");
            }
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, message))
        }
    }
}

fn run_blocking(
    state: &AppState,
    request: &str,
    options: &RunOptions,
) -> anyhow::Result<RunReport> {
    let started_at = Utc::now();
    let run_id = generate_run_id(started_at);
    info!(%run_id, "run started");

    let tx = state.event_tx.clone();
    let outcome = run_router(
        request,
        &state.registry,
        state.supervisor.as_ref(),
        options,
        |event| {
            // No subscribers is fine.
            let _ = tx.send(RunEvent {
                run_id: run_id.clone(),
                event: event.clone(),
            });
        },
    )?;

    if state.record {
        write_transcript(&TranscriptRequest {
            runs_dir: &state.runs_dir(),
            run_id: &run_id,
            outcome: &outcome,
            started_at,
            ended_at: Utc::now(),
        })?;
    }

    info!(%run_id, steps = outcome.steps(), stop = %outcome.stop, "run finished");
    Ok(outcome.report(run_id))
}
