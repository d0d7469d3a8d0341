use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use trapvalue_core::domain::game::{GameSnapshot, RevealOutcome, SnapshotFilters};
use trapvalue_core::error::Error;
use trapvalue_core::game;
use trapvalue_core::ingest::progress::{IngestionProgress, JobRegistry};
use trapvalue_core::ingest::seeder::{SeedRequest, Seeder};
use trapvalue_core::storage::{GameStore, StoreCounts};

/// Handles shared by every request. `game` and `seeder` are absent when the
/// database (or the market data source) could not be configured at startup.
#[derive(Clone)]
pub struct AppState {
    pub game: Option<Arc<dyn GameStore>>,
    pub seeder: Option<Arc<Seeder>>,
    pub jobs: JobRegistry,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/game/next", get(next_snapshot))
        .route("/game/reveal/:snapshot_id", post(reveal))
        .route("/admin/seed", post(seed))
        .route("/admin/seed/progress", get(latest_progress))
        .route("/admin/jobs/:job_id", get(job_progress))
        .route("/admin/status", get(status))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug)]
pub enum ApiError {
    Core(Error),
    Unavailable(&'static str),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::Core(err)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unavailable(what) => (StatusCode::SERVICE_UNAVAILABLE, what.to_string()),
            ApiError::Core(err) => {
                let status = match &err {
                    Error::NotFound(_) | Error::CompanyNotFound { .. } => StatusCode::NOT_FOUND,
                    Error::Validation(_) => StatusCode::BAD_REQUEST,
                    Error::Conflict(_) => StatusCode::CONFLICT,
                    Error::DataUnavailable(_) | Error::NoPriceHistory { .. } => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                    Error::TransientUpstream(_) => StatusCode::BAD_GATEWAY,
                    Error::Internal(inner) => {
                        sentry_anyhow::capture_anyhow(inner);
                        let detail = format!("{inner:#}");
                        tracing::error!(error = %detail, "request failed");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                let message = match status {
                    StatusCode::INTERNAL_SERVER_ERROR => "internal error".to_string(),
                    _ => err.to_string(),
                };
                (status, message)
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

fn game_store(state: &AppState) -> Result<&dyn GameStore, ApiError> {
    state
        .game
        .as_deref()
        .ok_or(ApiError::Unavailable("database unavailable"))
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Default, Deserialize)]
struct NextParams {
    difficulty: Option<String>,
    sector: Option<String>,
    exclude_ids: Option<String>,
}

async fn next_snapshot(
    State(state): State<AppState>,
    Query(params): Query<NextParams>,
) -> Result<Json<GameSnapshot>, ApiError> {
    let store = game_store(&state)?;
    let filters = SnapshotFilters::parse(
        params.difficulty.as_deref(),
        params.sector.as_deref(),
        params.exclude_ids.as_deref(),
    )?;
    Ok(Json(game::next_snapshot(store, &filters).await?))
}

#[derive(Debug, Default, Deserialize)]
struct RevealParams {
    player_choice: Option<String>,
}

async fn reveal(
    State(state): State<AppState>,
    Path(snapshot_id): Path<i64>,
    Query(params): Query<RevealParams>,
) -> Result<Json<RevealOutcome>, ApiError> {
    let store = game_store(&state)?;
    let choice = params.player_choice.unwrap_or_default();
    Ok(Json(game::reveal_outcome(store, snapshot_id, &choice).await?))
}

#[derive(Debug, Deserialize)]
struct SeedBody {
    tickers: Vec<String>,
    #[serde(default)]
    force_refresh: bool,
}

#[derive(Debug, Serialize)]
struct SeedAccepted {
    job_id: Uuid,
    message: String,
}

async fn seed(
    State(state): State<AppState>,
    Json(body): Json<SeedBody>,
) -> Result<(StatusCode, Json<SeedAccepted>), ApiError> {
    let seeder = state
        .seeder
        .clone()
        .ok_or(ApiError::Unavailable("seeding is not configured"))?;
    let request = SeedRequest::new(&body.tickers, body.force_refresh)?;
    let job_id = seeder.submit(&request)?;
    let total = request.tickers.len();
    tokio::spawn(async move {
        seeder.run(job_id, &request).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(SeedAccepted {
            job_id,
            message: format!("Seeding {total} tickers in background"),
        }),
    ))
}

async fn job_progress(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<IngestionProgress>, ApiError> {
    state
        .jobs
        .get(job_id)
        .map(Json)
        .ok_or_else(|| Error::NotFound(format!("job {job_id}")).into())
}

async fn latest_progress(
    State(state): State<AppState>,
) -> Result<Json<IngestionProgress>, ApiError> {
    state
        .jobs
        .latest()
        .map(Json)
        .ok_or_else(|| Error::NotFound("no seed job has run".to_string()).into())
}

async fn status(State(state): State<AppState>) -> Result<Json<StoreCounts>, ApiError> {
    let store = game_store(&state)?;
    let counts = store.counts().await.map_err(Error::from)?;
    Ok(Json(counts))
}
