//! REST API for timetable runs.
//!
//! Provides endpoints for:
//! - Demo scenario retrieval
//! - Run management (submit, query, cancel, fetch result)
//! - Server-sent progress events per run
//! - Ad-hoc schedule analysis
//! - Swagger UI at /q/swagger-ui

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::{wrappers::WatchStream, StreamExt};
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::constraints::{ConstraintEvaluator, Evaluator, Score};
use crate::demo_data::{self, DemoData};
use crate::domain::{Problem, ScenarioConfig, Schedule};
use crate::dto::{
    AnalyzeRequest, AnalyzeResponse, ErrorResponse, HealthResponse, InfoResponse, RunResultDto,
    SessionRow,
};
use crate::error::{ConfigurationError, DomainError, RunError};
use crate::explain::explain;
use crate::solver::{RunService, RunSnapshot};

/// Application state shared across handlers.
pub struct AppState {
    pub runs: Arc<RunService>,
    pub report_top_n: usize,
}

impl AppState {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            report_top_n: config.report_top_n,
            runs: Arc::new(RunService::new(config)),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(ServiceConfig::default())
    }
}

/// Creates the API router with CORS and Swagger UI enabled.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & Info
        .route("/health", get(health))
        .route("/info", get(info))
        // Demo data
        .route("/demo-data", get(list_demo_data))
        .route("/demo-data/{name}", get(get_demo_data))
        // Runs
        .route("/runs", get(list_runs).post(submit_run))
        .route("/runs/{id}", get(get_run).delete(cancel_run))
        .route("/runs/{id}/events", get(run_events))
        .route("/runs/{id}/result", get(get_run_result))
        // Analysis
        .route("/schedules/analyze", put(analyze_schedule))
        .merge(SwaggerUi::new("/q/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .with_state(state)
}

/// Error body plus status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { message: self.message })).into_response()
    }
}

impl From<RunError> for ApiError {
    fn from(e: RunError) -> Self {
        let status = match e {
            RunError::NotFound(_) => StatusCode::NOT_FOUND,
            RunError::NotCompleted { .. } => StatusCode::CONFLICT,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<ConfigurationError> for ApiError {
    fn from(e: ConfigurationError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: e.to_string(),
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: e.to_string(),
        }
    }
}

// ============================================================================
// Health & Info
// ============================================================================

/// GET /health - Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "UP" })
}

/// GET /info - Application info endpoint.
#[utoipa::path(
    get,
    path = "/info",
    responses((status = 200, description = "Application info", body = InfoResponse))
)]
async fn info() -> Json<InfoResponse> {
    Json(InfoResponse {
        name: "Timely NEP Timetable Engine",
        version: env!("CARGO_PKG_VERSION"),
        solver_engine: "Greedy construction + simulated annealing",
    })
}

// ============================================================================
// Demo Data
// ============================================================================

/// GET /demo-data - List available demo scenarios.
#[utoipa::path(
    get,
    path = "/demo-data",
    responses((status = 200, description = "List of demo scenario names", body = Vec<String>))
)]
async fn list_demo_data() -> Json<Vec<&'static str>> {
    Json(demo_data::list_demo_data())
}

/// GET /demo-data/{name} - Get a demo scenario.
#[utoipa::path(
    get,
    path = "/demo-data/{name}",
    params(("name" = String, Path, description = "Demo scenario name")),
    responses(
        (status = 200, description = "Demo scenario", body = ScenarioConfig),
        (status = 404, description = "Scenario not found")
    )
)]
async fn get_demo_data(Path(name): Path<String>) -> Result<Json<ScenarioConfig>, StatusCode> {
    match name.parse::<DemoData>() {
        Ok(demo) => Ok(Json(demo_data::generate(demo))),
        Err(()) => Err(StatusCode::NOT_FOUND),
    }
}

// ============================================================================
// Runs
// ============================================================================

/// POST /runs - Validate a scenario and queue a run for it.
#[utoipa::path(
    post,
    path = "/runs",
    request_body = ScenarioConfig,
    responses(
        (status = 202, description = "Run queued", body = RunSnapshot),
        (status = 400, description = "Invalid scenario", body = ErrorResponse)
    )
)]
async fn submit_run(
    State(state): State<Arc<AppState>>,
    Json(config): Json<ScenarioConfig>,
) -> Result<(StatusCode, Json<RunSnapshot>), ApiError> {
    let id = state.runs.submit(config)?;
    let snapshot = state.runs.status(id)?;
    Ok((StatusCode::ACCEPTED, Json(snapshot)))
}

/// GET /runs - List all run IDs, oldest first.
#[utoipa::path(
    get,
    path = "/runs",
    responses((status = 200, description = "List of run IDs", body = Vec<String>))
)]
async fn list_runs(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(
        state
            .runs
            .list_runs()
            .into_iter()
            .map(|r| r.id.to_string())
            .collect(),
    )
}

/// GET /runs/{id} - Current status and progress of a run.
#[utoipa::path(
    get,
    path = "/runs/{id}",
    params(("id" = String, Path, description = "Run ID")),
    responses(
        (status = 200, description = "Run status", body = RunSnapshot),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunSnapshot>, ApiError> {
    Ok(Json(state.runs.status(id)?))
}

/// DELETE /runs/{id} - Request cancellation of a run.
#[utoipa::path(
    delete,
    path = "/runs/{id}",
    params(("id" = String, Path, description = "Run ID")),
    responses(
        (status = 200, description = "Cancellation requested", body = RunSnapshot),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
async fn cancel_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunSnapshot>, ApiError> {
    Ok(Json(state.runs.cancel(id)?))
}

/// GET /runs/{id}/result - Timetable and report of a completed run.
#[utoipa::path(
    get,
    path = "/runs/{id}/result",
    params(("id" = String, Path, description = "Run ID")),
    responses(
        (status = 200, description = "Run result", body = RunResultDto),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 409, description = "Run not completed", body = ErrorResponse)
    )
)]
async fn get_run_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunResultDto>, ApiError> {
    let result = state.runs.fetch_result(id)?;
    Ok(Json(RunResultDto::from_result(&result)))
}

/// GET /runs/{id}/events - Stream run snapshots as server-sent events.
///
/// Emits the current snapshot, then one event per change, and closes once
/// the run is terminal.
async fn run_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let rx = state.runs.subscribe(id)?;

    let stream = async_stream::stream! {
        let mut updates = WatchStream::new(rx);
        while let Some(snapshot) = updates.next().await {
            let json = serde_json::to_string(&snapshot).unwrap_or_else(|_| "{}".to_string());
            yield Ok::<_, Infallible>(format!("event: progress\ndata: {}\n\n", json));
            if snapshot.status.is_terminal() {
                break;
            }
        }
    };

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

// ============================================================================
// Score Analysis
// ============================================================================

/// PUT /schedules/analyze - Score and explain a supplied schedule.
#[utoipa::path(
    put,
    path = "/schedules/analyze",
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "Score and report", body = AnalyzeResponse),
        (status = 400, description = "Invalid scenario or assignment", body = ErrorResponse)
    )
)]
async fn analyze_schedule(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let problem = Problem::from_config(&request.scenario)?;
    let schedule = Schedule::from_assignments(&problem, &request.assignments)?;
    let (violations, soft) = ConstraintEvaluator.score(&problem, &schedule);
    let score = Score::new(&violations, &soft);

    Ok(Json(AnalyzeResponse {
        score,
        score_text: score.to_string(),
        rows: SessionRow::from_schedule(&problem, &schedule),
        report: explain(&problem, &schedule, &violations, &soft, state.report_top_n),
    }))
}

// ============================================================================
// OpenAPI Documentation
// ============================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        info,
        list_demo_data,
        get_demo_data,
        submit_run,
        list_runs,
        get_run,
        cancel_run,
        get_run_result,
        analyze_schedule,
    ),
    components(schemas(
        HealthResponse,
        InfoResponse,
        ErrorResponse,
        ScenarioConfig,
        RunSnapshot,
        RunResultDto,
        SessionRow,
        AnalyzeRequest,
        AnalyzeResponse,
    ))
)]
struct ApiDoc;
