use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::engine::SourceCounts;
use crate::models::{ChartInput, ReconciledRecord};
use crate::periods::{PeriodError, PeriodState};
use crate::service::TrackerService;
use crate::store::{AggregateTotals, LeaderboardStore, OutstandingEntry, RankMetric};

const DEFAULT_TOP_LIMIT: usize = 10;
const MAX_TOP_LIMIT: usize = 500;

/// Shared application state
pub type AppState = Arc<TrackerService>;

/// Create the API router
pub fn create_router(service: Arc<TrackerService>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/participants/:id", get(get_participant))
        .route("/api/top", get(get_top))
        .route("/api/outstanding", get(get_outstanding))
        .route("/api/totals", get(get_totals))
        .route("/api/periods", get(list_periods))
        .route("/api/periods/:key", get(get_period_top))
        .route("/api/periods/:key/participants/:id", get(get_period_participant))
        .route("/api/periods/:key/totals", get(get_period_totals))
        .with_state(service)
}

// ===== Route Handlers =====

async fn health_check(State(service): State<AppState>) -> Json<HealthResponse> {
    let board = service.leaderboard();
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        leaderboard_loaded: board.is_some(),
        participants: board.as_ref().map(|b| b.len()).unwrap_or(0),
        computed_at: board.as_ref().map(|b| b.meta().computed_at),
        last_error: service.last_error(),
    })
}

async fn get_participant(
    State(service): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ParticipantResponse>, ApiError> {
    let board = current(&service)?;
    board
        .get_by_id(&id)
        .map(|r| Json(ParticipantResponse::from(r)))
        .ok_or_else(|| ApiError::participant_not_found(&id))
}

async fn get_top(
    State(service): State<AppState>,
    Query(params): Query<TopQuery>,
) -> Result<Json<TopResponse>, ApiError> {
    let board = current(&service)?;
    Ok(Json(top_response(&board, &params)?))
}

async fn get_outstanding(
    State(service): State<AppState>,
    Query(params): Query<OutstandingQuery>,
) -> Result<Json<OutstandingResponse>, ApiError> {
    let board = current(&service)?;
    let page_size = params
        .page_size
        .unwrap_or(service.config().page_size)
        .clamp(1, MAX_TOP_LIMIT);
    let page = params.page.unwrap_or(1).max(1);

    Ok(Json(OutstandingResponse {
        page,
        page_size,
        page_count: board.outstanding_page_count(page_size),
        total: board.outstanding_count(),
        entries: board.outstanding_page(page_size, page - 1),
    }))
}

async fn get_totals(State(service): State<AppState>) -> Result<Json<TotalsResponse>, ApiError> {
    let board = current(&service)?;
    Ok(Json(TotalsResponse {
        totals: board.get_aggregate_totals(),
        computed_at: board.meta().computed_at,
        sources: Some(board.meta().sources),
    }))
}

async fn list_periods(State(service): State<AppState>) -> Json<Vec<PeriodSummary>> {
    let periods = service.periods();
    Json(
        periods
            .keys()
            .into_iter()
            .map(|key| PeriodSummary {
                label: periods.label(&key).unwrap_or_else(|| key.clone()),
                state: periods.state(&key).unwrap_or(PeriodState::NotRequested),
                key,
            })
            .collect(),
    )
}

async fn get_period_top(
    State(service): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<TopQuery>,
) -> Result<Json<PeriodTopResponse>, ApiError> {
    let table = service.periods().get_period(&key).await?;
    Ok(Json(PeriodTopResponse {
        key: table.key.clone(),
        label: table.label.clone(),
        computed_at: table.computed_at(),
        top: top_response(&table.store, &params)?,
    }))
}

async fn get_period_participant(
    State(service): State<AppState>,
    Path((key, id)): Path<(String, String)>,
) -> Result<Json<ParticipantResponse>, ApiError> {
    let table = service.periods().get_period(&key).await?;
    table
        .store
        .get_by_id(&id)
        .map(|r| Json(ParticipantResponse::from(r)))
        .ok_or_else(|| ApiError::participant_not_found(&id))
}

async fn get_period_totals(
    State(service): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<TotalsResponse>, ApiError> {
    let table = service.periods().get_period(&key).await?;
    Ok(Json(TotalsResponse {
        totals: table.totals(),
        computed_at: table.computed_at(),
        sources: None,
    }))
}

fn current(service: &TrackerService) -> Result<Arc<LeaderboardStore>, ApiError> {
    service.leaderboard().ok_or(ApiError::NoData)
}

fn top_response(store: &LeaderboardStore, params: &TopQuery) -> Result<TopResponse, ApiError> {
    let by = match params.by.as_deref() {
        Some(raw) => raw.parse::<RankMetric>().map_err(ApiError::BadRequest)?,
        None => RankMetric::default(),
    };
    let limit = params.limit.unwrap_or(DEFAULT_TOP_LIMIT).min(MAX_TOP_LIMIT);
    let entries: Vec<ReconciledRecord> = store.get_top_n(limit, by).into_iter().cloned().collect();

    Ok(TopResponse {
        by,
        count: entries.len(),
        entries,
    })
}

// ===== Request/Response Types =====

#[derive(Deserialize)]
struct TopQuery {
    limit: Option<usize>,
    /// Metric name, e.g. `composite_score` or `deaths_change`
    by: Option<String>,
}

#[derive(Deserialize)]
struct OutstandingQuery {
    /// 1-based
    page: Option<usize>,
    page_size: Option<usize>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    leaderboard_loaded: bool,
    participants: usize,
    computed_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

#[derive(Serialize)]
struct ParticipantResponse {
    record: ReconciledRecord,
    kills_needed: i64,
    deaths_needed: i64,
    chart: ChartInput,
}

impl From<&ReconciledRecord> for ParticipantResponse {
    fn from(r: &ReconciledRecord) -> Self {
        Self {
            kills_needed: r.kills_needed(),
            deaths_needed: r.deaths_needed(),
            chart: r.chart_input(),
            record: r.clone(),
        }
    }
}

#[derive(Serialize)]
struct TopResponse {
    by: RankMetric,
    count: usize,
    entries: Vec<ReconciledRecord>,
}

#[derive(Serialize)]
struct OutstandingResponse {
    page: usize,
    page_size: usize,
    page_count: usize,
    total: usize,
    entries: Vec<OutstandingEntry>,
}

#[derive(Serialize)]
struct TotalsResponse {
    #[serde(flatten)]
    totals: AggregateTotals,
    computed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sources: Option<SourceCounts>,
}

#[derive(Serialize)]
struct PeriodSummary {
    key: String,
    label: String,
    state: PeriodState,
}

#[derive(Serialize)]
struct PeriodTopResponse {
    key: String,
    label: String,
    computed_at: DateTime<Utc>,
    #[serde(flatten)]
    top: TopResponse,
}

// ===== Error Handling =====

#[derive(Debug)]
enum ApiError {
    /// No leaderboard has been computed yet
    NoData,
    NotFound(String),
    BadRequest(String),
    Period(PeriodError),
}

impl ApiError {
    fn participant_not_found(id: &str) -> Self {
        ApiError::NotFound(format!("participant {} not found", id.trim()))
    }
}

impl From<PeriodError> for ApiError {
    fn from(err: PeriodError) -> Self {
        ApiError::Period(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self {
            ApiError::NoData => (
                StatusCode::SERVICE_UNAVAILABLE,
                "no_data",
                "no data available yet".to_string(),
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            ApiError::Period(err) => {
                let status = match err {
                    PeriodError::UnknownPeriod { .. } => StatusCode::NOT_FOUND,
                    PeriodError::Unavailable { .. } => StatusCode::CONFLICT,
                    PeriodError::Pending { .. } => StatusCode::ACCEPTED,
                    PeriodError::TimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
                    PeriodError::Load { .. } => {
                        tracing::error!("{}", err);
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                };
                (status, err.kind(), err.to_string())
            }
        };

        let body = Json(json!({
            "error": message,
            "kind": kind,
        }));

        (status, body).into_response()
    }
}
