use std::path::PathBuf;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::dashboard::{resolve_range, DashboardView};
use crate::error::{DashboardError, DashboardResult, SchemaError};
use crate::insights::{self, InsightRecord};
use crate::metrics::{filter_range, MetricsDeriver};
use crate::models::{
    ApiResponse, DerivedMetricsRow, FunnelSummary, PullInfo, RawEventRow, SummaryMetrics,
};
use crate::store::MetricsStore;

/// Every request opens the store itself; nothing but the path is shared.
#[derive(Clone)]
pub struct AppState {
    pub db_path: PathBuf,
}

impl AppState {
    fn store(&self) -> DashboardResult<MetricsStore> {
        MetricsStore::open(&self.db_path)
    }
}

/// Optional `YYYY-MM-DD` bounds of the date range selector.
#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/pulls/insights", post(ingest_insights))
        .route("/pulls/rows", post(ingest_rows))
        .route("/pulls/latest", get(latest_pull))
        .route("/rows", get(list_rows))
        .route("/metrics/derived", get(get_derived))
        .route("/metrics/funnel", get(get_funnel))
        .route("/metrics/summary", get(get_summary))
        .route("/dashboard", get(get_dashboard))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        let status = match &self {
            DashboardError::Schema(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DashboardError::EmptyPull | DashboardError::DuplicateDay(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            warn!(error = %self, "Request rejected");
        }

        let body = ApiResponse {
            status: "error".to_string(),
            message: self.to_string(),
            data: None,
        };
        (status, Json(body)).into_response()
    }
}

async fn root() -> &'static str {
    "Ads Metrics API v0.1.0"
}

async fn health_check() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Replace the dataset with a batch of insight records as exported by the ads platform.
async fn ingest_insights(
    State(state): State<AppState>,
    Json(records): Json<Vec<Value>>,
) -> DashboardResult<Json<ApiResponse>> {
    let records = records
        .iter()
        .map(InsightRecord::from_record)
        .collect::<Result<Vec<_>, SchemaError>>()?;
    let rows = insights::flatten(&records)?;
    let pull = state.store()?.replace_pull(&rows)?;

    Ok(Json(pull_response(&pull)))
}

/// Replace the dataset with tabular records keyed by column key or label.
async fn ingest_rows(
    State(state): State<AppState>,
    Json(records): Json<Vec<Value>>,
) -> DashboardResult<Json<ApiResponse>> {
    let rows = records
        .iter()
        .map(RawEventRow::from_record)
        .collect::<Result<Vec<_>, SchemaError>>()?;
    let pull = state.store()?.replace_pull(&rows)?;

    Ok(Json(pull_response(&pull)))
}

fn pull_response(pull: &PullInfo) -> ApiResponse {
    info!(pull_id = %pull.id, rows = pull.row_count, "Pull accepted");

    ApiResponse {
        status: "success".to_string(),
        message: format!("Stored {} daily rows", pull.row_count),
        data: Some(serde_json::json!({ "pull": pull })),
    }
}

async fn latest_pull(State(state): State<AppState>) -> DashboardResult<Response> {
    let response = match state.store()?.last_pull()? {
        Some(pull) => Json(pull).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse {
                status: "error".to_string(),
                message: "No pull stored yet".to_string(),
                data: None,
            }),
        )
            .into_response(),
    };
    Ok(response)
}

async fn list_rows(State(state): State<AppState>) -> DashboardResult<Json<Vec<RawEventRow>>> {
    Ok(Json(state.store()?.load_rows()?))
}

async fn get_derived(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> DashboardResult<Json<Vec<DerivedMetricsRow>>> {
    let rows = state.store()?.load_rows()?;
    let derived = MetricsDeriver::new(&rows).derive();

    let in_range: Vec<DerivedMetricsRow> = match resolve_range(&rows, query.start, query.end) {
        Some(range) => filter_range(&derived, &range).into_iter().cloned().collect(),
        None => Vec::new(),
    };
    Ok(Json(in_range))
}

async fn get_funnel(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> DashboardResult<Json<FunnelSummary>> {
    let rows = state.store()?.load_rows()?;

    let funnel = resolve_range(&rows, query.start, query.end)
        .map(|range| MetricsDeriver::new(&rows).aggregate(&range))
        .unwrap_or_else(FunnelSummary::zero);
    Ok(Json(funnel))
}

async fn get_summary(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> DashboardResult<Json<SummaryMetrics>> {
    let rows = state.store()?.load_rows()?;

    let summary = resolve_range(&rows, query.start, query.end)
        .map(|range| MetricsDeriver::new(&rows).summary_metrics(&range))
        .unwrap_or_default();
    Ok(Json(summary))
}

async fn get_dashboard(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> DashboardResult<Json<DashboardView>> {
    let store = state.store()?;
    let rows = store.load_rows()?;
    let last_pull = store.last_pull()?;

    Ok(Json(DashboardView::build(
        &rows,
        query.start,
        query.end,
        last_pull.as_ref(),
    )))
}
