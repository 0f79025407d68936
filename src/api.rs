use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::rate::{RateSnapshot, RateTracker};
use crate::report;
use crate::types::{AggregateBucket, Granularity};

#[derive(Clone)]
pub struct ApiState {
    pub pool: sqlx::SqlitePool,
    pub rate: Arc<RateTracker>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/offers-data", post(offers_data))
        .route("/api/btc-rate", get(btc_rate))
        .route("/health", get(health))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct OffersDataRequest {
    /// Defaults to empty on absence so a missing field hits the same
    /// invalid-parameter path as an unknown value.
    #[serde(default, rename = "groupBy")]
    pub group_by: String,
}

#[derive(Serialize)]
pub struct OffersDataResponse {
    pub rows: Vec<AggregateBucket>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn offers_data(
    State(state): State<ApiState>,
    Json(req): Json<OffersDataRequest>,
) -> Result<Json<OffersDataResponse>, AppError> {
    // Validated against the closed set before the data source is touched.
    let granularity = Granularity::parse(&req.group_by)?;
    let rows = report::fetch_offer_stats(&state.pool, granularity).await?;
    Ok(Json(OffersDataResponse { rows }))
}

/// Latest aggregated BTC/PLN rate. 503 until the first successful refresh;
/// after that the last good snapshot is always served, even while providers
/// are down.
async fn btc_rate(State(state): State<ApiState>) -> Result<Json<RateSnapshot>, AppError> {
    state
        .rate
        .current()
        .map(Json)
        .ok_or(AppError::AllProvidersFailed)
}

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let rate = state.rate.current();
    Json(serde_json::json!({
        "status": "ok",
        "rate_available": rate.is_some(),
        "rate_as_of_epoch": rate.map(|r| r.as_of_epoch),
        "rate_error": state.rate.last_error(),
    }))
}
