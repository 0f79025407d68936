//! Database row types matching the aggregation query in `report.rs`.
//! Used by sqlx for typed queries.

/// Raw aggregation output, one row per bucket. Numeric fields come back
/// nullable from SQLite aggregates; `report::to_bucket` applies the explicit
/// zero defaults so absent values never leak downstream as NULL/NaN.
#[derive(Debug, sqlx::FromRow)]
pub struct BucketRow {
    pub date: String,
    pub success_percentage: Option<f64>,
    pub failed: i64,
    pub success: i64,
    pub profit: Option<i64>,
    pub volume: Option<f64>,
    pub volume_sats: Option<i64>,
    pub avg_reserved_seconds: Option<f64>,
    pub avg_total_seconds: Option<f64>,
}
