use serde::{Deserialize, Serialize};

use crate::error::AppError;

// ---------------------------------------------------------------------------
// Granularity
// ---------------------------------------------------------------------------

/// Time-bucket size for offer aggregation. The closed set is the whole
/// interface: callers pick a variant, never a query fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
}

impl Granularity {
    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            _ => Err(AppError::InvalidParameter(
                "Invalid groupBy parameter. Must be one of: daily, weekly, monthly".to_string(),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    /// SQLite expression producing the bucket start date for an offer.
    /// Weekly buckets start on the ISO Monday of the offer's week.
    pub fn bucket_expr(&self) -> &'static str {
        match self {
            Self::Daily => "date(created_at)",
            Self::Weekly => "date(created_at, 'weekday 0', '-6 days')",
            Self::Monthly => "date(created_at, 'start of month')",
        }
    }

    /// strftime format for the human-readable bucket label.
    pub fn label_format(&self) -> &'static str {
        match self {
            Self::Daily => "%Y-%m-%d",
            Self::Weekly => "%G-W%V",
            Self::Monthly => "%Y-%m",
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AggregateBucket
// ---------------------------------------------------------------------------

/// One aggregated time bucket. Buckets with no offers are absent from the
/// series, not zero-filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateBucket {
    /// Bucket label; format depends on granularity (see `label_format`).
    pub date: String,
    /// 0-100, rounded to 2 decimals. None when the bucket has no offers in
    /// the denominator set (failed + succeeded == 0).
    pub success_percentage: Option<f64>,
    pub failed: i64,
    pub success: i64,
    /// Fee spread over successful offers, in sats.
    pub profit: i64,
    /// Fiat volume over successful offers.
    pub volume: f64,
    pub volume_sats: i64,
    /// Mean seconds from creation to reservation over successful offers.
    pub avg_reserved_seconds: Option<f64>,
    /// Mean seconds from creation to full payment over successful offers.
    pub avg_total_seconds: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_the_closed_set() {
        assert_eq!(Granularity::parse("daily").unwrap(), Granularity::Daily);
        assert_eq!(Granularity::parse("weekly").unwrap(), Granularity::Weekly);
        assert_eq!(Granularity::parse("monthly").unwrap(), Granularity::Monthly);
    }

    #[test]
    fn parse_rejects_everything_else() {
        for bad in ["", "DAILY", "yearly", "daily ", "daily; DROP TABLE offers"] {
            let err = Granularity::parse(bad).unwrap_err();
            match err {
                AppError::InvalidParameter(msg) => {
                    assert!(msg.contains("daily, weekly, monthly"), "msg={msg}");
                }
                other => panic!("expected InvalidParameter, got {other:?}"),
            }
        }
    }

    #[test]
    fn serde_roundtrip_uses_lowercase() {
        let g: Granularity = serde_json::from_str("\"weekly\"").unwrap();
        assert_eq!(g, Granularity::Weekly);
        assert_eq!(serde_json::to_string(&g).unwrap(), "\"weekly\"");
    }
}
