use crate::error::{AppError, Result};

/// Exchange-rate provider endpoints. Each returns a different JSON shape;
/// the per-provider extractors live in `rate::default_providers`.
pub const COINGECKO_URL: &str =
    "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin&vs_currencies=pln";
pub const YADIO_URL: &str = "https://api.yadio.io/exrates/pln";
pub const BLOCKCHAIN_INFO_URL: &str = "https://blockchain.info/ticker";

/// Exchange-rate refresh interval (seconds). Matches the coordinator's
/// 5-minute rate cache window.
pub const RATE_REFRESH_INTERVAL_SECS: u64 = 300;

/// Per-provider HTTP timeout (seconds).
pub const PROVIDER_TIMEOUT_SECS: u64 = 10;

/// Aggregation returns at most this many buckets (the most recent ones).
pub const MAX_BUCKETS: i64 = 90;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Rate refresh interval override (RATE_REFRESH_SECS)
    pub rate_refresh_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "offers.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            rate_refresh_secs: parse_refresh_secs(
                std::env::var("RATE_REFRESH_SECS").ok().as_deref(),
            )?,
        })
    }
}

/// Absent means the default; present but malformed is a config error, the
/// same posture as API_PORT.
fn parse_refresh_secs(raw: Option<&str>) -> Result<u64> {
    match raw {
        None => Ok(RATE_REFRESH_INTERVAL_SECS),
        Some(v) => match v.parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(secs),
            _ => Err(AppError::Config(
                "RATE_REFRESH_SECS must be a positive whole number of seconds".to_string(),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_secs_defaults_when_unset() {
        assert_eq!(parse_refresh_secs(None).unwrap(), RATE_REFRESH_INTERVAL_SECS);
    }

    #[test]
    fn refresh_secs_parses_when_set() {
        assert_eq!(parse_refresh_secs(Some("60")).unwrap(), 60);
    }

    #[test]
    fn malformed_refresh_secs_is_a_config_error() {
        for bad in ["abc", "-5", "1.5", "", "0"] {
            let err = parse_refresh_secs(Some(bad)).unwrap_err();
            assert!(matches!(err, AppError::Config(_)), "input={bad}");
        }
    }
}
