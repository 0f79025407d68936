use serde::Deserialize;

pub const SATS_PER_BTC: f64 = 100_000_000.0;

// ---------------------------------------------------------------------------
// API response types (mirror api.rs shapes)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct BucketResponse {
    pub date: String,
    pub success_percentage: Option<f64>,
    pub failed: i64,
    pub success: i64,
    pub profit: i64,
    pub volume: f64,
    pub volume_sats: i64,
    pub avg_reserved_seconds: Option<f64>,
    pub avg_total_seconds: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct OffersDataResponse {
    pub rows: Vec<BucketResponse>,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct RateResponse {
    pub rate: f64,
    pub sources: usize,
    pub as_of_epoch: u64,
}

// ---------------------------------------------------------------------------
// Granularity selector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Daily,
    Weekly,
    Monthly,
}

impl GroupBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Error(String),
    Connecting,
}

/// Overall KPIs across the displayed buckets.
#[derive(Debug, Clone, Default)]
pub struct Kpis {
    pub total_volume: f64,
    pub total_profit_sats: i64,
    pub success_percentage: Option<f64>,
    pub avg_reserved_seconds: Option<f64>,
}

pub struct AppState {
    pub base_url: String,
    pub group_by: GroupBy,
    pub status: ConnectionStatus,
    pub rows: Vec<BucketResponse>,
    pub rate: Option<RateResponse>,
    pub rate_error: Option<String>,
    /// Sequence number of the most recently issued report request. A rapid
    /// run of granularity switches can complete out of order; responses
    /// tagged with an older sequence are dropped instead of displayed.
    request_seq: u64,
}

impl AppState {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            group_by: GroupBy::Daily,
            status: ConnectionStatus::Connecting,
            rows: Vec::new(),
            rate: None,
            rate_error: None,
            request_seq: 0,
        }
    }

    /// Register a new report request for the given granularity and return
    /// its sequence number. Supersedes every in-flight request.
    pub fn begin_request(&mut self, group_by: GroupBy) -> u64 {
        self.group_by = group_by;
        self.request_seq += 1;
        self.request_seq
    }

    /// Apply a report response. Stale responses (any sequence older than the
    /// latest issued request) are ignored.
    pub fn apply_report(&mut self, seq: u64, result: Result<Vec<BucketResponse>, String>) {
        if seq != self.request_seq {
            return;
        }
        match result {
            Ok(rows) => {
                self.rows = rows;
                self.status = ConnectionStatus::Connected;
            }
            Err(e) => self.status = ConnectionStatus::Error(e),
        }
    }

    /// Apply a rate poll. A failed poll keeps the last shown rate and only
    /// records the error indicator.
    pub fn apply_rate(&mut self, result: Result<RateResponse, String>) {
        match result {
            Ok(rate) => {
                self.rate = Some(rate);
                self.rate_error = None;
            }
            Err(e) => self.rate_error = Some(e),
        }
    }

    pub fn kpis(&self) -> Kpis {
        let total_volume: f64 = self.rows.iter().map(|r| r.volume).sum();
        let total_profit_sats: i64 = self.rows.iter().map(|r| r.profit).sum();
        let failed: i64 = self.rows.iter().map(|r| r.failed).sum();
        let success: i64 = self.rows.iter().map(|r| r.success).sum();

        let success_percentage = if failed + success > 0 {
            Some(100.0 - failed as f64 / (failed + success) as f64 * 100.0)
        } else {
            None
        };

        let timed: Vec<f64> = self
            .rows
            .iter()
            .filter_map(|r| r.avg_reserved_seconds)
            .collect();
        let avg_reserved_seconds = if timed.is_empty() {
            None
        } else {
            Some(timed.iter().sum::<f64>() / timed.len() as f64)
        };

        Kpis {
            total_volume,
            total_profit_sats,
            success_percentage,
            avg_reserved_seconds,
        }
    }

    /// Profit across displayed buckets converted at the live rate.
    /// 0.0 until a rate is available.
    pub fn profit_fiat(&self) -> f64 {
        sats_to_fiat(self.kpis().total_profit_sats, self.rate.as_ref().map(|r| r.rate))
    }
}

pub fn sats_to_fiat(sats: i64, rate: Option<f64>) -> f64 {
    match rate {
        Some(r) => sats as f64 / SATS_PER_BTC * r,
        None => 0.0,
    }
}

// ---------------------------------------------------------------------------
// API calls
// ---------------------------------------------------------------------------

pub async fn fetch_report(
    client: &reqwest::Client,
    base_url: &str,
    group_by: GroupBy,
) -> Result<Vec<BucketResponse>, String> {
    let url = format!("{base_url}/api/offers-data");
    let resp = client
        .post(&url)
        .json(&serde_json::json!({ "groupBy": group_by.as_str() }))
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if !resp.status().is_success() {
        return Err(format!("HTTP {}", resp.status()));
    }
    let body: OffersDataResponse = resp.json().await.map_err(|e| e.to_string())?;
    Ok(body.rows)
}

pub async fn fetch_rate(
    client: &reqwest::Client,
    base_url: &str,
) -> Result<RateResponse, String> {
    let url = format!("{base_url}/api/btc-rate");
    let resp = client.get(&url).send().await.map_err(|e| e.to_string())?;
    if !resp.status().is_success() {
        return Err(format!("HTTP {}", resp.status()));
    }
    resp.json().await.map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

pub fn format_pct(v: Option<f64>) -> String {
    match v {
        Some(p) => format!("{p:.2}%"),
        None => "—".to_string(),
    }
}

pub fn format_secs(v: Option<f64>) -> String {
    match v {
        Some(s) if s >= 3600.0 => format!("{:.1}h", s / 3600.0),
        Some(s) if s >= 60.0 => format!("{:.1}m", s / 60.0),
        Some(s) => format!("{s:.0}s"),
        None => "—".to_string(),
    }
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}…", &s[..max.saturating_sub(1)])
    }
}


fn main() {
    // Shared state module for the TUI — entry point lives in src/bin/tui.rs
}
