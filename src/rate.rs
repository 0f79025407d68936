//! Multi-provider BTC/PLN rate aggregation.
//!
//! Every refresh fans out to all providers concurrently, drops whatever
//! fails to respond or parse, and averages the valid samples. A cycle where
//! every provider fails keeps the previous good sample in place so consumers
//! can show a stale-but-present value next to an error indicator.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::future::join_all;
use serde::Serialize;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::config::{BLOCKCHAIN_INFO_URL, COINGECKO_URL, PROVIDER_TIMEOUT_SECS, YADIO_URL};
use crate::error::{AppError, Result};

pub const SATS_PER_BTC: f64 = 100_000_000.0;

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// One exchange-rate source: an endpoint plus the extraction path for its
/// response shape. Missing or malformed fields make the sample invalid,
/// never a crash.
pub struct RateProvider {
    pub name: &'static str,
    pub url: String,
    pub extract: fn(&serde_json::Value) -> Option<f64>,
}

pub fn default_providers() -> Vec<RateProvider> {
    vec![
        RateProvider {
            name: "CoinGecko",
            url: COINGECKO_URL.to_string(),
            extract: |v| {
                v.get("bitcoin")
                    .and_then(|b| b.get("pln"))
                    .and_then(|p| p.as_f64())
            },
        },
        RateProvider {
            name: "Yadio",
            url: YADIO_URL.to_string(),
            extract: |v| v.get("BTC").and_then(|b| b.as_f64()),
        },
        RateProvider {
            name: "Blockchain.info",
            url: BLOCKCHAIN_INFO_URL.to_string(),
            extract: |v| {
                v.get("PLN")
                    .and_then(|p| p.get("last"))
                    .and_then(|l| l.as_f64())
            },
        },
    ]
}

/// A quote is usable only if it is a finite positive number.
fn is_valid_rate(rate: f64) -> bool {
    rate.is_finite() && rate > 0.0
}

/// Query a single provider. Any failure — network, non-2xx, unparseable body,
/// out-of-range value — excludes the provider from this cycle.
async fn fetch_provider_rate(client: &reqwest::Client, provider: &RateProvider) -> Option<f64> {
    let resp = match client.get(&provider.url).send().await {
        Ok(r) => r,
        Err(e) => {
            warn!(provider = provider.name, "rate fetch failed: {e}");
            return None;
        }
    };
    if !resp.status().is_success() {
        warn!(
            provider = provider.name,
            status = %resp.status(),
            "rate fetch returned non-success status"
        );
        return None;
    }
    let body: serde_json::Value = match resp.json().await {
        Ok(v) => v,
        Err(e) => {
            warn!(provider = provider.name, "rate response parse failed: {e}");
            return None;
        }
    };
    match (provider.extract)(&body) {
        Some(rate) if is_valid_rate(rate) => Some(rate),
        other => {
            warn!(provider = provider.name, "invalid rate sample: {other:?}");
            None
        }
    }
}

/// Arithmetic mean of the valid samples. Errors only when every provider
/// failed this cycle.
fn aggregate_samples(samples: Vec<Option<f64>>) -> Result<(f64, usize)> {
    let valid: Vec<f64> = samples.into_iter().flatten().collect();
    if valid.is_empty() {
        return Err(AppError::AllProvidersFailed);
    }
    let mean = valid.iter().sum::<f64>() / valid.len() as f64;
    Ok((mean, valid.len()))
}

/// Fan-out to all providers, fan-in, average the survivors.
pub async fn fetch_average_rate(
    client: &reqwest::Client,
    providers: &[RateProvider],
) -> Result<(f64, usize)> {
    let samples = join_all(
        providers
            .iter()
            .map(|p| fetch_provider_rate(client, p)),
    )
    .await;
    aggregate_samples(samples)
}

// ---------------------------------------------------------------------------
// RateTracker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateSnapshot {
    /// Averaged BTC/PLN rate.
    pub rate: f64,
    /// Number of providers that contributed to the average.
    pub sources: usize,
    /// Unix seconds when the sample was taken.
    pub as_of_epoch: u64,
}

#[derive(Default)]
struct RateState {
    last_good: Option<RateSnapshot>,
    last_error: Option<String>,
}

/// Shared rate state. The refresher writes, API handlers read. A failed
/// refresh records the error but never clears the last good snapshot.
pub struct RateTracker {
    inner: Mutex<RateState>,
}

impl RateTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(RateState::default()),
        })
    }

    pub fn apply_success(&self, rate: f64, sources: usize) {
        if let Ok(mut state) = self.inner.lock() {
            state.last_good = Some(RateSnapshot {
                rate,
                sources,
                as_of_epoch: now_secs(),
            });
            state.last_error = None;
        }
    }

    pub fn apply_failure(&self, message: String) {
        if let Ok(mut state) = self.inner.lock() {
            state.last_error = Some(message);
        }
    }

    pub fn current(&self) -> Option<RateSnapshot> {
        self.inner.lock().ok().and_then(|s| s.last_good.clone())
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().ok().and_then(|s| s.last_error.clone())
    }

    /// Convert a sats amount to fiat at the current rate. Yields 0.0 when no
    /// rate is available yet, so display code never handles an error here.
    pub fn sats_to_fiat(&self, sats: i64) -> f64 {
        match self.current() {
            Some(snap) => sats as f64 / SATS_PER_BTC * snap.rate,
            None => 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// RateRefresher
// ---------------------------------------------------------------------------

/// Background task refreshing the tracker on a fixed interval. `main` holds
/// the task's JoinHandle and aborts it on shutdown; there is no ambient
/// global timer. Each refresh is independent — an overlapping slow cycle is
/// acceptable because provider reads are idempotent.
pub struct RateRefresher {
    client: reqwest::Client,
    providers: Vec<RateProvider>,
    tracker: Arc<RateTracker>,
    refresh_secs: u64,
}

impl RateRefresher {
    pub fn new(tracker: Arc<RateTracker>, refresh_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(PROVIDER_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            providers: default_providers(),
            tracker,
            refresh_secs,
        })
    }

    pub async fn run(self) {
        let mut ticker = interval(Duration::from_secs(self.refresh_secs));
        // First tick fires immediately and seeds the initial rate.
        loop {
            ticker.tick().await;
            self.refresh().await;
        }
    }

    async fn refresh(&self) {
        match fetch_average_rate(&self.client, &self.providers).await {
            Ok((rate, sources)) => {
                info!(rate, sources, "BTC/PLN rate updated");
                self.tracker.apply_success(rate, sources);
            }
            Err(e) => {
                error!("rate refresh failed: {e}");
                self.tracker.apply_failure(e.to_string());
            }
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
