//! Volatility feed: realized volatility from SPY closes, VIX level and change.

use super::fmp::FmpClient;
use super::{number, send_json, VolatilityFeed};
use crate::config::Thresholds;
use crate::error::FeedError;
use crate::models::VolatilityData;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;
use tracing::debug;

const YAHOO_VIX_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart/%5EVIX";
const FRED_URL: &str = "https://api.stlouisfed.org/fred/series/observations";

const REALIZED_SYMBOL: &str = "SPY";
const HISTORY_DAYS: i64 = 50;
const WINDOW: usize = 20;
const MIN_SAMPLES: usize = 5;
const TRADING_DAYS: f64 = 252.0;

/// Annualized realized volatility of simple daily returns.
///
/// Population variance; `None` with fewer than five closes.
pub fn realized_vol(closes: &[f64]) -> Option<f64> {
    if closes.len() < MIN_SAMPLES {
        return None;
    }

    let returns: Vec<f64> = closes
        .windows(2)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;

    let annualized = variance.sqrt() * TRADING_DAYS.sqrt();
    annualized.is_finite().then_some(annualized)
}

/// Realized vol for the latest window and the window before it.
pub fn realized_windows(closes: &[f64]) -> (Option<f64>, Option<f64>) {
    let n = closes.len();
    let recent = &closes[n.saturating_sub(WINDOW)..];
    let prior = &closes[n.saturating_sub(2 * WINDOW)..n.saturating_sub(WINDOW)];
    (realized_vol(recent), realized_vol(prior))
}

/// Both spike flags, strict comparisons.
pub fn spike_flags(
    vix_change_pct: Option<f64>,
    realized: Option<f64>,
    realized_prev: Option<f64>,
    vix_spike_pct: f64,
    multiplier: f64,
) -> (bool, bool) {
    let vol_spike = vix_change_pct.is_some_and(|pct| pct > vix_spike_pct);
    let realized_spike = match (realized, realized_prev) {
        (Some(now), Some(prev)) => now > prev * multiplier,
        _ => false,
    };
    (vol_spike, realized_spike)
}

/// VIX from Yahoo (level and change) with FRED VIXCLS as the level fallback.
pub struct MarketVolatilityFeed {
    fmp: FmpClient,
    http: reqwest::Client,
    fred_api_key: Option<String>,
    vix_spike_pct: f64,
    realized_vol_multiplier: f64,
}

impl MarketVolatilityFeed {
    pub fn new(
        fmp: FmpClient,
        http: reqwest::Client,
        fred_api_key: Option<String>,
        thresholds: &Thresholds,
    ) -> Self {
        Self {
            fmp,
            http,
            fred_api_key,
            vix_spike_pct: thresholds.vix_spike_pct,
            realized_vol_multiplier: thresholds.realized_vol_multiplier,
        }
    }

    async fn daily_closes(&self) -> Result<Vec<f64>, FeedError> {
        let to = Utc::now().date_naive();
        let from = to - Duration::days(HISTORY_DAYS);
        let (from, to) = (from.to_string(), to.to_string());

        let data = self
            .fmp
            .get(
                "/stable/historical-price-eod/full",
                &[("symbol", REALIZED_SYMBOL), ("from", from.as_str()), ("to", to.as_str())],
            )
            .await?;

        Ok(parse_closes(&data))
    }

    async fn yahoo_vix(&self) -> Result<(Option<f64>, Option<f64>), FeedError> {
        let request = self
            .http
            .get(YAHOO_VIX_URL)
            .query(&[("interval", "1d"), ("range", "2d")]);
        let data = send_json(request, "Yahoo", YAHOO_VIX_URL).await?;
        Ok(parse_yahoo_vix(&data))
    }

    async fn fred_vix_close(&self) -> Result<Option<f64>, FeedError> {
        let Some(ref api_key) = self.fred_api_key else {
            debug!("FRED_API_KEY not set, skipping VIXCLS fallback");
            return Ok(None);
        };

        let request = self.http.get(FRED_URL).query(&[
            ("series_id", "VIXCLS"),
            ("api_key", api_key.as_str()),
            ("file_type", "json"),
        ]);
        let data = send_json(request, "FRED", FRED_URL).await?;
        Ok(parse_fred_last(&data))
    }
}

/// Closes sorted oldest first.
fn parse_closes(data: &Value) -> Vec<f64> {
    let Some(rows) = data.as_array() else {
        return Vec::new();
    };

    let mut bars: Vec<(&str, f64)> = rows
        .iter()
        .filter_map(|row| {
            let date = row.get("date")?.as_str()?;
            Some((date, number(row, "close")?))
        })
        .collect();

    bars.sort_by(|a, b| a.0.cmp(b.0));
    bars.into_iter().map(|(_, close)| close).collect()
}

/// `(level, change_pct)` from the last two daily closes.
fn parse_yahoo_vix(data: &Value) -> (Option<f64>, Option<f64>) {
    let closes = data
        .pointer("/chart/result/0/indicators/quote/0/close")
        .and_then(|v| v.as_array());

    let Some(closes) = closes.filter(|c| c.len() >= 2) else {
        return (None, None);
    };

    let prev = closes[0].as_f64();
    let curr = closes[1].as_f64();

    let pct = match (prev, curr) {
        (Some(prev), Some(curr)) if prev != 0.0 => Some((curr - prev) / prev * 100.0),
        _ => None,
    };

    (curr, pct)
}

fn parse_fred_last(data: &Value) -> Option<f64> {
    let last = data.get("observations")?.as_array()?.last()?;
    number(last, "value")
}

#[async_trait]
impl VolatilityFeed for MarketVolatilityFeed {
    async fn volatility(&self) -> Result<VolatilityData, FeedError> {
        let (closes, (vix_live, vix_change_pct)) =
            tokio::try_join!(self.daily_closes(), self.yahoo_vix())?;

        let vix = match vix_live {
            Some(level) => Some(level),
            None => self.fred_vix_close().await?,
        };

        let (realized_vol, realized_vol_prev) = realized_windows(&closes);
        let (vol_spike, realized_vol_spike) = spike_flags(
            vix_change_pct,
            realized_vol,
            realized_vol_prev,
            self.vix_spike_pct,
            self.realized_vol_multiplier,
        );

        debug!(
            "VIX {:?} ({:?}%), realized {:?} vs {:?}",
            vix, vix_change_pct, realized_vol, realized_vol_prev
        );

        Ok(VolatilityData {
            vix,
            vix_change_pct,
            realized_vol,
            realized_vol_prev,
            vol_spike,
            realized_vol_spike,
        })
    }
}
