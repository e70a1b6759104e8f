//! Market, macro and volatility feeds.
//!
//! The cycle only sees the three traits below. Concrete adapters talk to
//! FMP, Schwab, Yahoo and FRED, or read a local fixture file.

pub mod fixture;
pub mod fmp;
pub mod schwab;
pub mod volatility;

use crate::config::{Config, FeedSource};
use crate::error::FeedError;
use crate::models::{MacroStream, MarketSnapshot, VolatilityData};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[async_trait]
pub trait MarketFeed: Send + Sync {
    async fn snapshot(&self) -> Result<MarketSnapshot, FeedError>;
}

#[async_trait]
pub trait MacroFeed: Send + Sync {
    async fn stream(&self) -> Result<MacroStream, FeedError>;
}

#[async_trait]
pub trait VolatilityFeed: Send + Sync {
    async fn volatility(&self) -> Result<VolatilityData, FeedError>;
}

/// The three feeds a cycle fetches from.
#[derive(Clone)]
pub struct Feeds {
    pub market: Arc<dyn MarketFeed>,
    pub macro_feed: Arc<dyn MacroFeed>,
    pub volatility: Arc<dyn VolatilityFeed>,
}

impl Feeds {
    /// Wire up the feeds selected in the configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let feeds = &config.feeds;

        if feeds.source == FeedSource::Fixture {
            let path = feeds
                .fixture
                .clone()
                .context("Feed source 'fixture' requires a fixture path")?;
            info!("Using fixture feeds from {}", path.display());
            let fixture = Arc::new(fixture::FixtureFeed::new(path));
            return Ok(Self {
                market: fixture.clone(),
                macro_feed: fixture.clone(),
                volatility: fixture,
            });
        }

        let http = http_client(feeds.timeout_seconds)?;
        let fmp = fmp::FmpClient::new(http.clone(), feeds.fmp_api_key.clone());

        let volatility = Arc::new(volatility::MarketVolatilityFeed::new(
            fmp.clone(),
            http.clone(),
            feeds.fred_api_key.clone(),
            &config.thresholds,
        ));
        let macro_feed = Arc::new(fmp::FmpMacroFeed::new(fmp.clone()));

        let market: Arc<dyn MarketFeed> = match feeds.source {
            FeedSource::Schwab => {
                info!("Using Schwab quotes for market snapshot");
                let auth = schwab::SchwabAuth::new(
                    http.clone(),
                    feeds.schwab_app_key.clone(),
                    feeds.schwab_app_secret.clone(),
                    feeds.schwab_refresh_token.clone(),
                );
                Arc::new(schwab::SchwabMarketFeed::new(
                    http,
                    Arc::new(auth),
                    feeds.index_symbols.clone(),
                    feeds.sector_symbols.clone(),
                ))
            }
            _ => {
                info!("Using FMP quotes for market snapshot");
                Arc::new(fmp::FmpMarketFeed::new(
                    fmp,
                    feeds.index_symbols.clone(),
                    feeds.sector_symbols.clone(),
                ))
            }
        };

        Ok(Self {
            market,
            macro_feed,
            volatility,
        })
    }
}

/// Shared HTTP client with a request timeout.
pub fn http_client(timeout_seconds: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .user_agent(concat!("sentinel/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")
}

/// Send a prepared request and decode a JSON body.
///
/// Query strings are never echoed into errors since they carry API keys.
pub(crate) async fn send_json(
    request: reqwest::RequestBuilder,
    provider: &'static str,
    endpoint: &str,
) -> Result<Value, FeedError> {
    let response = request.send().await.map_err(|e| FeedError::Transport {
        url: endpoint.to_string(),
        source: e.without_url(),
    })?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(FeedError::Status {
            provider,
            status,
            body,
        });
    }

    response.json::<Value>().await.map_err(|e| FeedError::Malformed {
        provider,
        detail: e.without_url().to_string(),
    })
}

/// Read a number that may arrive as a JSON number or a numeric string.
pub(crate) fn number(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_number_accepts_strings_and_numbers() {
        let row = json!({"a": 1.5, "b": "2.25", "c": ".", "d": null});
        assert_eq!(number(&row, "a"), Some(1.5));
        assert_eq!(number(&row, "b"), Some(2.25));
        assert_eq!(number(&row, "c"), None);
        assert_eq!(number(&row, "d"), None);
        assert_eq!(number(&row, "missing"), None);
    }

    #[test]
    fn test_fixture_source_wiring() {
        let mut config = Config::default();
        config.feeds.source = FeedSource::Fixture;
        config.feeds.fixture = Some("fixtures/calm_session.json".into());
        assert!(Feeds::from_config(&config).is_ok());

        config.feeds.fixture = None;
        assert!(Feeds::from_config(&config).is_err());
    }
}
