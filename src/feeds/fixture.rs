//! File-backed feed for offline and dry runs.
//!
//! The fixture is re-read on every fetch, so a watch loop picks up edits.

use super::{MacroFeed, MarketFeed, VolatilityFeed};
use crate::error::FeedError;
use crate::models::{MacroStream, MarketIndexPoint, MarketSnapshot, VolatilityData};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FixtureMarket {
    indices: Vec<MarketIndexPoint>,
    sectors: Vec<MarketIndexPoint>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct FixtureData {
    market: FixtureMarket,
    #[serde(default, rename = "macro")]
    macro_stream: MacroStream,
    #[serde(default)]
    volatility: VolatilityData,
}

/// Serves all three feeds from one JSON file.
pub struct FixtureFeed {
    path: PathBuf,
}

impl FixtureFeed {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn load(&self) -> Result<FixtureData, FeedError> {
        let fixture_err = |detail: String| FeedError::Fixture {
            path: self.path.display().to_string(),
            detail,
        };

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| fixture_err(e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| fixture_err(e.to_string()))
    }
}

#[async_trait]
impl MarketFeed for FixtureFeed {
    async fn snapshot(&self) -> Result<MarketSnapshot, FeedError> {
        let market = self.load().await?.market;
        Ok(MarketSnapshot {
            indices: market.indices,
            sectors: market.sectors,
            timestamp: market.timestamp.unwrap_or_else(Utc::now),
        })
    }
}

#[async_trait]
impl MacroFeed for FixtureFeed {
    async fn stream(&self) -> Result<MacroStream, FeedError> {
        Ok(self.load().await?.macro_stream)
    }
}

#[async_trait]
impl VolatilityFeed for FixtureFeed {
    async fn volatility(&self) -> Result<VolatilityData, FeedError> {
        Ok(self.load().await?.volatility)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_fixture_serves_all_feeds() {
        let file = write_fixture(
            r#"{
                "market": {
                    "indices": [{"symbol": "SPY", "changePct": 0.5, "price": 600.0}],
                    "sectors": [{"symbol": "XLE", "changePct": -2.5, "price": null}]
                },
                "macro": {
                    "events": [{"type": "CPI", "date": "2025-01-15", "actual": 3.0, "forecast": 2.9, "previous": 2.8, "surprise": 0.1}]
                },
                "volatility": {"vix": 16.2, "vixChangePct": 3.0, "realizedVol": null, "realizedVolPrev": null, "volSpike": false, "realizedVolSpike": false}
            }"#,
        );
        let feed = FixtureFeed::new(file.path().to_path_buf());

        let market = feed.snapshot().await.unwrap();
        assert_eq!(market.sectors[0].symbol, "XLE");
        assert_eq!(feed.stream().await.unwrap().events.len(), 1);
        assert_eq!(feed.volatility().await.unwrap().vix, Some(16.2));
    }

    #[tokio::test]
    async fn test_missing_sections_default() {
        let file = write_fixture(r#"{"market": {"indices": [], "sectors": []}}"#);
        let feed = FixtureFeed::new(file.path().to_path_buf());
        assert!(feed.stream().await.unwrap().events.is_empty());
        assert!(!feed.volatility().await.unwrap().vol_spike);
    }

    #[tokio::test]
    async fn test_unreadable_fixture_is_a_feed_error() {
        let feed = FixtureFeed::new(PathBuf::from("does/not/exist.json"));
        assert!(matches!(
            feed.snapshot().await,
            Err(FeedError::Fixture { .. })
        ));

        let file = write_fixture("not json");
        let feed = FixtureFeed::new(file.path().to_path_buf());
        assert!(feed.volatility().await.is_err());
    }
}
