//! One sentinel cycle: FETCH → DETECT → (DRILLDOWN) → ASSEMBLE → SYNTHESIZE
//! → PERSIST.
//!
//! Feed and store failures abort the cycle with a [`CycleError`]. Synthesis
//! cannot fail.

pub mod scheduler;

use crate::engine::{assemble, SentinelContext, TriggerEngine};
use crate::error::{CycleError, FeedError};
use crate::feeds::Feeds;
use crate::models::SpecialReport;
use crate::store::{ReportStore, StoredReport};
use crate::synthesis::NarrativeSynthesizer;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub use scheduler::{run_watch, WatchSummary};

/// Everything one successful cycle produced.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub context: SentinelContext,
    pub report: SpecialReport,
    pub duration: Duration,
}

pub struct SentinelCycle {
    feeds: Feeds,
    engine: TriggerEngine,
    feed_timeout: Duration,
    synthesizer: NarrativeSynthesizer,
    store: Arc<dyn ReportStore>,
}

impl SentinelCycle {
    pub fn new(
        feeds: Feeds,
        engine: TriggerEngine,
        feed_timeout: Duration,
        synthesizer: NarrativeSynthesizer,
        store: Arc<dyn ReportStore>,
    ) -> Self {
        Self {
            feeds,
            engine,
            feed_timeout,
            synthesizer,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn ReportStore> {
        &self.store
    }

    /// Run a full cycle.
    pub async fn run(&self) -> Result<CycleOutcome, CycleError> {
        let start = Instant::now();
        info!("Starting sentinel cycle");

        let context = build_context(&self.feeds, &self.engine, self.feed_timeout).await?;

        debug!("Synthesizing report");
        let report = self.synthesizer.synthesize(&context).await;

        debug!("Persisting report");
        self.store
            .persist(&StoredReport::new(report.clone(), context.clone()))
            .await?;

        let duration = start.elapsed();
        info!("Cycle complete in {:.1}s", duration.as_secs_f64());

        Ok(CycleOutcome {
            context,
            report,
            duration,
        })
    }
}

/// FETCH → DETECT → (DRILLDOWN) → ASSEMBLE, without any model call.
pub async fn build_context(
    feeds: &Feeds,
    engine: &TriggerEngine,
    feed_timeout: Duration,
) -> Result<SentinelContext, CycleError> {
    debug!("Fetching market, macro and volatility feeds");
    let (market, macro_stream, volatility) = tokio::try_join!(
        fetch("market", feed_timeout, feeds.market.snapshot()),
        fetch("macro", feed_timeout, feeds.macro_feed.stream()),
        fetch("volatility", feed_timeout, feeds.volatility.volatility()),
    )?;
    debug!(
        "Fetched {} indices, {} sectors, {} macro events",
        market.indices.len(),
        market.sectors.len(),
        macro_stream.events.len()
    );

    let anomalies = engine.evaluate(&market, &macro_stream, &volatility);
    if anomalies.any() {
        info!("Anomalies detected: {}", anomalies.raised().join(", "));
    } else {
        info!("No anomalies detected");
    }

    Ok(assemble(market, macro_stream, volatility, anomalies))
}

async fn fetch<T, F>(feed: &'static str, timeout: Duration, call: F) -> Result<T, CycleError>
where
    F: Future<Output = Result<T, FeedError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.map_err(CycleError::feed(feed)),
        Err(_) => Err(CycleError::Feed {
            feed,
            source: FeedError::Timeout(timeout.as_secs()),
        }),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Thresholds;
    use crate::feeds::{MacroFeed, MarketFeed, VolatilityFeed};
    use crate::models::{MacroStream, MarketIndexPoint, MarketSnapshot, VolatilityData};
    use crate::store::MemoryReportStore;
    use crate::synthesis::tests::{synthesizer, ScriptedLlm};
    use async_trait::async_trait;
    use chrono::Utc;

    /// Serves fixed data, or fails the market feed.
    pub(crate) struct StaticFeed {
        pub market: MarketSnapshot,
        pub macro_stream: MacroStream,
        pub volatility: VolatilityData,
        pub fail_market: bool,
    }

    #[async_trait]
    impl MarketFeed for StaticFeed {
        async fn snapshot(&self) -> Result<MarketSnapshot, FeedError> {
            if self.fail_market {
                return Err(FeedError::Malformed {
                    provider: "test",
                    detail: "no quotes".to_string(),
                });
            }
            Ok(self.market.clone())
        }
    }

    #[async_trait]
    impl MacroFeed for StaticFeed {
        async fn stream(&self) -> Result<MacroStream, FeedError> {
            Ok(self.macro_stream.clone())
        }
    }

    #[async_trait]
    impl VolatilityFeed for StaticFeed {
        async fn volatility(&self) -> Result<VolatilityData, FeedError> {
            Ok(self.volatility.clone())
        }
    }

    struct StalledFeed;

    #[async_trait]
    impl VolatilityFeed for StalledFeed {
        async fn volatility(&self) -> Result<VolatilityData, FeedError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(VolatilityData::default())
        }
    }

    fn calm_sectors() -> Vec<MarketIndexPoint> {
        vec![
            MarketIndexPoint::new("XLK", 0.8, None),
            MarketIndexPoint::new("XLF", 0.3, None),
            MarketIndexPoint::new("XLE", -0.6, None),
            MarketIndexPoint::new("XLV", 1.1, None),
        ]
    }

    pub(crate) fn calm_feed() -> StaticFeed {
        StaticFeed {
            market: MarketSnapshot {
                indices: vec![
                    MarketIndexPoint::new("SPY", 0.5, Some(600.0)),
                    MarketIndexPoint::new("QQQ", 0.4, Some(520.0)),
                    MarketIndexPoint::new("IWM", -0.2, Some(220.0)),
                    MarketIndexPoint::new("DIA", 0.1, Some(440.0)),
                ],
                sectors: calm_sectors(),
                timestamp: Utc::now(),
            },
            macro_stream: MacroStream::default(),
            volatility: VolatilityData {
                vix: Some(15.4),
                vix_change_pct: Some(3.0),
                ..Default::default()
            },
            fail_market: false,
        }
    }

    pub(crate) fn feeds_from(feed: StaticFeed) -> Feeds {
        let feed = Arc::new(feed);
        Feeds {
            market: feed.clone(),
            macro_feed: feed.clone(),
            volatility: feed,
        }
    }

    fn cycle(feeds: Feeds, llm: Arc<ScriptedLlm>, store: Arc<MemoryReportStore>) -> SentinelCycle {
        SentinelCycle::new(
            feeds,
            TriggerEngine::new(Thresholds::default()),
            Duration::from_secs(2),
            synthesizer(llm),
            store,
        )
    }

    #[tokio::test]
    async fn test_calm_session_end_to_end() {
        let llm = Arc::new(ScriptedLlm::replying(&[
            r#"{"summary": "A calm session.", "keyDrivers": ["SPY: +0.50%"], "macroContext": null}"#,
            r#"{"whatHappened": "Not much."}"#,
        ]));
        let store = Arc::new(MemoryReportStore::new());
        let outcome = cycle(feeds_from(calm_feed()), llm.clone(), store.clone())
            .run()
            .await
            .unwrap();

        let flags = outcome.context.anomalies();
        assert!(!flags.index_move);
        assert!(!flags.sector_rotation);
        assert!(!flags.macro_surprise);
        assert!(!flags.vol_spike);
        assert!(outcome.context.drilldown().is_none());

        // Synthesis still ran against the baseline context.
        let prompts = llm.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(!prompts[0].contains("\"drilldown\""));
        assert_eq!(outcome.report.summary, "A calm session.");
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_sector_rotation_end_to_end() {
        let mut feed = calm_feed();
        feed.market.sectors.push(MarketIndexPoint::new("XLU", -1.9, None));
        feed.market.sectors[2] = MarketIndexPoint::new("XLE", -2.5, None);

        let llm = Arc::new(ScriptedLlm::replying(&["not json", "not json either"]));
        let store = Arc::new(MemoryReportStore::new());
        let outcome = cycle(feeds_from(feed), llm, store).run().await.unwrap();

        assert!(outcome.context.anomalies().sector_rotation);
        let drilldown = outcome.context.drilldown().unwrap();
        assert_eq!(drilldown.lagging_sectors[0], "XLE");
        assert_eq!(drilldown.lagging_sectors[1], "XLU");

        assert_eq!(outcome.report.summary, "not json");
        assert!(outcome.report.what_this_means.is_some());
    }

    #[tokio::test]
    async fn test_vol_spike_alone_produces_drilldown() {
        let mut feed = calm_feed();
        feed.volatility.vix_change_pct = Some(12.0);
        feed.volatility.vol_spike = true;

        let context = build_context(
            &feeds_from(feed),
            &TriggerEngine::new(Thresholds::default()),
            Duration::from_secs(2),
        )
        .await
        .unwrap();

        assert!(context.anomalies().vol_spike);
        assert!(context.drilldown().is_some());
    }

    #[tokio::test]
    async fn test_feed_failure_is_fatal() {
        let mut feed = calm_feed();
        feed.fail_market = true;

        let llm = Arc::new(ScriptedLlm::replying(&[]));
        let store = Arc::new(MemoryReportStore::new());
        let result = cycle(feeds_from(feed), llm.clone(), store.clone()).run().await;

        assert!(matches!(
            result,
            Err(CycleError::Feed { feed: "market", .. })
        ));
        assert!(llm.prompts.lock().unwrap().is_empty());
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn test_stalled_feed_times_out() {
        let mut feeds = feeds_from(calm_feed());
        feeds.volatility = Arc::new(StalledFeed);

        let result = build_context(
            &feeds,
            &TriggerEngine::new(Thresholds::default()),
            Duration::from_millis(50),
        )
        .await;

        assert!(matches!(
            result,
            Err(CycleError::Feed {
                feed: "volatility",
                source: FeedError::Timeout(_)
            })
        ));
    }

    #[tokio::test]
    async fn test_bundled_fixtures() {
        let engine = TriggerEngine::new(Thresholds::default());
        let fixture_feeds = |name: &str| {
            let feed = Arc::new(crate::feeds::fixture::FixtureFeed::new(
                std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures").join(name),
            ));
            Feeds {
                market: feed.clone(),
                macro_feed: feed.clone(),
                volatility: feed,
            }
        };

        let calm = build_context(&fixture_feeds("calm_session.json"), &engine, Duration::from_secs(2))
            .await
            .unwrap();
        assert!(!calm.anomalies().any());
        assert!(calm.drilldown().is_none());

        let rotation =
            build_context(&fixture_feeds("sector_rotation.json"), &engine, Duration::from_secs(2))
                .await
                .unwrap();
        assert!(rotation.anomalies().sector_rotation);
        assert!(!rotation.anomalies().macro_surprise);
        assert_eq!(rotation.drilldown().unwrap().lagging_sectors[0], "XLE");
        assert_eq!(rotation.drilldown().unwrap().leading_sectors[0], "XLK");
    }

    #[tokio::test]
    async fn test_injected_thresholds() {
        let thresholds = Thresholds {
            index_move_pct: 0.4,
            ..Thresholds::default()
        };
        let context = build_context(
            &feeds_from(calm_feed()),
            &TriggerEngine::new(thresholds),
            Duration::from_secs(2),
        )
        .await
        .unwrap();

        assert!(context.anomalies().index_move);
        assert_eq!(
            context.drilldown().unwrap().leading_indices,
            vec!["SPY", "QQQ", "DIA"]
        );
    }
}
