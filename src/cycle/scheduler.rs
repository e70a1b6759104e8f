//! Interval loop for `--watch`.
//!
//! Cycles never overlap: each one is awaited before the next tick is taken,
//! and ticks missed while a slow cycle ran are skipped.

use super::{CycleOutcome, SentinelCycle};
use crate::engine::{empty_context, SentinelContext};
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Counts for one watch session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchSummary {
    pub completed: usize,
    pub failed: usize,
}

/// Run cycles every `interval` until `shutdown` resolves.
///
/// A failed cycle is logged and the loop keeps the last good context.
pub async fn run_watch<S, F>(
    cycle: &SentinelCycle,
    interval: Duration,
    shutdown: S,
    mut on_outcome: F,
) -> WatchSummary
where
    S: Future<Output = ()>,
    F: FnMut(&CycleOutcome),
{
    let mut latest: SentinelContext = match cycle.store().fetch_latest().await {
        Ok(Some(previous)) => {
            info!(
                "Resuming from report of {}: {}",
                previous.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
                previous.report.summary
            );
            previous.context
        }
        Ok(None) => {
            info!("No previous report, starting from an empty baseline");
            empty_context()
        }
        Err(e) => {
            warn!("Could not read previous report: {}", e);
            empty_context()
        }
    };
    let mut summary = WatchSummary::default();

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => break,
        }

        tokio::select! {
            result = cycle.run() => match result {
                Ok(outcome) => {
                    summary.completed += 1;
                    on_outcome(&outcome);
                    latest = outcome.context;
                }
                Err(e) => {
                    summary.failed += 1;
                    error!("Cycle failed: {}", e);
                    warn!(
                        "Keeping previous context from {}",
                        latest.market().timestamp.format("%Y-%m-%d %H:%M:%S UTC")
                    );
                }
            },
            _ = &mut shutdown => break,
        }
    }

    info!(
        "Watch stopped after {} completed and {} failed cycles",
        summary.completed, summary.failed
    );
    summary
}
