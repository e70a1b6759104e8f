//! Report persistence.
//!
//! [`FileReportStore`] writes one timestamped JSON file per report and keeps
//! `latest.json` pointing at the newest one. [`MemoryReportStore`] backs
//! `--no-persist` runs and tests.

use crate::engine::SentinelContext;
use crate::error::StoreError;
use crate::models::{AnomalyFlags, SpecialReport};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

const LATEST_FILE: &str = "latest.json";

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn persist(&self, stored: &StoredReport) -> Result<(), StoreError>;

    /// The most recently persisted report, if any.
    async fn fetch_latest(&self) -> Result<Option<StoredReport>, StoreError>;
}

/// A report together with the facts it was written from.
///
/// The anomaly flags and headline volatility numbers are lifted out of the
/// context so a reader can tell what fired without walking it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredReport {
    pub generated_at: DateTime<Utc>,
    pub anomalies: AnomalyFlags,
    pub vix: Option<f64>,
    pub vix_change_pct: Option<f64>,
    pub realized_vol: Option<f64>,
    pub report: SpecialReport,
    pub context: SentinelContext,
}

impl StoredReport {
    pub fn new(report: SpecialReport, context: SentinelContext) -> Self {
        let volatility = context.volatility();
        Self {
            generated_at: Utc::now(),
            anomalies: *context.anomalies(),
            vix: volatility.vix,
            vix_change_pct: volatility.vix_change_pct,
            realized_vol: volatility.realized_vol,
            report,
            context,
        }
    }
}

pub struct FileReportStore {
    dir: PathBuf,
}

impl FileReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(generated_at: &DateTime<Utc>) -> String {
        format!("sentinel-{}.json", generated_at.format("%Y%m%dT%H%M%S%.3fZ"))
    }
}

#[async_trait]
impl ReportStore for FileReportStore {
    async fn persist(&self, stored: &StoredReport) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let content = serde_json::to_string_pretty(stored)?;

        let path = self.dir.join(Self::file_name(&stored.generated_at));
        tokio::fs::write(&path, &content).await?;
        tokio::fs::write(self.dir.join(LATEST_FILE), &content).await?;

        info!("Report saved to {}", path.display());
        Ok(())
    }

    async fn fetch_latest(&self) -> Result<Option<StoredReport>, StoreError> {
        let path = self.dir.join(LATEST_FILE);

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No previous report at {}", path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let stored: StoredReport = serde_json::from_str(&content)?;
        Ok(Some(stored))
    }
}

/// Keeps every persisted report in memory.
#[derive(Default)]
pub struct MemoryReportStore {
    reports: Mutex<Vec<StoredReport>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn count(&self) -> usize {
        self.reports.lock().await.len()
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn persist(&self, stored: &StoredReport) -> Result<(), StoreError> {
        self.reports.lock().await.push(stored.clone());
        Ok(())
    }

    async fn fetch_latest(&self) -> Result<Option<StoredReport>, StoreError> {
        Ok(self.reports.lock().await.last().cloned())
    }
}
