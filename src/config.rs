//! Configuration file handling.
//!
//! This module handles loading `.sentinel.toml`, layering secrets from the
//! environment on top, and validating thresholds.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = ".sentinel.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Anomaly thresholds.
    #[serde(default)]
    pub thresholds: Thresholds,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Feed settings.
    #[serde(default)]
    pub feeds: FeedsConfig,

    /// Synthesis settings.
    #[serde(default)]
    pub synthesis: SynthesisConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Minutes between cycles in watch mode.
    #[serde(default = "default_interval")]
    pub interval_minutes: u64,

    /// Directory for persisted reports.
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval(),
            report_dir: default_report_dir(),
            verbose: false,
        }
    }
}

/// One week.
pub const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

impl GeneralConfig {
    /// Time between watch cycles.
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }
}

fn default_interval() -> u64 {
    15
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("sentinel_reports")
}

/// Thresholds for the anomaly detectors and the volatility feed.
///
/// Passed by value into the trigger engine; nothing reads them globally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Absolute daily index move in percent (inclusive).
    #[serde(default = "default_index_move")]
    pub index_move_pct: f64,

    /// Absolute daily sector move in percent (inclusive).
    #[serde(default = "default_sector_rotation")]
    pub sector_rotation_pct: f64,

    /// CPI surprise relative to forecast (0.15 = 15%).
    #[serde(default = "default_cpi_surprise")]
    pub cpi_surprise_pct: f64,

    /// Payrolls surprise in absolute jobs.
    #[serde(default = "default_jobs_surprise")]
    pub jobs_surprise: f64,

    /// Fed rate surprise in basis points.
    #[serde(default = "default_fed_surprise")]
    pub fed_surprise_bps: f64,

    /// Daily VIX change in percent that counts as a spike (strict).
    #[serde(default = "default_vix_spike")]
    pub vix_spike_pct: f64,

    /// Realized-vol ratio against the prior window that counts as a spike.
    #[serde(default = "default_realized_multiplier")]
    pub realized_vol_multiplier: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            index_move_pct: default_index_move(),
            sector_rotation_pct: default_sector_rotation(),
            cpi_surprise_pct: default_cpi_surprise(),
            jobs_surprise: default_jobs_surprise(),
            fed_surprise_bps: default_fed_surprise(),
            vix_spike_pct: default_vix_spike(),
            realized_vol_multiplier: default_realized_multiplier(),
        }
    }
}

fn default_index_move() -> f64 {
    1.5
}

fn default_sector_rotation() -> f64 {
    2.0
}

fn default_cpi_surprise() -> f64 {
    0.15
}

fn default_jobs_surprise() -> f64 {
    75_000.0
}

fn default_fed_surprise() -> f64 {
    15.0
}

fn default_vix_spike() -> f64 {
    8.0
}

fn default_realized_multiplier() -> f64 {
    1.8
}

/// Which language model backend to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Openai,
    Ollama,
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: ProviderKind,

    /// Model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// API base URL. Empty means the provider's default.
    #[serde(default)]
    pub base_url: String,

    /// API key (normally supplied via `OPENAI_API_KEY`).
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_effort")]
    pub reasoning_effort: Option<String>,

    #[serde(default = "default_effort")]
    pub verbosity: Option<String>,

    /// Temperature for providers that take one.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_model_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            name: default_model(),
            base_url: String::new(),
            api_key: None,
            reasoning_effort: default_effort(),
            verbosity: default_effort(),
            temperature: default_temperature(),
            timeout_seconds: default_model_timeout(),
        }
    }
}

fn default_model() -> String {
    "gpt-5-mini".to_string()
}

fn default_effort() -> Option<String> {
    Some("low".to_string())
}

fn default_temperature() -> f32 {
    0.2
}

fn default_model_timeout() -> u64 {
    120
}

/// Where market data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FeedSource {
    #[default]
    Fmp,
    Schwab,
    Fixture,
}

/// Feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedsConfig {
    #[serde(default)]
    pub source: FeedSource,

    #[serde(default = "default_index_symbols")]
    pub index_symbols: Vec<String>,

    #[serde(default = "default_sector_symbols")]
    pub sector_symbols: Vec<String>,

    /// Fixture file for `source = "fixture"`.
    #[serde(default)]
    pub fixture: Option<PathBuf>,

    /// Per-feed timeout in seconds.
    #[serde(default = "default_feed_timeout")]
    pub timeout_seconds: u64,

    #[serde(default, skip_serializing)]
    pub fmp_api_key: Option<String>,

    #[serde(default, skip_serializing)]
    pub fred_api_key: Option<String>,

    #[serde(default, skip_serializing)]
    pub schwab_app_key: Option<String>,

    #[serde(default, skip_serializing)]
    pub schwab_app_secret: Option<String>,

    #[serde(default, skip_serializing)]
    pub schwab_refresh_token: Option<String>,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            source: FeedSource::default(),
            index_symbols: default_index_symbols(),
            sector_symbols: default_sector_symbols(),
            fixture: None,
            timeout_seconds: default_feed_timeout(),
            fmp_api_key: None,
            fred_api_key: None,
            schwab_app_key: None,
            schwab_app_secret: None,
            schwab_refresh_token: None,
        }
    }
}

fn default_index_symbols() -> Vec<String> {
    vec!["SPY", "QQQ", "IWM", "DIA"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_sector_symbols() -> Vec<String> {
    vec![
        "XLK", "XLF", "XLE", "XLY", "XLP", "XLV", "XLI", "XLB", "XLU", "XLRE",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_feed_timeout() -> u64 {
    30
}

/// How model output is checked against the numbers given to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroundingCheck {
    Off,
    #[default]
    Warn,
}

/// Synthesis settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Optional analyst brief template; the builtin one is used otherwise.
    #[serde(default)]
    pub prompt_template: Option<PathBuf>,

    #[serde(default)]
    pub grounding_check: GroundingCheck,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Overlay secrets from the environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok().filter(|v| !v.is_empty()));
    }

    fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("OPENAI_API_KEY") {
            self.model.api_key = Some(v);
        }
        if let Some(v) = lookup("FMP_API_KEY") {
            self.feeds.fmp_api_key = Some(v);
        }
        if let Some(v) = lookup("FRED_API_KEY") {
            self.feeds.fred_api_key = Some(v);
        }
        if let Some(v) = lookup("SCHWAB_APP_KEY") {
            self.feeds.schwab_app_key = Some(v);
        }
        if let Some(v) = lookup("SCHWAB_APP_SECRET") {
            self.feeds.schwab_app_secret = Some(v);
        }
        if let Some(v) = lookup("SCHWAB_REFRESH_TOKEN") {
            self.feeds.schwab_refresh_token = Some(v);
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(provider) = args.provider {
            self.model.provider = provider;
        }
        if let Some(interval) = args.interval {
            self.general.interval_minutes = interval;
        }
        if let Some(ref fixture) = args.fixture {
            self.feeds.source = FeedSource::Fixture;
            self.feeds.fixture = Some(fixture.clone());
        }
        if let Some(ref dir) = args.report_dir {
            self.general.report_dir = dir.clone();
        }
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Names of secrets the selected sources need but do not have.
    pub fn missing_secrets(&self, needs_model: bool) -> Vec<&'static str> {
        let mut missing = Vec::new();

        if needs_model && self.model.provider == ProviderKind::Openai && self.model.api_key.is_none()
        {
            missing.push("OPENAI_API_KEY");
        }

        match self.feeds.source {
            FeedSource::Fixture => {}
            FeedSource::Fmp | FeedSource::Schwab => {
                if self.feeds.fmp_api_key.is_none() {
                    missing.push("FMP_API_KEY");
                }
                if self.feeds.fred_api_key.is_none() {
                    missing.push("FRED_API_KEY");
                }
            }
        }

        if self.feeds.source == FeedSource::Schwab {
            if self.feeds.schwab_app_key.is_none() {
                missing.push("SCHWAB_APP_KEY");
            }
            if self.feeds.schwab_app_secret.is_none() {
                missing.push("SCHWAB_APP_SECRET");
            }
            if self.feeds.schwab_refresh_token.is_none() {
                missing.push("SCHWAB_REFRESH_TOKEN");
            }
        }

        missing
    }

    /// Log a warning for every missing secret.
    pub fn warn_missing_secrets(&self, needs_model: bool) {
        for name in self.missing_secrets(needs_model) {
            warn!("Missing environment variable: {}", name);
        }
    }

    /// Reject values no cycle could run with.
    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        let positive = [
            ("index_move_pct", t.index_move_pct),
            ("sector_rotation_pct", t.sector_rotation_pct),
            ("cpi_surprise_pct", t.cpi_surprise_pct),
            ("jobs_surprise", t.jobs_surprise),
            ("fed_surprise_bps", t.fed_surprise_bps),
            ("vix_spike_pct", t.vix_spike_pct),
            ("realized_vol_multiplier", t.realized_vol_multiplier),
        ];

        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                bail!("Threshold {} must be a positive number, got {}", name, value);
            }
        }

        if self.general.interval_minutes == 0 {
            bail!("Cycle interval must be at least 1 minute");
        }
        if self.general.interval_minutes > MAX_INTERVAL_MINUTES {
            bail!(
                "Cycle interval must be at most {} minutes, got {}",
                MAX_INTERVAL_MINUTES,
                self.general.interval_minutes
            );
        }
        if self.model.timeout_seconds == 0 || self.feeds.timeout_seconds == 0 {
            bail!("Timeouts must be at least 1 second");
        }
        if self.feeds.source == FeedSource::Fixture && self.feeds.fixture.is_none() {
            bail!("Feed source 'fixture' requires a fixture path");
        }

        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> Result<String> {
        let config = Config::default();
        toml::to_string_pretty(&config).context("Failed to serialize default config")
    }
}
