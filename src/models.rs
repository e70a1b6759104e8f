//! Data models for the sentinel cycle.
//!
//! This module contains the snapshots produced by the feeds, the anomaly
//! flags and drilldown derived from them, and the reports produced by
//! synthesis. Field names serialize in camelCase because the serialized
//! context is embedded verbatim into model prompts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Performance of one index or sector ETF for the current session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketIndexPoint {
    /// Upper-cased ticker symbol.
    pub symbol: String,
    /// Signed daily change in percent.
    pub change_pct: f64,
    /// Last price, when the feed supplied one.
    pub price: Option<f64>,
}

impl MarketIndexPoint {
    pub fn new(symbol: impl Into<String>, change_pct: f64, price: Option<f64>) -> Self {
        Self {
            symbol: symbol.into().to_uppercase(),
            change_pct,
            price,
        }
    }

    /// Canonical grounded form, e.g. `SPY: +0.50%`.
    pub fn grounded(&self) -> String {
        format!("{}: {}", self.symbol, format_signed_pct(self.change_pct))
    }
}

/// Formats a percentage with an explicit sign and two decimals.
pub fn format_signed_pct(value: f64) -> String {
    if value >= 0.0 {
        format!("+{:.2}%", value)
    } else {
        format!("{:.2}%", value)
    }
}

/// Snapshot of overall market conditions for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    pub indices: Vec<MarketIndexPoint>,
    pub sectors: Vec<MarketIndexPoint>,
    pub timestamp: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn empty() -> Self {
        Self {
            indices: Vec::new(),
            sectors: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

/// Kind of macro-economic release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MacroEventKind {
    Cpi,
    Jobs,
    Fed,
    Pce,
    Gdp,
    Other,
}

impl fmt::Display for MacroEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MacroEventKind::Cpi => write!(f, "CPI"),
            MacroEventKind::Jobs => write!(f, "JOBS"),
            MacroEventKind::Fed => write!(f, "FED"),
            MacroEventKind::Pce => write!(f, "PCE"),
            MacroEventKind::Gdp => write!(f, "GDP"),
            MacroEventKind::Other => write!(f, "OTHER"),
        }
    }
}

/// A single macro-economic release such as CPI, payrolls or an FOMC decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroEvent {
    #[serde(rename = "type")]
    pub kind: MacroEventKind,
    pub date: String,
    pub actual: Option<f64>,
    pub forecast: Option<f64>,
    pub previous: Option<f64>,
    /// `actual - forecast`, only when both are present.
    pub surprise: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl MacroEvent {
    /// Builds a release, deriving the surprise from actual and forecast.
    pub fn release(
        kind: MacroEventKind,
        date: impl Into<String>,
        actual: Option<f64>,
        forecast: Option<f64>,
        previous: Option<f64>,
    ) -> Self {
        let surprise = match (actual, forecast) {
            (Some(a), Some(f)) => Some(a - f),
            _ => None,
        };

        Self {
            kind,
            date: date.into(),
            actual,
            forecast,
            previous,
            surprise,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// The macro event stream with shortcuts to the latest typed releases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroStream {
    pub events: Vec<MacroEvent>,
    #[serde(default, rename = "latestCPI", skip_serializing_if = "Option::is_none")]
    pub latest_cpi: Option<MacroEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_jobs: Option<MacroEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_fed: Option<MacroEvent>,
}

/// Volatility and regime indicators.
///
/// The two spike flags are computed by the volatility feed; detection only
/// forwards them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VolatilityData {
    pub vix: Option<f64>,
    pub vix_change_pct: Option<f64>,
    pub realized_vol: Option<f64>,
    pub realized_vol_prev: Option<f64>,
    pub vol_spike: bool,
    pub realized_vol_spike: bool,
}

/// Anomaly detection results for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyFlags {
    pub index_move: bool,
    pub sector_rotation: bool,
    pub macro_surprise: bool,
    pub vol_spike: bool,
}

impl AnomalyFlags {
    /// True when at least one detector fired.
    pub fn any(&self) -> bool {
        self.index_move || self.sector_rotation || self.macro_surprise || self.vol_spike
    }

    /// Names of the detectors that fired, for logging.
    pub fn raised(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.index_move {
            names.push("index_move");
        }
        if self.sector_rotation {
            names.push("sector_rotation");
        }
        if self.macro_surprise {
            names.push("macro_surprise");
        }
        if self.vol_spike {
            names.push("vol_spike");
        }
        names
    }
}

/// Leaders, laggards and overlapping macro events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDrilldown {
    pub leading_indices: Vec<String>,
    pub lagging_indices: Vec<String>,
    pub leading_sectors: Vec<String>,
    pub lagging_sectors: Vec<String>,
    pub macro_overlap: Vec<MacroEvent>,
}

/// Plain-language explanation produced by the second synthesis pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatThisMeans {
    pub what_happened: String,
    pub why_it_matters: String,
    pub what_could_happen_next: String,
    pub what_to_watch: Vec<String>,
}

/// The model-produced market report. Always well-formed, even when the
/// model's output could not be parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialReport {
    pub summary: String,
    pub key_drivers: Vec<String>,
    pub macro_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub what_this_means: Option<WhatThisMeans>,
}

impl SpecialReport {
    /// Report built from unparseable model text.
    pub fn fallback(raw: &str) -> Self {
        Self {
            summary: raw.to_string(),
            key_drivers: Vec::new(),
            macro_context: None,
            what_this_means: None,
        }
    }
}
