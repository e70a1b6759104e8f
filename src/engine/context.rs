//! Cycle context assembly.
//!
//! A context is either a baseline (no anomaly fired) or a baseline with a
//! drilldown. Which one is decided by [`assemble`] from the anomaly flags,
//! so a drilldown exists exactly when a flag is set.

use crate::engine::drilldown::drilldown_for;
use crate::models::{AnomalyFlags, MacroStream, MarketDrilldown, MarketSnapshot, VolatilityData};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Facts every cycle has.
#[derive(Debug, Clone, PartialEq)]
pub struct Baseline {
    pub market: MarketSnapshot,
    pub macro_stream: MacroStream,
    pub volatility: VolatilityData,
    pub anomalies: AnomalyFlags,
}

/// The canonical unit handed to synthesis.
#[derive(Debug, Clone, PartialEq)]
pub enum SentinelContext {
    Baseline(Baseline),
    WithDrilldown {
        baseline: Baseline,
        drilldown: MarketDrilldown,
    },
}

impl SentinelContext {
    pub fn baseline(&self) -> &Baseline {
        match self {
            SentinelContext::Baseline(baseline) => baseline,
            SentinelContext::WithDrilldown { baseline, .. } => baseline,
        }
    }

    pub fn drilldown(&self) -> Option<&MarketDrilldown> {
        match self {
            SentinelContext::Baseline(_) => None,
            SentinelContext::WithDrilldown { drilldown, .. } => Some(drilldown),
        }
    }

    pub fn market(&self) -> &MarketSnapshot {
        &self.baseline().market
    }

    pub fn macro_stream(&self) -> &MacroStream {
        &self.baseline().macro_stream
    }

    pub fn volatility(&self) -> &VolatilityData {
        &self.baseline().volatility
    }

    pub fn anomalies(&self) -> &AnomalyFlags {
        &self.baseline().anomalies
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContextView<'a> {
    market: &'a MarketSnapshot,
    #[serde(rename = "macro")]
    macro_stream: &'a MacroStream,
    volatility: &'a VolatilityData,
    anomalies: &'a AnomalyFlags,
    #[serde(skip_serializing_if = "Option::is_none")]
    drilldown: Option<&'a MarketDrilldown>,
}

impl Serialize for SentinelContext {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let baseline = self.baseline();
        ContextView {
            market: &baseline.market,
            macro_stream: &baseline.macro_stream,
            volatility: &baseline.volatility,
            anomalies: &baseline.anomalies,
            drilldown: self.drilldown(),
        }
        .serialize(serializer)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContextData {
    market: MarketSnapshot,
    #[serde(rename = "macro")]
    macro_stream: MacroStream,
    volatility: VolatilityData,
    anomalies: AnomalyFlags,
    #[serde(default)]
    drilldown: Option<MarketDrilldown>,
}

impl<'de> Deserialize<'de> for SentinelContext {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let data = ContextData::deserialize(deserializer)?;
        let baseline = Baseline {
            market: data.market,
            macro_stream: data.macro_stream,
            volatility: data.volatility,
            anomalies: data.anomalies,
        };

        Ok(match data.drilldown {
            Some(drilldown) => SentinelContext::WithDrilldown { baseline, drilldown },
            None => SentinelContext::Baseline(baseline),
        })
    }
}

/// Bundle one cycle's results, running the drilldown when a flag is set.
pub fn assemble(
    market: MarketSnapshot,
    macro_stream: MacroStream,
    volatility: VolatilityData,
    anomalies: AnomalyFlags,
) -> SentinelContext {
    let drilldown = drilldown_for(&anomalies, &market, &macro_stream);
    let baseline = Baseline {
        market,
        macro_stream,
        volatility,
        anomalies,
    };

    match drilldown {
        Some(drilldown) => SentinelContext::WithDrilldown { baseline, drilldown },
        None => SentinelContext::Baseline(baseline),
    }
}

/// All-quiet context stamped with the current time, used before any cycle
/// has completed.
pub fn empty_context() -> SentinelContext {
    SentinelContext::Baseline(Baseline {
        market: MarketSnapshot::empty(),
        macro_stream: MacroStream::default(),
        volatility: VolatilityData::default(),
        anomalies: AnomalyFlags::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MarketIndexPoint;
    use chrono::Utc;

    fn market() -> MarketSnapshot {
        MarketSnapshot {
            indices: vec![MarketIndexPoint::new("SPY", 0.5, Some(600.0))],
            sectors: vec![MarketIndexPoint::new("XLE", -2.5, None)],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_vol_spike_alone_produces_drilldown() {
        let flags = AnomalyFlags {
            vol_spike: true,
            ..Default::default()
        };
        let context = assemble(market(), MacroStream::default(), VolatilityData::default(), flags);
        assert!(context.drilldown().is_some());
    }

    #[test]
    fn test_quiet_flags_produce_baseline() {
        let context = assemble(
            market(),
            MacroStream::default(),
            VolatilityData::default(),
            AnomalyFlags::default(),
        );
        assert!(matches!(context, SentinelContext::Baseline(_)));
        assert!(context.drilldown().is_none());
    }

    #[test]
    fn test_serialized_shape() {
        let baseline = assemble(
            market(),
            MacroStream::default(),
            VolatilityData::default(),
            AnomalyFlags::default(),
        );
        let json = serde_json::to_value(&baseline).unwrap();
        assert!(json.get("macro").is_some());
        assert!(json.get("drilldown").is_none());
        assert_eq!(json["anomalies"]["indexMove"], false);
        assert_eq!(json["market"]["indices"][0]["changePct"], 0.5);

        let flagged = assemble(
            market(),
            MacroStream::default(),
            VolatilityData::default(),
            AnomalyFlags {
                sector_rotation: true,
                ..Default::default()
            },
        );
        let json = serde_json::to_value(&flagged).unwrap();
        assert_eq!(json["drilldown"]["laggingSectors"][0], "XLE");
    }

    #[test]
    fn test_reload_keeps_variant() {
        let flagged = assemble(
            market(),
            MacroStream::default(),
            VolatilityData::default(),
            AnomalyFlags {
                sector_rotation: true,
                ..Default::default()
            },
        );
        let json = serde_json::to_string(&flagged).unwrap();
        let reloaded: SentinelContext = serde_json::from_str(&json).unwrap();
        assert_eq!(reloaded, flagged);

        let quiet = empty_context();
        let json = serde_json::to_string(&quiet).unwrap();
        let reloaded: SentinelContext = serde_json::from_str(&json).unwrap();
        assert!(matches!(reloaded, SentinelContext::Baseline(_)));
    }

    #[test]
    fn test_empty_context() {
        let context = empty_context();
        assert!(!context.anomalies().any());
        assert!(context.market().indices.is_empty());
        assert!(context.macro_stream().events.is_empty());
        assert_eq!(context.volatility().vix, None);
        assert!(context.drilldown().is_none());
    }
}
