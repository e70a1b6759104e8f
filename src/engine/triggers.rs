//! Anomaly detection.
//!
//! Four independent detectors, combined with OR semantics downstream. Each
//! is a pure function of one snapshot and the injected thresholds.

use crate::config::Thresholds;
use crate::models::{AnomalyFlags, MacroStream, MarketIndexPoint, MarketSnapshot, VolatilityData};

/// Evaluates snapshots against a fixed set of thresholds.
#[derive(Debug, Clone)]
pub struct TriggerEngine {
    thresholds: Thresholds,
}

impl TriggerEngine {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    /// Run all four detectors.
    pub fn evaluate(
        &self,
        market: &MarketSnapshot,
        macro_stream: &MacroStream,
        volatility: &VolatilityData,
    ) -> AnomalyFlags {
        AnomalyFlags {
            index_move: self.detect_index_move(market),
            sector_rotation: self.detect_sector_rotation(market),
            macro_surprise: self.detect_macro_surprise(macro_stream),
            vol_spike: detect_vol_spike(volatility),
        }
    }

    /// Any index at or beyond the daily move threshold.
    pub fn detect_index_move(&self, market: &MarketSnapshot) -> bool {
        any_beyond(&market.indices, self.thresholds.index_move_pct)
    }

    /// Any sector at or beyond the rotation threshold.
    pub fn detect_sector_rotation(&self, market: &MarketSnapshot) -> bool {
        any_beyond(&market.sectors, self.thresholds.sector_rotation_pct)
    }

    /// CPI, payrolls and Fed surprises, each checked on its own.
    pub fn detect_macro_surprise(&self, macro_stream: &MacroStream) -> bool {
        let t = &self.thresholds;

        let cpi = macro_stream.latest_cpi.as_ref().is_some_and(|e| {
            match (e.surprise, e.forecast) {
                // Zero forecast would divide by zero; never a trigger.
                (Some(surprise), Some(forecast)) if forecast != 0.0 => {
                    (surprise / forecast).abs() >= t.cpi_surprise_pct
                }
                _ => false,
            }
        });

        let jobs = macro_stream
            .latest_jobs
            .as_ref()
            .and_then(|e| e.surprise)
            .is_some_and(|surprise| surprise.abs() >= t.jobs_surprise);

        let fed = macro_stream
            .latest_fed
            .as_ref()
            .and_then(|e| e.surprise)
            .is_some_and(|surprise| (surprise * 100.0).abs() >= t.fed_surprise_bps);

        cpi || jobs || fed
    }
}

fn any_beyond(points: &[MarketIndexPoint], threshold: f64) -> bool {
    points.iter().any(|p| p.change_pct.abs() >= threshold)
}

/// Forwards the spike flags the volatility feed already computed.
pub fn detect_vol_spike(volatility: &VolatilityData) -> bool {
    volatility.vol_spike || volatility.realized_vol_spike
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MacroEvent, MacroEventKind};
    use chrono::Utc;

    fn engine() -> TriggerEngine {
        TriggerEngine::new(Thresholds::default())
    }

    fn snapshot(indices: &[(&str, f64)], sectors: &[(&str, f64)]) -> MarketSnapshot {
        MarketSnapshot {
            indices: indices
                .iter()
                .map(|(s, c)| MarketIndexPoint::new(*s, *c, None))
                .collect(),
            sectors: sectors
                .iter()
                .map(|(s, c)| MarketIndexPoint::new(*s, *c, None))
                .collect(),
            timestamp: Utc::now(),
        }
    }

    fn stream_with(kind: MacroEventKind, actual: f64, forecast: f64) -> MacroStream {
        let event = MacroEvent::release(kind, "2025-01-10", Some(actual), Some(forecast), None);
        let mut stream = MacroStream {
            events: vec![event.clone()],
            ..Default::default()
        };
        match kind {
            MacroEventKind::Cpi => stream.latest_cpi = Some(event),
            MacroEventKind::Jobs => stream.latest_jobs = Some(event),
            MacroEventKind::Fed => stream.latest_fed = Some(event),
            _ => {}
        }
        stream
    }

    #[test]
    fn test_quiet_session_raises_nothing() {
        let market = snapshot(
            &[("SPY", 0.5), ("QQQ", 0.4), ("IWM", -0.2), ("DIA", 0.1)],
            &[("XLK", 1.9), ("XLE", -1.99)],
        );
        let vol = VolatilityData {
            vix_change_pct: Some(3.0),
            ..Default::default()
        };
        let flags = engine().evaluate(&market, &MacroStream::default(), &vol);
        assert_eq!(flags, AnomalyFlags::default());
    }

    #[test]
    fn test_index_threshold_is_inclusive() {
        let e = engine();
        assert!(e.detect_index_move(&snapshot(&[("SPY", 1.5)], &[])));
        assert!(e.detect_index_move(&snapshot(&[("SPY", -1.5)], &[])));
        assert!(!e.detect_index_move(&snapshot(&[("SPY", 1.49)], &[])));
    }

    #[test]
    fn test_sector_rotation() {
        let e = engine();
        assert!(e.detect_sector_rotation(&snapshot(&[], &[("XLE", -2.5)])));
        assert!(e.detect_sector_rotation(&snapshot(&[], &[("XLK", 2.0)])));
        assert!(!e.detect_sector_rotation(&snapshot(&[("SPY", 3.0)], &[("XLK", 1.0)])));
    }

    #[test]
    fn test_cpi_surprise_relative_to_forecast() {
        let e = engine();
        // 0.5 / 3.0 = 0.1667
        assert!(e.detect_macro_surprise(&stream_with(MacroEventKind::Cpi, 3.5, 3.0)));
        // 0.1 / 3.0 = 0.033
        assert!(!e.detect_macro_surprise(&stream_with(MacroEventKind::Cpi, 3.1, 3.0)));
    }

    #[test]
    fn test_cpi_zero_forecast_never_triggers() {
        let mut event = MacroEvent::release(MacroEventKind::Cpi, "2025-01-10", Some(100.0), Some(0.0), None);
        event.surprise = Some(100.0);
        let stream = MacroStream {
            events: vec![event.clone()],
            latest_cpi: Some(event),
            ..Default::default()
        };
        assert!(!engine().detect_macro_surprise(&stream));

        let mut no_forecast = MacroEvent::release(MacroEventKind::Cpi, "2025-01-10", Some(3.0), None, None);
        no_forecast.surprise = Some(100.0);
        let stream = MacroStream {
            latest_cpi: Some(no_forecast),
            ..Default::default()
        };
        assert!(!engine().detect_macro_surprise(&stream));
    }

    #[test]
    fn test_jobs_surprise_absolute() {
        let e = engine();
        assert!(e.detect_macro_surprise(&stream_with(MacroEventKind::Jobs, 100_000.0, 175_000.0)));
        assert!(!e.detect_macro_surprise(&stream_with(MacroEventKind::Jobs, 150_000.0, 175_000.0)));
    }

    #[test]
    fn test_fed_surprise_in_bps() {
        let e = engine();
        // 0.25 pct point = 25bps
        assert!(e.detect_macro_surprise(&stream_with(MacroEventKind::Fed, 4.5, 4.25)));
        // 0.10 = 10bps
        assert!(!e.detect_macro_surprise(&stream_with(MacroEventKind::Fed, 4.35, 4.25)));
    }

    #[test]
    fn test_vol_spike_forwards_either_flag() {
        assert!(detect_vol_spike(&VolatilityData {
            vol_spike: true,
            ..Default::default()
        }));
        assert!(detect_vol_spike(&VolatilityData {
            realized_vol_spike: true,
            ..Default::default()
        }));
        assert!(!detect_vol_spike(&VolatilityData {
            vix_change_pct: Some(50.0),
            ..Default::default()
        }));
    }

    #[test]
    fn test_injected_thresholds() {
        let e = TriggerEngine::new(Thresholds {
            index_move_pct: 0.3,
            ..Thresholds::default()
        });
        assert!(e.detect_index_move(&snapshot(&[("SPY", 0.5)], &[])));
    }
}
