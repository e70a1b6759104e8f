//! Drilldown of market anomalies.
//!
//! Only computed when at least one anomaly flag is set.

use crate::models::{AnomalyFlags, MacroEvent, MacroStream, MarketDrilldown, MarketIndexPoint, MarketSnapshot};

const TOP_MOVERS: usize = 3;
const MACRO_OVERLAP: usize = 5;

/// Symbols that moved the most positively.
///
/// Stable: ties keep their input order. The input is not touched.
pub fn leaders(items: &[MarketIndexPoint]) -> Vec<String> {
    let mut sorted: Vec<&MarketIndexPoint> = items.iter().collect();
    sorted.sort_by(|a, b| b.change_pct.total_cmp(&a.change_pct));
    top_symbols(&sorted)
}

/// Symbols that moved the most negatively.
pub fn laggards(items: &[MarketIndexPoint]) -> Vec<String> {
    let mut sorted: Vec<&MarketIndexPoint> = items.iter().collect();
    sorted.sort_by(|a, b| a.change_pct.total_cmp(&b.change_pct));
    top_symbols(&sorted)
}

fn top_symbols(sorted: &[&MarketIndexPoint]) -> Vec<String> {
    sorted
        .iter()
        .take(TOP_MOVERS)
        .map(|p| p.symbol.clone())
        .collect()
}

/// Leading entries of the macro stream.
///
/// Plain truncation, not a date window.
pub fn macro_overlap(macro_stream: &MacroStream) -> Vec<MacroEvent> {
    macro_stream.events.iter().take(MACRO_OVERLAP).cloned().collect()
}

/// Build the drilldown unconditionally.
pub fn run_drilldown(market: &MarketSnapshot, macro_stream: &MacroStream) -> MarketDrilldown {
    MarketDrilldown {
        leading_indices: leaders(&market.indices),
        lagging_indices: laggards(&market.indices),
        leading_sectors: leaders(&market.sectors),
        lagging_sectors: laggards(&market.sectors),
        macro_overlap: macro_overlap(macro_stream),
    }
}

/// Build the drilldown when any flag is set, otherwise `None`.
pub fn drilldown_for(
    anomalies: &AnomalyFlags,
    market: &MarketSnapshot,
    macro_stream: &MacroStream,
) -> Option<MarketDrilldown> {
    anomalies
        .any()
        .then(|| run_drilldown(market, macro_stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MacroEventKind;
    use chrono::Utc;

    fn points(items: &[(&str, f64)]) -> Vec<MarketIndexPoint> {
        items
            .iter()
            .map(|(s, c)| MarketIndexPoint::new(*s, *c, None))
            .collect()
    }

    #[test]
    fn test_leaders_and_laggards_order() {
        let items = points(&[("A", 1.0), ("B", -2.0), ("C", 3.0), ("D", 0.5), ("E", -0.1)]);
        assert_eq!(leaders(&items), vec!["C", "A", "D"]);
        assert_eq!(laggards(&items), vec!["B", "E", "D"]);
    }

    #[test]
    fn test_input_is_not_mutated_and_calls_are_idempotent() {
        let items = points(&[("A", 1.0), ("B", -2.0), ("C", 3.0)]);
        let before = items.clone();

        let first = leaders(&items);
        let second = leaders(&items);

        assert_eq!(items, before);
        assert_eq!(first, second);
        assert_eq!(laggards(&items), laggards(&items));
    }

    #[test]
    fn test_nan_change_does_not_disturb_order() {
        let items = points(&[("A", 1.0), ("B", f64::NAN), ("C", -2.0), ("D", 0.5), ("E", -0.1)]);
        assert_eq!(laggards(&items), vec!["C", "E", "D"]);

        let top = leaders(&items);
        assert_eq!(top.len(), 3);
        assert_eq!(top[1..], ["A", "D"]);
    }

    #[test]
    fn test_short_inputs_return_min_three_n() {
        assert!(leaders(&[]).is_empty());
        assert_eq!(leaders(&points(&[("A", 1.0)])), vec!["A"]);
        assert_eq!(laggards(&points(&[("A", 1.0), ("B", 2.0)])), vec!["A", "B"]);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let items = points(&[("A", 1.0), ("B", 1.0), ("C", 1.0), ("D", 1.0)]);
        assert_eq!(leaders(&items), vec!["A", "B", "C"]);
        assert_eq!(laggards(&items), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_macro_overlap_truncates_to_five() {
        let events = (0..8)
            .map(|i| MacroEvent::release(MacroEventKind::Other, format!("2025-01-0{}", i + 1), None, None, None))
            .collect::<Vec<_>>();
        let stream = MacroStream {
            events: events.clone(),
            ..Default::default()
        };
        assert_eq!(macro_overlap(&stream), events[..5].to_vec());
    }

    #[test]
    fn test_drilldown_gated_by_flags() {
        let market = MarketSnapshot {
            indices: points(&[("SPY", 0.2)]),
            sectors: points(&[("XLE", -2.5), ("XLK", 0.4)]),
            timestamp: Utc::now(),
        };
        let stream = MacroStream::default();

        assert!(drilldown_for(&AnomalyFlags::default(), &market, &stream).is_none());

        let flags = AnomalyFlags {
            sector_rotation: true,
            ..Default::default()
        };
        let drilldown = drilldown_for(&flags, &market, &stream).unwrap();
        assert_eq!(drilldown.lagging_sectors[0], "XLE");
        assert_eq!(drilldown.leading_sectors[0], "XLK");
    }
}
