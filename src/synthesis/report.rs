//! Lenient decoding of model output into reports.
//!
//! Neither decoder can fail. The report decoder falls back to the raw text as
//! a whole; the explanation decoder falls back one field at a time.

use crate::models::{SpecialReport, WhatThisMeans};
use serde_json::Value;

pub const DEFAULT_WHAT_HAPPENED: &str =
    "Markets traded within recent ranges with mixed sector performance.";

pub const DEFAULT_WHY_IT_MATTERS: &str = "The market is in a relatively balanced state. No major \
anomalies detected, which suggests normal trading conditions without extreme positioning.";

pub const DEFAULT_WHAT_COULD_HAPPEN_NEXT: &str = "With no extreme signals, the near-term path \
depends on upcoming economic data and company earnings. Markets could drift in either direction.";

pub const DEFAULT_WHAT_TO_WATCH: [&str; 2] = [
    "Any uptick in volatility or signs of changing sentiment",
    "Overnight futures and international market reaction",
];

/// Strip a surrounding markdown code fence, if the model added one.
fn unfence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening line.
    match body.find('\n') {
        Some(newline) => body[newline + 1..].trim(),
        None => body.trim(),
    }
}

fn decode_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    match serde_json::from_str::<Value>(unfence(text)) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    let items = value?.as_array()?;
    let list: Vec<String> = items
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    (!list.is_empty()).then_some(list)
}

/// Decode the first pass. Anything but a JSON object yields
/// [`SpecialReport::fallback`] over the raw text.
pub fn parse_special_report(text: &str) -> Option<SpecialReport> {
    let map = decode_object(text)?;

    Some(SpecialReport {
        summary: non_empty_str(map.get("summary")).unwrap_or_else(|| text.to_string()),
        key_drivers: string_list(map.get("keyDrivers")).unwrap_or_default(),
        macro_context: non_empty_str(map.get("macroContext")),
        what_this_means: None,
    })
}

/// Decode the second pass, defaulting each missing or malformed field.
pub fn parse_what_this_means(text: &str) -> WhatThisMeans {
    let map = decode_object(text).unwrap_or_default();

    WhatThisMeans {
        what_happened: non_empty_str(map.get("whatHappened"))
            .unwrap_or_else(|| DEFAULT_WHAT_HAPPENED.to_string()),
        why_it_matters: non_empty_str(map.get("whyItMatters"))
            .unwrap_or_else(|| DEFAULT_WHY_IT_MATTERS.to_string()),
        what_could_happen_next: non_empty_str(map.get("whatCouldHappenNext"))
            .unwrap_or_else(|| DEFAULT_WHAT_COULD_HAPPEN_NEXT.to_string()),
        what_to_watch: string_list(map.get("whatToWatch"))
            .unwrap_or_else(default_what_to_watch),
    }
}

pub fn default_what_to_watch() -> Vec<String> {
    DEFAULT_WHAT_TO_WATCH.iter().map(|s| s.to_string()).collect()
}

/// The explanation used when the second pass could not run at all.
pub fn default_what_this_means() -> WhatThisMeans {
    parse_what_this_means("")
}
