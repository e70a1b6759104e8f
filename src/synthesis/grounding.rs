//! Post-hoc check that model prose only reuses numbers it was given.
//!
//! Signs are ignored ("fell 2.50%" grounds -2.5) and a token matches a source
//! value when it equals that value rounded to the token's own precision.

use serde_json::Value;

/// A number as written in text.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericToken {
    pub text: String,
    pub value: f64,
    pub decimals: usize,
}

/// Small counts ("top 3", "two of 5 sectors") are not claims about data.
const SMALL_INTEGER: f64 = 10.0;

/// Extract every numeric token from `text`.
pub fn numeric_tokens(text: &str) -> Vec<NumericToken> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if !chars[i].is_ascii_digit() {
            i += 1;
            continue;
        }

        let start = i;
        let mut raw = String::new();
        let mut decimals = None;

        while i < chars.len() {
            let c = chars[i];
            let next_is_digit = chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
            if c.is_ascii_digit() {
                raw.push(c);
                if let Some(d) = decimals.as_mut() {
                    *d += 1;
                }
            } else if c == '.' && decimals.is_none() && next_is_digit {
                raw.push(c);
                decimals = Some(0);
            } else if c == ',' && decimals.is_none() && next_is_digit {
                // Thousands separator.
            } else {
                break;
            }
            i += 1;
        }

        if let Ok(value) = raw.parse::<f64>() {
            tokens.push(NumericToken {
                text: chars[start..i].iter().collect(),
                value,
                decimals: decimals.unwrap_or(0),
            });
        }
    }

    tokens
}

/// Every number in a JSON document, including those embedded in strings
/// such as dates and event names.
pub fn collect_numbers(value: &Value, out: &mut Vec<f64>) {
    match value {
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                out.push(f);
            }
        }
        Value::String(s) => out.extend(numeric_tokens(s).into_iter().map(|t| t.value)),
        Value::Array(items) => items.iter().for_each(|item| collect_numbers(item, out)),
        Value::Object(map) => map.values().for_each(|item| collect_numbers(item, out)),
        Value::Bool(_) | Value::Null => {}
    }
}

fn matches(token: &NumericToken, source: f64) -> bool {
    let tolerance = 0.5 * 10f64.powi(-(token.decimals as i32)) + 1e-9;
    (source.abs() - token.value).abs() <= tolerance
}

/// Tokens in `text` that match none of the `injected` values.
pub fn audit(text: &str, injected: &[f64]) -> Vec<String> {
    numeric_tokens(text)
        .into_iter()
        .filter(|token| !(token.decimals == 0 && token.value <= SMALL_INTEGER))
        .filter(|token| !injected.iter().any(|&source| matches(token, source)))
        .map(|token| token.text)
        .collect()
}
