//! Prompt construction for both synthesis passes.
//!
//! Every number the model sees comes from the context. Index and sector
//! moves are additionally pre-formatted so the model can copy them verbatim.

use crate::engine::SentinelContext;
use crate::models::{format_signed_pct, SpecialReport};

/// Canonical `SYMBOL: ±X.XX%` lines for every index and sector.
pub fn grounded_values(context: &SentinelContext) -> String {
    let market = context.market();
    let mut block = String::new();

    block.push_str("Indices:\n");
    if market.indices.is_empty() {
        block.push_str("- (none)\n");
    }
    for point in &market.indices {
        block.push_str(&format!("- {}\n", point.grounded()));
    }

    block.push_str("Sectors:\n");
    if market.sectors.is_empty() {
        block.push_str("- (none)\n");
    }
    for point in &market.sectors {
        block.push_str(&format!("- {}\n", point.grounded()));
    }

    let volatility = context.volatility();
    if let (Some(vix), Some(change)) = (volatility.vix, volatility.vix_change_pct) {
        block.push_str(&format!("VIX: {:.2} ({})\n", vix, format_signed_pct(change)));
    }

    block
}

/// The first pass: analyst brief, grounded values, full context, contract.
pub fn build_report_prompt(
    template: &str,
    context: &SentinelContext,
) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string_pretty(context)?;
    let mut prompt = String::new();

    prompt.push_str(template.trim_end());
    prompt.push_str("\n\n---\n\n");

    prompt.push_str("# USE THESE EXACT VALUES\n");
    prompt.push_str("When you mention a move, quote it exactly as written here:\n");
    prompt.push_str(&grounded_values(context));
    prompt.push('\n');

    prompt.push_str("# CONTEXT DATA (JSON)\n");
    prompt.push_str(&json);
    prompt.push_str("\n\n");

    prompt.push_str("# INSTRUCTIONS\n");
    prompt.push_str("Do not invent, estimate or recompute numbers. Every number you write must ");
    prompt.push_str("appear above. If a value is missing or null, say so instead of guessing.\n");
    prompt.push_str("Return ONLY valid JSON with exactly these fields:\n");
    prompt.push_str(r#"{"summary": "...", "keyDrivers": ["..."], "macroContext": "..." or null}"#);
    prompt.push('\n');

    Ok(prompt)
}

/// The second pass: plain-language explanation of a finished report.
pub fn build_what_this_means_prompt(
    report: &SpecialReport,
    context: &SentinelContext,
) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string_pretty(context)?;
    let mut prompt = String::new();

    prompt.push_str("You are explaining today's market report to someone who does not follow ");
    prompt.push_str("markets closely.\n\n");

    prompt.push_str("# REPORT\n");
    prompt.push_str(&format!("Summary: {}\n", report.summary));
    if !report.key_drivers.is_empty() {
        prompt.push_str("Key drivers:\n");
        for driver in &report.key_drivers {
            prompt.push_str(&format!("- {}\n", driver));
        }
    }
    if let Some(ref macro_context) = report.macro_context {
        prompt.push_str(&format!("Macro context: {}\n", macro_context));
    }
    prompt.push('\n');

    prompt.push_str("# USE THESE EXACT VALUES\n");
    prompt.push_str(&grounded_values(context));
    prompt.push('\n');

    prompt.push_str("# CONTEXT DATA (JSON)\n");
    prompt.push_str(&json);
    prompt.push_str("\n\n");

    prompt.push_str("# RULES\n");
    prompt.push_str("- Never state a prediction as fact. Use \"could\", \"may\" or \"might\".\n");
    prompt.push_str("- No jargon. If a term is unavoidable, explain it in a few words.\n");
    prompt.push_str("- No investment advice. Do not tell the reader to buy, sell or hold.\n");
    prompt.push_str("- Only use numbers that appear above.\n\n");

    prompt.push_str("Return ONLY valid JSON with exactly these fields:\n");
    prompt.push_str(r#"{"whatHappened": "...", "whyItMatters": "...", "whatCouldHappenNext": "...", "whatToWatch": ["..."]}"#);
    prompt.push('\n');

    Ok(prompt)
}
