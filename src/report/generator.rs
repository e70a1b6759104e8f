//! Markdown and JSON rendering of a completed cycle.

use crate::cycle::CycleOutcome;
use crate::engine::SentinelContext;
use crate::models::{
    format_signed_pct, AnomalyFlags, MarketDrilldown, MarketIndexPoint, SpecialReport,
    VolatilityData, WhatThisMeans,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// Render a cycle as a Markdown document.
pub fn generate_markdown_report(outcome: &CycleOutcome) -> String {
    let mut output = String::new();
    let context = &outcome.context;

    output.push_str("# Sentinel Special Report\n\n");
    output.push_str(&generate_metadata_section(outcome));
    output.push_str(&generate_summary_section(&outcome.report));

    if let Some(ref wtm) = outcome.report.what_this_means {
        output.push_str(&generate_what_this_means_section(wtm));
    }

    output.push_str(&generate_anomaly_section(context.anomalies()));

    if let Some(drilldown) = context.drilldown() {
        output.push_str(&generate_drilldown_section(drilldown));
    }

    output.push_str(&generate_market_section(context));
    output.push_str(&generate_volatility_section(context.volatility()));
    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(outcome: &CycleOutcome) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Market Snapshot:** {}\n",
        outcome
            .context
            .market()
            .timestamp
            .format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Cycle Duration:** {:.1}s\n",
        outcome.duration.as_secs_f64()
    ));
    section.push('\n');

    section
}

fn generate_summary_section(report: &SpecialReport) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str(report.summary.trim());
    section.push_str("\n\n");

    if !report.key_drivers.is_empty() {
        section.push_str("### Key Drivers\n\n");
        for driver in &report.key_drivers {
            section.push_str(&format!("- {}\n", driver));
        }
        section.push('\n');
    }

    if let Some(ref macro_context) = report.macro_context {
        section.push_str("### Macro Context\n\n");
        section.push_str(macro_context);
        section.push_str("\n\n");
    }

    section
}

fn generate_what_this_means_section(wtm: &WhatThisMeans) -> String {
    let mut section = String::new();

    section.push_str("## What This Means\n\n");
    section.push_str(&format!("**What happened today:** {}\n\n", wtm.what_happened));
    section.push_str(&format!("**Why it matters:** {}\n\n", wtm.why_it_matters));
    section.push_str(&format!(
        "**What could happen next:** {}\n\n",
        wtm.what_could_happen_next
    ));

    if !wtm.what_to_watch.is_empty() {
        section.push_str("**What to watch:**\n\n");
        for item in &wtm.what_to_watch {
            section.push_str(&format!("- {}\n", item));
        }
        section.push('\n');
    }

    section
}

fn flag_cell(raised: bool) -> &'static str {
    if raised {
        "🔴 Yes"
    } else {
        "🟢 No"
    }
}

fn generate_anomaly_section(flags: &AnomalyFlags) -> String {
    let mut section = String::new();

    section.push_str("## Anomalies\n\n");
    section.push_str("| Index Move | Sector Rotation | Macro Surprise | Volatility Spike |\n");
    section.push_str("|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} |\n\n",
        flag_cell(flags.index_move),
        flag_cell(flags.sector_rotation),
        flag_cell(flags.macro_surprise),
        flag_cell(flags.vol_spike),
    ));

    if !flags.any() {
        section.push_str("No anomalies detected this cycle.\n\n");
    }

    section
}

fn symbol_list(symbols: &[String]) -> String {
    if symbols.is_empty() {
        "-".to_string()
    } else {
        symbols.join(", ")
    }
}

fn generate_drilldown_section(drilldown: &MarketDrilldown) -> String {
    let mut section = String::new();

    section.push_str("## Drilldown\n\n");
    section.push_str("| | Leading | Lagging |\n");
    section.push_str("|:---|:---|:---|\n");
    section.push_str(&format!(
        "| Indices | {} | {} |\n",
        symbol_list(&drilldown.leading_indices),
        symbol_list(&drilldown.lagging_indices)
    ));
    section.push_str(&format!(
        "| Sectors | {} | {} |\n\n",
        symbol_list(&drilldown.leading_sectors),
        symbol_list(&drilldown.lagging_sectors)
    ));

    if !drilldown.macro_overlap.is_empty() {
        section.push_str("### Macro Events\n\n");
        section.push_str("| Type | Date | Actual | Forecast | Surprise |\n");
        section.push_str("|:---|:---|---:|---:|---:|\n");
        for event in &drilldown.macro_overlap {
            section.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                event.notes.as_deref().unwrap_or(&event.kind.to_string()),
                event.date,
                optional_number(event.actual),
                optional_number(event.forecast),
                optional_number(event.surprise),
            ));
        }
        section.push('\n');
    }

    section
}

fn optional_number(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{}", v))
}

fn market_rows(section: &mut String, points: &[MarketIndexPoint]) {
    for point in points {
        section.push_str(&format!(
            "| {} | {} | {} |\n",
            point.symbol,
            format_signed_pct(point.change_pct),
            point.price.map_or_else(|| "-".to_string(), |p| format!("{:.2}", p)),
        ));
    }
}

fn generate_market_section(context: &SentinelContext) -> String {
    let market = context.market();
    let mut section = String::new();

    section.push_str("## Market\n\n");

    if !market.indices.is_empty() {
        section.push_str("### Indices\n\n");
        section.push_str("| Symbol | Change | Price |\n");
        section.push_str("|:---|---:|---:|\n");
        market_rows(&mut section, &market.indices);
        section.push('\n');
    }

    if !market.sectors.is_empty() {
        section.push_str("### Sectors\n\n");
        section.push_str("| Symbol | Change | Price |\n");
        section.push_str("|:---|---:|---:|\n");
        market_rows(&mut section, &market.sectors);
        section.push('\n');
    }

    section
}

fn generate_volatility_section(volatility: &VolatilityData) -> String {
    let mut section = String::new();

    section.push_str("## Volatility\n\n");

    let vix = match (volatility.vix, volatility.vix_change_pct) {
        (Some(level), Some(change)) => format!("{:.2} ({})", level, format_signed_pct(change)),
        (Some(level), None) => format!("{:.2}", level),
        _ => "n/a".to_string(),
    };
    let realized = match (volatility.realized_vol, volatility.realized_vol_prev) {
        (Some(now), Some(prev)) => format!("{:.4} (prior window {:.4})", now, prev),
        (Some(now), None) => format!("{:.4}", now),
        _ => "n/a".to_string(),
    };

    section.push_str(&format!("- **VIX:** {}\n", vix));
    section.push_str(&format!("- **Realized Volatility:** {}\n\n", realized));

    section
}

fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str("*Report generated by Sentinel. Not investment advice.*\n");

    footer
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonReport<'a> {
    generated_at: DateTime<Utc>,
    duration_seconds: f64,
    report: &'a SpecialReport,
    context: &'a SentinelContext,
}

/// Render a cycle as pretty JSON.
pub fn generate_json_report(outcome: &CycleOutcome) -> Result<String> {
    let view = JsonReport {
        generated_at: Utc::now(),
        duration_seconds: outcome.duration.as_secs_f64(),
        report: &outcome.report,
        context: &outcome.context,
    };
    serde_json::to_string_pretty(&view).map_err(Into::into)
}

/// Write rendered output to `path`.
pub fn write_output(content: &str, path: &Path) -> Result<()> {
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}
