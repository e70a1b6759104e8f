//! Sentinel - market anomaly monitor
//!
//! Runs a periodic cycle that fetches market, macro and volatility feeds,
//! flags anomalies against configured thresholds and synthesizes a grounded
//! narrative report with a language model.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (config, feed failure, store failure, etc.)

mod cli;
mod config;
mod cycle;
mod engine;
mod error;
mod feeds;
mod llm;
mod models;
mod report;
mod store;
mod synthesis;

use anyhow::{Context, Result};
use cli::{Args, OutputFormat};
use config::Config;
use cycle::{CycleOutcome, SentinelCycle};
use engine::TriggerEngine;
use feeds::Feeds;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use store::{FileReportStore, MemoryReportStore, ReportStore};
use synthesis::NarrativeSynthesizer;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    if let Err(e) = init_logging(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    info!("Sentinel v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Sentinel failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .sentinel.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(config::DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  .sentinel.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml()?;
    std::fs::write(path, &content).context("Failed to write .sentinel.toml")?;

    println!("✅ Created .sentinel.toml with default settings.");
    println!("   Edit it to customize thresholds, feeds and the model.");
    println!("   API keys are read from the environment, never from this file.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) -> Result<()> {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

async fn run(args: Args) -> Result<()> {
    let mut config = load_config(&args)?;
    config.apply_env();
    config.merge_with_args(&args);
    config.validate()?;
    config.warn_missing_secrets(args.needs_model());

    let feeds = Feeds::from_config(&config)?;
    let engine = TriggerEngine::new(config.thresholds.clone());
    let feed_timeout = Duration::from_secs(config.feeds.timeout_seconds);

    if args.dry_run {
        return handle_dry_run(&feeds, &engine, feed_timeout).await;
    }

    let provider = llm::provider_from_config(&config.model)?;
    let synthesizer = NarrativeSynthesizer::from_config(&config, provider);
    let (store, store_label): (Arc<dyn ReportStore>, String) = if args.no_persist {
        (Arc::new(MemoryReportStore::new()), "in memory only".to_string())
    } else {
        let file_store = FileReportStore::new(config.general.report_dir.clone());
        let label = file_store.dir().display().to_string();
        (Arc::new(file_store), label)
    };
    let cycle = SentinelCycle::new(feeds, engine, feed_timeout, synthesizer, store);

    if !args.quiet {
        println!("🛰️  Sentinel");
        println!("   Feeds: {:?}", config.feeds.source);
        println!("   Model: {} ({:?})", config.model.name, config.model.provider);
        println!("   Reports: {}", store_label);
    }

    if args.watch {
        run_watch_mode(&cycle, &config, args.quiet).await;
        return Ok(());
    }

    let spinner = (!args.quiet).then(|| cycle_spinner("Running sentinel cycle..."));
    let result = cycle.run().await;
    if let Some(ref pb) = spinner {
        pb.finish_and_clear();
    }

    let outcome = result?;

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&outcome)?,
        OutputFormat::Markdown => report::generate_markdown_report(&outcome),
    };
    report::write_output(&output, &args.output)?;

    if !args.quiet {
        print_outcome(&outcome);
        println!("\n✅ Cycle complete! Report saved to: {}", args.output.display());
    }

    Ok(())
}

async fn run_watch_mode(cycle: &SentinelCycle, config: &Config, quiet: bool) {
    let minutes = config.general.interval_minutes;
    if !quiet {
        println!("\n⏱️  Watching every {} minute(s). Press Ctrl-C to stop.", minutes);
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let summary = cycle::run_watch(
        cycle,
        config.general.cycle_interval(),
        shutdown,
        |outcome| {
            if !quiet {
                print_outcome(outcome);
            }
        },
    )
    .await;

    if !quiet {
        println!(
            "\n👋 Stopped. {} cycle(s) completed, {} failed.",
            summary.completed, summary.failed
        );
    }
}

/// Handle --dry-run: build the context, print it, skip the model.
async fn handle_dry_run(feeds: &Feeds, engine: &TriggerEngine, feed_timeout: Duration) -> Result<()> {
    println!("\n🔍 Dry run: fetching feeds and detecting anomalies (no model call)...\n");

    let context = cycle::build_context(feeds, engine, feed_timeout).await?;
    let json = serde_json::to_string_pretty(&context).context("Failed to serialize context")?;

    println!("{}", json);
    println!("\n{}", synthesis::prompt::grounded_values(&context));
    println!("✅ Dry run complete. No model calls were made.");
    Ok(())
}

fn cycle_spinner(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed}] {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn print_outcome(outcome: &CycleOutcome) {
    let flags = outcome.context.anomalies();
    let raised = flags.raised();

    println!("\n📊 Cycle Summary:");
    if raised.is_empty() {
        println!("   Anomalies: none");
    } else {
        println!("   Anomalies: {}", raised.join(", "));
    }
    if let Some(drilldown) = outcome.context.drilldown() {
        println!(
            "   Leading sectors: {} | Lagging sectors: {}",
            drilldown.leading_sectors.join(", "),
            drilldown.lagging_sectors.join(", ")
        );
    }
    println!("   Summary: {}", outcome.report.summary);
    println!("   Duration: {:.1}s", outcome.duration.as_secs_f64());
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", config::DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
