//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::config::ProviderKind;
use clap::Parser;
use std::path::PathBuf;

/// Sentinel - market anomaly monitor with grounded narrative reports
///
/// Fetches market, macro and volatility feeds, flags anomalies against
/// configured thresholds and asks a language model to explain the session
/// using only the numbers it was given.
///
/// Examples:
///   sentinel
///   sentinel --watch --interval 15
///   sentinel --fixture fixtures/sector_rotation.json --dry-run
///   sentinel --provider ollama --model llama3.2:latest --format json
///   sentinel --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .sentinel.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Model name, overriding the config file
    #[arg(short, long, env = "SENTINEL_MODEL")]
    pub model: Option<String>,

    /// Model provider (openai, ollama)
    #[arg(long, value_name = "PROVIDER")]
    pub provider: Option<ProviderKind>,

    /// Minutes between cycles in watch mode
    #[arg(short, long, value_name = "MINUTES")]
    pub interval: Option<u64>,

    /// Serve all feeds from a JSON fixture instead of live APIs
    #[arg(long, value_name = "FILE")]
    pub fixture: Option<PathBuf>,

    /// Directory for persisted reports
    #[arg(long, value_name = "DIR", env = "SENTINEL_REPORT_DIR")]
    pub report_dir: Option<PathBuf>,

    /// Keep reports in memory instead of writing them to the report directory
    #[arg(long)]
    pub no_persist: bool,

    /// Output file for the rendered report (one-shot mode)
    #[arg(
        short,
        long,
        default_value = "sentinel_report.md",
        value_name = "FILE"
    )]
    pub output: PathBuf,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Keep running a cycle every interval until Ctrl-C
    #[arg(short, long)]
    pub watch: bool,

    /// Dry run: fetch and detect, print the context, skip the model
    #[arg(long, conflicts_with = "watch")]
    pub dry_run: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .sentinel.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.interval == Some(0) {
            return Err("Interval must be at least 1 minute".to_string());
        }

        if let Some(ref fixture) = self.fixture {
            if !fixture.is_file() {
                return Err(format!("Fixture file does not exist: {}", fixture.display()));
            }
        }

        if let Some(ref model) = self.model {
            if model.trim().is_empty() {
                return Err("Model name cannot be empty".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Whether this run calls the language model.
    pub fn needs_model(&self) -> bool {
        !self.dry_run
    }
}
