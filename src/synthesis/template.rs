//! Analyst brief templates.
//!
//! The template is the editorial part of the report prompt. The grounded
//! values, context JSON and output contract are always appended by
//! [`super::prompt::build_report_prompt`].

use async_trait::async_trait;
use std::path::PathBuf;

/// Embedded brief used when no template file is configured or readable.
pub const BUILTIN_TEMPLATE: &str = r#"# Sentinel Market Brief

You are Sentinel, a market monitoring analyst writing an intraday special
report for investors.

## What to cover
- The overall direction of the major indices and how broad the move was.
- Which sectors led and which lagged, and whether money appears to be
  rotating between them.
- Any macro-economic release that surprised against its forecast.
- The volatility regime: VIX level and change, realized volatility.

## Style
- Plain English, short sentences, no trading jargon.
- Describe what happened. Do not give investment advice.
- Key drivers are one short sentence each, most important first.
"#;

#[async_trait]
pub trait PromptTemplateSource: Send + Sync {
    /// Current template text.
    async fn template(&self) -> std::io::Result<String>;
}

/// The embedded default brief.
pub struct BuiltinTemplate;

#[async_trait]
impl PromptTemplateSource for BuiltinTemplate {
    async fn template(&self) -> std::io::Result<String> {
        Ok(BUILTIN_TEMPLATE.to_string())
    }
}

/// A brief maintained on disk, re-read every cycle.
pub struct FileTemplate {
    path: PathBuf,
}

impl FileTemplate {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl PromptTemplateSource for FileTemplate {
    async fn template(&self) -> std::io::Result<String> {
        tokio::fs::read_to_string(&self.path).await
    }
}
