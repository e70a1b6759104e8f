//! Narrative synthesis.
//!
//! Turns an assembled context into a [`SpecialReport`] with two sequential
//! model calls. Nothing in this module returns an error: template, model and
//! decoding failures are all logged and replaced by fallbacks.

pub mod grounding;
pub mod prompt;
pub mod report;
pub mod template;

use crate::config::{Config, GroundingCheck};
use crate::engine::SentinelContext;
use crate::error::LlmError;
use crate::llm::{LlmOptions, LlmProvider};
use crate::models::{SpecialReport, WhatThisMeans};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use template::{BuiltinTemplate, FileTemplate, PromptTemplateSource, BUILTIN_TEMPLATE};

pub struct NarrativeSynthesizer {
    llm: Arc<dyn LlmProvider>,
    options: LlmOptions,
    template: Arc<dyn PromptTemplateSource>,
    grounding: GroundingCheck,
    timeout: Duration,
}

impl NarrativeSynthesizer {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        options: LlmOptions,
        template: Arc<dyn PromptTemplateSource>,
        grounding: GroundingCheck,
        timeout: Duration,
    ) -> Self {
        Self {
            llm,
            options,
            template,
            grounding,
            timeout,
        }
    }

    /// Build a synthesizer from configuration around an existing provider.
    pub fn from_config(config: &Config, llm: Arc<dyn LlmProvider>) -> Self {
        let template: Arc<dyn PromptTemplateSource> = match config.synthesis.prompt_template {
            Some(ref path) => Arc::new(FileTemplate::new(path.clone())),
            None => Arc::new(BuiltinTemplate),
        };

        Self::new(
            llm,
            LlmOptions::from(&config.model),
            template,
            config.synthesis.grounding_check,
            Duration::from_secs(config.model.timeout_seconds),
        )
    }

    /// Run both passes and attach the explanation to the report.
    pub async fn synthesize(&self, context: &SentinelContext) -> SpecialReport {
        let mut report = self.generate_special_report(context).await;
        report.what_this_means = Some(self.generate_what_this_means(&report, context).await);

        if self.grounding == GroundingCheck::Warn {
            self.audit(&report, context);
        }

        report
    }

    /// First pass: summary, key drivers and macro context.
    pub async fn generate_special_report(&self, context: &SentinelContext) -> SpecialReport {
        let template = self.load_template().await;

        let prompt = match prompt::build_report_prompt(&template, context) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!("Could not serialize context for the report prompt: {}", e);
                return unavailable_report(context, &e.to_string());
            }
        };

        let text = match self.complete(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Report synthesis failed, using fallback: {}", e);
                return unavailable_report(context, &e.to_string());
            }
        };

        report::parse_special_report(&text).unwrap_or_else(|| {
            warn!("Model output was not a JSON object, keeping raw text as summary");
            SpecialReport::fallback(&text)
        })
    }

    /// Second pass: plain-language explanation of `report`.
    pub async fn generate_what_this_means(
        &self,
        report: &SpecialReport,
        context: &SentinelContext,
    ) -> WhatThisMeans {
        let prompt = match prompt::build_what_this_means_prompt(report, context) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!("Could not serialize context for the explanation prompt: {}", e);
                return report::default_what_this_means();
            }
        };

        match self.complete(&prompt).await {
            Ok(text) => report::parse_what_this_means(&text),
            Err(e) => {
                warn!("Explanation synthesis failed, using defaults: {}", e);
                report::default_what_this_means()
            }
        }
    }

    async fn load_template(&self) -> String {
        match self.template.template().await {
            Ok(text) => text,
            Err(e) => {
                warn!("Prompt template unavailable ({}), using builtin brief", e);
                BUILTIN_TEMPLATE.to_string()
            }
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        debug!("Prompt is {} chars", prompt.len());
        tokio::time::timeout(self.timeout, self.llm.complete(prompt, &self.options))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout.as_secs()))?
    }

    fn audit(&self, report: &SpecialReport, context: &SentinelContext) {
        let injected = match serde_json::to_value(context) {
            Ok(doc) => {
                let mut numbers = Vec::new();
                grounding::collect_numbers(&doc, &mut numbers);
                numbers
            }
            Err(_) => return,
        };

        let text = audited_text(report);
        let ungrounded = grounding::audit(&text, &injected);
        if ungrounded.is_empty() {
            info!("All numbers in the report trace back to the context");
        } else {
            warn!(
                "Report mentions numbers not present in the context: {}",
                ungrounded.join(", ")
            );
        }
    }
}

/// Every model-written field of a report, one per line.
fn audited_text(report: &SpecialReport) -> String {
    let mut text = report.summary.clone();
    for driver in &report.key_drivers {
        text.push('\n');
        text.push_str(driver);
    }
    if let Some(ref macro_context) = report.macro_context {
        text.push('\n');
        text.push_str(macro_context);
    }
    if let Some(ref meaning) = report.what_this_means {
        for field in [
            &meaning.what_happened,
            &meaning.why_it_matters,
            &meaning.what_could_happen_next,
        ] {
            text.push('\n');
            text.push_str(field);
        }
        for item in &meaning.what_to_watch {
            text.push('\n');
            text.push_str(item);
        }
    }
    text
}

/// Report used when the model could not be reached at all. Only carries
/// pre-formatted context values.
fn unavailable_report(context: &SentinelContext, reason: &str) -> SpecialReport {
    let moves: Vec<String> = context
        .market()
        .indices
        .iter()
        .map(|point| point.grounded())
        .collect();

    let summary = if moves.is_empty() {
        format!("Narrative unavailable ({}).", reason)
    } else {
        format!("Narrative unavailable ({}). Index moves: {}.", reason, moves.join(", "))
    };

    SpecialReport {
        summary,
        key_drivers: context
            .anomalies()
            .raised()
            .into_iter()
            .map(|name| format!("Anomaly detected: {}", name))
            .collect(),
        macro_context: None,
        what_this_means: None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::engine::assemble;
    use crate::models::{AnomalyFlags, MacroStream, MarketIndexPoint, MarketSnapshot, VolatilityData};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    /// Scripted provider that records prompts.
    pub(crate) struct ScriptedLlm {
        replies: Mutex<Vec<Result<String, LlmError>>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        pub(crate) fn new(replies: Vec<Result<String, LlmError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn replying(replies: &[&str]) -> Self {
            Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        async fn complete(&self, prompt: &str, _opts: &LlmOptions) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Ok(String::new())
            } else {
                replies.remove(0)
            }
        }
    }

    struct SlowLlm;

    #[async_trait]
    impl LlmProvider for SlowLlm {
        async fn complete(&self, _prompt: &str, _opts: &LlmOptions) -> Result<String, LlmError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }
    }

    pub(crate) fn synthesizer(llm: Arc<dyn LlmProvider>) -> NarrativeSynthesizer {
        NarrativeSynthesizer::new(
            llm,
            LlmOptions {
                model: "test-model".to_string(),
                reasoning_effort: None,
                verbosity: None,
            },
            Arc::new(BuiltinTemplate),
            GroundingCheck::Warn,
            Duration::from_secs(2),
        )
    }

    fn context() -> SentinelContext {
        let market = MarketSnapshot {
            indices: vec![MarketIndexPoint::new("SPY", 0.5, Some(600.0))],
            sectors: vec![MarketIndexPoint::new("XLE", -2.5, None)],
            timestamp: Utc::now(),
        };
        let flags = AnomalyFlags {
            sector_rotation: true,
            ..Default::default()
        };
        assemble(market, MacroStream::default(), VolatilityData::default(), flags)
    }

    #[tokio::test]
    async fn test_not_json_falls_back_to_raw_text() {
        let llm = Arc::new(ScriptedLlm::replying(&["not json"]));
        let report = synthesizer(llm).generate_special_report(&context()).await;

        assert_eq!(report, SpecialReport::fallback("not json"));
        assert_eq!(report.summary, "not json");
        assert!(report.key_drivers.is_empty());
        assert_eq!(report.macro_context, None);
    }

    #[tokio::test]
    async fn test_two_passes_run_in_order() {
        let llm = Arc::new(ScriptedLlm::replying(&[
            r#"{"summary": "Energy lagged.", "keyDrivers": ["XLE: -2.50%"], "macroContext": null}"#,
            r#"{"whatHappened": "Oil stocks fell.", "whatToWatch": ["Oil prices"]}"#,
        ]));
        let report = synthesizer(llm.clone()).synthesize(&context()).await;

        assert_eq!(report.summary, "Energy lagged.");
        let wtm = report.what_this_means.unwrap();
        assert_eq!(wtm.what_happened, "Oil stocks fell.");
        assert_eq!(wtm.why_it_matters, report::DEFAULT_WHY_IT_MATTERS);
        assert_eq!(wtm.what_to_watch, vec!["Oil prices"]);

        let prompts = llm.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("# USE THESE EXACT VALUES"));
        assert!(prompts[1].contains("Summary: Energy lagged."));
    }

    #[tokio::test]
    async fn test_model_error_is_recovered() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Err(LlmError::Decode("boom".to_string())),
            Err(LlmError::Decode("boom".to_string())),
        ]));
        let report = synthesizer(llm).synthesize(&context()).await;

        assert!(report.summary.starts_with("Narrative unavailable"));
        assert!(report.summary.contains("SPY: +0.50%"));
        assert_eq!(report.key_drivers, vec!["Anomaly detected: sector_rotation"]);
        assert_eq!(report.what_this_means, Some(report::default_what_this_means()));
    }

    #[tokio::test]
    async fn test_model_timeout_is_recovered() {
        let synth = NarrativeSynthesizer::new(
            Arc::new(SlowLlm),
            LlmOptions {
                model: "slow".to_string(),
                reasoning_effort: None,
                verbosity: None,
            },
            Arc::new(BuiltinTemplate),
            GroundingCheck::Off,
            Duration::from_millis(50),
        );
        let report = synth.generate_special_report(&context()).await;
        assert!(report.summary.contains("timed out"));
    }

    #[test]
    fn test_audit_covers_what_this_means() {
        let report = SpecialReport {
            summary: "Energy lagged.".to_string(),
            key_drivers: vec!["XLE: -2.50%".to_string()],
            macro_context: None,
            what_this_means: Some(WhatThisMeans {
                what_happened: "Oil stocks fell 2.50%.".to_string(),
                why_it_matters: "Energy is a big part of the index.".to_string(),
                what_could_happen_next: "They could slide another 71.35%.".to_string(),
                what_to_watch: vec!["Crude near 81.40".to_string()],
            }),
        };

        let text = audited_text(&report);
        assert!(text.contains("Oil stocks fell"));
        assert!(text.contains("Crude near 81.40"));

        let mut injected = Vec::new();
        grounding::collect_numbers(&serde_json::to_value(context()).unwrap(), &mut injected);
        let ungrounded = grounding::audit(&text, &injected);
        assert!(ungrounded.iter().any(|n| n == "71.35"));
        assert!(ungrounded.iter().any(|n| n == "81.40"));
        assert!(!ungrounded.iter().any(|n| n == "2.50"));
    }

    #[tokio::test]
    async fn test_missing_template_uses_builtin() {
        let llm = Arc::new(ScriptedLlm::replying(&["{}"]));
        let synth = NarrativeSynthesizer::new(
            llm.clone(),
            LlmOptions {
                model: "test-model".to_string(),
                reasoning_effort: None,
                verbosity: None,
            },
            Arc::new(FileTemplate::new("no/such/brief.md".into())),
            GroundingCheck::Off,
            Duration::from_secs(2),
        );
        let report = synth.generate_special_report(&context()).await;

        assert_eq!(report.summary, "{}");
        assert!(llm.prompts.lock().unwrap()[0].contains("Sentinel Market Brief"));
    }
}
