//! The HTP analysis pipeline: per-stage feature extraction and
//! interpretation against the AI provider, fan-out across stages, and the
//! sequential merge -> finalize -> signal -> classify chain.

pub mod artifact;
pub mod prompts;
pub mod report;
pub mod stage;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use genai::chat::{ChatMessage, ChatRequest, ContentPart, ImageSource};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::llm::AiClient;
use crate::llm::cache::{ResponseCache, response_cache_key};

pub use prompts::PromptLibrary;
pub use report::{FIX_SIGNAL, HtpReport, StageOutcome, TokenUsage, parse_classification};
pub use stage::Stage;

/// Which analysis the pipeline performs for a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Analyze only the person drawing and produce the final report directly
    /// from it. No merge step, no classification gate.
    PersonOnly,
    /// Run all four stages concurrently, then merge, finalize, extract the
    /// warning signal and apply the classification gate.
    Full,
}

/// Orchestrates one analysis run end to end. Cheap to clone; every field is
/// shared.
#[derive(Clone)]
pub struct HtpPipeline {
    client: Arc<dyn AiClient>,
    pub(super) prompts: Arc<PromptLibrary>,
    model: String,
    call_timeout: Duration,
    cache: Option<Arc<dyn ResponseCache>>,
}

impl HtpPipeline {
    pub fn new(
        client: Arc<dyn AiClient>,
        prompts: Arc<PromptLibrary>,
        model: String,
        call_timeout: Duration,
    ) -> Self {
        Self {
            client,
            prompts,
            model,
            call_timeout,
            cache: None,
        }
    }

    /// Attach an optional response cache. The pipeline behaves identically
    /// without one; hits simply skip the provider call and bill zero tokens.
    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Run the pipeline for one artifact. The artifact reference is
    /// resolved exactly once, before any provider call.
    ///
    /// Token usage in the returned envelope covers every provider call of
    /// this run and nothing else.
    pub async fn run(&self, artifact_ref: &str, mode: AnalysisMode) -> Result<HtpReport, AppError> {
        let image = artifact::resolve_artifact(artifact_ref)?;
        match mode {
            AnalysisMode::PersonOnly => self.run_person_only(image).await,
            AnalysisMode::Full => self.run_full(image).await,
        }
    }

    async fn run_person_only(&self, image: Arc<str>) -> Result<HtpReport, AppError> {
        info!("person-only analysis started");

        let (person, mut usage) = self.run_stage(Stage::Person, image).await?;

        let report_input = format!(
            "VISUAL FEATURES:\n{}\n\nPSYCHOLOGICAL INTERPRETATIONS:\n{}",
            person.feature, person.analysis
        );
        let (final_report, final_usage) = self
            .invoke(
                &self.prompts.person_final_report,
                vec![ContentPart::Text(report_input)],
            )
            .await?;
        usage += final_usage;

        info!("person-only analysis completed");

        Ok(HtpReport {
            overall: StageOutcome::not_analyzed(),
            house: StageOutcome::not_analyzed(),
            tree: StageOutcome::not_analyzed(),
            person,
            merge: report::PERSON_ONLY_MERGE.to_string(),
            final_report,
            signal: report::PERSON_ONLY_SIGNAL.to_string(),
            classification: None,
            fix_signal: None,
            usage,
        })
    }

    async fn run_full(&self, image: Arc<str>) -> Result<HtpReport, AppError> {
        info!("full HTP analysis started");

        // Fan out one task per stage and wait for all of them. The first
        // observed failure aborts the remaining stages and fails the run;
        // there is no partial-success path.
        let mut tasks = JoinSet::new();
        for stage in Stage::ALL {
            let pipeline = self.clone();
            let image = image.clone();
            tasks.spawn(async move {
                let result = pipeline.run_stage(stage, image).await;
                (stage, result)
            });
        }

        let mut outcomes: HashMap<Stage, StageOutcome> = HashMap::new();
        let mut usage = TokenUsage::default();
        while let Some(joined) = tasks.join_next().await {
            let (stage, result) = joined.map_err(|e| {
                AppError::InternalServerError(format!("stage task failed to run: {e}"))
            })?;
            match result {
                Ok((outcome, stage_usage)) => {
                    // Each task returned its own usage delta; the reduction
                    // happens here, after the fan-in barrier, on one thread.
                    usage += stage_usage;
                    outcomes.insert(stage, outcome);
                }
                Err(e) => {
                    tasks.abort_all();
                    return Err(e);
                }
            }
        }

        let mut stage_outcome = |stage: Stage| -> Result<StageOutcome, AppError> {
            outcomes.remove(&stage).ok_or_else(|| {
                AppError::InternalServerError(format!(
                    "stage {} produced no output",
                    stage.as_str()
                ))
            })
        };
        let overall = stage_outcome(Stage::Overall)?;
        let house = stage_outcome(Stage::House)?;
        let tree = stage_outcome(Stage::Tree)?;
        let person = stage_outcome(Stage::Person)?;

        // merge -> finalize -> signal -> classify is a strict data
        // dependency chain; each step consumes the previous step's output.
        let merge_input = self
            .prompts
            .merge_format
            .replace("{overall_analysis}", &overall.analysis)
            .replace("{house_analysis}", &house.analysis)
            .replace("{tree_analysis}", &tree.analysis)
            .replace("{person_analysis}", &person.analysis);
        let (merge, merge_usage) = self
            .invoke(&self.prompts.merge, vec![ContentPart::Text(merge_input)])
            .await?;
        usage += merge_usage;

        let final_input = format!(
            "Based on the analysis results: \n{merge}\n, write your professional HTP test report."
        );
        let (final_report, final_usage) = self
            .invoke(
                &self.prompts.final_result,
                vec![ContentPart::Text(final_input)],
            )
            .await?;
        usage += final_usage;

        let (signal, signal_usage) = self
            .invoke(
                &self.prompts.signal_judge,
                vec![ContentPart::Text(final_report.clone())],
            )
            .await?;
        usage += signal_usage;

        let (clf_raw, clf_usage) = self
            .invoke(
                &self.prompts.classification,
                vec![ContentPart::Text(signal.clone())],
            )
            .await?;
        usage += clf_usage;

        let classification = parse_classification(&clf_raw);
        let fix_signal = if classification {
            None
        } else {
            warn!("classification gate triggered the safety override");
            Some(FIX_SIGNAL.to_string())
        };

        info!("full HTP analysis completed");

        Ok(HtpReport {
            overall,
            house,
            tree,
            person,
            merge,
            final_report,
            signal,
            classification: Some(classification),
            fix_signal,
            usage,
        })
    }

    /// One provider call: system prompt plus user content parts. Applies the
    /// per-call timeout and the optional response cache, and returns the
    /// response text together with the usage this call billed.
    pub(super) async fn invoke(
        &self,
        system: &str,
        parts: Vec<ContentPart>,
    ) -> Result<(String, TokenUsage), AppError> {
        let cache_key = self.cache.as_ref().map(|_| {
            let hash_parts = parts.iter().map(|part| match part {
                ContentPart::Text(text) => text.as_str(),
                ContentPart::Image {
                    source: ImageSource::Base64(data),
                    ..
                } => data.as_ref(),
                ContentPart::Image {
                    source: ImageSource::Url(url),
                    ..
                } => url.as_str(),
                #[allow(unreachable_patterns)]
                _ => "",
            });
            response_cache_key(&self.model, system, hash_parts)
        });

        if let (Some(cache), Some(key)) = (self.cache.as_ref(), cache_key.as_deref()) {
            if let Some(hit) = cache.get(key) {
                debug!("provider response served from cache");
                return Ok((hit, TokenUsage::default()));
            }
        }

        let request = ChatRequest::new(vec![ChatMessage::user(parts)]).with_system(system);
        let response = timeout(
            self.call_timeout,
            self.client.exec_chat(&self.model, request, None),
        )
        .await
        .map_err(|_| {
            AppError::LlmError(format!(
                "provider call timed out after {}s",
                self.call_timeout.as_secs()
            ))
        })??;

        let text = response
            .content_text_as_str()
            .ok_or_else(|| AppError::LlmError("no text content in provider response".to_string()))?
            .to_string();

        let mut usage = TokenUsage::default();
        usage.absorb(&response.usage);

        if let (Some(cache), Some(key)) = (self.cache.as_ref(), cache_key) {
            cache.put(key, text.clone());
        }

        Ok((text, usage))
    }
}
