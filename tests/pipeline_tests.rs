// Integration tests for the HTP analysis pipeline, driven end-to-end
// against the mock provider. No database or network required.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use pluto_backend::errors::AppError;
use pluto_backend::llm::cache::InMemoryResponseCache;
use pluto_backend::services::htp::{
    AnalysisMode, FIX_SIGNAL, HtpPipeline, PromptLibrary, TokenUsage,
};
use pluto_backend::test_helpers::{MockAiClient, test_artifact, test_prompt_library};

const CALL_TIMEOUT: Duration = Duration::from_secs(5);

fn pipeline_with(client: &MockAiClient, prompts: PromptLibrary) -> HtpPipeline {
    HtpPipeline::new(
        Arc::new(client.clone()),
        Arc::new(prompts),
        "mock-model".to_string(),
        CALL_TIMEOUT,
    )
}

/// Script every call site of a full-mode run: 8 stage calls, merge,
/// finalize, signal, classify.
fn script_full_run(client: &MockAiClient, classification_reply: &str) {
    for stage in ["overall", "house", "tree", "person"] {
        client.respond_when(
            &format!("prompt:{stage}_feature"),
            &format!("{stage} features"),
            100,
            10,
        );
        client.respond_when(
            &format!("prompt:{stage}_analysis"),
            &format!("{stage} interpretation"),
            100,
            20,
        );
    }
    client.respond_when("prompt:merge", "merged narrative", 50, 30);
    client.respond_when("prompt:final_result", "the final report", 40, 25);
    client.respond_when("prompt:signal_judge", "no warning signals", 30, 5);
    client.respond_when("prompt:clf", classification_reply, 20, 2);
}

#[tokio::test]
async fn full_mode_produces_complete_envelope() {
    let client = MockAiClient::new();
    script_full_run(&client, "{\"result\": true}");
    let pipeline = pipeline_with(&client, test_prompt_library());

    let report = pipeline
        .run(&test_artifact(), AnalysisMode::Full)
        .await
        .expect("pipeline should succeed");

    assert_eq!(report.overall.feature, "overall features");
    assert_eq!(report.house.analysis, "house interpretation");
    assert_eq!(report.tree.feature, "tree features");
    assert_eq!(report.person.analysis, "person interpretation");
    assert_eq!(report.merge, "merged narrative");
    assert_eq!(report.final_report, "the final report");
    assert_eq!(report.signal, "no warning signals");
    assert_eq!(report.classification, Some(true));
    assert_eq!(report.fix_signal, None);

    // 8 stage calls + merge + finalize + signal + classify.
    assert_eq!(client.call_count(), 12);

    // Usage is the sum over every call of the run.
    assert_eq!(
        report.usage,
        TokenUsage {
            prompt: 4 * 200 + 50 + 40 + 30 + 20,
            completion: 4 * 30 + 30 + 25 + 5 + 2,
            total: 4 * 230 + 80 + 65 + 35 + 22,
        }
    );
}

#[tokio::test]
async fn full_mode_false_classification_sets_fix_signal() {
    let client = MockAiClient::new();
    script_full_run(&client, "false");
    let pipeline = pipeline_with(&client, test_prompt_library());

    let report = pipeline
        .run(&test_artifact(), AnalysisMode::Full)
        .await
        .expect("pipeline should succeed");

    assert_eq!(report.classification, Some(false));
    assert_eq!(report.fix_signal.as_deref(), Some(FIX_SIGNAL));
}

#[tokio::test]
async fn full_mode_ambiguous_classification_fails_open() {
    let client = MockAiClient::new();
    script_full_run(&client, "I am not sure about this one.");
    let pipeline = pipeline_with(&client, test_prompt_library());

    let report = pipeline
        .run(&test_artifact(), AnalysisMode::Full)
        .await
        .expect("pipeline should succeed");

    assert_eq!(report.classification, Some(true));
    assert_eq!(report.fix_signal, None);
}

#[tokio::test]
async fn full_mode_stage_failure_fails_the_whole_run() {
    let client = MockAiClient::new();
    // The person feature call fails; every other stage would succeed.
    // Registered first: the mock applies the first matching rule.
    client.fail_when(
        "prompt:person_feature",
        AppError::LlmError("transport error".to_string()),
    );
    script_full_run(&client, "true");
    let pipeline = pipeline_with(&client, test_prompt_library());

    let err = pipeline
        .run(&test_artifact(), AnalysisMode::Full)
        .await
        .expect_err("pipeline must fail when any stage fails");
    assert!(matches!(err, AppError::LlmError(_)));
}

#[tokio::test]
async fn person_only_mode_fills_sentinels_and_skips_the_gate() {
    let client = MockAiClient::new();
    client.respond_when("prompt:person_feature", "person features", 100, 10);
    client.respond_when("prompt:person_analysis", "person interpretation", 100, 20);
    client.respond_when("prompt:person_final_report", "the person report", 60, 40);
    let pipeline = pipeline_with(&client, test_prompt_library());

    let report = pipeline
        .run(&test_artifact(), AnalysisMode::PersonOnly)
        .await
        .expect("pipeline should succeed");

    assert_eq!(report.person.feature, "person features");
    assert_eq!(report.person.analysis, "person interpretation");
    assert_eq!(report.final_report, "the person report");

    // Non-analyzed targets carry blank sentinels; the gate is not applied.
    assert_eq!(report.overall.feature, "Not analyzed.");
    assert_eq!(report.house.analysis, "Not applicable.");
    assert_eq!(report.merge, "Not applicable for person-only analysis.");
    assert_eq!(report.classification, None);
    assert_eq!(report.fix_signal, None);

    // Exactly three provider calls: feature, analysis, final report.
    assert_eq!(client.call_count(), 3);
    assert_eq!(
        report.usage,
        TokenUsage {
            prompt: 260,
            completion: 70,
            total: 330,
        }
    );
}

#[tokio::test]
async fn invalid_artifact_aborts_before_any_provider_call() {
    let client = MockAiClient::new();
    let pipeline = pipeline_with(&client, test_prompt_library());

    let err = pipeline
        .run("definitely not ~~ an artifact", AnalysisMode::Full)
        .await
        .expect_err("invalid artifact must be rejected");
    assert!(matches!(err, AppError::InvalidArtifact(_)));
    assert_eq!(client.call_count(), 0);
}

#[tokio::test]
async fn usage_counts_one_run_at_a_time() {
    let client = MockAiClient::new();
    client.respond_when("prompt:person_feature", "person features", 10, 1);
    client.respond_when("prompt:person_analysis", "person interpretation", 10, 1);
    client.respond_when("prompt:person_final_report", "the person report", 10, 1);
    let pipeline = pipeline_with(&client, test_prompt_library());

    let first = pipeline
        .run(&test_artifact(), AnalysisMode::PersonOnly)
        .await
        .unwrap();
    let second = pipeline
        .run(&test_artifact(), AnalysisMode::PersonOnly)
        .await
        .unwrap();

    // The counter starts from zero for every run; it does not accumulate
    // across runs of the same pipeline.
    assert_eq!(first.usage, second.usage);
    assert_eq!(first.usage.total, 33);
}

#[tokio::test]
async fn cached_responses_bill_zero_usage() {
    let client = MockAiClient::new();
    client.respond_when("prompt:person_feature", "person features", 10, 1);
    client.respond_when("prompt:person_analysis", "person interpretation", 10, 1);
    client.respond_when("prompt:person_final_report", "the person report", 10, 1);
    let cache = Arc::new(InMemoryResponseCache::new(NonZeroUsize::new(64).unwrap()));
    let pipeline =
        pipeline_with(&client, test_prompt_library()).with_cache(cache);

    let first = pipeline
        .run(&test_artifact(), AnalysisMode::PersonOnly)
        .await
        .unwrap();
    assert_eq!(first.usage.total, 33);
    assert_eq!(client.call_count(), 3);

    // Same artifact, same prompts: every call is a cache hit. The envelope
    // is identical except that nothing was billed.
    let second = pipeline
        .run(&test_artifact(), AnalysisMode::PersonOnly)
        .await
        .unwrap();
    assert_eq!(client.call_count(), 3);
    assert_eq!(second.final_report, first.final_report);
    assert_eq!(second.usage, TokenUsage::default());
}

#[tokio::test]
async fn provider_timeout_surfaces_as_llm_error() {
    // A client that never answers within the pipeline's per-call timeout.
    use async_trait::async_trait;
    use genai::chat::{ChatOptions, ChatRequest, ChatResponse};
    use pluto_backend::llm::AiClient;

    struct StalledClient;

    #[async_trait]
    impl AiClient for StalledClient {
        async fn exec_chat(
            &self,
            _model_name: &str,
            _request: ChatRequest,
            _config_override: Option<ChatOptions>,
        ) -> Result<ChatResponse, AppError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(AppError::LlmError("unreachable".to_string()))
        }
    }

    let pipeline = HtpPipeline::new(
        Arc::new(StalledClient),
        Arc::new(test_prompt_library()),
        "mock-model".to_string(),
        Duration::from_millis(50),
    );

    let err = pipeline
        .run(&test_artifact(), AnalysisMode::PersonOnly)
        .await
        .expect_err("stalled provider must time out");
    match err {
        AppError::LlmError(message) => assert!(message.contains("timed out")),
        other => panic!("expected LlmError, got {other:?}"),
    }
}
