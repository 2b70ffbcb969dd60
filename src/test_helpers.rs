// src/test_helpers.rs
// Contains helper functions and structs for testing the analysis pipeline
// without a live provider.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use genai::ModelIden;
use genai::adapter::AdapterKind;
use genai::chat::{ChatOptions, ChatRequest, ChatResponse, ContentPart, MessageContent, Usage};

use crate::errors::AppError;
use crate::llm::AiClient;
use crate::services::htp::prompts::{PromptLibrary, StagePrompts};

/// Builds a ChatResponse the way the mock provider returns it.
pub fn mock_chat_response(text: &str, prompt_tokens: i32, completion_tokens: i32) -> ChatResponse {
    ChatResponse {
        content: Some(MessageContent::Text(text.to_string())),
        reasoning_content: None,
        model_iden: ModelIden::new(AdapterKind::Gemini, "mock-model"),
        provider_model_iden: ModelIden::new(AdapterKind::Gemini, "mock-model"),
        usage: Usage {
            prompt_tokens: Some(prompt_tokens),
            completion_tokens: Some(completion_tokens),
            total_tokens: Some(prompt_tokens + completion_tokens),
            ..Default::default()
        },
    }
}

struct MockRule {
    marker: String,
    response: Result<ChatResponse, AppError>,
}

/// Scripted AiClient for pipeline tests.
///
/// Responses are selected by substring match against the request's system
/// prompt and user text parts, so selection stays deterministic even when
/// stages run concurrently. Unmatched requests get a bland default.
#[derive(Clone, Default)]
pub struct MockAiClient {
    rules: Arc<Mutex<Vec<MockRule>>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl MockAiClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond with `text` (and the given usage counters) to any request
    /// whose system prompt or user text contains `marker`.
    pub fn respond_when(&self, marker: &str, text: &str, prompt_tokens: i32, completion_tokens: i32) {
        self.rules.lock().unwrap().push(MockRule {
            marker: marker.to_string(),
            response: Ok(mock_chat_response(text, prompt_tokens, completion_tokens)),
        });
    }

    /// Fail any request whose system prompt or user text contains `marker`.
    pub fn fail_when(&self, marker: &str, error: AppError) {
        self.rules.lock().unwrap().push(MockRule {
            marker: marker.to_string(),
            response: Err(error),
        });
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request_text(request: &ChatRequest) -> String {
        let mut text = request.system.clone().unwrap_or_default();
        for message in &request.messages {
            match &message.content {
                MessageContent::Text(t) => {
                    text.push('\n');
                    text.push_str(t);
                }
                MessageContent::Parts(parts) => {
                    for part in parts {
                        if let ContentPart::Text(t) = part {
                            text.push('\n');
                            text.push_str(t);
                        }
                    }
                }
                _ => {}
            }
        }
        text
    }
}

#[async_trait]
impl AiClient for MockAiClient {
    async fn exec_chat(
        &self,
        _model_name: &str,
        request: ChatRequest,
        _config_override: Option<ChatOptions>,
    ) -> Result<ChatResponse, AppError> {
        let haystack = Self::request_text(&request);
        self.requests.lock().unwrap().push(request);

        let rules = self.rules.lock().unwrap();
        for rule in rules.iter() {
            if haystack.contains(&rule.marker) {
                return rule.response.clone();
            }
        }
        Ok(mock_chat_response("Mock AI response", 0, 0))
    }
}

/// Prompt library with distinctive marker strings, so MockAiClient rules can
/// target individual pipeline call sites.
pub fn test_prompt_library() -> PromptLibrary {
    let stage = |name: &str| StagePrompts {
        feature: format!("prompt:{name}_feature"),
        analysis: format!("prompt:{name}_analysis"),
    };
    PromptLibrary {
        overall: stage("overall"),
        house: stage("house"),
        tree: stage("tree"),
        person: stage("person"),
        merge: "prompt:merge".to_string(),
        merge_format: "Overall: {overall_analysis}\nHouse: {house_analysis}\nTree: {tree_analysis}\nPerson: {person_analysis}".to_string(),
        final_result: "prompt:final_result".to_string(),
        signal_judge: "prompt:signal_judge".to_string(),
        classification: "prompt:clf".to_string(),
        person_final_report: "prompt:person_final_report".to_string(),
    }
}

/// A small, valid inline artifact (base64 of fake image bytes).
pub fn test_artifact() -> String {
    BASE64.encode(b"not really a jpeg, but resolvable")
}
