use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Fixed safety-override message. Deliberately not AI-generated: when the
/// classification gate trips, this text replaces the model's output when the
/// result is shown to the end user.
pub const FIX_SIGNAL: &str = r"### Assessment Opinion:
Warning

⚠️ IMPORTANT NOTICE ⚠️

The analysis has detected unusually intense negative emotions in the drawing.
This has triggered a safety mechanism in our system.

We strongly recommend seeking immediate assistance from a qualified mental health professional.
Your well-being is paramount, and a trained expert can provide the support you may need at this time.

Remember, it's okay to ask for help. You're not alone in this. ";

/// Sentinels used by the person-only mode for the stages it skips.
pub const NOT_ANALYZED: &str = "Not analyzed.";
pub const NOT_APPLICABLE: &str = "Not applicable.";
pub const PERSON_ONLY_MERGE: &str = "Not applicable for person-only analysis.";
pub const PERSON_ONLY_SIGNAL: &str =
    "Please review the final report for a qualitative summary.";

/// Token usage accumulated across every provider call of one pipeline run.
/// Reset at the start of a run by construction: each run builds its own
/// counter from zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub total: u32,
    pub prompt: u32,
    pub completion: u32,
}

impl TokenUsage {
    /// Fold one provider response's usage metadata into the counter.
    pub fn absorb(&mut self, usage: &genai::chat::Usage) {
        let prompt = usage.prompt_tokens.unwrap_or(0).max(0) as u32;
        let completion = usage.completion_tokens.unwrap_or(0).max(0) as u32;
        self.prompt += prompt;
        self.completion += completion;
        self.total += prompt + completion;
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.total += other.total;
        self.prompt += other.prompt;
        self.completion += other.completion;
    }
}

/// Output of one analysis stage: the extracted visual features and their
/// interpretation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageOutcome {
    pub feature: String,
    pub analysis: String,
}

impl StageOutcome {
    /// Placeholder for a stage the person-only mode skips.
    pub fn not_analyzed() -> Self {
        Self {
            feature: NOT_ANALYZED.to_string(),
            analysis: NOT_APPLICABLE.to_string(),
        }
    }
}

impl Default for StageOutcome {
    fn default() -> Self {
        Self::not_analyzed()
    }
}

/// The result envelope of one pipeline run. This is the only shape the
/// orchestrator exposes; it is persisted verbatim as the stored analysis
/// payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtpReport {
    pub overall: StageOutcome,
    pub house: StageOutcome,
    pub tree: StageOutcome,
    pub person: StageOutcome,
    pub merge: String,
    #[serde(rename = "final")]
    pub final_report: String,
    pub signal: String,
    /// `Some(true)` = safe to show normally, `Some(false)` = safety override
    /// active, `None` = gate not applied (person-only mode).
    pub classification: Option<bool>,
    /// Populated iff `classification` is `Some(false)`.
    pub fix_signal: Option<String>,
    pub usage: TokenUsage,
}

/// The shapes the classification model is allowed to answer with. Anything
/// else falls through to the fail-open default.
#[derive(Deserialize)]
#[serde(untagged)]
enum ClassificationVerdict {
    Structured { result: bool },
    Bool(bool),
    Text(String),
}

/// Normalize a raw classification response into a boolean.
///
/// Accepts a bare boolean, a `"true"`/`"false"` string, or an object with a
/// boolean `result` field, with or without a markdown code fence. Any other
/// shape defaults to `true` (fail-open): an unparseable verdict must not
/// suppress a report, only an explicit `false` may.
pub fn parse_classification(raw: &str) -> bool {
    let text = strip_code_fence(raw.trim());

    if let Ok(verdict) = serde_json::from_str::<ClassificationVerdict>(text) {
        return match verdict {
            ClassificationVerdict::Structured { result } => result,
            ClassificationVerdict::Bool(value) => value,
            ClassificationVerdict::Text(value) => string_verdict(&value),
        };
    }

    string_verdict(text)
}

fn string_verdict(value: &str) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "false" => false,
        // "true", and everything unrecognized, falls open.
        _ => true,
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_booleans() {
        assert!(parse_classification("true"));
        assert!(!parse_classification("false"));
        assert!(!parse_classification("  false\n"));
    }

    #[test]
    fn test_parse_quoted_string_booleans() {
        assert!(parse_classification("\"true\""));
        assert!(!parse_classification("\"false\""));
        assert!(!parse_classification("FALSE"));
    }

    #[test]
    fn test_parse_structured_result() {
        assert!(parse_classification("{\"result\": true}"));
        assert!(!parse_classification("{\"result\": false}"));
    }

    #[test]
    fn test_parse_fenced_json() {
        assert!(!parse_classification("```json\n{\"result\": false}\n```"));
        assert!(parse_classification("```\ntrue\n```"));
    }

    #[test]
    fn test_ambiguous_input_fails_open() {
        assert!(parse_classification("maybe"));
        assert!(parse_classification("{\"result\": \"unsure\"}"));
        assert!(parse_classification("{broken json"));
        assert!(parse_classification(""));
    }

    #[test]
    fn test_usage_absorb_and_sum() {
        let mut usage = TokenUsage::default();
        usage.absorb(&genai::chat::Usage {
            prompt_tokens: Some(100),
            completion_tokens: Some(25),
            total_tokens: Some(125),
            ..Default::default()
        });
        assert_eq!(
            usage,
            TokenUsage {
                total: 125,
                prompt: 100,
                completion: 25
            }
        );

        // Missing counters count as zero.
        usage.absorb(&genai::chat::Usage::default());
        assert_eq!(usage.total, 125);

        let mut sum = TokenUsage::default();
        sum += usage;
        sum += TokenUsage {
            total: 10,
            prompt: 4,
            completion: 6,
        };
        assert_eq!(
            sum,
            TokenUsage {
                total: 135,
                prompt: 104,
                completion: 31
            }
        );
    }

    #[test]
    fn test_report_serializes_final_under_original_key() {
        let report = HtpReport {
            overall: StageOutcome::not_analyzed(),
            house: StageOutcome::not_analyzed(),
            tree: StageOutcome::not_analyzed(),
            person: StageOutcome {
                feature: "feature text".to_string(),
                analysis: "analysis text".to_string(),
            },
            merge: PERSON_ONLY_MERGE.to_string(),
            final_report: "the report".to_string(),
            signal: PERSON_ONLY_SIGNAL.to_string(),
            classification: None,
            fix_signal: None,
            usage: TokenUsage::default(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["final"], "the report");
        assert_eq!(json["person"]["feature"], "feature text");
        assert_eq!(json["overall"]["feature"], NOT_ANALYZED);
        assert!(json["classification"].is_null());

        let round_trip: HtpReport = serde_json::from_value(json).unwrap();
        assert_eq!(round_trip.final_report, "the report");
    }
}
