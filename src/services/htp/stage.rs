use std::sync::Arc;

use genai::chat::{ContentPart, ImageSource};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::services::htp::HtpPipeline;
use crate::services::htp::report::{StageOutcome, TokenUsage};

/// One analysis target category, processed independently before merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Overall,
    House,
    Tree,
    Person,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Overall, Stage::House, Stage::Tree, Stage::Person];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Overall => "overall",
            Stage::House => "house",
            Stage::Tree => "tree",
            Stage::Person => "person",
        }
    }
}

pub(super) const FEATURE_INPUT: &str =
    "Organize the feature extraction results into a **clear and concise** markdown format.";
pub(super) const ANALYSIS_INPUT: &str = "Please analyze the features based on professional knowledge and the image features provided by the assistant, and organize the results in markdown format.";

impl HtpPipeline {
    /// Run one analysis stage: a feature-extraction call, then an
    /// interpretation call with the extracted features as context. Returns
    /// the stage outcome plus the token usage this stage consumed.
    ///
    /// Provider failures are not retried here; they propagate to the
    /// orchestrator, which fails the whole run.
    pub(super) async fn run_stage(
        &self,
        stage: Stage,
        image_b64: Arc<str>,
    ) -> Result<(StageOutcome, TokenUsage), AppError> {
        let prompts = self.prompts.stage(stage);
        let mut usage = TokenUsage::default();

        info!(stage = stage.as_str(), "stage analysis started");

        let (feature, feature_usage) = self
            .invoke(
                &prompts.feature,
                vec![
                    image_part(&image_b64),
                    ContentPart::Text(FEATURE_INPUT.to_string()),
                ],
            )
            .await?;
        usage += feature_usage;

        let analysis_input = format!("{ANALYSIS_INPUT}\n\n### Extracted features\n\n{feature}");
        let (analysis, analysis_usage) = self
            .invoke(
                &prompts.analysis,
                vec![image_part(&image_b64), ContentPart::Text(analysis_input)],
            )
            .await?;
        usage += analysis_usage;

        info!(stage = stage.as_str(), "stage analysis completed");

        Ok((StageOutcome { feature, analysis }, usage))
    }
}

fn image_part(image_b64: &Arc<str>) -> ContentPart {
    ContentPart::Image {
        content_type: "image/jpeg".to_string(),
        source: ImageSource::Base64(image_b64.clone()),
    }
}
