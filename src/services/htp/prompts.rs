use std::path::Path;

use crate::errors::AppError;
use crate::services::htp::stage::Stage;

/// The feature-extraction and interpretation prompts of one stage.
#[derive(Debug, Clone)]
pub struct StagePrompts {
    pub feature: String,
    pub analysis: String,
}

/// All prompt texts the pipeline needs, loaded once at startup.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    pub overall: StagePrompts,
    pub house: StagePrompts,
    pub tree: StagePrompts,
    pub person: StagePrompts,
    pub merge: String,
    /// Template combining the four stage interpretations; placeholders
    /// `{overall_analysis}`, `{house_analysis}`, `{tree_analysis}`,
    /// `{person_analysis}`.
    pub merge_format: String,
    pub final_result: String,
    pub signal_judge: String,
    pub classification: String,
    pub person_final_report: String,
}

impl PromptLibrary {
    /// Load the prompt files for `language` from `dir`. A missing or
    /// unreadable file is a startup configuration error.
    pub fn load(dir: &Path, language: &str) -> Result<Self, AppError> {
        let base = dir.join(language);
        let read = |name: &str| -> Result<String, AppError> {
            let path = base.join(name);
            std::fs::read_to_string(&path).map_err(|e| {
                AppError::ConfigError(format!(
                    "failed to read prompt file {}: {e}",
                    path.display()
                ))
            })
        };

        let stage = |name: &str| -> Result<StagePrompts, AppError> {
            Ok(StagePrompts {
                feature: read(&format!("{name}_feature.txt"))?,
                analysis: read(&format!("{name}_analysis.txt"))?,
            })
        };

        Ok(Self {
            overall: stage("overall")?,
            house: stage("house")?,
            tree: stage("tree")?,
            person: stage("person")?,
            merge: read("analysis_merge.txt")?,
            merge_format: read("merge_format.txt")?,
            final_result: read("final_result.txt")?,
            signal_judge: read("signal_judge.txt")?,
            classification: read("clf.txt")?,
            person_final_report: read("person_final_report.txt")?,
        })
    }

    pub fn stage(&self, stage: Stage) -> &StagePrompts {
        match stage {
            Stage::Overall => &self.overall,
            Stage::House => &self.house,
            Stage::Tree => &self.tree,
            Stage::Person => &self.person,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROMPT_FILES: [&str; 14] = [
        "overall_feature.txt",
        "overall_analysis.txt",
        "house_feature.txt",
        "house_analysis.txt",
        "tree_feature.txt",
        "tree_analysis.txt",
        "person_feature.txt",
        "person_analysis.txt",
        "analysis_merge.txt",
        "merge_format.txt",
        "final_result.txt",
        "signal_judge.txt",
        "clf.txt",
        "person_final_report.txt",
    ];

    #[test]
    fn test_load_reads_every_file() {
        let dir = std::env::temp_dir().join(format!("prompts-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(dir.join("en")).unwrap();
        for name in PROMPT_FILES {
            std::fs::write(dir.join("en").join(name), format!("text of {name}")).unwrap();
        }

        let library = PromptLibrary::load(&dir, "en").unwrap();
        assert_eq!(library.person.feature, "text of person_feature.txt");
        assert_eq!(library.stage(Stage::Tree).analysis, "text of tree_analysis.txt");
        assert_eq!(library.classification, "text of clf.txt");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = std::env::temp_dir().join(format!("prompts-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(dir.join("en")).unwrap();
        // Deliberately write no files.
        let err = PromptLibrary::load(&dir, "en").unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_shipped_prompts_load() {
        // The prompt files checked into the repository must stay loadable.
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("prompts");
        let library = PromptLibrary::load(&dir, "en").unwrap();
        assert!(!library.merge.is_empty());
        assert!(library.merge_format.contains("{person_analysis}"));
    }
}
