// src/config.rs

use serde::Deserialize;

use crate::services::htp::AnalysisMode;

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    // Database & API keys
    pub database_url: Option<String>,
    pub gemini_api_key: Option<String>,

    // Server
    #[serde(default = "default_port")]
    pub port: u16,

    // Analysis pipeline
    #[serde(default = "default_analysis_model")]
    pub analysis_model: String,
    #[serde(default = "default_analysis_mode")]
    pub analysis_mode: AnalysisMode,
    #[serde(default = "default_analysis_call_timeout_secs")]
    pub analysis_call_timeout_secs: u64,
    #[serde(default = "default_analysis_cache_enabled")]
    pub analysis_cache_enabled: bool,
    #[serde(default = "default_analysis_cache_entries")]
    pub analysis_cache_entries: usize,

    // Prompt library
    #[serde(default = "default_prompt_dir")]
    pub prompt_dir: String,
    #[serde(default = "default_prompt_language")]
    pub prompt_language: String,

    // File storage
    #[serde(default = "default_upload_storage_path")]
    pub upload_storage_path: String,
}

const fn default_port() -> u16 {
    8000
}

fn default_analysis_model() -> String {
    "gemini-2.5-flash".to_string()
}

const fn default_analysis_mode() -> AnalysisMode {
    AnalysisMode::PersonOnly
}

const fn default_analysis_call_timeout_secs() -> u64 {
    120
}

const fn default_analysis_cache_enabled() -> bool {
    true
}

const fn default_analysis_cache_entries() -> usize {
    256
}

fn default_prompt_dir() -> String {
    "prompts".to_string()
}

fn default_prompt_language() -> String {
    "en".to_string()
}

fn default_upload_storage_path() -> String {
    "uploads".to_string()
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `anyhow::Error` if environment variable parsing fails,
    /// such as when variables have invalid formats.
    pub fn load() -> Result<Self, anyhow::Error> {
        envy::from_env::<Self>().map_err(anyhow::Error::from)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            gemini_api_key: None,
            port: default_port(),
            analysis_model: default_analysis_model(),
            analysis_mode: default_analysis_mode(),
            analysis_call_timeout_secs: default_analysis_call_timeout_secs(),
            analysis_cache_enabled: default_analysis_cache_enabled(),
            analysis_cache_entries: default_analysis_cache_entries(),
            prompt_dir: default_prompt_dir(),
            prompt_language: default_prompt_language(),
            upload_storage_path: default_upload_storage_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.analysis_mode, AnalysisMode::PersonOnly);
        assert_eq!(config.prompt_language, "en");
        assert!(config.analysis_cache_enabled);
        assert!(config.analysis_cache_entries > 0);
    }
}
