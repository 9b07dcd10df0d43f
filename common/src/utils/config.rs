use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::error::AppError;

/// Runtime settings resolved from an optional `config` file overlaid by the environment.
///
/// Every endpoint, credential and deployment name is optional at load time so a
/// binary can report exactly which value it is missing before any external call.
#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub azure_aisearch_endpoint: Option<String>,
    pub azure_aisearch_index_name: Option<String>,
    pub azure_aisearch_key: Option<String>,
    #[serde(default = "default_search_api_version")]
    pub azure_aisearch_api_version: String,
    pub azure_openai_endpoint: Option<String>,
    pub azure_openai_key: Option<String>,
    #[serde(default = "default_openai_api_version")]
    pub azure_openai_api_version: String,
    pub model_embeddings_deployment_name: Option<String>,
    pub model_chat_deployment_name: Option<String>,
    #[serde(default = "default_semantic_config_name")]
    pub semantic_config_name: String,
    #[serde(default = "default_vector_field_name")]
    pub vector_field_name: String,
    #[serde(default = "default_docs_dir")]
    pub docs_dir: String,
    #[serde(default = "default_fields_path")]
    pub fields_path: String,
    #[serde(default = "default_report_dir")]
    pub report_dir: String,
}

fn default_search_api_version() -> String {
    "2024-07-01".to_string()
}

fn default_openai_api_version() -> String {
    "2024-06-01".to_string()
}

fn default_semantic_config_name() -> String {
    "default-semantic-config".to_string()
}

fn default_vector_field_name() -> String {
    "ChunkVector".to_string()
}

fn default_docs_dir() -> String {
    "./docs".to_string()
}

fn default_fields_path() -> String {
    "fields.json".to_string()
}

fn default_report_dir() -> String {
    ".".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            azure_aisearch_endpoint: None,
            azure_aisearch_index_name: None,
            azure_aisearch_key: None,
            azure_aisearch_api_version: default_search_api_version(),
            azure_openai_endpoint: None,
            azure_openai_key: None,
            azure_openai_api_version: default_openai_api_version(),
            model_embeddings_deployment_name: None,
            model_chat_deployment_name: None,
            semantic_config_name: default_semantic_config_name(),
            vector_field_name: default_vector_field_name(),
            docs_dir: default_docs_dir(),
            fields_path: default_fields_path(),
            report_dir: default_report_dir(),
        }
    }
}

/// Connection settings for the search service, all present.
#[derive(Clone, Debug)]
pub struct SearchSettings {
    pub endpoint: String,
    pub index_name: String,
    pub api_key: String,
    pub api_version: String,
}

/// Connection settings for the hosted model endpoint.
#[derive(Clone, Debug)]
pub struct OpenAiSettings {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
}

fn required<'a>(value: Option<&'a String>, name: &str) -> Result<&'a str, AppError> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Configuration(name.to_string()))
}

impl AppConfig {
    pub fn search_settings(&self) -> Result<SearchSettings, AppError> {
        Ok(SearchSettings {
            endpoint: required(
                self.azure_aisearch_endpoint.as_ref(),
                "AZURE_AISEARCH_ENDPOINT",
            )?
            .to_string(),
            index_name: required(
                self.azure_aisearch_index_name.as_ref(),
                "AZURE_AISEARCH_INDEX_NAME",
            )?
            .to_string(),
            api_key: required(self.azure_aisearch_key.as_ref(), "AZURE_AISEARCH_KEY")?
                .to_string(),
            api_version: self.azure_aisearch_api_version.clone(),
        })
    }

    pub fn openai_settings(&self) -> Result<OpenAiSettings, AppError> {
        Ok(OpenAiSettings {
            endpoint: required(self.azure_openai_endpoint.as_ref(), "AZURE_OPENAI_ENDPOINT")?
                .to_string(),
            api_key: required(self.azure_openai_key.as_ref(), "AZURE_OPENAI_KEY")?.to_string(),
            api_version: self.azure_openai_api_version.clone(),
        })
    }

    pub fn embeddings_deployment(&self) -> Result<&str, AppError> {
        required(
            self.model_embeddings_deployment_name.as_ref(),
            "MODEL_EMBEDDINGS_DEPLOYMENT_NAME",
        )
    }

    pub fn chat_deployment(&self) -> Result<&str, AppError> {
        required(
            self.model_chat_deployment_name.as_ref(),
            "MODEL_CHAT_DEPLOYMENT_NAME",
        )
    }

    pub fn docs_dir(&self) -> PathBuf {
        PathBuf::from(&self.docs_dir)
    }

    pub fn fields_path(&self) -> PathBuf {
        PathBuf::from(&self.fields_path)
    }

    pub fn report_dir(&self) -> PathBuf {
        PathBuf::from(&self.report_dir)
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_config() -> AppConfig {
        AppConfig {
            azure_aisearch_endpoint: Some("https://search.example.net".into()),
            azure_aisearch_index_name: Some("manuals".into()),
            azure_aisearch_key: Some("search-key".into()),
            azure_openai_endpoint: Some("https://models.example.net".into()),
            azure_openai_key: Some("openai-key".into()),
            model_embeddings_deployment_name: Some("text-embedding-3-large".into()),
            model_chat_deployment_name: Some("gpt-4o".into()),
            ..AppConfig::default()
        }
    }

    #[test]
    fn complete_config_resolves_all_settings() {
        let config = complete_config();
        let search = config.search_settings().expect("search settings");
        assert_eq!(search.index_name, "manuals");
        assert_eq!(search.api_version, "2024-07-01");
        assert!(config.openai_settings().is_ok());
        assert_eq!(
            config.embeddings_deployment().expect("deployment"),
            "text-embedding-3-large"
        );
        assert_eq!(config.chat_deployment().expect("chat"), "gpt-4o");
    }

    #[test]
    fn missing_value_is_reported_by_name() {
        let config = AppConfig {
            azure_aisearch_index_name: None,
            ..complete_config()
        };
        match config.search_settings() {
            Err(AppError::Configuration(name)) => assert_eq!(name, "AZURE_AISEARCH_INDEX_NAME"),
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn blank_value_counts_as_missing() {
        let config = AppConfig {
            model_chat_deployment_name: Some("   ".into()),
            ..complete_config()
        };
        assert!(matches!(
            config.chat_deployment(),
            Err(AppError::Configuration(name)) if name == "MODEL_CHAT_DEPLOYMENT_NAME"
        ));
    }

    #[test]
    fn defaults_apply_when_deserializing_sparse_sources() {
        let config = Config::builder()
            .set_override("azure_aisearch_endpoint", "https://search.example.net")
            .expect("override")
            .build()
            .expect("build")
            .try_deserialize::<AppConfig>()
            .expect("deserialize");

        assert_eq!(config.semantic_config_name, "default-semantic-config");
        assert_eq!(config.vector_field_name, "ChunkVector");
        assert_eq!(config.docs_dir(), PathBuf::from("./docs"));
        assert!(config.azure_openai_key.is_none());
    }
}
