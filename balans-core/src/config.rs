// balans-core/src/config.rs

//! Configuration structures and parsing for the agent library.

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::collections::HashMap;
use url::Url;

pub const DEFAULT_COMPLETION_MARKER: &str = "</Finished>";
pub const DEFAULT_REMINDER_PROMPT: &str = "Give the final answer ending with the \
completion tag if you are done. If you are missing information, call another tool \
with a JSON request to gather more data.";

#[derive(Deserialize, Debug, Clone)]
pub struct AgentConfig {
    pub system_prompt: String,
    /// Literal token the model is instructed to emit with its final answer.
    #[serde(default = "default_completion_marker")]
    pub completion_marker: String,
    /// Message injected when a completion is plain text without the marker.
    #[serde(default = "default_reminder_prompt")]
    pub reminder_prompt: String,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub tool_servers: HashMap<String, ToolServerConfig>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ProviderConfig {
    pub model_name: String,
    pub endpoint: String,
    /// Name of the environment variable holding the API key. Local
    /// OpenAI-compatible servers usually accept any value, so this may be
    /// left empty.
    #[serde(default)]
    pub api_key_env_var: String,
    /// Free-form request parameters (temperature, min_tokens, ...) merged
    /// into the completion request body.
    #[serde(default)]
    pub parameters: Option<toml::Value>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ToolServerConfig {
    pub url: String,
}

fn default_completion_marker() -> String {
    DEFAULT_COMPLETION_MARKER.to_string()
}

fn default_reminder_prompt() -> String {
    DEFAULT_REMINDER_PROMPT.to_string()
}

impl AgentConfig {
    pub fn from_toml_str(config_toml_content: &str) -> Result<AgentConfig> {
        let config: AgentConfig = match toml::from_str(config_toml_content) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::error!(error = %e, "Failed to parse TOML content");
                return Err(anyhow!(e))
                    .context("Failed to parse configuration TOML content. Check TOML syntax.");
            }
        };

        if config.system_prompt.trim().is_empty() {
            return Err(anyhow!("'system_prompt' in config content is empty."));
        }
        if config.completion_marker.trim().is_empty() {
            return Err(anyhow!("'completion_marker' in config content is empty."));
        }

        if config.provider.model_name.trim().is_empty() {
            return Err(anyhow!("'provider.model_name' is missing or empty."));
        }
        if config.provider.endpoint.trim().is_empty() {
            return Err(anyhow!("'provider.endpoint' is missing or empty."));
        }
        Url::parse(&config.provider.endpoint).with_context(|| {
            format!(
                "Invalid URL format for 'provider.endpoint' ('{}').",
                config.provider.endpoint
            )
        })?;
        if let Some(params) = &config.provider.parameters {
            if !params.is_table() {
                return Err(anyhow!(
                    "'provider.parameters' is invalid. Expected a TOML table."
                ));
            }
        }

        if config.tool_servers.is_empty() {
            return Err(anyhow!("No [tool_servers] defined in config content."));
        }
        for (key, server) in &config.tool_servers {
            if server.url.trim().is_empty() {
                return Err(anyhow!("Tool server '{}' has an empty 'url'.", key));
            }
            Url::parse(&server.url).with_context(|| {
                format!(
                    "Invalid URL format for tool server '{}' ('{}').",
                    key, server.url
                )
            })?;
        }

        tracing::info!("Successfully parsed and validated agent configuration.");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config_content() -> String {
        r#"
            system_prompt = "You are a professional 1C system analyst."

            [provider]
            model_name = "Salesforce/xLAM-2-32b-fc-r"
            endpoint = "http://localhost:8000/v1/chat/completions"
            api_key_env_var = "LLM_API_KEY"
            [provider.parameters]
                temperature = 0.1
                min_tokens = 5

            [tool_servers.erp]
            url = "http://localhost:9000"

            [tool_servers.search]
            url = "http://localhost:4200"
        "#
        .to_string()
    }

    #[test]
    fn test_config_parse_success() {
        let content = valid_config_content();
        let result = AgentConfig::from_toml_str(&content);
        assert!(result.is_ok(), "Parse failed: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.provider.model_name, "Salesforce/xLAM-2-32b-fc-r");
        assert_eq!(config.completion_marker, DEFAULT_COMPLETION_MARKER);
        assert_eq!(config.tool_servers.len(), 2);
        assert_eq!(config.tool_servers["erp"].url, "http://localhost:9000");
        assert!(config.provider.parameters.is_some());
    }

    #[test]
    fn test_config_custom_marker() {
        let content = valid_config_content().replace(
            "system_prompt =",
            "completion_marker = \"<DONE>\"\nsystem_prompt =",
        );
        let config = AgentConfig::from_toml_str(&content).unwrap();
        assert_eq!(config.completion_marker, "<DONE>");
    }

    #[test]
    fn test_config_missing_tool_servers() {
        let content = r#"
            system_prompt = "Valid"
            [provider]
            model_name = "test-model"
            endpoint = "http://localhost:8000/v1/chat/completions"
        "#;
        let result = AgentConfig::from_toml_str(content);
        assert!(result.is_err());
        let error_string = result.err().unwrap().to_string();
        assert!(
            error_string.contains("No [tool_servers] defined"),
            "Unexpected error message: {}",
            error_string
        );
    }

    #[test]
    fn test_config_invalid_endpoint_url() {
        let content = valid_config_content().replace(
            "http://localhost:8000/v1/chat/completions",
            "not a url",
        );
        assert!(AgentConfig::from_toml_str(&content).is_err());
    }
}
