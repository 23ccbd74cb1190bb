// balans-core/src/agent.rs
use crate::api;
use crate::config::AgentConfig;
use crate::errors::AgentError;
use crate::models::chat::ChatMessage;
use crate::registry::ToolRegistry;
use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, error, info, trace, warn};

const MAX_ITERATIONS: usize = 10;

/// The main entry point for asking the model a question.
///
/// Owns the conversation for the duration of one [`Agent::ask`] call: the
/// message history is never persisted across calls.
pub struct Agent {
    config: AgentConfig,
    api_key: String,
    registry: ToolRegistry,
    http_client: Client,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Result<Self> {
        let http_client = Client::builder()
            .build()
            .context("Failed to build HTTP client for Agent")?;

        let api_key = if config.provider.api_key_env_var.is_empty() {
            // Local OpenAI-compatible servers don't check the key.
            "dummy".to_string()
        } else {
            match std::env::var(&config.provider.api_key_env_var) {
                Ok(key) => key,
                Err(e) => {
                    warn!(
                        env_var = %config.provider.api_key_env_var,
                        error = %e,
                        "API key environment variable not set or invalid"
                    );
                    "dummy".to_string()
                }
            }
        };

        let registry = ToolRegistry::new(http_client.clone(), &config.tool_servers);

        Ok(Self {
            config,
            api_key,
            registry,
            http_client,
        })
    }

    /// Fetches the tool catalogs. Must be called once before [`Agent::ask`];
    /// the descriptors are cached for the lifetime of the agent.
    pub async fn connect(&mut self) -> Result<(), AgentError> {
        self.registry
            .connect()
            .await
            .map_err(AgentError::ToolServer)
    }

    /// Runs one question to a terminated answer, servicing tool calls along
    /// the way. Returns the final assistant content verbatim, completion
    /// marker included.
    pub async fn ask(&self, prompt: &str, system: Option<&str>) -> Result<String, AgentError> {
        let mut messages = Vec::new();
        let system_prompt = system.unwrap_or(&self.config.system_prompt);
        if !system_prompt.trim().is_empty() {
            messages.push(ChatMessage::system(system_prompt));
        }
        messages.push(ChatMessage::user(prompt));

        let tool_definitions = self.registry.definitions();
        info!(
            num_tools = tool_definitions.len(),
            "Starting agent run."
        );

        let mut iteration = 0;
        loop {
            if iteration >= MAX_ITERATIONS {
                error!(limit = MAX_ITERATIONS, "Agent reached maximum iteration limit.");
                return Err(AgentError::Api(anyhow!(
                    "Agent stopped after reaching maximum iterations ({})",
                    MAX_ITERATIONS
                )));
            }
            iteration += 1;
            debug!(iteration, num_messages = messages.len(), "Requesting completion.");

            let api_response = match api::get_chat_completion(
                &self.http_client,
                &self.config.provider,
                &self.api_key,
                messages.clone(),
                tool_definitions,
            )
            .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    // Oversized tool payloads are the usual culprit: halve
                    // the last tool result and try again.
                    if truncate_last_tool_message(&mut messages) {
                        warn!(error = %e, "API call failed; truncated last tool result and retrying.");
                        continue;
                    }
                    return Err(AgentError::Api(e.context("API call failed during agent run")));
                }
            };

            let choice = api_response.choices.into_iter().next().ok_or_else(|| {
                AgentError::Api(anyhow!("API response contained no choices"))
            })?;
            let response_message = choice.message;
            trace!(message = %serde_json::to_string_pretty(&response_message).unwrap_or_default(), "Assistant message");

            let has_tool_calls = response_message
                .tool_calls
                .as_ref()
                .map(|calls| !calls.is_empty())
                .unwrap_or(false);

            if has_tool_calls {
                let tool_calls = response_message.tool_calls.clone().unwrap_or_default();
                messages.push(response_message);
                info!(count = tool_calls.len(), "Servicing {} tool call(s).", tool_calls.len());

                for tool_call in tool_calls {
                    let tool_name = &tool_call.function.name;
                    let args: Value = serde_json::from_str(&tool_call.function.arguments)
                        .unwrap_or_else(|e| {
                            warn!(
                                tool_call_id = %tool_call.id,
                                tool_name = %tool_name,
                                args_str = %tool_call.function.arguments,
                                error = %e,
                                "Failed to parse tool arguments JSON string. Using null."
                            );
                            Value::Null
                        });

                    let content = match self.registry.call(tool_name, args).await {
                        Ok(result) => {
                            info!(tool_call_id = %tool_call.id, tool_name = %tool_name, "Tool executed successfully.");
                            serde_json::to_string(&result)
                                .unwrap_or_else(|_| "<invalid JSON result>".to_string())
                        }
                        Err(e) => {
                            error!(tool_call_id = %tool_call.id, tool_name = %tool_name, error = ?e, "Tool execution failed.");
                            format!("Error executing tool '{}': {}", tool_name, e)
                        }
                    };

                    // Exactly one tool-role message per call, before the
                    // next completion request.
                    messages.push(ChatMessage::tool(tool_call.id.clone(), content));
                }
                continue;
            }

            let content = response_message.content.clone().unwrap_or_default();
            if !content.contains(&self.config.completion_marker) {
                debug!("Completion lacks the marker; injecting reminder.");
                messages.push(response_message);
                messages.push(ChatMessage::user(self.config.reminder_prompt.clone()));
                continue;
            }

            info!("Received final response (completion marker present).");
            return Ok(content);
        }
    }
}

/// Halves the content of the trailing tool-role message, in place.
///
/// Returns false when there is nothing left to truncate, in which case the
/// caller must propagate the original error instead of retrying.
fn truncate_last_tool_message(messages: &mut [ChatMessage]) -> bool {
    let Some(last) = messages.last_mut() else {
        return false;
    };
    if last.role != "tool" {
        return false;
    }
    let Some(content) = last.content.as_ref() else {
        return false;
    };
    if content.is_empty() {
        return false;
    }
    let half = content.chars().count() / 2;
    let truncated: String = content.chars().take(half).collect();
    last.content = Some(truncated);
    true
}
