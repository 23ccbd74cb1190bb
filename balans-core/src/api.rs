// balans-core/src/api.rs

use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde_json::{Value, json, to_value};
use tracing::debug;
use uuid::Uuid;

use crate::config::ProviderConfig;
use crate::models::chat::{ApiResponse, ChatMessage};
use crate::models::tools::ToolDefinition;

/// Requests a single chat completion from the OpenAI-compatible endpoint.
///
/// There is no retry policy here: transport and API failures propagate to the
/// dispatch loop, which owns the oversized-payload mitigation.
pub async fn get_chat_completion(
    client: &Client,
    provider: &ProviderConfig,
    api_key: &str,
    messages: Vec<ChatMessage>,
    tool_definitions: &[ToolDefinition],
) -> Result<ApiResponse> {
    let request_body = build_completion_request(&provider.model_name, messages, provider, tool_definitions)?;

    debug!(
        "Request URL: {}\nRequest JSON: {}",
        provider.endpoint,
        serde_json::to_string_pretty(&request_body)?
    );

    let response = client
        .post(&provider.endpoint)
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {}", api_key))
        .json(&request_body)
        .send()
        .await
        .context("Failed to send chat completion request")?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .context("Failed to read API error response body")?;
        debug!("API request failed. Status: {}, Body: {}", status, error_text);
        return Err(anyhow!("API error: {} - {}", status, error_text));
    }

    let response_value: Value = response
        .json()
        .await
        .context("Failed to read API response body as JSON")?;

    let mut response_json_obj = if let Value::Object(map) = response_value.clone() {
        map
    } else {
        return Err(anyhow!(
            "API response was not a JSON object: {:?}",
            response_value
        ));
    };

    // Some local OpenAI-compatible servers omit the 'id' field.
    if !response_json_obj.contains_key("id") {
        let new_id = format!("chatcmpl-{}", Uuid::new_v4());
        debug!("Added missing 'id' field to API response with value: {}", new_id);
        response_json_obj.insert("id".to_string(), json!(new_id));
    }

    let api_response: ApiResponse = match serde_json::from_value(Value::Object(response_json_obj)) {
        Ok(resp) => resp,
        Err(e) => {
            debug!("ERROR: failed to deserialize API response {:#?}", response_value);
            return Err(anyhow!("Failed to deserialize API response").context(e));
        }
    };

    if let Some(choice) = api_response.choices.first() {
        if let Some(tool_calls) = &choice.message.tool_calls {
            debug!("Tool calls: {:#?}", tool_calls);
        } else {
            debug!("No tool calls");
        }
    } else {
        debug!("Response has empty 'choices' array");
    }

    Ok(api_response)
}

fn build_completion_request(
    model_name: &str,
    messages: Vec<ChatMessage>,
    provider: &ProviderConfig,
    tool_definitions: &[ToolDefinition],
) -> Result<Value> {
    let mut request_map = serde_json::Map::new();
    request_map.insert("model".to_string(), json!(model_name));
    request_map.insert("messages".to_string(), to_value(messages)?);

    let tools_json: Vec<Value> = tool_definitions
        .iter()
        .map(|tool_def| {
            json!({
                "type": "function",
                "function": tool_def
            })
        })
        .collect();

    if !tools_json.is_empty() {
        request_map.insert("tools".to_string(), Value::Array(tools_json));
        request_map.insert("tool_choice".to_string(), json!("auto"));
    }

    if let Some(parameters) = provider.parameters.as_ref().and_then(|p| p.as_table()) {
        for (key, value) in parameters {
            let json_value = to_value(value.clone())
                .with_context(|| format!("Failed to convert TOML parameter '{}' to JSON", key))?;
            request_map.insert(key.clone(), json_value);
        }
    }
    Ok(Value::Object(request_map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tools::{ToolParameter, ToolParameterType, ToolParametersDefinition};
    use std::collections::HashMap;

    use httpmock::prelude::*;

    fn create_mock_tool_definitions() -> Vec<ToolDefinition> {
        let mut properties = HashMap::new();
        properties.insert(
            "query".to_string(),
            ToolParameter {
                param_type: ToolParameterType::String,
                description: "Search query".to_string(),
                enum_values: None,
                items: None,
            },
        );
        vec![ToolDefinition {
            name: "web_search".to_string(),
            description: "Search the web".to_string(),
            parameters: ToolParametersDefinition {
                param_type: "object".to_string(),
                properties,
                required: vec!["query".to_string()],
            },
        }]
    }

    fn create_test_provider(endpoint: &str, params: Option<toml::value::Table>) -> ProviderConfig {
        ProviderConfig {
            model_name: "test-model-name".to_string(),
            endpoint: endpoint.to_string(),
            api_key_env_var: String::new(),
            parameters: params.map(toml::Value::Table),
        }
    }

    #[test]
    fn test_build_completion_request_basic() {
        let messages = vec![ChatMessage::user("Hello")];
        let provider = create_test_provider("http://fake.endpoint/v1", None);
        let tool_definitions = create_mock_tool_definitions();
        let value =
            build_completion_request("test-model", messages.clone(), &provider, &tool_definitions)
                .unwrap();
        assert_eq!(value["messages"], json!(messages));
        assert_eq!(value["tool_choice"], json!("auto"));
        assert_eq!(value["tools"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_build_completion_request_no_tools_no_tool_choice() {
        let messages = vec![ChatMessage::user("Hi")];
        let provider = create_test_provider("http://fake.endpoint/v1", None);
        let value = build_completion_request("test-model", messages, &provider, &[]).unwrap();
        assert!(value.get("tools").is_none());
        assert!(value.get("tool_choice").is_none());
    }

    #[test]
    fn test_build_completion_request_with_parameters() {
        let messages = vec![ChatMessage::user("Test")];
        let mut params = toml::value::Table::new();
        params.insert("temperature".to_string(), toml::Value::Float(0.9));
        params.insert("min_tokens".to_string(), toml::Value::Integer(5));
        let provider = create_test_provider("http://fake.endpoint/v1", Some(params));
        let value = build_completion_request("test-model", messages, &provider, &[]).unwrap();
        assert_eq!(value["temperature"], json!(0.9));
        assert_eq!(value["min_tokens"], json!(5));
    }

    #[tokio::test]
    async fn test_get_chat_completion_success() {
        let server = MockServer::start_async().await;
        let endpoint_path = "/v1/chat/completions";
        let provider =
            create_test_provider(&format!("{}{}", server.base_url(), endpoint_path), None);
        let messages = vec![ChatMessage::user("Ping")];
        let tool_definitions = create_mock_tool_definitions();

        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path(endpoint_path);
                then.status(200).json_body(json!({
                    "id": "chatcmpl-123", "choices": [{"index": 0, "message": {"role": "assistant", "content": "Pong"}, "finish_reason": "stop"}]
                }));
            })
            .await;

        let client = Client::new();
        let result =
            get_chat_completion(&client, &provider, "dummy", messages, &tool_definitions).await;
        mock.assert_async().await;
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result.err());
        assert_eq!(result.unwrap().id, "chatcmpl-123");
    }

    #[tokio::test]
    async fn test_get_chat_completion_patches_missing_id() {
        let server = MockServer::start_async().await;
        let endpoint_path = "/v1/chat/completions";
        let provider =
            create_test_provider(&format!("{}{}", server.base_url(), endpoint_path), None);

        server
            .mock_async(|when, then| {
                when.method(POST).path(endpoint_path);
                then.status(200).json_body(json!({
                    "choices": [{"index": 0, "message": {"role": "assistant", "content": "Ok"}, "finish_reason": "stop"}]
                }));
            })
            .await;

        let client = Client::new();
        let result = get_chat_completion(
            &client,
            &provider,
            "dummy",
            vec![ChatMessage::user("Hi")],
            &[],
        )
        .await
        .unwrap();
        assert!(result.id.starts_with("chatcmpl-"));
    }

    #[tokio::test]
    async fn test_get_chat_completion_surfaces_api_error() {
        let server = MockServer::start_async().await;
        let endpoint_path = "/v1/chat/completions";
        let provider =
            create_test_provider(&format!("{}{}", server.base_url(), endpoint_path), None);

        server
            .mock_async(|when, then| {
                when.method(POST).path(endpoint_path);
                then.status(400).body("context length exceeded");
            })
            .await;

        let client = Client::new();
        let result = get_chat_completion(
            &client,
            &provider,
            "dummy",
            vec![ChatMessage::user("Hi")],
            &[],
        )
        .await;
        assert!(result.is_err());
        let msg = result.err().unwrap().to_string();
        assert!(msg.contains("400"), "Unexpected error message: {}", msg);
        assert!(msg.contains("context length exceeded"));
    }
}
