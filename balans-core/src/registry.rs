// balans-core/src/registry.rs

//! Client side of the uniform tool-invocation interface.
//!
//! Every tool server exposes `GET /tools` (a catalog of descriptors) and
//! `POST /tools/{name}` (invoke with a JSON argument object, get JSON back).
//! The registry fetches each catalog once at connection time and keeps a
//! route table from tool name to owning server for the session.

use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::config::ToolServerConfig;
use crate::models::tools::{
    ToolDefinition, ToolParameter, ToolParameterType, ToolParametersDefinition,
};

/// A tool descriptor as served by a tool server's catalog endpoint.
#[derive(Deserialize, Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Option<Value>,
}

pub struct ToolRegistry {
    http_client: Client,
    servers: HashMap<String, String>,
    definitions: Vec<ToolDefinition>,
    routes: HashMap<String, String>,
}

/// Converts a raw JSON schema from a tool catalog into the typed parameter
/// definition presented to the model. Unknown property types degrade to
/// strings rather than failing the whole catalog.
fn schema_to_tool_params(schema_val: Option<&Map<String, Value>>) -> ToolParametersDefinition {
    let default_params = ToolParametersDefinition {
        param_type: "object".to_string(),
        properties: HashMap::new(),
        required: Vec::new(),
    };
    let schema = match schema_val {
        Some(s) => s,
        None => return default_params,
    };
    let props_val = schema.get("properties").and_then(Value::as_object);
    let required_val = schema.get("required").and_then(Value::as_array);
    let mut properties = HashMap::new();
    if let Some(props_map) = props_val {
        for (key, val) in props_map {
            if let Some(prop_obj) = val.as_object() {
                let param_type_str = prop_obj
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("string");
                let description = prop_obj
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                let param_type = match param_type_str {
                    "string" => ToolParameterType::String,
                    "integer" => ToolParameterType::Integer,
                    "number" => ToolParameterType::Number,
                    "boolean" => ToolParameterType::Boolean,
                    "array" => ToolParameterType::Array,
                    "object" => ToolParameterType::Object,
                    _ => ToolParameterType::String,
                };
                properties.insert(
                    key.clone(),
                    ToolParameter {
                        param_type,
                        description,
                        enum_values: None,
                        items: None,
                    },
                );
            }
        }
    }
    let required = required_val
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    ToolParametersDefinition {
        param_type: "object".to_string(),
        properties,
        required,
    }
}

/// Extracts an error detail from a tool server response body, falling back
/// to the raw text.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| body.to_string())
}

impl ToolRegistry {
    pub fn new(
        http_client: Client,
        server_configs: &HashMap<String, ToolServerConfig>,
    ) -> Self {
        let servers = server_configs
            .iter()
            .map(|(id, conf)| (id.clone(), conf.url.trim_end_matches('/').to_string()))
            .collect();
        Self {
            http_client,
            servers,
            definitions: Vec::new(),
            routes: HashMap::new(),
        }
    }

    /// Fetches every server's tool catalog and builds the route table.
    ///
    /// A server that cannot be reached is skipped with a warning so the
    /// remaining tools stay usable; duplicate tool names keep the first
    /// registration.
    pub async fn connect(&mut self) -> Result<()> {
        self.definitions.clear();
        self.routes.clear();

        for (server_id, base_url) in &self.servers {
            let url = format!("{}/tools", base_url);
            let descriptors: Vec<ToolDescriptor> = match self.fetch_catalog(&url).await {
                Ok(d) => d,
                Err(e) => {
                    warn!(server_id = %server_id, error = ?e, "Failed to fetch tool catalog from server");
                    continue;
                }
            };

            for descriptor in descriptors {
                if let Some(existing) = self.routes.get(&descriptor.name) {
                    warn!(
                        tool = %descriptor.name,
                        server_id = %server_id,
                        existing = %existing,
                        "Duplicate tool name in catalog, keeping first registration"
                    );
                    continue;
                }
                let schema_map = descriptor.parameters.as_ref().and_then(Value::as_object);
                self.definitions.push(ToolDefinition {
                    name: descriptor.name.clone(),
                    description: descriptor.description.clone(),
                    parameters: schema_to_tool_params(schema_map),
                });
                self.routes.insert(descriptor.name, server_id.clone());
            }
        }

        info!(
            num_tools = self.definitions.len(),
            num_servers = self.servers.len(),
            "Tool registry connected."
        );
        Ok(())
    }

    async fn fetch_catalog(&self, url: &str) -> Result<Vec<ToolDescriptor>> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to request tool catalog from {}", url))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Tool catalog request failed: {} - {}",
                status,
                error_detail(&body)
            ));
        }
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse tool catalog from {}", url))
    }

    /// Cached definitions of every known tool, in catalog order.
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// Invokes `name` with the given JSON arguments on its owning server.
    pub async fn call(&self, name: &str, args: Value) -> Result<Value> {
        let server_id = self
            .routes
            .get(name)
            .ok_or_else(|| anyhow!("Unknown tool name '{}'", name))?;
        let base_url = self
            .servers
            .get(server_id)
            .ok_or_else(|| anyhow!("Tool server config not found: {}", server_id))?;

        let url = format!("{}/tools/{}", base_url, name);
        debug!(server = %server_id, tool = %name, "Calling remote tool");

        let response = self
            .http_client
            .post(&url)
            .json(&args)
            .send()
            .await
            .with_context(|| format!("Failed to call tool '{}' at {}", name, url))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body for tool '{}'", name))?;

        if !status.is_success() {
            return Err(anyhow!(
                "Tool '{}' failed on server '{}': {} - {}",
                name,
                server_id,
                status,
                error_detail(&body)
            ));
        }

        serde_json::from_str(&body)
            .with_context(|| format!("Tool '{}' returned a non-JSON body", name))
    }
}
