// balans-core/src/lib.rs

//! Core library for the Balans assistant: conversation and tool models, the
//! chat-completion client, the remote tool registry, the tool-call extractor
//! and the dispatch loop that ties them together.

pub mod agent;
pub mod api;
pub mod config;
pub mod errors;
pub mod extract;
pub mod registry;

pub mod models {
    pub mod chat;
    pub mod tools;
}


pub use agent::Agent;
pub use config::{AgentConfig, ProviderConfig, ToolServerConfig};
pub use errors::AgentError;
pub use extract::{
    ExtractedToolCalls, StreamStep, extract_first_json, extract_tool_calls,
    extract_tool_calls_streaming,
};
pub use models::chat::{ApiResponse, ChatMessage, Choice};
pub use models::tools::{
    ToolCall, ToolDefinition, ToolFunction, ToolParameter, ToolParameterType,
    ToolParametersDefinition,
};
pub use registry::{ToolDescriptor, ToolRegistry};
