// balans-core/src/extract.rs

//! Extraction of tool-call directives from raw model output.
//!
//! Some function-calling models emit the call as a bare JSON object inside
//! the text stream instead of the structured `tool_calls` field. This module
//! scans the output for the first balanced-brace JSON object, tolerating
//! leading noise and, in the streaming variant, incomplete JSON.
//!
//! The dispatch loop itself never calls this: it expects an endpoint that
//! already returns structured `tool_calls`. The extractor is the piece a
//! model-serving shim plugs in front of a raw text model to produce that
//! field, which is why it is exported rather than consumed here.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::models::tools::{ToolCall, ToolFunction};

/// Result of scanning one completion's text for tool calls.
#[derive(Debug, Clone)]
pub struct ExtractedToolCalls {
    pub tools_called: bool,
    pub tool_calls: Vec<ToolCall>,
    /// The raw model output, returned untouched so callers can fall back to
    /// treating it as plain text.
    pub content: String,
}

impl ExtractedToolCalls {
    fn none(content: &str) -> Self {
        Self {
            tools_called: false,
            tool_calls: Vec::new(),
            content: content.to_string(),
        }
    }
}

/// One step of the streaming extractor.
#[derive(Debug, Clone)]
pub enum StreamStep {
    /// Pass the incremental text delta through verbatim.
    Delta(String),
    /// The buffered text ended with a closing bracket; extraction ran.
    ToolCalls(ExtractedToolCalls),
}

/// Returns the first balanced, non-empty JSON object in `s`, if any.
///
/// Leading noise before the object is skipped. Candidates that fail to parse
/// or parse to an empty object advance the scan instead of aborting it.
pub fn extract_first_json(s: &str) -> Option<&str> {
    let mut pos = 0;

    loop {
        let start = pos + s.get(pos..)?.find('{')?;

        let mut depth: i32 = 0;
        let mut advanced = false;
        for (i, ch) in s[start..].char_indices() {
            match ch {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        let candidate = &s[start..start + i + 1];
                        match serde_json::from_str::<Value>(candidate) {
                            Ok(Value::Object(map)) if map.is_empty() => {
                                pos = start + 1;
                                advanced = true;
                            }
                            Ok(_) => return Some(candidate),
                            Err(_) => {
                                pos = start + 1;
                                advanced = true;
                            }
                        }
                        break;
                    }
                }
                _ => {}
            }
        }
        if !advanced {
            // Braces never balanced before the end of input.
            return None;
        }
    }
}

#[derive(Deserialize)]
struct RawToolCall {
    name: String,
    arguments: Value,
}

/// Scans a complete model output for a tool-call directive and normalizes it.
///
/// The extracted object is wrapped in a one-element array before parsing,
/// matching the shape the model was prompted with. Any failure (no object,
/// missing fields, unserializable arguments) degrades to "no tool call
/// extracted" with the raw output preserved as content.
pub fn extract_tool_calls(model_output: &str) -> ExtractedToolCalls {
    let json_str = match extract_first_json(model_output) {
        Some(s) => s,
        None => return ExtractedToolCalls::none(model_output),
    };

    let wrapped = format!("[{}]", json_str);
    let raw_calls: Vec<RawToolCall> = match serde_json::from_str(&wrapped) {
        Ok(calls) => calls,
        Err(e) => {
            debug!(error = %e, candidate = %json_str, "Extracted JSON is not a tool call");
            return ExtractedToolCalls::none(model_output);
        }
    };

    let mut tool_calls = Vec::new();
    for (idx, call) in raw_calls.into_iter().enumerate() {
        let arguments = match serde_json::to_string(&call.arguments) {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, "Failed to re-serialize tool call arguments");
                return ExtractedToolCalls::none(model_output);
            }
        };
        tool_calls.push(ToolCall {
            id: format!("call_{}_{}", idx, Uuid::new_v4()),
            call_type: "function".to_string(),
            function: ToolFunction {
                name: call.name,
                arguments,
            },
        });
    }

    ExtractedToolCalls {
        tools_called: true,
        tool_calls,
        content: model_output.to_string(),
    }
}

/// Streaming variant: extraction is only attempted once the accumulated text
/// ends with a closing bracket; until then each delta passes through.
pub fn extract_tool_calls_streaming(current_text: &str, delta_text: &str) -> StreamStep {
    if current_text.ends_with(']') {
        StreamStep::ToolCalls(extract_tool_calls(current_text))
    } else {
        StreamStep::Delta(delta_text.to_string())
    }
}
