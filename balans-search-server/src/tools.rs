// balans-search-server/src/tools.rs

//! Tool surface of the search server: `web_search` backed by a SearxNG
//! instance and `fetch_page` for pulling a page down as plain text.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::io::Write;
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, warn};

use crate::state::AppState;

const MAX_SEARCH_RESULTS: usize = 5;
const MAX_PAGE_CHARS: usize = 3000;

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/tools", get(list_tools))
        .route("/tools/:name", post(call_tool))
        .with_state(state)
}

type ToolError = (StatusCode, Json<Value>);

fn invalid_args(message: &str) -> ToolError {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({"detail": message})),
    )
}

fn internal_error(message: String) -> ToolError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"detail": message})),
    )
}

fn string_arg(args: &Value, key: &str) -> Result<String, ToolError> {
    match args.get(key).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(invalid_args(&format!("missing required argument '{}'", key))),
    }
}

async fn list_tools() -> Json<Value> {
    Json(json!([
        {
            "name": "web_search",
            "description": "Search the web and return up to five results with title, url and snippet.",
            "parameters": {
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Search query"}
                },
                "required": ["query"]
            }
        },
        {
            "name": "fetch_page",
            "description": "Fetch an http(s) page and return its readable text, truncated to 3000 characters.",
            "parameters": {
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "Page URL"}
                },
                "required": ["url"]
            }
        }
    ]))
}

async fn call_tool(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(args): Json<Value>,
) -> Result<Json<Value>, ToolError> {
    debug!("tool call: {} args: {}", name, args);
    match name.as_str() {
        "web_search" => web_search(&state, &args).await,
        "fetch_page" => fetch_page(&state, &args).await,
        _ => Err((
            StatusCode::NOT_FOUND,
            Json(json!({"detail": format!("unknown tool: {}", name)})),
        )),
    }
}

async fn web_search(state: &AppState, args: &Value) -> Result<Json<Value>, ToolError> {
    let query = string_arg(args, "query")?;
    let response = state
        .http_client
        .get(&state.searx_url)
        .query(&[
            ("q", query.as_str()),
            ("format", "json"),
            ("language", "ru"),
            ("safesearch", "1"),
        ])
        .send()
        .await
        .map_err(|e| internal_error(format!("Search request failed: {}", e)))?;
    if !response.status().is_success() {
        return Err(internal_error(format!(
            "Search backend returned status {}",
            response.status()
        )));
    }
    let body: Value = response
        .json()
        .await
        .map_err(|e| internal_error(format!("Search response was not JSON: {}", e)))?;

    let results: Vec<Value> = body
        .get("results")
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .take(MAX_SEARCH_RESULTS)
                .map(|r| {
                    json!({
                        "title": r.get("title").cloned().unwrap_or(Value::Null),
                        "url": r.get("url").cloned().unwrap_or(Value::Null),
                        "snippet": r.get("content").cloned().unwrap_or(Value::Null),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    log_query(state, &query, &results);
    Ok(Json(Value::Array(results)))
}

/// Appends one JSONL record per query. Logging failures are reported but
/// never fail the search itself.
fn log_query(state: &AppState, query: &str, results: &[Value]) {
    let guard = state.log_path.lock().unwrap();
    let Some(path) = guard.as_ref() else {
        return;
    };
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    let record = json!({"ts": timestamp, "query": query, "results": results});
    let appended = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| writeln!(file, "{}", record));
    if let Err(e) = appended {
        warn!("Failed to append search log {}: {}", path.display(), e);
    }
}

async fn fetch_page(state: &AppState, args: &Value) -> Result<Json<Value>, ToolError> {
    let url = string_arg(args, "url")?;
    let parsed = url::Url::parse(&url)
        .map_err(|e| invalid_args(&format!("invalid url '{}': {}", url, e)))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(invalid_args(&format!(
            "unsupported url scheme '{}'",
            parsed.scheme()
        )));
    }

    let response = state
        .http_client
        .get(parsed)
        .send()
        .await
        .map_err(|e| internal_error(format!("Fetch failed: {}", e)))?;
    if !response.status().is_success() {
        return Err(internal_error(format!(
            "Fetch returned status {}",
            response.status()
        )));
    }
    let html = response
        .text()
        .await
        .map_err(|e| internal_error(format!("Failed to read page body: {}", e)))?;

    let text = html2text::from_read(html.as_bytes(), 100);
    let truncated: String = text.chars().take(MAX_PAGE_CHARS).collect();
    Ok(Json(json!(truncated)))
}
