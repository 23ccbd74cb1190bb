// balans-docs-server/src/tools.rs

//! Tool surface of the document store server.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::store::DocumentStore;

pub type SharedStore = Arc<Mutex<DocumentStore>>;

pub fn routes(store: SharedStore) -> Router {
    Router::new()
        .route("/tools", get(list_tools))
        .route("/tools/:name", post(call_tool))
        .with_state(store)
}

type ToolError = (StatusCode, Json<Value>);

fn invalid_args(message: &str) -> ToolError {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({"detail": message})),
    )
}

fn store_error(err: anyhow::Error) -> ToolError {
    warn!("document store error: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"detail": format!("document store error: {}", err)})),
    )
}

fn doc_number_arg(args: &Value) -> Result<i64, ToolError> {
    args.get("doc_number")
        .and_then(Value::as_i64)
        .ok_or_else(|| invalid_args("missing required argument 'doc_number'"))
}

async fn list_tools() -> Json<Value> {
    Json(json!([
        {
            "name": "list_documents",
            "description": "List stored documents with their numbers and names.",
            "parameters": {"type": "object", "properties": {}, "required": []}
        },
        {
            "name": "get_document_text",
            "description": "Get the full text of a document by its number.",
            "parameters": {
                "type": "object",
                "properties": {
                    "doc_number": {"type": "integer", "description": "Document number"}
                },
                "required": ["doc_number"]
            }
        },
        {
            "name": "search_document",
            "description": "Find lines of a document containing a phrase, case-insensitively.",
            "parameters": {
                "type": "object",
                "properties": {
                    "doc_number": {"type": "integer", "description": "Document number"},
                    "query": {"type": "string", "description": "Phrase to look for"}
                },
                "required": ["doc_number", "query"]
            }
        }
    ]))
}

async fn call_tool(
    State(store): State<SharedStore>,
    Path(name): Path<String>,
    Json(args): Json<Value>,
) -> Result<Json<Value>, ToolError> {
    debug!("tool call: {} args: {}", name, args);
    match name.as_str() {
        "list_documents" => list_documents(&store),
        "get_document_text" => get_document_text(&store, &args),
        "search_document" => search_document(&store, &args),
        _ => Err((
            StatusCode::NOT_FOUND,
            Json(json!({"detail": format!("unknown tool: {}", name)})),
        )),
    }
}

fn list_documents(store: &SharedStore) -> Result<Json<Value>, ToolError> {
    let documents = store.lock().unwrap().list().map_err(store_error)?;
    let listed: Vec<Value> = documents
        .iter()
        .map(|d| json!({"id": d.id, "name": d.name}))
        .collect();
    Ok(Json(Value::Array(listed)))
}

fn get_document_text(store: &SharedStore, args: &Value) -> Result<Json<Value>, ToolError> {
    let doc_number = doc_number_arg(args)?;
    let text = store.lock().unwrap().text(doc_number).map_err(store_error)?;
    match text {
        Some(text) => Ok(Json(json!(text))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({"detail": format!("document {} not found", doc_number)})),
        )),
    }
}

fn search_document(store: &SharedStore, args: &Value) -> Result<Json<Value>, ToolError> {
    let doc_number = doc_number_arg(args)?;
    let query = match args.get("query").and_then(Value::as_str) {
        Some(q) if !q.is_empty() => q,
        _ => return Err(invalid_args("missing required argument 'query'")),
    };
    let matches = store
        .lock()
        .unwrap()
        .search(doc_number, query)
        .map_err(store_error)?;
    match matches {
        Some(matches) => {
            let listed: Vec<Value> = matches
                .iter()
                .map(|m| json!({"line_number": m.line_number, "text": m.text}))
                .collect();
            Ok(Json(Value::Array(listed)))
        }
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({"detail": format!("document {} not found", doc_number)})),
        )),
    }
}
