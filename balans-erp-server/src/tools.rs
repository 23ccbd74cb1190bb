// balans-erp-server/src/tools.rs

//! Tool surface of the ERP server. Each tool handler talks to the 1C API
//! over HTTP and reshapes the response for the model.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::state::AppState;

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

fn upstream_error(context: &str, err: reqwest::Error) -> ToolError {
    warn!("1C API request failed ({}): {}", context, err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"detail": format!("1C API request failed: {}", err)})),
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
            "name": "get_accounts",
            "description": "Get the chart of accounts from 1C with codes, names and flags.",
            "parameters": {"type": "object", "properties": {}, "required": []}
        },
        {
            "name": "get_debit",
            "description": "Get debit turnover rows for an account over a period.",
            "parameters": {
                "type": "object",
                "properties": {
                    "account": {"type": "string", "description": "Account code, e.g. '50'"},
                    "period_start": {"type": "string", "description": "Period start, DD-MM-YYYY"},
                    "period_end": {"type": "string", "description": "Period end, DD-MM-YYYY"}
                },
                "required": ["account"]
            }
        },
        {
            "name": "get_credit",
            "description": "Get credit turnover rows for an account over a period.",
            "parameters": {
                "type": "object",
                "properties": {
                    "account": {"type": "string", "description": "Account code, e.g. '50'"},
                    "period_start": {"type": "string", "description": "Period start, DD-MM-YYYY"},
                    "period_end": {"type": "string", "description": "Period end, DD-MM-YYYY"}
                },
                "required": ["account"]
            }
        },
        {
            "name": "get_nomenclature",
            "description": "Find a nomenclature item by exact name. Returns null when absent.",
            "parameters": {
                "type": "object",
                "properties": {
                    "name": {"type": "string", "description": "Item name"}
                },
                "required": ["name"]
            }
        },
        {
            "name": "create_nomenclature",
            "description": "Create a nomenclature item.",
            "parameters": {
                "type": "object",
                "properties": {
                    "name": {"type": "string", "description": "Item name"},
                    "unit": {"type": "string", "description": "Unit of measure"}
                },
                "required": ["name", "unit"]
            }
        },
        {
            "name": "get_contractor",
            "description": "Find a contractor by INN. Returns null when absent.",
            "parameters": {
                "type": "object",
                "properties": {
                    "inn": {"type": "string", "description": "Tax identification number"}
                },
                "required": ["inn"]
            }
        },
        {
            "name": "create_contractor",
            "description": "Create a contractor with bank details.",
            "parameters": {
                "type": "object",
                "properties": {
                    "name": {"type": "string", "description": "Contractor name"},
                    "inn": {"type": "string", "description": "Tax identification number"},
                    "account": {"type": "string", "description": "Settlement account number"},
                    "bank": {"type": "string", "description": "Bank name"}
                },
                "required": ["name", "inn", "account", "bank"]
            }
        },
        {
            "name": "create_payment",
            "description": "Create an outgoing payment order from a document object.",
            "parameters": {
                "type": "object",
                "properties": {
                    "data": {"type": "object", "description": "Payment document fields"}
                },
                "required": ["data"]
            }
        },
        {
            "name": "create_receipt",
            "description": "Create a goods receipt from a document object.",
            "parameters": {
                "type": "object",
                "properties": {
                    "data": {"type": "object", "description": "Receipt document fields"}
                },
                "required": ["data"]
            }
        },
        {
            "name": "get_receipt_status",
            "description": "Get the processing status of a previously created receipt.",
            "parameters": {
                "type": "object",
                "properties": {
                    "receipt_id": {"type": "string", "description": "Receipt id"}
                },
                "required": ["receipt_id"]
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
        "get_accounts" => get_accounts(&state).await,
        "get_debit" => get_turnover(&state, &args, "СуммаОборотДт").await,
        "get_credit" => get_turnover(&state, &args, "СуммаОборотКт").await,
        "get_nomenclature" => get_nomenclature(&state, &args).await,
        "create_nomenclature" => create_nomenclature(&state, &args).await,
        "get_contractor" => get_contractor(&state, &args).await,
        "create_contractor" => create_contractor(&state, &args).await,
        "create_payment" => create_document(&state, &args, "/1c/payments").await,
        "create_receipt" => create_document(&state, &args, "/1c/receipts").await,
        "get_receipt_status" => get_receipt_status(&state, &args).await,
        _ => Err((
            StatusCode::NOT_FOUND,
            Json(json!({"detail": format!("unknown tool: {}", name)})),
        )),
    }
}

async fn get_accounts(state: &AppState) -> Result<Json<Value>, ToolError> {
    let url = format!("{}/1c/plan_accounts", state.api_base_url);
    let response = state
        .http_client
        .get(&url)
        .send()
        .await
        .map_err(|e| upstream_error("plan_accounts", e))?;
    let body: Value = response
        .json()
        .await
        .map_err(|e| upstream_error("plan_accounts", e))?;
    Ok(Json(body))
}

/// Flattens raw 1C turnover rows to `{account, analytics, amount}`, taking the
/// amount from `amount_field` and joining the non-empty subconto views.
async fn get_turnover(
    state: &AppState,
    args: &Value,
    amount_field: &str,
) -> Result<Json<Value>, ToolError> {
    let account = string_arg(args, "account")?;
    let mut url =
        reqwest::Url::parse(&format!("{}/1c/turnover", state.api_base_url)).map_err(|e| {
            warn!("bad 1C API base url: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"detail": "bad 1C API base url"})),
            )
        })?;
    url.query_pairs_mut().append_pair("account", &account);
    if let Some(start) = args.get("period_start").and_then(Value::as_str) {
        url.query_pairs_mut().append_pair("periodStart", start);
    }
    if let Some(end) = args.get("period_end").and_then(Value::as_str) {
        url.query_pairs_mut().append_pair("periodEnd", end);
    }

    let response = state
        .http_client
        .get(url)
        .send()
        .await
        .map_err(|e| upstream_error("turnover", e))?;
    let rows: Value = response
        .json()
        .await
        .map_err(|e| upstream_error("turnover", e))?;

    let flattened: Vec<Value> = rows
        .as_array()
        .map(|rows| rows.iter().map(|row| flatten_row(row, amount_field)).collect())
        .unwrap_or_default();
    Ok(Json(Value::Array(flattened)))
}

fn flatten_row(row: &Value, amount_field: &str) -> Value {
    let analytics: Vec<&str> = [
        "Субконто1Представление",
        "Субконто2Представление",
        "Субконто3Представление",
    ]
    .iter()
    .filter_map(|key| row.get(*key).and_then(Value::as_str))
    .filter(|s| !s.is_empty())
    .collect();
    json!({
        "account": row.get("СчетКод").cloned().unwrap_or(Value::Null),
        "analytics": analytics.join(", "),
        "amount": row.get(amount_field).cloned().unwrap_or(Value::Null),
    })
}

async fn get_nomenclature(state: &AppState, args: &Value) -> Result<Json<Value>, ToolError> {
    let name = string_arg(args, "name")?;
    let url = format!("{}/1c/nomenclature", state.api_base_url);
    lookup_or_null(state, &url, &[("name", &name)], "nomenclature").await
}

async fn create_nomenclature(state: &AppState, args: &Value) -> Result<Json<Value>, ToolError> {
    let name = string_arg(args, "name")?;
    let unit = string_arg(args, "unit")?;
    let url = format!("{}/1c/nomenclature", state.api_base_url);
    post_json(state, &url, json!({"name": name, "unit": unit}), "nomenclature").await
}

async fn get_contractor(state: &AppState, args: &Value) -> Result<Json<Value>, ToolError> {
    let inn = string_arg(args, "inn")?;
    let url = format!("{}/1c/contractors", state.api_base_url);
    lookup_or_null(state, &url, &[("inn", &inn)], "contractors").await
}

async fn create_contractor(state: &AppState, args: &Value) -> Result<Json<Value>, ToolError> {
    let body = json!({
        "name": string_arg(args, "name")?,
        "inn": string_arg(args, "inn")?,
        "account": string_arg(args, "account")?,
        "bank": string_arg(args, "bank")?,
    });
    let url = format!("{}/1c/contractors", state.api_base_url);
    post_json(state, &url, body, "contractors").await
}

async fn create_document(
    state: &AppState,
    args: &Value,
    path: &str,
) -> Result<Json<Value>, ToolError> {
    let data = match args.get("data") {
        Some(data) if data.is_object() => data.clone(),
        _ => return Err(invalid_args("missing required argument 'data'")),
    };
    let url = format!("{}{}", state.api_base_url, path);
    post_json(state, &url, data, path).await
}

async fn get_receipt_status(state: &AppState, args: &Value) -> Result<Json<Value>, ToolError> {
    let receipt_id = string_arg(args, "receipt_id")?;
    let url = format!("{}/1c/receipts/{}", state.api_base_url, receipt_id);
    let response = state
        .http_client
        .get(&url)
        .send()
        .await
        .map_err(|e| upstream_error("receipts", e))?;
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| upstream_error("receipts", e))?;
    if status.is_success() {
        Ok(Json(body))
    } else {
        Err((
            StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Json(body),
        ))
    }
}

/// GET lookup that maps an upstream 404 to a JSON null result. The model then
/// sees "absent" instead of a transport error it cannot act on.
async fn lookup_or_null(
    state: &AppState,
    url: &str,
    query: &[(&str, &str)],
    context: &str,
) -> Result<Json<Value>, ToolError> {
    let response = state
        .http_client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| upstream_error(context, e))?;
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(Json(Value::Null));
    }
    let status = response.status();
    let body: Value = response.json().await.map_err(|e| upstream_error(context, e))?;
    if status.is_success() {
        Ok(Json(body))
    } else {
        Err((
            StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Json(body),
        ))
    }
}

async fn post_json(
    state: &AppState,
    url: &str,
    body: Value,
    context: &str,
) -> Result<Json<Value>, ToolError> {
    let response = state
        .http_client
        .post(url)
        .json(&body)
        .send()
        .await
        .map_err(|e| upstream_error(context, e))?;
    let status = response.status();
    let result: Value = response.json().await.map_err(|e| upstream_error(context, e))?;
    if status.is_success() {
        Ok(Json(result))
    } else {
        Err((
            StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Json(result),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app;

    // Tool handlers go through reqwest, so the tests run the full router on a
    // real listener instead of tower::oneshot.
    async fn spawn_app() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);
        let state = Arc::new(AppState::new(base_url.clone()));
        let router = app(state);
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        base_url
    }

    async fn call(base: &str, tool: &str, args: Value) -> (reqwest::StatusCode, Value) {
        let client = reqwest::Client::new();
        let response = client
            .post(format!("{}/tools/{}", base, tool))
            .json(&args)
            .send()
            .await
            .unwrap();
        let status = response.status();
        let body = response.json().await.unwrap();
        (status, body)
    }

    #[tokio::test]
    async fn test_catalog_lists_all_tools() {
        let base = spawn_app().await;
        let tools: Value = reqwest::get(format!("{}/tools", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let names: Vec<&str> = tools
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names.len(), 10);
        assert!(names.contains(&"get_debit"));
        assert!(names.contains(&"get_receipt_status"));
        for tool in tools.as_array().unwrap() {
            assert_eq!(tool["parameters"]["type"], "object");
        }
    }

    #[tokio::test]
    async fn test_get_debit_flattens_rows() {
        let base = spawn_app().await;
        let (status, body) = call(&base, "get_debit", json!({"account": "50"})).await;
        assert_eq!(status, reqwest::StatusCode::OK);
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["account"], "50");
        assert_eq!(rows[0]["analytics"], "Контрагент А, Договор 1");
        assert_eq!(rows[0]["amount"], 1000);
        assert_eq!(rows[1]["amount"], 0);
    }

    #[tokio::test]
    async fn test_get_credit_uses_credit_amounts() {
        let base = spawn_app().await;
        let (status, body) = call(&base, "get_credit", json!({"account": "62"})).await;
        assert_eq!(status, reqwest::StatusCode::OK);
        assert_eq!(body[0]["amount"], 0);
        assert_eq!(body[1]["amount"], 2000);
    }

    #[tokio::test]
    async fn test_missing_nomenclature_is_null() {
        let base = spawn_app().await;
        let (status, body) = call(&base, "get_nomenclature", json!({"name": "Nothing"})).await;
        assert_eq!(status, reqwest::StatusCode::OK);
        assert!(body.is_null());
    }

    #[tokio::test]
    async fn test_create_then_find_contractor() {
        let base = spawn_app().await;
        let (status, created) = call(
            &base,
            "create_contractor",
            json!({"name": "OOO Vector", "inn": "5028031961", "account": "40702810", "bank": "Alfa"}),
        )
        .await;
        assert_eq!(status, reqwest::StatusCode::OK);
        assert_eq!(created["id"], "1");

        let (status, found) = call(&base, "get_contractor", json!({"inn": "5028031961"})).await;
        assert_eq!(status, reqwest::StatusCode::OK);
        assert_eq!(found["name"], "OOO Vector");
    }

    #[tokio::test]
    async fn test_receipt_lifecycle() {
        let base = spawn_app().await;
        let (status, created) = call(
            &base,
            "create_receipt",
            json!({"data": {"items": [{"name": "Bolt M6", "qty": 10}]}}),
        )
        .await;
        assert_eq!(status, reqwest::StatusCode::OK);
        let rid = created["receipt_id"].as_str().unwrap().to_string();

        let (status, found) = call(&base, "get_receipt_status", json!({"receipt_id": rid})).await;
        assert_eq!(status, reqwest::StatusCode::OK);
        assert_eq!(found["status"], "created");

        let (status, body) =
            call(&base, "get_receipt_status", json!({"receipt_id": "99"})).await;
        assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "not found");
    }

    #[tokio::test]
    async fn test_missing_argument_is_422() {
        let base = spawn_app().await;
        let (status, body) = call(&base, "get_debit", json!({})).await;
        assert_eq!(status, reqwest::StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].as_str().unwrap().contains("account"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_404() {
        let base = spawn_app().await;
        let (status, body) = call(&base, "no_such_tool", json!({})).await;
        assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
        assert!(body["detail"].as_str().unwrap().contains("no_such_tool"));
    }
}
