// balans-erp-server/src/onec.rs

//! In-memory mock of the 1C REST API. Field names in the payloads follow the
//! real 1C wire format, which is Russian.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::state::{AppState, next_id};

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/1c/plan_accounts", get(plan_accounts))
        .route("/1c/turnover", get(turnover))
        .route("/1c/nomenclature", get(get_nomenclature).post(create_nomenclature))
        .route("/1c/contractors", get(get_contractor).post(create_contractor))
        .route("/1c/payments", post(create_payment))
        .route("/1c/receipts", post(create_receipt))
        .route("/1c/receipts/:rid", get(get_receipt))
        .with_state(state)
}

fn not_found() -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({"detail": "not found"})))
}

async fn plan_accounts() -> Json<Value> {
    Json(json!([
        {
            "Код": "50",
            "Наименование": "Касса",
            "Представление": "Активный",
            "Забалансовый": false,
            "Валютный": false,
            "Количественный": false
        },
        {
            "Код": "51",
            "Наименование": "Расчётные счета",
            "Представление": "Активный",
            "Забалансовый": false,
            "Валютный": true,
            "Количественный": false
        }
    ]))
}

#[derive(Deserialize)]
struct TurnoverQuery {
    account: Option<String>,
    #[allow(dead_code)]
    #[serde(rename = "periodStart")]
    period_start: Option<String>,
    #[allow(dead_code)]
    #[serde(rename = "periodEnd")]
    period_end: Option<String>,
}

async fn turnover(Query(query): Query<TurnoverQuery>) -> Json<Value> {
    let account = query.account.unwrap_or_else(|| "50".to_string());
    Json(json!([
        {
            "СчетКод": account,
            "Субконто1Представление": "Контрагент А",
            "Субконто2Представление": "Договор 1",
            "Субконто3Представление": "",
            "ОрганизацияПредставление": "ООО \"Ромашка\"",
            "ВалютаНаименование": "руб.",
            "СуммаНачальныйОстаток": 0,
            "СуммаНачальныйОстатокДт": 0,
            "СуммаНачальныйОстатокКт": 0,
            "СуммаКонечныйОстаток": 1000,
            "СуммаКонечныйОстатокДт": 1000,
            "СуммаКонечныйОстатокКт": 0,
            "СуммаОборот": 1000,
            "СуммаОборотДт": 1000,
            "СуммаОборотКт": 0
        },
        {
            "СчетКод": account,
            "Субконто1Представление": "Контрагент Б",
            "Субконто2Представление": "Договор 2",
            "Субконто3Представление": "",
            "ОрганизацияПредставление": "ООО \"Ромашка\"",
            "ВалютаНаименование": "руб.",
            "СуммаНачальныйОстаток": 0,
            "СуммаНачальныйОстатокДт": 0,
            "СуммаНачальныйОстатокКт": 0,
            "СуммаКонечныйОстаток": 2000,
            "СуммаКонечныйОстатокДт": 0,
            "СуммаКонечныйОстатокКт": 2000,
            "СуммаОборот": 2000,
            "СуммаОборотДт": 0,
            "СуммаОборотКт": 2000
        }
    ]))
}

#[derive(Deserialize)]
struct NameQuery {
    name: Option<String>,
}

async fn get_nomenclature(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NameQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let name = query.name.unwrap_or_default();
    let store = state.nomenclature.lock().unwrap();
    for (nid, item) in store.iter() {
        let item_name = item.get("name").and_then(Value::as_str).unwrap_or("");
        if item_name.to_lowercase() == name.to_lowercase() {
            return Ok(Json(with_id(item, "id", nid)));
        }
    }
    Err(not_found())
}

async fn create_nomenclature(
    State(state): State<Arc<AppState>>,
    Json(data): Json<Value>,
) -> Json<Value> {
    let mut store = state.nomenclature.lock().unwrap();
    let nid = next_id(&store);
    store.insert(nid.clone(), data.clone());
    Json(with_id(&data, "id", &nid))
}

#[derive(Deserialize)]
struct InnQuery {
    inn: Option<String>,
}

async fn get_contractor(
    State(state): State<Arc<AppState>>,
    Query(query): Query<InnQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let inn = query.inn.unwrap_or_default();
    let store = state.contractors.lock().unwrap();
    for (cid, contractor) in store.iter() {
        if contractor.get("inn").and_then(Value::as_str) == Some(inn.as_str()) {
            return Ok(Json(with_id(contractor, "id", cid)));
        }
    }
    Err(not_found())
}

async fn create_contractor(
    State(state): State<Arc<AppState>>,
    Json(data): Json<Value>,
) -> Json<Value> {
    let mut store = state.contractors.lock().unwrap();
    let cid = next_id(&store);
    store.insert(cid.clone(), data.clone());
    Json(with_id(&data, "id", &cid))
}

async fn create_payment(
    State(state): State<Arc<AppState>>,
    Json(data): Json<Value>,
) -> Json<Value> {
    let mut store = state.payments.lock().unwrap();
    let pid = next_id(&store);
    let mut record = data;
    if let Some(map) = record.as_object_mut() {
        map.insert("status".to_string(), json!("created"));
    }
    store.insert(pid.clone(), record);
    Json(json!({"payment_id": pid, "status": "created"}))
}

async fn create_receipt(
    State(state): State<Arc<AppState>>,
    Json(data): Json<Value>,
) -> Json<Value> {
    let mut store = state.receipts.lock().unwrap();
    let rid = next_id(&store);
    let mut record = data;
    if let Some(map) = record.as_object_mut() {
        map.insert("status".to_string(), json!("created"));
    }
    store.insert(rid.clone(), record);
    Json(json!({"receipt_id": rid, "status": "created"}))
}

async fn get_receipt(
    State(state): State<Arc<AppState>>,
    Path(rid): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let store = state.receipts.lock().unwrap();
    match store.get(&rid) {
        Some(receipt) => {
            let status = receipt.get("status").and_then(Value::as_str).unwrap_or("created");
            Ok(Json(json!({"receipt_id": rid, "status": status})))
        }
        None => Err(not_found()),
    }
}

/// Returns `record` with `key: id` merged in, mirroring `{"id": nid, **item}`.
fn with_id(record: &Value, key: &str, id: &str) -> Value {
    let mut out = json!({ key: id });
    if let (Some(out_map), Some(record_map)) = (out.as_object_mut(), record.as_object()) {
        for (k, v) in record_map {
            out_map.insert(k.clone(), v.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_router() -> Router {
        routes(Arc::new(AppState::new("http://unused".to_string())))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_plan_accounts_returns_chart() {
        let response = test_router()
            .oneshot(Request::builder().uri("/1c/plan_accounts").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert_eq!(body[0]["Код"], "50");
    }

    #[tokio::test]
    async fn test_turnover_echoes_account() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/1c/turnover?account=62&periodStart=01-01-2024&periodEnd=31-01-2024")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body[0]["СчетКод"], "62");
        assert_eq!(body[1]["СуммаОборотКт"], 2000);
    }

    #[tokio::test]
    async fn test_missing_nomenclature_is_404() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/1c/nomenclature?name=Bolt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["detail"], "not found");
    }

    #[tokio::test]
    async fn test_create_then_get_nomenclature() {
        let app = test_router();
        let response = app
            .clone()
            .oneshot(post_json("/1c/nomenclature", json!({"name": "Bolt M6", "unit": "pcs"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let created = body_json(response).await;
        assert_eq!(created["id"], "1");
        assert_eq!(created["name"], "Bolt M6");

        // Lookup is case-insensitive.
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/1c/nomenclature?name=bolt%20m6")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let found = body_json(response).await;
        assert_eq!(found["id"], "1");
    }

    #[tokio::test]
    async fn test_contractor_lookup_by_inn() {
        let app = test_router();
        let create = post_json(
            "/1c/contractors",
            json!({"name": "OOO Romashka", "inn": "7707083893", "account": "40702810", "bank": "Sber"}),
        );
        let response = app.clone().oneshot(create).await.unwrap();
        let created = body_json(response).await;
        assert_eq!(created["id"], "1");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/1c/contractors?inn=7707083893")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let found = body_json(response).await;
        assert_eq!(found["name"], "OOO Romashka");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/1c/contractors?inn=0000000000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_receipt_roundtrip_and_missing_status() {
        let app = test_router();
        let response = app
            .clone()
            .oneshot(post_json("/1c/receipts", json!({"items": [{"name": "Bolt M6", "qty": 10}]})))
            .await
            .unwrap();
        let created = body_json(response).await;
        assert_eq!(created["receipt_id"], "1");
        assert_eq!(created["status"], "created");

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/1c/receipts/1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let found = body_json(response).await;
        assert_eq!(found["status"], "created");

        let response = app
            .oneshot(Request::builder().uri("/1c/receipts/99").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_payment_gets_assigned_id() {
        let response = test_router()
            .oneshot(post_json("/1c/payments", json!({"amount": 1500, "inn": "7707083893"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["payment_id"], "1");
        assert_eq!(body["status"], "created");
    }
}
