// balans-erp-server/src/state.rs
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// Shared state: the in-memory stores backing the mock 1C API, plus the
/// client and base URL the tool layer uses to call that API over HTTP.
pub struct AppState {
    pub api_base_url: String,
    pub http_client: reqwest::Client,
    pub nomenclature: Mutex<HashMap<String, Value>>,
    pub contractors: Mutex<HashMap<String, Value>>,
    pub payments: Mutex<HashMap<String, Value>>,
    pub receipts: Mutex<HashMap<String, Value>>,
}

impl AppState {
    pub fn new(api_base_url: String) -> Self {
        Self {
            api_base_url,
            http_client: reqwest::Client::new(),
            nomenclature: Mutex::new(HashMap::new()),
            contractors: Mutex::new(HashMap::new()),
            payments: Mutex::new(HashMap::new()),
            receipts: Mutex::new(HashMap::new()),
        }
    }
}

/// Assigns the next id for a store: ids are 1-based numeric strings.
pub fn next_id(store: &HashMap<String, Value>) -> String {
    (store.len() + 1).to_string()
}
