// balans-search-server/src/state.rs

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

pub struct AppState {
    pub searx_url: String,
    pub http_client: reqwest::Client,
    /// JSONL query log. The mutex serializes appends from concurrent handlers.
    pub log_path: Mutex<Option<PathBuf>>,
}

impl AppState {
    pub fn new(searx_url: String, log_path: Option<PathBuf>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            searx_url,
            http_client,
            log_path: Mutex::new(log_path),
        })
    }
}
