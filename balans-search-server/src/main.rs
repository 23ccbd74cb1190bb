// balans-search-server/src/main.rs

//! Search tool server. Proxies a SearxNG instance for `web_search` and pulls
//! pages down as plain text for `fetch_page`.

mod state;
mod tools;

use anyhow::{Context, Result};
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use state::AppState;

pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    tools::routes(state).layer(cors)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let bind = std::env::var("SEARCH_BIND").unwrap_or_else(|_| "127.0.0.1:9001".to_string());
    let searx_url =
        std::env::var("SEARX_URL").unwrap_or_else(|_| "http://localhost:8080/search".to_string());
    let log_path = std::env::var("SEARCH_LOG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("search_log.jsonl"));

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!(
        "Search tool server listening on {} (SearxNG: {}, log: {})",
        listener.local_addr().context("Failed to read local address")?,
        searx_url,
        log_path.display()
    );

    let state = Arc::new(AppState::new(searx_url, Some(log_path))?);
    axum::serve(listener, app(state))
        .await
        .context("Server error")?;
    Ok(())
}
