// balans-erp-server/src/main.rs

//! Mock ERP tool server. Serves a tool catalog plus a dummy 1C REST API and
//! routes every tool call through that API over HTTP, the way a production
//! deployment would route to a real 1C instance.

mod onec;
mod state;
mod tools;

use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use state::AppState;

pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    Router::new()
        .merge(tools::routes(state.clone()))
        .merge(onec::routes(state))
        .layer(cors)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let bind = std::env::var("ERP_BIND").unwrap_or_else(|_| "127.0.0.1:9000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    let local_addr = listener.local_addr().context("Failed to read local address")?;

    // Point the tool layer at an external 1C instance via ERP_API_URL, or at
    // the bundled mock API served by this same process.
    let api_base_url =
        std::env::var("ERP_API_URL").unwrap_or_else(|_| format!("http://{}", local_addr));

    info!("ERP tool server listening on {} (1C API: {})", local_addr, api_base_url);
    let state = Arc::new(AppState::new(api_base_url));
    axum::serve(listener, app(state))
        .await
        .context("Server error")?;
    Ok(())
}
