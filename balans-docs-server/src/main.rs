// balans-docs-server/src/main.rs

//! Document store tool server. Serves document listing, full text and line
//! search over a SQLite database.

mod store;
mod tools;

use anyhow::{Context, Result};
use axum::Router;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use store::DocumentStore;

pub fn app(store: tools::SharedStore) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    tools::routes(store).layer(cors)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let bind = std::env::var("DOCS_BIND").unwrap_or_else(|_| "127.0.0.1:9002".to_string());
    let db_path = std::env::var("DOCS_DB")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("documents.sqlite"));

    let store = DocumentStore::open(&db_path)
        .with_context(|| format!("Failed to open document store {}", db_path.display()))?;

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!(
        "Document tool server listening on {} (db: {})",
        listener.local_addr().context("Failed to read local address")?,
        db_path.display()
    );

    axum::serve(listener, app(Arc::new(Mutex::new(store))))
        .await
        .context("Server error")?;
    Ok(())
}
