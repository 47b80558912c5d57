//! `serve` command: run the Turn API

use crate::config::Config;
use crate::error::Result;
use crate::server::{serve, AppState};
use std::sync::Arc;

/// Start the HTTP server on `bind`, or the configured address
///
/// # Errors
///
/// Returns error if providers cannot be built or the address cannot be bound
pub async fn run_serve(config: Config, bind: Option<String>) -> Result<()> {
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let state = Arc::new(AppState::from_config(&config)?);
    tracing::info!(
        retrieval = state.retrieval.is_some(),
        "Starting Turn API on {}",
        bind
    );
    serve(state, &bind).await
}
