//! HTTP API for card extraction.
//!
//! Exposes the extraction pipeline over a small JSON API:
//! - single and batch image upload (multipart)
//! - CSV download of accumulated results
//! - service info and health endpoints

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Settings;
use crate::dispatch::Dispatcher;

/// Shared state for the API server.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let dispatcher = Dispatcher::from_settings(settings)?;
        if !dispatcher.has_providers() {
            tracing::warn!("server: no providers configured, extractions will fail");
        }

        Ok(Self {
            dispatcher: Arc::new(dispatcher),
            max_upload_bytes: settings.max_upload_bytes,
        })
    }
}

/// Start the API server.
pub async fn serve(settings: &Settings, host: &str, port: u16) -> anyhow::Result<()> {
    let state = AppState::new(settings)?;
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
