//! HTTP surface over the story pipeline.

mod routes;

use std::sync::Arc;

use axum::{routing::get, Router};
use tgs_core::{fetcher::StoryFetcher, ports::FileHost, response::ResponseAssembler};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use routes::status_for;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub fetcher: Arc<StoryFetcher>,
    pub assembler: ResponseAssembler,
    pub file_host: Option<Arc<dyn FileHost>>,
    /// Cancelled on shutdown; every request runs under a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(fetcher: Arc<StoryFetcher>, assembler: ResponseAssembler) -> Self {
        Self {
            fetcher,
            assembler,
            file_host: None,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_file_host(mut self, host: Arc<dyn FileHost>) -> Self {
        self.file_host = Some(host);
        self
    }

    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/direct", get(routes::direct))
        .route("/api/download", get(routes::download))
        .route("/api/base64", get(routes::base64))
        .route("/api/check", get(routes::check))
        .route("/api/health", get(routes::health))
        .with_state(state)
}

/// Serve until the state's shutdown token is cancelled.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    let token = state.shutdown.clone();
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "http server listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await
}
