// Axum request handlers — translate download requests into relay operations.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::AUDIO_FILE_EXTENSION;
use crate::extractor::provision::BinaryProvisioner;
use crate::extractor::title::resolve_title;
use crate::normalize::normalize_media_url;
use crate::relay::stream::open_stream;

pub type SharedProvisioner = Arc<BinaryProvisioner>;

pub struct RelayServer {
    port: u16,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl RelayServer {
    /// Bind `addr` (port 0 allowed) and serve in a background task,
    /// returning a handle.
    pub async fn start(addr: &str, provisioner: SharedProvisioner) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let app = router(provisioner);

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Ok(Self {
            port,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Shutdown the server gracefully.
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

fn router(provisioner: SharedProvisioner) -> Router {
    // The client library reads the attachment filename, so the disposition
    // header must be visible cross-origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .expose_headers([header::CONTENT_DISPOSITION]);

    Router::new()
        .route("/", get(health_handler))
        .route("/download", get(download_handler))
        .layer(cors)
        .with_state(provisioner)
}

/// GET / — health/welcome route.
async fn health_handler() -> &'static str {
    "Music Player Download Server is Online!"
}

#[derive(Debug, Deserialize)]
struct DownloadParams {
    url: Option<String>,
}

/// GET /download?url=... — stream extracted audio back as an attachment.
async fn download_handler(
    State(provisioner): State<SharedProvisioner>,
    Query(params): Query<DownloadParams>,
) -> Response {
    let raw_url = match params.url {
        Some(url) if !url.trim().is_empty() => url,
        _ => return (StatusCode::BAD_REQUEST, "URL is required").into_response(),
    };

    let clean_url = normalize_media_url(&raw_url);
    info!("download requested for {clean_url}");

    if !provisioner.is_ready() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Server is still initializing (extractor downloading). Please retry shortly.",
        )
            .into_response();
    }

    // Best-effort: a failed probe yields the fallback title, never an error.
    let title = resolve_title(provisioner.binary_path(), &clean_url).await;
    info!("starting stream: {}", title.as_str());

    let relay = match open_stream(provisioner.binary_path(), &clean_url).await {
        Ok(relay) => relay,
        Err(err) => {
            error!("relay failed before first byte: {err:#}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("extraction failed: {err}"),
            )
                .into_response();
        }
    };

    let disposition = format!(
        "attachment; filename=\"{}.{}\"",
        title.as_str(),
        AUDIO_FILE_EXTENSION
    );

    (
        [
            (header::CONTENT_TYPE, "audio/mpeg".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        relay.body,
    )
        .into_response()
}
