//! HTTP trigger adapter and health endpoint
//!
//! Accepts Pub/Sub push deliveries on `POST /process-video` and hands the
//! decoded message to the pipeline.
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use crate::pipeline::VideoPipeline;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;
use vidproc_types::{ProcessError, ProcessResponse};

const SERVICE_NAME: &str = "video-processor";

/// Pub/Sub push delivery body
#[derive(Debug, Deserialize)]
struct PushEnvelope {
    message: PushMessage,
}

#[derive(Debug, Deserialize)]
struct PushMessage {
    data: String,
}

/// Extract the message bytes from a push envelope
pub fn decode_push_envelope(body: &[u8]) -> Result<Vec<u8>, ProcessError> {
    let envelope: PushEnvelope = serde_json::from_slice(body)
        .map_err(|e| ProcessError::BadRequest(format!("invalid push envelope: {}", e)))?;
    STANDARD
        .decode(envelope.message.data.trim())
        .map_err(|e| ProcessError::BadRequest(format!("invalid message data: {}", e)))
}

/// Build the service router
pub fn router(pipeline: Arc<VideoPipeline>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/process-video", post(process_video))
        .with_state(pipeline)
}

async fn root() -> &'static str {
    "OK"
}

async fn health_check(State(pipeline): State<Arc<VideoPipeline>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "backends": {
            "blob_store": pipeline.blob_backend(),
            "status_store": pipeline.status_backend(),
        },
    }))
}

async fn process_video(
    State(pipeline): State<Arc<VideoPipeline>>,
    body: Bytes,
) -> (StatusCode, String) {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("request", request_id = %request_id);

    let response = async {
        match decode_push_envelope(&body) {
            Ok(payload) => pipeline.process_video(&payload).await,
            Err(e) => {
                warn!(error = %e, detail = e.detail(), "Rejected push delivery");
                ProcessResponse::from(&e)
            }
        }
    }
    .instrument(span)
    .await;

    let status =
        StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, response.message)
}

/// HTTP server
pub struct HttpServer {
    port: u16,
}

impl HttpServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    /// Serve `app` until Ctrl+C or SIGTERM
    pub async fn start(self, app: Router) -> anyhow::Result<()> {
        self.start_with_shutdown(app, Self::termination()).await
    }

    /// Serve `app` until `shutdown` resolves, then drain in-flight requests
    pub async fn start_with_shutdown<F>(self, app: Router, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind HTTP server to {}: {}", addr, e))?;

        info!(port = self.port, "HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }

    /// Resolves on Ctrl+C or, on unix, SIGTERM (Cloud Run stops instances with SIGTERM).
    /// A handler that cannot be installed is logged and never fires.
    async fn termination() {
        let ctrl_c = async {
            match signal::ctrl_c().await {
                Ok(()) => info!("Shutdown signal (Ctrl+C) received"),
                Err(e) => {
                    error!(error = %e, "Unable to listen for Ctrl+C");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("Shutdown signal (SIGTERM) received");
                }
                Err(e) => {
                    error!(error = %e, "Unable to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate => {}
        }
    }
}
