//! Health check and metrics handlers

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::error;

use crate::api::server::StreamServer;

/// Health check
pub async fn health_check(State(server): State<StreamServer>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "sessions": server.gate.registry().len(),
        "max_connections": server.gate.max_connections(),
        "processed": server.stats.processed(),
        "suspicious": server.stats.suspicious(),
        "classifier": server.classifier_mode,
    }))
}

/// Prometheus text exposition
pub async fn metrics(State(server): State<StreamServer>) -> Response {
    match server.metrics.export_metrics() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to export metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
