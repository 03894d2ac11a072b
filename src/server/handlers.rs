//! HTTP request handlers
//!
//! Contains handlers for all HTTP endpoints.

use axum::{extract::State, http::StatusCode, response::Html, Json};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::AppState;
use crate::error::AppResult;
use crate::metrics::StatsSnapshot;
use crate::source::MessageSource;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    /// Health status
    status: String,
    /// Application version
    version: String,
}

/// Message published through the ingest endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct PublishRequest {
    /// Full topic including the configured prefix
    pub topic: String,
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub qos: u8,
    #[serde(default)]
    pub retain: bool,
}

/// Result of a publish call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishResponse {
    /// The message was queued for the rule engine
    pub accepted: bool,
    pub topic: String,
}

/// Root endpoint - displays basic info
pub async fn root(State(state): State<AppState>) -> Html<String> {
    let prefix = state.source.prefix();
    let subscriptions: String = state
        .source
        .subscriptions()
        .iter()
        .map(|filter| format!("        <li><code>{}{}</code></li>\n", prefix, filter))
        .collect();

    let sink = match &state.config.influxdb {
        Some(influx) => format!("InfluxDB {} (database {})", influx.url, influx.database),
        None => "log only".to_string(),
    };

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>mqtt2influx</title>
</head>
<body>
    <h1>mqtt2influx</h1>
    <p>Version: {}</p>
    <p>Sink: {}</p>
    <p>Queue capacity: {}</p>
    <ul>
        <li><a href="/health">Health Check</a></li>
        <li><a href="/stats">Statistics</a></li>
    </ul>
    <h2>Subscriptions</h2>
    <ul>
{}    </ul>
</body>
</html>"#,
        env!("CARGO_PKG_VERSION"),
        sink,
        state.config.engine.queue_capacity,
        subscriptions
    );
    Html(html)
}

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Consumer statistics
pub async fn stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.stats.snapshot())
}

/// Publish endpoint - hands a message to the ingest source
///
/// Responds `202 Accepted` when the message was queued and `200 OK` with
/// `accepted: false` when no subscription matches its topic.
#[instrument(skip_all, name = "publish_handler")]
pub async fn publish(
    State(state): State<AppState>,
    Json(request): Json<PublishRequest>,
) -> AppResult<(StatusCode, Json<PublishResponse>)> {
    let PublishRequest {
        topic,
        payload,
        qos,
        retain,
    } = request;

    let accepted = state
        .source
        .accept(&topic, payload.into_bytes(), qos, retain)
        .await?;

    debug!(topic = %topic, accepted, "Publish handled");

    let status = if accepted {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(PublishResponse { accepted, topic })))
}
