//! Message ingest and history over plain HTTP — no WS connection needed.
//!
//! Works with plain `curl`, which is the whole point: a script can post
//! into a channel that browsers are watching live.
//!
//! POST /api/messages
//!   Request:  `{"channel": "chat", "author": "alice", "body": "hi"}`
//!             `channel` is optional and defaults to the first configured
//!             channel. An `X-Connection-Id` header (the id from the WS
//!             hello) keeps the broadcast away from that connection.
//!   Response: `201 Created` with the stored message
//!             `{"id": 1, "author": "alice", "body": "hi", "created_at": ...}`
//!   Error:    `422` with `{"error": "...", "field": "..."}`
//!
//! GET /api/channels/{channel}/messages?limit=50
//!   Ordered history, oldest first; `limit` keeps only the newest N.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use natter_core::{ConnId, Message};

use crate::app::AppState;
use crate::ingest::SubmitError;

#[derive(Deserialize)]
pub struct SubmitRequest {
    /// Target channel; defaults to the first configured channel.
    pub channel: Option<String>,
    pub author: String,
    pub body: String,
}

#[derive(Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
}

#[derive(Deserialize)]
pub struct HistoryParams {
    /// Return only the most recent `limit` messages (still oldest first).
    pub limit: Option<usize>,
}

/// POST /api/messages — validate, persist, broadcast.
pub async fn submit_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<Message>), (StatusCode, Json<ApiError>)> {
    let channel = req
        .channel
        .as_deref()
        .unwrap_or_else(|| state.config.default_channel());
    let origin = extract_conn_id(&headers);

    match state.ingest.submit(channel, &req.author, &req.body, origin) {
        Ok(message) => Ok((StatusCode::CREATED, Json(message))),
        Err(SubmitError::Validation { field, reason }) => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiError {
                error: format!("invalid {field}: {reason}"),
                field: Some(field),
            }),
        )),
        Err(e @ SubmitError::UnknownChannel { .. }) => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiError {
                error: e.to_string(),
                field: Some("channel"),
            }),
        )),
        Err(e) => {
            warn!(channel, error = %e, "POST /api/messages failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError {
                    error: e.to_string(),
                    field: None,
                }),
            ))
        }
    }
}

/// GET /api/channels/{channel}/messages — ordered history for a channel.
pub async fn history_handler(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Value>, (StatusCode, Json<ApiError>)> {
    if !state.hub.has_channel(&channel) {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiError {
                error: format!("unknown channel: {channel}"),
                field: Some("channel"),
            }),
        ));
    }

    let result = match params.limit {
        Some(limit) => state.store.list_recent(&channel, limit),
        None => state.store.list_ordered(&channel),
    };

    match result {
        Ok(messages) => Ok(Json(json!({ "channel": channel, "messages": messages }))),
        Err(e) => {
            warn!(channel, error = %e, "history query failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError {
                    error: e.to_string(),
                    field: None,
                }),
            ))
        }
    }
}

/// Pull the submitting connection's id from `X-Connection-Id`, if present.
fn extract_conn_id(headers: &HeaderMap) -> Option<ConnId> {
    headers
        .get("x-connection-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(ConnId::from)
}
