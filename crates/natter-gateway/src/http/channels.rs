//! GET /api/channels — the configured channel list with live counts.
//!
//! Response: `{"channels": [{"name": "chat", "subscribers": 2, "messages": 14}]}`

use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// Every configured channel with its subscriber and stored-message counts.
pub async fn list_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let channels: Vec<Value> = state
        .hub
        .channels()
        .into_iter()
        .map(|name| {
            let subscribers = state.hub.subscriber_count(&name).unwrap_or(0);
            let messages = state.store.count(&name).unwrap_or(0);
            json!({ "name": name, "subscribers": subscribers, "messages": messages })
        })
        .collect();
    Json(json!({ "channels": channels }))
}
