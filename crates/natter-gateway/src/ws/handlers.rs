//! Inbound WS frame handling — parse, route, respond.
//!
//! Every text frame is expected to be a `REQ`; the reply is always one
//! `RES` carrying the same id. Malformed JSON is logged and dropped
//! without killing the connection, and an unknown method gets a normal
//! error response. Oversized frames are cut off before this module.

use std::sync::Arc;

use natter_protocol::{methods, InboundFrame, ResFrame};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::app::AppState;
use crate::ingest::SubmitError;
use crate::ws::connection::WsSession;
use crate::ws::{feed, send};

/// Process one inbound text frame end to end.
///
/// Only transport failures bubble up — protocol-level problems are
/// answered on the socket and return `Ok`.
pub async fn handle(
    text: &str,
    session: &mut WsSession,
    tx: &mut send::WsSink,
    state: &Arc<AppState>,
) -> Result<(), axum::Error> {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(conn_id = %session.conn_id, error = %e, "malformed frame");
            return Ok(());
        }
    };
    let Some(req) = frame.as_req() else {
        warn!(conn_id = %session.conn_id, frame_type = %frame.frame_type, "frame is not a valid req");
        return Ok(());
    };

    let res = route(&req.method, req.params.as_ref(), &req.id, session, state);
    send::json(tx, &res).await
}

/// Route a WS method call to the correct handler.
fn route(
    method: &str,
    params: Option<&Value>,
    req_id: &str,
    session: &mut WsSession,
    state: &Arc<AppState>,
) -> ResFrame {
    match method {
        // ------------------------------------------------------------------
        // Feeds
        // ------------------------------------------------------------------
        methods::SUBSCRIBE => handle_subscribe(params, req_id, session, state),
        methods::UNSUBSCRIBE => handle_unsubscribe(params, req_id, session, state),

        // ------------------------------------------------------------------
        // Messages
        // ------------------------------------------------------------------
        methods::MESSAGE_SEND => handle_message_send(params, req_id, session, state),
        methods::HISTORY => handle_history(params, req_id, state),
        methods::CHANNELS_LIST => handle_channels_list(req_id, state),

        // ------------------------------------------------------------------
        // Utility
        // ------------------------------------------------------------------
        methods::PING => ResFrame::ok(req_id, json!({ "pong": true })),

        _ => ResFrame::err(
            req_id,
            "METHOD_NOT_FOUND",
            &format!("unknown method '{method}'"),
        ),
    }
}

/// Open a live feed on a channel and start pumping it to this socket.
fn handle_subscribe(
    params: Option<&Value>,
    req_id: &str,
    session: &mut WsSession,
    state: &Arc<AppState>,
) -> ResFrame {
    let Some(channel) = param_str(params, "channel") else {
        return ResFrame::err(req_id, "INVALID_PARAMS", "missing 'channel' field");
    };

    if !session.pumps.contains_key(channel) {
        let sub = match state.hub.subscribe(channel, Some(session.conn_id.clone())) {
            Ok(sub) => sub,
            Err(e) => return ResFrame::err(req_id, "UNKNOWN_CHANNEL", &e.to_string()),
        };
        state.connections.mark_subscribed(&session.conn_id, channel);
        let pump = tokio::spawn(feed::run(
            sub,
            session.conn_id.clone(),
            session.outbound.clone(),
            Arc::clone(&state.connections),
        ));
        session.pumps.insert(channel.to_string(), pump);
        info!(conn_id = %session.conn_id, channel, "subscribed");
    }

    // Subscribing twice is a no-op, not an error.
    let subscribers = state.hub.subscriber_count(channel).unwrap_or(0);
    ResFrame::ok(
        req_id,
        json!({ "channel": channel, "subscribers": subscribers }),
    )
}

/// Stop a feed. Safe to call for channels never subscribed to.
fn handle_unsubscribe(
    params: Option<&Value>,
    req_id: &str,
    session: &mut WsSession,
    state: &Arc<AppState>,
) -> ResFrame {
    let Some(channel) = param_str(params, "channel") else {
        return ResFrame::err(req_id, "INVALID_PARAMS", "missing 'channel' field");
    };

    // Aborting the pump drops its hub subscription, so nothing new reaches
    // the outbound lane. Frames already queued still flush.
    if let Some(pump) = session.pumps.remove(channel) {
        pump.abort();
        state.connections.mark_unsubscribed(&session.conn_id, channel);
        info!(conn_id = %session.conn_id, channel, "unsubscribed");
    }
    ResFrame::ok(req_id, json!({ "channel": channel }))
}

/// Submit a message from this socket through the shared ingest path.
fn handle_message_send(
    params: Option<&Value>,
    req_id: &str,
    session: &mut WsSession,
    state: &Arc<AppState>,
) -> ResFrame {
    let Some(author) = param_str(params, "author") else {
        return ResFrame::err(req_id, "INVALID_PARAMS", "missing 'author' field");
    };
    let Some(body) = param_str(params, "body") else {
        return ResFrame::err(req_id, "INVALID_PARAMS", "missing 'body' field");
    };
    let channel = param_str(params, "channel").unwrap_or_else(|| state.config.default_channel());

    // to_others defaults to true: the sender renders its own message
    // locally and does not want the echo.
    let to_others = params
        .and_then(|p| p.get("to_others"))
        .and_then(|v| v.as_bool())
        .unwrap_or(true);
    let origin = to_others.then(|| session.conn_id.clone());

    match state.ingest.submit(channel, author, body, origin) {
        Ok(message) => ResFrame::ok(req_id, &message),
        Err(e @ SubmitError::Validation { .. }) => {
            ResFrame::err(req_id, "VALIDATION_FAILED", &e.to_string())
        }
        Err(e @ SubmitError::UnknownChannel { .. }) => {
            ResFrame::err(req_id, "UNKNOWN_CHANNEL", &e.to_string())
        }
        Err(e) => {
            warn!(conn_id = %session.conn_id, channel, error = %e, "message.send failed");
            ResFrame::err(req_id, "STORE_ERROR", &e.to_string())
        }
    }
}

/// Ordered history for a channel, oldest first.
fn handle_history(params: Option<&Value>, req_id: &str, state: &Arc<AppState>) -> ResFrame {
    let Some(channel) = param_str(params, "channel") else {
        return ResFrame::err(req_id, "INVALID_PARAMS", "missing 'channel' field");
    };
    if !state.hub.has_channel(channel) {
        return ResFrame::err(
            req_id,
            "UNKNOWN_CHANNEL",
            &format!("unknown channel: {channel}"),
        );
    }

    let limit = params
        .and_then(|p| p.get("limit"))
        .and_then(|v| v.as_u64())
        .map(|n| n as usize);
    let result = match limit {
        Some(limit) => state.store.list_recent(channel, limit),
        None => state.store.list_ordered(channel),
    };

    match result {
        Ok(messages) => ResFrame::ok(req_id, json!({ "channel": channel, "messages": messages })),
        Err(e) => {
            warn!(channel, error = %e, "history query failed");
            ResFrame::err(req_id, "STORE_ERROR", &e.to_string())
        }
    }
}

/// Every open channel with its current subscriber count.
fn handle_channels_list(req_id: &str, state: &Arc<AppState>) -> ResFrame {
    let channels: Vec<Value> = state
        .hub
        .channels()
        .into_iter()
        .map(|name| {
            let subscribers = state.hub.subscriber_count(&name).unwrap_or(0);
            json!({ "name": name, "subscribers": subscribers })
        })
        .collect();
    ResFrame::ok(req_id, json!({ "channels": channels }))
}

/// Fetch a required string param.
fn param_str<'a>(params: Option<&'a Value>, key: &str) -> Option<&'a str> {
    params.and_then(|p| p.get(key)).and_then(|v| v.as_str())
}
