use axum::{
    body::Bytes,
    extract::{ws::Message, ws::WebSocket, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use natter_core::config::{MAX_PAYLOAD_BYTES, OUTBOUND_BUFFER, PROTOCOL_VERSION};
use natter_core::ConnId;
use natter_protocol::{methods, ClientPolicy, EventFrame, Hello, ServerInfo};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::app::AppState;
use crate::ws::{handlers, send};

/// Per-connection handler context: who this is, the outbound lane every
/// pushed frame leaves through, and one pump task per subscribed channel.
pub struct WsSession {
    pub conn_id: ConnId,
    pub outbound: mpsc::Sender<String>,
    pub pumps: HashMap<String, JoinHandle<()>>,
}

impl WsSession {
    fn abort_pumps(&mut self) {
        for (_, pump) in self.pumps.drain() {
            pump.abort();
        }
    }
}

/// Axum handler — upgrades HTTP to WebSocket at GET /ws.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| run_connection(socket, state))
}

/// Per-connection event loop — lives for the entire WS session.
async fn run_connection(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = state.connections.register();
    let Some(cancel) = state.connections.cancellation(&conn_id) else {
        return;
    };
    info!(conn_id = %conn_id, "new WS connection");

    let (mut tx, mut rx) = socket.split();

    // hello is always the first frame out
    if send::json(&mut tx, &hello_event(&state, &conn_id))
        .await
        .is_err()
    {
        state.connections.deregister(&conn_id);
        return;
    }

    // Subscription pumps and handlers queue pushed frames here; this loop
    // is the only writer on the socket.
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
    let mut session = WsSession {
        conn_id: conn_id.clone(),
        outbound: outbound_tx,
        pumps: HashMap::new(),
    };

    let mut tick = tokio::time::interval(state.config.liveness.heartbeat_interval());
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(conn_id = %conn_id, "connection cancelled");
                break;
            }

            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        state.connections.touch(&conn_id);
                        if text.len() > MAX_PAYLOAD_BYTES {
                            warn!(conn_id = %conn_id, size = text.len(), "payload too large");
                            break;
                        }
                        if handlers::handle(&text, &mut session, &mut tx, &state).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        state.connections.touch(&conn_id);
                        if tx.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        state.connections.touch(&conn_id);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(conn_id = %conn_id, error = %e, "WS read failed");
                        break;
                    }
                }
            }

            frame = outbound_rx.recv() => {
                match frame {
                    Some(frame) => {
                        if tx.send(Message::Text(frame.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            _ = tick.tick() => {
                if tx.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    session.abort_pumps();
    state.connections.deregister(&conn_id);
    info!(conn_id = %conn_id, "WS connection closed");
}

/// The hello frame: identity, server info, channel list, client policy.
fn hello_event(state: &AppState, conn_id: &ConnId) -> EventFrame {
    EventFrame::new(
        methods::EVENT_HELLO,
        Hello {
            protocol: PROTOCOL_VERSION,
            conn_id: conn_id.clone(),
            server: ServerInfo {
                name: "natter".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            channels: state.hub.channels(),
            policy: ClientPolicy {
                heartbeat_interval_secs: state.config.liveness.heartbeat_interval_secs,
                max_payload_bytes: MAX_PAYLOAD_BYTES,
            },
        },
    )
}
