use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::sync::mpsc;

/// Write half of a WS connection after splitting.
pub type WsSink = SplitSink<WebSocket, Message>;

/// Serialize any value to JSON and send it over the WS connection.
pub async fn json<T: serde::Serialize>(tx: &mut WsSink, payload: &T) -> Result<(), axum::Error> {
    let json = serde_json::to_string(payload).unwrap_or_default();
    tx.send(Message::Text(json.into())).await
}

/// Serialize any value and queue it on a connection's outbound lane.
///
/// Waits while the lane is full — that back-pressure is what turns a slow
/// socket into hub lag instead of unbounded buffering.
pub async fn queue<T: serde::Serialize>(
    outbound: &mpsc::Sender<String>,
    payload: &T,
) -> Result<(), mpsc::error::SendError<String>> {
    let json = serde_json::to_string(payload).unwrap_or_default();
    outbound.send(json).await
}
