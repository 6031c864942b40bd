//! Subscription pump — one task per (connection, channel).
//!
//! Owns the hub subscription and forwards its feed onto the connection's
//! outbound lane. Queueing blocks while the lane is full, which is how a
//! slow socket becomes hub lag and, eventually, a gap notice or a cut
//! feed depending on the overflow policy.

use std::sync::Arc;

use natter_core::ConnId;
use natter_hub::{ConnectionManager, FeedClosed, FeedEvent, Subscription};
use natter_protocol::{methods, EventFrame};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::warn;

use crate::ws::send;

/// Forward feed events until the feed or the connection ends.
pub async fn run(
    mut sub: Subscription,
    conn_id: ConnId,
    outbound: mpsc::Sender<String>,
    connections: Arc<ConnectionManager>,
) {
    loop {
        match sub.next().await {
            Ok(FeedEvent::Message { seq, message }) => {
                let frame = EventFrame::new(methods::EVENT_MESSAGE, message.as_ref())
                    .with_channel(sub.channel())
                    .with_seq(seq);
                if send::queue(&outbound, &frame).await.is_err() {
                    break;
                }
            }
            Ok(FeedEvent::Gap { missed }) => {
                warn!(conn_id = %conn_id, channel = sub.channel(), missed, "feed gapped");
                let frame = EventFrame::new(methods::EVENT_GAP, json!({ "missed": missed }))
                    .with_channel(sub.channel());
                if send::queue(&outbound, &frame).await.is_err() {
                    break;
                }
            }
            Err(FeedClosed::Overflowed { missed }) => {
                warn!(
                    conn_id = %conn_id,
                    channel = sub.channel(),
                    missed,
                    "feed overflowed, disconnecting"
                );
                connections.deregister(&conn_id);
                break;
            }
            Err(_) => break,
        }
    }
}
