use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use natter_core::ConnId;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Liveness bookkeeping for one WebSocket connection.
struct ConnectionEntry {
    subscriptions: HashSet<String>,
    last_seen: Instant,
    cancel: CancellationToken,
}

/// Registry of live connections.
///
/// Registration issues the `ConnId` a client is known by for its lifetime.
/// Deregistration cancels the connection's token, which unwinds its WS loop
/// and subscription pumps; the pumps drop their hub subscriptions, so the
/// connection stops counting toward fan-out from that point on.
pub struct ConnectionManager {
    conns: DashMap<ConnId, ConnectionEntry>,
    heartbeat_timeout: Duration,
    sweep_interval: Duration,
}

impl ConnectionManager {
    pub fn new(heartbeat_timeout: Duration, sweep_interval: Duration) -> Self {
        Self {
            conns: DashMap::new(),
            heartbeat_timeout,
            sweep_interval,
        }
    }

    /// Admit a new connection and issue its id.
    pub fn register(&self) -> ConnId {
        let id = ConnId::new();
        self.conns.insert(
            id.clone(),
            ConnectionEntry {
                subscriptions: HashSet::new(),
                last_seen: Instant::now(),
                cancel: CancellationToken::new(),
            },
        );
        info!(conn_id = %id, total = self.conns.len(), "connection registered");
        id
    }

    /// Refresh liveness. Called on every inbound frame or pong.
    pub fn touch(&self, conn: &ConnId) {
        if let Some(mut entry) = self.conns.get_mut(conn) {
            entry.last_seen = Instant::now();
        }
    }

    pub fn mark_subscribed(&self, conn: &ConnId, channel: &str) {
        if let Some(mut entry) = self.conns.get_mut(conn) {
            entry.subscriptions.insert(channel.to_string());
        }
    }

    pub fn mark_unsubscribed(&self, conn: &ConnId, channel: &str) {
        if let Some(mut entry) = self.conns.get_mut(conn) {
            entry.subscriptions.remove(channel);
        }
    }

    /// Channels this connection currently follows.
    pub fn subscriptions(&self, conn: &ConnId) -> Vec<String> {
        self.conns
            .get(conn)
            .map(|e| e.subscriptions.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Token cancelled when the connection is deregistered. `None` once the
    /// connection is gone.
    pub fn cancellation(&self, conn: &ConnId) -> Option<CancellationToken> {
        self.conns.get(conn).map(|e| e.cancel.clone())
    }

    /// Remove a connection and cancel its tasks. Idempotent — returns
    /// `false` when it was already gone.
    pub fn deregister(&self, conn: &ConnId) -> bool {
        match self.conns.remove(conn) {
            Some((_, entry)) => {
                entry.cancel.cancel();
                info!(conn_id = %conn, total = self.conns.len(), "connection deregistered");
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// Reap connections whose heartbeat went stale. Loops until `shutdown`
    /// flips to `true`.
    ///
    /// Transport errors already tear connections down directly; this is the
    /// backstop for half-open peers that stopped talking without closing.
    pub async fn run_sweeper(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            timeout_secs = self.heartbeat_timeout.as_secs(),
            "liveness sweeper started"
        );
        let mut interval = tokio::time::interval(self.sweep_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => self.sweep(),
                res = shutdown.changed() => {
                    // A dropped sender counts as shutdown.
                    if res.is_err() || *shutdown.borrow() {
                        info!("liveness sweeper shutting down");
                        break;
                    }
                }
            }
        }
    }

    fn sweep(&self) {
        let now = Instant::now();
        // Collect first; removing while iterating the map would contend on
        // the shard locks.
        let stale: Vec<ConnId> = self
            .conns
            .iter()
            .filter(|e| now.duration_since(e.last_seen) > self.heartbeat_timeout)
            .map(|e| e.key().clone())
            .collect();
        for conn in stale {
            warn!(conn_id = %conn, "heartbeat timed out, dropping connection");
            self.deregister(&conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ConnectionManager {
        ConnectionManager::new(Duration::from_secs(90), Duration::from_secs(10))
    }

    #[tokio::test]
    async fn register_then_deregister_is_idempotent() {
        let mgr = manager();
        let id = mgr.register();
        assert_eq!(mgr.len(), 1);

        assert!(mgr.deregister(&id));
        assert!(!mgr.deregister(&id), "second deregister must be a no-op");
        assert!(mgr.is_empty());
    }

    #[tokio::test]
    async fn deregister_fires_the_cancellation_token() {
        let mgr = manager();
        let id = mgr.register();
        let token = mgr.cancellation(&id).unwrap();
        assert!(!token.is_cancelled());

        mgr.deregister(&id);
        assert!(token.is_cancelled());
        assert!(mgr.cancellation(&id).is_none());
    }

    #[tokio::test]
    async fn tracks_channel_marks() {
        let mgr = manager();
        let id = mgr.register();

        mgr.mark_subscribed(&id, "chat");
        mgr.mark_subscribed(&id, "chat");
        mgr.mark_subscribed(&id, "random");
        let mut subs = mgr.subscriptions(&id);
        subs.sort_unstable();
        assert_eq!(subs, ["chat", "random"]);

        mgr.mark_unsubscribed(&id, "chat");
        mgr.mark_unsubscribed(&id, "never-subscribed");
        assert_eq!(mgr.subscriptions(&id), ["random"]);

        // unknown connections are ignored, not created
        let ghost = ConnId::new();
        mgr.mark_subscribed(&ghost, "chat");
        assert!(mgr.subscriptions(&ghost).is_empty());
        assert_eq!(mgr.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_reaps_stale_and_spares_touched() {
        let mgr = Arc::new(manager());
        let stale = mgr.register();
        let live = mgr.register();
        let stale_cancel = mgr.cancellation(&stale).unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper = tokio::spawn(mgr.clone().run_sweeper(shutdown_rx));

        // keep `live` fresh while the clock runs far past the timeout
        for _ in 0..12 {
            tokio::time::sleep(Duration::from_secs(10)).await;
            mgr.touch(&live);
        }

        assert!(mgr.cancellation(&stale).is_none(), "stale conn not reaped");
        assert!(stale_cancel.is_cancelled());
        assert!(mgr.cancellation(&live).is_some(), "live conn was reaped");

        shutdown_tx.send(true).unwrap();
        sweeper.await.unwrap();
    }
}
