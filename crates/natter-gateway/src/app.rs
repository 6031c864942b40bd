use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use natter_core::config::NatterConfig;
use natter_hub::{ConnectionManager, Hub};
use natter_store::MessageStore;

use crate::ingest::Ingest;

/// Central shared state — passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: NatterConfig,
    pub store: Arc<MessageStore>,
    pub hub: Arc<Hub>,
    pub connections: Arc<ConnectionManager>,
    pub ingest: Ingest,
}

impl AppState {
    /// Wire the subsystems together: one hub ring per configured channel,
    /// a connection registry tuned from the liveness config, and the
    /// shared ingest path over both.
    pub fn new(config: NatterConfig, store: MessageStore) -> Self {
        let store = Arc::new(store);
        let hub = Arc::new(Hub::new(
            config.broadcast.queue_capacity,
            config.broadcast.overflow_policy,
        ));
        for channel in &config.channels {
            hub.open_channel(channel);
        }
        let connections = Arc::new(ConnectionManager::new(
            config.liveness.heartbeat_timeout(),
            config.liveness.sweep_interval(),
        ));
        let ingest = Ingest::new(Arc::clone(&store), Arc::clone(&hub));
        Self {
            config,
            store,
            hub,
            connections,
            ingest,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/ws", get(crate::ws::connection::ws_handler))
        .route("/api/messages", post(crate::http::messages::submit_handler))
        .route("/api/channels", get(crate::http::channels::list_handler))
        .route(
            "/api/channels/{channel}/messages",
            get(crate::http::messages::history_handler),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
