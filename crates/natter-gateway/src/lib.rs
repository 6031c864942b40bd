//! natter-gateway — the HTTP/WS front door of the natter broadcast server.
//!
//! Wires the message store, the broadcast hub, and the connection registry
//! behind one Axum router: REST ingest and history under `/api`, the live
//! protocol on `/ws`, and a health probe on `/health`.

pub mod app;
pub mod http;
pub mod ingest;
pub mod ws;

pub use app::{build_router, AppState};
