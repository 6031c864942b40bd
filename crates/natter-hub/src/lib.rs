//! `natter-hub` — per-channel fan-out and connection liveness.
//!
//! # Overview
//!
//! Each configured channel owns a bounded broadcast ring. [`hub::Hub`]
//! assigns every publish a per-channel sequence and hands it to all current
//! subscribers; a [`subscription::Subscription`] is one subscriber's live
//! feed, with lag handled per the configured overflow policy:
//!
//! | Policy        | Behaviour on overflow                                |
//! |---------------|------------------------------------------------------|
//! | `drop-oldest` | discard oldest entries, yield one gap notice, resume |
//! | `disconnect`  | terminate the feed, caller closes the connection     |
//!
//! [`connections::ConnectionManager`] tracks which connections are alive,
//! which channels each one follows, and reaps peers whose heartbeat stops.

pub mod connections;
pub mod error;
pub mod hub;
pub mod subscription;

pub use connections::ConnectionManager;
pub use error::HubError;
pub use hub::{Delivery, Hub};
pub use subscription::{FeedClosed, FeedEvent, Subscription};
