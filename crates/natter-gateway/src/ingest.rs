//! Submission pipeline shared by the HTTP and WS ingest surfaces.
//!
//! Every message enters through [`Ingest::submit`], which runs the same
//! steps regardless of transport: resolve the channel, validate and
//! persist, then publish to live subscribers. Persist-then-publish means
//! a message seen on a feed is always already in history; the reverse is
//! never true.

use std::sync::{Arc, Mutex};

use natter_core::{ConnId, Message};
use natter_hub::{Hub, HubError};
use natter_store::{MessageStore, StoreError};
use thiserror::Error;
use tracing::debug;

/// Why a submission was rejected. `Validation` and `UnknownChannel` are
/// client errors and leave no trace in the store; `Store` is a server
/// fault after validation already passed.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },
    #[error("unknown channel: {channel}")]
    UnknownChannel { channel: String },
    #[error("store failure: {0}")]
    Store(#[source] StoreError),
}

impl From<StoreError> for SubmitError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation { field, reason } => SubmitError::Validation { field, reason },
            other => SubmitError::Store(other),
        }
    }
}

impl From<HubError> for SubmitError {
    fn from(e: HubError) -> Self {
        match e {
            HubError::UnknownChannel { channel } => SubmitError::UnknownChannel { channel },
        }
    }
}

/// The single write path: validate, append, publish.
pub struct Ingest {
    store: Arc<MessageStore>,
    hub: Arc<Hub>,
    /// Serializes append+publish so feed order always matches store order.
    order: Mutex<()>,
}

impl Ingest {
    pub fn new(store: Arc<MessageStore>, hub: Arc<Hub>) -> Self {
        Self {
            store,
            hub,
            order: Mutex::new(()),
        }
    }

    /// Accept one message: check the channel, persist, publish.
    ///
    /// `origin` names the connection to exclude from delivery (a "to
    /// others" submission). Returns the stored message with its assigned
    /// id and timestamp; a rejected submission leaves the store untouched
    /// and publishes nothing.
    pub fn submit(
        &self,
        channel: &str,
        author: &str,
        body: &str,
        origin: Option<ConnId>,
    ) -> Result<Message, SubmitError> {
        if !self.hub.has_channel(channel) {
            return Err(SubmitError::UnknownChannel {
                channel: channel.to_string(),
            });
        }

        // Held across append and publish; both are synchronous, so no
        // await runs under the lock.
        let _order = self.order.lock().unwrap();
        let message = self.store.append(channel, author, body)?;
        let seq = self.hub.publish(channel, Arc::new(message.clone()), origin)?;
        debug!(channel, id = message.id, seq, "message ingested");
        Ok(message)
    }
}
