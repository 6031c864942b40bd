use std::sync::Arc;

use natter_core::config::OverflowPolicy;
use natter_core::{ConnId, Message};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::hub::Delivery;

/// What a live feed yields next.
#[derive(Debug)]
pub enum FeedEvent {
    /// The next message on the channel, in publish order.
    Message { seq: u64, message: Arc<Message> },
    /// Drop-oldest policy: `missed` publishes were discarded while this
    /// subscriber lagged. The feed continues with the oldest retained one.
    Gap { missed: u64 },
}

/// Why a live feed ended.
#[derive(Debug, PartialEq, Eq)]
pub enum FeedClosed {
    /// Disconnect policy: the subscriber fell `missed` publishes behind.
    Overflowed { missed: u64 },
    /// `unsubscribe` was called on this subscription.
    Unsubscribed,
    /// The hub side went away (server shutdown).
    ChannelClosed,
}

/// One subscriber's live feed of a single channel.
///
/// Obtained from [`crate::Hub::subscribe`]. Dropping the subscription (or
/// calling [`Subscription::unsubscribe`]) detaches from the ring at once;
/// queued deliveries are discarded, not flushed.
pub struct Subscription {
    channel: String,
    owner: Option<ConnId>,
    rx: Option<broadcast::Receiver<Delivery>>,
    policy: OverflowPolicy,
}

impl Subscription {
    pub(crate) fn new(
        channel: String,
        owner: Option<ConnId>,
        rx: broadcast::Receiver<Delivery>,
        policy: OverflowPolicy,
    ) -> Self {
        Self {
            channel,
            owner,
            rx: Some(rx),
            policy,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next feed event. Safe to poll from a `select!` arm.
    ///
    /// Deliveries excluded for this subscription's owner are swallowed here
    /// and never surface.
    pub async fn next(&mut self) -> Result<FeedEvent, FeedClosed> {
        loop {
            let received = match self.rx.as_mut() {
                Some(rx) => rx.recv().await,
                None => return Err(FeedClosed::Unsubscribed),
            };
            match received {
                Ok(delivery) => {
                    if delivery.exclude.is_some() && delivery.exclude == self.owner {
                        continue;
                    }
                    return Ok(FeedEvent::Message {
                        seq: delivery.seq,
                        message: delivery.message,
                    });
                }
                Err(RecvError::Lagged(missed)) => match self.policy {
                    OverflowPolicy::DropOldest => return Ok(FeedEvent::Gap { missed }),
                    OverflowPolicy::Disconnect => {
                        self.rx = None;
                        return Err(FeedClosed::Overflowed { missed });
                    }
                },
                Err(RecvError::Closed) => {
                    self.rx = None;
                    return Err(FeedClosed::ChannelClosed);
                }
            }
        }
    }

    /// Detach from the channel. Idempotent; afterwards `next` only ever
    /// returns `FeedClosed::Unsubscribed`, regardless of racing publishes.
    pub fn unsubscribe(&mut self) {
        self.rx = None;
    }
}
