use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use natter_core::config::OverflowPolicy;
use natter_core::{ConnId, Message};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{HubError, Result};
use crate::subscription::Subscription;

/// One message as it travels through a channel's ring.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Per-channel publish sequence, starting at 1.
    pub seq: u64,
    pub message: Arc<Message>,
    /// When set, the subscription owned by this connection skips the
    /// delivery (the "to others" flag).
    pub exclude: Option<ConnId>,
}

struct Topic {
    tx: broadcast::Sender<Delivery>,
    /// Guards sequence assignment together with the send, so ring order
    /// always matches sequence order.
    seq: Mutex<u64>,
}

/// Per-channel fan-out over bounded broadcast rings.
///
/// Every configured channel gets a ring of `capacity` slots shared by all
/// of its subscribers. Publishing never waits on subscriber I/O and never
/// fails because of subscriber state; a laggard either receives a gap
/// notice or loses its feed, per `policy`.
pub struct Hub {
    topics: DashMap<String, Topic>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl Hub {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            topics: DashMap::new(),
            capacity,
            policy,
        }
    }

    /// Create the topic for a configured channel. Idempotent — reopening
    /// keeps the existing ring and sequence counter.
    pub fn open_channel(&self, name: &str) {
        self.topics.entry(name.to_string()).or_insert_with(|| {
            let (tx, _) = broadcast::channel(self.capacity);
            Topic {
                tx,
                seq: Mutex::new(0),
            }
        });
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.topics.contains_key(name)
    }

    /// All open channel names, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.topics.iter().map(|t| t.key().clone()).collect();
        names.sort_unstable();
        names
    }

    /// Hand a message to every current subscriber of `channel` and return
    /// the assigned sequence.
    ///
    /// Zero subscribers is not an error; the delivery just ages out of the
    /// ring unseen.
    pub fn publish(
        &self,
        channel: &str,
        message: Arc<Message>,
        exclude: Option<ConnId>,
    ) -> Result<u64> {
        let topic = self.get(channel)?;
        let mut seq = topic.seq.lock().unwrap();
        *seq += 1;
        let assigned = *seq;
        // Send only errors when nobody is listening right now.
        let _ = topic.tx.send(Delivery {
            seq: assigned,
            message,
            exclude,
        });
        debug!(
            channel,
            seq = assigned,
            subscribers = topic.tx.receiver_count(),
            "published"
        );
        Ok(assigned)
    }

    /// Open a live feed on `channel`, starting with the next publish.
    ///
    /// `owner` names the connection behind this subscription so publishes
    /// excluding that connection can skip it. There is no historical
    /// replay; catch-up is a store query, not a hub concern.
    pub fn subscribe(&self, channel: &str, owner: Option<ConnId>) -> Result<Subscription> {
        let topic = self.get(channel)?;
        Ok(Subscription::new(
            channel.to_string(),
            owner,
            topic.tx.subscribe(),
            self.policy,
        ))
    }

    /// Number of live subscriptions on a channel.
    pub fn subscriber_count(&self, channel: &str) -> Result<usize> {
        Ok(self.get(channel)?.tx.receiver_count())
    }

    fn get(&self, channel: &str) -> Result<dashmap::mapref::one::Ref<'_, String, Topic>> {
        self.topics.get(channel).ok_or_else(|| HubError::UnknownChannel {
            channel: channel.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::{FeedClosed, FeedEvent};
    use std::time::Duration;

    fn msg(id: i64) -> Arc<Message> {
        Arc::new(Message {
            id,
            author: "alice".into(),
            body: format!("m{id}"),
            created_at: id,
        })
    }

    fn hub(capacity: usize, policy: OverflowPolicy) -> Hub {
        let h = Hub::new(capacity, policy);
        h.open_channel("chat");
        h
    }

    async fn expect_message(sub: &mut Subscription) -> (u64, Arc<Message>) {
        match sub.next().await {
            Ok(FeedEvent::Message { seq, message }) => (seq, message),
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fan_out_delivers_to_every_subscriber_in_order() {
        let h = hub(16, OverflowPolicy::DropOldest);
        let mut a = h.subscribe("chat", None).unwrap();
        let mut b = h.subscribe("chat", None).unwrap();

        for i in 1..=3 {
            h.publish("chat", msg(i), None).unwrap();
        }

        for sub in [&mut a, &mut b] {
            for i in 1..=3u64 {
                let (seq, message) = expect_message(sub).await;
                assert_eq!(seq, i);
                assert_eq!(message.id, i as i64);
            }
            // exactly once: nothing further is pending
            let extra = tokio::time::timeout(Duration::from_millis(50), sub.next()).await;
            assert!(extra.is_err(), "subscriber got an unexpected extra event");
        }
    }

    #[tokio::test]
    async fn subscription_is_live_only() {
        let h = hub(16, OverflowPolicy::DropOldest);
        h.publish("chat", msg(1), None).unwrap();

        let mut sub = h.subscribe("chat", None).unwrap();
        h.publish("chat", msg(2), None).unwrap();

        let (seq, message) = expect_message(&mut sub).await;
        assert_eq!(seq, 2, "must never see publishes from before subscribe");
        assert_eq!(message.id, 2);
    }

    #[tokio::test]
    async fn excluded_origin_does_not_hear_its_own_message() {
        let h = hub(16, OverflowPolicy::DropOldest);
        let origin = ConnId::new();
        let mut me = h.subscribe("chat", Some(origin.clone())).unwrap();
        let mut other = h.subscribe("chat", None).unwrap();

        h.publish("chat", msg(1), Some(origin.clone())).unwrap();
        h.publish("chat", msg(2), None).unwrap();

        // the origin connection only sees the second publish
        let (seq, _) = expect_message(&mut me).await;
        assert_eq!(seq, 2);

        // everyone else sees both
        assert_eq!(expect_message(&mut other).await.0, 1);
        assert_eq!(expect_message(&mut other).await.0, 2);
    }

    #[tokio::test]
    async fn slow_subscriber_gaps_under_drop_oldest() {
        let h = hub(4, OverflowPolicy::DropOldest);
        let mut fast = h.subscribe("chat", None).unwrap();
        let mut slow = h.subscribe("chat", None).unwrap();

        // fast keeps up with all ten publishes, slow never polls
        let mut seen = Vec::new();
        for i in 1..=10 {
            h.publish("chat", msg(i), None).unwrap();
            seen.push(expect_message(&mut fast).await.0);
        }
        assert_eq!(seen, (1..=10).collect::<Vec<u64>>());

        // ring capacity 4 means slow lost publishes 1..=6
        match slow.next().await {
            Ok(FeedEvent::Gap { missed }) => assert_eq!(missed, 6),
            other => panic!("expected gap, got {other:?}"),
        }
        // the feed resumes with the oldest retained publish
        for i in 7..=10u64 {
            assert_eq!(expect_message(&mut slow).await.0, i);
        }
    }

    #[tokio::test]
    async fn slow_subscriber_is_cut_under_disconnect() {
        let h = hub(4, OverflowPolicy::Disconnect);
        let mut slow = h.subscribe("chat", None).unwrap();

        for i in 1..=10 {
            h.publish("chat", msg(i), None).unwrap();
        }

        match slow.next().await {
            Err(FeedClosed::Overflowed { missed }) => assert_eq!(missed, 6),
            other => panic!("expected overflow, got {other:?}"),
        }
        // the feed is gone for good
        assert!(matches!(slow.next().await, Err(FeedClosed::Unsubscribed)));
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent_and_final() {
        let h = hub(16, OverflowPolicy::DropOldest);
        let mut sub = h.subscribe("chat", None).unwrap();
        assert_eq!(h.subscriber_count("chat").unwrap(), 1);

        // queued before unsubscribe, must still never be yielded
        h.publish("chat", msg(1), None).unwrap();

        sub.unsubscribe();
        sub.unsubscribe();
        assert_eq!(h.subscriber_count("chat").unwrap(), 0);

        assert!(matches!(sub.next().await, Err(FeedClosed::Unsubscribed)));
        h.publish("chat", msg(2), None).unwrap();
        assert!(matches!(sub.next().await, Err(FeedClosed::Unsubscribed)));
    }

    #[tokio::test]
    async fn publish_without_subscribers_succeeds() {
        let h = hub(16, OverflowPolicy::DropOldest);
        assert_eq!(h.publish("chat", msg(1), None).unwrap(), 1);
        assert_eq!(h.publish("chat", msg(2), None).unwrap(), 2);
        assert_eq!(h.subscriber_count("chat").unwrap(), 0);
    }

    #[test]
    fn unknown_channel_is_rejected() {
        let h = hub(16, OverflowPolicy::DropOldest);
        assert!(matches!(
            h.publish("nope", msg(1), None),
            Err(HubError::UnknownChannel { .. })
        ));
        assert!(h.subscribe("nope", None).is_err());
        assert!(h.subscriber_count("nope").is_err());
        assert!(!h.has_channel("nope"));
    }

    #[test]
    fn reopening_a_channel_keeps_its_sequence() {
        let h = hub(16, OverflowPolicy::DropOldest);
        assert_eq!(h.publish("chat", msg(1), None).unwrap(), 1);
        h.open_channel("chat");
        assert_eq!(h.publish("chat", msg(2), None).unwrap(), 2);
        assert_eq!(h.channels(), vec!["chat".to_string()]);
    }
}
