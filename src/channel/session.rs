//! Session-backed channel
//!
//! Outbound property messages are handed to the session's client writer (an
//! mpsc receiver owned by whoever serves the session). Client-side changes
//! are delivered per property, as bokeh-style `on_change` callbacks would be.

use super::{Channel, ChannelKind, MessageCallback};
use crate::state::PropertyMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, trace};

pub struct SessionChannel {
    id: String,
    outbound: mpsc::UnboundedSender<PropertyMap>,
    /// property → (subscriber, callback)
    subscribers: Mutex<HashMap<String, Vec<(String, MessageCallback)>>>,
    open: AtomicBool,
}

impl SessionChannel {
    /// Create a channel and the receiver on which outbound messages appear
    pub fn new(id: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<PropertyMap>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Self {
            id: id.into(),
            outbound: tx,
            subscribers: Mutex::new(HashMap::new()),
            open: AtomicBool::new(true),
        };
        (channel, rx)
    }

    /// Deliver a client-side change of `property`
    ///
    /// Runs subscribers synchronously; the caller is the session loop.
    pub fn receive(&self, property: &str, value: Value) {
        if !self.is_open() {
            trace!(channel = %self.id, property, "Dropping change on closed session channel");
            return;
        }

        // Clone out so callbacks run without the subscriber lock held
        let callbacks: Vec<MessageCallback> = self
            .subscribers
            .lock()
            .get(property)
            .map(|subs| subs.iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default();

        trace!(channel = %self.id, property, subscribers = callbacks.len(), "Client change received");
        for callback in callbacks {
            let mut msg = PropertyMap::new();
            msg.insert(property.to_string(), value.clone());
            callback(msg);
        }
    }

    pub fn subscriber_count(&self, property: &str) -> usize {
        self.subscribers
            .lock()
            .get(property)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl Channel for SessionChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::SessionBacked
    }

    fn send(&self, msg: &PropertyMap) {
        if !self.is_open() {
            return;
        }
        trace!(channel = %self.id, keys = msg.len(), "Session push");
        let _ = self.outbound.send(msg.clone());
    }

    fn subscribe(&self, subscriber: &str, properties: &[String], callback: MessageCallback) {
        let mut subscribers = self.subscribers.lock();
        for property in properties {
            subscribers
                .entry(property.clone())
                .or_default()
                .push((subscriber.to_string(), callback.clone()));
        }
    }

    fn unsubscribe(&self, subscriber: &str) {
        let mut subscribers = self.subscribers.lock();
        for subs in subscribers.values_mut() {
            subs.retain(|(owner, _)| owner != subscriber);
        }
        subscribers.retain(|_, subs| !subs.is_empty());
        trace!(channel = %self.id, subscriber, "Subscriptions removed");
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.subscribers.lock().clear();
            debug!(channel = %self.id, "Session channel closed");
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_send_reaches_receiver() {
        let (channel, mut rx) = SessionChannel::new("s1");
        let mut msg = PropertyMap::new();
        msg.insert("value".to_string(), json!(3));
        channel.send(&msg);

        assert_eq!(rx.recv().await, Some(msg));
    }

    #[test]
    fn test_receive_dispatches_per_property() {
        let (channel, _rx) = SessionChannel::new("s2");
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = seen.clone();
        channel.subscribe(
            "p1",
            &["x".to_string()],
            Arc::new(move |msg| seen_clone.lock().push(msg)),
        );

        channel.receive("x", json!(1));
        channel.receive("y", json!(2));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].get("x"), Some(&json!(1)));
    }

    #[test]
    fn test_closed_channel_drops_traffic() {
        let (channel, mut rx) = SessionChannel::new("s3");
        channel.subscribe("p1", &["x".to_string()], Arc::new(|_| panic!("closed")));
        channel.close();
        channel.close();

        channel.receive("x", json!(1));
        channel.send(&PropertyMap::new());
        assert!(!channel.is_open());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unsubscribe_keeps_other_subscribers() {
        let (channel, _rx) = SessionChannel::new("s4");
        let seen = Arc::new(Mutex::new(Vec::new()));

        channel.subscribe("p1", &["x".to_string()], Arc::new(|_| panic!("unsubscribed")));
        let seen_clone = seen.clone();
        channel.subscribe(
            "p2",
            &["x".to_string(), "y".to_string()],
            Arc::new(move |msg| seen_clone.lock().push(msg)),
        );

        channel.unsubscribe("p1");
        channel.unsubscribe("p1");
        channel.receive("x", json!(1));

        assert!(channel.is_open());
        assert_eq!(channel.subscriber_count("x"), 1);
        assert_eq!(channel.subscriber_count("y"), 1);
        assert_eq!(seen.lock().len(), 1);
    }
}
