//! Message-based comm channel
//!
//! Wire shape is a flat JSON object, `{"<property>": <value>, ...}`, with no
//! envelope. Outbound messages are serialized to text; inbound text is parsed
//! and handed to the single `on_msg` subscriber.

use super::{Channel, ChannelKind, MessageCallback};
use crate::error::{Result, SyncError};
use crate::state::PropertyMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

pub struct CommChannel {
    id: String,
    outbound: mpsc::UnboundedSender<String>,
    /// The single receive handler and the subscriber that installed it
    on_msg: Mutex<Option<(String, MessageCallback)>>,
    open: AtomicBool,
}

impl CommChannel {
    /// Create a comm and the receiver on which serialized outbound messages appear
    pub fn new(id: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let comm = Self {
            id: id.into(),
            outbound: tx,
            on_msg: Mutex::new(None),
            open: AtomicBool::new(true),
        };
        (comm, rx)
    }

    /// Decode a raw wire message and deliver it
    pub fn receive_raw(&self, raw: &str) -> Result<()> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| SyncError::Decode(e.to_string()))?;
        let Value::Object(map) = value else {
            return Err(SyncError::Decode(format!(
                "expected a flat JSON object, got: {}",
                raw
            )));
        };
        self.receive(map.into_iter().collect())
    }

    /// Deliver an already-decoded message
    pub fn receive(&self, msg: PropertyMap) -> Result<()> {
        if !self.is_open() {
            return Err(SyncError::ChannelClosed(self.id.clone()));
        }
        let callback = self.on_msg.lock().as_ref().map(|(_, cb)| cb.clone());
        match callback {
            Some(callback) => {
                trace!(comm = %self.id, keys = msg.len(), "Comm message received");
                callback(msg);
            }
            None => warn!(comm = %self.id, "Comm message received with no subscriber"),
        }
        Ok(())
    }

    /// Encode a message the way it travels on the wire
    pub fn encode(msg: &PropertyMap) -> String {
        // Serializing a string-keyed map of JSON values cannot fail
        serde_json::to_string(msg).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Channel for CommChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::MessageBased
    }

    fn send(&self, msg: &PropertyMap) {
        if !self.is_open() {
            trace!(comm = %self.id, "Dropping send on closed comm");
            return;
        }
        let _ = self.outbound.send(Self::encode(msg));
    }

    /// A comm has a single receive handler; properties are selected on the
    /// client side by the forwarding code, so `properties` is not used here.
    fn subscribe(&self, subscriber: &str, _properties: &[String], callback: MessageCallback) {
        *self.on_msg.lock() = Some((subscriber.to_string(), callback));
    }

    fn unsubscribe(&self, subscriber: &str) {
        let mut on_msg = self.on_msg.lock();
        if on_msg.as_ref().is_some_and(|(owner, _)| owner == subscriber) {
            on_msg.take();
        }
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.on_msg.lock().take();
            debug!(comm = %self.id, "Comm closed");
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
