//! Channels - duplex transports between an entity and its rendered views
//!
//! Two kinds exist:
//! - **Session-backed**: a persistent server-held session; property changes
//!   made by the client arrive through per-property subscriptions.
//! - **Message-based**: an ephemeral comm with no session; the client sends
//!   flat `{property: value}` JSON objects produced by forwarding code that
//!   is embedded into the rendered output and references the comm by id.

pub mod comm;
pub mod forwarding;
pub mod manager;
pub mod session;

pub use comm::CommChannel;
pub use forwarding::{forwarding_code, ForwardingParams};
pub use manager::CommManager;
pub use session::SessionChannel;

use crate::state::PropertyMap;
use std::sync::Arc;

/// Callback invoked with a `property → value` map on arrival
pub type MessageCallback = Arc<dyn Fn(PropertyMap) + Send + Sync>;

/// Kind of transport behind a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    SessionBacked,
    MessageBased,
}

/// Duplex transport contract used by the sync engine
///
/// Note: all methods take `&self`; implementations use interior mutability
/// so channels can be shared as `Arc<dyn Channel>`.
pub trait Channel: Send + Sync {
    /// Unique channel identifier
    fn id(&self) -> &str;

    fn kind(&self) -> ChannelKind;

    /// Best-effort synchronous send of a property message
    fn send(&self, msg: &PropertyMap);

    /// Register `callback` for changes to any of `properties` on behalf of
    /// `subscriber` (the view ref id)
    fn subscribe(&self, subscriber: &str, properties: &[String], callback: MessageCallback);

    /// Drop every callback registered by `subscriber`; the channel stays open
    fn unsubscribe(&self, subscriber: &str);

    /// Release the transport. Closing twice is a no-op.
    fn close(&self);

    fn is_open(&self) -> bool;
}
