//! Remote view model
//!
//! The server-side mirror of one rendered instance of an entity: its
//! reference id, the document it lives in, the channel that carries its
//! updates and the current property values the client was told about.

use crate::channel::Channel;
use crate::document::Document;
use crate::state::PropertyMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

/// Unique reference id of a rendered view
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewRef(Arc<str>);

impl ViewRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ViewRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

struct ViewInner {
    ref_id: ViewRef,
    document: Document,
    channel: Arc<dyn Channel>,
    properties: Mutex<PropertyMap>,
    /// (property, client forwarding code) pairs embedded in the rendered output
    forwarding: Mutex<Vec<(String, String)>>,
    /// Coalesced outbound update waiting for the next session tick
    pending_tick: Mutex<Option<PropertyMap>>,
    disposed: AtomicBool,
}

/// Handle to a rendered view (cheap to clone)
#[derive(Clone)]
pub struct View {
    inner: Arc<ViewInner>,
}

/// Non-owning handle, used by channel subscriptions to avoid reference cycles
#[derive(Clone)]
pub struct WeakView {
    inner: Weak<ViewInner>,
}

impl WeakView {
    pub fn upgrade(&self) -> Option<View> {
        self.inner.upgrade().map(|inner| View { inner })
    }
}

impl View {
    pub fn new(
        ref_id: ViewRef,
        document: Document,
        channel: Arc<dyn Channel>,
        properties: PropertyMap,
    ) -> Self {
        Self {
            inner: Arc::new(ViewInner {
                ref_id,
                document,
                channel,
                properties: Mutex::new(properties),
                forwarding: Mutex::new(Vec::new()),
                pending_tick: Mutex::new(None),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn ref_id(&self) -> &ViewRef {
        &self.inner.ref_id
    }

    pub fn document(&self) -> &Document {
        &self.inner.document
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.inner.channel
    }

    pub fn downgrade(&self) -> WeakView {
        WeakView {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn properties(&self) -> PropertyMap {
        self.inner.properties.lock().clone()
    }

    pub fn property(&self, name: &str) -> Option<Value> {
        self.inner.properties.lock().get(name).cloned()
    }

    /// Apply a property message to the model
    pub fn update(&self, msg: &PropertyMap) {
        let mut properties = self.inner.properties.lock();
        for (k, v) in msg {
            properties.insert(k.clone(), v.clone());
        }
        trace!(view = %self.inner.ref_id, keys = msg.len(), "View model updated");
    }

    pub fn attach_forwarding(&self, property: impl Into<String>, code: String) {
        self.inner.forwarding.lock().push((property.into(), code));
    }

    /// Forwarding snippets attached to this view, as (property, code)
    pub fn forwarding(&self) -> Vec<(String, String)> {
        self.inner.forwarding.lock().clone()
    }

    /// Merge `msg` into the pending next-tick update
    ///
    /// Returns `true` if no update was pending, i.e. the caller must schedule
    /// the tick. At most one tick is outstanding per view.
    pub fn queue_tick_update(&self, msg: PropertyMap) -> bool {
        let mut pending = self.inner.pending_tick.lock();
        match pending.as_mut() {
            Some(existing) => {
                existing.extend(msg);
                false
            }
            None => {
                *pending = Some(msg);
                true
            }
        }
    }

    /// Apply the pending next-tick update to the model and push it to the client
    pub fn flush_tick_update(&self) {
        let Some(msg) = self.inner.pending_tick.lock().take() else {
            return;
        };
        if self.is_disposed() {
            trace!(view = %self.inner.ref_id, "Dropping tick update for disposed view");
            return;
        }
        self.update(&msg);
        self.inner.channel.send(&msg);
    }

    pub fn has_pending_tick(&self) -> bool {
        self.inner.pending_tick.lock().is_some()
    }

    /// Mark the view as torn down; pending ticks become no-ops
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        self.inner.pending_tick.lock().take();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("ref_id", &self.inner.ref_id)
            .field("document", &self.inner.document.id())
            .field("channel", &self.inner.channel.id())
            .finish_non_exhaustive()
    }
}
