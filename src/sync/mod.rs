//! Sync engine - keeps an entity's local state and its rendered views in step
//!
//! A [`Reactive`] entity owns:
//! - its [`LocalState`] and [`Codec`] (rename table + value transform)
//! - the echo suppressor (names whose next remote arrival is discarded)
//! - the debounce scheduler (pending remote changes and the active filter)
//! - the watcher ledger (which watchers belong to which view or link)
//!
//! ```text
//!  local write ──► watcher ──► codec ──► active filter ──► channel / next tick
//!                                                               │
//!  local state ◄── codec ◄── debounce flush ◄── echo filter ◄───┘ (remote)
//! ```
//!
//! All mutable sync state sits behind one mutex that is never held while
//! user callbacks or watchers run.

mod debounce;
mod echo;
mod ledger;
mod link;
mod propagation;


pub use debounce::DebounceScheduler;
pub use echo::EchoSuppressor;
pub use ledger::{WatcherLedger, WatcherScope};

use crate::config::SyncConfig;
use crate::error::Result;
use crate::rename::{Codec, RenameTable, Transform};
use crate::state::{AttributeChanged, LocalState, ParamSpec, PropertyMap};
use crate::view::ViewRef;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Per-entity timing and lifetime options
#[derive(Debug, Clone, PartialEq)]
pub struct ReactiveOptions {
    /// Window used to coalesce remote-origin bursts
    pub debounce: Duration,
    /// Client-side timeout embedded in forwarding code
    pub timeout: Duration,
    /// Temporary entities are fully disposed when their session ends
    pub temporary: bool,
}

impl ReactiveOptions {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            debounce: config.debounce(),
            timeout: config.timeout(),
            temporary: false,
        }
    }
}

impl Default for ReactiveOptions {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// Mutable synchronization state of one entity
#[derive(Debug, Default)]
pub(crate) struct SyncState {
    pub(crate) echo: EchoSuppressor,
    pub(crate) debounce: DebounceScheduler,
    pub(crate) ledger: WatcherLedger,
}

pub(crate) struct ReactiveInner {
    name: String,
    state: LocalState,
    codec: Codec,
    options: ReactiveOptions,
    /// Attributes mirrored to views; `None` means all declared attributes
    synced: Option<Vec<String>>,
    pub(crate) sync: Mutex<SyncState>,
}

/// An entity whose local state is synchronized with its rendered views
///
/// Cheap to clone; clones refer to the same entity.
#[derive(Clone)]
pub struct Reactive {
    inner: Arc<ReactiveInner>,
}

/// Builder for [`Reactive`]
pub struct ReactiveBuilder {
    name: String,
    params: Vec<ParamSpec>,
    table: RenameTable,
    transform: Option<Arc<dyn Transform>>,
    options: ReactiveOptions,
    synced: Option<Vec<String>>,
}

impl ReactiveBuilder {
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn rename(mut self, table: RenameTable) -> Self {
        self.table = table;
        self
    }

    pub fn transform(mut self, transform: Arc<dyn Transform>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn options(mut self, options: ReactiveOptions) -> Self {
        self.options = options;
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.options.debounce = debounce;
        self
    }

    pub fn temporary(mut self, temporary: bool) -> Self {
        self.options.temporary = temporary;
        self
    }

    /// Restrict which attributes are mirrored to views
    pub fn synced<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.synced = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> Reactive {
        let mut codec = Codec::new(self.table);
        if let Some(transform) = self.transform {
            codec = codec.with_transform(transform);
        }

        debug!(entity = %self.name, params = self.params.len(), "Entity created");

        Reactive {
            inner: Arc::new(ReactiveInner {
                state: LocalState::new(self.name.clone(), self.params),
                name: self.name,
                codec,
                options: self.options,
                synced: self.synced,
                sync: Mutex::new(SyncState::default()),
            }),
        }
    }
}

impl Reactive {
    pub fn builder(name: impl Into<String>) -> ReactiveBuilder {
        ReactiveBuilder {
            name: name.into(),
            params: Vec::new(),
            table: RenameTable::identity(),
            transform: None,
            options: ReactiveOptions::default(),
            synced: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> &LocalState {
        &self.inner.state
    }

    pub fn codec(&self) -> &Codec {
        &self.inner.codec
    }

    pub fn options(&self) -> &ReactiveOptions {
        &self.inner.options
    }

    /// Attributes mirrored to views, in declaration order
    pub fn synced(&self) -> Vec<String> {
        let declared = self.inner.state.names();
        match &self.inner.synced {
            Some(names) => declared
                .into_iter()
                .filter(|n| names.contains(n))
                .collect(),
            None => declared,
        }
    }

    /// Whether two handles refer to the same entity
    pub fn same_entity(&self, other: &Reactive) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner.state.get(name)
    }

    /// Local write of one attribute; propagates to every bound view
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<Vec<AttributeChanged>> {
        self.inner.state.set(name, value)
    }

    /// Local atomic write of several attributes
    pub fn update(&self, batch: PropertyMap) -> Result<Vec<AttributeChanged>> {
        self.inner.state.update(batch)
    }

    /// Property names whose next remote arrival will be discarded
    pub fn expecting(&self) -> BTreeSet<String> {
        self.inner.sync.lock().echo.snapshot()
    }

    /// Property names currently excluded from outbound messages
    pub fn active(&self) -> BTreeSet<String> {
        self.inner.sync.lock().debounce.active()
    }

    /// Remote changes waiting for the debounce flush
    pub fn pending(&self) -> PropertyMap {
        self.inner.sync.lock().debounce.pending().clone()
    }

    /// Views this entity currently holds watchers for
    pub fn bound_views(&self) -> Vec<ViewRef> {
        self.inner.sync.lock().ledger.views()
    }

    pub fn watcher_count(&self, scope: &WatcherScope) -> usize {
        self.inner.sync.lock().ledger.count(scope)
    }

    /// Release the watchers owned by `view` and, when `finalize` is set, the
    /// instance-scoped watchers created by [`link`](Self::link)
    ///
    /// A flush armed by `view` is cancelled and its pending batch dropped.
    /// Cleaning up twice is a no-op. Returns the number of watchers released.
    pub fn cleanup(&self, view: Option<&ViewRef>, finalize: bool) -> usize {
        let (watchers, timer) = {
            let mut sync = self.inner.sync.lock();
            let mut watchers = Vec::new();
            if finalize {
                watchers.extend(sync.ledger.take(&WatcherScope::Instance));
            }
            let mut timer = None;
            if let Some(view) = view {
                watchers.extend(sync.ledger.take(&WatcherScope::View(view.clone())));
                timer = sync.debounce.disarm_for(view);
            }
            (watchers, timer)
        };

        if let Some(timer) = timer {
            timer.cancel();
        }

        let released = watchers
            .into_iter()
            .filter(|id| self.inner.state.unwatch(*id))
            .count();

        debug!(
            entity = %self.inner.name,
            view = ?view.map(ViewRef::as_str),
            finalize,
            released,
            "Entity cleaned up"
        );
        released
    }
}

impl std::fmt::Debug for Reactive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactive")
            .field("name", &self.inner.name)
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}
