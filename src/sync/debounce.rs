//! Debounce scheduling for remote-origin changes
//!
//! The first change arriving while nothing is pending arms a one-shot timer;
//! later changes are merged (last value per key wins) without re-arming or
//! extending it. Every name in the pending set is also "active": local
//! changes to active names are not pushed out, so a value being received is
//! never rebroadcast.

use crate::document::TimeoutHandle;
use crate::state::PropertyMap;
use crate::view::ViewRef;
use std::collections::{BTreeSet, HashSet};

use super::ReactiveInner;

#[derive(Debug)]
struct ArmedFlush {
    view: ViewRef,
    handle: TimeoutHandle,
}

#[derive(Debug, Default)]
pub struct DebounceScheduler {
    pending: PropertyMap,
    active: HashSet<String>,
    armed: Option<ArmedFlush>,
}

impl DebounceScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a residual remote message into the pending set
    ///
    /// Returns `true` if the pending set was empty, meaning the caller must
    /// arm the flush timer.
    pub fn merge(&mut self, msg: PropertyMap) -> bool {
        let was_idle = self.pending.is_empty();
        self.pending.extend(msg);
        self.active.extend(self.pending.keys().cloned());
        was_idle && !self.pending.is_empty()
    }

    pub fn arm(&mut self, view: ViewRef, handle: TimeoutHandle) {
        self.armed = Some(ArmedFlush { view, handle });
    }

    /// Take the pending batch for application; active markers stay until the
    /// application scope ends (see [`ActiveScope`])
    pub fn take_batch(&mut self) -> PropertyMap {
        self.armed = None;
        std::mem::take(&mut self.pending)
    }

    /// Drop everything armed by `view`, returning the timer to cancel
    pub fn disarm_for(&mut self, view: &ViewRef) -> Option<TimeoutHandle> {
        if self.armed.as_ref().map(|a| &a.view) != Some(view) {
            return None;
        }
        let armed = self.armed.take()?;
        self.pending.clear();
        self.active.clear();
        Some(armed.handle)
    }

    /// Clear markers for names that are no longer pending
    pub fn release_active(&mut self) {
        let pending = &self.pending;
        self.active.retain(|name| pending.contains_key(name));
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.active.contains(name)
    }

    pub fn active(&self) -> BTreeSet<String> {
        self.active.iter().cloned().collect()
    }

    pub fn pending(&self) -> &PropertyMap {
        &self.pending
    }
}

/// Scoped region in which a flushed batch is being applied to local state
///
/// Dropping the scope releases the batch's active markers, whichever way the
/// application routine exits (normal return, early return or `?`).
pub(super) struct ActiveScope<'a> {
    owner: &'a ReactiveInner,
}

impl<'a> ActiveScope<'a> {
    pub(super) fn enter(owner: &'a ReactiveInner) -> Self {
        Self { owner }
    }
}

impl Drop for ActiveScope<'_> {
    fn drop(&mut self) {
        self.owner.sync.lock().debounce.release_active();
    }
}
