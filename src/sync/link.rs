//! Explicit cross-entity links
//!
//! `source.link(&target, &[("a", "b")])` mirrors every change of `source.a`
//! into `target.b`. Each link carries its own set of attribute names that
//! are currently being forwarded, so a pair of links in opposite directions
//! (A → B → A) cannot recurse.

use super::{Reactive, WatcherScope};
use crate::error::{Result, SyncError};
use crate::state::{WatchFn, WatcherId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// Removes a name from the link's updating set when dropped
struct Updating<'a> {
    set: &'a Mutex<HashSet<String>>,
    name: String,
}

impl Updating<'_> {
    /// Returns `None` if `name` is already being forwarded by this link
    fn enter<'a>(set: &'a Mutex<HashSet<String>>, name: &str) -> Option<Updating<'a>> {
        if !set.lock().insert(name.to_string()) {
            return None;
        }
        Some(Updating {
            set,
            name: name.to_string(),
        })
    }
}

impl Drop for Updating<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.name);
    }
}

impl Reactive {
    /// Link attributes of this entity to attributes of `target`
    ///
    /// The watcher is instance-scoped: it lives until `cleanup(_, finalize = true)`.
    pub fn link(&self, target: &Reactive, links: &[(&str, &str)]) -> Result<WatcherId> {
        for (source_name, target_name) in links {
            if !self.inner.state.declares(source_name) {
                return Err(SyncError::UnknownAttribute {
                    entity: self.inner.name.clone(),
                    name: source_name.to_string(),
                });
            }
            if !target.inner.state.declares(target_name) {
                return Err(SyncError::UnknownAttribute {
                    entity: target.inner.name.clone(),
                    name: target_name.to_string(),
                });
            }
        }

        let mapping: HashMap<String, String> = links
            .iter()
            .map(|(s, t)| (s.to_string(), t.to_string()))
            .collect();
        let names: Vec<String> = mapping.keys().cloned().collect();
        let updating = Arc::new(Mutex::new(HashSet::new()));
        // Weak so that two entities linked both ways do not keep each other alive
        let target_inner = Arc::downgrade(&target.inner);

        let callback: WatchFn = Arc::new(move |events| {
            let Some(target) = target_inner.upgrade() else {
                return Ok(());
            };
            for event in events {
                let Some(_guard) = Updating::enter(&updating, &event.name) else {
                    trace!(attribute = %event.name, "Link already updating, skipping");
                    continue;
                };
                if let Some(target_name) = mapping.get(&event.name) {
                    target.state.set(target_name, event.new.clone())?;
                }
            }
            Ok(())
        });

        let id = self.inner.state.watch(&names, callback);
        self.inner
            .sync
            .lock()
            .ledger
            .record(WatcherScope::Instance, id);

        debug!(
            source = %self.inner.name,
            target = %target.inner.name,
            links = links.len(),
            "Entities linked"
        );
        Ok(id)
    }
}
