//! LocalState - declared attributes with synchronous change dispatch
//!
//! Writes are validated and applied atomically under a lock; watchers are
//! invoked afterwards with no lock held so that a watcher may write back
//! into the same (or another) state without deadlocking.

use super::types::{AttributeChanged, ParamSpec, PropertyMap, WatcherId};
use crate::error::{Result, SyncError};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Watcher callback type
///
/// Receives the subset of events from one update that matches the names the
/// watcher was registered for. Errors propagate to the caller of the write.
pub type WatchFn = Arc<dyn Fn(&[AttributeChanged]) -> Result<()> + Send + Sync>;

struct WatcherEntry {
    id: WatcherId,
    names: Vec<String>,
    callback: WatchFn,
}

struct Inner {
    entity: String,
    specs: Vec<ParamSpec>,
    values: HashMap<String, Value>,
    watchers: Vec<WatcherEntry>,
    next_watcher: u64,
}

/// Observable attribute collection owned by a single logical entity
///
/// Cheap to clone; clones share the same attributes and watchers.
#[derive(Clone)]
pub struct LocalState {
    inner: Arc<Mutex<Inner>>,
}

impl LocalState {
    /// Create a new state with every attribute set to its declared default
    pub fn new(entity: impl Into<String>, specs: Vec<ParamSpec>) -> Self {
        let values = specs
            .iter()
            .map(|spec| (spec.name.clone(), spec.default.clone()))
            .collect();

        Self {
            inner: Arc::new(Mutex::new(Inner {
                entity: entity.into(),
                specs,
                values,
                watchers: Vec::new(),
                next_watcher: 1,
            })),
        }
    }

    /// Name of the owning entity
    pub fn entity(&self) -> String {
        self.inner.lock().entity.clone()
    }

    /// Declared attribute names, in declaration order
    pub fn names(&self) -> Vec<String> {
        self.inner
            .lock()
            .specs
            .iter()
            .map(|spec| spec.name.clone())
            .collect()
    }

    pub fn declares(&self, name: &str) -> bool {
        self.inner.lock().values.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner.lock().values.get(name).cloned()
    }

    /// Snapshot of all attribute values
    pub fn values(&self) -> PropertyMap {
        self.inner
            .lock()
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Set a single attribute
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<Vec<AttributeChanged>> {
        let mut batch = PropertyMap::new();
        batch.insert(name.to_string(), value.into());
        self.update(batch)
    }

    /// Atomically set several attributes
    ///
    /// Every key is validated before anything is applied. Returns the events
    /// that were produced (attributes whose value did not change are omitted).
    pub fn update(&self, batch: PropertyMap) -> Result<Vec<AttributeChanged>> {
        let (events, watchers) = {
            let mut inner = self.inner.lock();
            for (name, value) in &batch {
                inner.check(name, value)?;
            }
            let events = inner.apply(batch);
            (events, inner.snapshot_watchers())
        };

        self.dispatch(&events, watchers)?;
        Ok(events)
    }

    /// Apply a batch, skipping keys that are undeclared or of the wrong kind
    ///
    /// Used when applying remote-origin changes: a bad key is a recoverable
    /// no-op for that key only and the rest of the batch still applies.
    pub fn apply_batch(&self, batch: PropertyMap) -> Result<Vec<AttributeChanged>> {
        let (events, watchers) = {
            let mut inner = self.inner.lock();
            let mut accepted = PropertyMap::new();
            for (name, value) in batch {
                match inner.check(&name, &value) {
                    Ok(()) => {
                        accepted.insert(name, value);
                    }
                    Err(e) => warn!(entity = %inner.entity, "Skipping remote change: {}", e),
                }
            }
            let events = inner.apply(accepted);
            (events, inner.snapshot_watchers())
        };

        self.dispatch(&events, watchers)?;
        Ok(events)
    }

    /// Register a watcher for the given attribute names
    pub fn watch<S: AsRef<str>>(&self, names: &[S], callback: WatchFn) -> WatcherId {
        let mut inner = self.inner.lock();
        let id = WatcherId(inner.next_watcher);
        inner.next_watcher += 1;
        inner.watchers.push(WatcherEntry {
            id,
            names: names.iter().map(|n| n.as_ref().to_string()).collect(),
            callback,
        });
        debug!(entity = %inner.entity, watcher = %id, "Watcher registered");
        id
    }

    /// Unregister a watcher
    ///
    /// Returns `false` if the watcher was not (or no longer) registered.
    pub fn unwatch(&self, id: WatcherId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.watchers.len();
        inner.watchers.retain(|w| w.id != id);
        let removed = inner.watchers.len() != before;
        if removed {
            debug!(entity = %inner.entity, watcher = %id, "Watcher released");
        }
        removed
    }

    pub fn is_watching(&self, id: WatcherId) -> bool {
        self.inner.lock().watchers.iter().any(|w| w.id == id)
    }

    pub fn watcher_count(&self) -> usize {
        self.inner.lock().watchers.len()
    }

    fn dispatch(
        &self,
        events: &[AttributeChanged],
        watchers: Vec<(WatcherId, Vec<String>, WatchFn)>,
    ) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        for (id, names, callback) in watchers {
            // An earlier watcher in this dispatch may have released this one
            if !self.is_watching(id) {
                continue;
            }
            let matching: Vec<AttributeChanged> = events
                .iter()
                .filter(|e| names.iter().any(|n| *n == e.name))
                .cloned()
                .collect();
            if matching.is_empty() {
                continue;
            }
            trace!(watcher = %id, count = matching.len(), "Dispatching attribute changes");
            callback(&matching)?;
        }
        Ok(())
    }
}

impl Inner {
    fn check(&self, name: &str, value: &Value) -> Result<()> {
        let spec = self
            .specs
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| SyncError::UnknownAttribute {
                entity: self.entity.clone(),
                name: name.to_string(),
            })?;

        if !spec.kind.accepts(value) {
            return Err(SyncError::TypeMismatch {
                name: name.to_string(),
                expected: spec.kind.as_str(),
                found: value.to_string(),
            });
        }
        Ok(())
    }

    /// Apply pre-validated values, returning events in declaration order
    fn apply(&mut self, mut batch: PropertyMap) -> Vec<AttributeChanged> {
        let mut events = Vec::new();
        for spec in &self.specs {
            let Some(new) = batch.remove(&spec.name) else {
                continue;
            };
            let Some(slot) = self.values.get_mut(&spec.name) else {
                continue;
            };
            if *slot == new {
                continue;
            }
            let old = std::mem::replace(slot, new.clone());
            events.push(AttributeChanged {
                name: spec.name.clone(),
                old,
                new,
            });
        }
        events
    }

    fn snapshot_watchers(&self) -> Vec<(WatcherId, Vec<String>, WatchFn)> {
        self.watchers
            .iter()
            .map(|w| (w.id, w.names.clone(), w.callback.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::types::ParamKind;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_state() -> LocalState {
        LocalState::new(
            "slider",
            vec![
                ParamSpec::integer("value", 0),
                ParamSpec::string("title", ""),
                ParamSpec::boolean("disabled", false),
            ],
        )
    }

    fn counting_watcher(counter: Arc<AtomicUsize>) -> WatchFn {
        Arc::new(move |events| {
            counter.fetch_add(events.len(), Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_defaults_and_get() {
        let state = make_state();
        assert_eq!(state.get("value"), Some(json!(0)));
        assert_eq!(state.get("missing"), None);
        assert_eq!(state.names(), vec!["value", "title", "disabled"]);
        assert!(state.declares("title"));
    }

    #[test]
    fn test_set_produces_event() {
        let state = make_state();
        let events = state.set("value", 5).unwrap();
        assert_eq!(
            events,
            vec![AttributeChanged {
                name: "value".to_string(),
                old: json!(0),
                new: json!(5),
            }]
        );
    }

    #[test]
    fn test_unchanged_value_produces_no_event() {
        let state = make_state();
        let counter = Arc::new(AtomicUsize::new(0));
        state.watch(&["value"], counting_watcher(counter.clone()));

        state.set("value", 0).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_strict_update_is_all_or_nothing() {
        let state = make_state();
        let mut batch = PropertyMap::new();
        batch.insert("value".to_string(), json!(3));
        batch.insert("bogus".to_string(), json!(1));

        let err = state.update(batch).unwrap_err();
        assert!(matches!(err, SyncError::UnknownAttribute { .. }));
        assert_eq!(state.get("value"), Some(json!(0)));

        let err = state.set("disabled", "yes").unwrap_err();
        assert!(matches!(
            err,
            SyncError::TypeMismatch { expected, .. } if expected == ParamKind::Boolean.as_str()
        ));
    }

    #[test]
    fn test_apply_batch_skips_bad_keys() {
        let state = make_state();
        let mut batch = PropertyMap::new();
        batch.insert("value".to_string(), json!(3));
        batch.insert("bogus".to_string(), json!(1));
        batch.insert("disabled".to_string(), json!("nope"));

        let events = state.apply_batch(batch).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(state.get("value"), Some(json!(3)));
        assert_eq!(state.get("disabled"), Some(json!(false)));
    }

    #[test]
    fn test_watcher_receives_matching_subset_once() {
        let state = make_state();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let calls_clone = calls.clone();
        let seen_clone = seen.clone();
        state.watch(
            &["value", "title"],
            Arc::new(move |events| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                seen_clone
                    .lock()
                    .extend(events.iter().map(|e| e.name.clone()));
                Ok(())
            }),
        );

        let mut batch = PropertyMap::new();
        batch.insert("value".to_string(), json!(1));
        batch.insert("title".to_string(), json!("t"));
        batch.insert("disabled".to_string(), json!(true));
        state.update(batch).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock(), vec!["value".to_string(), "title".to_string()]);
    }

    #[test]
    fn test_unwatch() {
        let state = make_state();
        let counter = Arc::new(AtomicUsize::new(0));
        let id = state.watch(&["value"], counting_watcher(counter.clone()));

        assert!(state.unwatch(id));
        assert!(!state.unwatch(id)); // double release is not an error
        state.set("value", 9).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_watcher_released_mid_dispatch_is_skipped() {
        let state = make_state();
        let counter = Arc::new(AtomicUsize::new(0));
        let victim = Arc::new(Mutex::new(None::<WatcherId>));

        let state_clone = state.clone();
        let victim_clone = victim.clone();
        state.watch(
            &["value"],
            Arc::new(move |_| {
                if let Some(id) = *victim_clone.lock() {
                    state_clone.unwatch(id);
                }
                Ok(())
            }),
        );
        let id = state.watch(&["value"], counting_watcher(counter.clone()));
        *victim.lock() = Some(id);

        state.set("value", 1).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_watcher_may_write_back() {
        let state = make_state();
        let state_clone = state.clone();
        state.watch(
            &["value"],
            Arc::new(move |events| {
                let title = format!("value is {}", events[0].new);
                state_clone.set("title", title).map(|_| ())
            }),
        );

        state.set("value", 4).unwrap();
        assert_eq!(state.get("title"), Some(json!("value is 4")));
    }

    #[test]
    fn test_watcher_error_propagates() {
        let state = make_state();
        state.watch(
            &["value"],
            Arc::new(|_| {
                Err(SyncError::Transform {
                    name: "value".to_string(),
                    reason: "boom".to_string(),
                })
            }),
        );

        let err = state.set("value", 2).unwrap_err();
        assert!(matches!(err, SyncError::Transform { .. }));
    }
}
