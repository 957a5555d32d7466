//! Watcher ledger - which watchers belong to which owner
//!
//! Watchers are the unit of cleanup: every watcher the engine registers is
//! recorded under the scope that owns it, and released with that scope.

use crate::state::WatcherId;
use crate::view::ViewRef;
use std::collections::HashMap;

/// Owner of a group of watchers
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WatcherScope {
    /// Explicit cross-entity links; live for the entity's whole lifetime
    Instance,
    /// Created when the entity was rendered into a view
    View(ViewRef),
}

#[derive(Debug, Default)]
pub struct WatcherLedger {
    scopes: HashMap<WatcherScope, Vec<WatcherId>>,
}

impl WatcherLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure a scope exists, even before any watcher is recorded in it
    pub fn open(&mut self, scope: WatcherScope) {
        self.scopes.entry(scope).or_default();
    }

    pub fn record(&mut self, scope: WatcherScope, id: WatcherId) {
        self.scopes.entry(scope).or_default().push(id);
    }

    /// Remove a scope and return its watchers (empty if absent)
    pub fn take(&mut self, scope: &WatcherScope) -> Vec<WatcherId> {
        self.scopes.remove(scope).unwrap_or_default()
    }

    pub fn has_view(&self, view: &ViewRef) -> bool {
        self.scopes.contains_key(&WatcherScope::View(view.clone()))
    }

    pub fn count(&self, scope: &WatcherScope) -> usize {
        self.scopes.get(scope).map(Vec::len).unwrap_or(0)
    }

    pub fn views(&self) -> Vec<ViewRef> {
        let mut views: Vec<ViewRef> = self
            .scopes
            .keys()
            .filter_map(|scope| match scope {
                WatcherScope::View(v) => Some(v.clone()),
                WatcherScope::Instance => None,
            })
            .collect();
        views.sort();
        views
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_take() {
        let mut ledger = WatcherLedger::new();
        let view = WatcherScope::View(ViewRef::new("p1"));
        ledger.record(view.clone(), WatcherId(1));
        ledger.record(view.clone(), WatcherId(2));
        ledger.record(WatcherScope::Instance, WatcherId(3));

        assert_eq!(ledger.count(&view), 2);
        assert_eq!(ledger.take(&view), vec![WatcherId(1), WatcherId(2)]);
        assert!(ledger.take(&view).is_empty());
        assert_eq!(ledger.count(&WatcherScope::Instance), 1);
    }

    #[test]
    fn test_open_scope_counts_as_registered_view() {
        let mut ledger = WatcherLedger::new();
        let view = ViewRef::new("p2");
        assert!(!ledger.has_view(&view));

        ledger.open(WatcherScope::View(view.clone()));
        assert!(ledger.has_view(&view));
        assert_eq!(ledger.views(), vec![view.clone()]);

        ledger.take(&WatcherScope::View(view.clone()));
        assert!(!ledger.has_view(&view));
    }
}
