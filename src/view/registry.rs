//! ViewRegistry - explicit table of rendered views
//!
//! Keeps every live view with the entity it renders, plus a side table of
//! the message channels created for each view so that cleanup can close
//! them without inspecting generated client code.

use super::model::{View, ViewRef};
use crate::sync::Reactive;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::trace;

#[derive(Default)]
struct RegistryInner {
    views: HashMap<ViewRef, (Reactive, View)>,
    channels: HashMap<ViewRef, BTreeSet<String>>,
}

/// Registry of rendered views, scoped to whoever owns it (process or session)
#[derive(Clone, Default)]
pub struct ViewRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entity: Reactive, view: View) {
        let ref_id = view.ref_id().clone();
        trace!(view = %ref_id, entity = entity.name(), "View registered");
        self.inner.lock().views.insert(ref_id, (entity, view));
    }

    pub fn get(&self, ref_id: &ViewRef) -> Option<(Reactive, View)> {
        self.inner.lock().views.get(ref_id).cloned()
    }

    pub fn contains(&self, ref_id: &ViewRef) -> bool {
        self.inner.lock().views.contains_key(ref_id)
    }

    /// Remove a view; returns `None` if it was not registered
    pub fn remove(&self, ref_id: &ViewRef) -> Option<(Reactive, View)> {
        self.inner.lock().views.remove(ref_id)
    }

    /// Live views rendering `entity`
    pub fn views_for(&self, entity: &Reactive) -> Vec<View> {
        let inner = self.inner.lock();
        let mut views: Vec<View> = inner
            .views
            .values()
            .filter(|(e, _)| e.same_entity(entity))
            .map(|(_, v)| v.clone())
            .collect();
        views.sort_by(|a, b| a.ref_id().cmp(b.ref_id()));
        views
    }

    /// Record that `channel_id` was created for `ref_id`
    pub fn record_channel(&self, ref_id: &ViewRef, channel_id: impl Into<String>) {
        self.inner
            .lock()
            .channels
            .entry(ref_id.clone())
            .or_default()
            .insert(channel_id.into());
    }

    /// Take the distinct channel ids recorded for `ref_id`
    pub fn take_channels(&self, ref_id: &ViewRef) -> BTreeSet<String> {
        self.inner
            .lock()
            .channels
            .remove(ref_id)
            .unwrap_or_default()
    }

    pub fn channels_for(&self, ref_id: &ViewRef) -> BTreeSet<String> {
        self.inner
            .lock()
            .channels
            .get(ref_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::SessionChannel;
    use crate::document::Document;
    use crate::state::{ParamSpec, PropertyMap};

    fn make_view(id: &str) -> View {
        let (channel, _rx) = SessionChannel::new(format!("{}-channel", id));
        View::new(
            ViewRef::new(id),
            Document::session("doc"),
            Arc::new(channel),
            PropertyMap::new(),
        )
    }

    #[tokio::test]
    async fn test_insert_get_remove() {
        let registry = ViewRegistry::new();
        let entity = Reactive::builder("toggle")
            .param(ParamSpec::boolean("value", false))
            .build();
        let view = make_view("p1");

        registry.insert(entity.clone(), view.clone());
        assert!(registry.contains(view.ref_id()));
        assert_eq!(registry.views_for(&entity).len(), 1);

        assert!(registry.remove(view.ref_id()).is_some());
        assert!(registry.remove(view.ref_id()).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_views_for_filters_by_entity() {
        let registry = ViewRegistry::new();
        let a = Reactive::builder("a").build();
        let b = Reactive::builder("b").build();

        registry.insert(a.clone(), make_view("p1"));
        registry.insert(a.clone(), make_view("p2"));
        registry.insert(b.clone(), make_view("p3"));

        let refs: Vec<String> = registry
            .views_for(&a)
            .iter()
            .map(|v| v.ref_id().to_string())
            .collect();
        assert_eq!(refs, vec!["p1", "p2"]);
    }

    #[test]
    fn test_channel_side_table_is_distinct() {
        let registry = ViewRegistry::new();
        let ref_id = ViewRef::new("p9");
        registry.record_channel(&ref_id, "c1");
        registry.record_channel(&ref_id, "c1");
        registry.record_channel(&ref_id, "c2");

        assert_eq!(registry.channels_for(&ref_id).len(), 2);
        assert_eq!(registry.take_channels(&ref_id).len(), 2);
        assert!(registry.take_channels(&ref_id).is_empty());
    }
}
