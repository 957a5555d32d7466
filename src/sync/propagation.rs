//! Change propagation between local state and rendered views
//!
//! Local → remote: a watcher per view translates attribute changes through
//! the codec, drops names that are active (mid-application from a remote
//! flush) and dispatches what remains on the view's channel.
//!
//! Remote → local: channel subscriptions feed the echo filter (message-based
//! channels only) and then the debounce scheduler, whose flush applies the
//! whole batch to local state in one update.

use super::debounce::ActiveScope;
use super::{Reactive, WatcherScope};
use crate::channel::{forwarding_code, Channel, ChannelKind, CommManager, ForwardingParams};
use crate::error::Result;
use crate::state::{AttributeChanged, PropertyMap, WatchFn, WatcherId};
use crate::view::{View, ViewRef, WeakView};
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

use super::ReactiveInner;

impl Reactive {
    fn from_weak(weak: &Weak<ReactiveInner>) -> Option<Reactive> {
        weak.upgrade().map(|inner| Reactive { inner })
    }

    /// Push local changes of `params` to `view`
    ///
    /// The watcher is owned by the view and released by its cleanup.
    pub fn link_params(&self, view: &View, params: &[String]) -> WatcherId {
        let weak = Arc::downgrade(&self.inner);
        let target = view.clone();
        let callback: WatchFn = Arc::new(move |events| match Reactive::from_weak(&weak) {
            Some(entity) => entity.param_change(&target, events),
            None => Ok(()),
        });

        let id = self.inner.state.watch(params, callback);
        self.inner
            .sync
            .lock()
            .ledger
            .record(WatcherScope::View(view.ref_id().clone()), id);

        debug!(entity = %self.inner.name, view = %view.ref_id(), ?params, "Linked params");
        id
    }

    /// Receive client-side changes of `properties` from `view`
    ///
    /// Session-backed views subscribe on their own channel. Message-based
    /// views get a fresh client comm plus one forwarding snippet per
    /// property; the comm id is returned so the caller can record it
    /// against the view for cleanup.
    pub fn link_props(
        &self,
        view: &View,
        properties: &[String],
        comms: &CommManager,
    ) -> Option<String> {
        self.inner
            .sync
            .lock()
            .ledger
            .open(WatcherScope::View(view.ref_id().clone()));

        let weak = Arc::downgrade(&self.inner);
        let weak_view = view.downgrade();

        match view.channel().kind() {
            ChannelKind::SessionBacked => {
                view.channel().subscribe(
                    view.ref_id().as_str(),
                    properties,
                    Arc::new(move |msg| {
                        if let Some((entity, view)) = upgrade_pair(&weak, &weak_view) {
                            entity.server_change(&view, msg);
                        }
                    }),
                );
                debug!(entity = %self.inner.name, view = %view.ref_id(), ?properties, "Linked session props");
                None
            }
            ChannelKind::MessageBased => {
                let client_comm = comms.client_comm(
                    view.ref_id().as_str(),
                    Arc::new(move |msg| {
                        if let Some((entity, view)) = upgrade_pair(&weak, &weak_view) {
                            entity.comm_change(&view, msg);
                        }
                    }),
                );
                let comm_id = client_comm.id().to_string();

                for property in properties {
                    let code = forwarding_code(&ForwardingParams {
                        comm_id: comm_id.clone(),
                        property: property.clone(),
                        timeout_ms: self.inner.options.timeout.as_millis() as u64,
                        debounce_ms: self.inner.options.debounce.as_millis() as u64,
                        plot_id: view.ref_id().to_string(),
                    });
                    view.attach_forwarding(property.clone(), code);
                }
                debug!(entity = %self.inner.name, view = %view.ref_id(), comm = %comm_id, "Linked comm props");
                Some(comm_id)
            }
        }
    }

    /// Local attribute changes → outbound message for one view
    fn param_change(&self, view: &View, events: &[AttributeChanged]) -> Result<()> {
        let mut msg = PropertyMap::new();
        for event in events {
            let mut single = PropertyMap::new();
            single.insert(event.name.clone(), event.new.clone());
            msg.extend(self.inner.codec.process_param_change(single)?);
        }

        {
            let sync = self.inner.sync.lock();
            msg.retain(|name, _| {
                let active = sync.debounce.is_active(name);
                if active {
                    trace!(view = %view.ref_id(), property = %name, "Skipping active property");
                }
                !active
            });
        }
        if msg.is_empty() {
            return Ok(());
        }

        match view.channel().kind() {
            ChannelKind::MessageBased => {
                // Expect the echo before the message can possibly come back
                self.inner.sync.lock().echo.expect(msg.keys());
                view.update(&msg);
                view.channel().send(&msg);
                trace!(view = %view.ref_id(), keys = msg.len(), "Pushed over comm");
            }
            ChannelKind::SessionBacked => {
                if view.queue_tick_update(msg) {
                    let target = view.clone();
                    view.document()
                        .schedule_next_tick(move || target.flush_tick_update());
                    trace!(view = %view.ref_id(), "Scheduled next-tick update");
                }
            }
        }
        Ok(())
    }

    /// Inbound message from a message-based channel
    pub fn comm_change(&self, view: &View, msg: PropertyMap) {
        let residual = self.inner.sync.lock().echo.filter(msg);
        if residual.is_empty() {
            return;
        }
        self.remote_change(view, residual);
    }

    /// Inbound change from a session-backed channel
    pub fn server_change(&self, view: &View, msg: PropertyMap) {
        self.remote_change(view, msg);
    }

    fn remote_change(&self, view: &View, msg: PropertyMap) {
        let mut sync = self.inner.sync.lock();
        if !sync.ledger.has_view(view.ref_id()) {
            trace!(view = %view.ref_id(), "Ignoring change from released view");
            return;
        }

        if !sync.debounce.merge(msg) {
            return;
        }

        // Scheduling only spawns the timer, so it is safe under the lock
        let weak = Arc::downgrade(&self.inner);
        let ref_id = view.ref_id().clone();
        let handle = view.document().schedule_after(
            move || {
                if let Some(entity) = Reactive::from_weak(&weak) {
                    if let Err(e) = entity.change_event(&ref_id) {
                        warn!(entity = %entity.inner.name, view = %ref_id, "Failed to apply remote changes: {}", e);
                    }
                }
            },
            self.inner.options.debounce,
        );
        sync.debounce.arm(view.ref_id().clone(), handle);
        trace!(entity = %self.inner.name, view = %view.ref_id(), "Debounce armed");
    }

    /// Apply the pending remote batch to local state
    ///
    /// Runs as the debounce flush armed by `view`. If that view has been
    /// released in the meantime nothing is applied. Returns the local events
    /// produced by the batch.
    pub fn change_event(&self, view: &ViewRef) -> Result<Vec<AttributeChanged>> {
        let (batch, registered) = {
            let mut sync = self.inner.sync.lock();
            (sync.debounce.take_batch(), sync.ledger.has_view(view))
        };
        let _scope = ActiveScope::enter(&self.inner);

        if !registered {
            debug!(entity = %self.inner.name, view = %view, "Dropping flush for released view");
            return Ok(Vec::new());
        }
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let local = self.inner.codec.process_property_change(batch)?;
        let events = self.inner.state.apply_batch(local)?;
        trace!(entity = %self.inner.name, changed = events.len(), "Remote batch applied");
        Ok(events)
    }
}

fn upgrade_pair(entity: &Weak<ReactiveInner>, view: &WeakView) -> Option<(Reactive, View)> {
    Some((Reactive::from_weak(entity)?, view.upgrade()?))
}
