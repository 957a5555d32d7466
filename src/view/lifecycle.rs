//! ViewManager - creates and tears down the views of rendered entities
//!
//! Every render binds both directions for the entity's synced attributes,
//! registers the view and, for session documents, hooks the session teardown
//! so the view's watchers and channels are released with it.

use super::model::{View, ViewRef};
use super::registry::ViewRegistry;
use crate::channel::{Channel, CommChannel, CommManager, SessionChannel};
use crate::config::SyncConfig;
use crate::document::{Document, DocumentKind};
use crate::error::Result;
use crate::state::PropertyMap;
use crate::sync::{Reactive, ReactiveOptions};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Session-backed rendering of an entity
pub struct SessionBinding {
    pub view: View,
    pub channel: Arc<SessionChannel>,
    /// Property messages pushed to the client
    pub outbound: mpsc::UnboundedReceiver<PropertyMap>,
}

/// Message-based rendering of an entity, ready to be embedded in an output
pub struct NotebookBundle {
    pub view: View,
    /// Server comm carrying updates to the client
    pub comm: Arc<CommChannel>,
    /// Serialized messages sent on the server comm
    pub outbound: mpsc::UnboundedReceiver<String>,
    /// Comm the forwarding code sends client-side changes to
    pub client_comm_id: Option<String>,
    /// (property, forwarding code) pairs to embed with the output
    pub forwarding: Vec<(String, String)>,
}

impl NotebookBundle {
    pub fn ref_id(&self) -> &ViewRef {
        self.view.ref_id()
    }

    /// Properties the output is rendered with
    pub fn properties(&self) -> PropertyMap {
        self.view.properties()
    }
}

#[derive(Clone)]
pub struct ViewManager {
    config: Arc<SyncConfig>,
    registry: ViewRegistry,
    comms: CommManager,
    next_ref: Arc<AtomicU64>,
    next_session: Arc<AtomicU64>,
}

impl ViewManager {
    pub fn new(config: SyncConfig) -> Self {
        let comms = CommManager::new(config.comm_prefix.clone());
        Self {
            config: Arc::new(config),
            registry: ViewRegistry::new(),
            comms,
            next_ref: Arc::new(AtomicU64::new(1000)),
            next_session: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn registry(&self) -> &ViewRegistry {
        &self.registry
    }

    pub fn comms(&self) -> &CommManager {
        &self.comms
    }

    /// Default entity options derived from the configuration
    pub fn entity_options(&self) -> ReactiveOptions {
        ReactiveOptions::from_config(&self.config)
    }

    fn next_ref(&self) -> ViewRef {
        ViewRef::new(format!("p{}", self.next_ref.fetch_add(1, Ordering::SeqCst)))
    }

    /// Render `entity` into `document` over `channel`
    ///
    /// Fails only if the entity's transform rejects one of its current values.
    pub fn render(
        &self,
        entity: &Reactive,
        document: &Document,
        channel: Arc<dyn Channel>,
    ) -> Result<View> {
        let params = entity.synced();
        let mut values = PropertyMap::new();
        for name in &params {
            if let Some(value) = entity.get(name) {
                values.insert(name.clone(), value);
            }
        }
        let properties = entity.codec().process_param_change(values)?;

        let view = View::new(self.next_ref(), document.clone(), channel, properties);
        let ref_id = view.ref_id().clone();

        entity.link_params(&view, &params);
        let props: Vec<String> = params
            .iter()
            .map(|p| entity.codec().table().forward(p).to_string())
            .collect();
        if let Some(comm_id) = entity.link_props(&view, &props, &self.comms) {
            self.registry.record_channel(&ref_id, comm_id);
        }
        self.registry.insert(entity.clone(), view.clone());

        if document.kind() == DocumentKind::Session {
            let manager = self.clone();
            let owner = entity.clone();
            let hook_ref = ref_id.clone();
            document.on_session_destroyed(move || {
                let finalize = owner.options().temporary;
                manager.cleanup(&owner, Some(&hook_ref), finalize);
            });
        }

        info!(
            entity = entity.name(),
            view = %ref_id,
            document = document.id(),
            channel = view.channel().id(),
            "View rendered"
        );
        Ok(view)
    }

    /// Render `entity` into a server session over a session-backed channel
    pub fn server_doc(&self, entity: &Reactive, document: &Document) -> Result<SessionBinding> {
        let n = self.next_session.fetch_add(1, Ordering::SeqCst);
        let (channel, outbound) = SessionChannel::new(format!("{}-session-{}", document.id(), n));
        let channel = Arc::new(channel);
        let view = self.render(entity, document, channel.clone())?;
        self.registry.record_channel(view.ref_id(), channel.id());
        Ok(SessionBinding {
            view,
            channel,
            outbound,
        })
    }

    /// Render `entity` as an embeddable output driven by comms
    pub fn render_notebook(&self, entity: &Reactive, document: &Document) -> Result<NotebookBundle> {
        let (comm, outbound) = self.comms.server_comm();
        let view = match self.render(entity, document, comm.clone()) {
            Ok(view) => view,
            Err(e) => {
                self.comms.close(comm.id());
                return Err(e);
            }
        };
        self.registry.record_channel(view.ref_id(), comm.id());

        let channels = self.registry.channels_for(view.ref_id());
        let client_comm_id = channels.into_iter().find(|id| id != comm.id());
        let forwarding = view.forwarding();

        Ok(NotebookBundle {
            view,
            comm,
            outbound,
            client_comm_id,
            forwarding,
        })
    }

    /// Release `view` (and, when `finalize` is set, every link of `entity`)
    ///
    /// Closes each channel recorded for the view exactly once. A channel
    /// passed in to [`render`](Self::render) may be shared with other views:
    /// only this view's subscriptions are removed from it. Cleaning up a view
    /// that is already gone only releases what is left, without error.
    pub fn cleanup(&self, entity: &Reactive, view: Option<&ViewRef>, finalize: bool) -> usize {
        let released = entity.cleanup(view, finalize);

        let Some(ref_id) = view else {
            return released;
        };

        let channels = self.registry.take_channels(ref_id);
        if let Some((_, view)) = self.registry.remove(ref_id) {
            view.dispose();
            let channel = view.channel();
            channel.unsubscribe(ref_id.as_str());
            if channels.contains(channel.id()) {
                channel.close();
            }
        }

        let mut closed = 0;
        for channel_id in &channels {
            if self.comms.close(channel_id) {
                closed += 1;
            }
        }

        debug!(
            entity = entity.name(),
            view = %ref_id,
            released,
            closed,
            "View cleaned up"
        );
        released
    }

    /// Dispose a registered view by reference id
    ///
    /// Returns `false` if no such view is registered.
    pub fn dispose(&self, ref_id: &ViewRef, finalize: bool) -> bool {
        match self.registry.get(ref_id) {
            Some((entity, _)) => {
                self.cleanup(&entity, Some(ref_id), finalize);
                true
            }
            None => false,
        }
    }

    /// Live views of `entity`
    pub fn views_for(&self, entity: &Reactive) -> Vec<View> {
        self.registry.views_for(entity)
    }
}
