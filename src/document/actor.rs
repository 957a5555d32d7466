//! DocumentActor - serial execution loop for one document/session
//!
//! Every scheduled callback of a document runs on this loop, one at a time,
//! which gives entity bindings the single-threaded cooperative model they
//! rely on without any external lock ordering.

use super::commands::{DocumentCommand, TeardownFn};
use super::{Document, DocumentKind};
use std::sync::atomic::Ordering;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

pub(super) struct DocumentActor {
    id: String,
    kind: DocumentKind,
    command_rx: mpsc::UnboundedReceiver<DocumentCommand>,
    teardown_hooks: Vec<TeardownFn>,
    /// Total callbacks executed
    executed: u64,
}

impl DocumentActor {
    /// Spawn the actor loop and return a handle to it
    pub(super) fn spawn(id: String, kind: DocumentKind) -> Document {
        let (cmd_tx, command_rx) = mpsc::unbounded_channel();

        let actor = DocumentActor {
            id: id.clone(),
            kind,
            command_rx,
            teardown_hooks: Vec::new(),
            executed: 0,
        };

        tokio::spawn(actor.run());
        debug!(document = %id, ?kind, "Document actor spawned");

        Document::from_parts(id, kind, cmd_tx)
    }

    async fn run(mut self) {
        while let Some(cmd) = self.command_rx.recv().await {
            trace!(document = %self.id, ?cmd, "Processing command");

            match cmd {
                DocumentCommand::NextTick(callback) => {
                    callback();
                    self.executed += 1;
                }
                DocumentCommand::Timeout {
                    id,
                    cancelled,
                    callback,
                } => {
                    if cancelled.load(Ordering::SeqCst) {
                        trace!(document = %self.id, timeout = id, "Skipping cancelled timeout");
                        continue;
                    }
                    callback();
                    self.executed += 1;
                }
                DocumentCommand::OnDestroy(hook) => {
                    self.teardown_hooks.push(hook);
                }
                DocumentCommand::Sync(response) => {
                    let _ = response.send(());
                }
                DocumentCommand::Destroy(response) => {
                    self.destroy();
                    if let Some(response) = response {
                        let _ = response.send(());
                    }
                    break;
                }
            }
        }

        info!(
            document = %self.id,
            kind = ?self.kind,
            executed = self.executed,
            "Document loop terminated"
        );
    }

    fn destroy(&mut self) {
        let hooks = std::mem::take(&mut self.teardown_hooks);
        info!(document = %self.id, hooks = hooks.len(), "Session destroyed, running teardown hooks");
        for hook in hooks {
            hook();
        }
        // Anything queued after the teardown request is dropped with the receiver
        self.command_rx.close();
    }
}
