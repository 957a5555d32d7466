//! Document/session context
//!
//! A document is the unit of serialized execution for rendered views: the
//! next-tick and delayed callbacks scheduled on it run one after another on
//! its own actor loop, and its teardown hooks run exactly once when the
//! session is destroyed.

mod actor;
mod commands;

pub use commands::{DocumentCommand, TaskFn, TeardownFn};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

/// Kind of context a document renders into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    /// Persistent server-held interactive session
    Session,
    /// Embedded output with no persistent session (message-based channels)
    Notebook,
}

/// Handle to a document actor
///
/// Cheap to clone. All scheduling methods are fire-and-forget and become
/// no-ops once the document has been destroyed.
#[derive(Clone)]
pub struct Document {
    id: Arc<str>,
    kind: DocumentKind,
    cmd_tx: mpsc::UnboundedSender<DocumentCommand>,
    next_timeout: Arc<AtomicU64>,
}

/// Cancellation handle for a delayed callback
#[derive(Debug, Clone)]
pub struct TimeoutHandle {
    id: u64,
    cancelled: Arc<AtomicBool>,
}

impl TimeoutHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Prevent the callback from running if it has not run yet
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Document {
    /// Spawn a new document actor (must be called inside a tokio runtime)
    pub fn new(id: impl Into<String>, kind: DocumentKind) -> Self {
        actor::DocumentActor::spawn(id.into(), kind)
    }

    pub fn session(id: impl Into<String>) -> Self {
        Self::new(id, DocumentKind::Session)
    }

    pub fn notebook(id: impl Into<String>) -> Self {
        Self::new(id, DocumentKind::Notebook)
    }

    fn from_parts(
        id: String,
        kind: DocumentKind,
        cmd_tx: mpsc::UnboundedSender<DocumentCommand>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            cmd_tx,
            next_timeout: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    /// Run `callback` once, serialized with other activity on this document
    ///
    /// Returns `false` if the document has already been destroyed.
    pub fn schedule_next_tick(&self, callback: impl FnOnce() + Send + 'static) -> bool {
        self.cmd_tx
            .send(DocumentCommand::NextTick(Box::new(callback)))
            .is_ok()
    }

    /// Run `callback` once after `delay`, unless cancelled first
    pub fn schedule_after(
        &self,
        callback: impl FnOnce() + Send + 'static,
        delay: Duration,
    ) -> TimeoutHandle {
        let id = self.next_timeout.fetch_add(1, Ordering::SeqCst);
        let cancelled = Arc::new(AtomicBool::new(false));
        let handle = TimeoutHandle {
            id,
            cancelled: cancelled.clone(),
        };

        trace!(document = %self.id, timeout = id, delay_ms = delay.as_millis() as u64, "Timeout scheduled");

        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if cancelled.load(Ordering::SeqCst) {
                return;
            }
            let _ = cmd_tx.send(DocumentCommand::Timeout {
                id,
                cancelled,
                callback: Box::new(callback),
            });
        });

        handle
    }

    /// Attach a hook that runs when the session is torn down
    pub fn on_session_destroyed(&self, hook: impl FnOnce() + Send + 'static) -> bool {
        self.cmd_tx
            .send(DocumentCommand::OnDestroy(Box::new(hook)))
            .is_ok()
    }

    /// Wait until every command queued before this call has been processed
    pub async fn sync(&self) {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(DocumentCommand::Sync(tx)).is_err() {
            return;
        }
        let _ = rx.await;
    }

    /// Tear down the session: run teardown hooks and stop the loop
    pub async fn destroy(&self) {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(DocumentCommand::Destroy(Some(tx))).is_err() {
            return;
        }
        let _ = rx.await;
    }

    /// Returns false once the actor loop has stopped
    pub fn is_alive(&self) -> bool {
        !self.cmd_tx.is_closed()
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[tokio::test]
    async fn test_next_tick_runs_in_order() {
        let doc = Document::session("doc-1");
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let log = log.clone();
            doc.schedule_next_tick(move || log.lock().push(i));
        }
        doc.sync().await;

        assert_eq!(*log.lock(), vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_after_waits_for_delay() {
        let doc = Document::session("doc-2");
        let fired = Arc::new(AtomicBool::new(false));

        let fired_clone = fired.clone();
        doc.schedule_after(
            move || fired_clone.store(true, Ordering::SeqCst),
            Duration::from_millis(50),
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        doc.sync().await;
        assert!(!fired.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(40)).await;
        doc.sync().await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timeout_never_runs() {
        let doc = Document::session("doc-3");
        let fired = Arc::new(AtomicBool::new(false));

        let fired_clone = fired.clone();
        let handle = doc.schedule_after(
            move || fired_clone.store(true, Ordering::SeqCst),
            Duration::from_millis(50),
        );
        handle.cancel();
        assert!(handle.is_cancelled());

        tokio::time::sleep(Duration::from_millis(100)).await;
        doc.sync().await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_destroy_runs_hooks_once() {
        let doc = Document::session("doc-4");
        let count = Arc::new(AtomicU64::new(0));

        let count_clone = count.clone();
        doc.on_session_destroyed(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        doc.destroy().await;
        doc.destroy().await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!doc.is_alive());
        assert!(!doc.schedule_next_tick(|| {}));
    }
}
