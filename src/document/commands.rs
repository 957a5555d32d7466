//! Command enum for the document actor
//!
//! Scheduling commands are fire-and-forget; `Sync` and `Destroy` carry a
//! oneshot channel so callers can wait for the actor to catch up.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Callback executed once on the document loop
pub type TaskFn = Box<dyn FnOnce() + Send>;

/// Hook executed when the session is torn down
pub type TeardownFn = Box<dyn FnOnce() + Send>;

pub enum DocumentCommand {
    /// Run a callback before the next client round-trip
    NextTick(TaskFn),

    /// A delayed callback whose delay has elapsed
    Timeout {
        id: u64,
        cancelled: Arc<AtomicBool>,
        callback: TaskFn,
    },

    /// Register a session-teardown hook
    OnDestroy(TeardownFn),

    /// Resolve once every previously queued command has run
    Sync(oneshot::Sender<()>),

    /// Run teardown hooks and stop the loop
    Destroy(Option<oneshot::Sender<()>>),
}

// Manual Debug implementation because callbacks don't implement Debug
impl std::fmt::Debug for DocumentCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentCommand::NextTick(_) => f.debug_struct("NextTick").finish_non_exhaustive(),
            DocumentCommand::Timeout { id, .. } => f
                .debug_struct("Timeout")
                .field("id", id)
                .finish_non_exhaustive(),
            DocumentCommand::OnDestroy(_) => f.debug_struct("OnDestroy").finish_non_exhaustive(),
            DocumentCommand::Sync(_) => write!(f, "Sync"),
            DocumentCommand::Destroy(_) => write!(f, "Destroy"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_debug() {
        let cmd = DocumentCommand::NextTick(Box::new(|| {}));
        assert!(format!("{:?}", cmd).contains("NextTick"));

        let cmd = DocumentCommand::Timeout {
            id: 7,
            cancelled: Arc::new(AtomicBool::new(false)),
            callback: Box::new(|| {}),
        };
        let debug_str = format!("{:?}", cmd);
        assert!(debug_str.contains("Timeout"));
        assert!(debug_str.contains('7'));

        let (tx, _rx) = oneshot::channel();
        assert_eq!(format!("{:?}", DocumentCommand::Sync(tx)), "Sync");
    }
}
