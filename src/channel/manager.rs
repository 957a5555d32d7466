//! CommManager - explicit registry of live message-based comms
//!
//! Comms are looked up by id when a view is cleaned up, so the registry is
//! the single owner that decides whether a comm is still open.

use super::comm::CommChannel;
use super::{Channel, MessageCallback};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

#[derive(Clone)]
pub struct CommManager {
    prefix: Arc<str>,
    comms: Arc<Mutex<HashMap<String, Arc<CommChannel>>>>,
    counter: Arc<AtomicU64>,
}

impl CommManager {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into().into(),
            comms: Arc::new(Mutex::new(HashMap::new())),
            counter: Arc::new(AtomicU64::new(1)),
        }
    }

    fn next_id(&self, role: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}-{:04x}", self.prefix, role, n)
    }

    /// Create the outbound comm of a rendered view
    pub fn server_comm(&self) -> (Arc<CommChannel>, mpsc::UnboundedReceiver<String>) {
        let (comm, rx) = CommChannel::new(self.next_id("server"));
        let comm = Arc::new(comm);
        self.comms.lock().insert(comm.id().to_string(), comm.clone());
        debug!(comm = %comm.id(), "Server comm created");
        (comm, rx)
    }

    /// Create an inbound comm whose messages are handed to `on_msg`
    pub fn client_comm(&self, subscriber: &str, on_msg: MessageCallback) -> Arc<CommChannel> {
        let (comm, _rx) = CommChannel::new(self.next_id("client"));
        comm.subscribe(subscriber, &[], on_msg);
        let comm = Arc::new(comm);
        self.comms.lock().insert(comm.id().to_string(), comm.clone());
        debug!(comm = %comm.id(), "Client comm created");
        comm
    }

    pub fn get(&self, id: &str) -> Option<Arc<CommChannel>> {
        self.comms.lock().get(id).cloned()
    }

    /// Remove and close a comm
    ///
    /// Unknown ids are a silent no-op; returns whether a live comm was closed.
    pub fn close(&self, id: &str) -> bool {
        let comm = self.comms.lock().remove(id);
        match comm {
            Some(comm) => {
                comm.close();
                true
            }
            None => {
                trace!(comm = id, "No live comm to close");
                false
            }
        }
    }

    pub fn open_count(&self) -> usize {
        self.comms.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_prefixed() {
        let manager = CommManager::new("nb");
        let (a, _rx_a) = manager.server_comm();
        let b = manager.client_comm("p1", Arc::new(|_| {}));

        assert_ne!(a.id(), b.id());
        assert!(a.id().starts_with("nb-server-"));
        assert!(b.id().starts_with("nb-client-"));
        assert_eq!(manager.open_count(), 2);
    }

    #[test]
    fn test_close_is_idempotent() {
        let manager = CommManager::new("nb");
        let comm = manager.client_comm("p1", Arc::new(|_| {}));
        let id = comm.id().to_string();

        assert!(manager.close(&id));
        assert!(!comm.is_open());
        assert!(!manager.close(&id));
        assert!(!manager.close("never-existed"));
        assert_eq!(manager.open_count(), 0);
    }
}
