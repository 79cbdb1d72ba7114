//! Connectivity monitor port
//!
//! Exposes the current reachability of the collection service and an
//! edge-triggered change notification.

use std::sync::Arc;

use tokio::sync::watch;

/// Port for observing reachability of the collection service
pub trait IConnectivityMonitor: Send + Sync {
    /// Whether the collection service is currently reachable
    fn is_available(&self) -> bool;

    /// Subscribes to reachability changes
    ///
    /// The receiver starts at the current value and is only notified when
    /// the value actually changes.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// In-process connectivity monitor fed by a probe or by tests
#[derive(Debug, Clone)]
pub struct ConnectivitySignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ConnectivitySignal {
    /// Creates a signal with the given initial reachability
    pub fn new(available: bool) -> Self {
        let (tx, _rx) = watch::channel(available);
        Self { tx: Arc::new(tx) }
    }

    /// Publishes a reachability sample
    ///
    /// # Returns
    /// `true` if the value changed and subscribers were notified.
    pub fn set(&self, available: bool) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == available {
                false
            } else {
                *current = available;
                true
            }
        })
    }
}

impl IConnectivityMonitor for ConnectivitySignal {
    fn is_available(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
