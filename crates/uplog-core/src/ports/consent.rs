//! Consent provider port
//!
//! Exposes the user's current [`ConsentState`] and notifies on change. The
//! engine keeps the previous value itself, so a notification only needs to
//! carry the new state.

use std::sync::Arc;

use tokio::sync::watch;

use crate::domain::ConsentState;

/// Port for observing the user's consent
pub trait IConsentProvider: Send + Sync {
    /// Current consent snapshot
    fn current(&self) -> ConsentState;

    /// Subscribes to consent changes
    fn subscribe(&self) -> watch::Receiver<ConsentState>;
}

/// In-process consent provider, seeded from configuration
#[derive(Debug, Clone)]
pub struct ConsentSignal {
    tx: Arc<watch::Sender<ConsentState>>,
}

impl ConsentSignal {
    /// Creates a provider with the given initial consent
    pub fn new(initial: ConsentState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Replaces the consent state, notifying subscribers if it differs
    pub fn set(&self, consent: ConsentState) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == consent {
                false
            } else {
                *current = consent;
                true
            }
        })
    }
}

impl IConsentProvider for ConsentSignal {
    fn current(&self) -> ConsentState {
        self.tx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<ConsentState> {
        self.tx.subscribe()
    }
}
