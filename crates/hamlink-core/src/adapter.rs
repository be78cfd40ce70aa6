//! The [`Adapter`] trait -- the common surface of every long-lived adapter.
//!
//! Each protocol crate (`hamlink-wsjtx`, `hamlink-flex`, `hamlink-tci`,
//! `hamlink-pskreporter`) implements this trait in addition to its own
//! protocol-specific operations. A host can hold a `Vec<Box<dyn Adapter>>`
//! to drive status display and shutdown uniformly.
//!
//! Protocol operations (spot push, CW keying, WSJT-X replies) are NOT part
//! of this trait. They are inherent methods on the concrete adapter types,
//! because their shapes differ per protocol.

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use crate::events::AdapterEvent;
use crate::types::ConnectionState;

/// Lifecycle and event surface shared by every adapter.
///
/// All methods are safe to call in any connection state.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Short human-readable adapter name (e.g. `"smartsdr"`).
    fn name(&self) -> &str;

    /// Current connection state.
    fn connection_state(&self) -> ConnectionState {
        *self.state_watch().borrow()
    }

    /// Watch channel that follows every connection state transition.
    fn state_watch(&self) -> watch::Receiver<ConnectionState>;

    /// Subscribe to adapter events.
    ///
    /// Events are delivered through a broadcast channel. Slow subscribers
    /// lag and lose the oldest events rather than blocking the adapter.
    fn subscribe(&self) -> broadcast::Receiver<AdapterEvent>;

    /// Tear the adapter down.
    ///
    /// Cancels every pending timer and marks the state terminal before the
    /// socket is closed, so no late socket event is processed afterwards.
    /// Calling it twice is harmless.
    async fn disconnect(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy {
        state: watch::Sender<ConnectionState>,
        events: broadcast::Sender<AdapterEvent>,
    }

    #[async_trait]
    impl Adapter for Dummy {
        fn name(&self) -> &str {
            "dummy"
        }

        fn state_watch(&self) -> watch::Receiver<ConnectionState> {
            self.state.subscribe()
        }

        fn subscribe(&self) -> broadcast::Receiver<AdapterEvent> {
            self.events.subscribe()
        }

        async fn disconnect(&self) {
            self.state.send_replace(ConnectionState::Disconnected);
        }
    }

    #[tokio::test]
    async fn default_connection_state_reads_watch() {
        let (state, _) = watch::channel(ConnectionState::Connected);
        let (events, _) = broadcast::channel(4);
        let adapter: Box<dyn Adapter> = Box::new(Dummy { state, events });

        assert_eq!(adapter.connection_state(), ConnectionState::Connected);
        adapter.disconnect().await;
        assert_eq!(adapter.connection_state(), ConnectionState::Disconnected);
        assert_eq!(adapter.name(), "dummy");
    }
}
