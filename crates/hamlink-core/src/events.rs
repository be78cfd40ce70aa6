//! Asynchronous adapter event types.
//!
//! Events are emitted by every adapter through a [`tokio::sync::broadcast`]
//! channel. The host application subscribes to drive its UI and logbook;
//! adapters never talk to each other through these events.

use std::time::Duration;

use crate::types::{Decode, DigitalStatus, QsoLogged, ReceptionReport};

/// Why an adapter left the connected state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The remote end closed the connection (or sent a CLOSE message).
    Closed,
    /// No traffic arrived within the liveness window.
    Timeout,
    /// The host called `disconnect()`.
    Requested,
    /// A transport error tore the connection down.
    Error,
}

/// An event emitted by an adapter.
///
/// Delivered on a best-effort basis through a bounded broadcast channel;
/// slow consumers may miss events under heavy decode load.
#[derive(Debug, Clone)]
pub enum AdapterEvent {
    /// A peer or radio became reachable.
    Connected {
        /// Peer identity: WSJT-X instance id, radio address, or feed host.
        peer: String,
        /// Extra detail such as the peer's software version.
        detail: Option<String>,
    },

    /// The adapter left the connected state.
    Disconnected {
        /// What caused the transition.
        reason: DisconnectReason,
    },

    /// A reconnect attempt has been scheduled.
    Reconnecting {
        /// The reconnection attempt number (1-based).
        attempt: u32,
        /// Delay before the attempt starts.
        delay: Duration,
    },

    /// A digital-mode decode was received.
    Decode(Decode),

    /// A digital-mode application reported its status.
    Status(Box<DigitalStatus>),

    /// The digital-mode application cleared one or both decode windows.
    Cleared {
        /// Window selector when present (0 = band activity, 1 = rx, 2 = both).
        window: Option<u8>,
    },

    /// A QSO was logged by the digital-mode application.
    QsoLogged(Box<QsoLogged>),

    /// The digital-mode application logged a QSO as an ADIF record.
    LoggedAdif(String),

    /// A batch of reception reports arrived from a spotting feed.
    Reports(Vec<ReceptionReport>),

    /// The remote end answered a command with a non-zero status.
    CommandRejected {
        /// Sequence number of the rejected command.
        sequence: u32,
        /// Status code reported by the remote end.
        code: u32,
        /// Message text accompanying the status.
        message: String,
    },

    /// A recoverable error (malformed frame, transport failure, HTTP error).
    Error(String),
}
