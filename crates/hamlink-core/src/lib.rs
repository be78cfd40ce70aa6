//! hamlink-core: Core traits, types, and error definitions for hamlink.
//!
//! This crate defines the protocol-agnostic pieces every hamlink adapter
//! shares. A logging application depends on these types to feed spots into
//! SDR adapters and to consume decode/QSO/status events without pulling in
//! any specific wire protocol.
//!
//! # Key types
//!
//! - [`Adapter`] -- the common surface of every long-lived network adapter
//! - [`AdapterEvent`] -- asynchronous status, decode, and error notifications
//! - [`Spot`] / [`SpotLifecycleTracker`] -- marker bookkeeping for SDR panadapters
//! - [`Transport`] / [`Connector`] -- byte-level channels and stream factories
//! - [`ScheduledTask`] -- cancel-on-drop timer used for backoff and holdoff
//! - [`Error`] / [`Result`] -- error handling

pub mod adapter;
pub mod error;
pub mod events;
pub mod helpers;
pub mod spots;
pub mod timer;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic `use hamlink_core::*`.
pub use adapter::Adapter;
pub use error::{Error, Result};
pub use events::{AdapterEvent, DisconnectReason};
pub use helpers::{format_freq_mhz, hz_to_khz, hz_to_mhz, khz_to_hz, mhz_to_hz};
pub use spots::{SpotLifecycleTracker, SpotWire};
pub use timer::ScheduledTask;
pub use transport::{ByteStream, Connector, Transport};
pub use types::*;
