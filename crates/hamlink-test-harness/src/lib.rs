//! hamlink-test-harness: mock transports, connectors, and servers for
//! testing hamlink adapters without radios or network services.
//!
//! - [`MockTransport`] scripts a request/response [`Transport`](hamlink_core::Transport)
//!   with optional unsolicited inbound data, for the WWFF respotter.
//! - [`MockConnector`] hands each SmartSDR/TCI connect attempt one end of an
//!   in-memory duplex pipe; the test drives the other end through
//!   [`MockConnectorHandle`] and [`LinePeer`].
//! - [`MockTcpServer`] is a scripted loopback TCP server.

pub mod mock_connector;
pub mod mock_tcp;
pub mod mock_transport;

pub use mock_connector::{LinePeer, MockConnector, MockConnectorHandle};
pub use mock_tcp::MockTcpServer;
pub use mock_transport::MockTransport;
