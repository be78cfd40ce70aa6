//! Transport and connector traits.
//!
//! Two shapes of byte channel are used by the adapters:
//!
//! - [`Transport`] is a request/response channel with explicit receive
//!   timeouts. The WWFF respotter drives its telnet session through it,
//!   so it can be tested against `MockTransport` from
//!   `hamlink-test-harness`. WSJT-X does not use it: its datagram socket
//!   is a plain `UdpTransport` with `send_to`/`recv_from`.
//! - [`Connector`] produces a fresh [`ByteStream`] for each (re)connect
//!   attempt of a long-lived session. SmartSDR and TCI own a read task and
//!   a write task over that stream, and reconnect by asking the connector
//!   again. Tests substitute in-memory duplex streams.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// Asynchronous byte-level transport.
///
/// Implementations handle buffering and error mapping at the socket layer.
/// Protocol concerns (datagram layout, prompts) are handled by the code
/// that consumes this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes.
    ///
    /// Implementations should block until all bytes have been handed to
    /// the underlying socket.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes into the provided buffer.
    ///
    /// Returns the number of bytes actually read. Will wait up to `timeout`
    /// for data to arrive; returns [`Error::Timeout`](crate::error::Error::Timeout)
    /// if nothing arrives within the deadline and
    /// [`Error::ConnectionLost`](crate::error::Error::ConnectionLost) if the
    /// peer closed the connection.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}

/// A bidirectional async byte stream usable by a long-lived session.
pub trait ByteStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> ByteStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Factory for the byte stream of a long-lived session.
///
/// Called once per connect attempt. Errors are reported as transport
/// errors and trigger the adapter's reconnect schedule.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new stream to the remote end.
    async fn connect(&self) -> Result<Box<dyn ByteStream>>;

    /// Human-readable description of the remote end, used in logs and
    /// `Connected` events.
    fn describe(&self) -> String;
}
