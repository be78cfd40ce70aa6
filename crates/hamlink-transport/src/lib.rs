//! Socket transports for hamlink.
//!
//! - [`TcpTransport`]: a connected TCP socket implementing
//!   [`Transport`](hamlink_core::Transport), used by the WWFF respotter's
//!   telnet session.
//! - [`TcpConnector`]: a [`Connector`](hamlink_core::Connector) that opens
//!   a fresh TCP stream for each SmartSDR or TCI (re)connect attempt.
//! - [`UdpTransport`]: a bound datagram socket for the WSJT-X UDP protocol.
//!
//! # Example
//!
//! ```no_run
//! use hamlink_transport::TcpTransport;
//! use hamlink_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> hamlink_core::Result<()> {
//! let mut transport = TcpTransport::connect("spots.wwff.co:7300").await?;
//!
//! let mut buf = [0u8; 1024];
//! let n = transport.receive(&mut buf, Duration::from_secs(5)).await?;
//! println!("{}", String::from_utf8_lossy(&buf[..n]));
//! # Ok(())
//! # }
//! ```

pub mod tcp;
pub mod udp;

pub use tcp::{TcpConnector, TcpTransport};
pub use udp::UdpTransport;
