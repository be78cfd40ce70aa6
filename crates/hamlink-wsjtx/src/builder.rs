//! WsjtxBuilder -- fluent builder for [`WsjtxAdapter`].
//!
//! # Example
//!
//! ```no_run
//! use hamlink_wsjtx::WsjtxBuilder;
//!
//! # async fn example() -> hamlink_core::Result<()> {
//! let wsjtx = WsjtxBuilder::new().port(2237).build().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use hamlink_core::error::Result;

use crate::adapter::{AdapterOptions, WsjtxAdapter};
use crate::session::DEFAULT_HEARTBEAT_TIMEOUT;

/// Default WSJT-X UDP server port.
pub const DEFAULT_PORT: u16 = 2237;

/// Default local interface.
const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

/// Delay before re-binding after a socket error.
const DEFAULT_REBIND_DELAY: Duration = Duration::from_secs(5);

/// Fluent builder for [`WsjtxAdapter`].
#[derive(Debug, Clone)]
pub struct WsjtxBuilder {
    bind_address: String,
    port: u16,
    heartbeat_timeout: Duration,
    rebind_delay: Duration,
}

impl WsjtxBuilder {
    pub fn new() -> Self {
        WsjtxBuilder {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            rebind_delay: DEFAULT_REBIND_DELAY,
        }
    }

    /// Local interface to bind (default: all interfaces).
    pub fn bind_address(mut self, addr: &str) -> Self {
        self.bind_address = addr.to_string();
        self
    }

    /// UDP port to listen on (default: 2237).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Peer silence before falling back to listening (default: 30 s).
    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Wait between socket failure and re-bind (default: 5 s).
    pub fn rebind_delay(mut self, delay: Duration) -> Self {
        self.rebind_delay = delay;
        self
    }

    /// Bind the socket and start the adapter.
    pub async fn build(self) -> Result<WsjtxAdapter> {
        WsjtxAdapter::start(AdapterOptions {
            bind_addr: format!("{}:{}", self.bind_address, self.port),
            heartbeat_timeout: self.heartbeat_timeout,
            rebind_delay: self.rebind_delay,
        })
        .await
    }
}

impl Default for WsjtxBuilder {
    fn default() -> Self {
        Self::new()
    }
}
