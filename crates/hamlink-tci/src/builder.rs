//! TciBuilder -- fluent builder for [`TciAdapter`].
//!
//! # Example
//!
//! ```no_run
//! use hamlink_tci::TciBuilder;
//!
//! # async fn example() -> hamlink_core::Result<()> {
//! let tci = TciBuilder::new().host("127.0.0.1").build()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use hamlink_core::error::{Error, Result};
use hamlink_core::transport::Connector;
use hamlink_transport::TcpConnector;

use crate::client::{TciAdapter, TciOptions};

/// Default TCI WebSocket port.
pub const DEFAULT_PORT: u16 = 50001;

const DEFAULT_HOST: &str = "localhost";

/// Default wait between reconnect attempts.
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// TCI panadapters are zoomed in far enough that a 50 Hz shift is visible.
const DEFAULT_MOVE_THRESHOLD_HZ: u64 = 50;

/// Fluent builder for [`TciAdapter`].
pub struct TciBuilder {
    host: String,
    port: u16,
    connect_timeout: Option<Duration>,
    connector: Option<Arc<dyn Connector>>,
    reconnect_delay: Duration,
    move_threshold_hz: u64,
}

impl TciBuilder {
    /// Create a new builder targeting `ws://localhost:50001/`.
    pub fn new() -> Self {
        TciBuilder {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: None,
            connector: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            move_threshold_hz: DEFAULT_MOVE_THRESHOLD_HZ,
        }
    }

    /// Set the TCI server host (default: `localhost`).
    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    /// Set the TCI server port (default: 50001).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Limit each TCP connect attempt.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Use a custom stream factory instead of TCP to `host:port`.
    ///
    /// The WebSocket handshake still names `host:port`.
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Fixed delay between reconnect attempts (default: 5 s).
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Frequency change that counts as a spot move (default: 50 Hz).
    pub fn move_threshold_hz(mut self, hz: u64) -> Self {
        self.move_threshold_hz = hz;
        self
    }

    /// The URL used in the WebSocket handshake.
    pub fn url(&self) -> String {
        format!("ws://{}:{}/", self.host, self.port)
    }

    /// Start the adapter. Connecting happens in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<TciAdapter> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidParameter("TCI host must not be empty".into()));
        }
        let url = self.url();
        let connector: Arc<dyn Connector> = match self.connector {
            Some(c) => c,
            None => {
                let mut tcp = TcpConnector::new(format!("{}:{}", self.host, self.port));
                if let Some(timeout) = self.connect_timeout {
                    tcp = tcp.with_timeout(timeout);
                }
                Arc::new(tcp)
            }
        };
        Ok(TciAdapter::start(
            connector,
            TciOptions {
                url,
                reconnect_delay: self.reconnect_delay,
                move_threshold_hz: self.move_threshold_hz,
            },
        ))
    }
}

impl Default for TciBuilder {
    fn default() -> Self {
        Self::new()
    }
}
