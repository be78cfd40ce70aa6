//! SmartSdrBuilder -- fluent builder for [`SmartSdrAdapter`].
//!
//! # Example
//!
//! ```no_run
//! use hamlink_flex::SmartSdrBuilder;
//!
//! # async fn example() -> hamlink_core::Result<()> {
//! let sdr = SmartSdrBuilder::new()
//!     .host("192.168.1.100")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use hamlink_core::error::{Error, Result};
use hamlink_core::transport::Connector;
use hamlink_transport::TcpConnector;

use crate::client::{ClientOptions, SmartSdrAdapter};
use crate::codec::SpotDefaults;

/// Default SmartSDR TCP command port.
pub const DEFAULT_TCP_PORT: u16 = 4992;

/// Default wait between reconnect attempts.
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default key inactivity before PTT is released.
const DEFAULT_PTT_HOLDOFF: Duration = Duration::from_millis(1500);

/// Spots that move by more than half a kilohertz get a fresh marker.
const DEFAULT_MOVE_THRESHOLD_HZ: u64 = 500;

const DEFAULT_SPOT_SOURCE: &str = "POTACAT";
const DEFAULT_TRIGGER_ACTION: &str = "tune";
const DEFAULT_SPOT_LIFETIME_SECONDS: u32 = 600;

/// Fluent builder for [`SmartSdrAdapter`].
///
/// Either [`host`](Self::host) or [`connector`](Self::connector) must be
/// set; everything else has a default.
pub struct SmartSdrBuilder {
    host: Option<String>,
    tcp_port: u16,
    connect_timeout: Option<Duration>,
    connector: Option<Arc<dyn Connector>>,
    reconnect_delay: Duration,
    ptt_holdoff: Duration,
    move_threshold_hz: u64,
    spot_source: String,
    trigger_action: String,
    spot_lifetime_seconds: u32,
}

impl SmartSdrBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        SmartSdrBuilder {
            host: None,
            tcp_port: DEFAULT_TCP_PORT,
            connect_timeout: None,
            connector: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            ptt_holdoff: DEFAULT_PTT_HOLDOFF,
            move_threshold_hz: DEFAULT_MOVE_THRESHOLD_HZ,
            spot_source: DEFAULT_SPOT_SOURCE.to_string(),
            trigger_action: DEFAULT_TRIGGER_ACTION.to_string(),
            spot_lifetime_seconds: DEFAULT_SPOT_LIFETIME_SECONDS,
        }
    }

    /// Set the radio's IP address or hostname.
    pub fn host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    /// Set the SmartSDR TCP command port (default: 4992).
    pub fn tcp_port(mut self, port: u16) -> Self {
        self.tcp_port = port;
        self
    }

    /// Limit each TCP connect attempt (default: 5 s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Use a custom stream factory instead of TCP to `host:tcp_port`.
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Fixed delay between reconnect attempts (default: 5 s).
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Key inactivity before PTT auto-release (default: 1500 ms).
    pub fn ptt_holdoff(mut self, holdoff: Duration) -> Self {
        self.ptt_holdoff = holdoff;
        self
    }

    /// Frequency change that counts as a spot move (default: 500 Hz).
    pub fn move_threshold_hz(mut self, hz: u64) -> Self {
        self.move_threshold_hz = hz;
        self
    }

    /// `source=` tag on pushed markers (default: `POTACAT`).
    pub fn spot_source(mut self, source: &str) -> Self {
        self.spot_source = source.to_string();
        self
    }

    /// Marker click action (default: `tune`).
    pub fn trigger_action(mut self, action: &str) -> Self {
        self.trigger_action = action.to_string();
        self
    }

    /// Radio-side marker lifetime in seconds (default: 600).
    pub fn spot_lifetime_seconds(mut self, seconds: u32) -> Self {
        self.spot_lifetime_seconds = seconds;
        self
    }

    /// Start the adapter. Connecting happens in the background; watch
    /// [`Adapter::state_watch`](hamlink_core::Adapter::state_watch) or the
    /// event stream to learn when the radio is reachable.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<SmartSdrAdapter> {
        let connector: Arc<dyn Connector> = match (self.connector, self.host) {
            (Some(c), _) => c,
            (None, Some(host)) => {
                let mut tcp = TcpConnector::new(format!("{host}:{}", self.tcp_port));
                if let Some(timeout) = self.connect_timeout {
                    tcp = tcp.with_timeout(timeout);
                }
                Arc::new(tcp)
            }
            (None, None) => {
                return Err(Error::InvalidParameter(
                    "SmartSDR host or connector is required".into(),
                ));
            }
        };

        if self.spot_source.contains(char::is_whitespace) {
            return Err(Error::InvalidParameter(format!(
                "spot source must be a single token: {:?}",
                self.spot_source
            )));
        }

        Ok(SmartSdrAdapter::start(
            connector,
            ClientOptions {
                reconnect_delay: self.reconnect_delay,
                ptt_holdoff: self.ptt_holdoff,
                move_threshold_hz: self.move_threshold_hz,
                spot: SpotDefaults {
                    source: self.spot_source,
                    trigger_action: self.trigger_action,
                    lifetime_seconds: self.spot_lifetime_seconds,
                },
            },
        ))
    }
}

impl Default for SmartSdrBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_requires_host_or_connector() {
        let err = SmartSdrBuilder::new().build().err().unwrap();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn build_rejects_spaced_source() {
        let err = SmartSdrBuilder::new()
            .host("127.0.0.1")
            .spot_source("MY APP")
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }
}
