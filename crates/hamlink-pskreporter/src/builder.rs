//! PskReporterBuilder -- fluent builder for [`PskReporterAdapter`].
//!
//! # Example
//!
//! ```no_run
//! use hamlink_pskreporter::PskReporterBuilder;
//!
//! # async fn example() -> hamlink_core::Result<()> {
//! let psk = PskReporterBuilder::new()
//!     .app_contact("n0call@example.com")
//!     .build()?;
//! psk.poll_now();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use hamlink_core::error::{Error, Result};

use crate::client::{PollOptions, PskReporterAdapter};
use crate::source::{DEFAULT_BASE_URL, HttpReportSource, QueryOptions, ReportSource};

/// Default wait after a successful poll.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);

/// Default wait after a `503` or failure.
pub const DEFAULT_BACKOFF_INTERVAL: Duration = Duration::from_secs(900);

const DEFAULT_MODE: &str = "FREEDV";
const DEFAULT_FLOW_START_SECONDS: i64 = -900;
const DEFAULT_REPORT_LIMIT: u32 = 100;
const DEFAULT_APP_CONTACT: &str = "hamlink";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fluent builder for [`PskReporterAdapter`].
pub struct PskReporterBuilder {
    base_url: String,
    mode: String,
    flow_start_seconds: i64,
    report_limit: u32,
    app_contact: String,
    request_timeout: Duration,
    poll_interval: Duration,
    backoff_interval: Duration,
    source: Option<Arc<dyn ReportSource>>,
}

impl PskReporterBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        PskReporterBuilder {
            base_url: DEFAULT_BASE_URL.to_string(),
            mode: DEFAULT_MODE.to_string(),
            flow_start_seconds: DEFAULT_FLOW_START_SECONDS,
            report_limit: DEFAULT_REPORT_LIMIT,
            app_contact: DEFAULT_APP_CONTACT.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            backoff_interval: DEFAULT_BACKOFF_INTERVAL,
            source: None,
        }
    }

    /// Override the retrieve endpoint.
    pub fn base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    /// Mode filter (default: `FREEDV`).
    pub fn mode(mut self, mode: &str) -> Self {
        self.mode = mode.to_string();
        self
    }

    /// How far back to ask for reports, in seconds (default: 900).
    pub fn lookback(mut self, lookback: Duration) -> Self {
        self.flow_start_seconds = -(lookback.as_secs() as i64);
        self
    }

    /// Maximum reports per answer (default: 100).
    pub fn report_limit(mut self, limit: u32) -> Self {
        self.report_limit = limit;
        self
    }

    /// Contact string the service asks API users to send.
    pub fn app_contact(mut self, contact: &str) -> Self {
        self.app_contact = contact.to_string();
        self
    }

    /// Per-request HTTP timeout (default: 30 s).
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Wait after a successful poll (default: 300 s).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Wait after a rate-limited or failed poll (default: 900 s).
    pub fn backoff_interval(mut self, interval: Duration) -> Self {
        self.backoff_interval = interval;
        self
    }

    /// Use a custom report source instead of HTTP.
    pub fn source(mut self, source: impl ReportSource) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Start polling.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<PskReporterAdapter> {
        if self.poll_interval.is_zero() || self.backoff_interval.is_zero() {
            return Err(Error::InvalidParameter(
                "poll and backoff intervals must be non-zero".into(),
            ));
        }
        let source: Arc<dyn ReportSource> = match self.source {
            Some(s) => s,
            None => {
                if self.app_contact.trim().is_empty() {
                    return Err(Error::InvalidParameter("app contact must not be empty".into()));
                }
                Arc::new(HttpReportSource::new(QueryOptions {
                    base_url: self.base_url,
                    mode: self.mode,
                    flow_start_seconds: self.flow_start_seconds,
                    report_limit: self.report_limit,
                    app_contact: self.app_contact,
                    request_timeout: self.request_timeout,
                })?)
            }
        };
        Ok(PskReporterAdapter::start(
            source,
            PollOptions {
                poll_interval: self.poll_interval,
                backoff_interval: self.backoff_interval,
            },
        ))
    }
}

impl Default for PskReporterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults() {
        let psk = PskReporterBuilder::new().build().unwrap();
        let options = psk.options();
        assert_eq!(options.poll_interval, Duration::from_secs(300));
        assert_eq!(options.backoff_interval, Duration::from_secs(900));
        hamlink_core::Adapter::disconnect(&psk).await;
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = PskReporterBuilder::new()
            .poll_interval(Duration::ZERO)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[test]
    fn lookback_is_negative_seconds() {
        let b = PskReporterBuilder::new().lookback(Duration::from_secs(600));
        assert_eq!(b.flow_start_seconds, -600);
    }
}
