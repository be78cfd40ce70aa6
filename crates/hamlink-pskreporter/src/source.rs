//! Where reception reports come from.
//!
//! The poll loop only needs "fetch once, give me a status code and a body".
//! [`ReportSource`] is that seam; [`HttpReportSource`] is the production
//! implementation over `reqwest`.

use std::time::Duration;

use async_trait::async_trait;

use hamlink_core::error::{Error, Result};

/// Default retrieve endpoint.
pub const DEFAULT_BASE_URL: &str = "https://retrieve.pskreporter.info/query";

/// One HTTP answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

/// A single-request report fetcher.
#[async_trait]
pub trait ReportSource: Send + Sync + 'static {
    /// Perform one request. Transport failures are `Err`; any HTTP answer,
    /// including error statuses, is `Ok`.
    async fn fetch(&self) -> Result<FetchResponse>;

    /// Human-readable description of the remote end.
    fn describe(&self) -> String;
}

/// Query parameters for the retrieve endpoint.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub base_url: String,
    pub mode: String,
    /// Negative: seconds back from now.
    pub flow_start_seconds: i64,
    pub report_limit: u32,
    pub app_contact: String,
    pub request_timeout: Duration,
}

/// [`ReportSource`] over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpReportSource {
    client: reqwest::Client,
    query: QueryOptions,
}

impl HttpReportSource {
    /// Build an HTTP source.
    pub fn new(query: QueryOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(query.request_timeout)
            .user_agent(concat!("hamlink/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(HttpReportSource { client, query })
    }

    fn params(&self) -> [(&'static str, String); 5] {
        [
            ("mode", self.query.mode.clone()),
            ("flowStartSeconds", self.query.flow_start_seconds.to_string()),
            ("rronly", "1".to_string()),
            ("rptlimit", self.query.report_limit.to_string()),
            ("appcontact", self.query.app_contact.clone()),
        ]
    }
}

#[async_trait]
impl ReportSource for HttpReportSource {
    async fn fetch(&self) -> Result<FetchResponse> {
        let response = self
            .client
            .get(&self.query.base_url)
            .query(&self.params())
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("reading body: {e}")))?;
        Ok(FetchResponse { status, body })
    }

    fn describe(&self) -> String {
        self.query.base_url.clone()
    }
}
