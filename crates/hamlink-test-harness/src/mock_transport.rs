//! Mock transport for deterministic testing of scripted sessions.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/response pairs plus a queue of unsolicited inbound data (a
//! login banner, a prompt). When there is nothing to read, `receive()`
//! sleeps for the caller's timeout before reporting
//! [`Error::Timeout`], so deadline logic behaves under
//! `#[tokio::test(start_paused = true)]` exactly as it does on a socket.
//!
//! # Example
//!
//! ```
//! use hamlink_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! mock.push_incoming(b"login: ");
//! mock.expect(b"N0CALL\r\n", b"N0CALL de WWFF >");
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;

use hamlink_core::error::{Error, Result};
use hamlink_core::transport::Transport;

/// A pre-loaded request/response pair for the mock transport.
#[derive(Debug, Clone)]
struct Expectation {
    request: Vec<u8>,
    response: Vec<u8>,
}

/// A scripted [`Transport`].
///
/// Expectations are consumed in order. Each `send()` is recorded and must
/// match the next expectation; its response is appended to the inbound
/// queue. A send with no matching expectation is a
/// [`Error::Protocol`] error.
#[derive(Debug)]
pub struct MockTransport {
    expectations: VecDeque<Expectation>,
    /// Bytes waiting to be returned by `receive()`.
    inbound: VecDeque<u8>,
    connected: bool,
    /// Report the peer as gone once every scripted byte has been read.
    eof_when_drained: bool,
    sent_log: Vec<Vec<u8>>,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            expectations: VecDeque::new(),
            inbound: VecDeque::new(),
            connected: true,
            eof_when_drained: false,
            sent_log: Vec::new(),
        }
    }

    /// Add an expected request/response pair.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Queue bytes the remote end sends without being asked.
    pub fn push_incoming(&mut self, data: &[u8]) {
        self.inbound.extend(data.iter().copied());
    }

    /// When `true`, `receive()` returns [`Error::ConnectionLost`] once the
    /// inbound queue is empty and no expectation is outstanding.
    pub fn set_eof_when_drained(&mut self, eof: bool) {
        self.eof_when_drained = eof;
    }

    /// Every `send()` payload, in order.
    pub fn sent_data(&self) -> &[Vec<u8>] {
        &self.sent_log
    }

    /// Every `send()` payload decoded as text, in order.
    pub fn sent_text(&self) -> Vec<String> {
        self.sent_log
            .iter()
            .map(|d| String::from_utf8_lossy(d).into_owned())
            .collect()
    }

    /// Number of expectations not yet consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.expectations.len()
    }

    /// Force the connected flag.
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        self.sent_log.push(data.to_vec());

        let expectation = self.expectations.pop_front().ok_or_else(|| {
            Error::Protocol(format!(
                "no more expectations in mock transport, got {:?}",
                String::from_utf8_lossy(data)
            ))
        })?;
        if data != expectation.request.as_slice() {
            return Err(Error::Protocol(format!(
                "unexpected send data: expected {:?}, got {:?}",
                String::from_utf8_lossy(&expectation.request),
                String::from_utf8_lossy(data)
            )));
        }
        self.inbound.extend(expectation.response);
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        if !self.inbound.is_empty() {
            let n = self.inbound.len().min(buf.len());
            for (slot, byte) in buf.iter_mut().zip(self.inbound.drain(..n)) {
                *slot = byte;
            }
            return Ok(n);
        }

        if self.eof_when_drained && self.expectations.is_empty() {
            return Err(Error::ConnectionLost);
        }

        tokio::time::sleep(timeout).await;
        Err(Error::Timeout)
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.inbound.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_exchange() {
        let mut mock = MockTransport::new();
        mock.push_incoming(b"login: ");
        mock.expect(b"N0CALL\r\n", b"Hello N0CALL\r\n>");

        let mut buf = [0u8; 64];
        let n = mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap();
        assert_eq!(&buf[..n], b"login: ");

        mock.send(b"N0CALL\r\n").await.unwrap();
        let n = mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap();
        assert_eq!(&buf[..n], b"Hello N0CALL\r\n>");
        assert_eq!(mock.sent_text(), vec!["N0CALL\r\n"]);
        assert_eq!(mock.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn partial_reads_drain_in_order() {
        let mut mock = MockTransport::new();
        mock.push_incoming(b"abcd");
        let mut buf = [0u8; 3];
        let n = mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap();
        assert_eq!(&buf[..n], b"abc");
        let n = mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap();
        assert_eq!(&buf[..n], b"d");
    }

    #[tokio::test]
    async fn mismatch_and_exhaustion_are_protocol_errors() {
        let mut mock = MockTransport::new();
        mock.expect(b"a", b"");
        assert!(matches!(mock.send(b"b").await, Err(Error::Protocol(_))));
        assert!(matches!(mock.send(b"c").await, Err(Error::Protocol(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_receive_waits_for_timeout() {
        let mut mock = MockTransport::new();
        let start = tokio::time::Instant::now();
        let mut buf = [0u8; 8];
        let result = mock.receive(&mut buf, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn eof_when_drained_reports_connection_lost() {
        let mut mock = MockTransport::new();
        mock.push_incoming(b"bye");
        mock.set_eof_when_drained(true);
        let mut buf = [0u8; 8];
        mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap();
        let result = mock.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(Error::ConnectionLost)));
    }

    #[tokio::test]
    async fn closed_mock_rejects_io() {
        let mut mock = MockTransport::new();
        mock.close().await.unwrap();
        assert!(!mock.is_connected());
        assert!(matches!(mock.send(b"x").await, Err(Error::NotConnected)));
        let mut buf = [0u8; 8];
        let result = mock.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }
}
