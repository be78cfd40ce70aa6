//! In-memory connector for testing long-lived line and WebSocket sessions.
//!
//! Each call to [`Connector::connect`] creates a `tokio::io::duplex` pipe,
//! returns the client end to the adapter, and hands the server end to the
//! test through [`MockConnectorHandle::accept`]. Dropping the server end
//! looks like the radio closing the socket, which exercises reconnect
//! logic with no real network and, under paused time, no real waiting.
//!
//! # Example
//!
//! ```
//! use hamlink_test_harness::MockConnector;
//!
//! # async fn example() {
//! let (connector, mut handle) = MockConnector::new("mock-radio");
//! // Give `connector` to an adapter builder, then:
//! if let Some(mut radio) = handle.accept_lines().await {
//!     let first = radio.read_line().await;
//! }
//! # }
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use hamlink_core::error::{Error, Result};
use hamlink_core::transport::{ByteStream, Connector};
use tokio::io::{
    AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf,
};
use tokio::sync::mpsc;

const PIPE_CAPACITY: usize = 64 * 1024;

#[derive(Debug)]
struct Shared {
    label: String,
    attempts: AtomicU32,
    failures: AtomicU32,
}

/// A [`Connector`] that produces in-memory duplex streams.
#[derive(Debug, Clone)]
pub struct MockConnector {
    shared: Arc<Shared>,
    peers: mpsc::UnboundedSender<DuplexStream>,
}

/// The test's side of a [`MockConnector`].
#[derive(Debug)]
pub struct MockConnectorHandle {
    shared: Arc<Shared>,
    peers: mpsc::UnboundedReceiver<DuplexStream>,
}

impl MockConnector {
    /// Create a connector and its controlling handle. `label` is what
    /// [`Connector::describe`] returns.
    pub fn new(label: &str) -> (MockConnector, MockConnectorHandle) {
        let shared = Arc::new(Shared {
            label: label.to_string(),
            attempts: AtomicU32::new(0),
            failures: AtomicU32::new(0),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        (
            MockConnector {
                shared: Arc::clone(&shared),
                peers: tx,
            },
            MockConnectorHandle { shared, peers: rx },
        )
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn ByteStream>> {
        self.shared.attempts.fetch_add(1, Ordering::SeqCst);

        let refused = self
            .shared
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(Error::Transport(format!(
                "connection refused: {}",
                self.shared.label
            )));
        }

        let (client, server) = tokio::io::duplex(PIPE_CAPACITY);
        self.peers
            .send(server)
            .map_err(|_| Error::Transport("mock connector handle dropped".into()))?;
        Ok(Box::new(client))
    }

    fn describe(&self) -> String {
        self.shared.label.clone()
    }
}

impl MockConnectorHandle {
    /// Wait for the adapter's next connect attempt and return the server end.
    pub async fn accept(&mut self) -> Option<DuplexStream> {
        self.peers.recv().await
    }

    /// Like [`accept`](Self::accept), wrapped for line-oriented protocols.
    pub async fn accept_lines(&mut self) -> Option<LinePeer> {
        self.accept().await.map(LinePeer::new)
    }

    /// Refuse the next `n` connect attempts.
    pub fn fail_next(&self, n: u32) {
        self.shared.failures.store(n, Ordering::SeqCst);
    }

    /// Total connect attempts so far, refused ones included.
    pub fn attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }
}

/// Server end of a mock connection speaking `\n`-terminated lines.
#[derive(Debug)]
pub struct LinePeer {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl LinePeer {
    /// Wrap the server end of a duplex pipe.
    pub fn new(stream: DuplexStream) -> Self {
        let (rd, wr) = tokio::io::split(stream);
        LinePeer {
            reader: BufReader::new(rd),
            writer: wr,
        }
    }

    /// Read one line without its terminator. `None` once the client closed.
    pub async fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.reader.read_line(&mut line).await {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }

    /// Read one line, giving up after `timeout`.
    pub async fn read_line_within(&mut self, timeout: Duration) -> Option<String> {
        tokio::time::timeout(timeout, self.read_line()).await.ok().flatten()
    }

    /// Collect every line that arrives within `window`.
    pub async fn drain_lines(&mut self, window: Duration) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + window;
        let mut lines = Vec::new();
        while let Ok(Some(line)) = tokio::time::timeout_at(deadline, self.read_line()).await {
            lines.push(line);
        }
        lines
    }

    /// Send one line, appending `\n`.
    pub async fn send_line(&mut self, line: &str) -> std::io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }
}
