//! Mock TCP server for loopback protocol tests.
//!
//! [`MockTcpServer`] listens on a random localhost port, optionally sends
//! a greeting as soon as a client connects (a cluster login banner), then
//! works through scripted request/response pairs. After the script it
//! either holds the connection until the client hangs up or closes it
//! immediately, mimicking servers that drop the line right after
//! accepting a command.
//!
//! # Example
//!
//! ```
//! use hamlink_test_harness::MockTcpServer;
//!
//! # async fn example() -> hamlink_core::Result<()> {
//! let mut server = MockTcpServer::new().await?;
//! server.greeting(b"login: ");
//! server.expect(b"N0CALL\r\n", b"N0CALL de WWFF >");
//! server.start();
//! let addr = server.addr().to_string();
//! // ... connect a TcpTransport to `addr` ...
//! # Ok(())
//! # }
//! ```

use hamlink_core::error::{Error, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
struct TcpExpectation {
    request: Vec<u8>,
    response: Vec<u8>,
}

/// A scripted single-connection TCP server.
pub struct MockTcpServer {
    addr: String,
    listener: Option<TcpListener>,
    greeting: Vec<u8>,
    expectations: Vec<TcpExpectation>,
    hold_open: bool,
    server_handle: Option<JoinHandle<std::result::Result<Vec<u8>, String>>>,
}

impl MockTcpServer {
    /// Bind a listener on `127.0.0.1:0`.
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock TCP server: {e}")))?;
        let addr = listener.local_addr().map_err(Error::Io)?.to_string();
        Ok(Self {
            addr,
            listener: Some(listener),
            greeting: Vec::new(),
            expectations: Vec::new(),
            hold_open: true,
            server_handle: None,
        })
    }

    /// Bytes to send as soon as the client connects.
    pub fn greeting(&mut self, data: &[u8]) {
        self.greeting = data.to_vec();
    }

    /// Add an expected request/response pair. Requests are matched by exact
    /// byte count and content.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expectations.push(TcpExpectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Close the connection right after the last scripted response
    /// instead of waiting for the client to hang up.
    pub fn close_after_script(&mut self) {
        self.hold_open = false;
    }

    /// The `host:port` the server listens on.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Start accepting one client in a background task.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let greeting = std::mem::take(&mut self.greeting);
        let expectations = std::mem::take(&mut self.expectations);
        let hold_open = self.hold_open;

        self.server_handle = Some(tokio::spawn(async move {
            let (mut stream, _) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {e}"))?;

            if !greeting.is_empty() {
                write_all(&mut stream, &greeting, "greeting").await?;
            }

            for (i, expectation) in expectations.iter().enumerate() {
                let mut buf = vec![0u8; expectation.request.len()];
                stream
                    .read_exact(&mut buf)
                    .await
                    .map_err(|e| format!("expectation {i}: read error: {e}"))?;
                if buf != expectation.request {
                    return Err(format!(
                        "expectation {i}: request mismatch: expected {:?}, got {:?}",
                        String::from_utf8_lossy(&expectation.request),
                        String::from_utf8_lossy(&buf)
                    ));
                }
                write_all(&mut stream, &expectation.response, &format!("expectation {i}"))
                    .await?;
            }

            let mut trailing = Vec::new();
            if hold_open {
                let _ = stream.read_to_end(&mut trailing).await;
            }
            Ok(trailing)
        }));
    }

    /// Wait for the script to finish. Returns any bytes the client sent
    /// after the last expectation, or the first mismatch.
    pub async fn wait(self) -> std::result::Result<Vec<u8>, String> {
        match self.server_handle {
            Some(handle) => handle
                .await
                .map_err(|e| format!("server task panicked: {e}"))?,
            None => Ok(Vec::new()),
        }
    }
}

async fn write_all(
    stream: &mut TcpStream,
    data: &[u8],
    what: &str,
) -> std::result::Result<(), String> {
    stream
        .write_all(data)
        .await
        .map_err(|e| format!("{what}: write error: {e}"))?;
    stream
        .flush()
        .await
        .map_err(|e| format!("{what}: flush error: {e}"))
}
