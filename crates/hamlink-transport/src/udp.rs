//! UDP transport for the WSJT-X protocol.
//!
//! WSJT-X is the datagram sender: it pushes HEARTBEAT, STATUS, and DECODE
//! messages at a well-known port and expects replies at whatever source
//! address its packets came from. [`UdpTransport`] is therefore a plain
//! bound socket with `send_to`/`recv_from`; it does not implement the
//! stream-oriented [`Transport`](hamlink_core::Transport) trait.

use hamlink_core::error::{Error, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

/// Largest datagram WSJT-X emits is well under this.
pub const MAX_DATAGRAM: usize = 8192;

/// A bound UDP socket.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind to a local `host:port`.
    pub async fn bind(addr: &str) -> Result<Self> {
        tracing::debug!(addr = %addr, "Binding UDP socket");

        let socket = UdpSocket::bind(addr).await.map_err(|e| {
            tracing::error!(addr = %addr, error = %e, "Failed to bind UDP socket");
            Error::Io(e)
        })?;
        let local_addr = socket.local_addr().map_err(Error::Io)?;

        tracing::debug!(local_addr = %local_addr, "UDP socket bound");
        Ok(Self { socket, local_addr })
    }

    /// Local address the socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send one datagram to `addr`.
    pub async fn send_to(&self, data: &[u8], addr: SocketAddr) -> Result<()> {
        tracing::trace!(
            local = %self.local_addr,
            remote = %addr,
            bytes = data.len(),
            "Sending datagram"
        );

        self.socket.send_to(data, addr).await.map_err(|e| {
            tracing::error!(
                local = %self.local_addr,
                remote = %addr,
                error = %e,
                "Failed to send datagram"
            );
            Error::Io(e)
        })?;
        Ok(())
    }

    /// Receive one datagram, waiting at most `timeout`.
    ///
    /// Returns [`Error::Timeout`] if nothing arrives in time.
    pub async fn recv_from(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<(usize, SocketAddr)> {
        match tokio::time::timeout(timeout, self.socket.recv_from(buf)).await {
            Ok(Ok((n, src))) => {
                tracing::trace!(local = %self.local_addr, remote = %src, bytes = n, "Received datagram");
                Ok((n, src))
            }
            Ok(Err(e)) => {
                tracing::error!(local = %self.local_addr, error = %e, "Failed to receive datagram");
                Err(Error::Io(e))
            }
            Err(_) => Err(Error::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_assigns_port() {
        let transport = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        assert_eq!(transport.local_addr().ip(), std::net::Ipv4Addr::LOCALHOST);
        assert_ne!(transport.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn reply_reaches_sender_address() {
        let wsjtx = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let logger = UdpTransport::bind("127.0.0.1:0").await.unwrap();

        wsjtx.send_to(b"heartbeat", logger.local_addr()).await.unwrap();
        let mut buf = [0u8; MAX_DATAGRAM];
        let (n, src) = logger
            .recv_from(&mut buf, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"heartbeat");
        assert_eq!(src, wsjtx.local_addr());

        logger.send_to(b"pong", src).await.unwrap();
        let (n, _) = wsjtx
            .recv_from(&mut buf, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"pong");
    }

    #[tokio::test]
    async fn recv_timeout() {
        let transport = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let mut buf = [0u8; 64];
        let result = transport.recv_from(&mut buf, Duration::from_millis(30)).await;
        assert!(matches!(result, Err(Error::Timeout)), "got: {result:?}");
    }
}
