//! WSJT-X UDP adapter.
//!
//! [`WsjtxAdapter`] binds the WSJT-X UDP port and runs one background task
//! that receives datagrams, feeds them to the [`WsjtxSession`], and
//! performs the resulting sends and events. Outbound commands lock the
//! same session and send while holding the lock, so commands reach the
//! peer in call order.
//!
//! If the socket fails the adapter drops the peer, waits, and re-binds the
//! same local address, then waits for WSJT-X to announce itself again.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use hamlink_core::error::{Error, Result};
use hamlink_core::{Adapter, AdapterEvent, ConnectionState, Decode, DisconnectReason};
use hamlink_transport::UdpTransport;
use hamlink_transport::udp::MAX_DATAGRAM;

use crate::codec::Rgba;
use crate::session::{Action, Datagram, Peer, WsjtxSession};

/// Broadcast channel capacity for event subscribers.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Longest the receive loop waits before re-checking the heartbeat deadline.
const IDLE_POLL: Duration = Duration::from_secs(1);

pub(crate) struct AdapterOptions {
    pub bind_addr: String,
    pub heartbeat_timeout: Duration,
    pub rebind_delay: Duration,
}

struct Shared {
    session: Mutex<WsjtxSession>,
    socket: Mutex<Option<Arc<UdpTransport>>>,
    events: broadcast::Sender<AdapterEvent>,
    state: watch::Sender<ConnectionState>,
    /// Set by `disconnect()`; nothing is sent or emitted afterwards.
    closed: AtomicBool,
}

impl Shared {
    fn emit(&self, event: AdapterEvent) {
        if !self.closed.load(Ordering::SeqCst) {
            let _ = self.events.send(event);
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    async fn send(&self, datagrams: impl IntoIterator<Item = Datagram>) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let Some(socket) = self.socket.lock().await.clone() else {
            return;
        };
        for datagram in datagrams {
            if let Err(e) = socket.send_to(&datagram.bytes, datagram.to).await {
                self.emit(AdapterEvent::Error(format!(
                    "WSJT-X send to {} failed: {e}",
                    datagram.to
                )));
            }
        }
    }

    /// Perform session actions. The caller holds the session lock.
    async fn apply(&self, session: &WsjtxSession, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Send(datagram) => self.send([datagram]).await,
                Action::Emit(event) => self.emit(event),
            }
        }
        if !self.closed.load(Ordering::SeqCst) {
            self.set_state(session.state());
        }
    }
}

/// A long-lived WSJT-X UDP listener.
pub struct WsjtxAdapter {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    local_addr: SocketAddr,
}

impl WsjtxAdapter {
    pub(crate) async fn start(options: AdapterOptions) -> Result<Self> {
        let socket = Arc::new(UdpTransport::bind(&options.bind_addr).await?);
        let local_addr = socket.local_addr();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state, _) = watch::channel(ConnectionState::Listening);

        let shared = Arc::new(Shared {
            session: Mutex::new(WsjtxSession::new(options.heartbeat_timeout)),
            socket: Mutex::new(Some(Arc::clone(&socket))),
            events,
            state,
            closed: AtomicBool::new(false),
        });
        let cancel = CancellationToken::new();

        tracing::info!(local = %local_addr, "WSJT-X adapter listening");

        let task = tokio::spawn(run(
            Arc::clone(&shared),
            socket,
            options.bind_addr,
            options.rebind_delay,
            cancel.clone(),
        ));

        Ok(WsjtxAdapter {
            shared,
            cancel,
            task: Mutex::new(Some(task)),
            local_addr,
        })
    }

    /// Local address of the first bound socket.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The WSJT-X instance currently connected, if any.
    pub async fn peer(&self) -> Option<Peer> {
        self.shared.session.lock().await.peer().cloned()
    }

    /// Callsigns currently highlighted at the peer.
    pub async fn highlighted(&self) -> Vec<String> {
        let session = self.shared.session.lock().await;
        session.highlighted().map(str::to_string).collect()
    }

    /// Answer `decode` as if the operator double-clicked it.
    pub async fn reply(&self, decode: &Decode, modifiers: u8) {
        let session = self.shared.session.lock().await;
        self.shared.send(session.reply(decode, modifiers)).await;
    }

    /// Stop transmitting.
    pub async fn halt_tx(&self, auto_tx_only: bool) {
        let session = self.shared.session.lock().await;
        self.shared.send(session.halt_tx(auto_tx_only)).await;
    }

    /// Put `text` in the free-text message box.
    pub async fn free_text(&self, text: &str, send: bool) {
        let session = self.shared.session.lock().await;
        self.shared.send(session.free_text(text, send)).await;
    }

    /// Ask WSJT-X to resend its band-activity decodes.
    pub async fn replay(&self) {
        let session = self.shared.session.lock().await;
        self.shared.send(session.replay()).await;
    }

    /// Highlight `callsign` in the band-activity window. Passing `None`
    /// for both colours removes the highlight.
    pub async fn highlight_callsign(
        &self,
        callsign: &str,
        background: Option<Rgba>,
        foreground: Option<Rgba>,
        highlight_last: bool,
    ) {
        let mut session = self.shared.session.lock().await;
        let datagram =
            session.highlight_callsign(callsign, background, foreground, highlight_last);
        self.shared.send(datagram).await;
    }

    /// Remove every highlight this adapter set.
    pub async fn clear_highlights(&self) {
        let mut session = self.shared.session.lock().await;
        let datagrams = session.clear_highlights();
        self.shared.send(datagrams).await;
    }
}

#[async_trait]
impl Adapter for WsjtxAdapter {
    fn name(&self) -> &str {
        "wsjtx"
    }

    fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    fn subscribe(&self) -> broadcast::Receiver<AdapterEvent> {
        self.shared.events.subscribe()
    }

    async fn disconnect(&self) {
        {
            let mut session = self.shared.session.lock().await;
            if self.shared.closed.load(Ordering::SeqCst) {
                return;
            }
            let clears = session.clear_highlights();
            self.shared.send(clears).await;

            self.shared.closed.store(true, Ordering::SeqCst);
            self.cancel.cancel();
            self.shared.set_state(ConnectionState::Disconnected);
            for action in session.drop_peer(DisconnectReason::Requested) {
                if let Action::Emit(event) = action {
                    let _ = self.shared.events.send(event);
                }
            }
        }

        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }
        *self.shared.socket.lock().await = None;
        tracing::debug!(local = %self.local_addr, "WSJT-X adapter stopped");
    }
}

impl Drop for WsjtxAdapter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Background task
// ---------------------------------------------------------------------------

async fn run(
    shared: Arc<Shared>,
    mut socket: Arc<UdpTransport>,
    bind_addr: String,
    rebind_delay: Duration,
    cancel: CancellationToken,
) {
    loop {
        let Err(e) = receive_loop(&shared, &socket, &cancel).await else {
            return;
        };

        tracing::error!(local = %socket.local_addr(), error = %e, "WSJT-X socket failed");
        *shared.socket.lock().await = None;
        {
            let mut session = shared.session.lock().await;
            let actions = session.drop_peer(DisconnectReason::Error);
            shared.apply(&session, actions).await;
        }
        shared.emit(AdapterEvent::Error(format!("WSJT-X socket error: {e}")));
        shared.set_state(ConnectionState::Connecting);

        socket = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(rebind_delay) => {}
            }
            match UdpTransport::bind(&bind_addr).await {
                Ok(s) => break Arc::new(s),
                Err(e) => {
                    tracing::warn!(addr = %bind_addr, error = %e, "WSJT-X re-bind failed");
                    shared.emit(AdapterEvent::Error(format!("WSJT-X re-bind failed: {e}")));
                }
            }
        };

        if cancel.is_cancelled() {
            return;
        }
        *shared.socket.lock().await = Some(Arc::clone(&socket));
        shared.set_state(ConnectionState::Listening);
        tracing::info!(local = %socket.local_addr(), "WSJT-X socket re-bound");
    }
}

/// Receive until cancelled (`Ok`) or the socket fails (`Err`).
async fn receive_loop(
    shared: &Shared,
    socket: &UdpTransport,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let wait = {
            let session = shared.session.lock().await;
            session
                .deadline()
                .map_or(IDLE_POLL, |d| d.saturating_duration_since(Instant::now()))
                .min(IDLE_POLL)
        };

        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            r = socket.recv_from(&mut buf, wait) => r,
        };

        let mut session = shared.session.lock().await;
        let mut actions = match received {
            Ok((n, from)) => session.on_datagram(&buf[..n], from, Instant::now()),
            Err(Error::Timeout) => Vec::new(),
            Err(e) if is_peer_unreachable(&e) => {
                tracing::debug!(error = %e, "Ignoring ICMP error on WSJT-X socket");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        actions.extend(session.check_timeout(Instant::now()));
        shared.apply(&session, actions).await;
    }
}

/// An ICMP unreachable from an earlier send to a peer that has gone away.
/// Windows reports it on the next receive of an unconnected UDP socket.
/// The socket itself is still usable.
fn is_peer_unreachable(err: &Error) -> bool {
    matches!(
        err,
        Error::Io(e) if matches!(
            e.kind(),
            std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionRefused
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::WsjtxBuilder;
    use crate::codec::{self, Heartbeat, Message, Packet};

    async fn adapter() -> WsjtxAdapter {
        WsjtxBuilder::new()
            .bind_address("127.0.0.1")
            .port(0)
            .build()
            .await
            .unwrap()
    }

    fn heartbeat() -> Vec<u8> {
        codec::encode(&Packet::new(
            "WSJT-X",
            Message::Heartbeat(Heartbeat {
                max_schema: 3,
                version: Some("2.7.0".into()),
                revision: None,
            }),
        ))
        .to_vec()
    }

    async fn next_event(rx: &mut broadcast::Receiver<AdapterEvent>) -> AdapterEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    async fn recv_packet(socket: &UdpTransport) -> Packet {
        let mut buf = [0u8; MAX_DATAGRAM];
        let (n, _) = socket.recv_from(&mut buf, Duration::from_secs(2)).await.unwrap();
        codec::decode(&buf[..n]).unwrap()
    }

    #[test]
    fn unreachable_peer_errors_do_not_fail_the_socket() {
        use std::io::{Error as IoError, ErrorKind};
        assert!(is_peer_unreachable(&Error::Io(IoError::from(ErrorKind::ConnectionReset))));
        assert!(is_peer_unreachable(&Error::Io(IoError::from(ErrorKind::ConnectionRefused))));
        assert!(!is_peer_unreachable(&Error::Io(IoError::from(ErrorKind::BrokenPipe))));
        assert!(!is_peer_unreachable(&Error::Timeout));
    }

    #[tokio::test]
    async fn heartbeat_ping_pong_over_udp() {
        let adapter = adapter().await;
        let mut events = adapter.subscribe();
        assert_eq!(adapter.connection_state(), ConnectionState::Listening);

        let wsjtx = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        wsjtx.send_to(&heartbeat(), adapter.local_addr()).await.unwrap();

        let reply = recv_packet(&wsjtx).await;
        assert_eq!(reply.id, "WSJT-X");
        assert!(matches!(reply.message, Message::Heartbeat(_)));

        match next_event(&mut events).await {
            AdapterEvent::Connected { peer, detail } => {
                assert_eq!(peer, "WSJT-X");
                assert_eq!(detail.as_deref(), Some("2.7.0"));
            }
            other => panic!("expected Connected, got {other:?}"),
        }
        assert_eq!(adapter.connection_state(), ConnectionState::Connected);
        adapter.disconnect().await;
    }

    #[tokio::test]
    async fn decodes_become_events_and_replies_reach_the_peer() {
        let adapter = adapter().await;
        let mut events = adapter.subscribe();
        let wsjtx = UdpTransport::bind("127.0.0.1:0").await.unwrap();

        wsjtx.send_to(&heartbeat(), adapter.local_addr()).await.unwrap();
        recv_packet(&wsjtx).await;
        next_event(&mut events).await;

        let decode = Decode {
            is_new: true,
            time_ms: 0,
            snr: -10,
            delta_time: 0.1,
            delta_freq: 700,
            mode: "~".into(),
            message: "CQ DX W2XYZ FN31".into(),
            low_confidence: false,
            off_air: false,
            dx_call: String::new(),
            de_call: String::new(),
        };
        let datagram = codec::encode(&Packet::new("WSJT-X", Message::Decode(decode)));
        wsjtx.send_to(&datagram, adapter.local_addr()).await.unwrap();

        let AdapterEvent::Decode(decoded) = next_event(&mut events).await else {
            panic!("expected Decode");
        };
        assert_eq!(decoded.dx_call, "W2XYZ");

        adapter.reply(&decoded, 0).await;
        let Message::Reply(reply) = recv_packet(&wsjtx).await.message else {
            panic!("expected Reply");
        };
        assert_eq!(reply.message, "CQ DX W2XYZ FN31");
        adapter.disconnect().await;
    }

    #[tokio::test]
    async fn disconnect_clears_highlights_first() {
        let adapter = adapter().await;
        let mut events = adapter.subscribe();
        let wsjtx = UdpTransport::bind("127.0.0.1:0").await.unwrap();

        wsjtx.send_to(&heartbeat(), adapter.local_addr()).await.unwrap();
        recv_packet(&wsjtx).await;
        next_event(&mut events).await;

        adapter
            .highlight_callsign("K1ABC", Some(Rgba::rgb(255, 255, 0)), None, true)
            .await;
        recv_packet(&wsjtx).await;
        assert_eq!(adapter.highlighted().await, vec!["K1ABC"]);

        adapter.disconnect().await;
        let Message::HighlightCallsign(h) = recv_packet(&wsjtx).await.message else {
            panic!("expected HighlightCallsign");
        };
        assert_eq!(h.callsign, "K1ABC");
        assert!(h.is_clear());

        assert!(matches!(
            next_event(&mut events).await,
            AdapterEvent::Disconnected { reason: DisconnectReason::Requested }
        ));
        assert_eq!(adapter.connection_state(), ConnectionState::Disconnected);

        // Commands after teardown are silent no-ops.
        adapter.halt_tx(false).await;
        adapter.disconnect().await;
    }

    #[tokio::test]
    async fn commands_without_peer_send_nothing() {
        let adapter = adapter().await;
        adapter.halt_tx(true).await;
        adapter.replay().await;
        assert!(adapter.peer().await.is_none());
        adapter.disconnect().await;
    }
}
