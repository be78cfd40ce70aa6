//! TCI WebSocket adapter.
//!
//! [`TciAdapter`] keeps one WebSocket open to the SDR application and
//! reconnects at a fixed interval when it drops. After the socket opens the
//! server announces itself and finally sends `ready;`. Until then every
//! command is queued in issue order; `ready` flushes the queue. A queue
//! left over when the socket drops is discarded, since markers are rebuilt
//! by the host's next refresh cycle anyway.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::error::{Error as WsError, ProtocolError};
use tokio_util::sync::CancellationToken;

use hamlink_core::{
    Adapter, AdapterEvent, ByteStream, ConnectionState, Connector, DisconnectReason, Spot,
    SpotLifecycleTracker, SpotWire,
};

use crate::codec::{self, TciCommand};

/// Broadcast channel capacity for event subscribers.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Options for configuring the TCI adapter.
#[derive(Debug, Clone)]
pub struct TciOptions {
    /// URL presented in the WebSocket handshake.
    pub url: String,
    /// Fixed wait between a dropped connection and the next attempt.
    pub reconnect_delay: Duration,
    /// A spot that moved by more than this is deleted before re-adding.
    pub move_threshold_hz: u64,
}

type Socket = WebSocketStream<Box<dyn ByteStream>>;
type Sink = SplitSink<Socket, Message>;

struct Session {
    sink: Option<Sink>,
    ready: bool,
    queue: VecDeque<String>,
    /// `protocol:` and `device:` announcements, for the `Connected` event.
    server: Vec<String>,
    tracker: SpotLifecycleTracker,
}

impl Session {
    fn is_open(&self) -> bool {
        self.sink.is_some()
    }

    /// Send `command` now if the server is ready, queue it if the socket is
    /// open but not ready, drop it otherwise.
    async fn send(&mut self, command: String) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        if !self.ready {
            tracing::trace!(command = %command, "Queueing TCI command until ready");
            self.queue.push_back(command);
            return;
        }
        tracing::trace!(command = %command, "Sending TCI command");
        if let Err(e) = sink.send(Message::text(command)).await {
            tracing::warn!(error = %e, "TCI write failed");
            self.sink = None;
        }
    }

    async fn send_all(&mut self, commands: Vec<String>) {
        for command in commands {
            self.send(command).await;
        }
    }

    async fn flush_queue(&mut self) {
        let queued: Vec<String> = self.queue.drain(..).collect();
        if !queued.is_empty() {
            tracing::debug!(count = queued.len(), "Flushing queued TCI commands");
        }
        self.send_all(queued).await;
    }

    fn detach(&mut self) -> Option<Sink> {
        self.ready = false;
        self.queue.clear();
        self.server.clear();
        self.sink.take()
    }
}

/// Collects spot/spot_delete commands produced by the tracker.
#[derive(Default)]
struct SpotCommands(Vec<String>);

impl SpotWire for SpotCommands {
    fn push(&mut self, spot: &Spot) {
        self.0.push(codec::cmd_spot(spot));
    }

    fn remove(&mut self, callsign: &str) {
        self.0.push(codec::cmd_spot_delete(callsign));
    }
}

struct Shared {
    connector: Arc<dyn Connector>,
    options: TciOptions,
    session: Mutex<Session>,
    events: broadcast::Sender<AdapterEvent>,
    state: watch::Sender<ConnectionState>,
    closed: AtomicBool,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn emit(&self, event: AdapterEvent) {
        if !self.is_closed() {
            let _ = self.events.send(event);
        }
    }

    fn set_state(&self, state: ConnectionState) {
        if self.is_closed() {
            return;
        }
        self.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    async fn on_command(&self, command: TciCommand) {
        let mut session = self.session.lock().await;
        if self.is_closed() {
            return;
        }
        if command.is_ready() {
            if session.ready {
                return;
            }
            session.ready = true;
            let detail = (!session.server.is_empty()).then(|| session.server.join(" "));
            tracing::debug!(server = ?detail, "TCI server ready");
            self.set_state(ConnectionState::Connected);
            self.emit(AdapterEvent::Connected {
                peer: self.connector.describe(),
                detail,
            });
            session.flush_queue().await;
            return;
        }
        match command.name.as_str() {
            "protocol" | "device" => {
                session.server.push(command.args.join(" "));
            }
            _ => {
                tracing::trace!(name = %command.name, args = ?command.args, "TCI notification");
            }
        }
    }

    /// Drive one connection until it drops. `None` means shut down.
    async fn serve(&self, socket: Socket, cancel: &CancellationToken) -> SocketEnd {
        let (sink, stream) = socket.split();
        {
            let mut session = self.session.lock().await;
            if self.is_closed() {
                return SocketEnd::Stopped;
            }
            session.sink = Some(sink);
            session.ready = false;
            session.queue.clear();
            session.server.clear();
            session.tracker.reset();
        }
        tracing::debug!(server = %self.connector.describe(), "TCI socket open, waiting for ready");

        let reason = self.read_frames(stream, cancel).await;

        let mut session = self.session.lock().await;
        let was_ready = session.ready;
        if let Some(mut sink) = session.detach() {
            let _ = sink.close().await;
        }
        if self.is_closed() {
            return SocketEnd::Stopped;
        }
        match reason {
            Some(reason) => SocketEnd::Dropped(was_ready.then_some(reason)),
            None => SocketEnd::Stopped,
        }
    }

    async fn read_frames(
        &self,
        mut stream: SplitStream<Socket>,
        cancel: &CancellationToken,
    ) -> Option<DisconnectReason> {
        loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                f = stream.next() => f,
            };
            match frame {
                None | Some(Ok(Message::Close(_))) => {
                    tracing::debug!("TCI connection closed by server");
                    return Some(DisconnectReason::Closed);
                }
                Some(Ok(Message::Text(text))) => {
                    tracing::trace!(frame = %text.as_str(), "TCI frame");
                    for command in codec::split_commands(text.as_str()) {
                        self.on_command(command).await;
                    }
                }
                Some(Err(WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake))) => {
                    tracing::debug!("TCI server dropped the socket without a close frame");
                    return Some(DisconnectReason::Closed);
                }
                Some(Ok(other)) => {
                    tracing::trace!(kind = ?other, "Ignoring non-text TCI frame");
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "TCI read error");
                    self.emit(AdapterEvent::Error(format!("TCI read error: {e}")));
                    return Some(DisconnectReason::Error);
                }
            }
        }
    }

    async fn open(&self) -> hamlink_core::Result<Socket> {
        let stream = self.connector.connect().await?;
        let (socket, _response) = tokio_tungstenite::client_async(self.options.url.as_str(), stream)
            .await
            .map_err(|e| hamlink_core::Error::Transport(format!("TCI handshake failed: {e}")))?;
        Ok(socket)
    }
}

/// A long-lived TCI WebSocket connection.
///
/// Every operation is safe in any connection state. Commands issued while
/// the socket is open but the server is not yet ready are queued; while no
/// socket is open they are dropped.
pub struct TciAdapter {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TciAdapter {
    /// Start the adapter. Connecting happens in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(connector: Arc<dyn Connector>, options: TciOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let shared = Arc::new(Shared {
            session: Mutex::new(Session {
                sink: None,
                ready: false,
                queue: VecDeque::new(),
                server: Vec::new(),
                tracker: SpotLifecycleTracker::new(options.move_threshold_hz),
            }),
            connector,
            options,
            events,
            state,
            closed: AtomicBool::new(false),
        });
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(Arc::clone(&shared), cancel.clone()));
        TciAdapter {
            shared,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Push a marker for `spot`, deleting a stale-frequency one first.
    pub async fn add_spot(&self, spot: &Spot) {
        let mut session = self.shared.session.lock().await;
        if !session.is_open() {
            return;
        }
        let mut wire = SpotCommands::default();
        session.tracker.add_spot(spot, &mut wire);
        session.send_all(wire.0).await;
    }

    /// End a refresh cycle: delete every marker not re-added since the last
    /// call. Returns the number deleted.
    pub async fn prune_stale_spots(&self) -> usize {
        let mut session = self.shared.session.lock().await;
        if !session.is_open() {
            return 0;
        }
        let mut wire = SpotCommands::default();
        let removed = session.tracker.prune_stale(&mut wire);
        session.send_all(wire.0).await;
        removed
    }

    /// Delete every marker and forget tracked spots.
    pub async fn clear_spots(&self) {
        let mut session = self.shared.session.lock().await;
        if !session.is_open() {
            return;
        }
        session.send(codec::cmd_spot_clear()).await;
        session.tracker.reset();
    }

    /// Tune receiver 0 to `freq_hz`, optionally switching modulation.
    pub async fn tune(&self, freq_hz: u64, mode: Option<&str>) {
        let mut session = self.shared.session.lock().await;
        if !session.is_open() {
            return;
        }
        session.send(codec::cmd_vfo(0, 0, freq_hz)).await;
        if let Some(host_mode) = mode {
            match codec::to_tci_mode(host_mode, freq_hz) {
                Some(m) => session.send(codec::cmd_modulation(0, m)).await,
                None => tracing::debug!(mode = %host_mode, "No TCI modulation for host mode"),
            }
        }
    }

    /// Whether the server has sent `ready;` on the current socket.
    pub async fn is_ready(&self) -> bool {
        self.shared.session.lock().await.ready
    }

    /// Number of commands waiting for `ready;`.
    pub async fn queued(&self) -> usize {
        self.shared.session.lock().await.queue.len()
    }
}

#[async_trait]
impl Adapter for TciAdapter {
    fn name(&self) -> &str {
        "tci"
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
            if self.shared.closed.swap(true, Ordering::SeqCst) {
                return;
            }
            self.cancel.cancel();
            let was_ready = session.ready;
            if let Some(mut sink) = session.detach() {
                let _ = sink.close().await;
            }
            self.shared.state.send_replace(ConnectionState::Disconnected);
            if was_ready {
                let _ = self.shared.events.send(AdapterEvent::Disconnected {
                    reason: DisconnectReason::Requested,
                });
            }
        }

        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }
        tracing::debug!(server = %self.shared.connector.describe(), "TCI adapter stopped");
    }
}

impl Drop for TciAdapter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Connection task
// ---------------------------------------------------------------------------

/// How a served socket ended.
enum SocketEnd {
    /// The adapter was stopped.
    Stopped,
    /// The socket went away. The reason is only reported when `Connected`
    /// had been announced for it.
    Dropped(Option<DisconnectReason>),
}

async fn run(shared: Arc<Shared>, cancel: CancellationToken) {
    let server = shared.connector.describe();
    let mut attempt: u32 = 0;
    loop {
        shared.set_state(ConnectionState::Connecting);
        tracing::debug!(server = %server, url = %shared.options.url, "Connecting to TCI server");

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            r = shared.open() => r,
        };

        match opened {
            Ok(socket) => {
                attempt = 0;
                match shared.serve(socket, &cancel).await {
                    SocketEnd::Dropped(Some(reason)) => {
                        shared.emit(AdapterEvent::Disconnected { reason })
                    }
                    SocketEnd::Dropped(None) => {
                        tracing::debug!(server = %server, "TCI socket dropped before ready");
                    }
                    SocketEnd::Stopped => return,
                }
            }
            Err(e) => {
                tracing::warn!(server = %server, error = %e, "TCI connect failed");
                shared.emit(AdapterEvent::Error(format!("TCI connect to {server} failed: {e}")));
            }
        }

        attempt += 1;
        let delay = shared.options.reconnect_delay;
        shared.set_state(ConnectionState::Connecting);
        shared.emit(AdapterEvent::Reconnecting { attempt, delay });
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TciBuilder;
    use hamlink_test_harness::{MockConnector, MockConnectorHandle};
    use tokio::io::DuplexStream;

    type Server = WebSocketStream<DuplexStream>;

    async fn accept(handle: &mut MockConnectorHandle) -> Server {
        let stream = handle.accept().await.expect("no connect attempt");
        tokio_tungstenite::accept_async(stream)
            .await
            .expect("server handshake failed")
    }

    async fn say(server: &mut Server, text: &str) {
        server.send(Message::text(text.to_string())).await.unwrap();
    }

    /// Next text frame from the adapter, or `None` if none arrives in `wait`.
    async fn heard_within(server: &mut Server, wait: Duration) -> Option<String> {
        loop {
            match tokio::time::timeout(wait, server.next()).await {
                Ok(Some(Ok(Message::Text(t)))) => return Some(t.as_str().to_string()),
                Ok(Some(Ok(_))) => continue,
                _ => return None,
            }
        }
    }

    async fn heard(server: &mut Server) -> String {
        heard_within(server, Duration::from_secs(30))
            .await
            .expect("no frame from adapter")
    }

    async fn next_event(rx: &mut broadcast::Receiver<AdapterEvent>) -> AdapterEvent {
        tokio::time::timeout(Duration::from_secs(60), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    /// Next event that is not an `Error` report.
    async fn next_status(rx: &mut broadcast::Receiver<AdapterEvent>) -> AdapterEvent {
        loop {
            match next_event(rx).await {
                AdapterEvent::Error(_) => continue,
                event => return event,
            }
        }
    }

    async fn start() -> (TciAdapter, MockConnectorHandle, Server) {
        let (connector, mut handle) = MockConnector::new("tci-mock");
        let tci = TciBuilder::new().connector(connector).build().unwrap();
        let mut server = accept(&mut handle).await;
        say(&mut server, "ready;").await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(tci.is_ready().await);
        (tci, handle, server)
    }

    #[tokio::test(start_paused = true)]
    async fn commands_before_ready_are_queued_in_order() {
        let (connector, mut handle) = MockConnector::new("tci-mock");
        let tci = TciBuilder::new().connector(connector).build().unwrap();
        let mut events = tci.subscribe();
        let mut server = accept(&mut handle).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        tci.add_spot(&Spot::from_khz("K1ABC", 14_062.0, "CW")).await;
        tci.tune(7_030_000, Some("CW")).await;
        assert_eq!(tci.queued().await, 3);
        assert_eq!(tci.connection_state(), ConnectionState::Connecting);
        assert!(heard_within(&mut server, Duration::from_millis(100)).await.is_none());

        say(&mut server, "protocol:ExpertSDR3,1.9;device:SunSDR2PRO;ready;").await;
        assert!(heard(&mut server).await.starts_with("spot:K1ABC,CW,14062000,"));
        assert_eq!(heard(&mut server).await, "vfo:0,0,7030000;");
        assert_eq!(heard(&mut server).await, "modulation:0,cw;");

        match next_event(&mut events).await {
            AdapterEvent::Connected { peer, detail } => {
                assert_eq!(peer, "tci-mock");
                assert_eq!(detail.as_deref(), Some("ExpertSDR3 1.9 SunSDR2PRO"));
            }
            other => panic!("expected Connected, got {other:?}"),
        }
        assert_eq!(tci.connection_state(), ConnectionState::Connected);
        assert_eq!(tci.queued().await, 0);
        tci.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn fifty_hertz_move_threshold() {
        let (tci, _handle, mut server) = start().await;

        tci.add_spot(&Spot::new("K1ABC", 14_074_000, "FT8")).await;
        tci.add_spot(&Spot::new("K1ABC", 14_074_050, "FT8")).await;
        tci.add_spot(&Spot::new("K1ABC", 14_074_101, "FT8")).await;

        assert!(heard(&mut server).await.starts_with("spot:K1ABC,FT8,14074000,"));
        assert!(heard(&mut server).await.starts_with("spot:K1ABC,FT8,14074050,"));
        assert_eq!(heard(&mut server).await, "spot_delete:K1ABC;");
        assert!(heard(&mut server).await.starts_with("spot:K1ABC,FT8,14074101,"));
        tci.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn prune_and_clear() {
        let (tci, _handle, mut server) = start().await;

        tci.add_spot(&Spot::from_khz("K1ABC", 14_062.0, "CW")).await;
        tci.add_spot(&Spot::from_khz("W2XYZ", 7_030.0, "CW")).await;
        tci.prune_stale_spots().await;
        tci.add_spot(&Spot::from_khz("W2XYZ", 7_030.0, "CW")).await;
        assert_eq!(tci.prune_stale_spots().await, 1);
        tci.clear_spots().await;

        let mut frames = Vec::new();
        while let Some(f) = heard_within(&mut server, Duration::from_millis(50)).await {
            frames.push(f);
        }
        assert_eq!(frames.len(), 5, "{frames:?}");
        assert_eq!(frames[3], "spot_delete:K1ABC;");
        assert_eq!(frames[4], "spot_clear;");
        tci.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn queue_is_discarded_when_socket_drops() {
        let (connector, mut handle) = MockConnector::new("tci-mock");
        let tci = TciBuilder::new().connector(connector).build().unwrap();
        let mut events = tci.subscribe();
        let server = accept(&mut handle).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        tci.add_spot(&Spot::from_khz("K1ABC", 14_062.0, "CW")).await;
        assert_eq!(tci.queued().await, 1);
        drop(server);

        // Never announced as connected, so no Disconnected either.
        match next_status(&mut events).await {
            AdapterEvent::Reconnecting { attempt, delay } => {
                assert_eq!(attempt, 1);
                assert_eq!(delay, Duration::from_secs(5));
            }
            other => panic!("expected Reconnecting, got {other:?}"),
        }
        assert_eq!(tci.queued().await, 0);

        let mut server = accept(&mut handle).await;
        say(&mut server, "ready;").await;
        assert!(matches!(next_event(&mut events).await, AdapterEvent::Connected { .. }));
        assert!(heard_within(&mut server, Duration::from_millis(100)).await.is_none());
        tci.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn drop_after_ready_reports_disconnect() {
        let (tci, _handle, server) = start().await;
        let mut events = tci.subscribe();
        drop(server);

        assert!(matches!(
            next_status(&mut events).await,
            AdapterEvent::Disconnected { .. }
        ));
        assert!(matches!(
            next_status(&mut events).await,
            AdapterEvent::Reconnecting { attempt: 1, .. }
        ));
        assert_eq!(tci.connection_state(), ConnectionState::Connecting);
        assert!(!tci.is_ready().await);
        tci.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn operations_without_socket_are_dropped() {
        let (connector, handle) = MockConnector::new("tci-mock");
        handle.fail_next(u32::MAX);
        let tci = TciBuilder::new().connector(connector).build().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        tci.add_spot(&Spot::from_khz("K1ABC", 14_062.0, "CW")).await;
        assert_eq!(tci.prune_stale_spots().await, 0);
        assert_eq!(tci.queued().await, 0);
        tci.disconnect().await;
        assert_eq!(tci.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_closes_socket_and_is_idempotent() {
        let (tci, _handle, mut server) = start().await;
        let mut events = tci.subscribe();
        tci.disconnect().await;
        tci.disconnect().await;

        assert!(matches!(
            next_event(&mut events).await,
            AdapterEvent::Disconnected { reason: DisconnectReason::Requested }
        ));
        assert!(heard_within(&mut server, Duration::from_millis(100)).await.is_none());

        tci.add_spot(&Spot::from_khz("K1ABC", 14_062.0, "CW")).await;
        assert!(events.try_recv().is_err());
    }
}
