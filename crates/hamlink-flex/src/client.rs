//! SmartSDR TCP adapter for FlexRadio transceivers.
//!
//! [`SmartSdrAdapter`] owns one command connection (port 4992) obtained from
//! a [`Connector`], and reconnects at a fixed interval whenever it drops. A
//! single background task reads status and response lines; host operations
//! lock the session, assign sequence numbers, and write in call order.
//!
//! Beyond plain commands the adapter keeps three pieces of state:
//!
//! - the panadapter spot markers it pushed, via [`SpotLifecycleTracker`];
//! - the other control clients announced by the radio, so CW commands can
//!   be bound to a GUI client's permission context;
//! - the CW keying stamps and PTT holdoff timer.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use hamlink_core::{
    Adapter, AdapterEvent, ByteStream, ConnectionState, Connector, DisconnectReason,
    ScheduledTask, Spot, SpotLifecycleTracker, SpotWire,
};

use crate::codec::{self, SmartSdrMessage, SmartSdrResponse, SmartSdrStatus, SpotDefaults};
use crate::cw::CwKeyer;
use crate::mode;

/// Broadcast channel capacity for event subscribers.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Accepted `cw wpm` range.
pub const CW_SPEED_RANGE: std::ops::RangeInclusive<u8> = 5..=100;

/// Options for configuring the SmartSDR adapter.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Fixed wait between a dropped connection and the next attempt.
    pub reconnect_delay: Duration,
    /// Key inactivity after which PTT is released automatically.
    pub ptt_holdoff: Duration,
    /// A spot that moved by more than this is removed before re-adding.
    pub move_threshold_hz: u64,
    /// Marker parameters shared by every spot.
    pub spot: SpotDefaults,
}

type Writer = WriteHalf<Box<dyn ByteStream>>;

/// A GUI client announced by the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
struct GuiClient {
    handle: u32,
    client_id: String,
}

/// Connection-scoped and host-visible state, guarded by one lock so that
/// commands leave in call order.
struct Session {
    writer: Option<Writer>,
    next_seq: u32,
    own_handle: Option<u32>,
    clients: Vec<GuiClient>,
    bound: Option<GuiClient>,
    bind_seq: Option<u32>,
    failed_binds: BTreeSet<String>,
    needs_cw: bool,
    keyer: CwKeyer,
    tracker: SpotLifecycleTracker,
    ptt_holdoff: ScheduledTask,
}

impl Session {
    fn new(move_threshold_hz: u64) -> Self {
        Session {
            writer: None,
            next_seq: 1,
            own_handle: None,
            clients: Vec::new(),
            bound: None,
            bind_seq: None,
            failed_binds: BTreeSet::new(),
            needs_cw: false,
            keyer: CwKeyer::new(Instant::now()),
            tracker: SpotLifecycleTracker::new(move_threshold_hz),
            ptt_holdoff: ScheduledTask::new(),
        }
    }

    fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    /// Start a fresh connection. Markers, bindings, and keying stamps do
    /// not survive a reconnect.
    fn attach(&mut self, writer: Writer) {
        self.writer = Some(writer);
        self.next_seq = 1;
        self.own_handle = None;
        self.clients.clear();
        self.bound = None;
        self.bind_seq = None;
        self.failed_binds.clear();
        self.keyer.reset(Instant::now());
        self.tracker.reset();
        self.ptt_holdoff.cancel();
    }

    fn detach(&mut self) -> Option<Writer> {
        self.ptt_holdoff.cancel();
        self.bound = None;
        self.bind_seq = None;
        self.writer.take()
    }

    fn client_handle(&self) -> Option<u32> {
        self.bound.as_ref().map(|c| c.handle)
    }

    /// Send one command; returns its sequence number, or `None` when there
    /// is no connection or the write failed.
    async fn send(&mut self, command: &str) -> Option<u32> {
        let writer = self.writer.as_mut()?;
        let seq = self.next_seq;
        self.next_seq = seq.wrapping_add(1).max(1);

        tracing::trace!(seq = seq, command = %command, "Sending command");
        let encoded = codec::encode_command(seq, command);
        if let Err(e) = write_all_flush(writer, &encoded).await {
            tracing::warn!(seq = seq, error = %e, "SmartSDR write failed");
            self.writer = None;
            return None;
        }
        Some(seq)
    }

    async fn send_all(&mut self, commands: Vec<String>) {
        for command in commands {
            self.send(&command).await;
        }
    }

    /// Bind to the first announced GUI client, if not bound already.
    ///
    /// When no client is known the keying commands go out unbound. Some
    /// radio firmware accepts them that way, so this is not an error.
    async fn ensure_bound(&mut self) {
        self.needs_cw = true;
        if self.bound.is_some() || self.bind_seq.is_some() {
            return;
        }
        let own = self.own_handle;
        let Some(client) = self
            .clients
            .iter()
            .find(|c| Some(c.handle) != own && !self.failed_binds.contains(&c.client_id))
            .cloned()
        else {
            tracing::trace!("No GUI client to bind, keying unbound");
            return;
        };

        if let Some(seq) = self.send(&codec::cmd_client_bind(&client.client_id)).await {
            tracing::debug!(
                seq = seq,
                handle = format!("0x{:08X}", client.handle),
                client_id = %client.client_id,
                "Binding to GUI client"
            );
            self.bind_seq = Some(seq);
            self.bound = Some(client);
        }
    }

    fn on_response(&mut self, resp: SmartSdrResponse) -> Option<AdapterEvent> {
        let is_bind = self.bind_seq == Some(resp.sequence);
        if is_bind {
            self.bind_seq = None;
        }

        let err = match resp.check() {
            Ok(_) => {
                if is_bind {
                    tracing::debug!(seq = resp.sequence, "Client bind accepted");
                }
                return None;
            }
            Err(err) => err,
        };

        if is_bind {
            tracing::warn!(error = %err, "Client bind rejected, keying unbound");
            if let Some(client) = self.bound.take() {
                self.failed_binds.insert(client.client_id);
            }
            return None;
        }

        tracing::warn!(seq = resp.sequence, error = %err, "SmartSDR command rejected");
        Some(AdapterEvent::CommandRejected {
            sequence: resp.sequence,
            code: resp.error_code,
            message: resp.message,
        })
    }

    async fn on_status(&mut self, status: &SmartSdrStatus) {
        let Some(client) = codec::parse_client_status(status) else {
            return;
        };

        if client.disconnected {
            self.clients.retain(|c| c.handle != client.handle);
            if self.client_handle() == Some(client.handle) {
                tracing::debug!(
                    handle = format!("0x{:08X}", client.handle),
                    "Bound GUI client left"
                );
                self.bound = None;
                self.bind_seq = None;
            }
            return;
        }

        let Some(client_id) = client.client_id else {
            return;
        };
        if Some(client.handle) == self.own_handle {
            return;
        }
        if !self.clients.iter().any(|c| c.handle == client.handle) {
            tracing::debug!(
                handle = format!("0x{:08X}", client.handle),
                client_id = %client_id,
                program = ?client.program,
                "GUI client discovered"
            );
            self.clients.push(GuiClient {
                handle: client.handle,
                client_id,
            });
        }
        if self.needs_cw {
            self.ensure_bound().await;
        }
    }
}

async fn write_all_flush(writer: &mut Writer, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}

/// Collects spot add/remove commands produced by the tracker.
struct SpotCommands<'a> {
    defaults: &'a SpotDefaults,
    commands: Vec<String>,
}

impl<'a> SpotCommands<'a> {
    fn new(defaults: &'a SpotDefaults) -> Self {
        SpotCommands {
            defaults,
            commands: Vec::new(),
        }
    }
}

impl SpotWire for SpotCommands<'_> {
    fn push(&mut self, spot: &Spot) {
        self.commands.push(codec::cmd_spot_add(spot, self.defaults));
    }

    fn remove(&mut self, callsign: &str) {
        self.commands
            .push(codec::cmd_spot_remove(callsign, &self.defaults.source));
    }
}

struct Shared {
    connector: Arc<dyn Connector>,
    options: ClientOptions,
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

    /// Holdoff expiry: release PTT if it is still asserted.
    async fn release_ptt(&self) {
        let mut session = self.session.lock().await;
        if self.is_closed() {
            return;
        }
        let handle = session.client_handle();
        if let Some(cmd) = session.keyer.ptt_off(Instant::now(), handle) {
            tracing::debug!("PTT holdoff elapsed, releasing");
            session.send(&cmd).await;
        }
    }

    fn arm_holdoff(self: &Arc<Self>, session: &mut Session) {
        let weak: Weak<Shared> = Arc::downgrade(self);
        session
            .ptt_holdoff
            .schedule(self.options.ptt_holdoff, async move {
                if let Some(shared) = weak.upgrade() {
                    shared.release_ptt().await;
                }
            });
    }

    async fn handle_line(&self, line: &str) {
        tracing::trace!(line = %line, "SmartSDR line");
        let message = match codec::parse_message(line) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, line = %line, "Dropping malformed SmartSDR line");
                self.emit(AdapterEvent::Error(format!("malformed SmartSDR line: {e}")));
                return;
            }
        };

        let mut session = self.session.lock().await;
        if self.is_closed() {
            return;
        }
        match message {
            SmartSdrMessage::Version(v) => {
                tracing::debug!(version = %v, "SmartSDR version received");
            }
            SmartSdrMessage::Handle(h) => {
                tracing::debug!(handle = format!("0x{h:08X}"), "Client handle received");
                session.own_handle = Some(h);
                session.clients.retain(|c| c.handle != h);
            }
            SmartSdrMessage::Response(resp) => {
                if let Some(event) = session.on_response(resp) {
                    self.emit(event);
                }
            }
            SmartSdrMessage::Status(status) => session.on_status(&status).await,
            SmartSdrMessage::Message(text) => {
                tracing::debug!(message = %text, "SmartSDR message");
            }
            SmartSdrMessage::Unknown(line) => {
                tracing::trace!(line = %line, "Unknown line from radio");
            }
        }
    }

    /// Drive one connection until it drops. Returns `None` when the adapter
    /// was shut down instead.
    async fn serve(
        &self,
        stream: Box<dyn ByteStream>,
        cancel: &CancellationToken,
    ) -> Option<DisconnectReason> {
        let (rd, wr) = tokio::io::split(stream);
        {
            let mut session = self.session.lock().await;
            if self.is_closed() {
                return None;
            }
            session.attach(wr);
            self.set_state(ConnectionState::Connected);
            self.emit(AdapterEvent::Connected {
                peer: self.connector.describe(),
                detail: None,
            });
            session.send(&codec::cmd_subscribe("client all")).await;
        }
        tracing::debug!(radio = %self.connector.describe(), "SmartSDR connected");

        let reason = self.read_lines(rd, cancel).await;

        let mut session = self.session.lock().await;
        if let Some(mut writer) = session.detach() {
            let _ = writer.shutdown().await;
        }
        if self.is_closed() {
            return None;
        }
        reason
    }

    async fn read_lines(
        &self,
        rd: ReadHalf<Box<dyn ByteStream>>,
        cancel: &CancellationToken,
    ) -> Option<DisconnectReason> {
        let mut reader = BufReader::new(rd);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                r = reader.read_until(b'\n', &mut buf) => r,
            };
            match read {
                Ok(0) => {
                    tracing::debug!("SmartSDR connection closed by radio");
                    return Some(DisconnectReason::Closed);
                }
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim();
                    if !line.is_empty() {
                        self.handle_line(line).await;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "SmartSDR read error");
                    self.emit(AdapterEvent::Error(format!("SmartSDR read error: {e}")));
                    return Some(DisconnectReason::Error);
                }
            }
        }
    }
}

/// A long-lived SmartSDR control connection.
///
/// Every operation is safe in any connection state and silently does
/// nothing while disconnected.
pub struct SmartSdrAdapter {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SmartSdrAdapter {
    /// Start the adapter. The first connect attempt runs in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(connector: Arc<dyn Connector>, options: ClientOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let shared = Arc::new(Shared {
            session: Mutex::new(Session::new(options.move_threshold_hz)),
            connector,
            options,
            events,
            state,
            closed: AtomicBool::new(false),
        });
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(Arc::clone(&shared), cancel.clone()));
        SmartSdrAdapter {
            shared,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    // ---- spots --------------------------------------------------------------

    /// Push a panadapter marker for `spot`, replacing a stale-frequency one.
    pub async fn add_spot(&self, spot: &Spot) {
        let mut session = self.shared.session.lock().await;
        if !session.is_connected() {
            return;
        }
        let mut wire = SpotCommands::new(&self.shared.options.spot);
        session.tracker.add_spot(spot, &mut wire);
        session.send_all(wire.commands).await;
    }

    /// End a refresh cycle: remove every marker not re-added since the last
    /// call. Returns the number removed.
    pub async fn prune_stale_spots(&self) -> usize {
        let mut session = self.shared.session.lock().await;
        if !session.is_connected() {
            return 0;
        }
        let mut wire = SpotCommands::new(&self.shared.options.spot);
        let removed = session.tracker.prune_stale(&mut wire);
        session.send_all(wire.commands).await;
        removed
    }

    /// Remove every marker on the radio and forget tracked spots.
    pub async fn clear_spots(&self) {
        let mut session = self.shared.session.lock().await;
        if !session.is_connected() {
            return;
        }
        session.send(&codec::cmd_spot_clear()).await;
        session.tracker.reset();
    }

    // ---- slices -------------------------------------------------------------

    /// Tune `slice` to `freq_hz`, optionally switching mode and filter.
    ///
    /// `mode` is a host mode name such as `"SSB"` or `"FT8"`; names with no
    /// SmartSDR equivalent leave the slice mode unchanged.
    pub async fn tune(
        &self,
        slice: u8,
        freq_hz: u64,
        mode: Option<&str>,
        filter: Option<(i32, i32)>,
    ) {
        let mut session = self.shared.session.lock().await;
        if !session.is_connected() {
            return;
        }
        session.send(&codec::cmd_slice_tune(slice, freq_hz)).await;
        if let Some(host_mode) = mode {
            match mode::to_flex_mode(host_mode, freq_hz) {
                Some(flex) => {
                    session.send(&codec::cmd_slice_set_mode(slice, flex)).await;
                }
                None => tracing::debug!(mode = %host_mode, "No SmartSDR mode for host mode"),
            }
        }
        if let Some((lo, hi)) = filter {
            session
                .send(&codec::cmd_slice_set_filter(slice, lo, hi))
                .await;
        }
    }

    // ---- CW -----------------------------------------------------------------

    /// Key down or up. A key-down asserts PTT first if needed; every key
    /// event restarts the PTT holdoff.
    pub async fn cw_key(&self, down: bool) {
        let mut session = self.shared.session.lock().await;
        if !session.is_connected() {
            return;
        }
        session.ensure_bound().await;
        let handle = session.client_handle();
        if down {
            if let Some(cmd) = session.keyer.ptt_on(Instant::now(), handle) {
                session.send(&cmd).await;
            }
        }
        let cmd = session.keyer.key(down, Instant::now(), handle);
        session.send(&cmd).await;
        if session.keyer.ptt_active() {
            self.shared.arm_holdoff(&mut session);
        }
    }

    /// Assert PTT for a keying burst. Idempotent while PTT is held; every
    /// call restarts the holdoff after which PTT is released.
    pub async fn cw_ptt_on(&self) {
        let mut session = self.shared.session.lock().await;
        if !session.is_connected() {
            return;
        }
        session.ensure_bound().await;
        let handle = session.client_handle();
        if let Some(cmd) = session.keyer.ptt_on(Instant::now(), handle) {
            session.send(&cmd).await;
        }
        self.shared.arm_holdoff(&mut session);
    }

    /// Key up and release PTT now, skipping the holdoff.
    pub async fn cw_stop(&self) {
        let mut session = self.shared.session.lock().await;
        session.ptt_holdoff.cancel();
        if !session.is_connected() {
            return;
        }
        let handle = session.client_handle();
        let key_up = session.keyer.key(false, Instant::now(), handle);
        session.send(&key_up).await;
        let release = session.keyer.force_ptt_off(Instant::now(), handle);
        session.send(&release).await;
    }

    /// Set the keyer speed, clamped to 5..=100 WPM.
    pub async fn set_cw_speed(&self, wpm: u8) {
        let wpm = wpm.clamp(*CW_SPEED_RANGE.start(), *CW_SPEED_RANGE.end());
        let mut session = self.shared.session.lock().await;
        if !session.is_connected() {
            return;
        }
        session.ensure_bound().await;
        session.send(&codec::cmd_cw_wpm(wpm)).await;
    }

    // ---- introspection ------------------------------------------------------

    /// Handle the radio assigned to this connection.
    pub async fn own_handle(&self) -> Option<u32> {
        self.shared.session.lock().await.own_handle
    }

    /// Client id of the GUI client CW commands are bound to.
    pub async fn bound_client(&self) -> Option<String> {
        let session = self.shared.session.lock().await;
        session.bound.as_ref().map(|c| c.client_id.clone())
    }

    /// Whether PTT is currently asserted.
    pub async fn ptt_active(&self) -> bool {
        self.shared.session.lock().await.keyer.ptt_active()
    }

    /// Callsigns with a marker pushed during the current refresh cycle.
    pub async fn active_spots(&self) -> Vec<String> {
        let session = self.shared.session.lock().await;
        session.tracker.active().map(str::to_string).collect()
    }
}

#[async_trait]
impl Adapter for SmartSdrAdapter {
    fn name(&self) -> &str {
        "smartsdr"
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
            session.ptt_holdoff.cancel();
            self.cancel.cancel();

            if session.keyer.ptt_active() {
                let handle = session.client_handle();
                let key_up = session.keyer.key(false, Instant::now(), handle);
                session.send(&key_up).await;
                let release = session.keyer.force_ptt_off(Instant::now(), handle);
                session.send(&release).await;
            }

            let was_connected = session.is_connected();
            if let Some(mut writer) = session.detach() {
                let _ = writer.shutdown().await;
            }
            self.shared.state.send_replace(ConnectionState::Disconnected);
            if was_connected {
                let _ = self.shared.events.send(AdapterEvent::Disconnected {
                    reason: DisconnectReason::Requested,
                });
            }
        }

        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }
        tracing::debug!(radio = %self.shared.connector.describe(), "SmartSDR adapter stopped");
    }
}

impl Drop for SmartSdrAdapter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Connection task
// ---------------------------------------------------------------------------

async fn run(shared: Arc<Shared>, cancel: CancellationToken) {
    let radio = shared.connector.describe();
    let mut attempt: u32 = 0;
    loop {
        shared.set_state(ConnectionState::Connecting);
        tracing::debug!(radio = %radio, "Connecting to SmartSDR");

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            r = shared.connector.connect() => r,
        };

        match connected {
            Ok(stream) => {
                attempt = 0;
                match shared.serve(stream, &cancel).await {
                    Some(reason) => shared.emit(AdapterEvent::Disconnected { reason }),
                    None => return,
                }
            }
            Err(e) => {
                tracing::warn!(radio = %radio, error = %e, "SmartSDR connect failed");
                shared.emit(AdapterEvent::Error(format!(
                    "SmartSDR connect to {radio} failed: {e}"
                )));
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
