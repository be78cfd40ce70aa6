//! Sans-IO WSJT-X session state machine.
//!
//! [`WsjtxSession`] owns everything the UDP adapter knows about the peer:
//! its session id and return address, the liveness deadline, and the set
//! of callsigns currently highlighted in its band-activity window. It
//! never touches a socket or a clock. The adapter feeds it datagrams and
//! timestamps and performs the [`Action`]s it returns, which keeps the
//! heartbeat and timeout logic testable without real time or sockets.
//!
//! ```text
//!   Listening --HEARTBEAT/STATUS--> Connected
//!   Connected --CLOSE or silence--> Listening
//! ```
//!
//! Leaving `Connected` forgets the highlight set without sending clears
//! (the peer is gone) and forgets the session id, so outbound commands
//! become no-ops until a new peer announces itself.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use hamlink_core::{AdapterEvent, ConnectionState, Decode, DisconnectReason};
use tokio::time::Instant;

use crate::codec::{self, Heartbeat, Highlight, Message, Packet, Reply, Rgba, SCHEMA};

/// Silence after which a peer is considered gone.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(30);

/// A datagram addressed to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub to: SocketAddr,
    pub bytes: Bytes,
}

/// Work the adapter must perform after feeding the session.
#[derive(Debug, Clone)]
pub enum Action {
    Send(Datagram),
    Emit(AdapterEvent),
}

/// The WSJT-X instance currently talking to us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// Session id from the envelope.
    pub id: String,
    /// Where its datagrams come from, and where replies go.
    pub addr: SocketAddr,
    /// Version string from its heartbeat, if one has been seen.
    pub version: Option<String>,
    /// Schema used for datagrams sent to this peer.
    pub schema: u32,
}

/// Per-peer protocol state.
#[derive(Debug)]
pub struct WsjtxSession {
    heartbeat_timeout: Duration,
    client_version: String,
    peer: Option<Peer>,
    last_rx: Option<Instant>,
    highlighted: BTreeSet<String>,
}

impl WsjtxSession {
    /// A session in the `Listening` state.
    pub fn new(heartbeat_timeout: Duration) -> Self {
        WsjtxSession {
            heartbeat_timeout,
            client_version: concat!("hamlink ", env!("CARGO_PKG_VERSION")).to_string(),
            peer: None,
            last_rx: None,
            highlighted: BTreeSet::new(),
        }
    }

    /// `Connected` while a peer is known, otherwise `Listening`.
    pub fn state(&self) -> ConnectionState {
        if self.peer.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Listening
        }
    }

    pub fn peer(&self) -> Option<&Peer> {
        self.peer.as_ref()
    }

    /// Callsigns currently highlighted at the peer.
    pub fn highlighted(&self) -> impl Iterator<Item = &str> {
        self.highlighted.iter().map(String::as_str)
    }

    /// When the peer will be declared gone if nothing else arrives.
    pub fn deadline(&self) -> Option<Instant> {
        self.peer.as_ref()?;
        self.last_rx.map(|t| t + self.heartbeat_timeout)
    }

    /// Process one inbound datagram received at `now`.
    pub fn on_datagram(&mut self, data: &[u8], from: SocketAddr, now: Instant) -> Vec<Action> {
        let packet = match codec::decode(data) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(from = %from, error = %e, "Dropping malformed WSJT-X datagram");
                return vec![Action::Emit(AdapterEvent::Error(format!(
                    "malformed WSJT-X datagram from {from}: {e}"
                )))];
            }
        };
        tracing::trace!(from = %from, id = %packet.id, kind = ?packet.message.kind(), "WSJT-X datagram");

        self.last_rx = Some(now);
        let mut actions = Vec::new();

        match packet.message {
            Message::Heartbeat(hb) => {
                self.learn_peer(&packet.id, from, Some(&hb), &mut actions);
                actions.push(Action::Send(Datagram {
                    to: from,
                    bytes: codec::encode(&Packet {
                        schema: negotiated_schema(hb.max_schema),
                        id: packet.id.clone(),
                        message: Message::Heartbeat(Heartbeat {
                            max_schema: SCHEMA,
                            version: Some(self.client_version.clone()),
                            revision: Some(String::new()),
                        }),
                    }),
                }));
            }
            Message::Status(status) => {
                self.learn_peer(&packet.id, from, None, &mut actions);
                actions.push(Action::Emit(AdapterEvent::Status(status)));
            }
            Message::Decode(decode) => actions.push(Action::Emit(AdapterEvent::Decode(decode))),
            Message::Clear { window } => actions.push(Action::Emit(AdapterEvent::Cleared { window })),
            Message::QsoLogged(qso) => actions.push(Action::Emit(AdapterEvent::QsoLogged(qso))),
            Message::LoggedAdif { adif } => actions.push(Action::Emit(AdapterEvent::LoggedAdif(adif))),
            Message::Close => {
                if self.peer.as_ref().is_some_and(|p| p.id == packet.id) {
                    actions.extend(self.drop_peer(DisconnectReason::Closed));
                }
            }
            other => {
                tracing::trace!(kind = ?other.kind(), "Ignoring WSJT-X message");
            }
        }
        actions
    }

    /// Drop the peer if it has been silent for the heartbeat timeout.
    ///
    /// Emits `Disconnected` exactly once per peer.
    pub fn check_timeout(&mut self, now: Instant) -> Vec<Action> {
        match self.deadline() {
            Some(deadline) if now >= deadline => {
                tracing::debug!(
                    timeout_s = self.heartbeat_timeout.as_secs(),
                    "WSJT-X heartbeat timeout"
                );
                self.drop_peer(DisconnectReason::Timeout)
            }
            _ => Vec::new(),
        }
    }

    /// Forget the peer. Used by the adapter on teardown and after a socket error.
    pub fn drop_peer(&mut self, reason: DisconnectReason) -> Vec<Action> {
        self.highlighted.clear();
        self.last_rx = None;
        match self.peer.take() {
            Some(peer) => {
                tracing::debug!(id = %peer.id, reason = ?reason, "WSJT-X peer gone");
                vec![Action::Emit(AdapterEvent::Disconnected { reason })]
            }
            None => Vec::new(),
        }
    }

    fn learn_peer(
        &mut self,
        id: &str,
        from: SocketAddr,
        heartbeat: Option<&Heartbeat>,
        actions: &mut Vec<Action>,
    ) {
        if let Some(peer) = self.peer.as_mut() {
            if peer.id != id {
                tracing::trace!(known = %peer.id, other = %id, "Ignoring second WSJT-X instance");
                return;
            }
            peer.addr = from;
            if let Some(hb) = heartbeat {
                peer.version = hb.version.clone();
                peer.schema = negotiated_schema(hb.max_schema);
            }
            return;
        }

        let version = heartbeat.and_then(|hb| hb.version.clone());
        tracing::debug!(id = %id, addr = %from, version = ?version, "WSJT-X peer connected");
        self.peer = Some(Peer {
            id: id.to_string(),
            addr: from,
            version: version.clone(),
            schema: heartbeat.map_or(SCHEMA, |hb| negotiated_schema(hb.max_schema)),
        });
        actions.push(Action::Emit(AdapterEvent::Connected {
            peer: id.to_string(),
            detail: version,
        }));
    }

    fn to_peer(&self, message: Message) -> Option<Datagram> {
        let peer = self.peer.as_ref()?;
        Some(Datagram {
            to: peer.addr,
            bytes: codec::encode(&Packet {
                schema: peer.schema,
                id: peer.id.clone(),
                message,
            }),
        })
    }

    // -----------------------------------------------------------------------
    // Outbound commands. Each returns `None` until a peer is known.
    // -----------------------------------------------------------------------

    /// Answer `decode` as if the operator double-clicked it.
    pub fn reply(&self, decode: &Decode, modifiers: u8) -> Option<Datagram> {
        self.to_peer(Message::Reply(Reply::to_decode(decode, modifiers)))
    }

    /// Stop transmitting; with `auto_tx_only` only auto-sequencing is disabled.
    pub fn halt_tx(&self, auto_tx_only: bool) -> Option<Datagram> {
        self.to_peer(Message::HaltTx { auto_tx_only })
    }

    /// Set text in the free-text box and optionally queue it for sending.
    pub fn free_text(&self, text: &str, send: bool) -> Option<Datagram> {
        self.to_peer(Message::FreeText {
            text: text.to_string(),
            send,
        })
    }

    /// Ask the peer to resend every decode in its band-activity window.
    pub fn replay(&self) -> Option<Datagram> {
        self.to_peer(Message::Replay)
    }

    /// Highlight `callsign`, or clear its highlight when both colours are `None`.
    pub fn highlight_callsign(
        &mut self,
        callsign: &str,
        background: Option<Rgba>,
        foreground: Option<Rgba>,
        highlight_last: bool,
    ) -> Option<Datagram> {
        let callsign = callsign.trim().to_uppercase();
        let highlight = Highlight {
            callsign: callsign.clone(),
            background,
            foreground,
            highlight_last,
        };
        let is_clear = highlight.is_clear();
        let datagram = self.to_peer(Message::HighlightCallsign(highlight))?;
        if is_clear {
            self.highlighted.remove(&callsign);
        } else {
            self.highlighted.insert(callsign);
        }
        Some(datagram)
    }

    /// Clear every highlight this session set.
    pub fn clear_highlights(&mut self) -> Vec<Datagram> {
        let calls = std::mem::take(&mut self.highlighted);
        calls
            .into_iter()
            .filter_map(|call| {
                self.to_peer(Message::HighlightCallsign(Highlight {
                    callsign: call,
                    background: None,
                    foreground: None,
                    highlight_last: false,
                }))
            })
            .collect()
    }
}

fn negotiated_schema(peer_max: u32) -> u32 {
    peer_max.clamp(2, SCHEMA)
}
