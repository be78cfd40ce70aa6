//! WSJT-X NetworkMessage codec.
//!
//! Every datagram shares one envelope, all big-endian:
//!
//! ```text
//! u32 magic (0xADBCCBDA) | u32 schema | u32 message type | utf8 id | payload
//! ```
//!
//! `utf8` is a u32 byte length followed by UTF-8 bytes; a length of
//! `0xFFFFFFFF` is Qt's null string, which is kept distinct from the empty
//! string as `None` vs `Some("")`. Dates are a 64-bit Julian day number,
//! times are milliseconds since midnight, and date-times add a time-spec
//! byte (plus an offset in seconds for time-spec 2).
//!
//! Newer WSJT-X releases append fields to STATUS and QSO_LOGGED. Decoding
//! reads those trailing fields only while bytes remain, so datagrams from
//! older senders decode with the fields set to `None`. Encoding writes
//! trailing fields up to the first absent one.
//!
//! This module is pure: no I/O, no clocks.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use hamlink_core::{Decode, DigitalStatus, Error, QsoLogged, Result};

use crate::callsign::extract_calls;

/// Envelope magic number.
pub const MAGIC: u32 = 0xADBC_CBDA;

/// Schema number this codec writes.
pub const SCHEMA: u32 = 3;

/// Qt's null-string length marker.
const NULL_STRING: u32 = 0xFFFF_FFFF;

/// Julian day number of 1970-01-01.
pub const UNIX_EPOCH_JULIAN_DAY: i64 = 2_440_588;

const MS_PER_DAY: i64 = 86_400_000;

/// Qt's null QDate.
const NULL_JULIAN_DAY: i64 = i64::MIN;

/// Qt's null QTime.
const NULL_TIME: u32 = 0xFFFF_FFFF;

// ---------------------------------------------------------------------------
// Message catalogue
// ---------------------------------------------------------------------------

/// Message type numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageType {
    Heartbeat = 0,
    Status = 1,
    Decode = 2,
    Clear = 3,
    Reply = 4,
    QsoLogged = 5,
    Close = 6,
    Replay = 7,
    HaltTx = 8,
    FreeText = 9,
    WsprDecode = 10,
    Location = 11,
    LoggedAdif = 12,
    HighlightCallsign = 13,
    SwitchConfiguration = 14,
    Configure = 15,
}

impl MessageType {
    /// Map a wire type number to a message type.
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => Self::Heartbeat,
            1 => Self::Status,
            2 => Self::Decode,
            3 => Self::Clear,
            4 => Self::Reply,
            5 => Self::QsoLogged,
            6 => Self::Close,
            7 => Self::Replay,
            8 => Self::HaltTx,
            9 => Self::FreeText,
            10 => Self::WsprDecode,
            11 => Self::Location,
            12 => Self::LoggedAdif,
            13 => Self::HighlightCallsign,
            14 => Self::SwitchConfiguration,
            15 => Self::Configure,
            _ => return None,
        })
    }
}

/// An 8-bit-per-channel colour. `None` where a colour is optional means
/// Qt's invalid colour, which WSJT-X reads as "clear this highlight".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    /// Opaque colour from red/green/blue.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Rgba { r, g, b, a: 0xFF }
    }

    /// Colour from a packed `0xAARRGGBB` value.
    pub const fn from_argb(argb: u32) -> Self {
        Rgba {
            a: (argb >> 24) as u8,
            r: (argb >> 16) as u8,
            g: (argb >> 8) as u8,
            b: argb as u8,
        }
    }
}

/// HEARTBEAT payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heartbeat {
    /// Highest schema the sender understands.
    pub max_schema: u32,
    pub version: Option<String>,
    pub revision: Option<String>,
}

/// REPLY payload: asks WSJT-X to answer a decode as if double-clicked.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub time_ms: u32,
    pub snr: i32,
    pub delta_time: f64,
    pub delta_freq: u32,
    pub mode: String,
    pub message: String,
    pub low_confidence: bool,
    /// Keyboard modifier bits (0x02 Shift, 0x04 Ctrl, 0x08 Alt, 0x10 Meta).
    pub modifiers: u8,
}

impl Reply {
    /// Build a reply to an inbound decode.
    pub fn to_decode(decode: &Decode, modifiers: u8) -> Self {
        Reply {
            time_ms: decode.time_ms,
            snr: decode.snr,
            delta_time: decode.delta_time,
            delta_freq: decode.delta_freq,
            mode: decode.mode.clone(),
            message: decode.message.clone(),
            low_confidence: decode.low_confidence,
            modifiers,
        }
    }
}

/// HIGHLIGHT_CALLSIGN payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlight {
    pub callsign: String,
    pub background: Option<Rgba>,
    pub foreground: Option<Rgba>,
    /// Highlight only the most recent occurrence.
    pub highlight_last: bool,
}

impl Highlight {
    /// Whether this message removes an existing highlight.
    pub fn is_clear(&self) -> bool {
        self.background.is_none() && self.foreground.is_none()
    }
}

/// A decoded message body.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Heartbeat(Heartbeat),
    Status(Box<DigitalStatus>),
    /// Inbound decode, with `dx_call`/`de_call` derived from the text.
    Decode(Decode),
    /// CLEAR; the window selector is absent in older senders.
    Clear {
        window: Option<u8>,
    },
    Reply(Reply),
    QsoLogged(Box<QsoLogged>),
    Close,
    Replay,
    HaltTx {
        auto_tx_only: bool,
    },
    FreeText {
        text: String,
        send: bool,
    },
    Location {
        location: String,
    },
    LoggedAdif {
        adif: String,
    },
    HighlightCallsign(Highlight),
    /// A recognised type whose payload this codec does not interpret.
    Unhandled(MessageType),
}

impl Message {
    /// The wire type of this message.
    pub fn kind(&self) -> MessageType {
        match self {
            Message::Heartbeat(_) => MessageType::Heartbeat,
            Message::Status(_) => MessageType::Status,
            Message::Decode(_) => MessageType::Decode,
            Message::Clear { .. } => MessageType::Clear,
            Message::Reply(_) => MessageType::Reply,
            Message::QsoLogged(_) => MessageType::QsoLogged,
            Message::Close => MessageType::Close,
            Message::Replay => MessageType::Replay,
            Message::HaltTx { .. } => MessageType::HaltTx,
            Message::FreeText { .. } => MessageType::FreeText,
            Message::Location { .. } => MessageType::Location,
            Message::LoggedAdif { .. } => MessageType::LoggedAdif,
            Message::HighlightCallsign(_) => MessageType::HighlightCallsign,
            Message::Unhandled(kind) => *kind,
        }
    }
}

/// One datagram: sender id plus message.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Schema number from the envelope.
    pub schema: u32,
    /// Session id of the WSJT-X instance (e.g. `"WSJT-X"`).
    pub id: String,
    pub message: Message,
}

impl Packet {
    /// A packet with the current schema.
    pub fn new(id: &str, message: Message) -> Self {
        Packet {
            schema: SCHEMA,
            id: id.to_string(),
            message,
        }
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Big-endian cursor over a datagram.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn has_more(&self) -> bool {
        self.remaining() > 0
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self
            .buf
            .get(self.pos..self.pos + N)
            .ok_or_else(|| truncated(self.pos, N))?;
        self.pos += N;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take::<1>()?[0])
    }

    pub fn bool(&mut self) -> Result<bool> {
        Ok(self.u8()? != 0)
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.take()?))
    }

    pub fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.take()?))
    }

    pub fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.take()?))
    }

    pub fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.take()?))
    }

    pub fn f64(&mut self) -> Result<f64> {
        Ok(f64::from_be_bytes(self.take()?))
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take()?))
    }

    /// Length-prefixed UTF-8; `None` for the null string.
    pub fn utf8(&mut self) -> Result<Option<String>> {
        let len = self.u32()?;
        if len == NULL_STRING {
            return Ok(None);
        }
        let len = len as usize;
        let bytes = self
            .buf
            .get(self.pos..self.pos + len)
            .ok_or_else(|| truncated(self.pos, len))?;
        self.pos += len;
        String::from_utf8(bytes.to_vec())
            .map(Some)
            .map_err(|e| Error::Protocol(format!("invalid UTF-8 in string field: {e}")))
    }

    /// Like [`utf8`](Self::utf8), with null read as empty.
    pub fn text(&mut self) -> Result<String> {
        Ok(self.utf8()?.unwrap_or_default())
    }

    /// QTime: milliseconds since midnight, `None` when null.
    pub fn qtime(&mut self) -> Result<Option<u32>> {
        let ms = self.u32()?;
        Ok((ms != NULL_TIME).then_some(ms))
    }

    /// QDateTime as UTC. Local time is taken as UTC; an offset-from-UTC
    /// time-spec has the offset subtracted. Null dates become `None`.
    pub fn qdatetime(&mut self) -> Result<Option<DateTime<Utc>>> {
        let julian_day = self.i64()?;
        let ms = self.qtime()?;
        let spec = self.u8()?;
        let offset_s = match spec {
            0 | 1 => 0,
            2 => self.i32()?,
            other => {
                return Err(Error::Protocol(format!(
                    "unsupported QDateTime time spec {other}"
                )));
            }
        };
        if julian_day == NULL_JULIAN_DAY {
            return Ok(None);
        }
        Ok(julian_to_utc(julian_day, ms.unwrap_or(0))
            .map(|dt| dt - chrono::Duration::seconds(offset_s as i64)))
    }

    /// QColor; `None` for Qt's invalid colour.
    pub fn qcolor(&mut self) -> Result<Option<Rgba>> {
        let spec = self.u8()?;
        let a = self.u16()?;
        let r = self.u16()?;
        let g = self.u16()?;
        let b = self.u16()?;
        let _pad = self.u16()?;
        match spec {
            0 => Ok(None),
            1 => Ok(Some(Rgba {
                r: (r >> 8) as u8,
                g: (g >> 8) as u8,
                b: (b >> 8) as u8,
                a: (a >> 8) as u8,
            })),
            other => Err(Error::Protocol(format!("unsupported QColor spec {other}"))),
        }
    }
}

fn truncated(at: usize, wanted: usize) -> Error {
    Error::Protocol(format!("datagram truncated at byte {at} (wanted {wanted} more)"))
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Big-endian datagram builder.
#[derive(Debug, Default)]
pub struct Writer {
    buf: BytesMut,
}

impl Writer {
    pub fn new() -> Self {
        Writer {
            buf: BytesMut::with_capacity(128),
        }
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn bool(&mut self, v: bool) {
        self.buf.put_u8(v as u8);
    }

    pub fn u32(&mut self, v: u32) {
        self.buf.put_u32(v);
    }

    pub fn i32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    pub fn u64(&mut self, v: u64) {
        self.buf.put_u64(v);
    }

    pub fn i64(&mut self, v: i64) {
        self.buf.put_i64(v);
    }

    pub fn f64(&mut self, v: f64) {
        self.buf.put_f64(v);
    }

    pub fn utf8(&mut self, v: Option<&str>) {
        match v {
            None => self.buf.put_u32(NULL_STRING),
            Some(s) => {
                self.buf.put_u32(s.len() as u32);
                self.buf.put_slice(s.as_bytes());
            }
        }
    }

    pub fn qdatetime(&mut self, v: Option<DateTime<Utc>>) {
        match v {
            None => {
                self.i64(NULL_JULIAN_DAY);
                self.u32(NULL_TIME);
            }
            Some(dt) => {
                let (julian_day, ms) = utc_to_julian(dt);
                self.i64(julian_day);
                self.u32(ms);
            }
        }
        // Time spec: UTC.
        self.u8(1);
    }

    pub fn qcolor(&mut self, v: Option<Rgba>) {
        let widen = |c: u8| u16::from(c) * 0x101;
        match v {
            None => {
                self.u8(0);
                self.buf.put_u16(0xFFFF);
                self.buf.put_u16(0);
                self.buf.put_u16(0);
                self.buf.put_u16(0);
            }
            Some(c) => {
                self.u8(1);
                self.buf.put_u16(widen(c.a));
                self.buf.put_u16(widen(c.r));
                self.buf.put_u16(widen(c.g));
                self.buf.put_u16(widen(c.b));
            }
        }
        self.buf.put_u16(0);
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

// ---------------------------------------------------------------------------
// Date conversion
// ---------------------------------------------------------------------------

/// Convert a Julian day number and milliseconds-of-day to UTC.
pub fn julian_to_utc(julian_day: i64, ms_of_day: u32) -> Option<DateTime<Utc>> {
    let unix_day = julian_day.checked_sub(UNIX_EPOCH_JULIAN_DAY)?;
    let millis = unix_day
        .checked_mul(MS_PER_DAY)?
        .checked_add(ms_of_day as i64)?;
    DateTime::from_timestamp_millis(millis)
}

/// Convert UTC to a Julian day number and milliseconds-of-day.
pub fn utc_to_julian(dt: DateTime<Utc>) -> (i64, u32) {
    let millis = dt.timestamp_millis();
    (
        millis.div_euclid(MS_PER_DAY) + UNIX_EPOCH_JULIAN_DAY,
        millis.rem_euclid(MS_PER_DAY) as u32,
    )
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode one datagram.
///
/// Fails on a bad magic number, an unknown message type, or a truncated
/// payload. Unknown trailing bytes after the known fields are ignored.
pub fn decode(data: &[u8]) -> Result<Packet> {
    let mut r = Reader::new(data);

    let magic = r.u32()?;
    if magic != MAGIC {
        return Err(Error::Protocol(format!("bad magic 0x{magic:08X}")));
    }
    let schema = r.u32()?;
    let type_num = r.u32()?;
    let kind = MessageType::from_u32(type_num)
        .ok_or_else(|| Error::Protocol(format!("unknown message type {type_num}")))?;
    let id = r.text()?;

    let message = match kind {
        MessageType::Heartbeat => Message::Heartbeat(Heartbeat {
            max_schema: r.u32()?,
            version: optional_utf8(&mut r)?,
            revision: optional_utf8(&mut r)?,
        }),
        MessageType::Status => Message::Status(Box::new(decode_status(&mut r)?)),
        MessageType::Decode => Message::Decode(decode_decode(&mut r)?),
        MessageType::Clear => Message::Clear {
            window: if r.has_more() { Some(r.u8()?) } else { None },
        },
        MessageType::Reply => Message::Reply(Reply {
            time_ms: r.qtime()?.unwrap_or(0),
            snr: r.i32()?,
            delta_time: r.f64()?,
            delta_freq: r.u32()?,
            mode: r.text()?,
            message: r.text()?,
            low_confidence: r.bool()?,
            modifiers: if r.has_more() { r.u8()? } else { 0 },
        }),
        MessageType::QsoLogged => Message::QsoLogged(Box::new(decode_qso_logged(&mut r)?)),
        MessageType::Close => Message::Close,
        MessageType::Replay => Message::Replay,
        MessageType::HaltTx => Message::HaltTx {
            auto_tx_only: r.bool()?,
        },
        MessageType::FreeText => Message::FreeText {
            text: r.text()?,
            send: if r.has_more() { r.bool()? } else { false },
        },
        MessageType::Location => Message::Location {
            location: r.text()?,
        },
        MessageType::LoggedAdif => Message::LoggedAdif { adif: r.text()? },
        MessageType::HighlightCallsign => Message::HighlightCallsign(Highlight {
            callsign: r.text()?,
            background: r.qcolor()?,
            foreground: r.qcolor()?,
            highlight_last: if r.has_more() { r.bool()? } else { false },
        }),
        MessageType::WsprDecode | MessageType::SwitchConfiguration | MessageType::Configure => {
            Message::Unhandled(kind)
        }
    };

    Ok(Packet {
        schema,
        id,
        message,
    })
}

fn optional_utf8(r: &mut Reader<'_>) -> Result<Option<String>> {
    if r.has_more() { r.utf8() } else { Ok(None) }
}

fn decode_status(r: &mut Reader<'_>) -> Result<DigitalStatus> {
    let mut s = DigitalStatus {
        dial_freq_hz: r.u64()?,
        mode: r.text()?,
        dx_call: r.text()?,
        report: r.text()?,
        tx_mode: r.text()?,
        tx_enabled: r.bool()?,
        transmitting: r.bool()?,
        decoding: r.bool()?,
        rx_df: r.u32()?,
        tx_df: r.u32()?,
        de_call: r.text()?,
        de_grid: r.text()?,
        dx_grid: r.text()?,
        tx_watchdog: r.bool()?,
        sub_mode: r.text()?,
        fast_mode: r.bool()?,
        ..DigitalStatus::default()
    };
    if r.has_more() {
        s.special_op_mode = Some(r.u8()?);
    }
    if r.has_more() {
        s.frequency_tolerance = Some(r.u32()?);
    }
    if r.has_more() {
        s.tr_period = Some(r.u32()?);
    }
    if r.has_more() {
        s.configuration_name = r.utf8()?;
    }
    if r.has_more() {
        s.tx_message = r.utf8()?;
    }
    Ok(s)
}

fn decode_decode(r: &mut Reader<'_>) -> Result<Decode> {
    let is_new = r.bool()?;
    let time_ms = r.qtime()?.unwrap_or(0);
    let snr = r.i32()?;
    let delta_time = r.f64()?;
    let delta_freq = r.u32()?;
    let mode = r.text()?;
    let message = r.text()?;
    let low_confidence = if r.has_more() { r.bool()? } else { false };
    let off_air = if r.has_more() { r.bool()? } else { false };
    let (dx_call, de_call) = extract_calls(&message);
    Ok(Decode {
        is_new,
        time_ms,
        snr,
        delta_time,
        delta_freq,
        mode,
        message,
        low_confidence,
        off_air,
        dx_call,
        de_call,
    })
}

fn decode_qso_logged(r: &mut Reader<'_>) -> Result<QsoLogged> {
    let mut q = QsoLogged {
        time_off: r.qdatetime()?,
        dx_call: r.text()?,
        dx_grid: r.text()?,
        tx_freq_hz: r.u64()?,
        mode: r.text()?,
        report_sent: r.text()?,
        report_received: r.text()?,
        tx_power: r.text()?,
        comments: r.text()?,
        name: r.text()?,
        ..QsoLogged::default()
    };
    if r.has_more() {
        q.time_on = r.qdatetime()?;
    }
    q.operator_call = optional_utf8(r)?;
    q.my_call = optional_utf8(r)?;
    q.my_grid = optional_utf8(r)?;
    q.exchange_sent = optional_utf8(r)?;
    q.exchange_received = optional_utf8(r)?;
    q.adif_propagation_mode = optional_utf8(r)?;
    Ok(q)
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode a packet into one datagram.
pub fn encode(packet: &Packet) -> Bytes {
    let mut w = Writer::new();
    w.u32(MAGIC);
    w.u32(packet.schema);
    w.u32(packet.message.kind() as u32);
    w.utf8(Some(&packet.id));

    match &packet.message {
        Message::Heartbeat(hb) => {
            w.u32(hb.max_schema);
            w.utf8(hb.version.as_deref());
            w.utf8(hb.revision.as_deref());
        }
        Message::Status(s) => encode_status(&mut w, s),
        Message::Decode(d) => {
            w.bool(d.is_new);
            w.u32(d.time_ms);
            w.i32(d.snr);
            w.f64(d.delta_time);
            w.u32(d.delta_freq);
            w.utf8(Some(&d.mode));
            w.utf8(Some(&d.message));
            w.bool(d.low_confidence);
            w.bool(d.off_air);
        }
        Message::Clear { window } => {
            if let Some(window) = window {
                w.u8(*window);
            }
        }
        Message::Reply(reply) => {
            w.u32(reply.time_ms);
            w.i32(reply.snr);
            w.f64(reply.delta_time);
            w.u32(reply.delta_freq);
            w.utf8(Some(&reply.mode));
            w.utf8(Some(&reply.message));
            w.bool(reply.low_confidence);
            w.u8(reply.modifiers);
        }
        Message::QsoLogged(q) => encode_qso_logged(&mut w, q),
        Message::Close | Message::Replay | Message::Unhandled(_) => {}
        Message::HaltTx { auto_tx_only } => w.bool(*auto_tx_only),
        Message::FreeText { text, send } => {
            w.utf8(Some(text));
            w.bool(*send);
        }
        Message::Location { location } => w.utf8(Some(location)),
        Message::LoggedAdif { adif } => w.utf8(Some(adif)),
        Message::HighlightCallsign(h) => {
            w.utf8(Some(&h.callsign));
            w.qcolor(h.background);
            w.qcolor(h.foreground);
            w.bool(h.highlight_last);
        }
    }

    w.finish()
}

fn encode_status(w: &mut Writer, s: &DigitalStatus) {
    w.u64(s.dial_freq_hz);
    w.utf8(Some(&s.mode));
    w.utf8(Some(&s.dx_call));
    w.utf8(Some(&s.report));
    w.utf8(Some(&s.tx_mode));
    w.bool(s.tx_enabled);
    w.bool(s.transmitting);
    w.bool(s.decoding);
    w.u32(s.rx_df);
    w.u32(s.tx_df);
    w.utf8(Some(&s.de_call));
    w.utf8(Some(&s.de_grid));
    w.utf8(Some(&s.dx_grid));
    w.bool(s.tx_watchdog);
    w.utf8(Some(&s.sub_mode));
    w.bool(s.fast_mode);
    let _ = encode_status_tail(w, s);
}

fn encode_status_tail(w: &mut Writer, s: &DigitalStatus) -> Option<()> {
    w.u8(s.special_op_mode?);
    w.u32(s.frequency_tolerance?);
    w.u32(s.tr_period?);
    w.utf8(Some(s.configuration_name.as_deref()?));
    w.utf8(Some(s.tx_message.as_deref()?));
    Some(())
}

fn encode_qso_logged(w: &mut Writer, q: &QsoLogged) {
    w.qdatetime(q.time_off);
    w.utf8(Some(&q.dx_call));
    w.utf8(Some(&q.dx_grid));
    w.u64(q.tx_freq_hz);
    w.utf8(Some(&q.mode));
    w.utf8(Some(&q.report_sent));
    w.utf8(Some(&q.report_received));
    w.utf8(Some(&q.tx_power));
    w.utf8(Some(&q.comments));
    w.utf8(Some(&q.name));
    w.qdatetime(q.time_on);
    let _ = encode_qso_tail(w, q);
}

fn encode_qso_tail(w: &mut Writer, q: &QsoLogged) -> Option<()> {
    w.utf8(Some(q.operator_call.as_deref()?));
    w.utf8(Some(q.my_call.as_deref()?));
    w.utf8(Some(q.my_grid.as_deref()?));
    w.utf8(Some(q.exchange_sent.as_deref()?));
    w.utf8(Some(q.exchange_received.as_deref()?));
    w.utf8(Some(q.adif_propagation_mode.as_deref()?));
    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn envelope(kind: u32, id: &str) -> Writer {
        let mut w = Writer::new();
        w.u32(MAGIC);
        w.u32(SCHEMA);
        w.u32(kind);
        w.utf8(Some(id));
        w
    }

    #[test]
    fn heartbeat_keeps_null_and_empty_strings_apart() {
        let packet = Packet::new(
            "WSJT-X",
            Message::Heartbeat(Heartbeat {
                max_schema: 3,
                version: Some(String::new()),
                revision: None,
            }),
        );
        let bytes = encode(&packet);

        // version: length 0; revision: null marker.
        let tail = &bytes[bytes.len() - 8..];
        assert_eq!(tail, &[0, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn envelope_layout() {
        let bytes = encode(&Packet::new("ab", Message::Close));
        assert_eq!(
            &bytes[..],
            &[
                0xAD, 0xBC, 0xCB, 0xDA, // magic
                0, 0, 0, 3, // schema
                0, 0, 0, 6, // CLOSE
                0, 0, 0, 2, b'a', b'b',
            ]
        );
    }

    #[test]
    fn reply_round_trip() {
        let packet = Packet::new(
            "WSJT-X",
            Message::Reply(Reply {
                time_ms: 45_015_000,
                snr: -12,
                delta_time: 0.3,
                delta_freq: 1234,
                mode: "~".into(),
                message: "CQ K1ABC FN42".into(),
                low_confidence: false,
                modifiers: 0x02,
            }),
        );
        assert_eq!(decode(&encode(&packet)).unwrap(), packet);
    }

    #[test]
    fn halt_tx_round_trip() {
        for auto_tx_only in [true, false] {
            let packet = Packet::new("WSJT-X", Message::HaltTx { auto_tx_only });
            assert_eq!(decode(&encode(&packet)).unwrap(), packet);
        }
    }

    #[test]
    fn highlight_round_trip_with_invalid_colours() {
        let set = Highlight {
            callsign: "K1ABC".into(),
            background: Some(Rgba::from_argb(0xFF4C_AF50)),
            foreground: Some(Rgba::rgb(0, 0, 0)),
            highlight_last: true,
        };
        let clear = Highlight {
            callsign: "K1ABC".into(),
            background: None,
            foreground: None,
            highlight_last: false,
        };
        for h in [set, clear] {
            let packet = Packet::new("WSJT-X", Message::HighlightCallsign(h));
            assert_eq!(decode(&encode(&packet)).unwrap(), packet);
        }
    }

    #[test]
    fn qcolor_wire_layout() {
        let mut w = Writer::new();
        w.qcolor(Some(Rgba::rgb(0x12, 0x34, 0x56)));
        assert_eq!(
            &w.finish()[..],
            &[1, 0xFF, 0xFF, 0x12, 0x12, 0x34, 0x34, 0x56, 0x56, 0, 0]
        );
    }

    #[test]
    fn julian_epoch_is_unix_epoch() {
        let mut w = Writer::new();
        w.i64(2_440_588);
        w.u32(0);
        w.u8(1);
        let bytes = w.finish();
        let dt = Reader::new(&bytes).qdatetime().unwrap().unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(dt.to_rfc3339(), "1970-01-01T00:00:00+00:00");
    }

    #[test]
    fn qdatetime_offset_and_null() {
        let mut w = Writer::new();
        // 2024-06-01 12:00 at UTC+2 is 10:00Z.
        let (jd, _) = utc_to_julian(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        w.i64(jd);
        w.u32(12 * 3_600_000);
        w.u8(2);
        w.i32(7200);
        w.qdatetime(None);
        let bytes = w.finish();

        let mut r = Reader::new(&bytes);
        assert_eq!(
            r.qdatetime().unwrap(),
            Some(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(r.qdatetime().unwrap(), None);
        assert!(!r.has_more());
    }

    #[test]
    fn qso_logged_round_trip_with_timestamps() {
        let q = QsoLogged {
            time_off: Some(Utc.with_ymd_and_hms(2025, 3, 14, 15, 9, 26).unwrap()),
            dx_call: "W2XYZ".into(),
            dx_grid: "FN31".into(),
            tx_freq_hz: 14_074_000,
            mode: "FT8".into(),
            report_sent: "-10".into(),
            report_received: "-08".into(),
            tx_power: "100".into(),
            comments: "POTA US-1234".into(),
            name: String::new(),
            time_on: Some(Utc.with_ymd_and_hms(2025, 3, 14, 15, 8, 11).unwrap()),
            operator_call: Some("K1ABC".into()),
            my_call: Some("K1ABC".into()),
            my_grid: Some("FN42".into()),
            exchange_sent: Some(String::new()),
            exchange_received: Some(String::new()),
            adif_propagation_mode: Some(String::new()),
        };
        let packet = Packet::new("WSJT-X", Message::QsoLogged(Box::new(q)));
        assert_eq!(decode(&encode(&packet)).unwrap(), packet);
    }

    #[test]
    fn status_without_trailing_fields_decodes() {
        let mut w = envelope(1, "WSJT-X");
        w.u64(7_074_000);
        for s in ["FT8", "W2XYZ", "-12", "FT8"] {
            w.utf8(Some(s));
        }
        w.bool(true);
        w.bool(false);
        w.bool(true);
        w.u32(1500);
        w.u32(1200);
        for s in ["K1ABC", "FN42", "FN31"] {
            w.utf8(Some(s));
        }
        w.bool(false);
        w.utf8(None);
        w.bool(false);
        // Older sender: stops here.
        let packet = decode(&w.finish()).unwrap();

        let Message::Status(status) = packet.message else {
            panic!("expected Status, got {:?}", packet.message);
        };
        assert_eq!(status.dial_freq_hz, 7_074_000);
        assert_eq!(status.dx_call, "W2XYZ");
        assert_eq!(status.de_grid, "FN42");
        assert_eq!(status.sub_mode, "");
        assert_eq!(status.special_op_mode, None);
        assert_eq!(status.tr_period, None);
    }

    #[test]
    fn status_with_partial_tail_round_trips() {
        let status = DigitalStatus {
            dial_freq_hz: 14_074_000,
            mode: "FT8".into(),
            special_op_mode: Some(0),
            frequency_tolerance: Some(20),
            ..DigitalStatus::default()
        };
        let packet = Packet::new("WSJT-X", Message::Status(Box::new(status)));
        assert_eq!(decode(&encode(&packet)).unwrap(), packet);
    }

    #[test]
    fn decode_message_derives_calls() {
        let mut w = envelope(2, "WSJT-X");
        w.bool(true);
        w.u32(3_600_000);
        w.i32(-7);
        w.f64(0.1);
        w.u32(842);
        w.utf8(Some("~"));
        w.utf8(Some("W2XYZ K1ABC R-12"));
        w.bool(false);
        w.bool(false);

        let packet = decode(&w.finish()).unwrap();
        let Message::Decode(d) = packet.message else {
            panic!("expected Decode");
        };
        assert_eq!(d.snr, -7);
        assert_eq!(d.delta_freq, 842);
        assert_eq!(d.de_call, "W2XYZ");
        assert_eq!(d.dx_call, "K1ABC");
    }

    #[test]
    fn clear_window_is_optional() {
        let old = envelope(3, "WSJT-X").finish();
        assert_eq!(decode(&old).unwrap().message, Message::Clear { window: None });

        let mut w = envelope(3, "WSJT-X");
        w.u8(2);
        assert_eq!(
            decode(&w.finish()).unwrap().message,
            Message::Clear { window: Some(2) }
        );
    }

    #[test]
    fn configure_is_recognised_but_unhandled() {
        let mut w = envelope(15, "WSJT-X");
        w.utf8(Some("FT8"));
        assert_eq!(
            decode(&w.finish()).unwrap().message,
            Message::Unhandled(MessageType::Configure)
        );
    }

    #[test]
    fn malformed_datagrams_are_protocol_errors() {
        assert!(matches!(decode(&[0, 1, 2]), Err(Error::Protocol(_))));

        let mut w = Writer::new();
        w.u32(0xDEAD_BEEF);
        w.u32(3);
        assert!(matches!(decode(&w.finish()), Err(Error::Protocol(_))));

        let unknown = envelope(99, "WSJT-X").finish();
        assert!(matches!(decode(&unknown), Err(Error::Protocol(_))));

        let mut w = envelope(2, "WSJT-X");
        w.bool(true);
        w.u32(0);
        assert!(matches!(decode(&w.finish()), Err(Error::Protocol(_))));
    }
}
