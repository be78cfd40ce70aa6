//! SmartSDR line codec.
//!
//! Everything on the command port (TCP 4992) is one ASCII line per frame.
//! The client sends sequenced commands; the radio answers each with a
//! response line and pushes handshake and status lines on its own.
//!
//! # Line shapes
//!
//! ```text
//! Command:   C<seq>|<command_text>\n
//! Response:  R<seq>|<hex_error_code>|<response_data>\n
//! Status:    S<hex_handle>|<object> <key>=<value> ...\n
//! Message:   M<seq>|<text>\n
//! Version:   V<major>.<minor>.<patch>.<build>\n
//! Handle:    H<hex_handle>\n
//! ```
//!
//! Nothing here touches a socket.

use std::fmt;

use hamlink_core::{Error, Result, Spot, hz_to_mhz};

/// Byte SmartSDR expects in place of a space inside a quoted value.
pub const SPACE_SUBSTITUTE: char = '\u{7f}';

// ---------------------------------------------------------------------------
// Command encoding
// ---------------------------------------------------------------------------

/// Encode a SmartSDR command with the given sequence number.
///
/// Format: `C<seq>|<command>\n`
pub fn encode_command(seq: u32, command: &str) -> Vec<u8> {
    format!("C{seq}|{command}\n").into_bytes()
}

/// Replace spaces with [`SPACE_SUBSTITUTE`] so a free-text value survives
/// the radio's whitespace tokenizer.
pub fn encode_text(text: &str) -> String {
    text.trim().replace(' ', "\u{7f}")
}

// ---------------------------------------------------------------------------
// Command builders
//
// Each builder returns the command string WITHOUT the `C<seq>|` prefix.
// The prefix is added by the adapter when it assigns a sequence number.
// ---------------------------------------------------------------------------

/// Build a subscribe command.
///
/// Example output: `"sub client all"`
pub fn cmd_subscribe(object: &str) -> String {
    format!("sub {object}")
}

/// Bind this connection to another client's permission context.
///
/// Example output: `"client bind client_id=5A2C..."`
pub fn cmd_client_bind(client_id: &str) -> String {
    format!("client bind client_id={client_id}")
}

/// Marker parameters that are fixed per adapter rather than per spot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotDefaults {
    /// `source=` tag; removals only match markers carrying the same tag.
    pub source: String,
    /// What the radio does when the marker is clicked.
    pub trigger_action: String,
    /// Seconds before the radio expires the marker on its own.
    pub lifetime_seconds: u32,
}

/// Build a spot add command.
///
/// Example output:
/// `"spot add rx_freq=14.062000 callsign=K1ABC mode=CW color=#FF4CAF50 source=POTACAT trigger_action=tune lifetime_seconds=600 comment=US-1234"`
pub fn cmd_spot_add(spot: &Spot, defaults: &SpotDefaults) -> String {
    let mut cmd = format!(
        "spot add rx_freq={:.6} callsign={} mode={} color=#{:08X} source={} trigger_action={} lifetime_seconds={}",
        hz_to_mhz(spot.freq_hz),
        spot.callsign,
        spot.mode,
        spot.source.color_argb(),
        defaults.source,
        defaults.trigger_action,
        defaults.lifetime_seconds,
    );
    let comment = encode_text(&spot.description());
    if !comment.is_empty() {
        cmd.push_str(" comment=");
        cmd.push_str(&comment);
    }
    cmd
}

/// Build a spot remove command.
///
/// Example output: `"spot remove callsign=K1ABC source=POTACAT"`
pub fn cmd_spot_remove(callsign: &str, source: &str) -> String {
    format!("spot remove callsign={callsign} source={source}")
}

/// Build a spot clear command.
pub fn cmd_spot_clear() -> String {
    "spot clear".to_string()
}

/// Build a slice tune command.
///
/// Example output: `"slice tune 0 14.250000 autopan=1"`
pub fn cmd_slice_tune(slice_index: u8, freq_hz: u64) -> String {
    format!("slice tune {} {:.6} autopan=1", slice_index, hz_to_mhz(freq_hz))
}

/// Build a slice set mode command.
///
/// Example output: `"slice set 0 mode=USB"`
pub fn cmd_slice_set_mode(slice_index: u8, mode: &str) -> String {
    format!("slice set {slice_index} mode={mode}")
}

/// Build a slice set filter command.
///
/// Example output: `"slice set 0 filter_lo=100 filter_hi=2900"`
pub fn cmd_slice_set_filter(slice_index: u8, lo: i32, hi: i32) -> String {
    format!("slice set {slice_index} filter_lo={lo} filter_hi={hi}")
}

fn with_client_handle(mut cmd: String, client_handle: Option<u32>) -> String {
    if let Some(h) = client_handle {
        cmd.push_str(&format!(" client_handle=0x{h:08X}"));
    }
    cmd
}

/// Build a CW key command.
///
/// Example output: `"cw key 1 time=0x1A2B index=7 client_handle=0x4C0FFEE0"`
pub fn cmd_cw_key(down: bool, time: u16, index: u32, client_handle: Option<u32>) -> String {
    with_client_handle(
        format!("cw key {} time=0x{time:04X} index={index}", u8::from(down)),
        client_handle,
    )
}

/// Build a CW PTT command.
///
/// Example output: `"cw ptt 0 time=0x1A2B index=8"`
pub fn cmd_cw_ptt(on: bool, time: u16, index: u32, client_handle: Option<u32>) -> String {
    with_client_handle(
        format!("cw ptt {} time=0x{time:04X} index={index}", u8::from(on)),
        client_handle,
    )
}

/// Build a CW speed command.
///
/// Example output: `"cw wpm 25"`
pub fn cmd_cw_wpm(wpm: u8) -> String {
    format!("cw wpm {wpm}")
}

// ---------------------------------------------------------------------------
// Response / status / message types
// ---------------------------------------------------------------------------

/// An `R` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmartSdrResponse {
    /// Sequence number of the command being answered.
    pub sequence: u32,
    /// Zero on success.
    pub error_code: u32,
    /// Response data (may be empty).
    pub message: String,
}

impl SmartSdrResponse {
    /// The response data on success, [`Error::Rejected`] otherwise.
    pub fn check(&self) -> Result<&str> {
        if self.error_code == 0 {
            Ok(&self.message)
        } else {
            Err(Error::Rejected {
                code: self.error_code,
                message: self.message.clone(),
            })
        }
    }
}

/// An `S` line, pushed for subscribed objects.
#[derive(Debug, Clone, PartialEq)]
pub struct SmartSdrStatus {
    /// Handle of the client the status is addressed to.
    pub handle: u32,
    /// The object identifier (e.g. `"client 0x4C0FFEE0 connected"`, `"radio"`).
    pub object: String,
    /// `key=value` pairs in line order.
    pub params: Vec<(String, String)>,
}

impl SmartSdrStatus {
    /// Value of the first parameter named `key`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// The `V` handshake line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmartSdrVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build: u32,
}

impl fmt::Display for SmartSdrVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.patch, self.build)
    }
}

/// One inbound line, classified by its leading character.
#[derive(Debug, Clone, PartialEq)]
pub enum SmartSdrMessage {
    /// `V1.4.0.0`
    Version(SmartSdrVersion),
    /// `H12345678`, the handle assigned to this connection.
    Handle(u32),
    /// `R<seq>|<status>|<text>`
    Response(SmartSdrResponse),
    /// `S<handle>|<object> <key>=<value>...`
    Status(SmartSdrStatus),
    /// `M<seq>|<text>`
    Message(String),
    /// An unrecognised line.
    Unknown(String),
}

// ---------------------------------------------------------------------------
// Message parsing
// ---------------------------------------------------------------------------

/// Classify and parse one inbound line.
///
/// The line should NOT include the trailing `\n`. Leading/trailing whitespace
/// is stripped for robustness.
pub fn parse_message(line: &str) -> Result<SmartSdrMessage> {
    let line = line.trim();
    let Some(first) = line.chars().next() else {
        return Err(Error::Protocol("empty line".into()));
    };
    let body = &line[first.len_utf8()..];

    match first {
        'V' => parse_version(body, line),
        'H' => parse_handle(body),
        'R' => parse_response(body, line),
        'S' => parse_status(body, line),
        'M' => parse_msg(body, line),
        _ => Ok(SmartSdrMessage::Unknown(line.to_string())),
    }
}

/// Parse a version line body: `<major>.<minor>.<patch>.<build>`
fn parse_version(body: &str, line: &str) -> Result<SmartSdrMessage> {
    let parts: Vec<&str> = body.split('.').collect();
    if parts.len() != 4 {
        return Err(Error::Protocol(format!("invalid version format: {line}")));
    }

    let parse_u32 = |s: &str| -> Result<u32> {
        s.parse::<u32>()
            .map_err(|_| Error::Protocol(format!("invalid version number: {s}")))
    };

    Ok(SmartSdrMessage::Version(SmartSdrVersion {
        major: parse_u32(parts[0])?,
        minor: parse_u32(parts[1])?,
        patch: parse_u32(parts[2])?,
        build: parse_u32(parts[3])?,
    }))
}

fn parse_hex(s: &str) -> Option<u32> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u32::from_str_radix(digits, 16).ok()
}

/// Parse a handle line body: `<hex_digits>`
fn parse_handle(body: &str) -> Result<SmartSdrMessage> {
    let handle =
        parse_hex(body).ok_or_else(|| Error::Protocol(format!("invalid hex handle: {body}")))?;
    Ok(SmartSdrMessage::Handle(handle))
}

/// Parse a response line body: `<seq>|<hex_error_code>|<response_data>`
fn parse_response(body: &str, line: &str) -> Result<SmartSdrMessage> {
    let mut parts = body.splitn(3, '|');
    let (Some(seq), Some(code)) = (parts.next(), parts.next()) else {
        return Err(Error::Protocol(format!(
            "malformed response (need at least seq|error): {line}"
        )));
    };

    let sequence = seq
        .parse::<u32>()
        .map_err(|_| Error::Protocol(format!("invalid response sequence number: {seq}")))?;
    let error_code = parse_hex(code)
        .ok_or_else(|| Error::Protocol(format!("invalid response error code: {code}")))?;

    Ok(SmartSdrMessage::Response(SmartSdrResponse {
        sequence,
        error_code,
        message: parts.next().unwrap_or_default().to_string(),
    }))
}

/// Parse a status line body: `<hex_handle>|<object_type> [<key>=<value> ...]`
fn parse_status(body: &str, line: &str) -> Result<SmartSdrMessage> {
    let (handle_str, payload) = body
        .split_once('|')
        .ok_or_else(|| Error::Protocol(format!("malformed status (no pipe): {line}")))?;

    let handle = parse_hex(handle_str)
        .ok_or_else(|| Error::Protocol(format!("invalid status handle: {handle_str}")))?;

    // The leading run of tokens without '=' names the object; everything
    // after the first key=value token is parameters.
    let mut object_parts: Vec<&str> = Vec::new();
    let mut params: Vec<(String, String)> = Vec::new();
    for token in payload.split_whitespace() {
        match token.split_once('=') {
            Some((key, value)) => params.push((key.to_string(), value.to_string())),
            None if params.is_empty() => object_parts.push(token),
            None => {}
        }
    }

    Ok(SmartSdrMessage::Status(SmartSdrStatus {
        handle,
        object: object_parts.join(" "),
        params,
    }))
}

/// Parse a message line body: `<seq>|<text>`
fn parse_msg(body: &str, line: &str) -> Result<SmartSdrMessage> {
    let (_seq, text) = body
        .split_once('|')
        .ok_or_else(|| Error::Protocol(format!("malformed message (no pipe): {line}")))?;
    Ok(SmartSdrMessage::Message(text.to_string()))
}

// ---------------------------------------------------------------------------
// Status object parsers
// ---------------------------------------------------------------------------

/// A control client announced through `client` status broadcasts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStatus {
    /// Radio-assigned handle of the client.
    pub handle: u32,
    /// Persistent client UUID, present on `connected` announcements.
    pub client_id: Option<String>,
    /// Program name, e.g. `"SmartSDR-Win"`.
    pub program: Option<String>,
    /// The broadcast reports the client leaving.
    pub disconnected: bool,
}

/// Interpret a `client 0x<handle> ...` status.
///
/// Returns `None` for any other object.
pub fn parse_client_status(status: &SmartSdrStatus) -> Option<ClientStatus> {
    let mut tokens = status.object.split_whitespace();
    if tokens.next() != Some("client") {
        return None;
    }
    let handle = parse_hex(tokens.next()?)?;
    let disconnected = tokens.any(|t| t == "disconnected");
    Some(ClientStatus {
        handle,
        client_id: status
            .param("client_id")
            .filter(|id| !id.is_empty())
            .map(str::to_string),
        program: status.param("program").map(str::to_string),
        disconnected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hamlink_core::SpotSource;

    fn defaults() -> SpotDefaults {
        SpotDefaults {
            source: "POTACAT".into(),
            trigger_action: "tune".into(),
            lifetime_seconds: 600,
        }
    }

    // -- Encoding -----------------------------------------------------------

    #[test]
    fn encode_command_frames_sequence() {
        assert_eq!(encode_command(7, "sub client all"), b"C7|sub client all\n");
    }

    #[test]
    fn spot_add_full_line() {
        let spot = Spot::from_khz("k1abc", 14_062.0, "cw")
            .with_reference("US-1234")
            .with_park_name("Acadia National Park");
        assert_eq!(
            cmd_spot_add(&spot, &defaults()),
            "spot add rx_freq=14.062000 callsign=K1ABC mode=CW color=#FF4CAF50 \
             source=POTACAT trigger_action=tune lifetime_seconds=600 \
             comment=US-1234\u{7f}Acadia\u{7f}National\u{7f}Park"
        );
    }

    #[test]
    fn spot_add_uses_source_colour() {
        let spot = Spot::from_mhz("W2XYZ", 7.074, "FT8").with_source(SpotSource::Sota);
        let cmd = cmd_spot_add(&spot, &defaults());
        assert!(cmd.contains("color=#FFFF9800"));
        assert!(cmd.ends_with("comment=SOTA"));
    }

    #[test]
    fn spot_remove_and_clear() {
        assert_eq!(
            cmd_spot_remove("K1ABC", "POTACAT"),
            "spot remove callsign=K1ABC source=POTACAT"
        );
        assert_eq!(cmd_spot_clear(), "spot clear");
    }

    #[test]
    fn slice_commands() {
        assert_eq!(cmd_slice_tune(0, 14_250_000), "slice tune 0 14.250000 autopan=1");
        assert_eq!(cmd_slice_set_mode(1, "DIGU"), "slice set 1 mode=DIGU");
        assert_eq!(
            cmd_slice_set_filter(0, 100, 2900),
            "slice set 0 filter_lo=100 filter_hi=2900"
        );
    }

    #[test]
    fn cw_commands() {
        assert_eq!(cmd_cw_key(true, 0x1A2B, 7, None), "cw key 1 time=0x1A2B index=7");
        assert_eq!(
            cmd_cw_ptt(false, 5, 8, Some(0x4C0F_FEE0)),
            "cw ptt 0 time=0x0005 index=8 client_handle=0x4C0FFEE0"
        );
        assert_eq!(cmd_cw_wpm(25), "cw wpm 25");
    }

    #[test]
    fn encode_text_substitutes_spaces() {
        assert_eq!(encode_text(" a b "), "a\u{7f}b");
    }

    // -- Parsing ------------------------------------------------------------

    #[test]
    fn parse_version_line() {
        let msg = parse_message("V1.4.0.0").unwrap();
        let SmartSdrMessage::Version(v) = msg else {
            panic!("expected version");
        };
        assert_eq!(v.to_string(), "1.4.0.0");
    }

    #[test]
    fn parse_version_bad_format() {
        assert!(parse_message("V1.4").is_err());
    }

    #[test]
    fn parse_handle_line() {
        assert_eq!(
            parse_message("H4C0FFEE0").unwrap(),
            SmartSdrMessage::Handle(0x4C0F_FEE0)
        );
        assert!(parse_message("HXYZ").is_err());
    }

    #[test]
    fn parse_response_success_empty() {
        assert_eq!(
            parse_message("R12|0|").unwrap(),
            SmartSdrMessage::Response(SmartSdrResponse {
                sequence: 12,
                error_code: 0,
                message: String::new(),
            })
        );
    }

    #[test]
    fn parse_response_error_with_text() {
        let SmartSdrMessage::Response(r) = parse_message("R3|50000015|Unable to bind").unwrap()
        else {
            panic!("expected response");
        };
        assert_eq!(r.sequence, 3);
        assert_eq!(r.error_code, 0x5000_0015);
        assert_eq!(r.message, "Unable to bind");
        assert!(matches!(
            r.check(),
            Err(Error::Rejected { code: 0x5000_0015, .. })
        ));
    }

    #[test]
    fn parse_response_without_data_field() {
        let SmartSdrMessage::Response(r) = parse_message("R9|00000000").unwrap() else {
            panic!("expected response");
        };
        assert!(r.message.is_empty());
        assert_eq!(r.check().unwrap(), "");
    }

    #[test]
    fn parse_response_malformed() {
        assert!(parse_message("R12").is_err());
        assert!(parse_message("Rx|0|").is_err());
        assert!(parse_message("R1|zz|").is_err());
    }

    #[test]
    fn parse_status_splits_object_and_params() {
        let SmartSdrMessage::Status(s) =
            parse_message("S4C0FFEE0|client 0x12345678 connected client_id=ABC program=SmartSDR-Win")
                .unwrap()
        else {
            panic!("expected status");
        };
        assert_eq!(s.handle, 0x4C0F_FEE0);
        assert_eq!(s.object, "client 0x12345678 connected");
        assert_eq!(s.param("client_id"), Some("ABC"));
        assert_eq!(s.param("program"), Some("SmartSDR-Win"));
        assert_eq!(s.param("station"), None);
    }

    #[test]
    fn parse_status_malformed() {
        assert!(parse_message("S1234 radio").is_err());
        assert!(parse_message("Sqq|radio").is_err());
    }

    #[test]
    fn parse_message_and_unknown_lines() {
        assert_eq!(
            parse_message("M10000001|Client connected").unwrap(),
            SmartSdrMessage::Message("Client connected".into())
        );
        assert_eq!(
            parse_message("  Xgarbage  ").unwrap(),
            SmartSdrMessage::Unknown("Xgarbage".into())
        );
        assert!(parse_message("   ").is_err());
    }

    #[test]
    fn client_status_connected() {
        let SmartSdrMessage::Status(s) = parse_message(
            "S0|client 0x2A2B3C4D connected local_ptt=1 client_id=5A2C-11 program=SmartSDR-Win",
        )
        .unwrap() else {
            panic!("expected status");
        };
        assert_eq!(
            parse_client_status(&s),
            Some(ClientStatus {
                handle: 0x2A2B_3C4D,
                client_id: Some("5A2C-11".into()),
                program: Some("SmartSDR-Win".into()),
                disconnected: false,
            })
        );
    }

    #[test]
    fn client_status_disconnected() {
        let SmartSdrMessage::Status(s) =
            parse_message("S0|client 0x2A2B3C4D disconnected forced=0").unwrap()
        else {
            panic!("expected status");
        };
        let c = parse_client_status(&s).unwrap();
        assert!(c.disconnected);
        assert_eq!(c.client_id, None);
    }

    #[test]
    fn non_client_status_is_ignored() {
        let SmartSdrMessage::Status(s) = parse_message("S0|slice 0 RF_frequency=14.2").unwrap()
        else {
            panic!("expected status");
        };
        assert_eq!(parse_client_status(&s), None);
    }
}
