//! Core types used throughout hamlink.
//!
//! These types are the data handed across the adapter boundary: spots
//! flowing from the host to SDR panadapters, and decodes, QSOs, status
//! snapshots, and reception reports flowing back to the host.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::helpers::{khz_to_hz, mhz_to_hz};

/// Connection state of an adapter.
///
/// Owned by each adapter instance; transitions drive the
/// [`Connected`](crate::AdapterEvent::Connected) and
/// [`Disconnected`](crate::AdapterEvent::Disconnected) events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Not connected and not trying (initial state, or after `disconnect()`).
    #[default]
    Disconnected,
    /// A connect attempt is in flight or a reconnect is pending.
    Connecting,
    /// Bound to a local port, waiting for a peer to announce itself.
    Listening,
    /// A peer or radio is reachable.
    Connected,
}

impl ConnectionState {
    /// Whether commands can currently be delivered.
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Listening => "listening",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Where a spot came from.
///
/// The source selects the marker colour pushed to SDR panadapters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum SpotSource {
    /// Parks on the Air.
    #[default]
    Pota,
    /// Summits on the Air.
    Sota,
    /// World Wide Flora & Fauna.
    Wwff,
    /// Lighthouses on the Air.
    Llota,
    /// A DX cluster spot.
    DxCluster,
    /// Reverse Beacon Network.
    Rbn,
    /// PSKReporter reception report.
    PskReporter,
    /// FreeDV reporter.
    FreeDv,
    /// Anything else, by name.
    Other(String),
}

impl SpotSource {
    /// Marker colour for this source as `0xAARRGGBB`.
    pub fn color_argb(&self) -> u32 {
        match self {
            SpotSource::Pota => 0xFF4C_AF50,
            SpotSource::Sota => 0xFFFF_9800,
            SpotSource::Wwff => 0xFF00_BCD4,
            SpotSource::Llota => 0xFFFF_EB3B,
            SpotSource::DxCluster => 0xFFE9_1E63,
            SpotSource::Rbn => 0xFF9C_27B0,
            SpotSource::PskReporter => 0xFF21_96F3,
            SpotSource::FreeDv => 0xFF79_5548,
            SpotSource::Other(_) => 0xFFBD_BDBD,
        }
    }

    /// Short display label.
    pub fn label(&self) -> &str {
        match self {
            SpotSource::Pota => "POTA",
            SpotSource::Sota => "SOTA",
            SpotSource::Wwff => "WWFF",
            SpotSource::Llota => "LLOTA",
            SpotSource::DxCluster => "DXC",
            SpotSource::Rbn => "RBN",
            SpotSource::PskReporter => "PSKR",
            SpotSource::FreeDv => "FreeDV",
            SpotSource::Other(name) => name,
        }
    }
}

impl fmt::Display for SpotSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A transient assertion that a callsign is active on a frequency.
///
/// Supplied by the host once per refresh cycle; adapters turn it into a
/// panadapter marker. Not owned by the adapter layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spot {
    /// Activator or DX callsign, as reported.
    pub callsign: String,
    /// Spot frequency in hertz.
    pub freq_hz: u64,
    /// Operating mode as the spotting network reports it (e.g. `"CW"`, `"FT8"`).
    pub mode: String,
    /// Spotting network the spot came from.
    pub source: SpotSource,
    /// Program reference (park, summit, or WWFF reference), if any.
    pub reference: Option<String>,
    /// Human-readable name for the reference.
    pub park_name: Option<String>,
}

impl Spot {
    /// Create a spot at a frequency given in hertz.
    pub fn new(callsign: &str, freq_hz: u64, mode: &str) -> Self {
        Spot {
            callsign: callsign.trim().to_uppercase(),
            freq_hz,
            mode: mode.trim().to_uppercase(),
            source: SpotSource::default(),
            reference: None,
            park_name: None,
        }
    }

    /// Create a spot at a frequency given in kilohertz.
    pub fn from_khz(callsign: &str, freq_khz: f64, mode: &str) -> Self {
        Self::new(callsign, khz_to_hz(freq_khz), mode)
    }

    /// Create a spot at a frequency given in megahertz.
    pub fn from_mhz(callsign: &str, freq_mhz: f64, mode: &str) -> Self {
        Self::new(callsign, mhz_to_hz(freq_mhz), mode)
    }

    /// Set the spotting source.
    pub fn with_source(mut self, source: SpotSource) -> Self {
        self.source = source;
        self
    }

    /// Set the program reference (e.g. `"US-1234"`).
    pub fn with_reference(mut self, reference: &str) -> Self {
        self.reference = Some(reference.to_string());
        self
    }

    /// Set the reference's display name.
    pub fn with_park_name(mut self, name: &str) -> Self {
        self.park_name = Some(name.to_string());
        self
    }

    /// Free-text marker description: reference and park name when known.
    pub fn description(&self) -> String {
        match (&self.reference, &self.park_name) {
            (Some(r), Some(n)) => format!("{r} {n}"),
            (Some(r), None) => r.clone(),
            (None, Some(n)) => n.clone(),
            (None, None) => self.source.label().to_string(),
        }
    }
}

/// One parsed digital-mode reception event.
#[derive(Debug, Clone, PartialEq)]
pub struct Decode {
    /// `true` for a fresh decode, `false` when replayed.
    pub is_new: bool,
    /// Time of day the period started, in milliseconds since midnight UTC.
    pub time_ms: u32,
    /// Signal-to-noise ratio in dB.
    pub snr: i32,
    /// Time offset in seconds.
    pub delta_time: f64,
    /// Audio frequency offset in hertz.
    pub delta_freq: u32,
    /// Mode character as sent by the decoder (`"~"` for FT8, `"+"` for FT4, ...).
    pub mode: String,
    /// The decoded message text.
    pub message: String,
    /// Decoder flagged the decode as low confidence.
    pub low_confidence: bool,
    /// Decode came from a replayed recording rather than the air.
    pub off_air: bool,
    /// Station sending the message (the one the host would reply to).
    pub dx_call: String,
    /// Station the message is addressed to, empty for CQ.
    pub de_call: String,
}

/// Snapshot of a digital-mode application's state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DigitalStatus {
    /// Dial frequency in hertz.
    pub dial_freq_hz: u64,
    /// Current mode name (e.g. `"FT8"`).
    pub mode: String,
    /// Callsign selected as DX.
    pub dx_call: String,
    /// Signal report to send.
    pub report: String,
    /// Transmit mode name.
    pub tx_mode: String,
    /// Auto-sequencing transmit enabled.
    pub tx_enabled: bool,
    /// Currently transmitting.
    pub transmitting: bool,
    /// Currently decoding.
    pub decoding: bool,
    /// Receive audio offset in hertz.
    pub rx_df: u32,
    /// Transmit audio offset in hertz.
    pub tx_df: u32,
    /// Operator callsign.
    pub de_call: String,
    /// Operator grid.
    pub de_grid: String,
    /// DX grid.
    pub dx_grid: String,
    /// Transmit watchdog tripped.
    pub tx_watchdog: bool,
    /// Sub-mode name.
    pub sub_mode: String,
    /// Fast mode enabled.
    pub fast_mode: bool,
    /// Special operating activity selector, when the sender includes it.
    pub special_op_mode: Option<u8>,
    /// Decode frequency tolerance in hertz, when the sender includes it.
    pub frequency_tolerance: Option<u32>,
    /// T/R period in seconds, when the sender includes it.
    pub tr_period: Option<u32>,
    /// Active configuration name, when the sender includes it.
    pub configuration_name: Option<String>,
    /// Message currently being transmitted, when the sender includes it.
    pub tx_message: Option<String>,
}

/// A QSO logged by a digital-mode application.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QsoLogged {
    /// QSO end time.
    pub time_off: Option<DateTime<Utc>>,
    /// Worked station.
    pub dx_call: String,
    /// Worked station's grid.
    pub dx_grid: String,
    /// Transmit frequency in hertz.
    pub tx_freq_hz: u64,
    /// Mode name.
    pub mode: String,
    /// Report sent.
    pub report_sent: String,
    /// Report received.
    pub report_received: String,
    /// Transmit power as entered by the operator.
    pub tx_power: String,
    /// Free-text comments.
    pub comments: String,
    /// Worked operator's name.
    pub name: String,
    /// QSO start time.
    pub time_on: Option<DateTime<Utc>>,
    /// Operator callsign, when the sender includes it.
    pub operator_call: Option<String>,
    /// Own callsign, when the sender includes it.
    pub my_call: Option<String>,
    /// Own grid, when the sender includes it.
    pub my_grid: Option<String>,
    /// Contest exchange sent, when the sender includes it.
    pub exchange_sent: Option<String>,
    /// Contest exchange received, when the sender includes it.
    pub exchange_received: Option<String>,
    /// ADIF propagation mode, when the sender includes it.
    pub adif_propagation_mode: Option<String>,
}

/// One reception report from a spotting feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceptionReport {
    /// Transmitting station.
    pub sender_callsign: String,
    /// Reporting station.
    pub receiver_callsign: Option<String>,
    /// Frequency in hertz.
    pub freq_hz: u64,
    /// Signal-to-noise ratio in dB.
    pub snr: Option<i32>,
    /// Mode name.
    pub mode: Option<String>,
    /// Transmitting station's locator.
    pub sender_locator: Option<String>,
    /// Reporting station's locator.
    pub receiver_locator: Option<String>,
    /// Report time as Unix seconds.
    pub flow_start_seconds: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spot_normalizes_callsign_and_mode() {
        let spot = Spot::new(" k1abc ", 14_074_000, "ft8");
        assert_eq!(spot.callsign, "K1ABC");
        assert_eq!(spot.mode, "FT8");
        assert_eq!(spot.source, SpotSource::Pota);
    }

    #[test]
    fn spot_frequency_constructors_agree() {
        let a = Spot::from_khz("K1ABC", 14_074.0, "FT8");
        let b = Spot::from_mhz("K1ABC", 14.074, "FT8");
        assert_eq!(a.freq_hz, 14_074_000);
        assert_eq!(a.freq_hz, b.freq_hz);
    }

    #[test]
    fn spot_description_prefers_reference_and_name() {
        let spot = Spot::from_khz("K1ABC", 7_030.0, "CW")
            .with_reference("US-1234")
            .with_park_name("Acadia");
        assert_eq!(spot.description(), "US-1234 Acadia");

        let bare = Spot::from_khz("K1ABC", 7_030.0, "CW").with_source(SpotSource::Sota);
        assert_eq!(bare.description(), "SOTA");
    }

    #[test]
    fn source_colors_are_opaque() {
        for source in [
            SpotSource::Pota,
            SpotSource::Sota,
            SpotSource::Wwff,
            SpotSource::DxCluster,
            SpotSource::Other("X".into()),
        ] {
            assert_eq!(source.color_argb() >> 24, 0xFF, "{source} not opaque");
        }
    }

    #[test]
    fn connection_state_display() {
        assert_eq!(ConnectionState::Listening.to_string(), "listening");
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
    }
}
