//! TCI text command encoding and decoding.
//!
//! TCI (Transceiver Control Interface) runs over a WebSocket, default port
//! 50001. Each text frame carries one or more commands of the form
//! `name:arg1,arg2,...;` with the argument list optional (`ready;`).
//! Names are case-insensitive.
//!
//! All encoding/decoding in this module is pure parsing -- no I/O is performed.

use hamlink_core::Spot;

/// A command split into its name and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TciCommand {
    /// Lower-cased command name.
    pub name: String,
    /// Comma-separated arguments, each trimmed.
    pub args: Vec<String>,
}

impl TciCommand {
    /// Whether this is the server's `ready;` notification.
    pub fn is_ready(&self) -> bool {
        self.name == "ready"
    }
}

/// Split a text frame into its `;`-terminated commands.
///
/// Empty segments (trailing `;`, stray whitespace) are skipped.
pub fn split_commands(frame: &str) -> impl Iterator<Item = TciCommand> + '_ {
    frame
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_command)
}

/// Parse a single command without its terminating `;`.
pub fn parse_command(text: &str) -> TciCommand {
    let (name, args) = match text.split_once(':') {
        Some((name, args)) => (
            name,
            args.split(',').map(|a| a.trim().to_string()).collect(),
        ),
        None => (text, Vec::new()),
    };
    TciCommand {
        name: name.trim().to_ascii_lowercase(),
        args,
    }
}

/// Strip characters that would end an argument or a command.
fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| if c == ',' || c == ';' { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

// ---------------------------------------------------------------------------
// Command builders
// ---------------------------------------------------------------------------

/// Build a spot marker command.
///
/// Example output: `"spot:K1ABC,CW,14062000,4283215696,US-1234;"`
pub fn cmd_spot(spot: &Spot) -> String {
    format!(
        "spot:{},{},{},{},{};",
        spot.callsign,
        sanitize(&spot.mode),
        spot.freq_hz,
        spot.source.color_argb(),
        sanitize(&spot.description()),
    )
}

/// Build a spot delete command.
///
/// Example output: `"spot_delete:K1ABC;"`
pub fn cmd_spot_delete(callsign: &str) -> String {
    format!("spot_delete:{callsign};")
}

/// Remove every spot marker.
pub fn cmd_spot_clear() -> String {
    "spot_clear;".to_string()
}

/// Tune VFO `vfo` of receiver `rx`.
///
/// Example output: `"vfo:0,0,14074000;"`
pub fn cmd_vfo(rx: u8, vfo: u8, freq_hz: u64) -> String {
    format!("vfo:{rx},{vfo},{freq_hz};")
}

/// Set the demodulator of receiver `rx`.
///
/// Example output: `"modulation:0,usb;"`
pub fn cmd_modulation(rx: u8, mode: &str) -> String {
    format!("modulation:{rx},{mode};")
}

// ---------------------------------------------------------------------------
// Mode mapping
// ---------------------------------------------------------------------------

const DIGITAL_MODES: &[&str] = &[
    "FT8", "FT4", "JT65", "JT9", "JS8", "WSPR", "MSK144", "Q65", "PSK", "PSK31", "RTTY",
    "OLIVIA", "DATA", "DIGI", "FREEDV",
];

/// Map a host mode name to a TCI modulation for a receiver at `freq_hz`.
///
/// `SSB` resolves to `lsb` below 10 MHz and `usb` above. Returns `None`
/// when TCI has no equivalent.
pub fn to_tci_mode(mode: &str, freq_hz: u64) -> Option<&'static str> {
    let mode = mode.trim().to_ascii_uppercase();
    let tci = match mode.as_str() {
        "CW" => "cw",
        "USB" => "usb",
        "LSB" => "lsb",
        "SSB" | "PHONE" => {
            if freq_hz < 10_000_000 {
                "lsb"
            } else {
                "usb"
            }
        }
        "AM" => "am",
        "SAM" => "sam",
        "FM" | "NFM" => "nfm",
        "WFM" => "wfm",
        "DIGU" => "digu",
        "DIGL" => "digl",
        m if DIGITAL_MODES.contains(&m) => "digu",
        _ => return None,
    };
    Some(tci)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hamlink_core::SpotSource;

    #[test]
    fn split_frame_with_several_commands() {
        let cmds: Vec<TciCommand> =
            split_commands("protocol:ExpertSDR3,1.9; device:SunSDR2PRO;ready;").collect();
        assert_eq!(cmds.len(), 3);
        assert_eq!(cmds[0].name, "protocol");
        assert_eq!(cmds[0].args, vec!["ExpertSDR3", "1.9"]);
        assert_eq!(cmds[1].args, vec!["SunSDR2PRO"]);
        assert!(cmds[2].is_ready());
    }

    #[test]
    fn names_are_case_insensitive() {
        let cmd = parse_command("READY");
        assert!(cmd.is_ready());
        assert!(cmd.args.is_empty());
    }

    #[test]
    fn empty_segments_are_skipped() {
        assert_eq!(split_commands(" ; ;").count(), 0);
    }

    #[test]
    fn spot_command_layout() {
        let spot = Spot::from_khz("k1abc", 14_062.0, "cw").with_reference("US-1234");
        assert_eq!(cmd_spot(&spot), "spot:K1ABC,CW,14062000,4283215696,US-1234;");
    }

    #[test]
    fn spot_description_cannot_break_framing() {
        let spot = Spot::new("W2XYZ", 7_074_000, "FT8")
            .with_source(SpotSource::Wwff)
            .with_park_name("Park; North, East");
        assert_eq!(
            cmd_spot(&spot),
            format!("spot:W2XYZ,FT8,7074000,{},Park  North  East;", 0xFF00_BCD4u32)
        );
    }

    #[test]
    fn delete_clear_vfo_modulation() {
        assert_eq!(cmd_spot_delete("K1ABC"), "spot_delete:K1ABC;");
        assert_eq!(cmd_spot_clear(), "spot_clear;");
        assert_eq!(cmd_vfo(0, 0, 14_074_000), "vfo:0,0,14074000;");
        assert_eq!(cmd_modulation(0, "usb"), "modulation:0,usb;");
    }

    #[test]
    fn mode_mapping() {
        assert_eq!(to_tci_mode("SSB", 7_200_000), Some("lsb"));
        assert_eq!(to_tci_mode("ssb", 14_200_000), Some("usb"));
        assert_eq!(to_tci_mode("FT8", 14_074_000), Some("digu"));
        assert_eq!(to_tci_mode("FM", 145_500_000), Some("nfm"));
        assert_eq!(to_tci_mode("CW", 7_030_000), Some("cw"));
        assert_eq!(to_tci_mode("DSTAR", 145_500_000), None);
    }
}
