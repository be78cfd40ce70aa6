//! Host mode name -> SmartSDR mode string conversion.
//!
//! Hosts name modes the way spotting networks report them (`"SSB"`,
//! `"FT8"`, `"FREEDV"`). FlexRadio uses its own uppercase set (`"USB"`,
//! `"DIGU"`, `"FDV"`). Some mappings depend on frequency:
//!
//! - `SSB` -> `LSB` below 10 MHz, `USB` at and above, except on 60 m where
//!   channelised operation is USB by regulation.
//! - Every weak-signal and keyboard digital mode -> `DIGU`.

/// Lower and upper edge of the 60 m allocation in hertz.
const SIXTY_METERS_HZ: (u64, u64) = (5_250_000, 5_450_000);

/// Sideband crossover for `SSB`.
const SSB_LSB_BELOW_HZ: u64 = 10_000_000;

const DIGITAL_MODES: &[&str] = &[
    "FT8", "FT4", "JT65", "JT9", "JS8", "WSPR", "MSK144", "Q65", "PSK", "PSK31", "PSK63",
    "OLIVIA", "MFSK", "DIGI", "DATA", "SSTV", "VARAC",
];

/// Map a host mode name to the SmartSDR mode for a slice tuned to `freq_hz`.
///
/// Returns `None` for names with no SmartSDR equivalent; the caller then
/// leaves the slice mode untouched.
pub fn to_flex_mode(mode: &str, freq_hz: u64) -> Option<&'static str> {
    let mode = mode.trim().to_ascii_uppercase();
    let flex = match mode.as_str() {
        "CW" => "CW",
        "CWR" => "CWR",
        "USB" => "USB",
        "LSB" => "LSB",
        "SSB" | "PHONE" => {
            if freq_hz < SSB_LSB_BELOW_HZ && !is_sixty_meters(freq_hz) {
                "LSB"
            } else {
                "USB"
            }
        }
        "AM" => "AM",
        "SAM" => "SAM",
        "FM" => "FM",
        "NFM" => "NFM",
        "RTTY" => "RTTY",
        "FREEDV" | "FDV" => "FDV",
        "DIGU" => "DIGU",
        "DIGL" => "DIGL",
        m if DIGITAL_MODES.contains(&m) => "DIGU",
        _ => return None,
    };
    Some(flex)
}

/// Whether `freq_hz` lies in the 60 m band.
pub fn is_sixty_meters(freq_hz: u64) -> bool {
    (SIXTY_METERS_HZ.0..=SIXTY_METERS_HZ.1).contains(&freq_hz)
}
