//! Frequency conversion and formatting helpers.
//!
//! Hosts hand spots over in kHz or MHz while the wire protocols want MHz
//! strings (SmartSDR), integer hertz (TCI), or raw 64-bit hertz (WSJT-X).
//! Everything inside hamlink carries `u64` hertz.

/// Convert frequency in Hz to MHz.
pub fn hz_to_mhz(hz: u64) -> f64 {
    hz as f64 / 1_000_000.0
}

/// Convert frequency in MHz to Hz, rounding to the nearest hertz.
pub fn mhz_to_hz(mhz: f64) -> u64 {
    (mhz * 1_000_000.0).round().max(0.0) as u64
}

/// Convert frequency in Hz to kHz.
pub fn hz_to_khz(hz: u64) -> f64 {
    hz as f64 / 1_000.0
}

/// Convert frequency in kHz to Hz, rounding to the nearest hertz.
pub fn khz_to_hz(khz: f64) -> u64 {
    (khz * 1_000.0).round().max(0.0) as u64
}

/// Format a frequency in hertz as a human-readable MHz string.
///
/// # Example
///
/// ```
/// use hamlink_core::format_freq_mhz;
///
/// assert_eq!(format_freq_mhz(14_074_000), "14.074000 MHz");
/// assert_eq!(format_freq_mhz(432_100_000), "432.100000 MHz");
/// ```
pub fn format_freq_mhz(freq_hz: u64) -> String {
    format!("{:.6} MHz", hz_to_mhz(freq_hz))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mhz_round_trip_at_one_hz() {
        for &hz in &[1_800_000u64, 1_850_001, 7_074_000, 14_074_000, 50_313_000] {
            assert_eq!(mhz_to_hz(hz_to_mhz(hz)), hz, "round-trip failed for {hz}");
        }
    }

    #[test]
    fn khz_conversions() {
        assert_eq!(khz_to_hz(14_244.5), 14_244_500);
        assert!((hz_to_khz(7_030_000) - 7030.0).abs() < 1e-9);
    }

    #[test]
    fn negative_input_clamps_to_zero() {
        assert_eq!(mhz_to_hz(-1.0), 0);
        assert_eq!(khz_to_hz(-0.5), 0);
    }

    #[test]
    fn format_freq_mhz_hf() {
        assert_eq!(format_freq_mhz(7_030_000), "7.030000 MHz");
    }
}
