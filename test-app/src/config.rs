// Optional TOML configuration for the test application.
//
// Every key is optional. Values found here replace the library defaults;
// command-line flags replace both.
//
// ```toml
// [smartsdr]
// host = "192.168.1.100"
// ptt_holdoff_ms = 1200
//
// [wwff]
// callsign = "N0CALL"
// ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Looked for in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "hamlink.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub wsjtx: WsjtxSection,
    pub smartsdr: SmartSdrSection,
    pub tci: TciSection,
    pub pskreporter: PskReporterSection,
    pub wwff: WwffSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WsjtxSection {
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub heartbeat_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SmartSdrSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub reconnect_secs: Option<u64>,
    pub ptt_holdoff_ms: Option<u64>,
    pub spot_source: Option<String>,
    pub spot_lifetime_seconds: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TciSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub reconnect_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PskReporterSection {
    pub mode: Option<String>,
    pub app_contact: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub backoff_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WwffSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub callsign: Option<String>,
    pub timeout_secs: Option<u64>,
    pub settle_ms: Option<u64>,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid configuration")
    }

    /// Load `path`, or `hamlink.toml` if it exists, or nothing.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(FileConfig::default());
                }
                default
            }
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("in {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg = FileConfig::parse("").unwrap();
        assert!(cfg.smartsdr.host.is_none());
        assert!(cfg.wwff.callsign.is_none());
    }

    #[test]
    fn sections_are_read() {
        let cfg = FileConfig::parse(
            r#"
            [wsjtx]
            port = 2238

            [smartsdr]
            host = "192.168.1.100"
            ptt_holdoff_ms = 1200
            spot_source = "MYLOG"

            [tci]
            host = "10.0.0.5"

            [pskreporter]
            app_contact = "n0call@example.com"
            poll_interval_secs = 600

            [wwff]
            callsign = "N0CALL"
            settle_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(cfg.wsjtx.port, Some(2238));
        assert_eq!(cfg.smartsdr.host.as_deref(), Some("192.168.1.100"));
        assert_eq!(cfg.smartsdr.ptt_holdoff_ms, Some(1200));
        assert_eq!(cfg.tci.host.as_deref(), Some("10.0.0.5"));
        assert_eq!(cfg.pskreporter.poll_interval_secs, Some(600));
        assert_eq!(cfg.wwff.settle_ms, Some(500));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(FileConfig::parse("[smartsdr]\nhots = \"x\"\n").is_err());
    }

    #[test]
    fn missing_default_file_is_fine() {
        // The test runs from the crate directory, which has no hamlink.toml.
        assert!(FileConfig::load(None).is_ok());
    }
}
