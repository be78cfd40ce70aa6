//! Reception report extraction.
//!
//! The retrieve endpoint answers with a flat XML document. Only the
//! self-closing `<receptionReport .../>` elements matter, and only their
//! attributes, so this is a tag scanner rather than an XML parser. Anything
//! it cannot make sense of is skipped.

use hamlink_core::ReceptionReport;

const TAG: &str = "<receptionReport";

/// Extract every usable reception report from a response body.
///
/// Records without a sender callsign or a numeric frequency are discarded.
pub fn parse_reports(body: &str) -> Vec<ReceptionReport> {
    let mut reports = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find(TAG) {
        let after = &rest[start + TAG.len()..];
        // `<receptionReports>` is not a match.
        if !after.starts_with(|c: char| c.is_whitespace() || c == '/' || c == '>') {
            rest = after;
            continue;
        }
        let Some(end) = after.find('>') else {
            break;
        };
        let attrs = after[..end].trim_end_matches('/');
        match report_from_attributes(attrs) {
            Some(report) => reports.push(report),
            None => tracing::trace!(element = %attrs.trim(), "Skipping incomplete reception report"),
        }
        rest = &after[end + 1..];
    }
    reports
}

fn report_from_attributes(attrs: &str) -> Option<ReceptionReport> {
    let pairs = attributes(attrs);
    let get = |name: &str| -> Option<String> {
        pairs
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let sender_callsign = get("senderCallsign")?;
    let freq_hz = get("frequency")?.parse::<u64>().ok()?;

    Some(ReceptionReport {
        sender_callsign,
        receiver_callsign: get("receiverCallsign"),
        freq_hz,
        snr: get("sNR").and_then(|v| v.parse().ok()),
        mode: get("mode"),
        sender_locator: get("senderLocator"),
        receiver_locator: get("receiverLocator"),
        flow_start_seconds: get("flowStartSeconds").and_then(|v| v.parse().ok()),
    })
}

/// Scan `name="value"` (or single-quoted) pairs. Values are unescaped.
fn attributes(mut text: &str) -> Vec<(&str, String)> {
    let mut pairs = Vec::new();
    loop {
        text = text.trim_start();
        let Some(eq) = text.find('=') else {
            break;
        };
        let name = text[..eq].trim();
        let value_part = text[eq + 1..].trim_start();
        let Some(quote) = value_part.chars().next().filter(|c| *c == '"' || *c == '\'') else {
            break;
        };
        let Some(close) = value_part[1..].find(quote) else {
            break;
        };
        let raw = &value_part[1..1 + close];
        // A name can carry leading junk from a malformed previous pair.
        let name = name.rsplit(char::is_whitespace).next().unwrap_or(name);
        pairs.push((name, unescape(raw)));
        text = &value_part[close + 2..];
    }
    pairs
}

fn unescape(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<receptionReports currentSeconds="1700000000">
<activeReceiver callsign="N0RX" locator="EN34" frequency="14236000" mode="FREEDV" />
<lastSequenceNumber value="123456" />
<receptionReport receiverCallsign="N0RX" receiverLocator="EN34ab" senderCallsign="K1ABC" senderLocator="FN42" frequency="14236000" flowStartSeconds="1699999900" mode="FREEDV" isSender="1" sNR="-3" />
<receptionReport receiverCallsign="G4XYZ" senderCallsign="W2XYZ" frequency="7177000" mode="FREEDV"/>
<receptionReport receiverCallsign="DL1AAA" frequency="14236000" mode="FREEDV" />
<receptionReport senderCallsign="VE3BAD" frequency="14.236" mode="FREEDV" />
</receptionReports>"#;

    #[test]
    fn extracts_complete_reports() {
        let reports = parse_reports(BODY);
        assert_eq!(reports.len(), 2);

        let first = &reports[0];
        assert_eq!(first.sender_callsign, "K1ABC");
        assert_eq!(first.receiver_callsign.as_deref(), Some("N0RX"));
        assert_eq!(first.freq_hz, 14_236_000);
        assert_eq!(first.snr, Some(-3));
        assert_eq!(first.mode.as_deref(), Some("FREEDV"));
        assert_eq!(first.sender_locator.as_deref(), Some("FN42"));
        assert_eq!(first.receiver_locator.as_deref(), Some("EN34ab"));
        assert_eq!(first.flow_start_seconds, Some(1_699_999_900));

        let second = &reports[1];
        assert_eq!(second.sender_callsign, "W2XYZ");
        assert_eq!(second.snr, None);
        assert_eq!(second.sender_locator, None);
    }

    #[test]
    fn attribute_order_and_quoting_do_not_matter() {
        let reports = parse_reports(
            "<receptionReport frequency='3625000' sNR='5' senderCallsign='M0ABC'/>",
        );
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].sender_callsign, "M0ABC");
        assert_eq!(reports[0].snr, Some(5));
    }

    #[test]
    fn entities_are_unescaped() {
        let reports = parse_reports(
            r#"<receptionReport senderCallsign="K1ABC/P" frequency="7177000" receiverCallsign="A&amp;B" />"#,
        );
        assert_eq!(reports[0].receiver_callsign.as_deref(), Some("A&B"));
    }

    #[test]
    fn garbage_yields_nothing() {
        assert!(parse_reports("").is_empty());
        assert!(parse_reports("Service unavailable").is_empty());
        assert!(parse_reports("<receptionReport senderCallsign=\"K1ABC").is_empty());
        assert!(parse_reports("<receptionReports></receptionReports>").is_empty());
    }
}
