//! Print WSJT-X traffic and highlight every station calling CQ.
//!
//! Start WSJT-X with its UDP server pointed at this machine (port 2237 by
//! default) and watch decodes, status updates and logged QSOs scroll by.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p hamlink --example monitor_wsjtx
//! ```

use std::time::Duration;

use hamlink::wsjtx::{Rgba, WsjtxBuilder};
use hamlink::{Adapter, AdapterEvent};

const CQ_BACKGROUND: Rgba = Rgba::rgb(0x4C, 0xAF, 0x50);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let wsjtx = WsjtxBuilder::new().build().await?;
    println!("Listening on {}", wsjtx.local_addr());

    let mut events = wsjtx.subscribe();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(300);

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Ok(AdapterEvent::Decode(decode))) => {
                println!(
                    "{:>4} dB {:>5.1}s {:>5} Hz  {}",
                    decode.snr, decode.delta_time, decode.delta_freq, decode.message
                );
                if decode.de_call.is_empty() && !decode.dx_call.is_empty() {
                    wsjtx
                        .highlight_callsign(&decode.dx_call, Some(CQ_BACKGROUND), None, true)
                        .await;
                }
            }
            Ok(Ok(AdapterEvent::QsoLogged(qso))) => {
                println!("Logged {} on {} Hz ({})", qso.dx_call, qso.tx_freq_hz, qso.mode);
            }
            Ok(Ok(event)) => println!("{event:?}"),
            Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(n))) => {
                println!("(missed {n} events)");
            }
            Ok(Err(_)) | Err(_) => break,
        }
    }

    // Clears highlights before letting go of the socket.
    wsjtx.disconnect().await;
    Ok(())
}
