//! Push a few spot markers to a FlexRadio panadapter, then refresh them.
//!
//! The second refresh drops one station, so its marker disappears after
//! the prune.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p hamlink --example smartsdr_spots -- 192.168.1.100
//! ```

use std::time::Duration;

use hamlink::smartsdr::SmartSdrBuilder;
use hamlink::{Adapter, ConnectionState, Spot, SpotSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let host = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "192.168.1.100".to_string());

    let sdr = SmartSdrBuilder::new().host(&host).build()?;
    let mut state = sdr.state_watch();
    tokio::time::timeout(
        Duration::from_secs(10),
        state.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await??;
    println!("Connected to {host}");

    let first = [
        Spot::from_khz("K1ABC", 14_062.0, "CW").with_reference("US-1234"),
        Spot::from_khz("W2XYZ", 7_030.0, "CW").with_source(SpotSource::Sota),
        Spot::from_khz("DL1AAA", 14_244.0, "SSB").with_source(SpotSource::Wwff),
    ];
    for spot in &first {
        sdr.add_spot(spot).await;
    }
    sdr.prune_stale_spots().await;
    println!("Pushed {} markers", first.len());

    tokio::time::sleep(Duration::from_secs(5)).await;

    for spot in &first[..2] {
        sdr.add_spot(spot).await;
    }
    let removed = sdr.prune_stale_spots().await;
    println!("Refreshed, removed {removed} stale marker(s)");

    tokio::time::sleep(Duration::from_secs(5)).await;
    sdr.clear_spots().await;
    sdr.disconnect().await;
    Ok(())
}
