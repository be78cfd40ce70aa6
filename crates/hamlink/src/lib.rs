//! # hamlink -- Radio network adapters for amateur radio logging
//!
//! `hamlink` connects a logging application to the software around a
//! station: digital-mode decoders, SDR panadapters, reception report feeds
//! and DX clusters. Each adapter owns its socket, its timers and its spot
//! bookkeeping, and reports back through a broadcast event stream.
//!
//! ## Quick Start
//!
//! ```no_run
//! use hamlink::{Adapter, AdapterEvent};
//! use hamlink::wsjtx::WsjtxBuilder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let wsjtx = WsjtxBuilder::new().build().await?;
//!     let mut events = wsjtx.subscribe();
//!     while let Ok(event) = events.recv().await {
//!         if let AdapterEvent::Decode(decode) = event {
//!             println!("{:>4} dB  {}", decode.snr, decode.message);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                  | Purpose                                          |
//! |------------------------|--------------------------------------------------|
//! | `hamlink-core`         | [`Adapter`] trait, events, spot tracker, errors  |
//! | `hamlink-transport`    | TCP and UDP transports                           |
//! | `hamlink-wsjtx`        | WSJT-X binary UDP protocol                       |
//! | `hamlink-flex`         | FlexRadio SmartSDR spots, tuning and CW keying   |
//! | `hamlink-tci`          | TCI WebSocket spots and tuning                   |
//! | `hamlink-pskreporter`  | PSKReporter HTTP polling                         |
//! | `hamlink-wwff`         | One-shot WWFF cluster respot                     |
//! | **`hamlink`**          | This facade crate -- re-exports everything       |
//!
//! ## Feature Flags
//!
//! | Feature       | Enables                      | Default |
//! |---------------|------------------------------|---------|
//! | `wsjtx`       | [`wsjtx`] module             | yes     |
//! | `smartsdr`    | [`smartsdr`] module          | yes     |
//! | `tci`         | [`tci`] module               | yes     |
//! | `pskreporter` | [`pskreporter`] module       | yes     |
//! | `wwff`        | [`wwff`] module              | yes     |
//! | `full`        | All adapters                 | no      |
//!
//! ## Spot refresh cycle
//!
//! Both SDR adapters expect the host to push its full spot list once per
//! refresh and then prune:
//!
//! ```no_run
//! # use hamlink::Spot;
//! # async fn refresh(sdr: &hamlink::smartsdr::SmartSdrAdapter, spots: &[Spot]) {
//! for spot in spots {
//!     sdr.add_spot(spot).await;
//! }
//! sdr.prune_stale_spots().await;
//! # }
//! ```

pub use hamlink_core::*;

/// Transports used by the adapters, for hosts that want to supply their own.
pub mod transport {
    pub use hamlink_transport::*;
}

/// WSJT-X UDP adapter.
///
/// Provides [`WsjtxAdapter`](wsjtx::WsjtxAdapter) and
/// [`WsjtxBuilder`](wsjtx::WsjtxBuilder). Listens for decodes, status and
/// logged QSOs and sends replies, halt and highlight commands back.
#[cfg(feature = "wsjtx")]
pub mod wsjtx {
    pub use hamlink_wsjtx::*;
}

/// FlexRadio SmartSDR adapter.
///
/// Provides [`SmartSdrAdapter`](smartsdr::SmartSdrAdapter) and
/// [`SmartSdrBuilder`](smartsdr::SmartSdrBuilder) for panadapter spot
/// markers, slice tuning and CW keying with PTT holdoff.
#[cfg(feature = "smartsdr")]
pub mod smartsdr {
    pub use hamlink_flex::*;
}

/// TCI WebSocket adapter.
#[cfg(feature = "tci")]
pub mod tci {
    pub use hamlink_tci::*;
}

/// PSKReporter reception report poller.
#[cfg(feature = "pskreporter")]
pub mod pskreporter {
    pub use hamlink_pskreporter::*;
}

/// WWFF cluster respotter.
#[cfg(feature = "wwff")]
pub mod wwff {
    pub use hamlink_wwff::*;
}

/// Names of the adapters compiled into this build.
///
/// # Example
///
/// ```
/// for name in hamlink::enabled_adapters() {
///     println!("{name}");
/// }
/// ```
pub fn enabled_adapters() -> Vec<&'static str> {
    let mut names = Vec::new();

    #[cfg(feature = "wsjtx")]
    names.push("wsjtx");

    #[cfg(feature = "smartsdr")]
    names.push("smartsdr");

    #[cfg(feature = "tci")]
    names.push("tci");

    #[cfg(feature = "pskreporter")]
    names.push("pskreporter");

    #[cfg(feature = "wwff")]
    names.push("wwff");

    names
}
