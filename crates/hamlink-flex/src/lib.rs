//! FlexRadio SmartSDR protocol adapter for hamlink.
//!
//! This crate speaks the SmartSDR TCP command protocol (port 4992) used by
//! FLEX-6000/8000 series radios, limited to what a logging application
//! needs:
//!
//! - **Panadapter spots** -- push, move, prune, and clear callsign markers.
//! - **Slice tuning** -- frequency, mode, and filter for a slice receiver.
//! - **CW keying** -- timestamped key events, PTT with automatic holdoff
//!   release, and binding to a GUI client's permission context.
//!
//! # Modules
//!
//! - [`codec`] -- line parsing and command builders, no I/O.
//! - [`mode`] -- host mode names to SmartSDR modes.
//! - [`cw`] -- per-session keying stamps.
//! - [`client`] -- the reconnecting [`SmartSdrAdapter`].
//! - [`builder`] -- [`SmartSdrBuilder`].
//!
//! # Example
//!
//! ```no_run
//! use hamlink_core::Spot;
//! use hamlink_flex::SmartSdrBuilder;
//!
//! # async fn example() -> hamlink_core::Result<()> {
//! let sdr = SmartSdrBuilder::new().host("192.168.1.100").build()?;
//!
//! // Once per refresh cycle:
//! sdr.add_spot(&Spot::from_khz("K1ABC", 14_062.0, "CW").with_reference("US-1234")).await;
//! sdr.prune_stale_spots().await;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod client;
pub mod codec;
pub mod cw;
pub mod mode;

pub use builder::SmartSdrBuilder;
pub use client::SmartSdrAdapter;
