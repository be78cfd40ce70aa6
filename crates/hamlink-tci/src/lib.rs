//! hamlink-tci: TCI (Transceiver Control Interface) adapter.
//!
//! TCI servers such as ExpertSDR speak semicolon-terminated text commands
//! over a WebSocket. This crate pushes spot markers to the server's
//! panadapter and tunes receiver 0.
//!
//! # Example
//!
//! ```no_run
//! use hamlink_core::Spot;
//! use hamlink_tci::TciBuilder;
//!
//! # async fn example() -> hamlink_core::Result<()> {
//! let tci = TciBuilder::new().host("127.0.0.1").build()?;
//! tci.add_spot(&Spot::from_khz("K1ABC", 14_062.0, "CW")).await;
//! tci.prune_stale_spots().await;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod client;
pub mod codec;

pub use builder::TciBuilder;
pub use client::TciAdapter;
