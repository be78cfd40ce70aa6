//! hamlink-wwff: post a single spot to the WWFF DX cluster.
//!
//! # Example
//!
//! ```no_run
//! use hamlink_wwff::{RespotOptions, RespotRequest, WwffRespotter};
//!
//! # async fn example() -> hamlink_core::Result<()> {
//! let respotter = WwffRespotter::new(RespotOptions::new("N0CALL"));
//! let outcome = respotter
//!     .respot(&RespotRequest {
//!         freq_khz: 14_244.0,
//!         activator: "K1ABC".into(),
//!         reference: "KFF-1234".into(),
//!         mode: "SSB".into(),
//!         comment: Some("tnx".into()),
//!     })
//!     .await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

pub mod respot;

pub use respot::{RespotOptions, RespotOutcome, RespotRequest, WwffRespotter};
