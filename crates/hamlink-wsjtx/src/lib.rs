//! WSJT-X UDP protocol support for hamlink.
//!
//! WSJT-X (and compatible programs such as JTDX) publish decodes, status
//! snapshots, and logged QSOs as binary datagrams on UDP port 2237, and
//! accept a handful of commands back: reply to a decode, halt transmit,
//! highlight a callsign.
//!
//! - [`codec`] -- the binary NetworkMessage format, encode and decode.
//! - [`callsign`] -- DX/DE callsign extraction from FT8/FT4 message text.
//! - [`session`] -- sans-IO peer tracking, heartbeat ping-pong, and timeout.
//! - [`adapter`] -- the UDP socket task, implementing
//!   [`Adapter`](hamlink_core::Adapter).
//!
//! # Example
//!
//! ```no_run
//! use hamlink_core::{Adapter, AdapterEvent};
//! use hamlink_wsjtx::WsjtxBuilder;
//!
//! # async fn example() -> hamlink_core::Result<()> {
//! let wsjtx = WsjtxBuilder::new().build().await?;
//! let mut events = wsjtx.subscribe();
//! while let Ok(event) = events.recv().await {
//!     if let AdapterEvent::Decode(decode) = event {
//!         if decode.message.starts_with("CQ") {
//!             wsjtx.reply(&decode, 0).await;
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod builder;
pub mod callsign;
pub mod codec;
pub mod session;

pub use adapter::WsjtxAdapter;
pub use builder::WsjtxBuilder;
pub use callsign::extract_calls;
pub use codec::{Message, MessageType, Packet, Rgba};
pub use session::WsjtxSession;
