//! CW keying sequence state.
//!
//! SmartSDR reconstructs keying timing at the radio from two values carried
//! on every `cw key` and `cw ptt` command: a 16-bit millisecond timestamp
//! and a monotonically increasing event index. Both run for the lifetime of
//! one TCP session and restart only when the adapter reconnects.

use tokio::time::Instant;

use crate::codec;

/// Per-session keying stamps and PTT flag.
#[derive(Debug, Clone)]
pub struct CwKeyer {
    epoch: Instant,
    next_index: u32,
    ptt_active: bool,
}

impl CwKeyer {
    /// Start a keying session at `now`.
    pub fn new(now: Instant) -> Self {
        CwKeyer {
            epoch: now,
            next_index: 0,
            ptt_active: false,
        }
    }

    /// Restart stamps for a new connection.
    pub fn reset(&mut self, now: Instant) {
        *self = CwKeyer::new(now);
    }

    /// Whether PTT has been requested and not yet released.
    pub fn ptt_active(&self) -> bool {
        self.ptt_active
    }

    /// Index the next command will carry.
    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    fn stamp(&mut self, now: Instant) -> (u16, u32) {
        // Truncation to 16 bits is the wire format; the radio handles wrap.
        let time = now.saturating_duration_since(self.epoch).as_millis() as u16;
        let index = self.next_index;
        self.next_index = self.next_index.wrapping_add(1);
        (time, index)
    }

    /// Command for a key transition.
    pub fn key(&mut self, down: bool, now: Instant, client_handle: Option<u32>) -> String {
        let (time, index) = self.stamp(now);
        codec::cmd_cw_key(down, time, index, client_handle)
    }

    /// Command asserting PTT, or `None` if it is already asserted.
    pub fn ptt_on(&mut self, now: Instant, client_handle: Option<u32>) -> Option<String> {
        if self.ptt_active {
            return None;
        }
        self.ptt_active = true;
        let (time, index) = self.stamp(now);
        Some(codec::cmd_cw_ptt(true, time, index, client_handle))
    }

    /// Command releasing PTT, or `None` if it is not asserted.
    pub fn ptt_off(&mut self, now: Instant, client_handle: Option<u32>) -> Option<String> {
        if !self.ptt_active {
            return None;
        }
        self.ptt_active = false;
        let (time, index) = self.stamp(now);
        Some(codec::cmd_cw_ptt(false, time, index, client_handle))
    }

    /// Command releasing PTT unconditionally, for abort paths.
    pub fn force_ptt_off(&mut self, now: Instant, client_handle: Option<u32>) -> String {
        self.ptt_active = false;
        let (time, index) = self.stamp(now);
        codec::cmd_cw_ptt(false, time, index, client_handle)
    }
}
