//! Global parameter management
//!
//! Centralized singleton for engine tuning parameters. Read-frequently,
//! write-rarely access pattern using RwLock: the render path reads these
//! every block, writes happen at startup or from tests.
//!
//! # Usage
//!
//! ```rust
//! use webstream_common::params::PARAMS;
//!
//! let rate = PARAMS.working_sample_rate();
//! ```

use once_cell::sync::Lazy;
use std::sync::RwLock;

/// Global parameters singleton
pub static PARAMS: Lazy<GlobalParams> = Lazy::new(GlobalParams::default);

/// Global parameter storage
///
/// All parameters stored with RwLock for thread-safe access.
/// Readers don't block each other (shared read lock).
pub struct GlobalParams {
    /// Working sample rate for decoded audio
    ///
    /// Valid range: [8000, 192000] Hz
    /// Default: 44100 Hz
    /// Affects ring capacity, priming level, and seek stepping.
    pub working_sample_rate: RwLock<u32>,

    /// Ring buffer capacity in seconds of stereo audio
    ///
    /// Default: 60 s
    pub ring_seconds: RwLock<u64>,

    /// Priming level before a freshly started stream is audible
    ///
    /// Default: 500 ms
    /// Converted to interleaved samples at the working rate.
    pub prime_level_ms: RwLock<u64>,

    /// Render blocks to wait before relaunching after a resolved
    /// pipeline fails mid-stream
    ///
    /// Default: 64 blocks
    pub fallback_backoff_blocks: RwLock<u32>,

    /// Debounce window for play/pause triggers
    ///
    /// Default: 220 ms
    pub debounce_play_pause_ms: RwLock<u64>,

    /// Debounce window for seek triggers (tighter, seeks are cheap)
    ///
    /// Default: 140 ms
    pub debounce_seek_ms: RwLock<u64>,

    /// Debounce window for stop triggers
    ///
    /// Default: 220 ms
    pub debounce_stop_ms: RwLock<u64>,

    /// Debounce window for restart triggers
    ///
    /// Default: 220 ms
    pub debounce_restart_ms: RwLock<u64>,

    /// Timeout waiting for the sidecar READY handshake
    ///
    /// Default: 12000 ms
    pub sidecar_start_timeout_ms: RwLock<u64>,

    /// Per-line timeout while reading a search reply
    ///
    /// Default: 12000 ms
    pub sidecar_search_timeout_ms: RwLock<u64>,

    /// Timeout waiting for a resolve reply
    ///
    /// Default: 12000 ms
    pub sidecar_resolve_timeout_ms: RwLock<u64>,

    /// Maximum search results retained and exposed
    ///
    /// Valid range: [1, 50]
    /// Default: 20
    pub search_max_results: RwLock<usize>,

    /// Seconds moved by one rewind/forward trigger
    ///
    /// Default: 15 s
    pub seek_step_seconds: RwLock<i64>,
}

impl Default for GlobalParams {
    fn default() -> Self {
        Self {
            working_sample_rate: RwLock::new(44100),
            ring_seconds: RwLock::new(60),
            prime_level_ms: RwLock::new(500),
            fallback_backoff_blocks: RwLock::new(64),
            debounce_play_pause_ms: RwLock::new(220),
            debounce_seek_ms: RwLock::new(140),
            debounce_stop_ms: RwLock::new(220),
            debounce_restart_ms: RwLock::new(220),
            sidecar_start_timeout_ms: RwLock::new(12000),
            sidecar_search_timeout_ms: RwLock::new(12000),
            sidecar_resolve_timeout_ms: RwLock::new(12000),
            search_max_results: RwLock::new(20),
            seek_step_seconds: RwLock::new(15),
        }
    }
}

impl GlobalParams {
    pub fn working_sample_rate(&self) -> u32 {
        *self.working_sample_rate.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Ring capacity in interleaved stereo samples.
    pub fn ring_capacity_samples(&self) -> usize {
        let rate = self.working_sample_rate() as u64;
        let seconds = *self.ring_seconds.read().unwrap_or_else(|e| e.into_inner());
        (rate * 2 * seconds) as usize
    }

    /// Priming level in interleaved stereo samples.
    pub fn prime_level_samples(&self) -> usize {
        let rate = self.working_sample_rate() as u64;
        let ms = *self.prime_level_ms.read().unwrap_or_else(|e| e.into_inner());
        (rate * 2 * ms / 1000) as usize
    }

    /// Interleaved samples moved by one rewind/forward trigger.
    pub fn seek_step_samples(&self) -> i64 {
        let rate = self.working_sample_rate() as i64;
        let step = *self.seek_step_seconds.read().unwrap_or_else(|e| e.into_inner());
        rate * 2 * step
    }

    /// Overflow warnings are emitted once per this many dropped samples.
    pub fn overflow_log_interval_samples(&self) -> u64 {
        self.working_sample_rate() as u64 * 2
    }

    pub fn fallback_backoff_blocks(&self) -> u32 {
        *self.fallback_backoff_blocks.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn debounce_play_pause_ms(&self) -> u64 {
        *self.debounce_play_pause_ms.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn debounce_seek_ms(&self) -> u64 {
        *self.debounce_seek_ms.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn debounce_stop_ms(&self) -> u64 {
        *self.debounce_stop_ms.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn debounce_restart_ms(&self) -> u64 {
        *self.debounce_restart_ms.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn sidecar_start_timeout_ms(&self) -> u64 {
        *self.sidecar_start_timeout_ms.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn sidecar_search_timeout_ms(&self) -> u64 {
        *self.sidecar_search_timeout_ms.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn sidecar_resolve_timeout_ms(&self) -> u64 {
        *self.sidecar_resolve_timeout_ms.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Search cap, clamped to the protocol range 1..=50.
    pub fn search_max_results(&self) -> usize {
        let n = *self.search_max_results.read().unwrap_or_else(|e| e.into_inner());
        n.clamp(1, 50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults_are_sane() {
        let p = GlobalParams::default();
        assert_eq!(p.working_sample_rate(), 44100);
        // 60 s of stereo at 44.1 kHz
        assert_eq!(p.ring_capacity_samples(), 44100 * 2 * 60);
        // 500 ms of stereo
        assert_eq!(p.prime_level_samples(), 44100);
        assert_eq!(p.search_max_results(), 20);
    }

    #[test]
    #[serial]
    fn derived_values_track_sample_rate() {
        let p = GlobalParams::default();
        *p.working_sample_rate.write().unwrap() = 48000;
        assert_eq!(p.ring_capacity_samples(), 48000 * 2 * 60);
        assert_eq!(p.seek_step_samples(), 48000 * 2 * 15);
        assert_eq!(p.overflow_log_interval_samples(), 96000);
    }

    #[test]
    #[serial]
    fn search_cap_clamps_to_protocol_range() {
        let p = GlobalParams::default();
        *p.search_max_results.write().unwrap() = 500;
        assert_eq!(p.search_max_results(), 50);
        *p.search_max_results.write().unwrap() = 0;
        assert_eq!(p.search_max_results(), 1);
    }
}
