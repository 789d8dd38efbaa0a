//! Stream ring buffer
//!
//! Fixed-capacity ring of interleaved stereo i16 samples with monotonic
//! absolute cursors. `write_abs` counts every sample ever pushed,
//! `play_abs` every sample ever consumed; neither ever decreases, so
//! positions survive wraparound and overwrite. When the writer laps the
//! reader, the oldest samples are silently overwritten (drop-oldest) and
//! the read cursor is advanced to the oldest retrievable sample.
//!
//! Single-threaded by design: the render driver owns the buffer and is
//! the only reader and writer.

use tracing::trace;
use webstream_common::params::PARAMS;

/// Ring buffer of interleaved stereo i16 samples with absolute cursors
pub struct StreamRingBuffer {
    ring: Vec<i16>,
    capacity: usize,
    write_abs: u64,
    play_abs: u64,
    dropped_samples: u64,
}

impl StreamRingBuffer {
    /// Create a ring with the given capacity in samples.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        Self {
            ring: vec![0; capacity],
            capacity,
            write_abs: 0,
            play_abs: 0,
            dropped_samples: 0,
        }
    }

    /// Create a ring sized from the global parameters
    /// (ring_seconds of stereo audio at the working sample rate).
    pub fn with_default_capacity() -> Self {
        Self::new(PARAMS.ring_capacity_samples())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Absolute index one past the newest written sample.
    pub fn write_abs(&self) -> u64 {
        self.write_abs
    }

    /// Absolute index of the next sample to be consumed.
    pub fn play_abs(&self) -> u64 {
        self.play_abs
    }

    /// Oldest absolute index still retrievable from the ring.
    pub fn oldest_retrievable(&self) -> u64 {
        self.write_abs.saturating_sub(self.capacity as u64)
    }

    /// Samples currently available to consume.
    pub fn available(&self) -> usize {
        (self.write_abs - self.play_abs).min(self.capacity as u64) as usize
    }

    /// Total samples lost to overwrites since the last clear.
    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples
    }

    /// Append samples, overwriting the oldest data when full.
    ///
    /// Never blocks and never fails; if the reader was lapped its cursor
    /// jumps forward to the oldest retrievable sample and the loss is
    /// counted in `dropped_samples`.
    pub fn push(&mut self, samples: &[i16]) {
        let mut src = samples;
        while !src.is_empty() {
            let pos = (self.write_abs % self.capacity as u64) as usize;
            let run = (self.capacity - pos).min(src.len());
            self.ring[pos..pos + run].copy_from_slice(&src[..run]);
            self.write_abs += run as u64;
            src = &src[run..];
        }

        let oldest = self.oldest_retrievable();
        if self.play_abs < oldest {
            let lost = oldest - self.play_abs;
            self.dropped_samples += lost;
            self.play_abs = oldest;
            trace!(lost, total = self.dropped_samples, "reader lapped, oldest samples dropped");
        }
    }

    /// Consume up to `out.len()` samples into `out`, returning the count.
    pub fn pop(&mut self, out: &mut [i16]) -> usize {
        let got = self.available().min(out.len());
        let mut filled = 0;
        while filled < got {
            let pos = (self.play_abs % self.capacity as u64) as usize;
            let run = (self.capacity - pos).min(got - filled);
            out[filled..filled + run].copy_from_slice(&self.ring[pos..pos + run]);
            self.play_abs += run as u64;
            filled += run;
        }
        got
    }

    /// Consume and discard up to `count` samples, returning how many
    /// were actually discarded.
    pub fn discard(&mut self, count: u64) -> u64 {
        let got = (self.available() as u64).min(count);
        self.play_abs += got;
        got
    }

    /// Move the read cursor by a signed sample delta, clamped to the
    /// retrievable window. Returns the forward overshoot beyond the
    /// live edge (0 when the target was inside the window).
    pub fn seek_relative(&mut self, delta: i64) -> u64 {
        let target = self.play_abs as i128 + delta as i128;
        let oldest = self.oldest_retrievable() as i128;
        let newest = self.write_abs as i128;
        let clamped = target.clamp(oldest, newest);
        self.play_abs = clamped as u64;
        (target - newest).max(0) as u64
    }

    /// Reset all cursors and counters; retained audio becomes
    /// unreachable.
    pub fn clear(&mut self) {
        self.write_abs = 0;
        self.play_abs = 0;
        self.dropped_samples = 0;
    }
}
