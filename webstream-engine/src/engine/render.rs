//! Render driver
//!
//! One call per output block. Fills the block with whatever is playable
//! right now and returns; every slow operation (process launches,
//! resolution, teardown) either happens on the runtime or is a quick
//! non-blocking poll. Underruns, priming, seeks-in-progress, and pauses
//! all render silence rather than stalling the caller.

use crate::engine::StreamEngine;
use crate::error::Error;
use crate::playback::{PipeRead, PipelineKind, StreamPipeline};
use crate::workers::resolve::{self, SourceKey};
use tracing::{debug, info, warn};
use webstream_common::params::PARAMS;

/// Samples pumped from the pipeline per pump iteration
const PUMP_CHUNK_SAMPLES: usize = 2048;

impl StreamEngine {
    /// Render one block of interleaved stereo s16 audio.
    ///
    /// Always returns promptly; the block is zero-filled first and
    /// partially overwritten with however much audio is available.
    pub fn render(&mut self, out: &mut [i16]) {
        out.fill(0);
        if out.is_empty() {
            return;
        }
        let Some(source) = self.session.source.clone() else {
            return;
        };
        if self.session.stream_eof {
            return;
        }

        if self.pipeline.is_none() && !self.session.pipeline_done {
            self.drive_startup(&source);
        }
        self.pump(&source);

        if self.session.paused {
            return;
        }

        // Drain a pending forward seek before anything is audible
        if self.session.seek_discard_samples > 0 {
            let discarded = self.ring.discard(self.session.seek_discard_samples);
            self.session.seek_discard_samples -= discarded;
            if self.session.seek_discard_samples > 0 {
                // A seek past the end of a finished stream lands at eof
                if self.session.pipeline_done && self.ring.available() == 0 {
                    self.session.seek_discard_samples = 0;
                    self.session.stream_eof = true;
                    info!("seek target is past the end of the stream");
                }
                return;
            }
        }

        // Hold output until the ring has primed, unless the stream
        // already ended and this is all the audio there will be
        if self.session.prime_needed_samples > 0 {
            if self.ring.available() < self.session.prime_needed_samples
                && !self.session.pipeline_done
            {
                return;
            }
            self.session.prime_needed_samples = 0;
        }

        let got = self.ring.pop(out);
        self.apply_gain(&mut out[..got]);
        self.log_overflow();

        // All audio delivered and no pipeline will produce more
        if got == 0 && self.session.pipeline_done {
            info!("stream reached end of output");
            self.session.stream_eof = true;
        }
    }

    /// Launch (or wait to launch) a pipeline for the live source.
    fn drive_startup(&mut self, source: &SourceKey) {
        if self.session.restart_countdown > 0 {
            self.session.restart_countdown -= 1;
            return;
        }

        if self.session.legacy_preferred || self.session.fallback_attempted {
            self.launch_legacy(source);
            return;
        }

        let (running, ready, failed, media, error) = resolve::snapshot(&self.resolve);
        if ready {
            if let Some(media) = media {
                match StreamPipeline::spawn_resolved(&self.config, &media) {
                    Ok(pipeline) => {
                        self.install_pipeline(pipeline);
                        return;
                    }
                    Err(e) => {
                        warn!(error = %e, "resolved pipeline launch failed");
                        resolve::mark_failed(&self.resolve, &e.to_string());
                        self.try_fallback(source, &e.to_string());
                        return;
                    }
                }
            }
        }
        if failed {
            self.try_fallback(source, &error);
            return;
        }
        if !running {
            // Covers engine restarts and resolves lost to helper churn
            self.kick_resolve();
        }
        // Resolution still in flight; stay in loading
    }

    /// Route to the extractor pipeline or give up on the stream.
    fn try_fallback(&mut self, source: &SourceKey, error: &str) {
        if source.provider.supports_legacy_pipeline() {
            info!(provider = %source.provider, "falling back to extractor pipeline");
            self.session.fallback_attempted = true;
            self.launch_legacy(source);
        } else {
            self.session.stream_eof = true;
            let message = if error.is_empty() {
                "resolve failed".to_string()
            } else {
                error.to_string()
            };
            self.set_error(message);
        }
    }

    fn launch_legacy(&mut self, source: &SourceKey) {
        match StreamPipeline::spawn_legacy(&self.config, &source.provider, &source.url) {
            Ok(pipeline) => self.install_pipeline(pipeline),
            Err(e) => {
                self.session.stream_eof = true;
                self.set_error(e.to_string());
            }
        }
    }

    fn install_pipeline(&mut self, pipeline: StreamPipeline) {
        debug!(kind = ?pipeline.kind(), "pipeline installed");
        self.pipeline = Some(pipeline);
        self.session.stream_eof = false;
        self.session.pipeline_done = false;
        self.session.restart_countdown = 0;
        self.session.prime_needed_samples = PARAMS.prime_level_samples();
        self.session.error_msg.clear();
    }

    /// Move whatever the pipeline has produced into the ring, without
    /// blocking and without flooding the ring faster than it drains.
    fn pump(&mut self, source: &SourceKey) {
        loop {
            let Some(pipeline) = self.pipeline.as_mut() else {
                return;
            };
            // Leave one chunk of headroom so a single pump can't lap
            // the reader; upstream pipe backpressure does the rest
            if self.ring.available() + PUMP_CHUNK_SAMPLES > self.ring.capacity() {
                return;
            }
            let mut chunk = [0i16; PUMP_CHUNK_SAMPLES];
            match pipeline.read_samples(&mut chunk) {
                PipeRead::Samples(count) => {
                    self.ring.push(&chunk[..count]);
                    if count < PUMP_CHUNK_SAMPLES {
                        return;
                    }
                }
                PipeRead::Empty => return,
                PipeRead::Ended => {
                    self.on_pipeline_end(source, false);
                    return;
                }
                PipeRead::Failed => {
                    self.on_pipeline_end(source, true);
                    return;
                }
            }
        }
    }

    /// The pipeline stopped producing. A resolved pipeline gets one
    /// shot at the extractor fallback (after a backoff so a flapping
    /// media URL can't relaunch every block); otherwise the stream is
    /// over once the ring drains.
    fn on_pipeline_end(&mut self, source: &SourceKey, was_error: bool) {
        let was_resolved = self
            .pipeline
            .as_ref()
            .map(|p| p.kind() == PipelineKind::Resolved)
            .unwrap_or(false);
        self.teardown_pipeline();

        if was_resolved
            && !self.session.fallback_attempted
            && source.provider.supports_legacy_pipeline()
        {
            let reason = if was_error {
                "resolved pipeline failed"
            } else {
                "resolved stream ended early"
            };
            info!(reason, "scheduling extractor fallback");
            resolve::mark_failed(&self.resolve, reason);
            // The extractor replays from the start, so buffered audio
            // from the resolved stream would be at the wrong position
            self.ring.clear();
            self.session.fallback_attempted = true;
            self.session.prime_needed_samples = 0;
            self.session.overflow_log_next = PARAMS.overflow_log_interval_samples();
            self.session.restart_countdown = PARAMS.fallback_backoff_blocks();
            self.set_error(reason);
            return;
        }

        if was_error {
            let e = Error::PipelineRead("stream ended with a read error".into());
            self.set_error(e.to_string());
        }
        self.session.pipeline_done = true;
        debug!("pipeline finished, draining ring");
    }

    fn apply_gain(&mut self, samples: &mut [i16]) {
        let gain = self.session.gain;
        if (gain - 1.0).abs() < f32::EPSILON {
            return;
        }
        for sample in samples {
            let scaled = *sample as f32 * gain;
            *sample = scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        }
    }

    fn log_overflow(&mut self) {
        let dropped = self.ring.dropped_samples();
        if dropped >= self.session.overflow_log_next {
            warn!(dropped, "ring overflow, oldest samples dropped");
            self.session.overflow_log_next =
                dropped + PARAMS.overflow_log_interval_samples();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Provider;
    use webstream_common::config::WebstreamConfig;

    #[test]
    fn read_failure_surfaces_error_and_drains_to_eof() {
        let mut engine = StreamEngine::new(WebstreamConfig::default()).unwrap();
        let source = SourceKey {
            provider: Provider::Archive,
            url: "https://archive.org/details/some-item".into(),
        };
        engine.session.source = Some(source.clone());

        engine.on_pipeline_end(&source, true);
        assert!(engine.last_error().contains("read error"));
        assert!(engine.session.pipeline_done);

        // The ring is empty, so the next block ends the stream
        let mut block = vec![0i16; 64];
        engine.render(&mut block);
        assert!(engine.session.stream_eof);
    }
}
