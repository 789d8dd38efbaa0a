//! Stream engine context
//!
//! [`StreamEngine`] ties the pieces together: the session state, the
//! sample ring buffer, the running pipeline (if any), the shared
//! resolve/search worker states, the sidecar client, and a private
//! tokio runtime that hosts everything slow. The engine's public
//! surface (`set_param`, `get_param`, `render`) is synchronous and
//! expects to be called from one thread or otherwise serialized by the
//! host.

pub mod control;
pub mod debounce;
pub mod render;

use crate::error::{Error, Result};
use crate::playback::{StreamPipeline, StreamRingBuffer};
use crate::provider::Provider;
use crate::sidecar::SidecarClient;
use crate::workers::resolve::{self, SharedResolveState, SourceKey};
use crate::workers::search::{SearchState, SharedSearchState};
use debounce::{DebounceGate, TriggerTracker};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, info, warn};
use webstream_common::config::WebstreamConfig;
use webstream_common::params::PARAMS;

/// Per-source playback session state
#[derive(Default)]
pub(crate) struct Session {
    /// Live source, if any
    pub source: Option<SourceKey>,
    /// Provider hint applied to the next `stream_url`
    pub provider_hint: Option<Provider>,
    /// Provider used for searches (falls back to the hint, then youtube)
    pub search_provider: Option<Provider>,
    /// Route this source straight to the extractor pipeline
    pub legacy_preferred: bool,
    pub paused: bool,
    pub stream_eof: bool,
    /// Render blocks to wait before the next pipeline launch attempt
    pub restart_countdown: u32,
    /// The extractor fallback has already been used for this source
    pub fallback_attempted: bool,
    /// A pipeline ran and finished; eof once the ring drains
    pub pipeline_done: bool,
    /// Samples that must accumulate before playback starts
    pub prime_needed_samples: usize,
    /// Forward-seek overshoot still to be discarded as samples arrive
    pub seek_discard_samples: u64,
    pub gain: f32,
    pub error_msg: String,
    /// Next dropped-sample total that triggers an overflow warning
    pub overflow_log_next: u64,

    pub play_pause_gate: DebounceGate,
    pub stop_gate: DebounceGate,
    pub restart_gate: DebounceGate,
    pub rewind_gate: DebounceGate,
    pub forward_gate: DebounceGate,
    pub play_pause_steps: TriggerTracker,
    pub stop_steps: TriggerTracker,
    pub restart_steps: TriggerTracker,
    pub rewind_steps: TriggerTracker,
    pub forward_steps: TriggerTracker,
}

/// The streaming engine
pub struct StreamEngine {
    pub(crate) config: WebstreamConfig,
    runtime: Option<Runtime>,
    handle: Handle,
    pub(crate) sidecar: Arc<SidecarClient>,
    pub(crate) resolve: SharedResolveState,
    pub(crate) search: SharedSearchState,
    pub(crate) session: Session,
    pub(crate) ring: StreamRingBuffer,
    pub(crate) pipeline: Option<StreamPipeline>,
}

impl StreamEngine {
    /// Create an engine and start warming the sidecar in the
    /// background.
    pub fn new(config: WebstreamConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("webstream-worker")
            .enable_all()
            .build()
            .map_err(|e| Error::Config(format!("cannot build runtime: {}", e)))?;
        let handle = runtime.handle().clone();

        let sidecar = Arc::new(SidecarClient::new(config.sidecar_argv()));
        let warm = Arc::clone(&sidecar);
        handle.spawn(async move {
            match warm.warm_up().await {
                Ok(()) => debug!("sidecar warm-up complete"),
                Err(e) => warn!(error = %e, "sidecar warm-up failed"),
            }
        });

        Ok(Self {
            config,
            runtime: Some(runtime),
            handle,
            sidecar,
            resolve: Arc::new(Mutex::new(Default::default())),
            search: Arc::new(Mutex::new(SearchState::default())),
            session: Session {
                gain: 1.0,
                overflow_log_next: PARAMS.overflow_log_interval_samples(),
                ..Default::default()
            },
            ring: StreamRingBuffer::with_default_capacity(),
            pipeline: None,
        })
    }

    /// Last error message set by the engine, empty when none.
    pub fn last_error(&self) -> &str {
        &self.session.error_msg
    }

    pub(crate) fn handle(&self) -> &Handle {
        &self.handle
    }

    pub(crate) fn set_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(error = %message, "engine error");
        self.session.error_msg = message;
    }

    /// Tear down the pipeline without blocking; reaping happens on the
    /// runtime.
    pub(crate) fn teardown_pipeline(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            debug!(kind = ?pipeline.kind(), "tearing down pipeline");
            pipeline.shutdown(&self.handle);
        }
    }

    /// Drop the source and all playback state.
    pub(crate) fn stop_everything(&mut self) {
        info!("stopping stream");
        self.teardown_pipeline();
        self.ring.clear();
        self.session.source = None;
        self.session.paused = false;
        self.session.stream_eof = false;
        self.session.restart_countdown = 0;
        self.session.fallback_attempted = false;
        self.session.pipeline_done = false;
        self.session.prime_needed_samples = 0;
        self.session.seek_discard_samples = 0;
        self.session.error_msg.clear();
        self.session.overflow_log_next = PARAMS.overflow_log_interval_samples();
        resolve::rebind(&self.resolve, None);
    }

    /// Restart the live source from the beginning: kill the pipeline,
    /// forget buffered audio, and let the render driver relaunch.
    pub(crate) fn restart_from_beginning(&mut self) {
        self.teardown_pipeline();
        self.ring.clear();
        self.session.paused = false;
        self.session.stream_eof = false;
        self.session.restart_countdown = 0;
        self.session.fallback_attempted = false;
        self.session.pipeline_done = false;
        self.session.prime_needed_samples = 0;
        self.session.seek_discard_samples = 0;
        self.session.error_msg.clear();
        self.session.overflow_log_next = PARAMS.overflow_log_interval_samples();

        // A failed resolve may work on a fresh attempt
        if let Some(source) = &self.session.source {
            let (_, _, failed, _, _) = resolve::snapshot(&self.resolve);
            if failed {
                resolve::rebind(&self.resolve, Some(source.clone()));
            }
        }
    }

    /// Move the play cursor by a signed sample count. Backward seeks
    /// replay buffered audio; forward seeks past the live edge become a
    /// pending discard drained by the render driver.
    pub(crate) fn seek_relative_samples(&mut self, delta: i64) {
        if self.session.source.is_none() || self.session.stream_eof {
            return;
        }
        let mut delta = delta as i128;
        // A backward seek first unwinds any pending forward discard
        if delta < 0 && self.session.seek_discard_samples > 0 {
            let pending = self.session.seek_discard_samples as i128;
            let unwound = (-delta).min(pending);
            self.session.seek_discard_samples = (pending - unwound) as u64;
            delta += unwound;
        }
        if delta != 0 {
            let overshoot = self.ring.seek_relative(delta as i64);
            self.session.seek_discard_samples += overshoot;
        }
        debug!(
            play_abs = self.ring.play_abs(),
            pending_discard = self.session.seek_discard_samples,
            "seek applied"
        );
    }

    /// Start a background resolve for the live source if none is
    /// running.
    pub(crate) fn kick_resolve(&mut self) -> bool {
        if let Some(source) = self.session.source.clone() {
            resolve::spawn_resolve(
                &self.handle,
                Arc::clone(&self.sidecar),
                Arc::clone(&self.resolve),
                source,
            )
        } else {
            false
        }
    }
}

impl Drop for StreamEngine {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            if let Some(pipeline) = self.pipeline.take() {
                pipeline.shutdown(runtime.handle());
            }
            let sidecar = Arc::clone(&self.sidecar);
            runtime.spawn(async move {
                sidecar.shutdown().await;
            });
            if Handle::try_current().is_ok() {
                // Dropped inside another runtime; cannot block here
                runtime.shutdown_background();
            } else {
                runtime.shutdown_timeout(Duration::from_millis(750));
            }
        }
    }
}
