//! Control surface
//!
//! String key/value parameter interface the host drives the engine
//! with. Keys are parsed into a closed [`Param`] enum once, then
//! dispatched by match; unknown keys are ignored on set and return
//! `None` on get, so hosts built against a newer surface degrade
//! gracefully.

use crate::engine::StreamEngine;
use crate::error::Error;
use crate::provider::Provider;
use crate::sanitize::{sanitize_http_url, url_host};
use crate::workers::resolve::{self, SourceKey};
use crate::workers::search;
use std::sync::Arc;
use tracing::{debug, info};
use webstream_common::params::PARAMS;
use webstream_common::time::millis_to_duration;

/// Engine name reported by `get("name")`
const ENGINE_NAME: &str = "Web Stream";

/// Every parameter the control surface understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Param {
    // Writable
    Gain,
    StreamUrl,
    StreamProvider,
    SearchProvider,
    SearchQuery,
    SeekDeltaSeconds,
    PlayPauseToggle,
    PlayPauseStep,
    Stop,
    StopStep,
    Restart,
    RestartStep,
    RewindStep,
    ForwardStep,
    // Read-only
    Name,
    StreamStatus,
    StreamError,
    SearchStatus,
    SearchError,
    SearchCount,
    SearchElapsedMs,
    ResultTitle(usize),
    ResultChannel(usize),
    ResultDuration(usize),
    ResultUrl(usize),
    ResultProvider(usize),
}

impl Param {
    pub(crate) fn parse(key: &str) -> Option<Param> {
        Some(match key {
            "gain" => Param::Gain,
            "stream_url" => Param::StreamUrl,
            "stream_provider" => Param::StreamProvider,
            "search_provider" => Param::SearchProvider,
            "search_query" => Param::SearchQuery,
            "seek_delta_seconds" => Param::SeekDeltaSeconds,
            "play_pause_toggle" => Param::PlayPauseToggle,
            "play_pause_step" => Param::PlayPauseStep,
            "stop" => Param::Stop,
            "stop_step" => Param::StopStep,
            "restart" => Param::Restart,
            "restart_step" => Param::RestartStep,
            "rewind_15_step" => Param::RewindStep,
            "forward_15_step" => Param::ForwardStep,
            "name" | "preset_name" => Param::Name,
            "stream_status" => Param::StreamStatus,
            "stream_error" => Param::StreamError,
            "search_status" => Param::SearchStatus,
            "search_error" => Param::SearchError,
            "search_count" => Param::SearchCount,
            "search_elapsed_ms" => Param::SearchElapsedMs,
            _ => return Self::parse_indexed(key),
        })
    }

    fn parse_indexed(key: &str) -> Option<Param> {
        const PREFIXES: [(&str, fn(usize) -> Param); 5] = [
            ("search_result_title_", Param::ResultTitle),
            ("search_result_channel_", Param::ResultChannel),
            ("search_result_duration_", Param::ResultDuration),
            ("search_result_url_", Param::ResultUrl),
            ("search_result_provider_", Param::ResultProvider),
        ];
        for (prefix, build) in PREFIXES {
            if let Some(index) = key.strip_prefix(prefix) {
                return index.parse().ok().map(build);
            }
        }
        None
    }
}

impl StreamEngine {
    /// Set a control parameter. Invalid values record an error message
    /// (readable via `stream_error`) and leave playback untouched;
    /// unknown keys are ignored.
    pub fn set_param(&mut self, key: &str, value: &str) {
        let Some(param) = Param::parse(key) else {
            debug!(key, "ignoring unknown parameter");
            return;
        };
        match param {
            Param::Gain => self.set_gain(value),
            Param::StreamUrl => self.set_stream_url(value),
            Param::StreamProvider => {
                self.session.provider_hint = self.parse_provider_value(value);
            }
            Param::SearchProvider => {
                self.session.search_provider = self.parse_provider_value(value);
            }
            Param::SearchQuery => self.request_search(value),
            Param::SeekDeltaSeconds => self.set_seek_delta(value),
            Param::PlayPauseToggle => self.toggle_pause(),
            Param::PlayPauseStep => {
                if self.session.play_pause_steps.fires(value)
                    && self
                        .session
                        .play_pause_gate
                        .allow(millis_to_duration(PARAMS.debounce_play_pause_ms()))
                {
                    self.toggle_pause();
                }
            }
            Param::Stop => self.stop_everything(),
            Param::StopStep => {
                if self.session.stop_steps.fires(value)
                    && self
                        .session
                        .stop_gate
                        .allow(millis_to_duration(PARAMS.debounce_stop_ms()))
                {
                    self.stop_everything();
                }
            }
            Param::Restart => self.restart_current(),
            Param::RestartStep => {
                if self.session.restart_steps.fires(value)
                    && self
                        .session
                        .restart_gate
                        .allow(millis_to_duration(PARAMS.debounce_restart_ms()))
                {
                    self.restart_current();
                }
            }
            Param::RewindStep => {
                if self.session.rewind_steps.fires(value)
                    && self
                        .session
                        .rewind_gate
                        .allow(millis_to_duration(PARAMS.debounce_seek_ms()))
                {
                    self.seek_relative_samples(-PARAMS.seek_step_samples());
                }
            }
            Param::ForwardStep => {
                if self.session.forward_steps.fires(value)
                    && self
                        .session
                        .forward_gate
                        .allow(millis_to_duration(PARAMS.debounce_seek_ms()))
                {
                    self.seek_relative_samples(PARAMS.seek_step_samples());
                }
            }
            // Read-only keys are ignored on set
            _ => debug!(key, "ignoring set of read-only parameter"),
        }
    }

    /// Read a control parameter. Unknown keys return `None`; known keys
    /// always return a value (possibly empty).
    pub fn get_param(&self, key: &str) -> Option<String> {
        let param = Param::parse(key)?;
        Some(match param {
            Param::Name => ENGINE_NAME.to_string(),
            Param::Gain => format!("{:.2}", self.session.gain),
            Param::StreamUrl => self
                .session
                .source
                .as_ref()
                .map(|s| s.url.clone())
                .unwrap_or_default(),
            Param::StreamProvider => self
                .session
                .source
                .as_ref()
                .map(|s| s.provider.to_string())
                .or_else(|| self.session.provider_hint.as_ref().map(|p| p.to_string()))
                .unwrap_or_default(),
            Param::SearchProvider => self
                .session
                .search_provider
                .as_ref()
                .map(|p| p.to_string())
                .unwrap_or_default(),
            Param::StreamStatus => self.stream_status().to_string(),
            Param::StreamError => self.session.error_msg.clone(),
            Param::SeekDeltaSeconds
            | Param::PlayPauseToggle
            | Param::Stop
            | Param::Restart => String::new(),
            Param::PlayPauseStep
            | Param::StopStep
            | Param::RestartStep
            | Param::RewindStep
            | Param::ForwardStep => "idle".to_string(),
            Param::SearchStatus => {
                let st = self.search.lock().unwrap_or_else(|e| e.into_inner());
                st.status.to_string()
            }
            Param::SearchError => {
                let st = self.search.lock().unwrap_or_else(|e| e.into_inner());
                st.error.clone()
            }
            Param::SearchQuery => {
                let st = self.search.lock().unwrap_or_else(|e| e.into_inner());
                st.query.clone()
            }
            Param::SearchCount => {
                let st = self.search.lock().unwrap_or_else(|e| e.into_inner());
                st.results.len().to_string()
            }
            Param::SearchElapsedMs => {
                let st = self.search.lock().unwrap_or_else(|e| e.into_inner());
                st.elapsed_ms.to_string()
            }
            Param::ResultTitle(i) => self.result_field(i, |r| r.title.clone()),
            Param::ResultChannel(i) => self.result_field(i, |r| r.channel.clone()),
            Param::ResultDuration(i) => self.result_field(i, |r| r.duration.clone()),
            Param::ResultUrl(i) => self.result_field(i, |r| r.url.clone()),
            Param::ResultProvider(i) => self.result_field(i, |r| r.provider.to_string()),
        })
    }

    fn result_field(
        &self,
        index: usize,
        field: impl Fn(&crate::workers::search::SearchResult) -> String,
    ) -> String {
        let st = self.search.lock().unwrap_or_else(|e| e.into_inner());
        st.results.get(index).map(field).unwrap_or_default()
    }

    /// Stream lifecycle as exposed on the control surface.
    pub(crate) fn stream_status(&self) -> &'static str {
        if self.session.source.is_none() {
            "stopped"
        } else if self.session.stream_eof {
            "eof"
        } else if self.session.paused {
            "paused"
        } else if self.session.seek_discard_samples > 0 {
            "seeking"
        } else if self.pipeline.is_none() {
            "loading"
        } else if self.session.prime_needed_samples > 0
            && self.ring.available() < self.session.prime_needed_samples
        {
            "buffering"
        } else {
            "streaming"
        }
    }

    fn set_gain(&mut self, value: &str) {
        match value.trim().parse::<f32>() {
            Ok(gain) if gain.is_finite() => {
                self.session.gain = gain.clamp(0.0, 2.0);
                debug!(gain = self.session.gain, "gain set");
            }
            _ => {
                let e = Error::InvalidInput(format!("gain value: {}", value));
                self.set_error(e.to_string());
            }
        }
    }

    fn parse_provider_value(&mut self, value: &str) -> Option<Provider> {
        let provider = Provider::normalize(value)?;
        if !self.config.provider_enabled(provider.as_str()) {
            self.set_error(format!("provider disabled: {}", provider));
            return None;
        }
        Some(provider)
    }

    /// Point the engine at a new source page URL. An empty value stops
    /// playback; an invalid value records an error and leaves any
    /// current stream untouched.
    fn set_stream_url(&mut self, raw: &str) {
        let raw = raw.trim();
        if raw.is_empty() {
            self.stop_everything();
            return;
        }
        let Some(url) = sanitize_http_url(raw) else {
            self.set_error(Error::InvalidInput("stream_url".into()).to_string());
            return;
        };
        let Some(host) = url_host(&url).map(str::to_string) else {
            self.set_error(Error::InvalidInput("stream_url host".into()).to_string());
            return;
        };
        let provider = match self
            .session
            .provider_hint
            .clone()
            .or_else(|| Provider::from_host(&host))
        {
            Some(p) => p,
            None => {
                self.set_error(format!("no provider for host: {}", host));
                return;
            }
        };
        if !self.config.provider_enabled(provider.as_str()) {
            self.set_error(format!("provider disabled: {}", provider));
            return;
        }

        let source = SourceKey {
            provider: provider.clone(),
            url,
        };
        info!(provider = %provider, url = %source.url, "stream source set");
        self.session.source = Some(source.clone());
        self.session.legacy_preferred = provider.supports_legacy_pipeline()
            && self.config.prefer_legacy(provider.as_str());
        self.restart_from_beginning();
        resolve::rebind(&self.resolve, Some(source));
        if !self.session.legacy_preferred {
            self.kick_resolve();
        }
    }

    fn toggle_pause(&mut self) {
        if self.session.source.is_some() && !self.session.stream_eof {
            self.session.paused = !self.session.paused;
            info!(paused = self.session.paused, "play/pause toggled");
        }
    }

    fn restart_current(&mut self) {
        if self.session.source.is_none() {
            return;
        }
        info!("restarting stream from the beginning");
        self.restart_from_beginning();
        if !self.session.legacy_preferred {
            self.kick_resolve();
        }
    }

    fn set_seek_delta(&mut self, value: &str) {
        match value.trim().parse::<i64>() {
            Ok(seconds) => {
                let samples = seconds.saturating_mul(PARAMS.working_sample_rate() as i64 * 2);
                self.seek_relative_samples(samples);
            }
            Err(_) => {
                let e = Error::InvalidInput(format!("seek value: {}", value));
                self.set_error(e.to_string());
            }
        }
    }

    fn request_search(&mut self, raw_query: &str) {
        let query = raw_query.trim();
        if query.is_empty() {
            self.set_error("empty search query");
            return;
        }
        let provider = self
            .session
            .search_provider
            .clone()
            .or_else(|| self.session.provider_hint.clone())
            .unwrap_or(Provider::Youtube);
        if !self.config.provider_enabled(provider.as_str()) {
            self.set_error(format!("provider disabled: {}", provider));
            return;
        }
        let status = search::start_search(
            self.handle(),
            Arc::clone(&self.sidecar),
            Arc::clone(&self.search),
            provider,
            query.to_string(),
        );
        debug!(%status, query, "search requested");
    }
}
