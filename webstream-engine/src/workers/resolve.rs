//! Background URL resolution
//!
//! One resolve runs at a time. Results are published only if the source
//! they were requested for is still the live source; a stale completion
//! is logged and discarded so a quick source change can never install
//! media for the previous URL.
//!
//! The state sits behind a plain mutex with short critical sections so
//! the synchronous render path can consult it every block without
//! touching the async runtime.

use crate::provider::Provider;
use crate::sidecar::protocol::ResolvedMedia;
use crate::sidecar::SidecarClient;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Identity of a stream source: provider plus page URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceKey {
    pub provider: Provider,
    pub url: String,
}

/// Resolution progress for the live source
#[derive(Debug, Default)]
pub struct ResolveState {
    /// Source the fields below describe
    pub key: Option<SourceKey>,
    /// A resolve task is in flight
    pub running: bool,
    /// Media is available
    pub ready: bool,
    /// Resolution failed for the live source
    pub failed: bool,
    pub media: Option<ResolvedMedia>,
    pub error: String,
}

pub type SharedResolveState = Arc<Mutex<ResolveState>>;

/// Point the state at a new live source (or none), clearing any
/// previous outcome. A task already in flight keeps running and will
/// discard itself as stale.
pub fn rebind(state: &SharedResolveState, key: Option<SourceKey>) {
    let mut st = state.lock().unwrap_or_else(|e| e.into_inner());
    st.key = key;
    st.ready = false;
    st.failed = false;
    st.media = None;
    st.error.clear();
}

/// Snapshot for the render path: (running, ready, failed, media, error).
pub fn snapshot(
    state: &SharedResolveState,
) -> (bool, bool, bool, Option<ResolvedMedia>, String) {
    let st = state.lock().unwrap_or_else(|e| e.into_inner());
    (
        st.running,
        st.ready,
        st.failed,
        st.media.clone(),
        st.error.clone(),
    )
}

/// Record a failure for the live source (e.g. the resolved pipeline
/// died mid-stream and the media should not be reused).
pub fn mark_failed(state: &SharedResolveState, error: &str) {
    let mut st = state.lock().unwrap_or_else(|e| e.into_inner());
    st.ready = false;
    st.media = None;
    st.failed = true;
    st.error = error.to_string();
}

/// Start a resolve for `key` unless one is already in flight.
/// Returns whether a task was spawned.
pub fn spawn_resolve(
    handle: &Handle,
    sidecar: Arc<SidecarClient>,
    state: SharedResolveState,
    key: SourceKey,
) -> bool {
    {
        let mut st = state.lock().unwrap_or_else(|e| e.into_inner());
        if st.running {
            return false;
        }
        st.running = true;
        st.ready = false;
        st.failed = false;
        st.media = None;
        st.error.clear();
        st.key = Some(key.clone());
    }

    debug!(provider = %key.provider, url = %key.url, "resolve started");
    handle.spawn(async move {
        let outcome = sidecar.resolve(&key.provider, &key.url).await;
        let mut st = state.lock().unwrap_or_else(|e| e.into_inner());
        if st.key.as_ref() == Some(&key) {
            match outcome {
                Ok(media) => {
                    info!(provider = %key.provider, "resolve succeeded");
                    st.ready = true;
                    st.media = Some(media);
                }
                Err(e) => {
                    warn!(provider = %key.provider, error = %e, "resolve failed");
                    st.failed = true;
                    st.error = e.to_string();
                }
            }
        } else {
            debug!(url = %key.url, "discarding stale resolve result");
        }
        st.running = false;
    });
    true
}
