//! Background provider search
//!
//! One search runs at a time. A request arriving while one is in flight
//! replaces any previously queued request (depth-1 coalescing) and the
//! live query reports `queued`. When the in-flight search finishes it
//! publishes only if nothing newer is queued; otherwise its results are
//! discarded and the queued request runs next, all inside a single task.

use crate::provider::Provider;
use crate::sanitize::{sanitize_display_text, sanitize_http_url, sanitize_query};
use crate::sidecar::protocol::RawSearchItem;
use crate::sidecar::SidecarClient;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use webstream_common::params::PARAMS;

/// Search lifecycle as exposed on the control surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Idle,
    Searching,
    Queued,
    Done,
    NoResults,
    Error,
}

impl fmt::Display for SearchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchStatus::Idle => write!(f, "idle"),
            SearchStatus::Searching => write!(f, "searching"),
            SearchStatus::Queued => write!(f, "queued"),
            SearchStatus::Done => write!(f, "done"),
            SearchStatus::NoResults => write!(f, "no_results"),
            SearchStatus::Error => write!(f, "error"),
        }
    }
}

/// One sanitized search result
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub provider: Provider,
    pub id: String,
    pub title: String,
    pub channel: String,
    pub duration: String,
    pub url: String,
}

/// Search progress and published results
#[derive(Debug)]
pub struct SearchState {
    pub status: SearchStatus,
    pub error: String,
    /// Provider and query of the live (most recent) request
    pub provider: Provider,
    pub query: String,
    /// At most one request waiting behind the in-flight one
    pub queued: Option<(Provider, String)>,
    pub running: bool,
    pub elapsed_ms: u64,
    pub results: Vec<SearchResult>,
}

impl Default for SearchState {
    fn default() -> Self {
        Self {
            status: SearchStatus::Idle,
            error: String::new(),
            provider: Provider::Youtube,
            query: String::new(),
            queued: None,
            running: false,
            elapsed_ms: 0,
            results: Vec::new(),
        }
    }
}

pub type SharedSearchState = Arc<Mutex<SearchState>>;

/// Request a search. Returns the resulting live status: `searching`
/// when a task was spawned, `queued` when it replaced the waiting slot
/// behind an in-flight search.
pub fn start_search(
    handle: &Handle,
    sidecar: Arc<SidecarClient>,
    state: SharedSearchState,
    provider: Provider,
    query: String,
) -> SearchStatus {
    {
        let mut st = state.lock().unwrap_or_else(|e| e.into_inner());
        if st.running {
            debug!(provider = %provider, query = %query, "search queued behind in-flight request");
            st.queued = Some((provider.clone(), query.clone()));
            st.status = SearchStatus::Queued;
            st.error.clear();
            st.provider = provider;
            st.query = query;
            return SearchStatus::Queued;
        }
        st.running = true;
        mark_searching(&mut st, provider.clone(), query.clone());
    }

    let state_task = Arc::clone(&state);
    handle.spawn(async move {
        run_search_loop(sidecar, state_task, provider, query).await;
    });
    SearchStatus::Searching
}

fn mark_searching(st: &mut SearchState, provider: Provider, query: String) {
    st.status = SearchStatus::Searching;
    st.error.clear();
    st.provider = provider;
    st.query = query;
    st.results.clear();
    st.elapsed_ms = 0;
}

async fn run_search_loop(
    sidecar: Arc<SidecarClient>,
    state: SharedSearchState,
    provider: Provider,
    query: String,
) {
    let mut current = (provider, query);
    loop {
        let started = Instant::now();
        let limit = PARAMS.search_max_results();
        let clean_query = sanitize_query(&current.1);
        let outcome = sidecar.search(&current.0, limit, &clean_query).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let mut st = state.lock().unwrap_or_else(|e| e.into_inner());
        st.elapsed_ms = elapsed_ms;

        if let Some(next) = st.queued.take() {
            // A newer request superseded this one; its results are stale
            debug!(query = %current.1, "discarding superseded search results");
            mark_searching(&mut st, next.0.clone(), next.1.clone());
            current = next;
            continue;
        }

        match outcome {
            Ok(items) => {
                let results = publishable_results(&current.0, items, limit);
                if results.is_empty() {
                    info!(provider = %current.0, query = %clean_query, "search found nothing");
                    st.status = SearchStatus::NoResults;
                    st.error = "no results".to_string();
                } else {
                    info!(
                        provider = %current.0,
                        query = %clean_query,
                        count = results.len(),
                        elapsed_ms,
                        "search complete"
                    );
                    st.status = SearchStatus::Done;
                    st.error.clear();
                }
                st.results = results;
            }
            Err(e) => {
                warn!(provider = %current.0, query = %clean_query, error = %e, "search failed");
                st.status = SearchStatus::Error;
                st.error = e.to_string();
                st.results.clear();
            }
        }
        st.running = false;
        return;
    }
}

/// Sanitize raw items and drop the unusable ones (no title, or no URL
/// that survives validation).
fn publishable_results(
    provider: &Provider,
    items: Vec<RawSearchItem>,
    limit: usize,
) -> Vec<SearchResult> {
    let mut results = Vec::with_capacity(items.len().min(limit));
    for item in items {
        if results.len() >= limit {
            break;
        }
        let title = sanitize_display_text(&item.title);
        if title.is_empty() {
            continue;
        }
        let url = match sanitize_http_url(&item.url) {
            Some(url) => url,
            None => match result_url_from_id(provider, &item.id) {
                Some(url) => url,
                None => continue,
            },
        };
        results.push(SearchResult {
            provider: provider.clone(),
            id: sanitize_display_text(&item.id),
            title,
            channel: sanitize_display_text(&item.channel),
            duration: sanitize_display_text(&item.duration),
            url,
        });
    }
    results
}

/// Older helpers omit the URL field; reconstruct it from the id where
/// the provider has a canonical page URL shape.
fn result_url_from_id(provider: &Provider, id: &str) -> Option<String> {
    if id.is_empty() {
        return None;
    }
    match provider {
        Provider::Youtube => {
            sanitize_http_url(&format!("https://www.youtube.com/watch?v={}", id))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: &str, title: &str, url: &str) -> RawSearchItem {
        RawSearchItem {
            id: id.to_string(),
            title: title.to_string(),
            channel: "chan".to_string(),
            duration: "3:21".to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn status_display_is_lowercase() {
        assert_eq!(SearchStatus::Idle.to_string(), "idle");
        assert_eq!(SearchStatus::NoResults.to_string(), "no_results");
        assert_eq!(SearchStatus::Queued.to_string(), "queued");
    }

    #[test]
    fn unusable_items_are_dropped() {
        let items = vec![
            raw("a", "Good", "https://example.com/a"),
            raw("b", "", "https://example.com/b"),
            raw("", "No url at all", "not a url"),
        ];
        let results = publishable_results(&Provider::Soundcloud, items, 20);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Good");
    }

    #[test]
    fn youtube_url_reconstructed_from_id() {
        let items = vec![raw("abc123", "Title", "")];
        let results = publishable_results(&Provider::Youtube, items, 20);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://www.youtube.com/watch?v=abc123");

        // Non-youtube providers cannot reconstruct
        let items = vec![raw("abc123", "Title", "")];
        assert!(publishable_results(&Provider::Archive, items, 20).is_empty());
    }

    #[test]
    fn results_capped_at_limit() {
        let items: Vec<RawSearchItem> = (0..30)
            .map(|i| raw(&format!("id{}", i), "T", "https://example.com/x"))
            .collect();
        assert_eq!(publishable_results(&Provider::Youtube, items, 5).len(), 5);
    }
}
