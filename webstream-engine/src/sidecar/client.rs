//! Persistent sidecar helper client
//!
//! Owns the long-lived helper subprocess that performs provider searches
//! and URL resolution. The process is spawned lazily (or eagerly via
//! [`SidecarClient::warm_up`]), greets with `READY`, and then serves one
//! request at a time; an async mutex makes requests single-flight.
//!
//! Every read is bounded by a timeout. A timeout or protocol fault
//! tears the helper down so the next request starts a fresh one; a
//! search additionally retries once against the fresh helper, since the
//! most common fault is a helper wedged on a bad upstream connection.

use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::sanitize::{sanitize_header_text, sanitize_http_url};
use crate::sidecar::protocol::{self, RawSearchItem, ReplyLine, ResolvedMedia};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use webstream_common::params::PARAMS;

struct SidecarConn {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
}

/// Client for the persistent search/resolve helper process
pub struct SidecarClient {
    argv: Vec<String>,
    conn: Mutex<Option<SidecarConn>>,
}

impl SidecarClient {
    /// Create a client for the given helper command line.
    /// The helper is not started until the first request (or warm-up).
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            conn: Mutex::new(None),
        }
    }

    /// Start the helper now so the first request doesn't pay the
    /// startup cost.
    pub async fn warm_up(&self) -> Result<()> {
        let mut slot = self.conn.lock().await;
        Self::ensure_started(&mut slot, &self.argv).await?;
        Ok(())
    }

    /// Run a search, retrying once against a fresh helper on timeout.
    pub async fn search(
        &self,
        provider: &Provider,
        max_results: usize,
        query: &str,
    ) -> Result<Vec<RawSearchItem>> {
        let max_results = max_results.clamp(1, 50);
        let read_timeout = PARAMS.sidecar_search_timeout_ms();
        let mut slot = self.conn.lock().await;

        let mut retried = false;
        loop {
            let conn = Self::ensure_started(&mut slot, &self.argv).await?;
            let request = protocol::encode_search(provider, max_results, query);
            if let Err(e) = Self::send_line(conn, &request).await {
                Self::teardown(&mut slot).await;
                return Err(e);
            }

            match Self::collect_search(conn, max_results, read_timeout).await {
                Ok(items) => return Ok(items),
                Err(e @ Error::SidecarTimeout(_)) => {
                    Self::teardown(&mut slot).await;
                    if retried {
                        return Err(e);
                    }
                    retried = true;
                    warn!(provider = %provider, "search timed out, retrying with a fresh helper");
                }
                Err(e @ (Error::SidecarProtocol(_) | Error::Io(_))) => {
                    Self::teardown(&mut slot).await;
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Resolve a source page URL into playable media. No retry: a
    /// failed resolve falls back to the extractor pipeline instead.
    pub async fn resolve(&self, provider: &Provider, page_url: &str) -> Result<ResolvedMedia> {
        let read_timeout = PARAMS.sidecar_resolve_timeout_ms();
        let mut slot = self.conn.lock().await;

        let conn = Self::ensure_started(&mut slot, &self.argv).await?;
        let request = protocol::encode_resolve(provider, page_url);
        if let Err(e) = Self::send_line(conn, &request).await {
            Self::teardown(&mut slot).await;
            return Err(e);
        }

        loop {
            match Self::read_reply(conn, read_timeout).await {
                Ok(ReplyLine::ResolveOk(raw)) => {
                    let media_url = sanitize_http_url(&raw.media_url).ok_or_else(|| {
                        Error::ResolveFailed("helper returned an invalid media url".into())
                    })?;
                    return Ok(ResolvedMedia {
                        media_url,
                        user_agent: sanitize_header_text(&raw.user_agent),
                        referer: sanitize_header_text(&raw.referer),
                    });
                }
                Ok(ReplyLine::Error(message)) => return Err(Error::ResolveFailed(message)),
                Ok(other) => {
                    debug!(?other, "skipping unexpected reply during resolve");
                }
                Err(e) => {
                    Self::teardown(&mut slot).await;
                    return Err(e);
                }
            }
        }
    }

    /// Liveness probe.
    pub async fn ping(&self) -> Result<()> {
        let read_timeout = PARAMS.sidecar_start_timeout_ms();
        let mut slot = self.conn.lock().await;
        let conn = Self::ensure_started(&mut slot, &self.argv).await?;
        if let Err(e) = Self::send_line(conn, protocol::encode_ping()).await {
            Self::teardown(&mut slot).await;
            return Err(e);
        }
        match Self::read_reply(conn, read_timeout).await {
            Ok(ReplyLine::Pong) => Ok(()),
            Ok(other) => {
                Self::teardown(&mut slot).await;
                Err(Error::SidecarProtocol(format!(
                    "expected PONG, got {:?}",
                    other
                )))
            }
            Err(e) => {
                Self::teardown(&mut slot).await;
                Err(e)
            }
        }
    }

    /// Orderly shutdown: QUIT, bounded wait, then kill.
    pub async fn shutdown(&self) {
        let mut slot = self.conn.lock().await;
        Self::teardown(&mut slot).await;
    }

    async fn ensure_started<'a>(
        slot: &'a mut Option<SidecarConn>,
        argv: &[String],
    ) -> Result<&'a mut SidecarConn> {
        if slot.is_none() {
            if argv.is_empty() {
                return Err(Error::Config("empty sidecar command".into()));
            }
            debug!(command = %argv[0], "starting sidecar helper");
            let mut child = tokio::process::Command::new(&argv[0])
                .args(&argv[1..])
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| Error::ProcessSpawn(format!("sidecar helper: {}", e)))?;

            let stdin = child
                .stdin
                .take()
                .ok_or_else(|| Error::ProcessSpawn("sidecar stdin missing".into()))?;
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| Error::ProcessSpawn("sidecar stdout missing".into()))?;
            let mut conn = SidecarConn {
                child,
                stdin,
                lines: BufReader::new(stdout).lines(),
            };

            match Self::read_reply(&mut conn, PARAMS.sidecar_start_timeout_ms()).await {
                Ok(ReplyLine::Ready) => {
                    info!("sidecar helper ready");
                    *slot = Some(conn);
                }
                Ok(other) => {
                    let _ = conn.child.start_kill();
                    let _ = conn.child.wait().await;
                    return Err(Error::SidecarProtocol(format!(
                        "expected READY, got {:?}",
                        other
                    )));
                }
                Err(e) => {
                    let _ = conn.child.start_kill();
                    let _ = conn.child.wait().await;
                    return Err(e);
                }
            }
        }
        slot.as_mut()
            .ok_or_else(|| Error::SidecarProtocol("sidecar connection vanished".into()))
    }

    async fn collect_search(
        conn: &mut SidecarConn,
        max_results: usize,
        read_timeout: u64,
    ) -> Result<Vec<RawSearchItem>> {
        let mut items = Vec::new();
        loop {
            match Self::read_reply(conn, read_timeout).await? {
                ReplyLine::SearchBegin => {}
                ReplyLine::SearchItem(item) => {
                    if items.len() < max_results {
                        items.push(item);
                    }
                }
                ReplyLine::SearchEnd(count) => {
                    debug!(reported = count, kept = items.len(), "search complete");
                    return Ok(items);
                }
                ReplyLine::Error(message) => return Err(Error::SearchFailed(message)),
                other => {
                    debug!(?other, "skipping unexpected reply during search");
                }
            }
        }
    }

    async fn read_reply(conn: &mut SidecarConn, timeout_ms: u64) -> Result<ReplyLine> {
        match timeout(Duration::from_millis(timeout_ms), conn.lines.next_line()).await {
            Err(_) => Err(Error::SidecarTimeout(format!(
                "no reply within {}ms",
                timeout_ms
            ))),
            Ok(Err(e)) => Err(Error::SidecarProtocol(format!("read failed: {}", e))),
            Ok(Ok(None)) => Err(Error::SidecarProtocol(
                "helper closed its output".into(),
            )),
            Ok(Ok(Some(line))) => Ok(protocol::parse_reply(&line)),
        }
    }

    async fn send_line(conn: &mut SidecarConn, line: &str) -> Result<()> {
        conn.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::SidecarProtocol(format!("write failed: {}", e)))?;
        conn.stdin
            .flush()
            .await
            .map_err(|e| Error::SidecarProtocol(format!("flush failed: {}", e)))
    }

    async fn teardown(slot: &mut Option<SidecarConn>) {
        if let Some(mut conn) = slot.take() {
            let _ = conn.stdin.write_all(protocol::encode_quit().as_bytes()).await;
            let _ = conn.stdin.flush().await;
            match timeout(Duration::from_millis(500), conn.child.wait()).await {
                Ok(_) => debug!("sidecar helper exited after QUIT"),
                Err(_) => {
                    warn!("sidecar helper ignored QUIT, killing");
                    let _ = conn.child.start_kill();
                    let _ = conn.child.wait().await;
                }
            }
        }
    }
}
