//! Decode pipeline manager
//!
//! Two pipeline shapes produce the same output format (s16le, stereo,
//! working sample rate, on stdout):
//!
//! - **Legacy**: `yt-dlp <page_url> -o - | ffmpeg -i pipe:0 ... pipe:1`
//! - **Resolved**: `ffmpeg -i <media_url> ... pipe:1` with optional
//!   User-Agent/Referer headers from resolution
//!
//! A reader thread moves decoded bytes from the transcoder's stdout into
//! an SPSC byte ring; the render thread drains it without ever blocking.
//! Bytes arrive in arbitrary chunk sizes, so 0..=3 leftover bytes are
//! carried between reads and only whole 4-byte frames are converted to
//! samples.
//!
//! Teardown never blocks the caller either: the child processes are
//! detached into a reaper task that sends SIGTERM, grants a short grace
//! period, then SIGKILLs whatever is left.

use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::sidecar::protocol::ResolvedMedia;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapRb};
use std::io::Read;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use webstream_common::config::WebstreamConfig;
use webstream_common::params::PARAMS;

/// Byte ring between the reader thread and the render thread.
/// Roughly 370ms of stereo s16le at 44.1kHz.
const PIPE_RING_BYTES: usize = 64 * 1024;

/// Reader thread read chunk
const READ_CHUNK: usize = 4096;

/// SIGTERM grace period before SIGKILL
const REAP_GRACE: Duration = Duration::from_millis(200);

/// Which pipeline shape is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    /// yt-dlp extractor piped into the transcoder
    Legacy,
    /// Transcoder reading a resolved media URL directly
    Resolved,
}

/// Outcome of one non-blocking read from the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeRead {
    /// This many samples were written to the output slice
    Samples(usize),
    /// Nothing available right now; try again next block
    Empty,
    /// The pipeline finished and all buffered bytes are drained
    Ended,
    /// The pipeline failed; buffered bytes are drained
    Failed,
}

struct PipeShared {
    eof: AtomicBool,
    failed: AtomicBool,
    shutdown: AtomicBool,
}

/// A running decode pipeline
pub struct StreamPipeline {
    kind: PipelineKind,
    children: Vec<Child>,
    reader: Option<std::thread::JoinHandle<()>>,
    bytes: HeapCons<u8>,
    shared: Arc<PipeShared>,
    pending: [u8; 4],
    pending_len: usize,
}

impl StreamPipeline {
    /// Spawn the extractor pipeline for a source page URL.
    pub fn spawn_legacy(
        config: &WebstreamConfig,
        provider: &Provider,
        page_url: &str,
    ) -> Result<Self> {
        let mut ytdlp = Command::new(config.ytdlp());
        ytdlp.arg("--no-playlist");
        if *provider == Provider::Youtube {
            ytdlp.args(["--extractor-args", "youtube:player_skip=js"]);
        }
        ytdlp
            .args(["-f", "bestaudio[ext=m4a]/bestaudio", "-o", "-"])
            .arg(page_url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut extractor = ytdlp
            .spawn()
            .map_err(|e| Error::ProcessSpawn(format!("yt-dlp: {}", e)))?;
        let extractor_out = extractor
            .stdout
            .take()
            .ok_or_else(|| Error::ProcessSpawn("yt-dlp stdout missing".into()))?;

        let mut ffmpeg = Command::new(config.ffmpeg());
        ffmpeg
            .args(["-hide_banner", "-loglevel", "error"])
            .args(["-i", "pipe:0"]);
        Self::transcode_output_args(&mut ffmpeg);
        ffmpeg
            .stdin(Stdio::from(extractor_out))
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut transcoder = match ffmpeg.spawn() {
            Ok(child) => child,
            Err(e) => {
                let _ = extractor.kill();
                let _ = extractor.wait();
                return Err(Error::ProcessSpawn(format!("ffmpeg: {}", e)));
            }
        };
        let pcm_out = match transcoder.stdout.take() {
            Some(out) => out,
            None => {
                let _ = extractor.kill();
                let _ = extractor.wait();
                let _ = transcoder.kill();
                let _ = transcoder.wait();
                return Err(Error::ProcessSpawn("ffmpeg stdout missing".into()));
            }
        };

        info!(provider = %provider, "legacy pipeline started");
        Ok(Self::with_reader(
            PipelineKind::Legacy,
            vec![extractor, transcoder],
            pcm_out,
        ))
    }

    /// Spawn the transcoder alone against a resolved media URL.
    pub fn spawn_resolved(config: &WebstreamConfig, media: &ResolvedMedia) -> Result<Self> {
        let mut ffmpeg = Command::new(config.ffmpeg());
        ffmpeg.args(["-hide_banner", "-loglevel", "error"]);
        if !media.user_agent.is_empty() {
            ffmpeg.args(["-user_agent", &media.user_agent]);
        }
        if !media.referer.is_empty() {
            ffmpeg.args(["-referer", &media.referer]);
        }
        ffmpeg.args(["-i", &media.media_url]);
        Self::transcode_output_args(&mut ffmpeg);
        ffmpeg
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut transcoder = ffmpeg
            .spawn()
            .map_err(|e| Error::ProcessSpawn(format!("ffmpeg: {}", e)))?;
        let pcm_out = match transcoder.stdout.take() {
            Some(out) => out,
            None => {
                let _ = transcoder.kill();
                let _ = transcoder.wait();
                return Err(Error::ProcessSpawn("ffmpeg stdout missing".into()));
            }
        };

        info!("resolved pipeline started");
        Ok(Self::with_reader(
            PipelineKind::Resolved,
            vec![transcoder],
            pcm_out,
        ))
    }

    /// Output arguments shared by both shapes: drop non-audio streams,
    /// resample with drift compensation, emit s16le stereo on stdout.
    fn transcode_output_args(ffmpeg: &mut Command) {
        let rate = PARAMS.working_sample_rate();
        ffmpeg
            .args(["-vn", "-sn", "-dn"])
            .args([
                "-af",
                &format!("aresample={}:async=1:min_hard_comp=0.100:first_pts=0", rate),
            ])
            .args(["-f", "s16le", "-ac", "2", "-ar", &rate.to_string(), "pipe:1"]);
    }

    fn with_reader(kind: PipelineKind, children: Vec<Child>, mut out: ChildStdout) -> Self {
        let rb = HeapRb::<u8>::new(PIPE_RING_BYTES);
        let (mut prod, cons) = rb.split();
        let shared = Arc::new(PipeShared {
            eof: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        });

        let reader_shared = Arc::clone(&shared);
        let reader = std::thread::Builder::new()
            .name("webstream-pipe-reader".to_string())
            .spawn(move || {
                let mut buf = [0u8; READ_CHUNK];
                loop {
                    if reader_shared.shutdown.load(Ordering::Relaxed) {
                        return;
                    }
                    match out.read(&mut buf) {
                        Ok(0) => {
                            reader_shared.eof.store(true, Ordering::Release);
                            return;
                        }
                        Ok(n) => {
                            let mut off = 0;
                            while off < n {
                                if reader_shared.shutdown.load(Ordering::Relaxed) {
                                    return;
                                }
                                let pushed = prod.push_slice(&buf[off..n]);
                                if pushed == 0 {
                                    // Ring full; let the render side catch up
                                    std::thread::sleep(Duration::from_millis(2));
                                }
                                off += pushed;
                            }
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            warn!(error = %e, "pipeline read error");
                            reader_shared.failed.store(true, Ordering::Release);
                            return;
                        }
                    }
                }
            })
            .ok();

        Self {
            kind,
            children,
            reader,
            bytes: cons,
            shared,
            pending: [0u8; 4],
            pending_len: 0,
        }
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    /// Drain buffered bytes into whole samples without blocking.
    ///
    /// Callers should pass an even sample count (whole stereo frames).
    /// End and failure are only reported once every buffered byte has
    /// been consumed; a trailing partial frame is dropped.
    pub fn read_samples(&mut self, out: &mut [i16]) -> PipeRead {
        // Sample the flags before draining: the reader sets them only
        // after its final push, so a flag seen here means every byte is
        // already in the ring.
        let was_failed = self.shared.failed.load(Ordering::Acquire);
        let was_eof = self.shared.eof.load(Ordering::Acquire);

        let want = (out.len() * 2).saturating_sub(self.pending_len);
        let mut staged = [0u8; READ_CHUNK + 4];
        staged[..self.pending_len].copy_from_slice(&self.pending[..self.pending_len]);
        let want = want.min(READ_CHUNK);
        let n = self
            .bytes
            .pop_slice(&mut staged[self.pending_len..self.pending_len + want]);
        let total = self.pending_len + n;

        let aligned = total & !3;
        if aligned == 0 {
            self.pending[..total].copy_from_slice(&staged[..total]);
            self.pending_len = total;
            if n == 0 {
                if was_failed {
                    return PipeRead::Failed;
                }
                if was_eof {
                    if total > 0 {
                        debug!(bytes = total, "dropping trailing partial frame");
                        self.pending_len = 0;
                    }
                    return PipeRead::Ended;
                }
            }
            return PipeRead::Empty;
        }

        let samples = aligned / 2;
        for (i, chunk) in staged[..aligned].chunks_exact(2).enumerate() {
            out[i] = i16::from_le_bytes([chunk[0], chunk[1]]);
        }
        let remainder = total - aligned;
        self.pending[..remainder].copy_from_slice(&staged[aligned..total]);
        self.pending_len = remainder;
        PipeRead::Samples(samples)
    }

    /// Detach the children into a reaper running on the given runtime.
    /// Returns immediately; the reaper owns the orderly kill sequence.
    pub fn shutdown(mut self, handle: &tokio::runtime::Handle) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
        let children = std::mem::take(&mut self.children);
        let reader = self.reader.take();
        handle.spawn_blocking(move || reap(children, reader));
    }
}

impl Drop for StreamPipeline {
    fn drop(&mut self) {
        // Normal teardown goes through shutdown(); this path only runs
        // when the pipeline is dropped directly (tests, error unwinds).
        self.shared.shutdown.store(true, Ordering::Relaxed);
        for child in &mut self.children {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

/// SIGTERM each child, wait out a short grace period, then SIGKILL
/// stragglers. Runs on a blocking task, never on the render path.
fn reap(children: Vec<Child>, reader: Option<std::thread::JoinHandle<()>>) {
    for mut child in children {
        if matches!(child.try_wait(), Ok(Some(_))) {
            continue;
        }
        unsafe {
            libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
        }
        let deadline = Instant::now() + REAP_GRACE;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(?status, "pipeline child exited");
                    break;
                }
                _ if Instant::now() >= deadline => {
                    warn!("pipeline child ignored SIGTERM, killing");
                    let _ = child.kill();
                    let _ = child.wait();
                    break;
                }
                _ => std::thread::sleep(Duration::from_millis(10)),
            }
        }
    }
    if let Some(reader) = reader {
        let _ = reader.join();
    }
}
