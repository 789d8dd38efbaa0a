//! webstream - development host for the stream engine
//!
//! Drives the engine the way an embedding host would: either streams a
//! source URL as raw s16le stereo PCM on stdout (pipe it into aplay or
//! ffplay), or runs a provider search and prints the results as JSON
//! lines.

use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use webstream_common::config::WebstreamConfig;
use webstream_common::params::PARAMS;
use webstream_engine::StreamEngine;

/// Stereo frames rendered per block
const BLOCK_FRAMES: usize = 1024;

/// Command-line arguments for webstream
#[derive(Parser, Debug)]
#[command(name = "webstream")]
#[command(about = "Stream web audio sources as raw PCM")]
#[command(version)]
struct Args {
    /// Source page URL to stream
    #[arg(long)]
    url: Option<String>,

    /// Provider id or alias (inferred from the URL host when omitted)
    #[arg(long)]
    provider: Option<String>,

    /// Run a search instead of streaming
    #[arg(long)]
    search: Option<String>,

    /// Configuration file path
    #[arg(long, env = "WEBSTREAM_CONFIG")]
    config: Option<PathBuf>,

    /// Stop after this many seconds of audio (0 = play to the end)
    #[arg(long, default_value = "0")]
    limit_seconds: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "webstream=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = WebstreamConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;
    let mut engine = StreamEngine::new(config).context("Failed to initialize stream engine")?;

    if let Some(provider) = &args.provider {
        engine.set_param("stream_provider", provider);
        engine.set_param("search_provider", provider);
        if !engine.last_error().is_empty() {
            bail!("provider rejected: {}", engine.last_error());
        }
    }

    if let Some(query) = &args.search {
        return run_search(&mut engine, query);
    }

    let url = args
        .url
        .context("either --url or --search is required")?;
    run_stream(&mut engine, &url, args.limit_seconds)
}

/// Stream a source to stdout until eof or the time limit.
fn run_stream(engine: &mut StreamEngine, url: &str, limit_seconds: u64) -> Result<()> {
    engine.set_param("stream_url", url);
    if !engine.last_error().is_empty() {
        bail!("stream rejected: {}", engine.last_error());
    }

    let rate = PARAMS.working_sample_rate();
    let block_period = Duration::from_nanos(1_000_000_000 * BLOCK_FRAMES as u64 / rate as u64);
    let limit_frames = limit_seconds * rate as u64;

    info!(url, rate, "streaming");
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut block = vec![0i16; BLOCK_FRAMES * 2];
    let mut bytes = vec![0u8; BLOCK_FRAMES * 4];
    let mut frames_done: u64 = 0;
    let started = Instant::now();

    loop {
        engine.render(&mut block);
        for (chunk, sample) in bytes.chunks_exact_mut(2).zip(block.iter()) {
            chunk.copy_from_slice(&sample.to_le_bytes());
        }
        out.write_all(&bytes).context("stdout write failed")?;
        frames_done += BLOCK_FRAMES as u64;

        let status = engine.get_param("stream_status").unwrap_or_default();
        if status == "eof" {
            info!("stream finished: {}", engine.last_error());
            break;
        }
        if status == "stopped" {
            bail!("stream stopped: {}", engine.last_error());
        }
        if limit_frames > 0 && frames_done >= limit_frames {
            info!("time limit reached");
            break;
        }

        // Pace renders to real time so the engine sees callback-like load
        let target = block_period * (frames_done / BLOCK_FRAMES as u64) as u32;
        let elapsed = started.elapsed();
        if target > elapsed {
            std::thread::sleep(target - elapsed);
        }
    }
    out.flush().context("stdout flush failed")?;
    Ok(())
}

/// Run a search and print results as JSON lines.
fn run_search(engine: &mut StreamEngine, query: &str) -> Result<()> {
    engine.set_param("search_query", query);
    if !engine.last_error().is_empty() {
        bail!("search rejected: {}", engine.last_error());
    }

    let deadline = Instant::now() + Duration::from_secs(60);
    loop {
        let status = engine.get_param("search_status").unwrap_or_default();
        match status.as_str() {
            "done" | "no_results" => break,
            "error" => {
                let error = engine.get_param("search_error").unwrap_or_default();
                bail!("search failed: {}", error);
            }
            _ => {}
        }
        if Instant::now() >= deadline {
            bail!("search timed out");
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    let count: usize = engine
        .get_param("search_count")
        .unwrap_or_default()
        .parse()
        .unwrap_or(0);
    info!(
        count,
        elapsed_ms = %engine.get_param("search_elapsed_ms").unwrap_or_default(),
        "search complete"
    );
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for i in 0..count {
        let line = serde_json::json!({
            "provider": engine.get_param(&format!("search_result_provider_{}", i)),
            "title": engine.get_param(&format!("search_result_title_{}", i)),
            "channel": engine.get_param(&format!("search_result_channel_{}", i)),
            "duration": engine.get_param(&format!("search_result_duration_{}", i)),
            "url": engine.get_param(&format!("search_result_url_{}", i)),
        });
        writeln!(out, "{}", line).context("stdout write failed")?;
    }
    Ok(())
}
