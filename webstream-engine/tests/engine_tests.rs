//! End-to-end engine tests: control surface + render driver against
//! stub tools

mod helpers;

use helpers::{
    read_log, stub_config, stub_config_prefer_legacy, stub_daemon, stub_ffmpeg, stub_ytdlp,
    write_script, DaemonBehavior,
};
use serial_test::serial;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use webstream_engine::StreamEngine;

const BLOCK: usize = 2048;

/// Render until `stream_status` reports `wanted` (collecting every
/// status seen along the way) or the deadline passes.
fn render_until(
    engine: &mut StreamEngine,
    wanted: &str,
    deadline: Duration,
) -> (HashSet<String>, bool) {
    let mut seen = HashSet::new();
    let end = Instant::now() + deadline;
    let mut block = vec![0i16; BLOCK];
    loop {
        let status = engine.get_param("stream_status").unwrap();
        seen.insert(status.clone());
        if status == wanted {
            return (seen, true);
        }
        if Instant::now() >= end {
            return (seen, false);
        }
        engine.render(&mut block);
        std::thread::sleep(Duration::from_millis(2));
    }
}

fn wait_search_settled(engine: &StreamEngine, deadline: Duration) -> String {
    let end = Instant::now() + deadline;
    loop {
        let status = engine.get_param("search_status").unwrap();
        if matches!(status.as_str(), "done" | "no_results" | "error") {
            return status;
        }
        assert!(Instant::now() < end, "search never settled");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
#[serial]
fn resolved_stream_reaches_streaming_then_eof() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("daemon.log");
    let daemon = stub_daemon(dir.path(), &log, &DaemonBehavior::default());
    // Enough for priming (0.5s stereo = 44100 samples = 176400 bytes)
    let ffmpeg = stub_ffmpeg(dir.path(), 400_000);
    let marker = dir.path().join("ytdlp_ran");
    let ytdlp = stub_ytdlp(dir.path(), &marker);

    let mut engine = StreamEngine::new(stub_config(&ffmpeg, &ytdlp, &daemon)).unwrap();
    assert_eq!(engine.get_param("stream_status").unwrap(), "stopped");

    engine.set_param("stream_url", "https://www.youtube.com/watch?v=abc123");
    assert!(engine.last_error().is_empty());

    let (seen, reached) = render_until(&mut engine, "streaming", Duration::from_secs(10));
    assert!(reached, "never reached streaming, saw {:?}", seen);
    assert!(seen.contains("loading"));
    assert!(seen.contains("buffering"));

    // The resolved path must not have used the extractor
    assert!(!marker.exists());
    assert!(read_log(&log).contains("RESOLVE"));

    // A nonzero sample makes it out (stub emits 0x0101 bytes)
    let mut block = vec![0i16; BLOCK];
    let mut heard = false;
    for _ in 0..200 {
        engine.render(&mut block);
        if block.iter().any(|&s| s != 0) {
            heard = true;
            break;
        }
    }
    assert!(heard, "no audio reached the output");

    let (_, ended) = render_until(&mut engine, "eof", Duration::from_secs(10));
    assert!(ended, "stream never reached eof");
}

#[test]
#[serial]
fn resolve_failure_falls_back_to_extractor() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("daemon.log");
    let behavior = DaemonBehavior {
        resolve_reply: "printf 'ERROR\\tno formats found\\n'",
        ..Default::default()
    };
    let daemon = stub_daemon(dir.path(), &log, &behavior);
    let ffmpeg = write_script(dir.path(), "ffmpeg", "cat >/dev/null\nhead -c 400000 /dev/zero | tr '\\0' '\\1'");
    let marker = dir.path().join("ytdlp_ran");
    let ytdlp = stub_ytdlp(dir.path(), &marker);

    let mut engine = StreamEngine::new(stub_config(&ffmpeg, &ytdlp, &daemon)).unwrap();
    engine.set_param("stream_url", "https://www.youtube.com/watch?v=abc123");

    let (seen, reached) = render_until(&mut engine, "streaming", Duration::from_secs(10));
    assert!(reached, "fallback never streamed, saw {:?}", seen);
    assert!(marker.exists(), "extractor pipeline was not used");
}

#[test]
#[serial]
fn resolve_failure_without_fallback_ends_with_error() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("daemon.log");
    let behavior = DaemonBehavior {
        resolve_reply: "printf 'ERROR\\tno playable media\\n'",
        ..Default::default()
    };
    let daemon = stub_daemon(dir.path(), &log, &behavior);
    let ffmpeg = stub_ffmpeg(dir.path(), 1000);
    let marker = dir.path().join("ytdlp_ran");
    let ytdlp = stub_ytdlp(dir.path(), &marker);

    let mut engine = StreamEngine::new(stub_config(&ffmpeg, &ytdlp, &daemon)).unwrap();
    // Archive has no extractor fallback
    engine.set_param("stream_url", "https://archive.org/details/some-item");

    let (_, ended) = render_until(&mut engine, "eof", Duration::from_secs(10));
    assert!(ended);
    assert!(engine.last_error().contains("no playable media"));
    assert!(!marker.exists());
}

#[test]
#[serial]
fn prefer_legacy_skips_resolution() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("daemon.log");
    let daemon = stub_daemon(dir.path(), &log, &DaemonBehavior::default());
    let ffmpeg = write_script(dir.path(), "ffmpeg", "cat >/dev/null\nhead -c 400000 /dev/zero | tr '\\0' '\\1'");
    let marker = dir.path().join("ytdlp_ran");
    let ytdlp = stub_ytdlp(dir.path(), &marker);

    let config = stub_config_prefer_legacy(&ffmpeg, &ytdlp, &daemon, "youtube");
    let mut engine = StreamEngine::new(config).unwrap();
    engine.set_param("stream_url", "https://www.youtube.com/watch?v=abc123");

    let (_, reached) = render_until(&mut engine, "streaming", Duration::from_secs(10));
    assert!(reached);
    assert!(marker.exists());
    assert!(!read_log(&log).contains("RESOLVE"));
}

#[test]
#[serial]
fn invalid_url_records_error_and_keeps_playing() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("daemon.log");
    let daemon = stub_daemon(dir.path(), &log, &DaemonBehavior::default());
    let ffmpeg = stub_ffmpeg(dir.path(), 400_000);
    let marker = dir.path().join("ytdlp_ran");
    let ytdlp = stub_ytdlp(dir.path(), &marker);

    let mut engine = StreamEngine::new(stub_config(&ffmpeg, &ytdlp, &daemon)).unwrap();
    engine.set_param("stream_url", "https://www.youtube.com/watch?v=abc123");
    let (_, reached) = render_until(&mut engine, "streaming", Duration::from_secs(10));
    assert!(reached);

    engine.set_param("stream_url", "ftp://bad.example.com/x");
    assert_eq!(engine.last_error(), "invalid stream_url");
    assert_eq!(engine.get_param("stream_status").unwrap(), "streaming");
    assert_eq!(
        engine.get_param("stream_url").unwrap(),
        "https://www.youtube.com/watch?v=abc123"
    );

    // Unknown host with no provider hint is rejected too
    engine.set_param("stream_url", "https://example.com/audio");
    assert!(engine.last_error().starts_with("no provider for host"));
    assert_eq!(engine.get_param("stream_status").unwrap(), "streaming");
}

#[test]
#[serial]
fn empty_url_stops_playback() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("daemon.log");
    let daemon = stub_daemon(dir.path(), &log, &DaemonBehavior::default());
    let ffmpeg = stub_ffmpeg(dir.path(), 400_000);
    let marker = dir.path().join("ytdlp_ran");
    let ytdlp = stub_ytdlp(dir.path(), &marker);

    let mut engine = StreamEngine::new(stub_config(&ffmpeg, &ytdlp, &daemon)).unwrap();
    engine.set_param("stream_url", "https://www.youtube.com/watch?v=abc123");
    let (_, reached) = render_until(&mut engine, "streaming", Duration::from_secs(10));
    assert!(reached);

    engine.set_param("stream_url", "");
    assert_eq!(engine.get_param("stream_status").unwrap(), "stopped");
    assert!(engine.last_error().is_empty());
}

#[test]
#[serial]
fn play_pause_toggles_and_debounces() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("daemon.log");
    let daemon = stub_daemon(dir.path(), &log, &DaemonBehavior::default());
    let ffmpeg = stub_ffmpeg(dir.path(), 400_000);
    let marker = dir.path().join("ytdlp_ran");
    let ytdlp = stub_ytdlp(dir.path(), &marker);

    let mut engine = StreamEngine::new(stub_config(&ffmpeg, &ytdlp, &daemon)).unwrap();
    engine.set_param("stream_url", "https://www.youtube.com/watch?v=abc123");
    let (_, reached) = render_until(&mut engine, "streaming", Duration::from_secs(10));
    assert!(reached);

    engine.set_param("play_pause_step", "trigger");
    assert_eq!(engine.get_param("stream_status").unwrap(), "paused");

    // Inside the debounce window the repeat is swallowed
    engine.set_param("play_pause_step", "trigger");
    assert_eq!(engine.get_param("stream_status").unwrap(), "paused");

    std::thread::sleep(Duration::from_millis(250));
    engine.set_param("play_pause_step", "trigger");
    assert_eq!(engine.get_param("stream_status").unwrap(), "streaming");

    // The direct toggle variant is not debounced
    engine.set_param("play_pause_toggle", "");
    assert_eq!(engine.get_param("stream_status").unwrap(), "paused");
    engine.set_param("play_pause_toggle", "");
    assert_eq!(engine.get_param("stream_status").unwrap(), "streaming");
}

#[test]
#[serial]
fn legacy_counter_triggers_fire_on_increase() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("daemon.log");
    let daemon = stub_daemon(dir.path(), &log, &DaemonBehavior::default());
    let ffmpeg = stub_ffmpeg(dir.path(), 400_000);
    let marker = dir.path().join("ytdlp_ran");
    let ytdlp = stub_ytdlp(dir.path(), &marker);

    let mut engine = StreamEngine::new(stub_config(&ffmpeg, &ytdlp, &daemon)).unwrap();
    engine.set_param("stream_url", "https://www.youtube.com/watch?v=abc123");
    let (_, reached) = render_until(&mut engine, "streaming", Duration::from_secs(10));
    assert!(reached);

    // Same counter value repeated: no toggle
    engine.set_param("play_pause_step", "1");
    assert_eq!(engine.get_param("stream_status").unwrap(), "paused");
    std::thread::sleep(Duration::from_millis(250));
    engine.set_param("play_pause_step", "1");
    assert_eq!(engine.get_param("stream_status").unwrap(), "paused");
    engine.set_param("play_pause_step", "2");
    assert_eq!(engine.get_param("stream_status").unwrap(), "streaming");
}

#[test]
#[serial]
fn gain_is_clamped_and_validated() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("daemon.log");
    let daemon = stub_daemon(dir.path(), &log, &DaemonBehavior::default());
    let ffmpeg = stub_ffmpeg(dir.path(), 1000);
    let marker = dir.path().join("ytdlp_ran");
    let ytdlp = stub_ytdlp(dir.path(), &marker);

    let mut engine = StreamEngine::new(stub_config(&ffmpeg, &ytdlp, &daemon)).unwrap();
    assert_eq!(engine.get_param("gain").unwrap(), "1.00");

    engine.set_param("gain", "5.0");
    assert_eq!(engine.get_param("gain").unwrap(), "2.00");
    engine.set_param("gain", "-3");
    assert_eq!(engine.get_param("gain").unwrap(), "0.00");
    engine.set_param("gain", "0.5");
    assert_eq!(engine.get_param("gain").unwrap(), "0.50");

    engine.set_param("gain", "loud");
    assert!(engine.last_error().contains("invalid gain"));
    assert_eq!(engine.get_param("gain").unwrap(), "0.50");
}

#[test]
#[serial]
fn search_publishes_results_through_params() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("daemon.log");
    let daemon = stub_daemon(dir.path(), &log, &DaemonBehavior::default());
    let ffmpeg = stub_ffmpeg(dir.path(), 1000);
    let marker = dir.path().join("ytdlp_ran");
    let ytdlp = stub_ytdlp(dir.path(), &marker);

    let mut engine = StreamEngine::new(stub_config(&ffmpeg, &ytdlp, &daemon)).unwrap();
    assert_eq!(engine.get_param("search_status").unwrap(), "idle");

    engine.set_param("search_query", "ambient mix");
    let status = wait_search_settled(&engine, Duration::from_secs(10));
    assert_eq!(status, "done");
    assert_eq!(engine.get_param("search_count").unwrap(), "1");
    assert_eq!(
        engine.get_param("search_result_title_0").unwrap(),
        "result for ambient mix"
    );
    assert_eq!(
        engine.get_param("search_result_url_0").unwrap(),
        "https://www.youtube.com/watch?v=id1"
    );
    assert_eq!(
        engine.get_param("search_result_provider_0").unwrap(),
        "youtube"
    );
    // Out-of-range index reads as empty, not an error
    assert_eq!(engine.get_param("search_result_title_5").unwrap(), "");
    assert_eq!(engine.get_param("search_query").unwrap(), "ambient mix");
}

#[test]
#[serial]
fn rapid_searches_coalesce_to_the_newest() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("daemon.log");
    let behavior = DaemonBehavior {
        search_delay: "0.3",
        ..Default::default()
    };
    let daemon = stub_daemon(dir.path(), &log, &behavior);
    let ffmpeg = stub_ffmpeg(dir.path(), 1000);
    let marker = dir.path().join("ytdlp_ran");
    let ytdlp = stub_ytdlp(dir.path(), &marker);

    let mut engine = StreamEngine::new(stub_config(&ffmpeg, &ytdlp, &daemon)).unwrap();

    engine.set_param("search_query", "alpha");
    std::thread::sleep(Duration::from_millis(50));
    engine.set_param("search_query", "beta");
    engine.set_param("search_query", "gamma");
    assert_eq!(engine.get_param("search_status").unwrap(), "queued");
    // Queued is not an error state
    assert_eq!(engine.get_param("search_error").unwrap(), "");

    let status = wait_search_settled(&engine, Duration::from_secs(10));
    assert_eq!(status, "done");
    assert_eq!(
        engine.get_param("search_result_title_0").unwrap(),
        "result for gamma"
    );

    let log_text = read_log(&log);
    assert!(log_text.contains("SEARCH alpha"));
    assert!(log_text.contains("SEARCH gamma"));
    // The middle request was coalesced away
    assert!(!log_text.contains("SEARCH beta"));
}

#[test]
#[serial]
fn seek_forward_past_live_edge_reports_seeking() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("daemon.log");
    let daemon = stub_daemon(dir.path(), &log, &DaemonBehavior::default());
    let ffmpeg = stub_ffmpeg(dir.path(), 400_000);
    let marker = dir.path().join("ytdlp_ran");
    let ytdlp = stub_ytdlp(dir.path(), &marker);

    let mut engine = StreamEngine::new(stub_config(&ffmpeg, &ytdlp, &daemon)).unwrap();
    engine.set_param("stream_url", "https://www.youtube.com/watch?v=abc123");
    let (_, reached) = render_until(&mut engine, "streaming", Duration::from_secs(10));
    assert!(reached);

    // Stub stream is ~2.3s; seeking 1000s ahead overshoots for good
    engine.set_param("seek_delta_seconds", "1000");
    assert_eq!(engine.get_param("stream_status").unwrap(), "seeking");

    // The finite stream ends while the discard is still pending
    let (_, ended) = render_until(&mut engine, "eof", Duration::from_secs(10));
    assert!(ended);
}

#[test]
#[serial]
fn backward_seek_keeps_streaming() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("daemon.log");
    let daemon = stub_daemon(dir.path(), &log, &DaemonBehavior::default());
    let ffmpeg = stub_ffmpeg(dir.path(), 400_000);
    let marker = dir.path().join("ytdlp_ran");
    let ytdlp = stub_ytdlp(dir.path(), &marker);

    let mut engine = StreamEngine::new(stub_config(&ffmpeg, &ytdlp, &daemon)).unwrap();
    engine.set_param("stream_url", "https://www.youtube.com/watch?v=abc123");
    let (_, reached) = render_until(&mut engine, "streaming", Duration::from_secs(10));
    assert!(reached);

    engine.set_param("rewind_15_step", "trigger");
    assert!(engine.last_error().is_empty());
    assert_eq!(engine.get_param("stream_status").unwrap(), "streaming");
    let mut block = vec![0i16; BLOCK];
    engine.render(&mut block);
    assert_eq!(engine.get_param("stream_status").unwrap(), "streaming");
}

#[test]
#[serial]
fn disabled_provider_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("daemon.log");
    let daemon = stub_daemon(dir.path(), &log, &DaemonBehavior::default());
    let ffmpeg = stub_ffmpeg(dir.path(), 1000);
    let marker = dir.path().join("ytdlp_ran");
    let ytdlp = stub_ytdlp(dir.path(), &marker);

    let mut config = stub_config(&ffmpeg, &ytdlp, &daemon);
    config.providers.insert(
        "soundcloud".to_string(),
        webstream_common::config::ProviderConfig {
            enabled: false,
            prefer_legacy: false,
        },
    );
    let mut engine = StreamEngine::new(config).unwrap();

    engine.set_param("stream_url", "https://soundcloud.com/artist/track");
    assert_eq!(engine.last_error(), "provider disabled: soundcloud");
    assert_eq!(engine.get_param("stream_status").unwrap(), "stopped");
}

#[test]
#[serial]
fn unknown_params_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("daemon.log");
    let daemon = stub_daemon(dir.path(), &log, &DaemonBehavior::default());
    let ffmpeg = stub_ffmpeg(dir.path(), 1000);
    let marker = dir.path().join("ytdlp_ran");
    let ytdlp = stub_ytdlp(dir.path(), &marker);

    let mut engine = StreamEngine::new(stub_config(&ffmpeg, &ytdlp, &daemon)).unwrap();
    engine.set_param("no_such_param", "whatever");
    assert!(engine.last_error().is_empty());
    assert_eq!(engine.get_param("no_such_param"), None);
    assert_eq!(engine.get_param("name").unwrap(), "Web Stream");
}
