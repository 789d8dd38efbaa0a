//! Resolve worker tests against a stub daemon script

mod helpers;

use helpers::{stub_daemon, DaemonBehavior};
use serial_test::serial;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use webstream_engine::provider::Provider;
use webstream_engine::sidecar::SidecarClient;
use webstream_engine::workers::resolve::{self, ResolveState, SharedResolveState, SourceKey};

fn source(url: &str) -> SourceKey {
    SourceKey {
        provider: Provider::Youtube,
        url: url.to_string(),
    }
}

async fn wait_not_running(state: &SharedResolveState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let (running, _, _, _, _) = resolve::snapshot(state);
        if !running {
            return;
        }
        assert!(Instant::now() < deadline, "resolve never finished");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
#[serial]
async fn stale_resolve_completion_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("daemon.log");
    // Slow enough that the source changes while the resolve is in flight
    let behavior = DaemonBehavior {
        resolve_reply:
            "sleep 0.3\nprintf 'RESOLVE_OK\\thttps://cdn.example.com/audio.m4a\\t\\t\\n'",
        ..Default::default()
    };
    let daemon = stub_daemon(dir.path(), &log, &behavior);
    let sidecar = Arc::new(SidecarClient::new(vec![
        "/bin/sh".to_string(),
        daemon.to_string_lossy().into_owned(),
    ]));
    let state: SharedResolveState = Arc::new(Mutex::new(ResolveState::default()));

    let first = source("https://www.youtube.com/watch?v=first");
    assert!(resolve::spawn_resolve(
        &Handle::current(),
        Arc::clone(&sidecar),
        Arc::clone(&state),
        first,
    ));

    // The live source moves on before the resolve completes
    let second = source("https://www.youtube.com/watch?v=second");
    resolve::rebind(&state, Some(second.clone()));

    wait_not_running(&state).await;
    let (_, ready, failed, media, error) = resolve::snapshot(&state);
    assert!(!ready, "stale media must not be installed for the new source");
    assert!(!failed, "a stale completion must not mark the new source failed");
    assert!(media.is_none());
    assert!(error.is_empty());

    // The new source resolves cleanly on a fresh attempt
    assert!(resolve::spawn_resolve(
        &Handle::current(),
        Arc::clone(&sidecar),
        Arc::clone(&state),
        second,
    ));
    wait_not_running(&state).await;
    let (_, ready, _, media, _) = resolve::snapshot(&state);
    assert!(ready);
    assert_eq!(
        media.map(|m| m.media_url).as_deref(),
        Some("https://cdn.example.com/audio.m4a")
    );

    sidecar.shutdown().await;
}
