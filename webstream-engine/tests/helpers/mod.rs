//! Shared test support: stub tool scripts and configs
//!
//! The external tools (yt-dlp, ffmpeg, the sidecar helper) are replaced
//! with small shell scripts so the subprocess plumbing is exercised
//! without any network or real decoding.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use webstream_common::config::{ProviderConfig, WebstreamConfig};

/// Write an executable shell script into `dir` and return its path.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write script");
    let mut perms = fs::metadata(&path).expect("stat script").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod script");
    path
}

/// A stub transcoder that ignores its arguments and emits `bytes`
/// bytes of 0x01 on stdout.
pub fn stub_ffmpeg(dir: &Path, bytes: usize) -> PathBuf {
    // The short sleep keeps the engine observably in `buffering`
    // before the payload arrives
    write_script(
        dir,
        "ffmpeg",
        &format!("sleep 0.2\nhead -c {} /dev/zero | tr '\\0' '\\1'", bytes),
    )
}

/// A stub extractor that records it ran, then emits a little data so
/// the downstream transcoder has input.
pub fn stub_ytdlp(dir: &Path, marker: &Path) -> PathBuf {
    write_script(
        dir,
        "yt-dlp",
        &format!("echo ran >> {}\nprintf 'mediamedia'", marker.display()),
    )
}

/// Behavior knobs for the stub sidecar daemon.
pub struct DaemonBehavior {
    /// Seconds to sleep before answering a SEARCH (shell sleep arg)
    pub search_delay: &'static str,
    /// Full reply line(s) printed for a RESOLVE request
    pub resolve_reply: &'static str,
    /// When true, SEARCH logs the query and then never replies
    pub search_hangs: bool,
}

impl Default for DaemonBehavior {
    fn default() -> Self {
        Self {
            search_delay: "0",
            resolve_reply:
                "printf 'RESOLVE_OK\\thttps://cdn.example.com/audio.m4a\\tTestUA/1.0\\thttps://example.com/\\n'",
            search_hangs: false,
        }
    }
}

/// Write a stub sidecar daemon speaking the line protocol. Requests are
/// appended to `log` so tests can assert what actually reached it.
pub fn stub_daemon(dir: &Path, log: &Path, behavior: &DaemonBehavior) -> PathBuf {
    let search_body = if behavior.search_hangs {
        "sleep 30".to_string()
    } else {
        format!(
            r#"sleep {}
printf 'SEARCH_BEGIN\n'
printf 'SEARCH_ITEM\tid1\tresult for %s\tchan\t3:21\thttps://www.youtube.com/watch?v=id1\n' "$q"
printf 'SEARCH_END\t1\n'"#,
            behavior.search_delay
        )
    };
    let body = format!(
        r#"TAB=$(printf '\t')
LOG="{log}"
echo READY
while read -r line; do
  cmd=${{line%%"$TAB"*}}
  case "$cmd" in
    PING) echo PONG ;;
    SEARCH)
      q=${{line##*"$TAB"}}
      echo "SEARCH $q" >> "$LOG"
      {search_body}
      ;;
    RESOLVE)
      echo "RESOLVE" >> "$LOG"
      {resolve}
      ;;
    QUIT)
      echo "QUIT" >> "$LOG"
      echo BYE
      exit 0
      ;;
    *) printf 'ERROR\tunknown command\n' ;;
  esac
done"#,
        log = log.display(),
        search_body = search_body,
        resolve = behavior.resolve_reply,
    );
    write_script(dir, "daemon.sh", &body)
}

/// Engine config wired to the stub scripts.
pub fn stub_config(ffmpeg: &Path, ytdlp: &Path, daemon: &Path) -> WebstreamConfig {
    WebstreamConfig {
        ytdlp_path: Some(ytdlp.to_path_buf()),
        ffmpeg_path: Some(ffmpeg.to_path_buf()),
        sidecar_command: Some(vec![
            "/bin/sh".to_string(),
            daemon.to_string_lossy().into_owned(),
        ]),
        sidecar_script: None,
        providers: Default::default(),
    }
}

/// Like [`stub_config`] but with `prefer_legacy` set for a provider.
pub fn stub_config_prefer_legacy(
    ffmpeg: &Path,
    ytdlp: &Path,
    daemon: &Path,
    provider: &str,
) -> WebstreamConfig {
    let mut config = stub_config(ffmpeg, ytdlp, daemon);
    config.providers.insert(
        provider.to_string(),
        ProviderConfig {
            enabled: true,
            prefer_legacy: true,
        },
    );
    config
}

/// Read a log file, tolerating it not existing yet.
pub fn read_log(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_default()
}
