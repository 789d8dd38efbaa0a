//! Configuration loading
//!
//! TOML config resolved in priority order:
//! 1. Explicit path (e.g. from a command-line argument)
//! 2. `WEBSTREAM_CONFIG` environment variable
//! 3. `~/.config/webstream/config.toml`
//! 4. Compiled defaults
//!
//! Configures the external tool locations (yt-dlp, ffmpeg, the sidecar
//! command line) and per-provider overrides.

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file path
pub const CONFIG_ENV_VAR: &str = "WEBSTREAM_CONFIG";

/// Per-provider configuration overrides
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Whether this provider may be used at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Route new sources straight to the extractor pipeline, skipping
    /// resolution (only honored for fallback-capable providers)
    #[serde(default)]
    pub prefer_legacy: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefer_legacy: false,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Engine configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct WebstreamConfig {
    /// Path to the yt-dlp executable (default: found on PATH)
    pub ytdlp_path: Option<PathBuf>,
    /// Path to the ffmpeg executable (default: found on PATH)
    pub ffmpeg_path: Option<PathBuf>,
    /// Full sidecar command line as an argv vector
    /// (default: `python3 <helper> --ytdlp <ytdlp_path>`)
    pub sidecar_command: Option<Vec<String>>,
    /// Path to the sidecar helper script, used when `sidecar_command`
    /// is not set
    pub sidecar_script: Option<PathBuf>,
    /// Per-provider overrides keyed by canonical provider id
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl WebstreamConfig {
    /// Load configuration following the priority order.
    ///
    /// An explicit path or `WEBSTREAM_CONFIG` pointing at a missing or
    /// malformed file is an error; a merely absent default config file
    /// falls back to compiled defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_file(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::load_file(Path::new(&path));
        }

        if let Some(path) = default_config_path() {
            if path.exists() {
                return Self::load_file(&path);
            }
        }

        Ok(Self::default())
    }

    fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn ytdlp(&self) -> PathBuf {
        self.ytdlp_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("yt-dlp"))
    }

    pub fn ffmpeg(&self) -> PathBuf {
        self.ffmpeg_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("ffmpeg"))
    }

    /// Sidecar helper command line as an argv vector.
    pub fn sidecar_argv(&self) -> Vec<String> {
        if let Some(argv) = &self.sidecar_command {
            if !argv.is_empty() {
                return argv.clone();
            }
        }
        let script = self
            .sidecar_script
            .clone()
            .unwrap_or_else(|| PathBuf::from("stream_helper.py"));
        vec![
            "python3".to_string(),
            script.to_string_lossy().into_owned(),
            "--ytdlp".to_string(),
            self.ytdlp().to_string_lossy().into_owned(),
        ]
    }

    pub fn provider_enabled(&self, id: &str) -> bool {
        self.providers.get(id).map(|p| p.enabled).unwrap_or(true)
    }

    pub fn prefer_legacy(&self, id: &str) -> bool {
        self.providers
            .get(id)
            .map(|p| p.prefer_legacy)
            .unwrap_or(false)
    }
}

/// Default user config file path for the platform
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("webstream").join("config.toml"))
}
