//! Stream providers
//!
//! Canonical provider identities with alias folding and URL host
//! inference. The sidecar helper performs the provider-specific work;
//! this type keeps the engine-side routing decisions (which providers
//! may fall back to the extractor pipeline, which hosts map to which
//! provider) in one place.

use std::fmt;

/// A stream provider the sidecar knows how to search and resolve
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Provider {
    Youtube,
    Soundcloud,
    Freesound,
    Archive,
    /// Unrecognized provider id, passed through lower-cased for
    /// forward compatibility with newer sidecar builds
    Other(String),
}

impl Provider {
    /// Fold a raw provider string to its canonical form.
    ///
    /// Returns `None` for empty or all-whitespace input.
    pub fn normalize(raw: &str) -> Option<Provider> {
        let id = raw.trim().to_ascii_lowercase();
        if id.is_empty() {
            return None;
        }
        Some(match id.as_str() {
            "youtube" | "yt" => Provider::Youtube,
            "soundcloud" | "sc" => Provider::Soundcloud,
            "freesound" | "fs" => Provider::Freesound,
            "archive" | "ia" | "archiveorg" | "internetarchive" => Provider::Archive,
            _ => Provider::Other(id),
        })
    }

    /// Canonical id used on the wire and in logs.
    pub fn as_str(&self) -> &str {
        match self {
            Provider::Youtube => "youtube",
            Provider::Soundcloud => "soundcloud",
            Provider::Freesound => "freesound",
            Provider::Archive => "archive",
            Provider::Other(id) => id,
        }
    }

    /// Whether the yt-dlp extractor pipeline can serve this provider
    /// directly when resolution fails.
    pub fn supports_legacy_pipeline(&self) -> bool {
        matches!(self, Provider::Youtube | Provider::Soundcloud)
    }

    /// Infer a provider from a URL host.
    pub fn from_host(host: &str) -> Option<Provider> {
        let host = host.to_ascii_lowercase();
        let bare = host.strip_prefix("www.").unwrap_or(&host);
        if bare == "youtube.com"
            || bare == "youtu.be"
            || bare == "music.youtube.com"
            || bare.ends_with(".youtube.com")
        {
            Some(Provider::Youtube)
        } else if bare == "soundcloud.com" || bare.ends_with(".soundcloud.com") {
            Some(Provider::Soundcloud)
        } else if bare == "freesound.org" {
            Some(Provider::Freesound)
        } else if bare == "archive.org" || bare.ends_with(".archive.org") {
            Some(Provider::Archive)
        } else {
            None
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
