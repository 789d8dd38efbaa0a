//! Real-time web audio streaming engine
//!
//! Streams audio from web sources (YouTube, SoundCloud, Freesound, the
//! Internet Archive) into fixed-size PCM render blocks. Extraction and
//! decoding are delegated to external tools (yt-dlp, ffmpeg) and a
//! persistent helper process; decoded s16le stereo flows through a ring
//! buffer with absolute sample cursors so the render path never blocks.
//!
//! The host drives the engine through two entry points:
//! - a string key/value control surface ([`StreamEngine::set_param`] /
//!   [`StreamEngine::get_param`])
//! - a per-block render call ([`StreamEngine::render`])
//!
//! Both are expected on the same thread (or otherwise serialized by the
//! host); everything slow runs on a private tokio runtime.

pub mod engine;
pub mod error;
pub mod playback;
pub mod provider;
pub mod sanitize;
pub mod sidecar;
pub mod workers;

pub use engine::StreamEngine;
pub use error::{Error, Result};
pub use provider::Provider;
pub use workers::search::{SearchResult, SearchStatus};
