//! Error types for webstream-engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid {0}")]
    InvalidInput(String),

    #[error("Failed to spawn process: {0}")]
    ProcessSpawn(String),

    #[error("Pipeline read failed: {0}")]
    PipelineRead(String),

    #[error("Sidecar timed out: {0}")]
    SidecarTimeout(String),

    #[error("Sidecar protocol error: {0}")]
    SidecarProtocol(String),

    #[error("Resolve failed: {0}")]
    ResolveFailed(String),

    #[error("Search failed: {0}")]
    SearchFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
