//! Persistent sidecar helper process: wire protocol and client

pub mod client;
pub mod protocol;

pub use client::SidecarClient;
pub use protocol::{RawSearchItem, ReplyLine, ResolvedMedia};
