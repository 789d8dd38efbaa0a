//! Playback data path: ring buffer and decode pipeline

pub mod pipeline;
pub mod ring_buffer;

pub use pipeline::{PipeRead, PipelineKind, StreamPipeline};
pub use ring_buffer::StreamRingBuffer;
