//! VSP-Monitor: Streaming front end for the vital-sign pipeline
//!
//! Sample sources for captures and piped devices, the async
//! producer/consumer orchestration and the command line surface.

pub mod cli;
pub mod source;
pub mod streaming;

pub use source::{ReaderSource, ReplaySource};
pub use streaming::{
    run_consumer, run_producer, spawn_stream, AnalysisReport, ConsumerSummary, StreamCommand,
    StreamHandle, StreamSummary,
};
