//! Pod log session management for kubestream
//!
//! This crate owns the log sessions multiplexed over the master connection:
//! the session registry, the outbound writer, line framing, the per-session
//! stream pump and the control message handler that ties them together.

mod control;
mod lines;
mod pump;
mod registry;
mod writer;

#[cfg(test)]
mod testing;

pub use control::ControlHandler;
pub use lines::{LineReader, ReadLine, frame_line};
pub use pump::{
    DEFAULT_OPEN_TIMEOUT, DEFAULT_TAIL_LINES, OpenError, PumpOutcome, StreamPump, StreamSettings,
};
pub use registry::SessionRegistry;
pub use writer::{FrameSink, OutboundWriter, SendError};

// Re-export types used in our public API
pub use kubestream_types::{OutboundFrame, PodLogsStatus, StartPodLogs, StopPodLogs};
