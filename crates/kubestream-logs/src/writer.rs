use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use kubestream_types::OutboundFrame;

/// Errors from delivering a frame to the master connection
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("no outbound connection")]
    NotConnected,

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Write half of the shared duplex connection
#[async_trait]
pub trait FrameSink: Send {
    /// Write one complete text message
    async fn send_text(&mut self, text: String) -> Result<(), SendError>;

    /// Flush and close the connection
    async fn close(&mut self) -> Result<(), SendError> {
        Ok(())
    }
}

/// Serializes every outbound frame through a single gate
///
/// The gate is held for exactly one frame, so frames from different sessions
/// interleave only at message granularity.
#[derive(Clone, Default)]
pub struct OutboundWriter {
    /// Current connection sink, if any
    sink: Arc<Mutex<Option<Box<dyn FrameSink>>>>,

    /// Mirrors `sink.is_some()` without taking the gate
    attached: Arc<AtomicBool>,
}

impl OutboundWriter {
    /// Create a writer with no connection attached
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer already attached to a sink
    pub fn with_sink(sink: impl FrameSink + 'static) -> Self {
        let sink: Box<dyn FrameSink> = Box::new(sink);
        Self {
            sink: Arc::new(Mutex::new(Some(sink))),
            attached: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Route subsequent frames to a new connection
    pub async fn attach(&self, sink: impl FrameSink + 'static) {
        let sink: Box<dyn FrameSink> = Box::new(sink);
        let mut guard = self.sink.lock().await;
        *guard = Some(sink);
        self.attached.store(true, Ordering::SeqCst);
    }

    /// Close and forget the current connection
    pub async fn detach(&self) {
        let mut guard = self.sink.lock().await;
        self.attached.store(false, Ordering::SeqCst);
        if let Some(mut sink) = guard.take() {
            // Best effort; the peer may already be gone
            let _ = sink.close().await;
        }
    }

    /// Whether a connection is currently attached
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    /// Deliver one frame, waiting for the gate
    pub async fn send(&self, frame: OutboundFrame) -> Result<(), SendError> {
        let text = frame.encode()?;
        let mut guard = self.sink.lock().await;
        match guard.as_mut() {
            Some(sink) => sink.send_text(text).await,
            None => Err(SendError::NotConnected),
        }
    }
}
