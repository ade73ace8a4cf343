//! In-memory stand-ins for the master connection and the cluster

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::writer::{FrameSink, SendError};
use kubestream_k8s::{LogRequest, LogStream, PodLogSource, SourceError};
use kubestream_types::{ContainerInfo, PodInfo, PodLogsStatus};

/// Records every frame written to it
#[derive(Clone, Default)]
pub struct MemorySink {
    frames: Arc<Mutex<Vec<String>>>,
    closed: Arc<Mutex<bool>>,
    notify: Arc<Notify>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().clone()
    }

    /// Frames that decode as `pod_logs` status messages
    pub fn statuses(&self) -> Vec<PodLogsStatus> {
        self.frames()
            .iter()
            .filter_map(|f| serde_json::from_str::<serde_json::Value>(f).ok())
            .filter(|v| v.get("type").and_then(|t| t.as_str()) == Some("pod_logs"))
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }

    /// Wait until at least `count` frames have been written
    pub async fn wait_for_frames(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.frames.lock().len() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_text(&mut self, text: String) -> Result<(), SendError> {
        self.frames.lock().push(text);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SendError> {
        *self.closed.lock() = true;
        Ok(())
    }
}

/// Writes each frame one byte at a time, yielding in between
///
/// Any frame written without holding the outbound gate would end up
/// interleaved with others in the shared buffer.
#[derive(Clone, Default)]
pub struct ChunkedSink {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl ChunkedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.bytes.lock())
            .split_terminator('\n')
            .map(str::to_string)
            .collect()
    }
}

#[async_trait]
impl FrameSink for ChunkedSink {
    async fn send_text(&mut self, text: String) -> Result<(), SendError> {
        for byte in text.bytes().chain(std::iter::once(b'\n')) {
            self.bytes.lock().push(byte);
            tokio::task::yield_now().await;
        }
        Ok(())
    }
}

/// Log stream over fixed chunks
pub fn chunked_stream(chunks: &[&str]) -> LogStream {
    let items: Vec<io::Result<Vec<u8>>> = chunks
        .iter()
        .map(|c| Ok(c.as_bytes().to_vec()))
        .collect();
    Box::pin(stream::iter(items).into_async_read())
}

#[derive(Clone)]
enum OpenBehavior {
    Succeed,
    Fail(String),
    Hang,
}

struct Script {
    containers: Vec<String>,
    chunks: Vec<String>,
    read_error: Option<String>,
    hang_after_chunks: bool,
    open: OpenBehavior,
    requests: Vec<LogRequest>,
}

/// Scripted cluster that serves one pod and records log requests
#[derive(Clone)]
pub struct ScriptedSource {
    script: Arc<Mutex<Script>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                containers: vec!["app".to_string()],
                chunks: Vec::new(),
                read_error: None,
                hang_after_chunks: false,
                open: OpenBehavior::Succeed,
                requests: Vec::new(),
            })),
        }
    }

    pub fn with_containers(self, names: &[&str]) -> Self {
        self.script.lock().containers = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_chunks(self, chunks: &[&str]) -> Self {
        self.script.lock().chunks = chunks.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Fail the read that follows the scripted chunks
    pub fn failing_read(self, message: &str) -> Self {
        self.script.lock().read_error = Some(message.to_string());
        self
    }

    /// Keep the stream open after the scripted chunks
    pub fn hanging_after_chunks(self) -> Self {
        self.script.lock().hang_after_chunks = true;
        self
    }

    pub fn failing_open(self, message: &str) -> Self {
        self.script.lock().open = OpenBehavior::Fail(message.to_string());
        self
    }

    pub fn hanging_open(self) -> Self {
        self.script.lock().open = OpenBehavior::Hang;
        self
    }

    pub fn requests(&self) -> Vec<LogRequest> {
        self.script.lock().requests.clone()
    }

    fn build_stream(&self) -> LogStream {
        let script = self.script.lock();
        let mut items: Vec<io::Result<Vec<u8>>> =
            script.chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect();
        if let Some(message) = &script.read_error {
            items.push(Err(io::Error::other(message.clone())));
        }

        let chunks: BoxStream<'static, io::Result<Vec<u8>>> = if script.hang_after_chunks {
            stream::iter(items).chain(stream::pending()).boxed()
        } else {
            stream::iter(items).boxed()
        };
        Box::pin(chunks.into_async_read())
    }
}

#[async_trait]
impl PodLogSource for ScriptedSource {
    async fn get_pod(&self, namespace: &str, pod: &str) -> Result<PodInfo, SourceError> {
        let mut info = PodInfo::new(pod.to_string(), namespace.to_string());
        info.containers = self
            .script
            .lock()
            .containers
            .iter()
            .map(ContainerInfo::new)
            .collect();
        Ok(info)
    }

    async fn open_log_stream(
        &self,
        _namespace: &str,
        _pod: &str,
        request: &LogRequest,
    ) -> Result<LogStream, SourceError> {
        let open = {
            let mut script = self.script.lock();
            script.requests.push(request.clone());
            script.open.clone()
        };

        match open {
            OpenBehavior::Succeed => Ok(self.build_stream()),
            OpenBehavior::Fail(message) => Err(SourceError::Unavailable(message)),
            OpenBehavior::Hang => futures::future::pending().await,
        }
    }
}
