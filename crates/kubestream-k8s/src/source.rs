use std::pin::Pin;

use async_trait::async_trait;
use futures::io::AsyncBufRead;

use kubestream_types::PodInfo;

/// Byte stream of a pod's log output
pub type LogStream = Pin<Box<dyn AsyncBufRead + Send>>;

/// Parameters for opening a pod log stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRequest {
    /// Container to read; `None` lets the API server pick
    pub container: Option<String>,
    /// Number of historical lines to start from
    pub tail_lines: Option<i64>,
    /// Keep the stream open and follow new output
    pub follow: bool,
    /// Prefix each line with the kubelet timestamp
    pub timestamps: bool,
}

impl LogRequest {
    /// Following, non-timestamped request starting `tail_lines` back
    pub fn follow(container: Option<String>, tail_lines: i64) -> Self {
        Self {
            container,
            tail_lines: Some(tail_lines),
            follow: true,
            timestamps: false,
        }
    }
}

/// Errors surfaced by a [`PodLogSource`]
///
/// The `Display` text is what the master sees in a session's error status.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    #[error("pod {namespace}/{pod} has no containers")]
    NoContainers { namespace: String, pod: String },

    #[error("{0}")]
    Unavailable(String),
}

/// Cluster capabilities the log session manager depends on
#[async_trait]
pub trait PodLogSource: Send + Sync {
    /// Fetch a pod's metadata by name
    async fn get_pod(&self, namespace: &str, pod: &str) -> Result<PodInfo, SourceError>;

    /// Open a log stream for a pod
    async fn open_log_stream(
        &self,
        namespace: &str,
        pod: &str,
        request: &LogRequest,
    ) -> Result<LogStream, SourceError>;
}
