use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::lines::{LineReader, ReadLine};
use crate::registry::SessionRegistry;
use crate::writer::OutboundWriter;
use kubestream_k8s::{LogRequest, LogStream, PodLogSource, SourceError, resolve_container};
use kubestream_types::{OutboundFrame, PodLogsStatus, StartPodLogs};

/// Historical lines requested when a stream opens
pub const DEFAULT_TAIL_LINES: i64 = 100;

/// Deadline for container selection plus opening the stream
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunables shared by every stream pump
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamSettings {
    pub tail_lines: i64,
    pub open_timeout: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            tail_lines: DEFAULT_TAIL_LINES,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
        }
    }
}

/// Why a log stream could not be opened
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("timed out after {}s opening log stream", .0.as_secs())]
    Timeout(Duration),

    #[error("failed to select a container: {0}")]
    Selection(#[source] SourceError),

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// How a pump terminated
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PumpOutcome {
    /// The stream reached its end
    Closed,
    /// The session was stopped or replaced
    Cancelled,
    /// Opening or reading failed
    Failed(String),
}

impl PumpOutcome {
    /// Terminal status frame reported to the master
    fn status(&self, connection_id: &str) -> PodLogsStatus {
        match self {
            Self::Closed | Self::Cancelled => PodLogsStatus::disconnected(connection_id),
            Self::Failed(detail) => PodLogsStatus::failed(connection_id, detail.clone()),
        }
    }
}

/// Per-session task that forwards a pod's log lines to the master
pub struct StreamPump {
    request: StartPodLogs,
    generation: u64,
    cancel: CancellationToken,
    registry: SessionRegistry,
    writer: OutboundWriter,
    source: Arc<dyn PodLogSource>,
    settings: StreamSettings,
}

impl StreamPump {
    pub fn new(
        request: StartPodLogs,
        generation: u64,
        cancel: CancellationToken,
        registry: SessionRegistry,
        writer: OutboundWriter,
        source: Arc<dyn PodLogSource>,
        settings: StreamSettings,
    ) -> Self {
        Self {
            request,
            generation,
            cancel,
            registry,
            writer,
            source,
            settings,
        }
    }

    /// Open the stream and forward lines until it ends, fails or is cancelled
    pub async fn run(self) -> PumpOutcome {
        let stream = tokio::select! {
            biased;

            _ = self.cancel.cancelled() => {
                return self.finish(PumpOutcome::Cancelled).await;
            }

            opened = self.open() => match opened {
                Ok(stream) => stream,
                Err(e) => {
                    error!(
                        connection_id = %self.request.connection_id,
                        namespace = %self.request.namespace,
                        pod = %self.request.pod_name,
                        error = %e,
                        "pod log stream open failed"
                    );
                    return self.finish(PumpOutcome::Failed(e.to_string())).await;
                }
            },
        };

        let outcome = self.pump(LineReader::new(stream)).await;
        self.finish(outcome).await
    }

    /// Resolve the container and open a following stream, bounded by the open timeout
    async fn open(&self) -> Result<LogStream, OpenError> {
        let namespace = self.request.namespace.as_str();
        let pod = self.request.pod_name.as_str();

        let opening = async {
            let container = match self.request.requested_container() {
                Some(container) => container.to_string(),
                None => {
                    let selected = resolve_container(self.source.as_ref(), namespace, pod)
                        .await
                        .map_err(OpenError::Selection)?;
                    info!(
                        namespace,
                        pod,
                        container = %selected,
                        "auto selected container for logs"
                    );
                    selected
                }
            };

            let request = LogRequest::follow(Some(container), self.settings.tail_lines);
            let stream = self.source.open_log_stream(namespace, pod, &request).await?;
            Ok(stream)
        };

        match tokio::time::timeout(self.settings.open_timeout, opening).await {
            Ok(result) => result,
            Err(_) => Err(OpenError::Timeout(self.settings.open_timeout)),
        }
    }

    async fn pump(&self, mut reader: LineReader) -> PumpOutcome {
        debug!(connection_id = %self.request.connection_id, "pod log stream opened");

        loop {
            if self.cancel.is_cancelled() {
                return PumpOutcome::Cancelled;
            }

            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return PumpOutcome::Cancelled,
                read = reader.read_line() => read,
            };

            match read {
                Ok(ReadLine::Text(line)) => {
                    if let Err(e) = self.writer.send(OutboundFrame::Line(line)).await {
                        debug!(
                            connection_id = %self.request.connection_id,
                            error = %e,
                            "dropped log line"
                        );
                    }
                }
                Ok(ReadLine::Blank) => {}
                Ok(ReadLine::End) => return PumpOutcome::Closed,
                Err(e) => {
                    warn!(
                        connection_id = %self.request.connection_id,
                        error = %e,
                        "pod log stream read failed"
                    );
                    return PumpOutcome::Failed(e.to_string());
                }
            }
        }
    }

    /// Evict the session and report its terminal status
    async fn finish(&self, outcome: PumpOutcome) -> PumpOutcome {
        let connection_id = self.request.connection_id.as_str();
        self.registry.remove(connection_id, self.generation);

        info!(connection_id, outcome = ?outcome, "pod log stream finished");

        let status = outcome.status(connection_id);
        if let Err(e) = self.writer.send(OutboundFrame::Status(status)).await {
            warn!(connection_id, error = %e, "failed to send pod log status");
        }

        outcome
    }
}
