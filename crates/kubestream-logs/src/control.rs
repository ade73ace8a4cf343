use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::pump::{PumpOutcome, StreamPump, StreamSettings};
use crate::registry::SessionRegistry;
use crate::writer::OutboundWriter;
use kubestream_k8s::PodLogSource;
use kubestream_types::{
    ControlMessage, DecodeError, OutboundFrame, PodLogsStatus, StartPodLogs, StopPodLogs,
};

/// Dispatches start/stop requests from the master to log sessions
#[derive(Clone)]
pub struct ControlHandler {
    registry: SessionRegistry,
    writer: OutboundWriter,
    source: Arc<dyn PodLogSource>,
    settings: StreamSettings,
    pumps: TaskTracker,
}

impl ControlHandler {
    pub fn new(
        registry: SessionRegistry,
        writer: OutboundWriter,
        source: Arc<dyn PodLogSource>,
        settings: StreamSettings,
    ) -> Self {
        Self {
            registry,
            writer,
            source,
            settings,
            pumps: TaskTracker::new(),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Handle one inbound text frame; anything unparseable is logged and dropped
    ///
    /// Returns the spawned pump for a successful start.
    pub async fn handle_text(&self, text: &str) -> Option<JoinHandle<PumpOutcome>> {
        match ControlMessage::decode(text) {
            Ok(ControlMessage::StartPodLogs(req)) => self.start(req).await,
            Ok(ControlMessage::StopPodLogs(req)) => {
                self.stop(&req);
                None
            }
            Err(DecodeError::Unsupported(kind)) => {
                debug!(kind = %kind, "ignoring unsupported message type");
                None
            }
            Err(e) => {
                error!(error = %e, "failed to parse control message");
                None
            }
        }
    }

    /// Register a session, acknowledge it and spawn its pump
    pub async fn start(&self, req: StartPodLogs) -> Option<JoinHandle<PumpOutcome>> {
        let missing = req.missing_fields();
        if !missing.is_empty() {
            error!(
                connection_id = %req.connection_id,
                namespace = %req.namespace,
                pod = %req.pod_name,
                missing = ?missing,
                "start_pod_logs missing required fields"
            );
            return None;
        }
        if !self.writer.is_attached() {
            error!(
                connection_id = %req.connection_id,
                "no outbound connection for start_pod_logs"
            );
            return None;
        }

        info!(
            connection_id = %req.connection_id,
            namespace = %req.namespace,
            pod = %req.pod_name,
            container = req.requested_container().unwrap_or("<auto>"),
            "starting pod log stream"
        );

        let cancel = CancellationToken::new();
        let generation = self.registry.register(&req.connection_id, cancel.clone());

        let connected = PodLogsStatus::connected(req.connection_id.clone());
        if let Err(e) = self.writer.send(OutboundFrame::Status(connected)).await {
            warn!(
                connection_id = %req.connection_id,
                error = %e,
                "failed to acknowledge pod log stream"
            );
        }

        let pump = StreamPump::new(
            req,
            generation,
            cancel,
            self.registry.clone(),
            self.writer.clone(),
            Arc::clone(&self.source),
            self.settings.clone(),
        );
        Some(self.pumps.spawn(pump.run()))
    }

    /// Cancel the session; its pump reports `disconnected` on the way out
    pub fn stop(&self, req: &StopPodLogs) {
        if req.connection_id.is_empty() {
            warn!("stop_pod_logs missing connection_id");
            return;
        }

        if self.registry.cancel(&req.connection_id) {
            info!(connection_id = %req.connection_id, "stopping pod log stream");
        } else {
            debug!(connection_id = %req.connection_id, "no active pod log stream to stop");
        }
    }

    /// Cancel every session, e.g. when the master connection is lost
    ///
    /// Returns once every pump has sent its final status, so nothing from
    /// these sessions can reach a connection attached afterwards.
    pub async fn stop_all(&self) -> usize {
        let count = self.registry.cancel_all();
        if count > 0 {
            info!(count, "cancelled all pod log streams");
        }

        self.pumps.close();
        self.pumps.wait().await;
        self.pumps.reopen();
        count
    }
}
