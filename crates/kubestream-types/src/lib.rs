//! Shared types for kubestream
//!
//! This crate contains the pod metadata used by the cluster client and the
//! wire protocol spoken with the master over the shared connection.

use serde::{Deserialize, Serialize};

// ============================================================================
// Kubernetes Resource Types
// ============================================================================

/// Pod information needed to pick a log container
#[derive(Clone, Debug)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    /// Containers in declaration order (`spec.containers`)
    pub containers: Vec<ContainerInfo>,
}

impl PodInfo {
    pub fn new(name: String, namespace: String) -> Self {
        Self {
            name,
            namespace,
            containers: Vec::new(),
        }
    }

    /// Container names in declaration order
    pub fn container_names(&self) -> impl Iterator<Item = &str> {
        self.containers.iter().map(|c| c.name.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct ContainerInfo {
    pub name: String,
}

impl ContainerInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

// ============================================================================
// Inbound Control Messages
// ============================================================================

/// Request to start tailing a pod's logs under `connection_id`
///
/// Missing fields decode as empty strings so that validation can report them
/// instead of failing the whole frame.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct StartPodLogs {
    #[serde(default)]
    pub connection_id: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub pod_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
}

impl StartPodLogs {
    /// Explicitly requested container, ignoring blank values
    pub fn requested_container(&self) -> Option<&str> {
        self.container
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Names of required fields that are empty
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.connection_id.is_empty() {
            missing.push("connection_id");
        }
        if self.namespace.is_empty() {
            missing.push("namespace");
        }
        if self.pod_name.is_empty() {
            missing.push("pod_name");
        }
        missing
    }
}

/// Request to stop the session registered under `connection_id`
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct StopPodLogs {
    #[serde(default)]
    pub connection_id: String,
}

/// Control messages understood by the agent, keyed by their `type` field
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    #[serde(rename = "start_pod_logs")]
    StartPodLogs(StartPodLogs),
    #[serde(rename = "stop_pod_logs")]
    StopPodLogs(StopPodLogs),
}

/// Why an inbound frame could not be turned into a [`ControlMessage`]
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed control message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported message type: {0}")]
    Unsupported(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type", default)]
    kind: String,
}

impl ControlMessage {
    pub const START: &'static str = "start_pod_logs";
    pub const STOP: &'static str = "stop_pod_logs";

    /// Decode a text frame, separating unknown message types from broken JSON
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        match envelope.kind.as_str() {
            Self::START | Self::STOP => Ok(serde_json::from_str(text)?),
            other => Err(DecodeError::Unsupported(other.to_string())),
        }
    }
}

// ============================================================================
// Outbound Frames
// ============================================================================

/// Lifecycle status reported for a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Connected,
    Disconnected,
}

/// Status frame for one session; carries either a status or an error
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct PodLogsStatus {
    pub connection_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StreamStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PodLogsStatus {
    pub fn connected(connection_id: impl Into<String>) -> Self {
        Self::with_status(connection_id, StreamStatus::Connected)
    }

    pub fn disconnected(connection_id: impl Into<String>) -> Self {
        Self::with_status(connection_id, StreamStatus::Disconnected)
    }

    pub fn failed(connection_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            status: None,
            error: Some(error.into()),
        }
    }

    fn with_status(connection_id: impl Into<String>, status: StreamStatus) -> Self {
        Self {
            connection_id: connection_id.into(),
            status: Some(status),
            error: None,
        }
    }
}

/// A single message written to the master connection
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundFrame {
    /// JSON `{"type":"pod_logs", ...}` status frame
    Status(PodLogsStatus),
    /// One log line, sent as plain text
    Line(String),
    /// JSON `{"type":"heartbeat"}` keep-alive
    Heartbeat,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Tagged<'a> {
    PodLogs(&'a PodLogsStatus),
    Heartbeat,
}

impl OutboundFrame {
    /// Render the frame as the text payload put on the wire
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Status(status) => serde_json::to_string(&Tagged::PodLogs(status)),
            Self::Line(line) => Ok(line.clone()),
            Self::Heartbeat => serde_json::to_string(&Tagged::Heartbeat),
        }
    }
}
