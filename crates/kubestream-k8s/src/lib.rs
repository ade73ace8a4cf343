//! Kubernetes client for kubestream
//!
//! This crate provides the cluster side of pod log streaming: the
//! [`PodLogSource`] seam consumed by the session manager, its `kube`-backed
//! implementation, and the container auto-selection heuristic.

mod client;
mod selector;
mod source;

pub use client::KubeClient;
pub use selector::{SIDECAR_PREFIXES, is_sidecar, resolve_container, select_container};
pub use source::{LogRequest, LogStream, PodLogSource, SourceError};

// Re-export types that are used in our public API
pub use kubestream_types::{ContainerInfo, PodInfo};
