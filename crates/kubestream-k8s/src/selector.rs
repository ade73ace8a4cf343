use tracing::debug;

use crate::source::{PodLogSource, SourceError};
use kubestream_types::PodInfo;

/// Name prefixes of proxy/mesh containers that are skipped during auto-selection
pub const SIDECAR_PREFIXES: [&str; 5] = [
    "istio-",
    "linkerd-",
    "kube-rbac-proxy",
    "istio-proxy",
    "istio-init",
];

/// Whether a container name follows a known sidecar naming convention
pub fn is_sidecar(name: &str) -> bool {
    SIDECAR_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

/// Pick the container to tail: the first non-sidecar in declaration order,
/// falling back to the first container when all of them are sidecars
pub fn select_container(pod: &PodInfo) -> Option<&str> {
    pod.container_names()
        .find(|name| !is_sidecar(name))
        .or_else(|| pod.container_names().next())
}

/// Fetch a pod and select its workload container
pub async fn resolve_container(
    source: &dyn PodLogSource,
    namespace: &str,
    pod: &str,
) -> Result<String, SourceError> {
    let info = source.get_pod(namespace, pod).await?;
    let selected = select_container(&info).ok_or_else(|| SourceError::NoContainers {
        namespace: namespace.to_string(),
        pod: pod.to_string(),
    })?;

    debug!(namespace, pod, container = selected, "auto selected container");
    Ok(selected.to_string())
}
