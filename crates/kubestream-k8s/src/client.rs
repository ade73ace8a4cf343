use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use kube::api::LogParams;
use kube::config::KubeConfigOptions;

use crate::source::{LogRequest, LogStream, PodLogSource, SourceError};
use kubestream_types::{ContainerInfo, PodInfo};

/// Kubernetes client wrapper
#[derive(Clone)]
pub struct KubeClient {
    client: kube::Client,
}

impl KubeClient {
    /// Create a client from the in-cluster environment or the default kubeconfig,
    /// or from a named kubeconfig context when one is given
    pub async fn new(context: Option<&str>) -> Result<Self> {
        let config = match context {
            Some(context_name) => kube::Config::from_kubeconfig(&KubeConfigOptions {
                context: Some(context_name.to_string()),
                ..Default::default()
            })
            .await
            .context(format!(
                "Failed to create config for context: {}",
                context_name
            ))?,
            None => kube::Config::infer()
                .await
                .context(
                    "Failed to infer Kubernetes config. Is the agent running in a cluster?",
                )?,
        };

        let client =
            kube::Client::try_from(config).context("Failed to create Kubernetes client")?;

        Ok(Self { client })
    }

    /// Ask the API server for its version (used to verify connectivity on startup)
    pub async fn server_version(&self) -> Result<String> {
        let info = self
            .client
            .apiserver_version()
            .await
            .context("Failed to reach the Kubernetes API server")?;
        Ok(info.git_version)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Convert a k8s Pod to PodInfo, keeping containers in declaration order
    fn pod_to_info(pod: Pod, namespace: &str) -> PodInfo {
        let name = pod.metadata.name.unwrap_or_default();
        let mut info = PodInfo::new(name, namespace.to_string());

        if let Some(spec) = pod.spec {
            info.containers = spec
                .containers
                .into_iter()
                .map(|c| ContainerInfo::new(c.name))
                .collect();
        }

        info
    }
}

#[async_trait]
impl PodLogSource for KubeClient {
    async fn get_pod(&self, namespace: &str, pod: &str) -> Result<PodInfo, SourceError> {
        let found = self.pods(namespace).get(pod).await?;
        Ok(Self::pod_to_info(found, namespace))
    }

    async fn open_log_stream(
        &self,
        namespace: &str,
        pod: &str,
        request: &LogRequest,
    ) -> Result<LogStream, SourceError> {
        let params = LogParams {
            follow: request.follow,
            container: request.container.clone(),
            tail_lines: request.tail_lines,
            timestamps: request.timestamps,
            ..Default::default()
        };

        let stream = self.pods(namespace).log_stream(pod, &params).await?;
        Ok(Box::pin(stream))
    }
}
