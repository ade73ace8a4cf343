mod agent;
mod config;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use agent::Agent;
use config::{AgentConfig, Args, VERSION};
use kubestream_k8s::KubeClient;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Run the agent
    let result = run_agent(args).await;

    // Handle any errors
    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run_agent(args: Args) -> Result<()> {
    let config = AgentConfig::from_args(&args)?;
    info!(version = VERSION, env = %config.env, "starting kubestream agent");

    let kube_client = KubeClient::new(config.context.as_deref()).await?;
    match kube_client.server_version().await {
        Ok(version) => info!(server_version = %version, "connected to Kubernetes API server"),
        // Streams will report their own errors; keep serving the master
        Err(e) => warn!("Kubernetes API server check failed: {:#}", e),
    }

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("received interrupt, shutting down");
                    shutdown.cancel();
                }
                Err(e) => warn!("failed to listen for interrupt: {}", e),
            }
        }
    });

    let agent = Agent::new(config, Arc::new(kube_client));
    agent.run(shutdown).await
}
