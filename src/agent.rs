//! Master connection loop
//!
//! Keeps one WebSocket connection to the master alive, feeds inbound control
//! messages to the [`ControlHandler`] and routes every outbound frame through
//! the shared [`OutboundWriter`].

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use url::Url;

use crate::config::AgentConfig;
use kubestream_k8s::PodLogSource;
use kubestream_logs::{
    ControlHandler, FrameSink, OutboundFrame, OutboundWriter, SendError, SessionRegistry,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the master WebSocket
struct WsSink(SplitSink<WsStream, Message>);

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), SendError> {
        self.0
            .send(Message::Text(text))
            .await
            .map_err(|e| SendError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), SendError> {
        self.0
            .close()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))
    }
}

/// Long-running agent that serves log sessions for one master
pub struct Agent {
    config: AgentConfig,
    writer: OutboundWriter,
    handler: ControlHandler,
}

impl Agent {
    pub fn new(config: AgentConfig, source: Arc<dyn PodLogSource>) -> Self {
        let writer = OutboundWriter::new();
        let handler = ControlHandler::new(
            SessionRegistry::new(),
            writer.clone(),
            source,
            config.stream.clone(),
        );

        Self {
            config,
            writer,
            handler,
        }
    }

    /// Connect, serve and reconnect until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let url = self.config.websocket_url()?;

        loop {
            match self.serve_connection(&url, &shutdown).await {
                Ok(()) => info!("master connection closed"),
                Err(e) => error!("master connection failed: {:#}", e),
            }

            // Sessions never outlive the connection they were started on.
            // Waiting for their pumps keeps late statuses off the next connection.
            self.writer.detach().await;
            self.handler.stop_all().await;

            if shutdown.is_cancelled() {
                break;
            }

            info!(
                delay_secs = self.config.reconnect_delay.as_secs(),
                "reconnecting to master"
            );
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }

        info!("agent stopped");
        Ok(())
    }

    async fn serve_connection(&self, url: &Url, shutdown: &CancellationToken) -> Result<()> {
        let (ws, _) = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            connected = connect_async(url.as_str()) => {
                connected.context(format!("Failed to connect to master at {}", url))?
            }
        };
        info!(url = %url, "connected to master");

        let (sink, mut stream) = ws.split();
        self.writer.attach(WsSink(sink)).await;

        let mut heartbeat = tokio::time::interval(self.config.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),

                _ = heartbeat.tick() => {
                    self.writer
                        .send(OutboundFrame::Heartbeat)
                        .await
                        .context("Failed to send heartbeat")?;
                    debug!("sent heartbeat");
                }

                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        self.handler.handle_text(&text).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(frame = ?frame, "master sent close frame");
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e).context("WebSocket read failed"),
                    None => return Ok(()),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures::io::Cursor;
    use kubestream_k8s::{ContainerInfo, LogRequest, LogStream, PodInfo, SourceError};
    use kubestream_logs::{PodLogsStatus, StreamSettings};
    use tokio::net::TcpListener;

    /// Serves the same two log lines for any pod
    struct StaticLogs;

    #[async_trait]
    impl PodLogSource for StaticLogs {
        async fn get_pod(&self, namespace: &str, pod: &str) -> Result<PodInfo, SourceError> {
            let mut info = PodInfo::new(pod.to_string(), namespace.to_string());
            info.containers = vec![ContainerInfo::new("app")];
            Ok(info)
        }

        async fn open_log_stream(
            &self,
            _namespace: &str,
            _pod: &str,
            _request: &LogRequest,
        ) -> Result<LogStream, SourceError> {
            Ok(Box::pin(Cursor::new(b"hello\n\nworld\n".to_vec())))
        }
    }

    fn config(master_url: String) -> AgentConfig {
        AgentConfig {
            master_url,
            env: "test".to_string(),
            context: None,
            heartbeat: Duration::from_secs(3600),
            reconnect_delay: Duration::from_millis(10),
            stream: StreamSettings::default(),
        }
    }

    async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> String {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text,
                Some(Ok(_)) => continue,
                other => panic!("unexpected websocket message: {:?}", other),
            }
        }
    }

    fn status_text(status: PodLogsStatus) -> String {
        OutboundFrame::Status(status).encode().unwrap()
    }

    #[tokio::test]
    async fn test_relays_session_over_websocket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let agent = Agent::new(config(format!("ws://{}", addr)), Arc::new(StaticLogs));
        let shutdown = CancellationToken::new();
        let run = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { agent.run(shutdown).await }
        });

        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

        // The first heartbeat fires immediately on connect
        assert_eq!(next_text(&mut ws).await, r#"{"type":"heartbeat"}"#);

        let start = r#"{"type":"start_pod_logs","connection_id":"c1","namespace":"default","pod_name":"web-0"}"#;
        ws.send(Message::Text(start.to_string())).await.unwrap();

        assert_eq!(next_text(&mut ws).await, status_text(PodLogsStatus::connected("c1")));
        assert_eq!(next_text(&mut ws).await, "hello");
        assert_eq!(next_text(&mut ws).await, "world");
        assert_eq!(
            next_text(&mut ws).await,
            status_text(PodLogsStatus::disconnected("c1"))
        );

        shutdown.cancel();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_reconnects_after_master_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let agent = Agent::new(config(format!("ws://{}", addr)), Arc::new(StaticLogs));
        let shutdown = CancellationToken::new();
        let run = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { agent.run(shutdown).await }
        });

        let (tcp, _) = listener.accept().await.unwrap();
        let mut first = tokio_tungstenite::accept_async(tcp).await.unwrap();
        next_text(&mut first).await;
        first.close(None).await.unwrap();

        let (tcp, _) = listener.accept().await.unwrap();
        let mut second = tokio_tungstenite::accept_async(tcp).await.unwrap();
        assert_eq!(next_text(&mut second).await, r#"{"type":"heartbeat"}"#);

        shutdown.cancel();
        run.await.unwrap().unwrap();
    }
}
