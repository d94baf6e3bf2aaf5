//! Push channel to the capture engine
//!
//! Messages are JSON objects discriminated by a `type` field. The channel
//! reconnects with a fixed delay for as long as the workbench runs.

use crate::error::{WorkbenchError, WorkbenchResult};
use async_trait::async_trait;
use attack_engine::HttpRequestData;
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use proxy_common::InterceptedRequest;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Notification pushed by the capture engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Intercepted { data: InterceptedRequest },
    InterceptStatus { enabled: bool },
    Removed { id: String },
    Forwarded { id: String },
    Dropped { id: String },
}

/// Command sent to the capture engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    ToggleIntercept {
        enabled: bool,
    },
    Forward {
        id: String,
        /// Operator-edited replacement as `{method, url, headers, body}`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        modified: Option<HttpRequestData>,
    },
    Drop {
        id: String,
    },
    Remove {
        id: String,
    },
}

/// What the channel task reports to the session coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSignal {
    Connected,
    Event(ServerEvent),
    Disconnected,
}

pub type CommandSink = Pin<Box<dyn Sink<String, Error = WorkbenchError> + Send>>;
pub type EventStream = Pin<Box<dyn Stream<Item = WorkbenchResult<String>> + Send>>;

/// Opens one connection to the capture engine as text frame halves
#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn connect(&self) -> WorkbenchResult<(CommandSink, EventStream)>;
}

/// WebSocket connector for the capture engine's `/ws` endpoint
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl PushConnector for WsConnector {
    async fn connect(&self) -> WorkbenchResult<(CommandSink, EventStream)> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(WorkbenchError::channel)?;
        let (ws_sender, ws_receiver) = ws_stream.split();

        let sink = ws_sender
            .sink_map_err(WorkbenchError::channel)
            .with(|text: String| future::ready(Ok::<_, WorkbenchError>(Message::Text(text))));

        let stream = ws_receiver.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Close(frame)) => {
                    debug!("Capture engine sent close frame: {:?}", frame);
                    None
                }
                Ok(_) => None,
                Err(e) => Some(Err(WorkbenchError::channel(e))),
            })
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

enum SessionEnd {
    Disconnected,
    Shutdown,
}

/// Reconnecting client loop
pub struct PushChannel<C> {
    connector: C,
    reconnect_delay: Duration,
}

impl<C: PushConnector> PushChannel<C> {
    pub fn new(connector: C, reconnect_delay: Duration) -> Self {
        Self {
            connector,
            reconnect_delay,
        }
    }

    /// Run until `shutdown` fires or the coordinator goes away
    ///
    /// Commands arriving while disconnected wait in `outbound` and are sent
    /// once a connection is up again.
    pub async fn run(
        self,
        signals: mpsc::Sender<ChannelSignal>,
        mut outbound: mpsc::UnboundedReceiver<ClientCommand>,
        shutdown: CancellationToken,
    ) {
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.connector.connect().await {
                Ok((mut sink, mut stream)) => {
                    info!("Push channel connected");
                    if signals.send(ChannelSignal::Connected).await.is_err() {
                        break;
                    }

                    let end = Self::pump(&mut sink, &mut stream, &signals, &mut outbound, &shutdown).await;

                    if signals.send(ChannelSignal::Disconnected).await.is_err() {
                        break;
                    }
                    if let SessionEnd::Shutdown = end {
                        break;
                    }
                    warn!("Push channel disconnected, reconnecting in {:?}", self.reconnect_delay);
                }
                Err(e) => {
                    warn!("Push channel connect failed: {}; retrying in {:?}", e, self.reconnect_delay);
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        info!("Push channel stopped");
    }

    async fn pump(
        sink: &mut CommandSink,
        stream: &mut EventStream,
        signals: &mpsc::Sender<ChannelSignal>,
        outbound: &mut mpsc::UnboundedReceiver<ClientCommand>,
        shutdown: &CancellationToken,
    ) -> SessionEnd {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = sink.close().await;
                    return SessionEnd::Shutdown;
                }

                frame = stream.next() => match frame {
                    Some(Ok(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            if signals.send(ChannelSignal::Event(event)).await.is_err() {
                                return SessionEnd::Shutdown;
                            }
                        }
                        Err(e) => debug!("Skipping unrecognized push message: {}", e),
                    },
                    Some(Err(e)) => {
                        warn!("Push channel error: {}", e);
                        return SessionEnd::Disconnected;
                    }
                    None => return SessionEnd::Disconnected,
                },

                command = outbound.recv() => match command {
                    Some(command) => {
                        let text = match serde_json::to_string(&command) {
                            Ok(text) => text,
                            Err(e) => {
                                error!("Failed to encode command {:?}: {}", command, e);
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(text).await {
                            warn!("Failed to send {:?}: {}", command, e);
                            return SessionEnd::Disconnected;
                        }
                    }
                    None => return SessionEnd::Shutdown,
                },
            }
        }
    }
}
