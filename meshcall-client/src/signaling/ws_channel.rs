use crate::error::{MeshError, Result};
use crate::signaling::{ChannelEvent, SignalingChannel};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use meshcall_core::{ParticipantId, SignalMessage};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

const INBOUND_BUFFER: usize = 100;

/// JSON-over-WebSocket connection to a relay at `{base_url}/ws/{participant}`.
pub struct WsSignalingChannel {
    outgoing: mpsc::UnboundedSender<Message>,
    recv_task: JoinHandle<()>,
}

impl WsSignalingChannel {
    pub async fn connect(
        base_url: &str,
        participant: &ParticipantId,
    ) -> Result<(Self, mpsc::Receiver<ChannelEvent>)> {
        let url = format!("{}/ws/{}", base_url.trim_end_matches('/'), participant);
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| MeshError::Signaling(format!("failed to connect to {url}: {e}")))?;
        info!("Connected to relay at {}", url);

        let (mut write, mut read) = ws_stream.split();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if write.send(msg).await.is_err() || closing {
                    break;
                }
            }
        });

        let recv_task = tokio::spawn(async move {
            let reason = loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<SignalMessage>(text.as_str()) {
                            Ok(msg) => {
                                if inbound_tx.send(ChannelEvent::Message(msg)).await.is_err() {
                                    return;
                                }
                            }
                            Err(e) => warn!("Dropping malformed signal frame: {}", e),
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break format!("closed by relay: {frame:?}");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break e.to_string(),
                    None => break "stream ended".to_owned(),
                }
            };
            debug!("Relay connection ended: {}", reason);
            let _ = inbound_tx.send(ChannelEvent::Lost(reason)).await;
        });

        Ok((
            Self {
                outgoing: outgoing_tx,
                recv_task,
            },
            inbound_rx,
        ))
    }
}

#[async_trait]
impl SignalingChannel for WsSignalingChannel {
    async fn send(&self, msg: SignalMessage) -> Result<()> {
        let json = serde_json::to_string(&msg)?;
        self.outgoing
            .send(Message::Text(json.into()))
            .map_err(|_| MeshError::ChannelLost("relay writer stopped".to_owned()))
    }

    async fn disconnect(&self) {
        // Queued frames still go out ahead of the close frame.
        self.recv_task.abort();
        let _ = self.outgoing.send(Message::Close(None));
    }
}

impl Drop for WsSignalingChannel {
    fn drop(&mut self) {
        self.recv_task.abort();
    }
}
