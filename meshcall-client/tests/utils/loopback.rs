use async_trait::async_trait;
use meshcall_client::error::Result;
use meshcall_client::{ChannelEvent, SignalingChannel};
use meshcall_core::{ParticipantId, SignalMessage};
use meshcall_relay::RelayService;
use tokio::sync::mpsc;

/// SignalingChannel wired straight into an in-process relay, no sockets involved.
pub struct LoopbackChannel {
    participant: ParticipantId,
    connection: u64,
    relay: RelayService,
}

impl LoopbackChannel {
    pub fn connect(
        relay: &RelayService,
        participant: &ParticipantId,
    ) -> (Self, mpsc::Receiver<ChannelEvent>) {
        let connection = relay.connect(participant.clone());
        let connection_id = connection.id;
        let mut outbound = connection.messages;
        let (tx, rx) = mpsc::channel(100);

        tokio::spawn(async move {
            while let Some(msg) = outbound.recv().await {
                if tx.send(ChannelEvent::Message(msg)).await.is_err() {
                    return;
                }
            }
            let _ = tx
                .send(ChannelEvent::Lost("relay dropped the connection".to_owned()))
                .await;
        });

        (
            Self {
                participant: participant.clone(),
                connection: connection_id,
                relay: relay.clone(),
            },
            rx,
        )
    }
}

#[async_trait]
impl SignalingChannel for LoopbackChannel {
    async fn send(&self, msg: SignalMessage) -> Result<()> {
        self.relay.handle_signal(&self.participant, msg);
        Ok(())
    }

    async fn disconnect(&self) {
        self.relay.disconnect(&self.participant, self.connection);
    }
}
