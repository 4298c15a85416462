use crate::error::Result;
use async_trait::async_trait;
use meshcall_core::SignalMessage;

/// What the signaling channel delivers to the mesh.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Message(SignalMessage),
    /// The connection to the relay is gone. Sent once, last.
    Lost(String),
}

/// Outbound half of the connection to the relay. Inbound traffic arrives as
/// [`ChannelEvent`]s on the receiver handed out alongside the channel.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    async fn send(&self, msg: SignalMessage) -> Result<()>;

    /// Closes the connection without reporting it as lost.
    async fn disconnect(&self);
}
