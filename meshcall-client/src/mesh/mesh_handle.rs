use crate::config::MeshConfig;
use crate::error::{MeshError, Result};
use crate::link::LinkSummary;
use crate::mesh::{
    MeshCommand, MeshManager, MeshStats, MeshStatus, RemoteStreams, RenegotiationReport,
};
use crate::signaling::{ChannelEvent, SignalingChannel};
use crate::transport::{LocalMedia, LocalTrack, MediaTransport};
use meshcall_core::{ParticipantId, RoomId};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::info;

/// Application-facing handle to a running mesh. Cheap to clone.
#[derive(Clone)]
pub struct MeshHandle {
    self_id: ParticipantId,
    commands: mpsc::Sender<MeshCommand>,
    streams: watch::Receiver<RemoteStreams>,
    participants: watch::Receiver<Vec<ParticipantId>>,
    status: watch::Receiver<MeshStatus>,
}

impl MeshHandle {
    /// Starts the mesh actor for `self_id` on top of an already connected channel.
    pub fn spawn(
        self_id: ParticipantId,
        config: MeshConfig,
        channel: Arc<dyn SignalingChannel>,
        inbound: mpsc::Receiver<ChannelEvent>,
        transport: Arc<dyn MediaTransport>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.command_buffer);

        info!("Starting mesh for {}", self_id);
        let manager = MeshManager::new(
            self_id.clone(),
            config,
            channel,
            inbound,
            transport,
            rx,
            tx.downgrade(),
        );
        let streams = manager.subscribe_streams();
        let participants = manager.subscribe_participants();
        let status = manager.subscribe_status();
        tokio::spawn(manager.run());

        Self {
            self_id,
            commands: tx,
            streams,
            participants,
            status,
        }
    }

    pub fn self_id(&self) -> &ParticipantId {
        &self.self_id
    }

    /// Joins `room`, sending `media` to everyone who joins after us.
    pub async fn join_room(&self, room: RoomId, media: LocalMedia) -> Result<()> {
        self.request(|reply| MeshCommand::Join { room, media, reply })
            .await?
    }

    /// Closes every link and tells the relay we left. Safe to call repeatedly.
    pub async fn leave_room(&self) -> Result<()> {
        self.request(|reply| MeshCommand::Leave { reply }).await?
    }

    /// Replaces the local track of `track.kind` on every connected link.
    pub async fn renegotiate(&self, track: LocalTrack) -> Result<RenegotiationReport> {
        self.request(|reply| MeshCommand::Renegotiate { track, reply })
            .await?
    }

    /// Like [`renegotiate`](Self::renegotiate), but the previous track comes back
    /// automatically once `ended` fires or is dropped.
    pub async fn share_transient(
        &self,
        track: LocalTrack,
        ended: oneshot::Receiver<()>,
    ) -> Result<RenegotiationReport> {
        self.request(|reply| MeshCommand::ShareTransient {
            track,
            ended,
            reply,
        })
        .await?
    }

    /// Ends a transient share now and restores the track it displaced.
    pub async fn stop_transient(&self) -> Result<RenegotiationReport> {
        self.request(|reply| MeshCommand::StopTransient { reply })
            .await?
    }

    pub async fn active_links(&self) -> Result<Vec<LinkSummary>> {
        self.request(|reply| MeshCommand::ActiveLinks { reply }).await
    }

    pub async fn stats(&self) -> Result<MeshStats> {
        self.request(|reply| MeshCommand::Stats { reply }).await
    }

    pub fn remote_streams(&self) -> RemoteStreams {
        self.streams.borrow().clone()
    }

    pub fn subscribe_streams(&self) -> watch::Receiver<RemoteStreams> {
        self.streams.clone()
    }

    pub fn participants(&self) -> Vec<ParticipantId> {
        self.participants.borrow().clone()
    }

    pub fn subscribe_participants(&self) -> watch::Receiver<Vec<ParticipantId>> {
        self.participants.clone()
    }

    pub fn status(&self) -> MeshStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<MeshStatus> {
        self.status.clone()
    }

    /// Leaves the room, disconnects the channel and stops the actor.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| MeshCommand::Shutdown { reply }).await
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> MeshCommand) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| MeshError::MeshStopped)?;
        rx.await.map_err(|_| MeshError::MeshStopped)
    }
}
