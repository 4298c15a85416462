use crate::transport::{LocalTrack, TransportEvent};
use anyhow::Result;
use async_trait::async_trait;
use meshcall_core::{IceCandidate, ParticipantId, SessionDescription};
use tokio::sync::mpsc;

/// One negotiated media session with a single remote participant.
///
/// `create_offer` and `create_answer` also apply the result as the local description.
#[async_trait]
pub trait MediaSession: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Swaps the outgoing track of the same kind without renegotiating.
    async fn replace_track(&self, track: &LocalTrack) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

pub struct OpenedSession {
    pub session: Box<dyn MediaSession>,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Factory for media sessions; the media engine itself lives behind this seam.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Opens a session towards `participant` sending `tracks`.
    async fn open_session(
        &self,
        participant: &ParticipantId,
        tracks: &[LocalTrack],
    ) -> Result<OpenedSession>;
}
