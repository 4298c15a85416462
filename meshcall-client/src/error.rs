use meshcall_core::TrackKind;
use thiserror::Error;

/// Errors surfaced to the application embedding the mesh.
#[derive(Debug, Error)]
pub enum MeshError {
    /// The signaling channel dropped; the mesh has been torn down.
    #[error("signaling channel lost: {0}")]
    ChannelLost(String),

    /// Local media (camera, microphone, screen) could not be acquired.
    #[error("local media unavailable: {0}")]
    MediaUnavailable(String),

    #[error("no local {0} track to replace")]
    NoTrackOfKind(TrackKind),

    #[error("no transient track is being shared")]
    NoTransientShare,

    #[error("not joined to a room")]
    NotJoined,

    /// The mesh actor has shut down.
    #[error("mesh is stopped")]
    MeshStopped,

    #[error("signaling error: {0}")]
    Signaling(String),

    #[error("failed to encode signal message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, MeshError>;
