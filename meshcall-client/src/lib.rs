pub mod config;
pub mod error;
pub mod link;
pub mod mesh;
pub mod signaling;
pub mod transport;

pub use config::MeshConfig;
pub use error::MeshError;
pub use link::{LinkRole, LinkState, LinkSummary};
pub use mesh::{
    MeshHandle, MeshStats, MeshStatus, RemoteStreamRegistry, RemoteStreams, RenegotiationReport,
};
pub use signaling::{ChannelEvent, SignalingChannel, WsSignalingChannel};
pub use transport::{
    LocalMedia, LocalTrack, MediaSession, MediaTransport, OpenedSession, RemoteStream, RemoteTrack,
    RtcTransport, SessionState, TransportEvent,
};

pub use meshcall_core::{
    IceCandidate, ParticipantId, RoomId, SessionDescription, SignalMessage, TrackKind, TrackSource,
};
