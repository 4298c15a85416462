use crate::transport::RemoteTrack;
use meshcall_core::IceCandidate;

/// Connectivity of one media session as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Events a media session emits for the link that owns it.
#[derive(Debug)]
pub enum TransportEvent {
    /// A local ICE candidate was gathered and must be sent to the remote side.
    CandidateGenerated(IceCandidate),

    /// Remote media started flowing on this session.
    TrackReceived(RemoteTrack),

    StateChanged(SessionState),
}
