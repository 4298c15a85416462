use crate::signaling::PeerSignalBody;
use crate::transport::{LocalTrack, RemoteStream};
use meshcall_core::ParticipantId;
use std::fmt;

/// Instructions from the mesh to one link task.
#[derive(Debug)]
pub(crate) enum LinkCommand {
    /// Create and send the first offer.
    Initiate,
    Signal(PeerSignalBody),
    /// Swap in `track` and renegotiate as part of pass `pass`, or hold the swap
    /// until the link is connected.
    Renegotiate { pass: u64, track: LocalTrack },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CloseReason {
    NegotiationFailed(String),
    GraceExpired,
    TransportClosed,
    Cancelled,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::NegotiationFailed(e) => write!(f, "negotiation failed: {e}"),
            CloseReason::GraceExpired => write!(f, "disconnect grace expired"),
            CloseReason::TransportClosed => write!(f, "transport closed"),
            CloseReason::Cancelled => write!(f, "closed by mesh"),
        }
    }
}

/// Reports from link tasks back to the mesh. Each carries the link epoch so the mesh
/// can ignore reports from links it has already replaced.
#[derive(Debug)]
pub(crate) enum LinkEvent {
    StreamReady {
        participant: ParticipantId,
        epoch: u64,
        stream: RemoteStream,
    },
    Closed {
        participant: ParticipantId,
        epoch: u64,
        reason: CloseReason,
    },
    Renegotiated {
        participant: ParticipantId,
        epoch: u64,
        pass: u64,
        outcome: Result<(), String>,
    },
    /// The link was not connected and will apply the swap once it is.
    RenegotiationDeferred {
        participant: ParticipantId,
        epoch: u64,
        pass: u64,
    },
    /// A signal arrived that made no sense in the link's current state.
    Stale {
        participant: ParticipantId,
        epoch: u64,
        what: &'static str,
    },
}
