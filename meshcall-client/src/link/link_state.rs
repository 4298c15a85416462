use meshcall_core::{ParticipantId, TrackKind};
use std::collections::BTreeMap;
use std::fmt;

/// Negotiation progress of one link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    Idle,
    OfferSent,
    OfferReceived,
    AnswerExchanged,
    Connected,
    Renegotiating,
    Disconnected,
    Closed,
}

impl LinkState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LinkState::Closed)
    }

    /// Media has flowed at least once and the link is not waiting on recovery.
    pub fn is_established(&self) -> bool {
        matches!(self, LinkState::Connected | LinkState::Renegotiating)
    }

    pub fn can_transition(&self, next: LinkState) -> bool {
        use LinkState::*;

        match (self, next) {
            (Closed, _) => false,
            (_, Closed) | (_, Disconnected) => true,
            (Idle, OfferSent | OfferReceived) => true,
            (OfferSent, AnswerExchanged | OfferReceived) => true,
            (OfferReceived, AnswerExchanged) => true,
            (AnswerExchanged, Connected) => true,
            (Connected, Renegotiating) => true,
            (Renegotiating, Connected) => true,
            (Disconnected, Connected) => true,
            _ => false,
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Idle => "idle",
            LinkState::OfferSent => "offer-sent",
            LinkState::OfferReceived => "offer-received",
            LinkState::AnswerExchanged => "answer-exchanged",
            LinkState::Connected => "connected",
            LinkState::Renegotiating => "renegotiating",
            LinkState::Disconnected => "disconnected",
            LinkState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Which side sent the first offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    Initiator,
    Responder,
}

/// Point-in-time view of a link for callers outside the mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSummary {
    pub participant: ParticipantId,
    pub state: LinkState,
    pub role: LinkRole,
    /// Ids of the local tracks currently sent on this link.
    pub active_tracks: BTreeMap<TrackKind, String>,
}
