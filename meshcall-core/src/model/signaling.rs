use crate::model::participant::ParticipantId;
use crate::model::room::RoomId;
use crate::model::session::{IceCandidate, SessionDescription};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

/// Room-scoped events exchanged with the relay, one JSON text frame each:
/// `{"event": "<kebab-case name>", "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum SignalMessage {
    // client -> relay
    JoinRoom(RoomId),
    LeaveRoom,
    #[serde(rename_all = "camelCase")]
    Offer {
        target_id: ParticipantId,
        offer: SessionDescription,
    },
    #[serde(rename_all = "camelCase")]
    Answer {
        target_id: ParticipantId,
        answer: SessionDescription,
    },
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        target_id: ParticipantId,
        candidate: IceCandidate,
    },

    // relay -> client
    UserJoined(ParticipantId),
    UserLeft(ParticipantId),
    #[serde(rename_all = "camelCase")]
    ReceiveOffer {
        sender_id: ParticipantId,
        offer: SessionDescription,
    },
    #[serde(rename_all = "camelCase")]
    ReceiveAnswer {
        sender_id: ParticipantId,
        answer: SessionDescription,
    },
    #[serde(rename_all = "camelCase")]
    ReceiveIceCandidate {
        sender_id: ParticipantId,
        candidate: IceCandidate,
    },
    Error {
        message: String,
    },
}

impl SignalMessage {
    /// Participant a client->relay message is addressed to.
    pub fn target(&self) -> Option<&ParticipantId> {
        match self {
            SignalMessage::Offer { target_id, .. }
            | SignalMessage::Answer { target_id, .. }
            | SignalMessage::IceCandidate { target_id, .. } => Some(target_id),
            _ => None,
        }
    }

    /// Participant a relayed message originates from.
    pub fn sender(&self) -> Option<&ParticipantId> {
        match self {
            SignalMessage::ReceiveOffer { sender_id, .. }
            | SignalMessage::ReceiveAnswer { sender_id, .. }
            | SignalMessage::ReceiveIceCandidate { sender_id, .. } => Some(sender_id),
            _ => None,
        }
    }

    /// Rewrites a directed client message into the form its target receives.
    pub fn relayed_from(self, sender_id: ParticipantId) -> Option<SignalMessage> {
        match self {
            SignalMessage::Offer { offer, .. } => Some(SignalMessage::ReceiveOffer { sender_id, offer }),
            SignalMessage::Answer { answer, .. } => {
                Some(SignalMessage::ReceiveAnswer { sender_id, answer })
            }
            SignalMessage::IceCandidate { candidate, .. } => {
                Some(SignalMessage::ReceiveIceCandidate {
                    sender_id,
                    candidate,
                })
            }
            _ => None,
        }
    }
}
