use crate::error::Result;
use crate::signaling::SignalingChannel;
use meshcall_core::{IceCandidate, ParticipantId, RoomId, SessionDescription, SignalMessage};
use std::collections::BTreeSet;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent {
    Joined(ParticipantId),
    Left(ParticipantId),
}

/// Negotiation payload addressed to this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerSignalBody {
    Offer(SessionDescription),
    Answer(SessionDescription),
    Candidate(IceCandidate),
}

impl PeerSignalBody {
    pub fn label(&self) -> &'static str {
        match self {
            PeerSignalBody::Offer(_) => "offer",
            PeerSignalBody::Answer(_) => "answer",
            PeerSignalBody::Candidate(_) => "ice-candidate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSignal {
    pub sender: ParticipantId,
    pub body: PeerSignalBody,
}

/// An inbound relay message sorted by what the mesh should do with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomInput {
    Membership(MembershipEvent),
    Signal(PeerSignal),
    Ignored,
}

/// Tracks which room this client is in and mirrors who else is there.
///
/// The mirror is best-effort: it only knows participants announced by the relay
/// after our join, plus anyone who sent us an offer.
pub struct MembershipRegistry {
    self_id: ParticipantId,
    room: Option<RoomId>,
    roster: BTreeSet<ParticipantId>,
    snapshot: watch::Sender<Vec<ParticipantId>>,
}

impl MembershipRegistry {
    pub fn new(self_id: ParticipantId) -> Self {
        let (snapshot, _) = watch::channel(Vec::new());
        Self {
            self_id,
            room: None,
            roster: BTreeSet::new(),
            snapshot,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<ParticipantId>> {
        self.snapshot.subscribe()
    }

    pub fn room(&self) -> Option<&RoomId> {
        self.room.as_ref()
    }

    pub fn is_joined(&self) -> bool {
        self.room.is_some()
    }

    pub fn participants(&self) -> Vec<ParticipantId> {
        self.roster.iter().cloned().collect()
    }

    pub async fn join(&mut self, room: RoomId, channel: &dyn SignalingChannel) -> Result<()> {
        info!("{} joining room {}", self.self_id, room);
        channel.send(SignalMessage::JoinRoom(room.clone())).await?;
        self.room = Some(room);
        self.clear_roster();
        Ok(())
    }

    /// Announces departure. Returns `false` when there was no room to leave.
    pub async fn leave(&mut self, channel: &dyn SignalingChannel) -> Result<bool> {
        let Some(room) = self.room.take() else {
            return Ok(false);
        };
        info!("{} leaving room {}", self.self_id, room);
        self.clear_roster();
        channel.send(SignalMessage::LeaveRoom).await?;
        Ok(true)
    }

    /// Forgets the room without telling the relay (it is already gone).
    pub fn reset(&mut self) {
        self.room = None;
        self.clear_roster();
    }

    /// Adds a participant learned from signaling rather than from a join announcement.
    pub fn observe(&mut self, participant: &ParticipantId) {
        if *participant != self.self_id && self.roster.insert(participant.clone()) {
            debug!("Learned about {} from its offer", participant);
            self.publish();
        }
    }

    pub fn translate(&mut self, msg: SignalMessage) -> RoomInput {
        match msg {
            SignalMessage::UserJoined(participant) => {
                if participant == self.self_id {
                    return RoomInput::Ignored;
                }
                if self.roster.insert(participant.clone()) {
                    self.publish();
                }
                RoomInput::Membership(MembershipEvent::Joined(participant))
            }
            SignalMessage::UserLeft(participant) => {
                if participant == self.self_id {
                    return RoomInput::Ignored;
                }
                if self.roster.remove(&participant) {
                    self.publish();
                }
                RoomInput::Membership(MembershipEvent::Left(participant))
            }
            SignalMessage::ReceiveOffer { sender_id, offer } => RoomInput::Signal(PeerSignal {
                sender: sender_id,
                body: PeerSignalBody::Offer(offer),
            }),
            SignalMessage::ReceiveAnswer { sender_id, answer } => RoomInput::Signal(PeerSignal {
                sender: sender_id,
                body: PeerSignalBody::Answer(answer),
            }),
            SignalMessage::ReceiveIceCandidate {
                sender_id,
                candidate,
            } => RoomInput::Signal(PeerSignal {
                sender: sender_id,
                body: PeerSignalBody::Candidate(candidate),
            }),
            SignalMessage::Error { message } => {
                warn!("Relay reported an error: {}", message);
                RoomInput::Ignored
            }
            other => {
                warn!("Unexpected client-bound message: {:?}", other);
                RoomInput::Ignored
            }
        }
    }

    fn clear_roster(&mut self) {
        if !self.roster.is_empty() {
            self.roster.clear();
            self.publish();
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.participants());
    }
}
