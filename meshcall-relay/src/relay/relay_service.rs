use dashmap::DashMap;
use meshcall_core::{ParticipantId, RoomId, SignalMessage};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

struct PeerSender {
    connection: u64,
    tx: mpsc::UnboundedSender<SignalMessage>,
}

struct RelayInner {
    peers: DashMap<ParticipantId, PeerSender>,
    rooms: DashMap<RoomId, BTreeSet<ParticipantId>>,
    memberships: DashMap<ParticipantId, RoomId>,
    next_connection: AtomicU64,
}

/// One socket's registration. `id` tells this connection apart from a later
/// reconnect of the same participant.
pub struct RelayConnection {
    pub id: u64,
    pub messages: mpsc::UnboundedReceiver<SignalMessage>,
}

/// Room registry and message router. Delivery is best-effort: messages to
/// participants that are gone are dropped.
#[derive(Clone)]
pub struct RelayService {
    inner: Arc<RelayInner>,
}

impl RelayService {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RelayInner {
                peers: DashMap::new(),
                rooms: DashMap::new(),
                memberships: DashMap::new(),
                next_connection: AtomicU64::new(1),
            }),
        }
    }

    /// Registers a connection for `participant`; messages for it come out of
    /// `messages`. A newer connection for the same participant replaces this one.
    pub fn connect(&self, participant: ParticipantId) -> RelayConnection {
        let id = self.inner.next_connection.fetch_add(1, Ordering::Relaxed);
        let (tx, messages) = mpsc::unbounded_channel();
        let peer = PeerSender { connection: id, tx };
        if self.inner.peers.insert(participant.clone(), peer).is_some() {
            warn!("{} reconnected, replacing previous connection", participant);
        }
        RelayConnection { id, messages }
    }

    /// Drops connection `connection` and announces the departure to the room.
    /// A connection that was already replaced by a reconnect leaves the room alone.
    pub fn disconnect(&self, participant: &ParticipantId, connection: u64) {
        let removed = self
            .inner
            .peers
            .remove_if(participant, |_, peer| peer.connection == connection);
        if removed.is_none() {
            debug!(
                "Ignoring close of superseded connection {} for {}",
                connection, participant
            );
            return;
        }
        self.leave(participant);
        debug!("{} disconnected", participant);
    }

    pub fn room_of(&self, participant: &ParticipantId) -> Option<RoomId> {
        self.inner
            .memberships
            .get(participant)
            .map(|room| room.value().clone())
    }

    pub fn members(&self, room: &RoomId) -> Vec<ParticipantId> {
        self.inner
            .rooms
            .get(room)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn handle_signal(&self, sender: &ParticipantId, msg: SignalMessage) {
        match msg {
            SignalMessage::JoinRoom(room) => self.join(sender, room),
            SignalMessage::LeaveRoom => self.leave(sender),
            directed @ (SignalMessage::Offer { .. }
            | SignalMessage::Answer { .. }
            | SignalMessage::IceCandidate { .. }) => self.forward(sender, directed),
            other => {
                warn!("{} sent a relay-only message: {:?}", sender, other);
                self.send_error(sender, "unexpected message");
            }
        }
    }

    fn join(&self, participant: &ParticipantId, room: RoomId) {
        if self.room_of(participant).as_ref() == Some(&room) {
            debug!("{} is already in {}", participant, room);
            return;
        }
        self.leave(participant);

        let others: Vec<ParticipantId> = {
            let mut members = self.inner.rooms.entry(room.clone()).or_default();
            let others = members.iter().cloned().collect();
            members.insert(participant.clone());
            others
        };
        self.inner
            .memberships
            .insert(participant.clone(), room.clone());
        info!(
            "{} joined {} ({} already there)",
            participant,
            room,
            others.len()
        );

        for other in &others {
            self.send_to(other, SignalMessage::UserJoined(participant.clone()));
        }
    }

    fn leave(&self, participant: &ParticipantId) {
        let Some((_, room)) = self.inner.memberships.remove(participant) else {
            return;
        };

        let remaining: Vec<ParticipantId> = {
            let Some(mut members) = self.inner.rooms.get_mut(&room) else {
                return;
            };
            members.remove(participant);
            members.iter().cloned().collect()
        };
        if remaining.is_empty() {
            self.inner.rooms.remove_if(&room, |_, members| members.is_empty());
        }
        info!("{} left {}", participant, room);

        for other in &remaining {
            self.send_to(other, SignalMessage::UserLeft(participant.clone()));
        }
    }

    fn forward(&self, sender: &ParticipantId, msg: SignalMessage) {
        let Some(target) = msg.target().cloned() else {
            return;
        };
        let same_room = match (self.room_of(sender), self.room_of(&target)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        };
        if !same_room {
            warn!("{} signalled {} outside a shared room", sender, target);
            self.send_error(sender, &format!("{target} is not in your room"));
            return;
        }

        if let Some(relayed) = msg.relayed_from(sender.clone()) {
            self.send_to(&target, relayed);
        }
    }

    fn send_error(&self, participant: &ParticipantId, message: &str) {
        self.send_to(
            participant,
            SignalMessage::Error {
                message: message.to_owned(),
            },
        );
    }

    fn send_to(&self, participant: &ParticipantId, msg: SignalMessage) {
        let Some(peer) = self.inner.peers.get(participant) else {
            warn!("Dropping message for disconnected participant {}", participant);
            return;
        };
        if peer.tx.send(msg).is_err() {
            debug!("Connection to {} is closing", participant);
        }
    }
}

impl Default for RelayService {
    fn default() -> Self {
        Self::new()
    }
}
