use crate::transport::RemoteStream;
use meshcall_core::ParticipantId;
use std::collections::BTreeMap;
use tokio::sync::watch;
use tracing::debug;

pub type RemoteStreams = BTreeMap<ParticipantId, RemoteStream>;

/// Latest remote stream per participant, observable through snapshots.
pub struct RemoteStreamRegistry {
    streams: watch::Sender<RemoteStreams>,
}

impl RemoteStreamRegistry {
    pub fn new() -> Self {
        let (streams, _) = watch::channel(RemoteStreams::new());
        Self { streams }
    }

    pub fn subscribe(&self) -> watch::Receiver<RemoteStreams> {
        self.streams.subscribe()
    }

    pub fn snapshot(&self) -> RemoteStreams {
        self.streams.borrow().clone()
    }

    pub fn get(&self, participant: &ParticipantId) -> Option<RemoteStream> {
        self.streams.borrow().get(participant).cloned()
    }

    /// Stores `stream` for `participant`, replacing any earlier stream.
    pub fn register(&self, participant: ParticipantId, stream: RemoteStream) {
        debug!(
            "Registering stream {} ({} tracks) for {}",
            stream.stream_id,
            stream.tracks.len(),
            participant
        );
        self.streams.send_modify(|streams| {
            streams.insert(participant, stream);
        });
    }

    pub fn remove(&self, participant: &ParticipantId) -> bool {
        self.streams
            .send_if_modified(|streams| streams.remove(participant).is_some())
    }

    pub fn clear(&self) {
        self.streams.send_if_modified(|streams| {
            let had_any = !streams.is_empty();
            streams.clear();
            had_any
        });
    }

    pub fn len(&self) -> usize {
        self.streams.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.borrow().is_empty()
    }
}

impl Default for RemoteStreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}
