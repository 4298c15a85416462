use meshcall_core::TrackKind;
use std::fmt;
use std::sync::Arc;
use webrtc::track::track_remote::TrackRemote;

/// A track received from a remote participant.
#[derive(Clone)]
pub struct RemoteTrack {
    pub id: String,
    pub stream_id: String,
    pub kind: TrackKind,
    /// Engine handle for reading RTP; absent for tracks produced by test transports.
    pub handle: Option<Arc<TrackRemote>>,
}

impl RemoteTrack {
    pub fn new(id: impl Into<String>, stream_id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            stream_id: stream_id.into(),
            kind,
            handle: None,
        }
    }
}

impl fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("id", &self.id)
            .field("stream_id", &self.stream_id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Everything received from one participant, at most one track per kind.
#[derive(Debug, Clone)]
pub struct RemoteStream {
    pub stream_id: String,
    pub tracks: Vec<RemoteTrack>,
}

impl RemoteStream {
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            tracks: Vec::new(),
        }
    }

    /// Adds `track`, replacing any track of the same kind.
    pub fn upsert(&mut self, track: RemoteTrack) {
        self.tracks.retain(|t| t.kind != track.kind);
        self.tracks.push(track);
        self.tracks.sort_by_key(|t| t.kind);
    }

    pub fn track(&self, kind: TrackKind) -> Option<&RemoteTrack> {
        self.tracks.iter().find(|t| t.kind == kind)
    }
}
