use crate::error::{MeshError, Result};
use meshcall_core::{TrackKind, TrackSource};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// A locally produced track that can be attached to every link.
#[derive(Clone)]
pub struct LocalTrack {
    pub id: String,
    pub kind: TrackKind,
    pub source: TrackSource,
    pub handle: Arc<dyn TrackLocal + Send + Sync>,
}

impl LocalTrack {
    /// Wraps an engine track; the kind is taken from the track itself.
    pub fn new(handle: Arc<dyn TrackLocal + Send + Sync>, source: TrackSource) -> Result<Self> {
        let kind = match handle.kind() {
            RTPCodecType::Audio => TrackKind::Audio,
            RTPCodecType::Video => TrackKind::Video,
            other => {
                return Err(MeshError::MediaUnavailable(format!(
                    "track {} has unsupported kind {other:?}",
                    handle.id()
                )));
            }
        };

        Ok(Self {
            id: handle.id().to_owned(),
            kind,
            source,
            handle,
        })
    }

    /// Creates a sample-fed track (Opus for audio, VP8 for video).
    pub fn sample(kind: TrackKind, source: TrackSource, stream_id: &str) -> Self {
        let mime_type = match kind {
            TrackKind::Audio => MIME_TYPE_OPUS,
            TrackKind::Video => MIME_TYPE_VP8,
        };
        let id = format!("{kind}-{}", Uuid::new_v4().simple());
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: mime_type.to_owned(),
                ..Default::default()
            },
            id.clone(),
            stream_id.to_owned(),
        ));

        Self {
            id,
            kind,
            source,
            handle: track,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.source.is_transient()
    }
}

impl fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("source", &self.source)
            .finish()
    }
}

/// The client's current outgoing media: at most one track per kind.
#[derive(Debug, Clone, Default)]
pub struct LocalMedia {
    tracks: BTreeMap<TrackKind, LocalTrack>,
}

impl LocalMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_track(mut self, track: LocalTrack) -> Self {
        self.insert(track);
        self
    }

    /// Sets the current track of its kind, returning the one it displaced.
    pub fn insert(&mut self, track: LocalTrack) -> Option<LocalTrack> {
        self.tracks.insert(track.kind, track)
    }

    pub fn get(&self, kind: TrackKind) -> Option<&LocalTrack> {
        self.tracks.get(&kind)
    }

    pub fn tracks(&self) -> Vec<LocalTrack> {
        self.tracks.values().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Joining needs something to send.
    pub fn ensure_available(&self) -> Result<()> {
        if self.is_empty() {
            return Err(MeshError::MediaUnavailable(
                "no local audio or video track".to_owned(),
            ));
        }
        Ok(())
    }
}
