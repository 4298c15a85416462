use crate::error::Result;
use crate::link::LinkSummary;
use crate::mesh::{MeshStats, RenegotiationReport};
use crate::transport::{LocalMedia, LocalTrack};
use meshcall_core::RoomId;
use tokio::sync::oneshot;

pub(crate) enum MeshCommand {
    Join {
        room: RoomId,
        media: LocalMedia,
        reply: oneshot::Sender<Result<()>>,
    },
    Leave {
        reply: oneshot::Sender<Result<()>>,
    },
    Renegotiate {
        track: LocalTrack,
        reply: oneshot::Sender<Result<RenegotiationReport>>,
    },
    /// Share a track the user can end externally; `ended` fires (or is dropped) when they do.
    ShareTransient {
        track: LocalTrack,
        ended: oneshot::Receiver<()>,
        reply: oneshot::Sender<Result<RenegotiationReport>>,
    },
    StopTransient {
        reply: oneshot::Sender<Result<RenegotiationReport>>,
    },
    TransientEnded {
        track_id: String,
    },
    ActiveLinks {
        reply: oneshot::Sender<Vec<LinkSummary>>,
    },
    Stats {
        reply: oneshot::Sender<MeshStats>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}
