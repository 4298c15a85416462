mod participant;
mod room;
mod session;
mod signaling;
mod track;

pub use participant::ParticipantId;
pub use room::RoomId;
pub use session::{IceCandidate, SdpType, SessionDescription};
pub use signaling::{IceServerConfig, SignalMessage};
pub use track::{TrackKind, TrackSource};
