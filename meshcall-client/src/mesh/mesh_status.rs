use meshcall_core::RoomId;

/// Lifecycle of the client's room membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshStatus {
    Idle,
    Joined(RoomId),
    Left,
    /// The relay connection dropped and every link was torn down.
    ChannelLost(String),
}

/// Counters kept by the mesh for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeshStats {
    /// Signals dropped because no live link could use them.
    pub stale_messages: u64,
    pub negotiation_failures: u64,
    pub renegotiation_failures: u64,
    /// Track swaps held by a link until it is connected again.
    pub deferred_renegotiations: u64,
    pub links_opened: u64,
    pub links_closed: u64,
}
