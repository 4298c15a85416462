pub const DEFAULT_STUN_ADDR: &str = "stun:stun.l.google.com:19302";

/// Prefix of every generated room identifier.
pub const ROOM_ID_PREFIX: &str = "room_";
