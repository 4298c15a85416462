use crate::utils::ROOM_ID_PREFIX;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque room identifier.
#[derive(Debug, Serialize, Deserialize, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Generates a URL-safe id for a fresh room (`room_` + 32 hex digits).
    pub fn generate() -> Self {
        Self(format!("{}{}", ROOM_ID_PREFIX, Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Link that opens this room from a call page served at `base`.
    pub fn meeting_link(&self, base: &str) -> String {
        format!("{}/{}", base.trim_end_matches('/'), self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for RoomId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
