use meshcall_core::IceServerConfig;
use meshcall_core::utils::DEFAULT_STUN_ADDR;
use std::time::Duration;

/// Settings for one client's mesh.
#[derive(Debug, Clone)]
pub struct MeshConfig {
    /// STUN/TURN servers handed to every media session.
    pub ice_servers: Vec<IceServerConfig>,
    /// How long a `Disconnected` link waits for the transport to recover before closing.
    pub disconnect_grace: Duration,
    /// How long a link waits for the answer to a renegotiation offer.
    pub renegotiation_timeout: Duration,
    pub command_buffer: usize,
    pub link_buffer: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServerConfig {
                urls: vec![DEFAULT_STUN_ADDR.to_owned()],
                username: None,
                credential: None,
            }],
            disconnect_grace: Duration::from_secs(10),
            renegotiation_timeout: Duration::from_secs(15),
            command_buffer: 100,
            link_buffer: 256,
        }
    }
}

impl MeshConfig {
    pub fn with_ice_servers(mut self, ice_servers: Vec<IceServerConfig>) -> Self {
        self.ice_servers = ice_servers;
        self
    }

    pub fn with_disconnect_grace(mut self, grace: Duration) -> Self {
        self.disconnect_grace = grace;
        self
    }

    pub fn with_renegotiation_timeout(mut self, timeout: Duration) -> Self {
        self.renegotiation_timeout = timeout;
        self
    }
}
