mod config;
mod relay;

pub use config::RelayConfig;
pub use relay::*;
