mod relay_service;
mod router;
mod ws_handler;

pub use relay_service::*;
pub use router::*;
pub use ws_handler::*;
