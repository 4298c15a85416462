mod mesh_command;
mod mesh_handle;
mod mesh_manager;
mod mesh_status;
mod renegotiation;
mod stream_registry;

pub(crate) use mesh_command::*;
pub use mesh_handle::*;
pub(crate) use mesh_manager::*;
pub use mesh_status::*;
pub use renegotiation::{RenegotiationReport, RenegotiationRequest};
pub(crate) use renegotiation::RenegotiationController;
pub use stream_registry::*;
