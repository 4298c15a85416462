mod link_command;
mod link_handle;
mod link_state;
mod peer_link;

pub(crate) use link_command::*;
pub(crate) use link_handle::*;
pub use link_state::*;
pub(crate) use peer_link::*;
