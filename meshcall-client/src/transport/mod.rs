mod local_media;
mod media_transport;
mod remote_stream;
mod rtc_transport;
mod transport_event;

pub use local_media::*;
pub use media_transport::*;
pub use remote_stream::*;
pub use rtc_transport::*;
pub use transport_event::*;
