pub mod description;
pub mod sdp_type;
pub mod session_description;

pub use description::{Attribute, MediaDescription, Origin, SessionDescription};
pub use sdp_type::RTCSdpType;
pub use session_description::RTCSessionDescription;
