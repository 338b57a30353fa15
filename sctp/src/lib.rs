#![warn(rust_2018_idioms)]

//! A deliberately reduced SCTP implementation carrying WebRTC data channels
//! over DTLS. The state machine and wire format follow RFC 4960, with the
//! reliability machinery elided: delivery is unordered and unreliable, user
//! messages are never fragmented, and SACKs are neither emitted nor acted
//! upon. Conforming peers may retransmit aggressively against this profile;
//! that is a known interop hazard of the design.

pub mod association;
pub mod chunk;
pub mod packet;
pub mod param;
pub mod rto;

pub use association::{Association, AssociationConfig, AssociationEvent, AssociationState, Side};
pub use chunk::chunk_data::PayloadProtocolIdentifier;

/// Maximum user payload carried by a single DATA chunk. Larger sends are
/// rejected; there is no fragmentation.
pub const MAX_MESSAGE_SIZE: usize = 1200;
