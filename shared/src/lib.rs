#![warn(rust_2018_idioms)]

pub mod error;
pub mod handler;
pub mod marshal;
pub mod util;

pub(crate) mod transport;

pub use handler::Protocol;
pub use transport::{FourTuple, TaggedBytesMut, Transmit, TransportContext};
