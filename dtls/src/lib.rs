#![warn(rust_2018_idioms)]

pub mod alert;
pub mod cipher_suite;
pub mod config;
pub mod conn;
pub mod crypto;
pub mod endpoint;
pub mod handshake;
pub mod record;

pub use conn::{DtlsConn, DtlsEvent};

/// DTLS 1.2 on the wire ({254, 253} per RFC 6347 Section 4.1).
pub const PROTOCOL_VERSION: u16 = 0xfefd;
/// DTLS 1.0, advertised in record headers before version negotiation.
pub const PROTOCOL_VERSION_1_0: u16 = 0xfeff;
