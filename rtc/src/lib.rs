#![warn(rust_2018_idioms)]

//! A minimal, high-throughput WebRTC data-channel stack.
//!
//! The crate wires the session-description exchange, ICE agent, DTLS
//! transport, and a reduced SCTP association into an
//! [RTCPeerConnection](peer_connection::RTCPeerConnection) that trades the
//! reliability guarantees of standard WebRTC for raw speed: delivery is
//! unordered and unreliable, there is no congestion control, and messages
//! larger than one 1200-byte MTU are rejected rather than fragmented.
//!
//! Every component is sans-IO; the embedder owns the UDP socket and drives
//! one peer connection per task via `handle_read` / `poll_write` /
//! `handle_timeout`.

pub mod data_channel;
pub mod handler;
pub mod peer_connection;
pub mod transport;

pub use peer_connection::RTCPeerConnection;
