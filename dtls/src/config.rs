use crate::crypto::Certificate;
use std::time::Duration;

/// A fingerprint from the remote session description: algorithm name
/// ("sha-256", ...) and hex-colon digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFingerprint {
    pub algorithm: String,
    pub value: String,
}

/// Everything a [DtlsConn](crate::conn::DtlsConn) needs to run a handshake.
/// Shared between connections of one endpoint.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Local identity presented to the peer.
    pub certificate: Certificate,
    /// Fingerprints from the remote description; the peer's leaf certificate
    /// must match at least one of them.
    pub remote_fingerprints: Vec<RemoteFingerprint>,
    /// First retransmission interval; doubles per attempt.
    pub initial_retransmit_interval: Duration,
    /// Backoff ceiling.
    pub max_retransmit_interval: Duration,
    /// How many times a flight is retransmitted before the handshake fails.
    pub retransmit_budget: u32,
}

impl HandshakeConfig {
    pub fn new(certificate: Certificate) -> Self {
        Self {
            certificate,
            remote_fingerprints: vec![],
            initial_retransmit_interval: Duration::from_secs(1),
            max_retransmit_interval: Duration::from_secs(60),
            retransmit_budget: 8,
        }
    }

    pub fn with_remote_fingerprints(mut self, remote_fingerprints: Vec<RemoteFingerprint>) -> Self {
        self.remote_fingerprints = remote_fingerprints;
        self
    }
}
