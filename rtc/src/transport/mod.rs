use serde::{Deserialize, Serialize};
use std::fmt;

/// A trickled ICE candidate as carried over signaling.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct RTCIceCandidateInit {
    /// The candidate attribute value, with or without a `candidate:` prefix.
    pub candidate: String,
    #[serde(rename = "sdpMid")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
    #[serde(rename = "usernameFragment")]
    pub username_fragment: Option<String>,
}

/// The DTLS role negotiated from the `a=setup` attribute.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RTCDtlsRole {
    /// Role not yet determined; the offerer advertises `actpass`.
    #[default]
    Auto,
    /// Initiates the handshake (`a=setup:active`).
    Client,
    /// Awaits the handshake (`a=setup:passive`).
    Server,
}

impl fmt::Display for RTCDtlsRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Auto => "actpass",
            Self::Client => "active",
            Self::Server => "passive",
        };
        write!(f, "{s}")
    }
}

impl From<&str> for RTCDtlsRole {
    fn from(raw: &str) -> Self {
        match raw {
            "active" => Self::Client,
            "passive" => Self::Server,
            _ => Self::Auto,
        }
    }
}

/// A certificate digest advertised in SDP.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct RTCDtlsFingerprint {
    /// Hash name: "sha-256" (default), "sha-1", "sha-384", "sha-512".
    pub algorithm: String,
    /// Lowercase hex, colon separated; compared case-insensitively.
    pub value: String,
}

impl fmt::Display for RTCDtlsFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.algorithm, self.value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_dtls_role_setup_attribute() {
        assert_eq!(RTCDtlsRole::from("active"), RTCDtlsRole::Client);
        assert_eq!(RTCDtlsRole::from("passive"), RTCDtlsRole::Server);
        assert_eq!(RTCDtlsRole::from("actpass"), RTCDtlsRole::Auto);
        assert_eq!(RTCDtlsRole::Auto.to_string(), "actpass");
        assert_eq!(RTCDtlsRole::Client.to_string(), "active");
        assert_eq!(RTCDtlsRole::Server.to_string(), "passive");
    }
}
