pub mod candidate_pair;

use crate::rand::generate_cand_id;
use crc::{Crc, CRC_32_ISO_HDLC};
use serde::Serialize;
use shared::error::{Error, Result};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

pub(crate) const DEFAULT_LOCAL_PREFERENCE: u16 = 65535;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Represents the type of candidate.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CandidateType {
    #[default]
    #[serde(rename = "unspecified")]
    Unspecified,
    #[serde(rename = "host")]
    Host,
    #[serde(rename = "srflx")]
    ServerReflexive,
    #[serde(rename = "prflx")]
    PeerReflexive,
    #[serde(rename = "relay")]
    Relay,
}

impl fmt::Display for CandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            CandidateType::Host => "host",
            CandidateType::ServerReflexive => "srflx",
            CandidateType::PeerReflexive => "prflx",
            CandidateType::Relay => "relay",
            CandidateType::Unspecified => "Unknown candidate type",
        };
        write!(f, "{s}")
    }
}

impl CandidateType {
    /// Returns the preference weight of a `CandidateType`.
    ///
    /// RFC 8445 Section 5.1.2.2: the RECOMMENDED values are 126 for host
    /// candidates, 110 for peer-reflexive, 100 for server-reflexive, and 0
    /// for relayed candidates.
    #[must_use]
    pub const fn preference(self) -> u16 {
        match self {
            Self::Host => 126,
            Self::PeerReflexive => 110,
            Self::ServerReflexive => 100,
            Self::Relay | CandidateType::Unspecified => 0,
        }
    }

    pub(crate) fn from_str(s: &str) -> Result<Self> {
        match s {
            "host" => Ok(Self::Host),
            "srflx" => Ok(Self::ServerReflexive),
            "prflx" => Ok(Self::PeerReflexive),
            "relay" => Ok(Self::Relay),
            _ => Err(Error::ErrUnknownCandidateType),
        }
    }
}

/// Transport addresses related to a candidate, useful for diagnostics.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct CandidateRelatedAddress {
    pub address: String,
    pub port: u16,
}

impl fmt::Display for CandidateRelatedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, " related {}:{}", self.address, self.port)
    }
}

/// Configuration for constructing a [Candidate].
#[derive(Default, Debug, Clone)]
pub struct CandidateConfig {
    pub candidate_type: CandidateType,
    pub address: String,
    pub port: u16,
    pub component: u16,
    pub base_address: String,
    /// STUN/TURN server the candidate was learned from, empty for host.
    pub server: String,
    pub related_address: Option<CandidateRelatedAddress>,
    pub local_preference: Option<u16>,
}

/// Candidate represents a single ICE candidate over UDP.
#[derive(Debug, Clone)]
pub struct Candidate {
    id: String,
    candidate_type: CandidateType,
    address: String,
    port: u16,
    component: u16,
    foundation: String,
    priority: u32,
    related_address: Option<CandidateRelatedAddress>,
    resolved_addr: SocketAddr,
    last_sent: Instant,
    last_received: Instant,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}:{}{}",
            self.component,
            self.candidate_type,
            self.address,
            self.port,
            self.related_address
                .as_ref()
                .map(|r| r.to_string())
                .unwrap_or_default(),
        )
    }
}

impl CandidateConfig {
    pub fn new_candidate(self) -> Result<Candidate> {
        let ip: IpAddr = self.address.parse()?;
        let resolved_addr = SocketAddr::new(ip, self.port);

        // The foundation is the same for two candidates with the same type,
        // base address, and STUN/TURN server (RFC 8445 Section 5.1.1.3).
        let foundation = {
            let mut input = String::new();
            input.push_str(&self.candidate_type.to_string());
            input.push_str(if self.base_address.is_empty() {
                &self.address
            } else {
                &self.base_address
            });
            input.push_str(&self.server);
            format!("{}", CRC32.checksum(input.as_bytes()))
        };

        let local_preference = self.local_preference.unwrap_or(DEFAULT_LOCAL_PREFERENCE);
        let priority = (1u32 << 24) * u32::from(self.candidate_type.preference())
            + (1u32 << 8) * u32::from(local_preference)
            + (256 - u32::from(self.component));

        let now = Instant::now();
        Ok(Candidate {
            id: generate_cand_id(),
            candidate_type: self.candidate_type,
            address: self.address,
            port: self.port,
            component: self.component,
            foundation,
            priority,
            related_address: self.related_address,
            resolved_addr,
            last_sent: now,
            last_received: now,
        })
    }
}

impl Candidate {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn candidate_type(&self) -> CandidateType {
        self.candidate_type
    }

    pub fn address(&self) -> String {
        self.address.clone()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn component(&self) -> u16 {
        self.component
    }

    pub fn foundation(&self) -> String {
        self.foundation.clone()
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn related_address(&self) -> Option<&CandidateRelatedAddress> {
        self.related_address.as_ref()
    }

    pub fn addr(&self) -> SocketAddr {
        self.resolved_addr
    }

    pub fn last_sent(&self) -> Instant {
        self.last_sent
    }

    pub fn last_received(&self) -> Instant {
        self.last_received
    }

    /// Marks traffic on the candidate.
    pub fn seen(&mut self, outbound: bool) {
        if outbound {
            self.last_sent = Instant::now();
        } else {
            self.last_received = Instant::now();
        }
    }

    /// Two candidates are equal when they describe the same transport
    /// address of the same type; the id is deliberately ignored.
    pub fn equal(&self, other: &Candidate) -> bool {
        self.candidate_type == other.candidate_type
            && self.address == other.address
            && self.port == other.port
            && self.component == other.component
    }

    /// Serializes into the SDP candidate attribute value
    /// (without the `candidate:` prefix).
    pub fn marshal(&self) -> String {
        let mut out = format!(
            "{} {} udp {} {} {} typ {}",
            self.foundation, self.component, self.priority, self.address, self.port,
            self.candidate_type,
        );
        if let Some(related) = &self.related_address {
            out += &format!(" raddr {} rport {}", related.address, related.port);
        }
        out
    }
}

/// Parses an SDP candidate attribute value; a leading `candidate:` prefix is
/// tolerated since signaling layers disagree about including it.
pub fn unmarshal_candidate(raw: &str) -> Result<Candidate> {
    let raw = raw.trim().trim_start_matches("candidate:");
    let split: Vec<&str> = raw.split_whitespace().collect();
    if split.len() < 8 {
        return Err(Error::ErrInvalidCandidateAttribute(raw.to_owned()));
    }

    let foundation = split[0].to_owned();
    let component = split[1].parse::<u16>()?;
    let protocol = split[2].to_ascii_lowercase();
    if protocol != "udp" {
        return Err(Error::ErrInvalidCandidateAttribute(raw.to_owned()));
    }
    let priority = split[3].parse::<u32>()?;
    let address = split[4].to_owned();
    let port = split[5].parse::<u16>()?;
    if split[6] != "typ" {
        return Err(Error::ErrInvalidCandidateAttribute(raw.to_owned()));
    }
    let candidate_type = CandidateType::from_str(split[7])?;

    let mut related_address = None;
    let mut extra = split[8..].iter();
    while let Some(key) = extra.next() {
        match *key {
            "raddr" => {
                let addr = extra
                    .next()
                    .ok_or_else(|| Error::ErrInvalidCandidateAttribute(raw.to_owned()))?;
                related_address = Some(CandidateRelatedAddress {
                    address: (*addr).to_owned(),
                    port: 0,
                });
            }
            "rport" => {
                let port = extra
                    .next()
                    .ok_or_else(|| Error::ErrInvalidCandidateAttribute(raw.to_owned()))?
                    .parse::<u16>()?;
                if let Some(related) = &mut related_address {
                    related.port = port;
                }
            }
            // unknown trailing key/value pairs are skipped
            _ => {
                let _ = extra.next();
            }
        }
    }

    let ip: IpAddr = address.parse()?;
    let resolved_addr = SocketAddr::new(ip, port);
    let now = Instant::now();

    Ok(Candidate {
        id: generate_cand_id(),
        candidate_type,
        address,
        port,
        component,
        foundation,
        priority,
        related_address,
        resolved_addr,
        last_sent: now,
        last_received: now,
    })
}

#[cfg(test)]
mod candidate_test {
    use super::*;

    #[test]
    fn test_host_priority() -> Result<()> {
        let c = CandidateConfig {
            candidate_type: CandidateType::Host,
            address: "192.168.1.2".to_owned(),
            port: 5000,
            component: crate::COMPONENT_RTP,
            ..Default::default()
        }
        .new_candidate()?;

        // 2^24*126 + 2^8*65535 + (256 - 1)
        assert_eq!(c.priority(), (1 << 24) * 126 + (1 << 8) * 65535 + 255);
        Ok(())
    }

    #[test]
    fn test_type_preference_ordering() {
        assert!(CandidateType::Host.preference() > CandidateType::PeerReflexive.preference());
        assert!(
            CandidateType::PeerReflexive.preference()
                > CandidateType::ServerReflexive.preference()
        );
        assert!(CandidateType::ServerReflexive.preference() > CandidateType::Relay.preference());
    }

    #[test]
    fn test_foundation_stability() -> Result<()> {
        let a = CandidateConfig {
            candidate_type: CandidateType::ServerReflexive,
            address: "1.2.3.4".to_owned(),
            port: 5000,
            component: 1,
            base_address: "192.168.1.2".to_owned(),
            server: "stun.example.org:3478".to_owned(),
            ..Default::default()
        }
        .new_candidate()?;
        let b = CandidateConfig {
            candidate_type: CandidateType::ServerReflexive,
            address: "1.2.3.4".to_owned(),
            port: 5002,
            component: 1,
            base_address: "192.168.1.2".to_owned(),
            server: "stun.example.org:3478".to_owned(),
            ..Default::default()
        }
        .new_candidate()?;
        let c = CandidateConfig {
            candidate_type: CandidateType::Host,
            address: "192.168.1.2".to_owned(),
            port: 5000,
            component: 1,
            ..Default::default()
        }
        .new_candidate()?;

        assert_eq!(a.foundation(), b.foundation());
        assert_ne!(a.foundation(), c.foundation());
        Ok(())
    }

    #[test]
    fn test_marshal_unmarshal_round_trip() -> Result<()> {
        let c = CandidateConfig {
            candidate_type: CandidateType::ServerReflexive,
            address: "1.2.3.4".to_owned(),
            port: 5000,
            component: 1,
            base_address: "192.168.1.2".to_owned(),
            server: "stun.example.org:3478".to_owned(),
            related_address: Some(CandidateRelatedAddress {
                address: "192.168.1.2".to_owned(),
                port: 5000,
            }),
            ..Default::default()
        }
        .new_candidate()?;

        let line = c.marshal();
        let parsed = unmarshal_candidate(&line)?;
        assert_eq!(parsed.marshal(), line);
        assert!(parsed.equal(&c));

        // with the candidate: prefix, as some signaling layers send it
        let parsed = unmarshal_candidate(&format!("candidate:{line}"))?;
        assert!(parsed.equal(&c));
        Ok(())
    }

    #[test]
    fn test_unmarshal_rejects_garbage() {
        assert!(unmarshal_candidate("one two three").is_err());
        assert!(unmarshal_candidate("0 1 tcp 1 1.2.3.4 80 typ host").is_err());
        assert!(unmarshal_candidate("0 1 udp 1 1.2.3.4 80 typ cloud").is_err());
    }
}
