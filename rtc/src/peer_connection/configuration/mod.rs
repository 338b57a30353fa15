use crate::peer_connection::certificate::RTCCertificate;
use ice::agent::agent_config::StunResponseFilter;
use ice::url::Url;
use shared::error::{Error, Result};
use std::fmt;
use std::net::SocketAddr;

/// How the BUNDLE group is produced in local descriptions.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RTCBundlePolicy {
    /// One transport for everything; the only useful choice with a single
    /// media section.
    #[default]
    MaxBundle,
    /// Allow distinct transports per section; the data-channel profile still
    /// produces exactly one.
    MaxCompat,
    /// Emit no BUNDLE group.
    Disable,
}

impl fmt::Display for RTCBundlePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::MaxBundle => "max-bundle",
            Self::MaxCompat => "max-compat",
            Self::Disable => "disable",
        };
        write!(f, "{s}")
    }
}

/// Which candidates the agent may gather.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RTCIceTransportPolicy {
    #[default]
    All,
    /// Gather only relayed candidates.
    Relay,
}

/// A STUN or TURN server with optional long-term credentials.
#[derive(Default, Debug, Clone)]
pub struct RTCIceServer {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}

impl RTCIceServer {
    pub(crate) fn parse_urls(&self) -> Result<Vec<Url>> {
        let mut out = vec![];
        for raw in &self.urls {
            let mut url = Url::parse_url(raw)?;
            url.username = self.username.clone();
            url.password = self.credential.clone();
            out.push(url);
        }
        Ok(out)
    }
}

/// Preprovisioned DTLS identity (`dtls.keys`): a PKCS#8 private key and
/// certificate, both DER. The certificate's signature hash drives the
/// fingerprint algorithm advertised in SDP.
#[derive(Default, Debug, Clone)]
pub struct RTCDtlsKeys {
    pub key_der: Vec<u8>,
    pub cert_der: Vec<u8>,
}

/// Configuration of an [RTCPeerConnection](crate::RTCPeerConnection).
#[derive(Default, Clone)]
pub struct RTCConfiguration {
    /// STUN/TURN servers used for gathering.
    pub ice_servers: Vec<RTCIceServer>,

    /// `all` gathers every candidate type, `relay` only relayed ones.
    pub ice_transport_policy: RTCIceTransportPolicy,

    /// Closed interval the embedder binds local UDP ports within.
    pub ice_port_range: Option<(u16, u16)>,

    /// Restrict gathering to these interface names.
    pub ice_interface_addresses: Vec<String>,

    /// Additional addresses (loopback, tun) that would otherwise be skipped.
    pub ice_additional_host_addresses: Vec<String>,

    pub ice_use_ipv4: bool,
    pub ice_use_ipv6: bool,

    /// Predicate invoked per inbound STUN gathering response; false drops.
    pub ice_filter_stun_response: Option<StunResponseFilter>,

    /// Addresses of the UDP sockets the embedder bound for this connection,
    /// after applying the interface/family/port-range settings above.
    pub local_addrs: Vec<SocketAddr>,

    /// Preprovisioned DTLS key material; generated when empty.
    pub dtls_keys: Option<RTCDtlsKeys>,

    /// Certificates to offer; one is generated when empty.
    pub certificates: Vec<RTCCertificate>,

    pub bundle_policy: RTCBundlePolicy,
}

impl fmt::Debug for RTCConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RTCConfiguration")
            .field("ice_servers", &self.ice_servers)
            .field("ice_transport_policy", &self.ice_transport_policy)
            .field("ice_port_range", &self.ice_port_range)
            .field("local_addrs", &self.local_addrs)
            .field("bundle_policy", &self.bundle_policy)
            .finish()
    }
}

impl RTCConfiguration {
    pub(crate) fn validate(&self) -> Result<()> {
        if let Some((min, max)) = self.ice_port_range {
            if min >= max {
                return Err(Error::ErrInvalidPortRange);
            }
        }
        for server in &self.ice_servers {
            server.parse_urls()?;
        }
        for certificate in &self.certificates {
            certificate.check_expiry()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_port_range_validation() {
        let config = RTCConfiguration {
            ice_port_range: Some((5000, 4000)),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(Error::ErrInvalidPortRange));

        let config = RTCConfiguration {
            ice_port_range: Some((4000, 5000)),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ice_server_urls() -> Result<()> {
        let server = RTCIceServer {
            urls: vec![
                "stun:stun.example.org:3478".to_owned(),
                "turn:turn.example.org".to_owned(),
            ],
            username: "user".to_owned(),
            credential: "pass".to_owned(),
        };
        let urls = server.parse_urls()?;
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[1].username, "user");

        let bad = RTCIceServer {
            urls: vec!["https://example.org".to_owned()],
            ..Default::default()
        };
        assert!(bad.parse_urls().is_err());
        Ok(())
    }
}
