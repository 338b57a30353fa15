use crate::url::Url;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use stun::message::Message;

pub(crate) const DEFAULT_MAX_BINDING_REQUESTS: u16 = 7;
pub(crate) const DEFAULT_HOST_ACCEPTANCE_MIN_WAIT: Duration = Duration::from_millis(0);
pub(crate) const DEFAULT_DISCONNECTED_TIMEOUT: Duration = Duration::from_secs(5);
pub(crate) const DEFAULT_FAILED_TIMEOUT: Duration = Duration::from_secs(25);
pub(crate) const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(2);
pub(crate) const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(200);

/// How long before a pending binding request is pruned,
/// 2*RTT if RTT is known or 500 ms otherwise (RFC 8445 Appendix B.1).
pub(crate) const MAX_BINDING_REQUEST_TIMEOUT: Duration = Duration::from_millis(4000);

/// Predicate invoked for every inbound STUN gathering response; returning
/// false drops the response.
pub type StunResponseFilter = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

/// Collects the arguments to create a new ICE Agent.
#[derive(Default, Clone)]
pub struct AgentConfig {
    /// STUN and TURN servers to gather from.
    pub urls: Vec<Url>,

    /// Addresses of the bound UDP sockets that host candidates are built
    /// from. The embedder applies interface/address-family/port-range
    /// filtering before binding.
    pub local_addrs: Vec<SocketAddr>,

    /// Local username fragment, generated when empty.
    pub local_ufrag: String,
    /// Local password, generated when empty.
    pub local_pwd: String,

    /// The initial ICE role; the offerer controls unless the peer is lite.
    pub is_controlling: bool,

    /// Run as an ICE-lite agent (host candidates only, no checks initiated).
    pub lite: bool,

    /// Gather only relayed candidates.
    pub gather_relay_only: bool,

    pub max_binding_requests: Option<u16>,
    pub host_acceptance_min_wait: Option<Duration>,

    /// How long connectivity checks can fail before the agent goes to
    /// disconnected.
    pub disconnected_timeout: Option<Duration>,
    /// How long connectivity checks can fail before the agent goes to failed.
    pub failed_timeout: Option<Duration>,
    /// How often to send keepalive binding requests on the selected pair;
    /// zero disables keepalives.
    pub keepalive_interval: Option<Duration>,
    /// How often the check scheduler ticks while connecting.
    pub check_interval: Duration,

    pub stun_response_filter: Option<StunResponseFilter>,
}
