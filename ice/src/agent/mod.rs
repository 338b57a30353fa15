pub mod agent_config;
pub mod agent_gather;
pub mod agent_selector;

use agent_config::*;
use bytes::BytesMut;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use stun::attributes::*;
use stun::error_code::{ErrorCodeAttribute, CODE_ROLE_CONFLICT};
use stun::fingerprint::*;
use stun::integrity::*;
use stun::message::*;
use stun::textattrs::*;
use stun::xoraddr::*;

use crate::agent::agent_gather::GatherContext;
use crate::attributes::{AttrControlled, AttrControlling, PriorityAttr};
use crate::candidate::{candidate_pair::*, *};
use crate::rand::{generate_pwd, generate_ufrag};
use crate::state::{ConnectionState, GatheringState};
use crate::url::Url;
use shared::error::*;
use shared::{Transmit, TransportContext};

#[derive(Debug, Clone)]
pub(crate) struct BindingRequest {
    pub(crate) timestamp: Instant,
    pub(crate) transaction_id: TransactionId,
    pub(crate) destination: SocketAddr,
    pub(crate) is_use_candidate: bool,
}

#[derive(Default)]
pub(crate) struct UfragPwd {
    pub(crate) local_ufrag: String,
    pub(crate) local_pwd: String,
    pub(crate) remote_ufrag: String,
    pub(crate) remote_pwd: String,
}

/// Events surfaced by the agent towards the peer connection.
#[derive(Debug, Clone)]
pub enum IceAgentEvent {
    /// A local candidate became available during gathering.
    CandidateGathered(Box<Candidate>),
    GatheringStateChange(GatheringState),
    ConnectionStateChange(ConnectionState),
    /// The nominated pair changed; carries (local, remote) addresses.
    SelectedPairChange(SocketAddr, SocketAddr),
}

fn assert_inbound_username(m: &Message, expected_username: &str) -> Result<()> {
    let mut username = Username::new(ATTR_USERNAME, String::new());
    username.get_from(m)?;

    if username.to_string() != expected_username {
        return Err(Error::ErrMismatchUsername);
    }

    Ok(())
}

fn assert_inbound_message_integrity(m: &mut Message, key: &[u8]) -> Result<()> {
    let message_integrity_attr = MessageIntegrity(key.to_vec());
    message_integrity_attr.check(m)
}

/// Represents the ICE agent.
pub struct Agent {
    pub(crate) tie_breaker: u64,
    pub(crate) is_controlling: bool,
    pub(crate) lite: bool,

    pub(crate) start_time: Instant,

    pub(crate) connection_state: ConnectionState,
    pub(crate) gathering_state: GatheringState,

    pub(crate) ufrag_pwd: UfragPwd,

    pub(crate) local_candidates: Vec<Candidate>,
    pub(crate) remote_candidates: Vec<Candidate>,
    pub(crate) checklist: Vec<CandidatePair>,
    pub(crate) nominated_pair: Option<usize>,
    pub(crate) selected_pair: Option<usize>,

    // LRU of outbound Binding request Transaction IDs
    pub(crate) pending_binding_requests: Vec<BindingRequest>,

    // the following fields won't change after construction
    pub(crate) max_binding_requests: u16,
    pub(crate) host_acceptance_min_wait: Duration,
    pub(crate) disconnected_timeout: Duration,
    pub(crate) failed_timeout: Duration,
    pub(crate) keepalive_interval: Duration,
    pub(crate) check_interval: Duration,
    pub(crate) gather_relay_only: bool,
    pub(crate) local_addrs: Vec<SocketAddr>,
    pub(crate) urls: Vec<Url>,
    pub(crate) stun_response_filter: Option<StunResponseFilter>,

    pub(crate) gather: GatherContext,

    pub(crate) checks_started: bool,
    pub(crate) next_check: Option<Instant>,
    pub(crate) checking_since: Option<Instant>,

    pub(crate) transmits: VecDeque<Transmit<BytesMut>>,
    pub(crate) events: VecDeque<IceAgentEvent>,
}

impl Agent {
    /// Creates a new Agent.
    pub fn new(config: AgentConfig) -> Result<Self> {
        if config.local_addrs.is_empty() {
            return Err(Error::ErrNoLocalAddress);
        }

        let mut ufrag = config.local_ufrag;
        let mut pwd = config.local_pwd;
        if ufrag.is_empty() {
            ufrag = generate_ufrag();
        }
        if pwd.is_empty() {
            pwd = generate_pwd();
        }
        if ufrag.len() * 8 < 24 {
            return Err(Error::ErrLocalUfragInsufficientBits);
        }
        if pwd.len() * 8 < 128 {
            return Err(Error::ErrLocalPwdInsufficientBits);
        }

        let gather = GatherContext::new(config.local_addrs[0]);

        Ok(Self {
            tie_breaker: rand::random::<u64>(),
            is_controlling: config.is_controlling,
            lite: config.lite,

            start_time: Instant::now(),

            connection_state: ConnectionState::New,
            gathering_state: GatheringState::New,

            ufrag_pwd: UfragPwd {
                local_ufrag: ufrag,
                local_pwd: pwd,
                ..Default::default()
            },

            local_candidates: vec![],
            remote_candidates: vec![],
            checklist: vec![],
            nominated_pair: None,
            selected_pair: None,

            pending_binding_requests: vec![],

            max_binding_requests: config
                .max_binding_requests
                .unwrap_or(DEFAULT_MAX_BINDING_REQUESTS),
            host_acceptance_min_wait: config
                .host_acceptance_min_wait
                .unwrap_or(DEFAULT_HOST_ACCEPTANCE_MIN_WAIT),
            disconnected_timeout: config
                .disconnected_timeout
                .unwrap_or(DEFAULT_DISCONNECTED_TIMEOUT),
            failed_timeout: config.failed_timeout.unwrap_or(DEFAULT_FAILED_TIMEOUT),
            keepalive_interval: config
                .keepalive_interval
                .unwrap_or(DEFAULT_KEEPALIVE_INTERVAL),
            check_interval: if config.check_interval == Duration::from_secs(0) {
                DEFAULT_CHECK_INTERVAL
            } else {
                config.check_interval
            },
            gather_relay_only: config.gather_relay_only,
            local_addrs: config.local_addrs,
            urls: config.urls,
            stun_response_filter: config.stun_response_filter,

            gather,

            checks_started: false,
            next_check: None,
            checking_since: None,

            transmits: VecDeque::new(),
            events: VecDeque::new(),
        })
    }

    /// Adds a new local candidate.
    pub fn add_local_candidate(&mut self, c: Candidate) -> Result<()> {
        for cand in &self.local_candidates {
            if cand.equal(&c) {
                return Ok(());
            }
        }

        self.events
            .push_back(IceAgentEvent::CandidateGathered(Box::new(c.clone())));
        self.local_candidates.push(c);

        for remote in 0..self.remote_candidates.len() {
            self.add_pair(self.local_candidates.len() - 1, remote);
        }

        Ok(())
    }

    /// Adds a new remote candidate.
    pub fn add_remote_candidate(&mut self, c: Candidate) -> Result<()> {
        for cand in &self.remote_candidates {
            if cand.equal(&c) {
                return Ok(());
            }
        }

        self.remote_candidates.push(c);

        for local in 0..self.local_candidates.len() {
            self.add_pair(local, self.remote_candidates.len() - 1);
        }

        Ok(())
    }

    /// Returns the local user credentials.
    pub fn get_local_user_credentials(&self) -> (String, String) {
        (
            self.ufrag_pwd.local_ufrag.clone(),
            self.ufrag_pwd.local_pwd.clone(),
        )
    }

    /// Returns the remote user credentials.
    pub fn get_remote_user_credentials(&self) -> (String, String) {
        (
            self.ufrag_pwd.remote_ufrag.clone(),
            self.ufrag_pwd.remote_pwd.clone(),
        )
    }

    /// Sets the credentials of the remote agent.
    pub fn set_remote_credentials(
        &mut self,
        remote_ufrag: String,
        remote_pwd: String,
    ) -> Result<()> {
        if remote_ufrag.is_empty() {
            return Err(Error::ErrRemoteUfragEmpty);
        } else if remote_pwd.is_empty() {
            return Err(Error::ErrRemotePwdEmpty);
        }

        self.ufrag_pwd.remote_ufrag = remote_ufrag;
        self.ufrag_pwd.remote_pwd = remote_pwd;
        Ok(())
    }

    /// Restarts the agent with fresh credentials, clearing every pair.
    /// Also used to initialize the agent for the first time.
    pub fn restart(&mut self, keep_local_candidates: bool) -> Result<()> {
        self.ufrag_pwd.local_ufrag = generate_ufrag();
        self.ufrag_pwd.local_pwd = generate_pwd();
        self.ufrag_pwd.remote_ufrag = String::new();
        self.ufrag_pwd.remote_pwd = String::new();

        self.pending_binding_requests = vec![];
        self.checklist = vec![];
        self.nominated_pair = None;
        self.set_selected_pair(None);
        if !keep_local_candidates {
            self.local_candidates.clear();
        }
        self.remote_candidates.clear();
        self.checks_started = false;
        self.next_check = None;
        self.checking_since = None;

        if self.connection_state != ConnectionState::New {
            self.update_connection_state(ConnectionState::Checking);
        }

        Ok(())
    }

    /// Begins connectivity checks once both credential sets are known.
    pub fn start_connectivity_checks(
        &mut self,
        now: Instant,
        is_controlling: bool,
        remote_ufrag: String,
        remote_pwd: String,
    ) -> Result<()> {
        log::debug!(
            "[{}]: start connectivity checks: isControlling? {}, remoteUfrag: {}",
            self.get_name(),
            is_controlling,
            remote_ufrag,
        );
        self.set_remote_credentials(remote_ufrag, remote_pwd)?;
        self.is_controlling = is_controlling;
        self.start();

        self.checks_started = true;
        self.checking_since = Some(now);
        self.next_check = Some(now);
        self.update_connection_state(ConnectionState::Checking);

        Ok(())
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection_state
    }

    pub fn gathering_state(&self) -> GatheringState {
        self.gathering_state
    }

    /// Returns the (local, remote) addresses of the nominated pair.
    pub fn selected_addrs(&self) -> Option<(SocketAddr, SocketAddr)> {
        self.selected_pair.map(|index| {
            let p = &self.checklist[index];
            (
                self.local_candidates[p.local].addr(),
                self.remote_candidates[p.remote].addr(),
            )
        })
    }

    pub fn poll_transmit(&mut self) -> Option<Transmit<BytesMut>> {
        self.transmits.pop_front()
    }

    pub fn poll_event(&mut self) -> Option<IceAgentEvent> {
        self.events.pop_front()
    }

    pub fn poll_timeout(&self) -> Option<Instant> {
        let mut eto = self.gather.client.poll_timeout();
        if self.checks_started && self.connection_state != ConnectionState::Failed {
            if let Some(next_check) = self.next_check {
                eto = Some(eto.map_or(next_check, |t| t.min(next_check)));
            }
        }
        eto
    }

    pub fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        self.drive_gather(now)?;

        if self.checks_started {
            if let Some(next_check) = self.next_check {
                if now >= next_check {
                    self.contact(now);
                    self.next_check = Some(now + self.check_interval);
                }
            }
        }

        Ok(())
    }

    /// Cleans up the Agent.
    pub fn close(&mut self) -> Result<()> {
        self.gather.client.close();
        self.delete_all_candidates(false);
        self.checks_started = false;
        self.next_check = None;
        self.update_connection_state(ConnectionState::Closed);

        Ok(())
    }

    fn contact(&mut self, now: Instant) {
        if self.connection_state == ConnectionState::Failed {
            // The connection is currently failed so don't send any checks.
            // In the future it may be restarted though.
            return;
        }
        if self.connection_state == ConnectionState::Checking {
            // We have been in checking longer than Disconnected+Failed timeout,
            // set the connection to Failed
            if let Some(since) = self.checking_since {
                if now.saturating_duration_since(since)
                    > self.disconnected_timeout + self.failed_timeout
                {
                    self.update_connection_state(ConnectionState::Failed);
                    return;
                }
            }
        }

        self.contact_candidates();
    }

    pub(crate) fn update_connection_state(&mut self, new_state: ConnectionState) {
        if self.connection_state != new_state {
            // Connection has gone to failed, release all gathered candidates
            if new_state == ConnectionState::Failed {
                self.delete_all_candidates(false);
            }

            log::info!(
                "[{}]: Setting new connection state: {}",
                self.get_name(),
                new_state
            );
            self.connection_state = new_state;
            self.events
                .push_back(IceAgentEvent::ConnectionStateChange(new_state));
        }
    }

    pub(crate) fn set_selected_pair(&mut self, selected_pair: Option<usize>) {
        if let Some(pair_index) = selected_pair {
            log::trace!(
                "[{}]: Set selected candidate pair: {:?}",
                self.get_name(),
                self.checklist[pair_index]
            );

            let p = &mut self.checklist[pair_index];
            p.nominated = true;
            self.selected_pair = Some(pair_index);

            let local = self.local_candidates[self.checklist[pair_index].local].addr();
            let remote = self.remote_candidates[self.checklist[pair_index].remote].addr();
            self.events
                .push_back(IceAgentEvent::SelectedPairChange(local, remote));

            self.update_connection_state(ConnectionState::Connected);
        } else {
            self.selected_pair = None;
        }
    }

    pub(crate) fn ping_all_candidates(&mut self) {
        log::trace!("[{}]: pinging all candidates", self.get_name());

        let mut pairs: Vec<(usize, usize)> = vec![];

        {
            let name = self.get_name().to_string();
            if self.checklist.is_empty() {
                log::warn!(
                    "[{}]: pingAllCandidates called with no candidate pairs. Connection is not possible yet.",
                    name,
                );
            }
            for p in &mut self.checklist {
                if p.state == CandidatePairState::Waiting {
                    p.state = CandidatePairState::InProgress;
                } else if p.state != CandidatePairState::InProgress {
                    continue;
                }

                if p.binding_request_count > self.max_binding_requests {
                    log::trace!(
                        "[{}]: max requests reached for pair {}, marking it as failed",
                        name,
                        *p
                    );
                    p.state = CandidatePairState::Failed;
                } else {
                    p.binding_request_count += 1;
                    pairs.push((p.local, p.remote));
                }
            }
        }

        for (local, remote) in pairs {
            self.ping_candidate(local, remote);
        }

        // every pair exhausted its budget: connectivity failed
        if !self.checklist.is_empty()
            && self
                .checklist
                .iter()
                .all(|p| p.state == CandidatePairState::Failed)
        {
            self.update_connection_state(ConnectionState::Failed);
        }
    }

    pub(crate) fn add_pair(&mut self, local: usize, remote: usize) {
        let p = CandidatePair::new(
            local,
            remote,
            self.local_candidates[local].priority(),
            self.remote_candidates[remote].priority(),
            self.is_controlling,
        );
        self.checklist.push(p);
        // keep the checklist ordered by descending pair priority
        self.checklist
            .sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    pub(crate) fn find_pair(&self, local: usize, remote: usize) -> Option<usize> {
        self.checklist
            .iter()
            .position(|p| p.local == local && p.remote == remote)
    }

    /// Checks if the selected pair is (still) valid.
    pub(crate) fn validate_selected_pair(&mut self) -> bool {
        let (valid, disconnected_time) = {
            self.selected_pair.as_ref().map_or_else(
                || (false, Duration::from_secs(0)),
                |&pair_index| {
                    let remote = self.checklist[pair_index].remote;
                    let disconnected_time =
                        Instant::now().duration_since(self.remote_candidates[remote].last_received());
                    (true, disconnected_time)
                },
            )
        };

        if valid {
            let total_timeout = self.disconnected_timeout + self.failed_timeout;
            if self.failed_timeout != Duration::from_secs(0) && disconnected_time > total_timeout {
                self.update_connection_state(ConnectionState::Failed);
            } else if self.disconnected_timeout != Duration::from_secs(0)
                && disconnected_time > self.disconnected_timeout
            {
                self.update_connection_state(ConnectionState::Disconnected);
            } else {
                self.update_connection_state(ConnectionState::Connected);
            }
        }

        valid
    }

    /// Sends STUN Binding requests on the selected pair if no packet has been
    /// sent on it in the last keepalive_interval.
    pub(crate) fn check_keepalive(&mut self) {
        let (local, remote) = {
            self.selected_pair.as_ref().map_or((None, None), |&index| {
                let p = &self.checklist[index];
                (Some(p.local), Some(p.remote))
            })
        };

        if let (Some(local), Some(remote)) = (local, remote) {
            let last_sent = Instant::now().duration_since(self.local_candidates[local].last_sent());
            let last_received =
                Instant::now().duration_since(self.remote_candidates[remote].last_received());

            if (self.keepalive_interval != Duration::from_secs(0))
                && ((last_sent > self.keepalive_interval)
                    || (last_received > self.keepalive_interval))
            {
                // we use binding request instead of indication to support refresh consent schemas
                // see https://tools.ietf.org/html/rfc7675
                self.ping_candidate(local, remote);
            }
        }
    }

    /// Remove all candidates and the pairs built from them.
    /// This is used for restarts, failures and on close.
    pub(crate) fn delete_all_candidates(&mut self, keep_local_candidates: bool) {
        if !keep_local_candidates {
            self.local_candidates.clear();
        }
        self.remote_candidates.clear();
        self.checklist.clear();
        self.nominated_pair = None;
        self.selected_pair = None;
    }

    pub(crate) fn find_remote_candidate(&self, addr: SocketAddr) -> Option<usize> {
        let (ip, port) = (addr.ip(), addr.port());
        self.remote_candidates
            .iter()
            .position(|c| c.address() == ip.to_string() && c.port() == port)
    }

    pub(crate) fn find_local_candidate(&self, addr: SocketAddr) -> Option<usize> {
        self.local_candidates.iter().position(|c| c.addr() == addr)
    }

    pub(crate) fn send_binding_request(&mut self, m: &Message, local: usize, remote: usize) {
        log::trace!(
            "[{}]: ping STUN from {} to {}",
            self.get_name(),
            local,
            remote
        );

        self.invalidate_pending_binding_requests(Instant::now());
        self.pending_binding_requests.push(BindingRequest {
            timestamp: Instant::now(),
            transaction_id: m.transaction_id,
            destination: self.remote_candidates[remote].addr(),
            is_use_candidate: m.contains(ATTR_USE_CANDIDATE),
        });

        self.send_stun(m, local, remote);
    }

    pub(crate) fn send_binding_success(&mut self, m: &Message, local: usize, remote: usize) {
        let addr = self.remote_candidates[remote].addr();
        let (ip, port) = (addr.ip(), addr.port());
        let local_pwd = self.ufrag_pwd.local_pwd.clone();

        let (out, result) = {
            let mut out = Message::new();
            let result = out.build(&[
                Box::new(m.clone()),
                Box::new(BINDING_SUCCESS),
                Box::new(XorMappedAddress { ip, port }),
                Box::new(MessageIntegrity::new_short_term_integrity(local_pwd)),
                Box::new(FINGERPRINT),
            ]);
            (out, result)
        };

        if let Err(err) = result {
            log::warn!(
                "[{}]: Failed to handle inbound ICE from: {} to: {} error: {}",
                self.get_name(),
                local,
                remote,
                err
            );
        } else {
            self.send_stun(&out, local, remote);
        }
    }

    /// 487 Role Conflict response per RFC 8445 Section 7.3.1.1.
    pub(crate) fn send_binding_error(&mut self, m: &Message, local: usize, remote: usize) {
        let local_pwd = self.ufrag_pwd.local_pwd.clone();

        let (out, result) = {
            let mut out = Message::new();
            let result = out.build(&[
                Box::new(m.clone()),
                Box::new(BINDING_ERROR),
                Box::new(ErrorCodeAttribute {
                    code: CODE_ROLE_CONFLICT,
                    reason: b"Role Conflict".to_vec(),
                }),
                Box::new(MessageIntegrity::new_short_term_integrity(local_pwd)),
                Box::new(FINGERPRINT),
            ]);
            (out, result)
        };

        if let Err(err) = result {
            log::warn!("[{}]: failed to build role conflict error: {}", self.get_name(), err);
        } else {
            self.send_stun(&out, local, remote);
        }
    }

    /// Removes pending binding requests that are over max_binding_request_timeout old.
    pub(crate) fn invalidate_pending_binding_requests(&mut self, filter_time: Instant) {
        let initial_size = self.pending_binding_requests.len();
        self.pending_binding_requests.retain(|req| {
            filter_time
                .checked_duration_since(req.timestamp)
                .map(|duration| duration < MAX_BINDING_REQUEST_TIMEOUT)
                .unwrap_or(true)
        });

        let removed = initial_size - self.pending_binding_requests.len();
        if removed > 0 {
            log::trace!(
                "[{}]: Discarded {} binding requests because they expired",
                self.get_name(),
                removed
            );
        }
    }

    /// Asserts that the passed TransactionID is in our pending list and
    /// removes it when found.
    pub(crate) fn handle_inbound_binding_success(
        &mut self,
        id: TransactionId,
    ) -> Option<BindingRequest> {
        self.invalidate_pending_binding_requests(Instant::now());

        let position = self
            .pending_binding_requests
            .iter()
            .position(|r| r.transaction_id == id)?;
        Some(self.pending_binding_requests.remove(position))
    }

    /// Processes STUN traffic from a remote candidate or a gathering server.
    pub fn handle_read(
        &mut self,
        now: Instant,
        m: &mut Message,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
    ) -> Result<()> {
        // gathering transactions (binding towards STUN servers, TURN
        // allocate) are matched by transaction id first
        if m.typ.class == CLASS_SUCCESS_RESPONSE || m.typ.class == CLASS_ERROR_RESPONSE {
            if self.gather.owns_transaction(&m.transaction_id) {
                if let Some(filter) = &self.stun_response_filter {
                    if !filter(m) {
                        log::debug!(
                            "[{}]: response from {} dropped by filter",
                            self.get_name(),
                            remote_addr
                        );
                        return Ok(());
                    }
                }
                self.gather.client.handle_read(&m.raw)?;
                self.drive_gather(now)?;
                return Ok(());
            }
        }

        self.handle_inbound(m, local_addr, remote_addr);
        Ok(())
    }

    /// Processes connectivity-check STUN traffic from a remote candidate.
    pub(crate) fn handle_inbound(
        &mut self,
        m: &mut Message,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
    ) {
        if m.typ.method != METHOD_BINDING
            || !(m.typ.class == CLASS_SUCCESS_RESPONSE
                || m.typ.class == CLASS_REQUEST
                || m.typ.class == CLASS_ERROR_RESPONSE
                || m.typ.class == CLASS_INDICATION)
        {
            log::trace!(
                "[{}]: unhandled STUN from {} class({}) method({})",
                self.get_name(),
                remote_addr,
                m.typ.class,
                m.typ.method
            );
            return;
        }

        let local = match self
            .find_local_candidate(local_addr)
            .or_else(|| (!self.local_candidates.is_empty()).then_some(0))
        {
            Some(local) => local,
            None => {
                log::warn!(
                    "[{}]: discard message, no local candidate for {}",
                    self.get_name(),
                    local_addr
                );
                return;
            }
        };

        if m.typ.class == CLASS_REQUEST && self.resolve_role_conflict(m, local, remote_addr) {
            return;
        }

        let mut remote_candidate = self.find_remote_candidate(remote_addr);
        if m.typ.class == CLASS_SUCCESS_RESPONSE {
            {
                let remote_pwd = self.ufrag_pwd.remote_pwd.clone();
                if let Err(err) = assert_inbound_message_integrity(m, remote_pwd.as_bytes()) {
                    log::warn!(
                        "[{}]: discard message from ({}), {}",
                        self.get_name(),
                        remote_addr,
                        err
                    );
                    return;
                }
            }

            if let Some(remote) = remote_candidate {
                self.handle_success_response(m, local, remote, remote_addr);
            } else {
                log::warn!(
                    "[{}]: discard success message from ({}), no such remote",
                    self.get_name(),
                    remote_addr
                );
                return;
            }
        } else if m.typ.class == CLASS_ERROR_RESPONSE {
            self.handle_error_response(m, local, remote_addr);
        } else if m.typ.class == CLASS_REQUEST {
            {
                let username =
                    self.ufrag_pwd.local_ufrag.clone() + ":" + self.ufrag_pwd.remote_ufrag.as_str();
                let local_pwd = self.ufrag_pwd.local_pwd.clone();
                if let Err(err) = assert_inbound_username(m, &username) {
                    log::warn!(
                        "[{}]: discard message from ({}), {}",
                        self.get_name(),
                        remote_addr,
                        err
                    );
                    return;
                } else if let Err(err) =
                    assert_inbound_message_integrity(m, local_pwd.as_bytes())
                {
                    log::warn!(
                        "[{}]: discard message from ({}), {}",
                        self.get_name(),
                        remote_addr,
                        err
                    );
                    return;
                }
            }

            if remote_candidate.is_none() {
                // an authenticated request from an unknown transport address
                // is a peer-reflexive candidate (RFC 8445 Section 7.3.1.3)
                let mut prflx_priority = PriorityAttr::default();
                let _ = prflx_priority.get_from(m);

                let prflx = CandidateConfig {
                    candidate_type: CandidateType::PeerReflexive,
                    address: remote_addr.ip().to_string(),
                    port: remote_addr.port(),
                    component: crate::COMPONENT_RTP,
                    ..Default::default()
                }
                .new_candidate();

                match prflx {
                    Ok(prflx_candidate) => {
                        log::debug!(
                            "[{}]: adding a new peer-reflexive candidate: {}",
                            self.get_name(),
                            remote_addr
                        );
                        if self.add_remote_candidate(prflx_candidate).is_ok() {
                            remote_candidate = self.find_remote_candidate(remote_addr);
                        }
                    }
                    Err(err) => {
                        log::error!(
                            "[{}]: Failed to create new remote prflx candidate ({})",
                            self.get_name(),
                            err
                        );
                        return;
                    }
                }
            }

            log::trace!(
                "[{}]: inbound STUN (Request) from {} to {}",
                self.get_name(),
                remote_addr,
                local
            );

            if let Some(remote) = remote_candidate {
                self.handle_binding_request(m, local, remote);
            }
        }

        if let Some(remote) = remote_candidate {
            self.remote_candidates[remote].seen(false);
        }
    }

    /// RFC 8445 Section 7.3.1.1: compares tie-breakers when both agents
    /// believe they hold the same role. Returns true when the request must
    /// not be processed further (487 was sent).
    fn resolve_role_conflict(&mut self, m: &Message, local: usize, remote_addr: SocketAddr) -> bool {
        if self.is_controlling && m.contains(ATTR_ICE_CONTROLLING) {
            let mut theirs = AttrControlling::default();
            if theirs.get_from(m).is_err() {
                return true;
            }
            if self.tie_breaker >= theirs.0 {
                if let Some(remote) = self.find_remote_candidate(remote_addr) {
                    self.send_binding_error(m, local, remote);
                }
                return true;
            }
            log::debug!("[{}]: role conflict, switching to controlled", self.get_name());
            self.is_controlling = false;
            self.recompute_pair_priorities();
        } else if !self.is_controlling && m.contains(ATTR_ICE_CONTROLLED) {
            let mut theirs = AttrControlled::default();
            if theirs.get_from(m).is_err() {
                return true;
            }
            if self.tie_breaker >= theirs.0 {
                log::debug!("[{}]: role conflict, switching to controlling", self.get_name());
                self.is_controlling = true;
                self.recompute_pair_priorities();
            } else {
                if let Some(remote) = self.find_remote_candidate(remote_addr) {
                    self.send_binding_error(m, local, remote);
                }
                return true;
            }
        }
        false
    }

    /// A 487 response means the peer won the role conflict: switch role and
    /// retry the check on that pair.
    fn handle_error_response(&mut self, m: &Message, local: usize, remote_addr: SocketAddr) {
        let mut code = ErrorCodeAttribute::default();
        if code.get_from(m).is_err() {
            return;
        }
        if code.code != CODE_ROLE_CONFLICT {
            log::debug!(
                "[{}]: binding error response {} from {}",
                self.get_name(),
                code,
                remote_addr
            );
            return;
        }

        if self.handle_inbound_binding_success(m.transaction_id).is_some() {
            log::debug!(
                "[{}]: role conflict error, switching role and retrying",
                self.get_name()
            );
            self.is_controlling = !self.is_controlling;
            self.recompute_pair_priorities();
            if let Some(remote) = self.find_remote_candidate(remote_addr) {
                if let Some(index) = self.find_pair(local, remote) {
                    self.checklist[index].state = CandidatePairState::Waiting;
                }
            }
        }
    }

    fn recompute_pair_priorities(&mut self) {
        for p in &mut self.checklist {
            p.ice_role_controlling = self.is_controlling;
        }
        self.checklist
            .sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    /// Processes non-STUN traffic from a remote candidate, and returns true
    /// if it comes from an actual remote candidate.
    pub fn validate_non_stun_traffic(&mut self, remote_addr: SocketAddr) -> bool {
        self.find_remote_candidate(remote_addr)
            .map_or(false, |remote| {
                self.remote_candidates[remote].seen(false);
                true
            })
    }

    pub(crate) fn send_stun(&mut self, msg: &Message, local: usize, remote: usize) {
        let peer_addr = self.remote_candidates[remote].addr();
        let local_addr = self.local_candidates[local].addr();

        self.transmits.push_back(Transmit {
            now: Instant::now(),
            transport: TransportContext {
                local_addr,
                peer_addr,
            },
            message: BytesMut::from(&msg.raw[..]),
        });

        self.local_candidates[local].seen(true);
    }

    pub(crate) fn get_name(&self) -> &str {
        if self.is_controlling {
            "controlling"
        } else {
            "controlled"
        }
    }
}
