use crate::agent::Agent;
use crate::candidate::{CandidateConfig, CandidateRelatedAddress, CandidateType};
use crate::state::GatheringState;
use crate::url::{SchemeType, Url};
use shared::error::{Error, Result};
use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Instant;
use stun::attributes::{RequestedTransport, ATTR_XOR_RELAYED_ADDRESS};
use stun::client::Client;
use stun::error_code::{ErrorCodeAttribute, CODE_UNAUTHORIZED};
use stun::fingerprint::FINGERPRINT;
use stun::integrity::MessageIntegrity;
use stun::message::{
    Getter, Message, TransactionId, ALLOCATE_REQUEST, BINDING_REQUEST, CLASS_ERROR_RESPONSE,
};
use stun::textattrs::{Nonce, Realm, Username};
use stun::xoraddr::XorMappedAddress;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum GatherPhase {
    /// Binding request towards a STUN server.
    Binding,
    /// First Allocate, sent without credentials to learn realm and nonce.
    AllocateProbe,
    /// Authenticated Allocate carrying long-term credentials.
    Allocate,
    Done,
}

struct GatherServer {
    url: Url,
    addr: SocketAddr,
    phase: GatherPhase,
    realm: String,
    nonce: String,
}

/// Per-agent gathering state: one STUN client multiplexes every server
/// transaction over the agent's socket.
pub(crate) struct GatherContext {
    pub(crate) client: Client,
    servers: Vec<GatherServer>,
    transactions: HashMap<TransactionId, usize>,
}

impl GatherContext {
    pub(crate) fn new(local_addr: SocketAddr) -> Self {
        Self {
            client: Client::new(local_addr),
            servers: vec![],
            transactions: HashMap::new(),
        }
    }

    pub(crate) fn owns_transaction(&self, id: &TransactionId) -> bool {
        self.transactions.contains_key(id)
    }
}

impl Agent {
    /// Starts candidate gathering: host candidates immediately, then one
    /// transaction per configured STUN/TURN server.
    pub fn gather_candidates(&mut self, now: Instant) -> Result<()> {
        if self.gathering_state == GatheringState::Gathering {
            return Ok(());
        }
        self.update_gathering_state(GatheringState::Gathering);

        if !self.gather_relay_only {
            for addr in self.local_addrs.clone() {
                let candidate = CandidateConfig {
                    candidate_type: CandidateType::Host,
                    address: addr.ip().to_string(),
                    port: addr.port(),
                    component: crate::COMPONENT_RTP,
                    ..Default::default()
                }
                .new_candidate()?;
                self.add_local_candidate(candidate)?;
            }
        }

        for url in self.urls.clone() {
            if url.scheme == SchemeType::Stun && self.gather_relay_only {
                continue;
            }
            if let Err(err) = self.start_server_transaction(now, url.clone()) {
                log::warn!(
                    "[{}]: failed to contact server {}: {}",
                    self.get_name(),
                    url,
                    err
                );
            }
        }

        self.check_gathering_complete();
        Ok(())
    }

    fn start_server_transaction(&mut self, now: Instant, url: Url) -> Result<()> {
        let local_addr = self.local_addrs[0];
        let addr = (url.host.as_str(), url.port)
            .to_socket_addrs()?
            .find(|a| a.is_ipv4() == local_addr.is_ipv4())
            .ok_or(Error::ErrNoLocalAddress)?;

        let (phase, msg) = match url.scheme {
            SchemeType::Stun => {
                let mut msg = Message::new();
                msg.build(&[
                    Box::new(BINDING_REQUEST),
                    Box::new(TransactionId::new()),
                ])?;
                (GatherPhase::Binding, msg)
            }
            SchemeType::Turn => {
                let mut msg = Message::new();
                msg.build(&[
                    Box::new(ALLOCATE_REQUEST),
                    Box::new(TransactionId::new()),
                    Box::new(RequestedTransport),
                    Box::new(FINGERPRINT),
                ])?;
                (GatherPhase::AllocateProbe, msg)
            }
            SchemeType::Unknown => return Err(Error::ErrSchemeType),
        };

        self.gather.servers.push(GatherServer {
            url,
            addr,
            phase,
            realm: String::new(),
            nonce: String::new(),
        });
        let index = self.gather.servers.len() - 1;
        self.gather.transactions.insert(msg.transaction_id, index);
        self.gather.client.handle_write(now, &msg, addr)?;
        self.drain_gather_transmits();

        Ok(())
    }

    /// Advances gathering transactions: retransmissions, responses, failures.
    pub(crate) fn drive_gather(&mut self, now: Instant) -> Result<()> {
        self.gather.client.handle_timeout(now)?;
        self.drain_gather_transmits();

        while let Some(event) = self.gather.client.poll_event() {
            let index = match self.gather.transactions.remove(&event.id) {
                Some(index) => index,
                None => continue,
            };
            match event.result {
                Ok(msg) => self.handle_gather_response(now, index, msg)?,
                Err(err) => {
                    log::warn!(
                        "[{}]: gathering transaction towards {} failed: {}",
                        self.get_name(),
                        self.gather.servers[index].url,
                        err
                    );
                    self.gather.servers[index].phase = GatherPhase::Done;
                }
            }
            self.drain_gather_transmits();
        }

        self.check_gathering_complete();
        Ok(())
    }

    fn drain_gather_transmits(&mut self) {
        while let Some(transmit) = self.gather.client.poll_transmit() {
            self.transmits.push_back(transmit);
        }
    }

    fn handle_gather_response(&mut self, now: Instant, index: usize, msg: Message) -> Result<()> {
        let phase = self.gather.servers[index].phase;
        match phase {
            GatherPhase::Binding => {
                let mut reflexive = XorMappedAddress::default();
                reflexive.get_from(&msg)?;
                let base = self.local_addrs[0];
                let candidate = CandidateConfig {
                    candidate_type: CandidateType::ServerReflexive,
                    address: reflexive.ip.to_string(),
                    port: reflexive.port,
                    component: crate::COMPONENT_RTP,
                    base_address: base.ip().to_string(),
                    server: self.gather.servers[index].url.to_string(),
                    related_address: Some(CandidateRelatedAddress {
                        address: base.ip().to_string(),
                        port: base.port(),
                    }),
                    ..Default::default()
                }
                .new_candidate()?;
                self.add_local_candidate(candidate)?;
                self.gather.servers[index].phase = GatherPhase::Done;
            }
            GatherPhase::AllocateProbe => {
                if msg.typ.class == CLASS_ERROR_RESPONSE {
                    let mut code = ErrorCodeAttribute::default();
                    code.get_from(&msg)?;
                    if code.code != CODE_UNAUTHORIZED
                        || self.gather.servers[index].url.username.is_empty()
                    {
                        log::warn!(
                            "[{}]: allocate rejected by {}: {}",
                            self.get_name(),
                            self.gather.servers[index].url,
                            code
                        );
                        self.gather.servers[index].phase = GatherPhase::Done;
                        return Ok(());
                    }

                    // 401 carries the realm and nonce for the retry with
                    // long-term credentials (RFC 5766 Section 10.2)
                    let mut realm = Realm::new_realm(String::new());
                    realm.get_from(&msg)?;
                    let mut nonce = Nonce::new_nonce(String::new());
                    nonce.get_from(&msg)?;
                    self.gather.servers[index].realm = realm.text.clone();
                    self.gather.servers[index].nonce = nonce.text.clone();

                    let url = self.gather.servers[index].url.clone();
                    let mut retry = Message::new();
                    retry.build(&[
                        Box::new(ALLOCATE_REQUEST),
                        Box::new(TransactionId::new()),
                        Box::new(RequestedTransport),
                        Box::new(Username::new_username(url.username.clone())),
                        Box::new(realm),
                        Box::new(nonce),
                        Box::new(MessageIntegrity::new_long_term_integrity(
                            url.username.clone(),
                            self.gather.servers[index].realm.clone(),
                            url.password.clone(),
                        )),
                        Box::new(FINGERPRINT),
                    ])?;
                    let addr = self.gather.servers[index].addr;
                    self.gather.transactions.insert(retry.transaction_id, index);
                    self.gather.servers[index].phase = GatherPhase::Allocate;
                    self.gather.client.handle_write(now, &retry, addr)?;
                } else {
                    // some servers accept an unauthenticated allocate
                    self.emit_relay_candidate(index, &msg)?;
                }
            }
            GatherPhase::Allocate => {
                if msg.typ.class == CLASS_ERROR_RESPONSE {
                    let mut code = ErrorCodeAttribute::default();
                    let _ = code.get_from(&msg);
                    log::warn!(
                        "[{}]: authenticated allocate rejected by {}: {}",
                        self.get_name(),
                        self.gather.servers[index].url,
                        code
                    );
                    self.gather.servers[index].phase = GatherPhase::Done;
                } else {
                    self.emit_relay_candidate(index, &msg)?;
                }
            }
            GatherPhase::Done => {}
        }
        Ok(())
    }

    fn emit_relay_candidate(&mut self, index: usize, msg: &Message) -> Result<()> {
        let mut relayed = XorMappedAddress::default();
        relayed.get_from_as(msg, ATTR_XOR_RELAYED_ADDRESS)?;

        let mut related = XorMappedAddress::default();
        let related_address = related
            .get_from(msg)
            .ok()
            .map(|_| CandidateRelatedAddress {
                address: related.ip.to_string(),
                port: related.port,
            });

        let candidate = CandidateConfig {
            candidate_type: CandidateType::Relay,
            address: relayed.ip.to_string(),
            port: relayed.port,
            component: crate::COMPONENT_RTP,
            base_address: relayed.ip.to_string(),
            server: self.gather.servers[index].url.to_string(),
            related_address,
            ..Default::default()
        }
        .new_candidate()?;
        self.add_local_candidate(candidate)?;
        self.gather.servers[index].phase = GatherPhase::Done;
        Ok(())
    }

    fn check_gathering_complete(&mut self) {
        if self.gathering_state != GatheringState::Gathering {
            return;
        }
        let all_done = self
            .gather
            .servers
            .iter()
            .all(|s| s.phase == GatherPhase::Done)
            && !self.gather.client.has_pending();
        if all_done {
            self.update_gathering_state(GatheringState::Complete);
        }
    }

    fn update_gathering_state(&mut self, new_state: GatheringState) {
        if self.gathering_state != new_state {
            log::info!(
                "[{}]: Setting new gathering state: {}",
                self.get_name(),
                new_state
            );
            self.gathering_state = new_state;
            self.events
                .push_back(super::IceAgentEvent::GatheringStateChange(new_state));
        }
    }
}

#[cfg(test)]
mod gather_test {
    use super::*;
    use crate::agent::agent_config::AgentConfig;
    use crate::agent::IceAgentEvent;
    use stun::message::Setter;

    fn new_agent() -> Agent {
        Agent::new(AgentConfig {
            local_addrs: vec!["127.0.0.1:5000".parse().unwrap()],
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_host_gathering_completes_without_servers() -> Result<()> {
        let mut agent = new_agent();
        agent.gather_candidates(Instant::now())?;

        assert_eq!(agent.gathering_state(), GatheringState::Complete);
        assert_eq!(agent.local_candidates.len(), 1);
        assert_eq!(
            agent.local_candidates[0].candidate_type(),
            CandidateType::Host
        );

        let mut saw_candidate = false;
        let mut saw_complete = false;
        while let Some(event) = agent.poll_event() {
            match event {
                IceAgentEvent::CandidateGathered(_) => saw_candidate = true,
                IceAgentEvent::GatheringStateChange(GatheringState::Complete) => {
                    saw_complete = true
                }
                _ => {}
            }
        }
        assert!(saw_candidate && saw_complete);
        Ok(())
    }

    #[test]
    fn test_stun_server_produces_srflx() -> Result<()> {
        let mut agent = Agent::new(AgentConfig {
            local_addrs: vec!["127.0.0.1:5000".parse().unwrap()],
            urls: vec![Url::parse_url("stun:127.0.0.1:3478")?],
            ..Default::default()
        })
        .unwrap();
        let now = Instant::now();
        agent.gather_candidates(now)?;
        assert_eq!(agent.gathering_state(), GatheringState::Gathering);

        // the binding request towards the server must be on the wire
        let transmit = agent.poll_transmit().expect("binding request");
        let mut request = Message {
            raw: transmit.message.to_vec(),
            ..Default::default()
        };
        request.decode()?;
        assert_eq!(request.typ, BINDING_REQUEST);

        // fake the server's reflexive answer
        let mut response = Message::new();
        response.build(&[
            Box::new(request.clone()),
            Box::new(stun::message::BINDING_SUCCESS),
        ])?;
        XorMappedAddress {
            ip: "203.0.113.7".parse().unwrap(),
            port: 43210,
        }
        .add_to(&mut response)?;
        response.encode();

        let mut inbound = Message {
            raw: response.raw.clone(),
            ..Default::default()
        };
        inbound.decode()?;
        agent.handle_read(
            now,
            &mut inbound,
            "127.0.0.1:5000".parse().unwrap(),
            "127.0.0.1:3478".parse().unwrap(),
        )?;

        assert_eq!(agent.gathering_state(), GatheringState::Complete);
        assert!(agent
            .local_candidates
            .iter()
            .any(|c| c.candidate_type() == CandidateType::ServerReflexive
                && c.address() == "203.0.113.7"));
        Ok(())
    }
}
