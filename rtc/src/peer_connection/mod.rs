pub mod certificate;
pub mod configuration;
pub mod event;
pub(crate) mod internal;
pub mod sdp;
pub mod state;

use std::collections::VecDeque;
use std::time::Instant;

use bytes::BytesMut;
use datachannel::data_channel::{DataChannel, DataChannelConfig, DataChannelState};
use dtls::config::{HandshakeConfig, RemoteFingerprint};
use dtls::conn::DtlsConn;
use ice::agent::agent_config::AgentConfig;
use ice::agent::{Agent, IceAgentEvent};
use ice::candidate::unmarshal_candidate;
use log::{debug, warn};
use sctp::{Association, AssociationConfig, AssociationState, Side};
use std::sync::Arc;

use crate::data_channel::{RTCDataChannelId, RTCDataChannelInfo, RTCDataChannelInit};
use crate::handler::message::{
    ApplicationMessage, DTLSMessage, DataChannelEvent, RTCMessage, TaggedRTCMessage,
};
use crate::handler::PipelineContext;
use crate::peer_connection::certificate::RTCCertificate;
use crate::peer_connection::configuration::RTCConfiguration;
use crate::peer_connection::event::RTCPeerConnectionEvent;
use crate::peer_connection::internal::{RemoteDescriptionParams, DEFAULT_SCTP_PORT};
use crate::peer_connection::sdp::{RTCSdpType, RTCSessionDescription};
use crate::peer_connection::state::{
    check_next_signaling_state, RTCIceConnectionState, RTCIceGatheringState,
    RTCPeerConnectionState, RTCSignalingState, StateChangeOp,
};
use crate::transport::{RTCDtlsRole, RTCIceCandidateInit};
use shared::error::{Error, Result};
use shared::Transmit;

/// RTCPeerConnection represents a WebRTC connection that establishes
/// peer-to-peer communications with another endpoint implementing the
/// required protocols, restricted to unordered, unreliable data channels.
///
/// All protocol state is mutated from one execution context; the embedder
/// binds the UDP socket(s), feeds inbound datagrams through
/// [handle_read](shared::Protocol::handle_read), flushes
/// [poll_write](shared::Protocol::poll_write) to the socket, and fires
/// [handle_timeout](shared::Protocol::handle_timeout) at
/// [poll_timeout](shared::Protocol::poll_timeout) deadlines.
pub struct RTCPeerConnection {
    pub(crate) configuration: RTCConfiguration,
    pub(crate) certificate: RTCCertificate,

    signaling_state: RTCSignalingState,
    ice_connection_state: RTCIceConnectionState,
    ice_gathering_state: RTCIceGatheringState,
    connection_state: RTCPeerConnectionState,

    current_local_description: Option<RTCSessionDescription>,
    pending_local_description: Option<RTCSessionDescription>,
    current_remote_description: Option<RTCSessionDescription>,
    pending_remote_description: Option<RTCSessionDescription>,

    is_offerer: bool,
    pub(crate) remote_params: Option<RemoteDescriptionParams>,
    dtls_role: RTCDtlsRole,
    transports_started: bool,
    dtls_started: bool,
    negotiation_needed: bool,
    closed: bool,

    next_stream_id: RTCDataChannelId,

    pub(crate) pipeline_context: PipelineContext,
    pub(crate) events: VecDeque<RTCPeerConnectionEvent>,
}

impl RTCPeerConnection {
    /// Creates a PeerConnection with the given configuration. The embedder
    /// must have bound the UDP sockets listed in `local_addrs` already.
    pub fn new(configuration: RTCConfiguration) -> Result<Self> {
        configuration.validate()?;

        let certificate = if let Some(certificate) = configuration.certificates.first() {
            certificate.clone()
        } else if let Some(keys) = &configuration.dtls_keys {
            RTCCertificate::from_key_and_certificate(&keys.key_der, keys.cert_der.clone())?
        } else {
            RTCCertificate::generate()?
        };

        let mut urls = vec![];
        for server in &configuration.ice_servers {
            urls.extend(server.parse_urls()?);
        }
        let agent = Agent::new(AgentConfig {
            urls,
            local_addrs: configuration.local_addrs.clone(),
            gather_relay_only: configuration.ice_transport_policy
                == configuration::RTCIceTransportPolicy::Relay,
            stun_response_filter: configuration.ice_filter_stun_response.clone(),
            ..Default::default()
        })?;

        let mut pipeline_context = PipelineContext::default();
        pipeline_context.ice_handler_context.agent = Some(agent);

        Ok(Self {
            configuration,
            certificate,

            signaling_state: RTCSignalingState::Stable,
            ice_connection_state: RTCIceConnectionState::New,
            ice_gathering_state: RTCIceGatheringState::New,
            connection_state: RTCPeerConnectionState::New,

            current_local_description: None,
            pending_local_description: None,
            current_remote_description: None,
            pending_remote_description: None,

            is_offerer: false,
            remote_params: None,
            dtls_role: RTCDtlsRole::Auto,
            transports_started: false,
            dtls_started: false,
            negotiation_needed: false,
            closed: false,

            next_stream_id: 0,

            pipeline_context,
            events: VecDeque::new(),
        })
    }

    //
    // public state accessors
    //

    pub fn signaling_state(&self) -> RTCSignalingState {
        self.signaling_state
    }

    pub fn ice_connection_state(&self) -> RTCIceConnectionState {
        self.ice_connection_state
    }

    pub fn ice_gathering_state(&self) -> RTCIceGatheringState {
        self.ice_gathering_state
    }

    pub fn connection_state(&self) -> RTCPeerConnectionState {
        self.connection_state
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn get_configuration(&self) -> &RTCConfiguration {
        &self.configuration
    }

    /// Returns pending_local_description if it is not null and otherwise
    /// current_local_description (W3C webrtc-pc localDescription).
    pub fn local_description(&self) -> Option<&RTCSessionDescription> {
        self.pending_local_description
            .as_ref()
            .or(self.current_local_description.as_ref())
    }

    /// Returns pending_remote_description if it is not null and otherwise
    /// current_remote_description.
    pub fn remote_description(&self) -> Option<&RTCSessionDescription> {
        self.pending_remote_description
            .as_ref()
            .or(self.current_remote_description.as_ref())
    }

    //
    // negotiation
    //

    /// create_offer generates an SDP offer with the local transport
    /// parameters; apply it with set_local_description.
    pub fn create_offer(&mut self) -> Result<RTCSessionDescription> {
        if self.closed {
            return Err(Error::ErrConnectionClosed);
        }
        let sd = self.build_session_description(true)?;
        RTCSessionDescription::offer(sd.marshal())
    }

    /// create_answer generates the answer to the applied remote offer.
    pub fn create_answer(&mut self) -> Result<RTCSessionDescription> {
        if self.closed {
            return Err(Error::ErrConnectionClosed);
        }
        if self.signaling_state != RTCSignalingState::HaveRemoteOffer
            && self.signaling_state != RTCSignalingState::HaveLocalPranswer
        {
            return Err(Error::ErrInvalidState);
        }
        let sd = self.build_session_description(false)?;
        RTCSessionDescription::answer(sd.marshal())
    }

    /// set_local_description applies the local half of the offer/answer
    /// exchange and starts candidate gathering.
    pub fn set_local_description(&mut self, description: RTCSessionDescription) -> Result<()> {
        if self.closed {
            return Err(Error::ErrConnectionClosed);
        }
        description.unmarshal()?;

        let next = match description.sdp_type {
            RTCSdpType::Offer => RTCSignalingState::HaveLocalOffer,
            RTCSdpType::Pranswer => RTCSignalingState::HaveLocalPranswer,
            RTCSdpType::Answer => RTCSignalingState::Stable,
            _ => return Err(Error::ErrInvalidState),
        };
        let next = check_next_signaling_state(
            self.signaling_state,
            next,
            StateChangeOp::SetLocal,
            description.sdp_type,
        )?;
        self.update_signaling_state(next);

        let now = Instant::now();
        match description.sdp_type {
            RTCSdpType::Offer => {
                self.is_offerer = true;
                self.pending_local_description = Some(description);
            }
            RTCSdpType::Pranswer => {
                self.pending_local_description = Some(description);
            }
            RTCSdpType::Answer => {
                self.current_local_description = Some(description);
                self.pending_local_description = None;
                self.current_remote_description = self
                    .pending_remote_description
                    .take()
                    .or(self.current_remote_description.take());
            }
            _ => {}
        }

        // gathering begins with the first applied local description
        if let Some(agent) = self.pipeline_context.ice_handler_context.agent.as_mut() {
            agent.gather_candidates(now)?;
        }

        if matches!(
            self.signaling_state,
            RTCSignalingState::Stable | RTCSignalingState::HaveLocalPranswer
        ) && self.remote_params.is_some()
        {
            self.start_transports(now)?;
        }

        self.sync_layers(now);
        Ok(())
    }

    /// set_remote_description applies the remote half of the offer/answer
    /// exchange, validating answers against the pending offer.
    pub fn set_remote_description(&mut self, description: RTCSessionDescription) -> Result<()> {
        if self.closed {
            return Err(Error::ErrConnectionClosed);
        }
        let parsed = description.unmarshal()?;

        let next = match description.sdp_type {
            RTCSdpType::Offer => RTCSignalingState::HaveRemoteOffer,
            RTCSdpType::Pranswer => RTCSignalingState::HaveRemotePranswer,
            RTCSdpType::Answer => RTCSignalingState::Stable,
            _ => return Err(Error::ErrInvalidState),
        };
        // validate content before any state is touched
        if matches!(
            description.sdp_type,
            RTCSdpType::Answer | RTCSdpType::Pranswer
        ) {
            if let Some(pending) = &self.pending_local_description {
                Self::check_answer_matches_offer(&pending.unmarshal()?, &parsed)?;
            }
        }
        let params = Self::parse_remote_description(&parsed)?;

        let next = check_next_signaling_state(
            self.signaling_state,
            next,
            StateChangeOp::SetRemote,
            description.sdp_type,
        )?;
        self.update_signaling_state(next);

        let now = Instant::now();
        match description.sdp_type {
            RTCSdpType::Offer | RTCSdpType::Pranswer => {
                self.pending_remote_description = Some(description);
            }
            RTCSdpType::Answer => {
                self.current_remote_description = Some(description);
                self.pending_remote_description = None;
                self.current_local_description = self
                    .pending_local_description
                    .take()
                    .or(self.current_local_description.take());
            }
            _ => {}
        }

        // any candidates embedded in the description join the checklist
        for candidate in &params.candidates {
            match unmarshal_candidate(candidate) {
                Ok(c) => {
                    if let Some(agent) = self.pipeline_context.ice_handler_context.agent.as_mut()
                    {
                        let _ = agent.add_remote_candidate(c);
                    }
                }
                Err(err) => warn!("ignoring malformed remote candidate: {}", err),
            }
        }
        self.remote_params = Some(params);

        if matches!(
            self.signaling_state,
            RTCSignalingState::Stable | RTCSignalingState::HaveRemotePranswer
        ) {
            self.start_transports(now)?;
        }

        self.sync_layers(now);
        Ok(())
    }

    /// add_ice_candidate accepts a trickled candidate from the remote peer.
    /// An empty candidate string is the end-of-candidates marker.
    pub fn add_ice_candidate(&mut self, candidate: RTCIceCandidateInit) -> Result<()> {
        if self.closed {
            return Err(Error::ErrConnectionClosed);
        }
        if self.remote_description().is_none() {
            return Err(Error::ErrNoRemoteDescription);
        }
        if candidate.candidate.is_empty()
            || candidate.candidate.trim_start_matches("candidate:").trim() == "end-of-candidates"
        {
            debug!("remote signaled end of candidates");
            return Ok(());
        }

        let c = unmarshal_candidate(&candidate.candidate)?;
        if let Some(agent) = self.pipeline_context.ice_handler_context.agent.as_mut() {
            agent.add_remote_candidate(c)?;
        }
        self.sync_layers(Instant::now());
        Ok(())
    }

    //
    // data channels
    //

    /// create_data_channel registers a channel; it opens once the SCTP
    /// association is established and the DCEP exchange (when not
    /// negotiated) completes. Creating the first channel from stable defers
    /// a negotiation-needed notification.
    pub fn create_data_channel(
        &mut self,
        label: &str,
        options: Option<RTCDataChannelInit>,
    ) -> Result<RTCDataChannelId> {
        if self.closed {
            return Err(Error::ErrConnectionClosed);
        }
        let init = options.unwrap_or_default();
        if init.protocol.len() > 65535 {
            return Err(Error::ErrProtocolTooLarge);
        }

        let stream_id = match init.id {
            Some(id) => id,
            None => {
                let id = self.next_stream_id;
                self.next_stream_id += 2;
                id
            }
        };
        let channels = &mut self.pipeline_context.datachannel_handler_context.channels;
        if channels.contains_key(&stream_id) {
            return Err(Error::ErrDataChannelIdInUse);
        }

        channels.insert(
            stream_id,
            DataChannel::new(
                stream_id,
                DataChannelConfig {
                    label: label.to_owned(),
                    protocol: init.protocol,
                    ordered: init.ordered,
                    negotiated: init.negotiated,
                },
                true,
            ),
        );

        if self.sctp_established() {
            let now = Instant::now();
            self.open_local_channel(now, stream_id);
        } else if self.signaling_state == RTCSignalingState::Stable {
            self.negotiation_needed = true;
        }

        Ok(stream_id)
    }

    /// Sends one opaque binary message on an open channel. Payloads above
    /// the 1200-byte MTU fail synchronously; nothing is transmitted.
    pub fn send(&mut self, data_channel_id: RTCDataChannelId, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::ErrConnectionClosed);
        }
        if data.len() > sctp::MAX_MESSAGE_SIZE {
            return Err(Error::ErrOutboundPacketTooLarge);
        }
        let channel = self
            .pipeline_context
            .datachannel_handler_context
            .channels
            .get(&data_channel_id)
            .ok_or(Error::ErrInvalidState)?;
        if channel.state != DataChannelState::Open {
            return Err(Error::ErrInvalidState);
        }

        self.pipeline_context.write_ins.push_back(Transmit {
            now: Instant::now(),
            transport: Default::default(),
            message: RTCMessage::Dtls(DTLSMessage::DataChannel(ApplicationMessage {
                data_channel_id,
                data_channel_event: DataChannelEvent::Message(BytesMut::from(data)),
                remote_open: None,
            })),
        });
        Ok(())
    }

    //
    // teardown
    //

    /// Stops every timer, tears the transports down, and advances every
    /// state machine to closed. Idempotent: calling it N times yields the
    /// same observable state as calling it once.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let now = Instant::now();

        // best-effort graceful SCTP shutdown, flushed while DTLS still runs
        if let Some(association) = self.pipeline_context.sctp_handler_context.association.as_mut()
        {
            let _ = association.shutdown(now);
        }
        self.flush_writes();

        // close_notify tells the peer immediately even if SHUTDOWN is lost
        if let Some(conn) = self.pipeline_context.dtls_handler_context.conn.as_mut() {
            conn.close();
        }
        self.flush_writes();

        if let Some(agent) = self.pipeline_context.ice_handler_context.agent.as_mut() {
            let _ = agent.close();
        }

        // release connection state; events stay queued for the application
        self.pipeline_context.sctp_handler_context.association = None;
        self.pipeline_context.dtls_handler_context.conn = None;

        let channel_ids: Vec<RTCDataChannelId> = self
            .pipeline_context
            .datachannel_handler_context
            .channels
            .keys()
            .copied()
            .collect();
        for id in channel_ids {
            if let Some(channel) = self
                .pipeline_context
                .datachannel_handler_context
                .channels
                .get_mut(&id)
            {
                if channel.state != DataChannelState::Closed {
                    channel.state = DataChannelState::Closed;
                    self.events
                        .push_back(RTCPeerConnectionEvent::OnDataChannelClose(id));
                }
            }
        }

        self.update_signaling_state(RTCSignalingState::Closed);
        self.update_ice_connection_state(RTCIceConnectionState::Closed);
        self.set_connection_state(RTCPeerConnectionState::Closed);
        Ok(())
    }

    //
    // internal orchestration
    //

    fn sctp_established(&self) -> bool {
        self.pipeline_context
            .sctp_handler_context
            .association
            .as_ref()
            .map(|a| a.state() == AssociationState::Established)
            .unwrap_or(false)
    }

    fn start_transports(&mut self, now: Instant) -> Result<()> {
        if self.transports_started {
            return Ok(());
        }
        let params = self
            .remote_params
            .as_ref()
            .ok_or(Error::ErrNoRemoteDescription)?
            .clone();
        if params.fingerprints.is_empty() {
            return Err(Error::ErrInvalidSdp(
                "remote description carries no fingerprint".to_owned(),
            ));
        }

        // ICE role: the offerer controls, and a lite peer never does
        let is_controlling = params.ice_lite || self.is_offerer;

        // DTLS role from the negotiated setup attributes
        self.dtls_role = if self.is_offerer {
            match params.setup {
                RTCDtlsRole::Server => RTCDtlsRole::Client,
                _ => RTCDtlsRole::Server,
            }
        } else {
            match params.setup {
                RTCDtlsRole::Client => RTCDtlsRole::Server,
                _ => RTCDtlsRole::Client,
            }
        };

        if let Some(agent) = self.pipeline_context.ice_handler_context.agent.as_mut() {
            agent.start_connectivity_checks(
                now,
                is_controlling,
                params.ice_ufrag.clone(),
                params.ice_pwd.clone(),
            )?;
        }
        self.transports_started = true;
        self.set_connection_state(RTCPeerConnectionState::Connecting);
        Ok(())
    }

    fn try_start_dtls(&mut self, now: Instant) {
        if self.dtls_started || !self.transports_started {
            return;
        }
        let selected = self
            .pipeline_context
            .ice_handler_context
            .agent
            .as_ref()
            .and_then(|agent| agent.selected_addrs());
        if selected.is_none() {
            return;
        }
        let Some(params) = self.remote_params.as_ref() else {
            return;
        };

        let remote_fingerprints = params
            .fingerprints
            .iter()
            .map(|f| RemoteFingerprint {
                algorithm: f.algorithm.clone(),
                value: f.value.clone(),
            })
            .collect();
        let config = Arc::new(
            HandshakeConfig::new(self.certificate.dtls_certificate().clone())
                .with_remote_fingerprints(remote_fingerprints),
        );

        let is_client = self.dtls_role == RTCDtlsRole::Client;
        let mut conn = DtlsConn::new(config, is_client);
        if is_client {
            if let Err(err) = conn.start_handshake(now) {
                warn!("failed to start dtls handshake: {}", err);
                self.transport_failed();
                return;
            }
        }
        debug!("dtls transport started as {}", if is_client { "client" } else { "server" });
        self.pipeline_context.dtls_handler_context.conn = Some(conn);
        self.dtls_started = true;

        // replay anything that raced ahead of the nomination signal
        let early: Vec<TaggedRTCMessage> = self
            .pipeline_context
            .dtls_handler_context
            .early_datagrams
            .drain(..)
            .collect();
        for msg in early {
            let result = self.get_dtls_handler().handle_read(msg);
            if let Err(err) = result {
                self.absorb_pipeline_error(err);
            }
        }
    }

    fn try_start_sctp(&mut self, now: Instant) {
        if self.pipeline_context.sctp_handler_context.association.is_some() {
            return;
        }
        let side = if self.dtls_role == RTCDtlsRole::Client {
            Side::Client
        } else {
            Side::Server
        };
        let remote_port = self
            .remote_params
            .as_ref()
            .map(|p| p.sctp_port)
            .unwrap_or(DEFAULT_SCTP_PORT);

        let mut association = Association::new(AssociationConfig {
            side,
            local_port: DEFAULT_SCTP_PORT,
            remote_port,
            ..Default::default()
        });
        if side == Side::Client {
            if let Err(err) = association.connect(now) {
                warn!("failed to start sctp association: {}", err);
                self.transport_failed();
                return;
            }
        }
        debug!("sctp association started as {:?}", side);
        self.pipeline_context.sctp_handler_context.association = Some(association);
    }

    /// Pulls events out of every layer and triggers the next layer up:
    /// nominated pair starts DTLS, completed DTLS starts SCTP, established
    /// SCTP opens the data channels.
    pub(crate) fn sync_layers(&mut self, now: Instant) {
        // ICE
        let mut agent_events = vec![];
        if let Some(agent) = self.pipeline_context.ice_handler_context.agent.as_mut() {
            while let Some(event) = agent.poll_event() {
                agent_events.push(event);
            }
        }
        for event in agent_events {
            match event {
                IceAgentEvent::CandidateGathered(candidate) => {
                    let ufrag = self
                        .pipeline_context
                        .ice_handler_context
                        .agent
                        .as_ref()
                        .map(|a| a.get_local_user_credentials().0);
                    self.events.push_back(RTCPeerConnectionEvent::OnIceCandidate(
                        RTCIceCandidateInit {
                            candidate: format!("candidate:{}", candidate.marshal()),
                            sdp_mid: Some("0".to_owned()),
                            sdp_mline_index: Some(0),
                            username_fragment: ufrag,
                        },
                    ));
                }
                IceAgentEvent::GatheringStateChange(state) => {
                    let state = state.into();
                    if self.ice_gathering_state != state {
                        self.ice_gathering_state = state;
                        self.events.push_back(
                            RTCPeerConnectionEvent::OnIceGatheringStateChange(state),
                        );
                    }
                }
                IceAgentEvent::ConnectionStateChange(state) => {
                    self.update_ice_connection_state(state.into());
                    match state {
                        ice::state::ConnectionState::Connected
                        | ice::state::ConnectionState::Completed => self.try_start_dtls(now),
                        ice::state::ConnectionState::Failed => self.transport_failed(),
                        ice::state::ConnectionState::Disconnected => {
                            if self.connection_state == RTCPeerConnectionState::Connected {
                                self.set_connection_state(
                                    RTCPeerConnectionState::Disconnected,
                                );
                            }
                        }
                        _ => {}
                    }
                }
                IceAgentEvent::SelectedPairChange(local, remote) => {
                    debug!("selected candidate pair {} -> {}", local, remote);
                    self.try_start_dtls(now);
                }
            }
        }

        // DTLS
        let handshake_done = self
            .pipeline_context
            .dtls_handler_context
            .conn
            .as_ref()
            .map(|c| c.is_handshake_completed())
            .unwrap_or(false);
        if handshake_done && !self.pipeline_context.dtls_handler_context.handshake_signaled {
            self.pipeline_context.dtls_handler_context.handshake_signaled = true;
            self.try_start_sctp(now);
        }
        if self.pipeline_context.dtls_handler_context.peer_closed && !self.closed {
            debug!("peer closed the dtls transport");
            self.remote_closed();
            return;
        }

        // SCTP
        if self.sctp_established()
            && !self.pipeline_context.sctp_handler_context.connected_signaled
        {
            self.pipeline_context.sctp_handler_context.connected_signaled = true;
            self.set_connection_state(RTCPeerConnectionState::Connected);
            let pending: Vec<RTCDataChannelId> = self
                .pipeline_context
                .datachannel_handler_context
                .channels
                .iter()
                .filter(|(_, ch)| ch.locally_created && ch.state == DataChannelState::Connecting)
                .map(|(id, _)| *id)
                .collect();
            for id in pending {
                self.open_local_channel(now, id);
            }
        }
        let reset_streams: Vec<u16> = self
            .pipeline_context
            .sctp_handler_context
            .reset_streams
            .drain(..)
            .collect();
        for stream_id in reset_streams {
            if let Some(channel) = self
                .pipeline_context
                .datachannel_handler_context
                .channels
                .get_mut(&stream_id)
            {
                if channel.state != DataChannelState::Closed {
                    channel.state = DataChannelState::Closed;
                    self.events
                        .push_back(RTCPeerConnectionEvent::OnDataChannelClose(stream_id));
                }
            }
        }
        if self.pipeline_context.sctp_handler_context.closed && !self.closed {
            debug!("sctp association closed by peer");
            self.remote_closed();
            return;
        }

        self.check_negotiation_needed();
    }

    /// DCEP OPEN for a locally created channel; negotiated channels open
    /// without the exchange.
    fn open_local_channel(&mut self, now: Instant, stream_id: RTCDataChannelId) {
        let negotiated = self
            .pipeline_context
            .datachannel_handler_context
            .channels
            .get(&stream_id)
            .map(|ch| ch.config.negotiated)
            .unwrap_or(false);
        if negotiated {
            if let Some(channel) = self
                .pipeline_context
                .datachannel_handler_context
                .channels
                .get_mut(&stream_id)
            {
                channel.state = DataChannelState::Open;
            }
            self.events
                .push_back(RTCPeerConnectionEvent::OnDataChannelOpen(stream_id));
        } else if let Err(err) = self
            .pipeline_context
            .datachannel_handler_context
            .queue_open(now, stream_id)
        {
            warn!("failed to queue channel open: {}", err);
        }
    }

    /// Converts messages that reached the top of the read path into events.
    pub(crate) fn handle_application_message(&mut self, msg: TaggedRTCMessage) {
        let RTCMessage::Dtls(DTLSMessage::DataChannel(app)) = msg.message else {
            debug!("dropping unconsumed pipeline message");
            return;
        };
        match app.data_channel_event {
            DataChannelEvent::Open => {
                if let Some((label, protocol, ordered)) = app.remote_open {
                    self.events.push_back(RTCPeerConnectionEvent::OnDataChannel(
                        RTCDataChannelInfo {
                            id: app.data_channel_id,
                            label,
                            protocol,
                            ordered,
                        },
                    ));
                }
                self.events
                    .push_back(RTCPeerConnectionEvent::OnDataChannelOpen(
                        app.data_channel_id,
                    ));
            }
            DataChannelEvent::Message(payload) => {
                self.events
                    .push_back(RTCPeerConnectionEvent::OnDataChannelMessage(
                        app.data_channel_id,
                        payload,
                    ));
            }
            DataChannelEvent::Close => {
                self.events
                    .push_back(RTCPeerConnectionEvent::OnDataChannelClose(
                        app.data_channel_id,
                    ));
            }
        }
    }

    pub(crate) fn check_negotiation_needed(&mut self) {
        // suppressed while signaling is non-stable, fired on the next tick
        if self.negotiation_needed && self.signaling_state == RTCSignalingState::Stable {
            self.negotiation_needed = false;
            self.events
                .push_back(RTCPeerConnectionEvent::OnNegotiationNeeded);
        }
    }

    pub(crate) fn transport_failed(&mut self) {
        if self.closed {
            return;
        }
        self.set_connection_state(RTCPeerConnectionState::Failed);
    }

    /// The peer tore the transports down (close_notify or SCTP shutdown).
    fn remote_closed(&mut self) {
        self.closed = true;
        if let Some(agent) = self.pipeline_context.ice_handler_context.agent.as_mut() {
            let _ = agent.close();
        }
        self.pipeline_context.sctp_handler_context.association = None;
        self.pipeline_context.dtls_handler_context.conn = None;

        let channel_ids: Vec<RTCDataChannelId> = self
            .pipeline_context
            .datachannel_handler_context
            .channels
            .keys()
            .copied()
            .collect();
        for id in channel_ids {
            if let Some(channel) = self
                .pipeline_context
                .datachannel_handler_context
                .channels
                .get_mut(&id)
            {
                if channel.state != DataChannelState::Closed {
                    channel.state = DataChannelState::Closed;
                    self.events
                        .push_back(RTCPeerConnectionEvent::OnDataChannelClose(id));
                }
            }
        }

        self.update_signaling_state(RTCSignalingState::Closed);
        self.update_ice_connection_state(RTCIceConnectionState::Closed);
        self.set_connection_state(RTCPeerConnectionState::Closed);
    }

    fn update_signaling_state(&mut self, state: RTCSignalingState) {
        if self.signaling_state != state {
            self.signaling_state = state;
            self.events
                .push_back(RTCPeerConnectionEvent::OnSignalingStateChange(state));
        }
    }

    fn update_ice_connection_state(&mut self, state: RTCIceConnectionState) {
        if self.ice_connection_state != state {
            self.ice_connection_state = state;
            self.events
                .push_back(RTCPeerConnectionEvent::OnIceConnectionStateChange(state));
        }
    }

    fn set_connection_state(&mut self, state: RTCPeerConnectionState) {
        // terminal states are sticky: failed and closed never regress
        if matches!(
            self.connection_state,
            RTCPeerConnectionState::Closed | RTCPeerConnectionState::Failed
        ) && state != RTCPeerConnectionState::Closed
        {
            return;
        }
        if self.connection_state != state {
            self.connection_state = state;
            self.events
                .push_back(RTCPeerConnectionEvent::OnConnectionStateChange(state));
        }
    }
}
