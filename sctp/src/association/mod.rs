use crate::chunk::chunk_data::{ChunkData, PayloadProtocolIdentifier};
use crate::chunk::chunk_error::{ChunkError, ErrorCause, CAUSE_STALE_COOKIE_ERROR};
use crate::chunk::chunk_init::ChunkInit;
use crate::chunk::chunk_reconfig::ChunkReconfig;
use crate::chunk::{Chunk, CT_FORWARD_TSN, CT_INIT, CT_RECONFIG};
use crate::packet::Packet;
use crate::param::{Param, ParamSet, RECONFIG_RESULT_SUCCESS_PERFORMED};
use crate::rto::RtoCalculator;
use crate::MAX_MESSAGE_SIZE;

use bytes::{Bytes, BytesMut};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use shared::error::{Error, Result};

type HmacSha1 = Hmac<Sha1>;

const DEFAULT_SCTP_PORT: u16 = 5000;
const DEFAULT_A_RWND: u32 = 1024 * 1024;
const DEFAULT_MAX_STREAMS: u16 = u16::MAX;

/// Cookie layout: 4-byte big-endian unix seconds, then a 20-byte HMAC-SHA1
/// of those four bytes under the association's cookie key.
const COOKIE_SIZE: usize = 24;
const COOKIE_LIFETIME: u64 = 60;

const MAX_INIT_RETRANS: u32 = 8;
const MAX_ASSOCIATION_RETRANS: u32 = 10;

/// Serial number arithmetic on 32-bit TSNs (RFC 1982):
/// a > b iff 0 < (a - b) mod 2^32 < 2^31.
pub(crate) fn sna32_gt(a: u32, b: u32) -> bool {
    a != b && a.wrapping_sub(b) < (1 << 31)
}

pub(crate) fn generate_cookie(key: &[u8; 16], now_unix: u64) -> Bytes {
    let ts = (now_unix as u32).to_be_bytes();
    let mut mac = HmacSha1::new_from_slice(key).expect("hmac accepts any key size");
    mac.update(&ts);
    let tag = mac.finalize().into_bytes();

    let mut cookie = Vec::with_capacity(COOKIE_SIZE);
    cookie.extend_from_slice(&ts);
    cookie.extend_from_slice(&tag);
    Bytes::from(cookie)
}

pub(crate) fn validate_cookie(key: &[u8; 16], cookie: &[u8], now_unix: u64) -> Result<()> {
    if cookie.len() != COOKIE_SIZE {
        return Err(Error::ErrSctpCookieInvalid);
    }
    let ts_bytes = &cookie[..4];
    let mut mac = HmacSha1::new_from_slice(key).expect("hmac accepts any key size");
    mac.update(ts_bytes);
    if mac.verify_slice(&cookie[4..]).is_err() {
        return Err(Error::ErrSctpCookieInvalid);
    }

    let ts = u32::from_be_bytes([cookie[0], cookie[1], cookie[2], cookie[3]]) as u64;
    if ts > now_unix || now_unix - ts > COOKIE_LIFETIME {
        return Err(Error::ErrSctpCookieStale);
    }
    Ok(())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Which end initiates the association; the DTLS client also drives SCTP.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Side {
    Client,
    Server,
}

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum AssociationState {
    #[default]
    Closed,
    CookieWait,
    CookieEchoed,
    Established,
    ShutdownSent,
    ShutdownReceived,
    ShutdownAckSent,
}

impl fmt::Display for AssociationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Closed => "CLOSED",
            Self::CookieWait => "COOKIE_WAIT",
            Self::CookieEchoed => "COOKIE_ECHOED",
            Self::Established => "ESTABLISHED",
            Self::ShutdownSent => "SHUTDOWN_SENT",
            Self::ShutdownReceived => "SHUTDOWN_RECEIVED",
            Self::ShutdownAckSent => "SHUTDOWN_ACK_SENT",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationEvent {
    /// The handshake finished; user data may flow.
    Connected,
    /// An inbound DATA chunk, delivered immediately and exactly as received.
    Data {
        stream_id: u16,
        ppi: PayloadProtocolIdentifier,
        payload: Bytes,
    },
    /// The peer reset its outgoing streams (our inbound ones).
    StreamsReset(Vec<u16>),
    /// The peer opened additional outgoing streams.
    StreamsAdded(u16),
    /// The association reached CLOSED.
    Closed,
}

#[derive(Debug, Clone)]
pub struct AssociationConfig {
    pub side: Side,
    pub local_port: u16,
    pub remote_port: u16,
    pub max_inbound_streams: u16,
    pub max_outbound_streams: u16,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        Self {
            side: Side::Client,
            local_port: DEFAULT_SCTP_PORT,
            remote_port: DEFAULT_SCTP_PORT,
            max_inbound_streams: DEFAULT_MAX_STREAMS,
            max_outbound_streams: DEFAULT_MAX_STREAMS,
        }
    }
}

/// A handshake or shutdown retransmission timer; `raw` is resent verbatim.
#[derive(Default)]
struct RetransTimer {
    deadline: Option<Instant>,
    raw: Option<BytesMut>,
    sent_at: Option<Instant>,
    retrans: u32,
}

impl RetransTimer {
    fn arm(&mut self, now: Instant, rto: Duration, raw: BytesMut) {
        self.deadline = Some(now + rto);
        self.raw = Some(raw);
        self.sent_at = Some(now);
        self.retrans = 0;
    }

    fn clear(&mut self) {
        self.deadline = None;
        self.raw = None;
        self.sent_at = None;
        self.retrans = 0;
    }
}

/// A pending stream reconfiguration request with its own backoff schedule.
struct PendingReconfig {
    request_seq: u32,
    raw: BytesMut,
    deadline: Instant,
    rto_secs: f64,
    retrans: u32,
}

/// A reduced SCTP association over an ordered-by-arrival datagram path.
///
/// This object performs no I/O: inbound packets enter via `handle_read`,
/// outbound packets leave via `poll_transmit`, timers are exposed through
/// `poll_timeout`/`handle_timeout`, and state changes surface from
/// `poll_event`.
pub struct Association {
    side: Side,
    state: AssociationState,
    local_port: u16,
    remote_port: u16,

    my_verification_tag: u32,
    peer_verification_tag: u32,

    my_next_tsn: u32,
    peer_last_tsn: u32,
    /// TSNs seen ahead of the cumulative point.
    ooo_tsns: BTreeSet<u32>,

    /// Outbound stream sequence counters for ordered sends; wrap at 2^16.
    stream_sequence_numbers: HashMap<u16, u16>,

    my_max_num_inbound_streams: u16,
    my_max_num_outbound_streams: u16,
    peer_num_inbound_streams: u16,
    peer_num_outbound_streams: u16,

    cookie_key: [u8; 16],

    rto: RtoCalculator,
    t1: RetransTimer,
    t2: RetransTimer,

    my_next_reconfig_seq: u32,
    /// At most one reconfiguration request may be in flight.
    pending_reconfig: Option<PendingReconfig>,

    transmits: VecDeque<BytesMut>,
    events: VecDeque<AssociationEvent>,
}

impl Association {
    pub fn new(config: AssociationConfig) -> Self {
        let my_verification_tag = loop {
            let tag = rand::random::<u32>();
            if tag != 0 {
                break tag;
            }
        };
        let my_next_tsn = rand::random::<u32>();

        Self {
            side: config.side,
            state: AssociationState::Closed,
            local_port: config.local_port,
            remote_port: config.remote_port,

            my_verification_tag,
            peer_verification_tag: 0,

            my_next_tsn,
            peer_last_tsn: 0,
            ooo_tsns: BTreeSet::new(),

            stream_sequence_numbers: HashMap::new(),

            my_max_num_inbound_streams: config.max_inbound_streams,
            my_max_num_outbound_streams: config.max_outbound_streams,
            peer_num_inbound_streams: 0,
            peer_num_outbound_streams: 0,

            cookie_key: rand::random::<[u8; 16]>(),

            rto: RtoCalculator::new(),
            t1: RetransTimer::default(),
            t2: RetransTimer::default(),

            my_next_reconfig_seq: my_next_tsn,
            pending_reconfig: None,

            transmits: VecDeque::new(),
            events: VecDeque::new(),
        }
    }

    pub fn state(&self) -> AssociationState {
        self.state
    }

    pub fn side(&self) -> Side {
        self.side
    }

    fn rto_duration(&self) -> Duration {
        Duration::from_secs_f64(self.rto.rto())
    }

    fn extension_params() -> ParamSet {
        ParamSet(vec![
            Param::ForwardTsnSupported,
            Param::SupportedExtensions(vec![CT_FORWARD_TSN, CT_RECONFIG]),
        ])
    }

    fn send_packet(&mut self, verification_tag: u32, chunks: Vec<Chunk>) -> BytesMut {
        let raw = Packet {
            source_port: self.local_port,
            destination_port: self.remote_port,
            verification_tag,
            chunks,
        }
        .marshal();
        self.transmits.push_back(raw.clone());
        raw
    }

    /// Starts the client handshake by sending INIT.
    pub fn connect(&mut self, now: Instant) -> Result<()> {
        if self.side != Side::Client || self.state != AssociationState::Closed {
            return Err(Error::ErrInvalidState);
        }

        let init = Chunk::Init(ChunkInit {
            is_ack: false,
            initiate_tag: self.my_verification_tag,
            advertised_receiver_window_credit: DEFAULT_A_RWND,
            num_outbound_streams: self.my_max_num_outbound_streams,
            num_inbound_streams: self.my_max_num_inbound_streams,
            initial_tsn: self.my_next_tsn,
            params: Self::extension_params(),
        });

        // INIT is the only packet carrying a zero verification tag
        let raw = self.send_packet(0, vec![init]);
        self.t1.arm(now, self.rto_duration(), raw);
        self.set_state(AssociationState::CookieWait);
        Ok(())
    }

    /// Queues a single user message. Payloads above the 1200-byte MTU are
    /// rejected; there is no fragmentation and no retransmission queue.
    pub fn send(
        &mut self,
        stream_id: u16,
        ppi: PayloadProtocolIdentifier,
        payload: Bytes,
        ordered: bool,
    ) -> Result<()> {
        if self.state != AssociationState::Established {
            return Err(Error::ErrSctpClosed);
        }
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(Error::ErrOutboundPacketTooLarge);
        }

        let stream_sequence_number = if ordered {
            let ssn = self.stream_sequence_numbers.entry(stream_id).or_insert(0);
            let current = *ssn;
            *ssn = ssn.wrapping_add(1);
            current
        } else {
            0
        };

        let data = Chunk::Data(ChunkData {
            unordered: !ordered,
            tsn: self.my_next_tsn,
            stream_identifier: stream_id,
            stream_sequence_number,
            payload_type: ppi,
            user_data: payload,
        });
        self.my_next_tsn = self.my_next_tsn.wrapping_add(1);

        self.send_packet(self.peer_verification_tag, vec![data]);
        Ok(())
    }

    /// Requests an outgoing SSN reset for the given streams.
    pub fn reset_streams(&mut self, now: Instant, streams: &[u16]) -> Result<()> {
        let request_seq = self.next_reconfig_seq()?;
        let param = Param::OutgoingSsnResetRequest {
            request_seq,
            response_seq: 0,
            last_tsn: self.my_next_tsn.wrapping_sub(1),
            streams: streams.to_vec(),
        };
        self.send_reconfig_request(now, request_seq, param)
    }

    /// Requests additional outgoing streams.
    pub fn add_outgoing_streams(&mut self, now: Instant, new_streams: u16) -> Result<()> {
        let request_seq = self.next_reconfig_seq()?;
        let param = Param::AddOutgoingStreamsRequest {
            request_seq,
            new_streams,
        };
        self.send_reconfig_request(now, request_seq, param)
    }

    fn next_reconfig_seq(&mut self) -> Result<u32> {
        if self.state != AssociationState::Established {
            return Err(Error::ErrSctpClosed);
        }
        if self.pending_reconfig.is_some() {
            return Err(Error::ErrReconfigInFlight);
        }
        let seq = self.my_next_reconfig_seq;
        self.my_next_reconfig_seq = self.my_next_reconfig_seq.wrapping_add(1);
        Ok(seq)
    }

    fn send_reconfig_request(&mut self, now: Instant, request_seq: u32, param: Param) -> Result<()> {
        let chunk = Chunk::Reconfig(ChunkReconfig {
            params: ParamSet(vec![param]),
        });
        let raw = self.send_packet(self.peer_verification_tag, vec![chunk]);

        let rto_secs = self.rto.rto();
        self.pending_reconfig = Some(PendingReconfig {
            request_seq,
            raw,
            deadline: now + Duration::from_secs_f64(rto_secs),
            rto_secs,
            retrans: 0,
        });
        Ok(())
    }

    /// Initiates a graceful shutdown.
    pub fn shutdown(&mut self, now: Instant) -> Result<()> {
        match self.state {
            AssociationState::Established => {
                let raw = self.send_packet(self.peer_verification_tag, vec![Chunk::Shutdown]);
                self.t2.arm(now, self.rto_duration(), raw);
                self.set_state(AssociationState::ShutdownSent);
                Ok(())
            }
            AssociationState::Closed => Ok(()),
            _ => Err(Error::ErrInvalidState),
        }
    }

    /// Hard teardown: sends ABORT when a handshake ever completed, stops all
    /// timers, and advances to CLOSED. Idempotent.
    pub fn abort(&mut self) {
        if self.state == AssociationState::Closed {
            return;
        }
        if self.peer_verification_tag != 0 {
            self.send_packet(
                self.peer_verification_tag,
                vec![Chunk::Abort(crate::chunk::chunk_error::ChunkAbort { causes: vec![] })],
            );
        }
        self.stop_all_timers();
        self.set_state(AssociationState::Closed);
        self.events.push_back(AssociationEvent::Closed);
    }

    fn stop_all_timers(&mut self) {
        self.t1.clear();
        self.t2.clear();
        self.pending_reconfig = None;
    }

    fn set_state(&mut self, state: AssociationState) {
        if self.state != state {
            log::debug!("[{:?}] association state: {} -> {}", self.side, self.state, state);
            self.state = state;
        }
    }

    /// Processes one inbound SCTP packet (one DTLS application datagram).
    pub fn handle_read(&mut self, now: Instant, raw: &[u8]) -> Result<()> {
        let packet = Packet::unmarshal(raw)?;

        // RFC 4960 Section 8.5: the verification tag must equal our own tag;
        // zero is allowed only on a packet whose first chunk is INIT.
        if packet.first_chunk_type() == CT_INIT {
            if packet.verification_tag != 0 {
                log::debug!("[{:?}] dropping INIT with non-zero tag", self.side);
                return Ok(());
            }
        } else if packet.verification_tag != self.my_verification_tag {
            log::debug!(
                "[{:?}] verification tag mismatch: {:#x} != {:#x}",
                self.side,
                packet.verification_tag,
                self.my_verification_tag
            );
            return Ok(());
        }

        for chunk in packet.chunks {
            self.handle_chunk(now, chunk)?;
        }
        Ok(())
    }

    fn handle_chunk(&mut self, now: Instant, chunk: Chunk) -> Result<()> {
        match chunk {
            Chunk::Init(init) if !init.is_ack => self.handle_init(init),
            Chunk::Init(init_ack) => self.handle_init_ack(now, init_ack),
            Chunk::CookieEcho(echo) => self.handle_cookie_echo(&echo.cookie),
            Chunk::CookieAck => self.handle_cookie_ack(now),
            Chunk::Data(data) => self.handle_data(data),
            Chunk::Sack(_) => {
                // the reduced profile neither emits nor honors SACKs
                log::trace!("[{:?}] ignoring inbound SACK", self.side);
                Ok(())
            }
            Chunk::Abort(abort) => {
                log::debug!(
                    "[{:?}] association aborted by peer ({} causes)",
                    self.side,
                    abort.causes.len()
                );
                self.stop_all_timers();
                self.set_state(AssociationState::Closed);
                self.events.push_back(AssociationEvent::Closed);
                Ok(())
            }
            Chunk::Error(err) => {
                for cause in &err.causes {
                    log::warn!("[{:?}] peer reported error: {}", self.side, cause);
                    if cause.code == CAUSE_STALE_COOKIE_ERROR
                        && self.state == AssociationState::CookieEchoed
                    {
                        self.stop_all_timers();
                        self.set_state(AssociationState::Closed);
                        self.events.push_back(AssociationEvent::Closed);
                    }
                }
                Ok(())
            }
            Chunk::Shutdown => self.handle_shutdown(now),
            Chunk::ShutdownAck => self.handle_shutdown_ack(),
            Chunk::ShutdownComplete => self.handle_shutdown_complete(),
            Chunk::Reconfig(reconfig) => self.handle_reconfig(reconfig),
            Chunk::Unknown { typ, .. } => {
                log::debug!("[{:?}] dropping unknown chunk type {}", self.side, typ);
                Ok(())
            }
        }
    }

    fn handle_init(&mut self, init: ChunkInit) -> Result<()> {
        if self.side != Side::Server {
            log::debug!("[{:?}] unexpected INIT, dropping", self.side);
            return Ok(());
        }

        self.peer_verification_tag = init.initiate_tag;
        self.peer_last_tsn = init.initial_tsn.wrapping_sub(1);
        self.peer_num_inbound_streams = init.num_inbound_streams;
        self.peer_num_outbound_streams = init.num_outbound_streams;

        let mut params = Self::extension_params();
        params
            .0
            .push(Param::StateCookie(generate_cookie(&self.cookie_key, unix_now())));

        let init_ack = Chunk::Init(ChunkInit {
            is_ack: true,
            initiate_tag: self.my_verification_tag,
            advertised_receiver_window_credit: DEFAULT_A_RWND,
            num_outbound_streams: self.my_max_num_outbound_streams,
            num_inbound_streams: self.my_max_num_inbound_streams,
            initial_tsn: self.my_next_tsn,
            params,
        });

        // the server remains CLOSED until a valid COOKIE_ECHO arrives
        self.send_packet(self.peer_verification_tag, vec![init_ack]);
        Ok(())
    }

    fn handle_init_ack(&mut self, now: Instant, init_ack: ChunkInit) -> Result<()> {
        if self.state != AssociationState::CookieWait {
            log::debug!("[{:?}] unexpected INIT_ACK in {}", self.side, self.state);
            return Ok(());
        }

        self.sample_handshake_rtt(now, self.t1.sent_at, self.t1.retrans);
        self.peer_verification_tag = init_ack.initiate_tag;
        self.peer_last_tsn = init_ack.initial_tsn.wrapping_sub(1);
        self.peer_num_inbound_streams = init_ack.num_inbound_streams;
        self.peer_num_outbound_streams = init_ack.num_outbound_streams;

        let cookie = match init_ack.cookie() {
            Some(cookie) => Bytes::copy_from_slice(cookie),
            None => {
                log::warn!("[{:?}] INIT_ACK without state cookie", self.side);
                return Ok(());
            }
        };

        let echo = Chunk::CookieEcho(crate::chunk::chunk_cookie::ChunkCookieEcho { cookie });
        let raw = self.send_packet(self.peer_verification_tag, vec![echo]);
        self.t1.arm(now, self.rto_duration(), raw);
        self.set_state(AssociationState::CookieEchoed);
        Ok(())
    }

    fn handle_cookie_echo(&mut self, cookie: &[u8]) -> Result<()> {
        if self.side != Side::Server {
            return Ok(());
        }

        let now_unix = unix_now();
        match validate_cookie(&self.cookie_key, cookie, now_unix) {
            Ok(()) => {
                self.send_packet(self.peer_verification_tag, vec![Chunk::CookieAck]);
                if self.state != AssociationState::Established {
                    self.set_state(AssociationState::Established);
                    self.events.push_back(AssociationEvent::Connected);
                }
                Ok(())
            }
            Err(Error::ErrSctpCookieStale) => {
                let ts = u32::from_be_bytes([cookie[0], cookie[1], cookie[2], cookie[3]]) as u64;
                let staleness_us =
                    now_unix.saturating_sub(ts + COOKIE_LIFETIME).saturating_mul(1_000_000);
                let error = Chunk::Error(ChunkError {
                    causes: vec![ErrorCause::stale_cookie(staleness_us.min(u32::MAX as u64) as u32)],
                });
                self.send_packet(self.peer_verification_tag, vec![error]);
                log::warn!("[{:?}] dropping association attempt: stale cookie", self.side);
                Ok(())
            }
            Err(err) => {
                // a forged cookie gets no reply at all
                log::warn!("[{:?}] dropping association attempt: {}", self.side, err);
                Ok(())
            }
        }
    }

    fn handle_cookie_ack(&mut self, now: Instant) -> Result<()> {
        if self.state != AssociationState::CookieEchoed {
            log::debug!("[{:?}] unexpected COOKIE_ACK in {}", self.side, self.state);
            return Ok(());
        }
        self.sample_handshake_rtt(now, self.t1.sent_at, self.t1.retrans);
        self.t1.clear();
        self.set_state(AssociationState::Established);
        self.events.push_back(AssociationEvent::Connected);
        Ok(())
    }

    fn sample_handshake_rtt(&mut self, now: Instant, sent_at: Option<Instant>, retrans: u32) {
        // Karn's algorithm: no sample from a retransmitted exchange
        if retrans > 0 {
            return;
        }
        if let Some(sent_at) = sent_at {
            let rtt = now.saturating_duration_since(sent_at).as_secs_f64();
            self.rto.update(rtt);
        }
    }

    fn handle_data(&mut self, data: ChunkData) -> Result<()> {
        if self.state != AssociationState::Established {
            log::debug!("[{:?}] DATA outside ESTABLISHED, dropping", self.side);
            return Ok(());
        }

        let tsn = data.tsn;
        if !sna32_gt(tsn, self.peer_last_tsn) {
            // at or below the cumulative point: a duplicate
            log::trace!("[{:?}] duplicate DATA tsn={}", self.side, tsn);
            return Ok(());
        }
        if tsn == self.peer_last_tsn.wrapping_add(1) {
            self.peer_last_tsn = tsn;
            // pull any previously buffered successors across the gap
            while self.ooo_tsns.remove(&self.peer_last_tsn.wrapping_add(1)) {
                self.peer_last_tsn = self.peer_last_tsn.wrapping_add(1);
            }
        } else if !self.ooo_tsns.insert(tsn) {
            log::trace!("[{:?}] duplicate out-of-order DATA tsn={}", self.side, tsn);
            return Ok(());
        }

        // unordered, unfragmented: deliver immediately, no reassembly
        self.events.push_back(AssociationEvent::Data {
            stream_id: data.stream_identifier,
            ppi: data.payload_type,
            payload: data.user_data,
        });
        Ok(())
    }

    fn handle_shutdown(&mut self, now: Instant) -> Result<()> {
        match self.state {
            AssociationState::Established | AssociationState::ShutdownSent => {
                let raw = self.send_packet(self.peer_verification_tag, vec![Chunk::ShutdownAck]);
                self.t2.arm(now, self.rto_duration(), raw);
                self.set_state(AssociationState::ShutdownAckSent);
            }
            _ => {
                log::debug!("[{:?}] unexpected SHUTDOWN in {}", self.side, self.state);
            }
        }
        Ok(())
    }

    fn handle_shutdown_ack(&mut self) -> Result<()> {
        match self.state {
            AssociationState::ShutdownSent | AssociationState::ShutdownAckSent => {
                self.send_packet(self.peer_verification_tag, vec![Chunk::ShutdownComplete]);
                self.stop_all_timers();
                self.set_state(AssociationState::Closed);
                self.events.push_back(AssociationEvent::Closed);
            }
            _ => {
                log::debug!("[{:?}] unexpected SHUTDOWN_ACK in {}", self.side, self.state);
            }
        }
        Ok(())
    }

    fn handle_shutdown_complete(&mut self) -> Result<()> {
        if self.state == AssociationState::ShutdownAckSent {
            self.stop_all_timers();
            self.set_state(AssociationState::Closed);
            self.events.push_back(AssociationEvent::Closed);
        }
        Ok(())
    }

    fn handle_reconfig(&mut self, reconfig: ChunkReconfig) -> Result<()> {
        for param in &reconfig.params.0 {
            match param {
                Param::OutgoingSsnResetRequest {
                    request_seq,
                    streams,
                    ..
                } => {
                    // the response sequence number is always the peer's last
                    // request sequence number
                    let response = Chunk::Reconfig(ChunkReconfig {
                        params: ParamSet(vec![Param::ReconfigResponse {
                            response_seq: *request_seq,
                            result: RECONFIG_RESULT_SUCCESS_PERFORMED,
                        }]),
                    });
                    self.send_packet(self.peer_verification_tag, vec![response]);
                    self.events
                        .push_back(AssociationEvent::StreamsReset(streams.clone()));
                }
                Param::AddOutgoingStreamsRequest {
                    request_seq,
                    new_streams,
                } => {
                    let response = Chunk::Reconfig(ChunkReconfig {
                        params: ParamSet(vec![Param::ReconfigResponse {
                            response_seq: *request_seq,
                            result: RECONFIG_RESULT_SUCCESS_PERFORMED,
                        }]),
                    });
                    self.send_packet(self.peer_verification_tag, vec![response]);
                    self.peer_num_outbound_streams =
                        self.peer_num_outbound_streams.saturating_add(*new_streams);
                    self.events
                        .push_back(AssociationEvent::StreamsAdded(*new_streams));
                }
                Param::ReconfigResponse { response_seq, .. } => {
                    if let Some(pending) = &self.pending_reconfig {
                        if pending.request_seq == *response_seq {
                            self.pending_reconfig = None;
                        }
                    }
                }
                _ => {
                    log::debug!("[{:?}] ignoring reconfig parameter", self.side);
                }
            }
        }
        Ok(())
    }

    pub fn poll_transmit(&mut self) -> Option<BytesMut> {
        self.transmits.pop_front()
    }

    pub fn poll_event(&mut self) -> Option<AssociationEvent> {
        self.events.pop_front()
    }

    pub fn poll_timeout(&self) -> Option<Instant> {
        let mut eto: Option<Instant> = None;
        let mut consider = |deadline: Option<Instant>| {
            if let Some(d) = deadline {
                eto = Some(eto.map_or(d, |e| e.min(d)));
            }
        };
        consider(self.t1.deadline);
        consider(self.t2.deadline);
        consider(self.pending_reconfig.as_ref().map(|p| p.deadline));
        eto
    }

    pub fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        // T1: INIT / COOKIE_ECHO retransmissions, threshold 8
        if let Some(deadline) = self.t1.deadline {
            if now >= deadline {
                self.t1.retrans += 1;
                if self.t1.retrans > MAX_INIT_RETRANS {
                    log::warn!("[{:?}] handshake retransmit budget exhausted", self.side);
                    self.fail_association();
                    return Ok(());
                }
                self.rto.backoff();
                if let Some(raw) = self.t1.raw.clone() {
                    self.transmits.push_back(raw);
                }
                self.t1.deadline = Some(now + self.rto_duration());
            }
        }

        // T2: SHUTDOWN / SHUTDOWN_ACK retransmissions, threshold 10
        if let Some(deadline) = self.t2.deadline {
            if now >= deadline {
                self.t2.retrans += 1;
                if self.t2.retrans > MAX_ASSOCIATION_RETRANS {
                    log::warn!("[{:?}] shutdown retransmit budget exhausted", self.side);
                    self.fail_association();
                    return Ok(());
                }
                self.rto.backoff();
                if let Some(raw) = self.t2.raw.clone() {
                    self.transmits.push_back(raw);
                }
                self.t2.deadline = Some(now + self.rto_duration());
            }
        }

        // T-Reconfig: rto grows by ceil(rto * 1.5), threshold 10
        let mut reconfig_exhausted = false;
        if let Some(pending) = &mut self.pending_reconfig {
            if now >= pending.deadline {
                pending.retrans += 1;
                if pending.retrans > MAX_ASSOCIATION_RETRANS {
                    reconfig_exhausted = true;
                } else {
                    pending.rto_secs = (pending.rto_secs * 1.5).ceil();
                    pending.deadline = now + Duration::from_secs_f64(pending.rto_secs);
                    let raw = pending.raw.clone();
                    self.transmits.push_back(raw);
                }
            }
        }
        if reconfig_exhausted {
            log::warn!("[{:?}] reconfig retransmit budget exhausted", self.side);
            self.fail_association();
        }

        Ok(())
    }

    fn fail_association(&mut self) {
        self.stop_all_timers();
        self.set_state(AssociationState::Closed);
        self.events.push_back(AssociationEvent::Closed);
    }
}

#[cfg(test)]
mod association_test;
