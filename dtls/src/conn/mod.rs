use crate::alert::{Alert, AlertDescription, AlertLevel};
use crate::cipher_suite::{
    CipherSuite, CipherSuiteId, TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
};
use crate::config::HandshakeConfig;
use crate::crypto::{
    fingerprint, fingerprints_match, prf, verify_signature, SIGNATURE_SCHEME_ECDSA_P256_SHA256,
    SIGNATURE_SCHEME_RSA_PKCS1_SHA256,
};
use crate::handshake::{
    CertificateMsg, CertificateRequest, CertificateVerify, ClientHello, ClientKeyExchange,
    Finished, HandshakeMessage, HandshakeType, HelloVerifyRequest, ServerHello, ServerKeyExchange,
    NAMED_CURVE_X25519,
};
use crate::record::{ContentType, Record, RecordHeader};
use crate::PROTOCOL_VERSION;

use bytes::{Bytes, BytesMut};
use rand::Rng;
use shared::error::{Error, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use x25519_dalek::{PublicKey, StaticSecret};

/// Events surfaced by the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DtlsEvent {
    /// The handshake finished and the peer certificate matched a remote
    /// fingerprint.
    HandshakeComplete,
    /// One decrypted application-data record.
    ApplicationData(BytesMut),
    /// The peer sent close_notify.
    PeerClose,
}

/// Handshake progress; the variants mirror the flights of RFC 6347.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum HandshakeFsm {
    // client
    ClientStart,
    AwaitServerHello,
    AwaitServerHelloDone,
    AwaitServerFinished,
    // server
    ServerStart,
    AwaitClientSecondFlight,
    // both
    Established,
    Closed,
}

/// A single DTLS 1.2 connection over one ICE-nominated flow.
///
/// Performs no I/O: datagrams in via `handle_read`, datagrams out via
/// `poll_transmit`, retransmission deadlines via `poll_timeout` /
/// `handle_timeout`.
pub struct DtlsConn {
    config: Arc<HandshakeConfig>,
    is_client: bool,
    fsm: HandshakeFsm,

    // record layer
    local_epoch: u16,
    remote_epoch: u16,
    sequence_epoch0: u64,
    sequence_epoch1: u64,
    cipher: Option<CipherSuite>,

    // handshake state
    local_random: [u8; 32],
    remote_random: [u8; 32],
    cookie: Vec<u8>,
    cipher_suite_id: u16,
    ecdh_secret: StaticSecret,
    remote_ecdh_public: Vec<u8>,
    master_secret: Vec<u8>,
    peer_certificate: Option<Vec<u8>>,
    peer_cert_verified: bool,
    client_cert_requested: bool,
    /// Concatenated raw handshake messages, excluding the cookie exchange.
    transcript: Vec<u8>,
    handshake_send_seq: u16,
    handshake_recv_seq: u16,

    // retransmission of the current flight
    flight: Vec<BytesMut>,
    retransmit_deadline: Option<Instant>,
    retransmit_interval: Duration,
    retransmit_count: u32,
    /// Rate limit for flight re-sends triggered by duplicate messages.
    next_dup_resend: Option<Instant>,

    transmits: VecDeque<BytesMut>,
    events: VecDeque<DtlsEvent>,
}

impl DtlsConn {
    pub fn new(config: Arc<HandshakeConfig>, is_client: bool) -> Self {
        let mut local_random = [0u8; 32];
        rand::rng().fill(&mut local_random);
        let ecdh_secret = StaticSecret::from(rand::random::<[u8; 32]>());
        let retransmit_interval = config.initial_retransmit_interval;

        Self {
            config,
            is_client,
            fsm: if is_client {
                HandshakeFsm::ClientStart
            } else {
                HandshakeFsm::ServerStart
            },

            local_epoch: 0,
            remote_epoch: 0,
            sequence_epoch0: 0,
            sequence_epoch1: 0,
            cipher: None,

            local_random,
            remote_random: [0u8; 32],
            cookie: vec![],
            cipher_suite_id: 0,
            ecdh_secret,
            remote_ecdh_public: vec![],
            master_secret: vec![],
            peer_certificate: None,
            peer_cert_verified: false,
            client_cert_requested: false,
            transcript: vec![],
            handshake_send_seq: 0,
            handshake_recv_seq: 0,

            flight: vec![],
            retransmit_deadline: None,
            retransmit_interval,
            retransmit_count: 0,
            next_dup_resend: None,

            transmits: VecDeque::new(),
            events: VecDeque::new(),
        }
    }

    pub fn is_client(&self) -> bool {
        self.is_client
    }

    pub fn is_handshake_completed(&self) -> bool {
        self.fsm == HandshakeFsm::Established
    }

    /// DER of the peer's leaf certificate once received.
    pub fn peer_certificate(&self) -> Option<&[u8]> {
        self.peer_certificate.as_deref()
    }

    pub fn poll_transmit(&mut self) -> Option<BytesMut> {
        self.transmits.pop_front()
    }

    pub fn poll_event(&mut self) -> Option<DtlsEvent> {
        self.events.pop_front()
    }

    pub fn poll_timeout(&self) -> Option<Instant> {
        self.retransmit_deadline
    }

    /// Starts the client handshake by sending flight 1.
    pub fn start_handshake(&mut self, now: Instant) -> Result<()> {
        if !self.is_client || self.fsm != HandshakeFsm::ClientStart {
            return Err(Error::ErrInvalidState);
        }
        self.send_client_hello(now)?;
        self.fsm = HandshakeFsm::AwaitServerHello;
        Ok(())
    }

    /// Encrypts and queues one application datagram.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.fsm != HandshakeFsm::Established {
            return Err(Error::ErrDtlsClosed);
        }
        let record = self.seal_record(ContentType::ApplicationData, data)?;
        self.transmits.push_back(record);
        Ok(())
    }

    /// Sends close_notify and refuses further traffic. Idempotent.
    pub fn close(&mut self) {
        if self.fsm == HandshakeFsm::Closed {
            return;
        }
        let alert = Alert {
            level: AlertLevel::Warning,
            description: AlertDescription::CloseNotify,
        };
        let payload = alert.marshal();
        if let Ok(record) = self.seal_or_plain(ContentType::Alert, &payload) {
            self.transmits.push_back(record);
        }
        self.retransmit_deadline = None;
        self.fsm = HandshakeFsm::Closed;
    }

    /// Retransmits the current flight with exponential backoff.
    pub fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        if self.fsm == HandshakeFsm::Closed {
            self.retransmit_deadline = None;
            return Ok(());
        }
        let Some(deadline) = self.retransmit_deadline else {
            return Ok(());
        };
        if now < deadline {
            return Ok(());
        }

        self.retransmit_count += 1;
        if self.retransmit_count > self.config.retransmit_budget {
            self.retransmit_deadline = None;
            self.fsm = HandshakeFsm::Closed;
            return Err(Error::ErrDtlsHandshakeFailed(
                "retransmit budget exhausted".to_owned(),
            ));
        }

        log::debug!(
            "[{}] retransmitting flight ({} records, attempt {})",
            self.role(),
            self.flight.len(),
            self.retransmit_count
        );
        for record in self.flight.clone() {
            self.transmits.push_back(record);
        }
        self.retransmit_interval =
            (self.retransmit_interval * 2).min(self.config.max_retransmit_interval);
        self.retransmit_deadline = Some(now + self.retransmit_interval);
        Ok(())
    }

    /// Processes one inbound datagram, which may carry several records.
    pub fn handle_read(&mut self, now: Instant, datagram: &[u8]) -> Result<()> {
        if self.fsm == HandshakeFsm::Closed {
            return Ok(());
        }
        for record in Record::unmarshal_datagram(datagram)? {
            self.handle_record(now, record)?;
        }
        Ok(())
    }

    fn role(&self) -> &'static str {
        if self.is_client {
            "client"
        } else {
            "server"
        }
    }

    fn handle_record(&mut self, now: Instant, record: Record) -> Result<()> {
        let payload: Bytes = if record.header.epoch > 0 {
            if record.header.epoch != self.remote_epoch {
                log::debug!("[{}] dropping record from epoch {}", self.role(), record.header.epoch);
                return Ok(());
            }
            let Some(cipher) = &self.cipher else {
                log::debug!("[{}] dropping protected record, no keys yet", self.role());
                return Ok(());
            };
            match cipher.decrypt(&record.header, &record.payload) {
                Ok(plaintext) => plaintext,
                Err(_) => {
                    // bad record MAC on a datagram path: drop, do not kill
                    log::debug!("[{}] dropping undecryptable record", self.role());
                    return Ok(());
                }
            }
        } else {
            record.payload.clone()
        };

        match record.header.content_type {
            ContentType::Handshake => {
                for msg in HandshakeMessage::unmarshal_record(&payload)? {
                    self.handle_handshake_message(now, msg)?;
                }
                Ok(())
            }
            ContentType::ChangeCipherSpec => {
                // the peer switches to epoch 1; its Finished arrives protected
                self.remote_epoch = 1;
                Ok(())
            }
            ContentType::Alert => {
                let mut buf = &payload[..];
                let alert = Alert::unmarshal(&mut buf)?;
                log::debug!("[{}] received {}", self.role(), alert);
                if alert.description == AlertDescription::CloseNotify {
                    self.events.push_back(DtlsEvent::PeerClose);
                    self.retransmit_deadline = None;
                    self.fsm = HandshakeFsm::Closed;
                    Ok(())
                } else if alert.level == AlertLevel::Fatal {
                    self.fsm = HandshakeFsm::Closed;
                    Err(Error::ErrAlertFatalOrClose)
                } else {
                    Ok(())
                }
            }
            ContentType::ApplicationData => {
                if record.header.epoch == 0 {
                    // cleartext application data is never valid
                    return Ok(());
                }
                self.events
                    .push_back(DtlsEvent::ApplicationData(BytesMut::from(&payload[..])));
                Ok(())
            }
        }
    }

    fn handle_handshake_message(&mut self, now: Instant, msg: HandshakeMessage) -> Result<()> {
        let seq = msg.header.message_seq;
        if seq < self.handshake_recv_seq {
            // a retransmitted flight means our answering flight was lost;
            // re-send it, rate limited so a duplicated flight of several
            // messages does not multiply into a packet storm
            if self.next_dup_resend.map_or(true, |t| now >= t) {
                log::debug!(
                    "[{}] duplicate handshake message seq {} (< {}), re-sending flight",
                    self.role(),
                    seq,
                    self.handshake_recv_seq
                );
                for record in self.flight.clone() {
                    self.transmits.push_back(record);
                }
                self.next_dup_resend = Some(now + Duration::from_millis(500));
            }
            return Ok(());
        }
        self.handshake_recv_seq = seq + 1;

        match msg.header.msg_type {
            HandshakeType::ClientHello => self.handle_client_hello(now, &msg),
            HandshakeType::HelloVerifyRequest => self.handle_hello_verify_request(now, &msg),
            HandshakeType::ServerHello => self.handle_server_hello(&msg),
            HandshakeType::Certificate => self.handle_certificate(&msg),
            HandshakeType::ServerKeyExchange => self.handle_server_key_exchange(&msg),
            HandshakeType::CertificateRequest => self.handle_certificate_request(&msg),
            HandshakeType::ServerHelloDone => self.handle_server_hello_done(now, &msg),
            HandshakeType::ClientKeyExchange => self.handle_client_key_exchange(&msg),
            HandshakeType::CertificateVerify => self.handle_certificate_verify(&msg),
            HandshakeType::Finished => self.handle_finished(now, &msg),
            HandshakeType::HelloRequest => Ok(()),
        }
    }

    //
    // outbound plumbing
    //

    fn next_sequence(&mut self, epoch: u16) -> u64 {
        if epoch == 0 {
            let seq = self.sequence_epoch0;
            self.sequence_epoch0 += 1;
            seq
        } else {
            let seq = self.sequence_epoch1;
            self.sequence_epoch1 += 1;
            seq
        }
    }

    fn plain_record(&mut self, content_type: ContentType, payload: &[u8]) -> BytesMut {
        let header = RecordHeader {
            content_type,
            version: PROTOCOL_VERSION,
            epoch: 0,
            sequence_number: self.next_sequence(0),
            length: 0,
        };
        Record {
            header,
            payload: Bytes::copy_from_slice(payload),
        }
        .marshal()
    }

    fn seal_record(&mut self, content_type: ContentType, payload: &[u8]) -> Result<BytesMut> {
        let header = RecordHeader {
            content_type,
            version: PROTOCOL_VERSION,
            epoch: 1,
            sequence_number: self.next_sequence(1),
            length: 0,
        };
        let cipher = self.cipher.as_ref().ok_or(Error::ErrCipherSuiteUnset)?;
        let sealed = cipher.encrypt(&header, payload)?;
        Ok(Record {
            header,
            payload: sealed,
        }
        .marshal())
    }

    fn seal_or_plain(&mut self, content_type: ContentType, payload: &[u8]) -> Result<BytesMut> {
        if self.local_epoch > 0 && self.cipher.is_some() {
            self.seal_record(content_type, payload)
        } else {
            Ok(self.plain_record(content_type, payload))
        }
    }

    fn handshake_record(
        &mut self,
        msg_type: HandshakeType,
        body: Bytes,
        encrypt: bool,
        hash: bool,
    ) -> Result<BytesMut> {
        let msg = HandshakeMessage::new(msg_type, self.handshake_send_seq, body);
        self.handshake_send_seq += 1;
        if hash {
            self.transcript.extend_from_slice(&msg.raw);
        }
        if encrypt {
            self.seal_record(ContentType::Handshake, &msg.raw)
        } else {
            Ok(self.plain_record(ContentType::Handshake, &msg.raw))
        }
    }

    /// Queues a flight and arms its retransmission timer.
    fn send_flight(&mut self, now: Instant, records: Vec<BytesMut>, last_flight: bool) {
        for record in &records {
            self.transmits.push_back(record.clone());
        }
        self.flight = records;
        self.retransmit_count = 0;
        self.retransmit_interval = self.config.initial_retransmit_interval;
        // the final flight is only re-sent in response to a duplicate from
        // the peer, not on a timer
        self.retransmit_deadline = if last_flight {
            None
        } else {
            Some(now + self.retransmit_interval)
        };
    }

    fn send_alert(&mut self, description: AlertDescription) {
        let alert = Alert {
            level: AlertLevel::Fatal,
            description,
        };
        let payload = alert.marshal();
        if let Ok(record) = self.seal_or_plain(ContentType::Alert, &payload) {
            self.transmits.push_back(record);
        }
    }

    //
    // client side
    //

    fn send_client_hello(&mut self, now: Instant) -> Result<()> {
        let hello = ClientHello {
            version: PROTOCOL_VERSION,
            random: self.local_random,
            cookie: self.cookie.clone(),
            cipher_suites: vec![
                TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
                TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
            ],
            signature_schemes: vec![
                SIGNATURE_SCHEME_ECDSA_P256_SHA256,
                SIGNATURE_SCHEME_RSA_PKCS1_SHA256,
            ],
        };
        // the pre-cookie ClientHello and HelloVerifyRequest are excluded
        // from the transcript (RFC 6347 Section 4.2.1)
        let hash = !self.cookie.is_empty();
        let record = self.handshake_record(
            HandshakeType::ClientHello,
            hello.marshal(),
            false,
            hash,
        )?;
        self.send_flight(now, vec![record], false);
        Ok(())
    }

    fn handle_hello_verify_request(&mut self, now: Instant, msg: &HandshakeMessage) -> Result<()> {
        if self.is_client && self.fsm == HandshakeFsm::AwaitServerHello {
            let hvr = HelloVerifyRequest::unmarshal(&msg.body)?;
            self.cookie = hvr.cookie;
            self.send_client_hello(now)?;
        }
        Ok(())
    }

    fn handle_server_hello(&mut self, msg: &HandshakeMessage) -> Result<()> {
        if !self.is_client || self.fsm != HandshakeFsm::AwaitServerHello {
            return Ok(());
        }
        let hello = ServerHello::unmarshal(&msg.body)?;
        if !CipherSuiteId::is_supported(hello.cipher_suite) {
            self.send_alert(AlertDescription::HandshakeFailure);
            return Err(Error::ErrInvalidCipherSuite(hello.cipher_suite));
        }
        self.remote_random = hello.random;
        self.cipher_suite_id = hello.cipher_suite;
        self.transcript.extend_from_slice(&msg.raw);
        self.fsm = HandshakeFsm::AwaitServerHelloDone;
        Ok(())
    }

    fn handle_certificate(&mut self, msg: &HandshakeMessage) -> Result<()> {
        let certs = CertificateMsg::unmarshal(&msg.body)?;
        let leaf = certs
            .certificates
            .first()
            .ok_or(Error::ErrPeerCertificateMissing)?;
        self.verify_remote_fingerprint(leaf)?;
        self.peer_certificate = Some(leaf.clone());
        self.transcript.extend_from_slice(&msg.raw);
        Ok(())
    }

    /// RFC 8122: at least one digest from the remote description must match
    /// the presented certificate, byte for byte, case-insensitively.
    fn verify_remote_fingerprint(&mut self, leaf: &[u8]) -> Result<()> {
        if self.config.remote_fingerprints.is_empty() {
            self.send_alert(AlertDescription::BadCertificate);
            self.fsm = HandshakeFsm::Closed;
            return Err(Error::ErrDtlsFingerprintMismatch);
        }
        for remote in &self.config.remote_fingerprints {
            if let Ok(local) = fingerprint(leaf, &remote.algorithm) {
                if fingerprints_match(&local, &remote.value) {
                    self.peer_cert_verified = true;
                    return Ok(());
                }
            }
        }
        self.send_alert(AlertDescription::BadCertificate);
        self.fsm = HandshakeFsm::Closed;
        Err(Error::ErrDtlsFingerprintMismatch)
    }

    fn handle_server_key_exchange(&mut self, msg: &HandshakeMessage) -> Result<()> {
        if !self.is_client || self.fsm != HandshakeFsm::AwaitServerHelloDone {
            return Ok(());
        }
        let ske = ServerKeyExchange::unmarshal(&msg.body)?;
        if ske.named_curve != NAMED_CURVE_X25519 || ske.public_key.len() != 32 {
            self.send_alert(AlertDescription::IllegalParameter);
            return Err(Error::ErrDtlsHandshakeFailed("unsupported curve".to_owned()));
        }

        // signature covers client_random || server_random || ECDH params
        let mut signed = Vec::with_capacity(64 + ske.public_key.len() + 4);
        signed.extend_from_slice(&self.local_random);
        signed.extend_from_slice(&self.remote_random);
        signed.extend_from_slice(&ske.params_bytes());
        let peer_cert = self
            .peer_certificate
            .as_ref()
            .ok_or(Error::ErrPeerCertificateMissing)?;
        verify_signature(peer_cert, ske.signature_scheme, &signed, &ske.signature)?;

        self.remote_ecdh_public = ske.public_key;
        self.transcript.extend_from_slice(&msg.raw);
        Ok(())
    }

    fn handle_certificate_request(&mut self, msg: &HandshakeMessage) -> Result<()> {
        if self.is_client && self.fsm == HandshakeFsm::AwaitServerHelloDone {
            let _ = CertificateRequest::unmarshal(&msg.body)?;
            self.client_cert_requested = true;
            self.transcript.extend_from_slice(&msg.raw);
        }
        Ok(())
    }

    fn handle_server_hello_done(&mut self, now: Instant, msg: &HandshakeMessage) -> Result<()> {
        if !self.is_client || self.fsm != HandshakeFsm::AwaitServerHelloDone {
            return Ok(());
        }
        self.transcript.extend_from_slice(&msg.raw);

        // derive the session keys from the ECDHE shared secret
        let mut peer_public = [0u8; 32];
        peer_public.copy_from_slice(&self.remote_ecdh_public);
        let shared = self.ecdh_secret.diffie_hellman(&PublicKey::from(peer_public));
        self.master_secret = prf::prf_master_secret(
            shared.as_bytes(),
            &self.local_random,
            &self.remote_random,
        );
        self.cipher = Some(CipherSuite::new(
            &self.master_secret,
            &self.local_random,
            &self.remote_random,
            true,
        )?);

        let mut records = vec![];

        // Certificate (requested in the WebRTC profile)
        if self.client_cert_requested {
            let cert_msg = CertificateMsg {
                certificates: self.config.certificate.certificate.clone(),
            };
            records.push(self.handshake_record(
                HandshakeType::Certificate,
                cert_msg.marshal(),
                false,
                true,
            )?);
        }

        // ClientKeyExchange
        let cke = ClientKeyExchange {
            public_key: PublicKey::from(&self.ecdh_secret).as_bytes().to_vec(),
        };
        records.push(self.handshake_record(
            HandshakeType::ClientKeyExchange,
            cke.marshal(),
            false,
            true,
        )?);

        // CertificateVerify over the transcript so far
        if self.client_cert_requested {
            let signature = self.config.certificate.private_key.sign(&self.transcript)?;
            let verify = CertificateVerify {
                signature_scheme: self.config.certificate.private_key.signature_scheme(),
                signature,
            };
            records.push(self.handshake_record(
                HandshakeType::CertificateVerify,
                verify.marshal(),
                false,
                true,
            )?);
        }

        // ChangeCipherSpec, then Finished under the new epoch
        records.push(self.plain_record(ContentType::ChangeCipherSpec, &[1]));
        self.local_epoch = 1;

        let verify_data = prf::prf_verify_data(&self.master_secret, &self.transcript, true);
        let finished = Finished { verify_data };
        records.push(self.handshake_record(
            HandshakeType::Finished,
            finished.marshal(),
            true,
            true,
        )?);

        self.send_flight(now, records, false);
        self.fsm = HandshakeFsm::AwaitServerFinished;
        Ok(())
    }

    //
    // server side
    //

    fn handle_client_hello(&mut self, now: Instant, msg: &HandshakeMessage) -> Result<()> {
        if self.is_client {
            return Ok(());
        }
        let hello = ClientHello::unmarshal(&msg.body)?;

        if self.fsm == HandshakeFsm::ServerStart && hello.cookie.is_empty() {
            // stateless cookie exchange (RFC 6347 Section 4.2.1)
            self.cookie = rand::random::<[u8; 20]>().to_vec();
            let hvr = HelloVerifyRequest {
                version: PROTOCOL_VERSION,
                cookie: self.cookie.clone(),
            };
            let record =
                self.handshake_record(HandshakeType::HelloVerifyRequest, hvr.marshal(), false, false)?;
            self.send_flight(now, vec![record], false);
            return Ok(());
        }

        if hello.cookie != self.cookie {
            self.send_alert(AlertDescription::HandshakeFailure);
            return Err(Error::ErrCookieMismatch);
        }

        let suite = hello
            .cipher_suites
            .iter()
            .copied()
            .find(|s| CipherSuiteId::is_supported(*s))
            .ok_or(Error::ErrCipherSuiteUnset)?;
        self.cipher_suite_id = suite;
        self.remote_random = hello.random;
        self.transcript.extend_from_slice(&msg.raw);

        // flight 4
        let mut records = vec![];

        let server_hello = ServerHello {
            version: PROTOCOL_VERSION,
            random: self.local_random,
            cipher_suite: suite,
        };
        records.push(self.handshake_record(
            HandshakeType::ServerHello,
            server_hello.marshal(),
            false,
            true,
        )?);

        let cert_msg = CertificateMsg {
            certificates: self.config.certificate.certificate.clone(),
        };
        records.push(self.handshake_record(
            HandshakeType::Certificate,
            cert_msg.marshal(),
            false,
            true,
        )?);

        // signed ephemeral ECDH parameters
        let public_key = PublicKey::from(&self.ecdh_secret).as_bytes().to_vec();
        let mut ske = ServerKeyExchange {
            named_curve: NAMED_CURVE_X25519,
            public_key,
            signature_scheme: self.config.certificate.private_key.signature_scheme(),
            signature: vec![],
        };
        let mut signed = Vec::new();
        signed.extend_from_slice(&self.remote_random);
        signed.extend_from_slice(&self.local_random);
        signed.extend_from_slice(&ske.params_bytes());
        ske.signature = self.config.certificate.private_key.sign(&signed)?;
        records.push(self.handshake_record(
            HandshakeType::ServerKeyExchange,
            ske.marshal(),
            false,
            true,
        )?);

        // mutual authentication: the client must present its certificate
        let cert_request = CertificateRequest {
            signature_schemes: vec![
                SIGNATURE_SCHEME_ECDSA_P256_SHA256,
                SIGNATURE_SCHEME_RSA_PKCS1_SHA256,
            ],
        };
        records.push(self.handshake_record(
            HandshakeType::CertificateRequest,
            cert_request.marshal(),
            false,
            true,
        )?);

        records.push(self.handshake_record(
            HandshakeType::ServerHelloDone,
            Bytes::new(),
            false,
            true,
        )?);

        self.send_flight(now, records, false);
        self.fsm = HandshakeFsm::AwaitClientSecondFlight;
        Ok(())
    }

    fn handle_client_key_exchange(&mut self, msg: &HandshakeMessage) -> Result<()> {
        if self.is_client || self.fsm != HandshakeFsm::AwaitClientSecondFlight {
            return Ok(());
        }
        let cke = ClientKeyExchange::unmarshal(&msg.body)?;
        if cke.public_key.len() != 32 {
            self.send_alert(AlertDescription::IllegalParameter);
            return Err(Error::ErrDtlsHandshakeFailed("bad ECDH key".to_owned()));
        }
        self.transcript.extend_from_slice(&msg.raw);

        let mut peer_public = [0u8; 32];
        peer_public.copy_from_slice(&cke.public_key);
        let shared = self.ecdh_secret.diffie_hellman(&PublicKey::from(peer_public));
        self.master_secret = prf::prf_master_secret(
            shared.as_bytes(),
            &self.remote_random,
            &self.local_random,
        );
        self.cipher = Some(CipherSuite::new(
            &self.master_secret,
            &self.remote_random,
            &self.local_random,
            false,
        )?);
        Ok(())
    }

    fn handle_certificate_verify(&mut self, msg: &HandshakeMessage) -> Result<()> {
        if self.is_client || self.fsm != HandshakeFsm::AwaitClientSecondFlight {
            return Ok(());
        }
        let verify = CertificateVerify::unmarshal(&msg.body)?;
        let peer_cert = self
            .peer_certificate
            .as_ref()
            .ok_or(Error::ErrPeerCertificateMissing)?;
        // the signature covers every handshake message before this one
        verify_signature(
            peer_cert,
            verify.signature_scheme,
            &self.transcript,
            &verify.signature,
        )?;
        self.transcript.extend_from_slice(&msg.raw);
        Ok(())
    }

    //
    // shared
    //

    fn handle_finished(&mut self, now: Instant, msg: &HandshakeMessage) -> Result<()> {
        let finished = Finished::unmarshal(&msg.body)?;
        let expected =
            prf::prf_verify_data(&self.master_secret, &self.transcript, !self.is_client);
        if finished.verify_data != expected {
            self.send_alert(AlertDescription::DecryptError);
            self.fsm = HandshakeFsm::Closed;
            return Err(Error::ErrDtlsHandshakeFailed(
                "finished verify_data mismatch".to_owned(),
            ));
        }
        self.transcript.extend_from_slice(&msg.raw);

        if self.is_client {
            if self.fsm != HandshakeFsm::AwaitServerFinished {
                return Ok(());
            }
            self.complete_handshake()
        } else {
            if self.fsm != HandshakeFsm::AwaitClientSecondFlight {
                return Ok(());
            }
            if self.peer_certificate.is_none() {
                self.send_alert(AlertDescription::CertificateUnknown);
                return Err(Error::ErrPeerCertificateMissing);
            }

            // flight 6: ChangeCipherSpec + Finished
            let mut records = vec![self.plain_record(ContentType::ChangeCipherSpec, &[1])];
            self.local_epoch = 1;
            let verify_data =
                prf::prf_verify_data(&self.master_secret, &self.transcript, false);
            records.push(self.handshake_record(
                HandshakeType::Finished,
                Finished { verify_data }.marshal(),
                true,
                true,
            )?);
            self.send_flight(now, records, true);
            self.complete_handshake()
        }
    }

    fn complete_handshake(&mut self) -> Result<()> {
        if !self.peer_cert_verified {
            self.fsm = HandshakeFsm::Closed;
            return Err(Error::ErrDtlsFingerprintMismatch);
        }
        self.retransmit_deadline = None;
        self.fsm = HandshakeFsm::Established;
        log::debug!(
            "[{}] handshake complete ({})",
            self.role(),
            CipherSuiteId(self.cipher_suite_id)
        );
        self.events.push_back(DtlsEvent::HandshakeComplete);
        Ok(())
    }
}

#[cfg(test)]
mod conn_test;
