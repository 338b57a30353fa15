use bytes::{Buf, BufMut, Bytes, BytesMut};
use shared::error::{Error, Result};

pub const HANDSHAKE_HEADER_SIZE: usize = 12;

/// x25519 named group (RFC 8422).
pub const NAMED_CURVE_X25519: u16 = 0x001d;
const EC_CURVE_TYPE_NAMED: u8 = 3;

const EXTENSION_SUPPORTED_GROUPS: u16 = 10;
const EXTENSION_SIGNATURE_ALGORITHMS: u16 = 13;

const CLIENT_CERTIFICATE_TYPE_ECDSA_SIGN: u8 = 64;
const CLIENT_CERTIFICATE_TYPE_RSA_SIGN: u8 = 1;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeType {
    HelloRequest = 0,
    ClientHello = 1,
    ServerHello = 2,
    HelloVerifyRequest = 3,
    Certificate = 11,
    ServerKeyExchange = 12,
    CertificateRequest = 13,
    ServerHelloDone = 14,
    CertificateVerify = 15,
    ClientKeyExchange = 16,
    Finished = 20,
}

impl TryFrom<u8> for HandshakeType {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self> {
        Ok(match v {
            0 => Self::HelloRequest,
            1 => Self::ClientHello,
            2 => Self::ServerHello,
            3 => Self::HelloVerifyRequest,
            11 => Self::Certificate,
            12 => Self::ServerKeyExchange,
            13 => Self::CertificateRequest,
            14 => Self::ServerHelloDone,
            15 => Self::CertificateVerify,
            16 => Self::ClientKeyExchange,
            20 => Self::Finished,
            _ => return Err(Error::ErrDtlsHandshakeFailed(format!("handshake type {v}"))),
        })
    }
}

fn put_u24(buf: &mut BytesMut, v: u32) {
    buf.put_slice(&v.to_be_bytes()[1..]);
}

fn get_u24<B: Buf>(buf: &mut B) -> Result<u32> {
    if buf.remaining() < 3 {
        return Err(Error::ErrUnexpectedEof);
    }
    let mut b = [0u8; 4];
    buf.copy_to_slice(&mut b[1..]);
    Ok(u32::from_be_bytes(b))
}

/// DTLS handshake message header (RFC 6347 Section 4.2.2). Messages are
/// never fragmented by this implementation, so fragment offset is always
/// zero and fragment length equals the body length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeHeader {
    pub msg_type: HandshakeType,
    pub length: u32,
    pub message_seq: u16,
    pub fragment_offset: u32,
    pub fragment_length: u32,
}

impl HandshakeHeader {
    pub fn marshal(&self, buf: &mut BytesMut) {
        buf.put_u8(self.msg_type as u8);
        put_u24(buf, self.length);
        buf.put_u16(self.message_seq);
        put_u24(buf, self.fragment_offset);
        put_u24(buf, self.fragment_length);
    }

    pub fn unmarshal<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < HANDSHAKE_HEADER_SIZE {
            return Err(Error::ErrUnexpectedEof);
        }
        let msg_type = HandshakeType::try_from(buf.get_u8())?;
        let length = get_u24(buf)?;
        let message_seq = buf.get_u16();
        let fragment_offset = get_u24(buf)?;
        let fragment_length = get_u24(buf)?;
        Ok(Self {
            msg_type,
            length,
            message_seq,
            fragment_offset,
            fragment_length,
        })
    }
}

/// One complete handshake message: header plus serialized body. `raw` is the
/// full wire form, which also feeds the transcript hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeMessage {
    pub header: HandshakeHeader,
    pub body: Bytes,
    pub raw: Bytes,
}

impl HandshakeMessage {
    pub fn new(msg_type: HandshakeType, message_seq: u16, body: Bytes) -> Self {
        let header = HandshakeHeader {
            msg_type,
            length: body.len() as u32,
            message_seq,
            fragment_offset: 0,
            fragment_length: body.len() as u32,
        };
        let mut raw = BytesMut::with_capacity(HANDSHAKE_HEADER_SIZE + body.len());
        header.marshal(&mut raw);
        raw.put_slice(&body);
        Self {
            header,
            body,
            raw: raw.freeze(),
        }
    }

    /// Parses every complete handshake message in a record payload.
    pub fn unmarshal_record(payload: &[u8]) -> Result<Vec<Self>> {
        let mut buf = payload;
        let mut out = vec![];
        while buf.has_remaining() {
            let start = buf.remaining();
            let header = HandshakeHeader::unmarshal(&mut buf)?;
            if header.fragment_offset != 0 || header.fragment_length != header.length {
                // this implementation never fragments; a fragmenting peer is
                // outside the profile
                return Err(Error::ErrDtlsHandshakeFailed(
                    "fragmented handshake message".to_owned(),
                ));
            }
            let body_len = header.length as usize;
            if buf.remaining() < body_len {
                return Err(Error::ErrUnexpectedEof);
            }
            let body = Bytes::copy_from_slice(&buf[..body_len]);
            buf.advance(body_len);

            let consumed = start - buf.remaining();
            let raw_start = payload.len() - start;
            let raw = Bytes::copy_from_slice(&payload[raw_start..raw_start + consumed]);
            out.push(Self { header, body, raw });
        }
        Ok(out)
    }
}

fn put_random(buf: &mut BytesMut, random: &[u8; 32]) {
    buf.put_slice(random);
}

fn get_random<B: Buf>(buf: &mut B) -> Result<[u8; 32]> {
    if buf.remaining() < 32 {
        return Err(Error::ErrUnexpectedEof);
    }
    let mut random = [0u8; 32];
    buf.copy_to_slice(&mut random);
    Ok(random)
}

fn get_vec_u8<B: Buf>(buf: &mut B) -> Result<Vec<u8>> {
    if buf.remaining() < 1 {
        return Err(Error::ErrUnexpectedEof);
    }
    let len = buf.get_u8() as usize;
    if buf.remaining() < len {
        return Err(Error::ErrUnexpectedEof);
    }
    let mut v = vec![0u8; len];
    buf.copy_to_slice(&mut v);
    Ok(v)
}

fn get_vec_u16<B: Buf>(buf: &mut B) -> Result<Vec<u8>> {
    if buf.remaining() < 2 {
        return Err(Error::ErrUnexpectedEof);
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(Error::ErrUnexpectedEof);
    }
    let mut v = vec![0u8; len];
    buf.copy_to_slice(&mut v);
    Ok(v)
}

/// ClientHello body (RFC 5246 Section 7.4.1.2, with the DTLS cookie field).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub version: u16,
    pub random: [u8; 32],
    pub cookie: Vec<u8>,
    pub cipher_suites: Vec<u16>,
    pub signature_schemes: Vec<u16>,
}

impl ClientHello {
    pub fn marshal(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u16(self.version);
        put_random(&mut buf, &self.random);
        buf.put_u8(0); // empty session id
        buf.put_u8(self.cookie.len() as u8);
        buf.put_slice(&self.cookie);
        buf.put_u16((self.cipher_suites.len() * 2) as u16);
        for suite in &self.cipher_suites {
            buf.put_u16(*suite);
        }
        buf.put_u8(1); // compression methods
        buf.put_u8(0); // null compression

        // extensions: supported groups + signature algorithms
        let mut ext = BytesMut::new();
        ext.put_u16(EXTENSION_SUPPORTED_GROUPS);
        ext.put_u16(4);
        ext.put_u16(2);
        ext.put_u16(NAMED_CURVE_X25519);

        ext.put_u16(EXTENSION_SIGNATURE_ALGORITHMS);
        ext.put_u16((2 + self.signature_schemes.len() * 2) as u16);
        ext.put_u16((self.signature_schemes.len() * 2) as u16);
        for scheme in &self.signature_schemes {
            ext.put_u16(*scheme);
        }

        buf.put_u16(ext.len() as u16);
        buf.put_slice(&ext);
        buf.freeze()
    }

    pub fn unmarshal(body: &[u8]) -> Result<Self> {
        let mut buf = body;
        if buf.remaining() < 2 {
            return Err(Error::ErrUnexpectedEof);
        }
        let version = buf.get_u16();
        let random = get_random(&mut buf)?;
        let _session_id = get_vec_u8(&mut buf)?;
        let cookie = get_vec_u8(&mut buf)?;

        let suites_raw = get_vec_u16(&mut buf)?;
        if suites_raw.len() % 2 != 0 {
            return Err(Error::ErrUnexpectedEof);
        }
        let cipher_suites = suites_raw
            .chunks(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        let _compression = get_vec_u8(&mut buf)?;

        // extensions are optional; only signature_algorithms is read back
        let mut signature_schemes = vec![];
        if buf.remaining() >= 2 {
            let ext_raw = get_vec_u16(&mut buf)?;
            let mut ext = &ext_raw[..];
            while ext.remaining() >= 4 {
                let typ = ext.get_u16();
                let data = get_vec_u16(&mut ext)?;
                if typ == EXTENSION_SIGNATURE_ALGORITHMS && data.len() >= 2 {
                    let list = &data[2..];
                    for c in list.chunks(2) {
                        if c.len() == 2 {
                            signature_schemes.push(u16::from_be_bytes([c[0], c[1]]));
                        }
                    }
                }
            }
        }

        Ok(Self {
            version,
            random,
            cookie,
            cipher_suites,
            signature_schemes,
        })
    }
}

/// ServerHello body; extensions are not needed back from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    pub version: u16,
    pub random: [u8; 32],
    pub cipher_suite: u16,
}

impl ServerHello {
    pub fn marshal(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u16(self.version);
        put_random(&mut buf, &self.random);
        buf.put_u8(0); // empty session id
        buf.put_u16(self.cipher_suite);
        buf.put_u8(0); // null compression
        buf.put_u16(0); // no extensions
        buf.freeze()
    }

    pub fn unmarshal(body: &[u8]) -> Result<Self> {
        let mut buf = body;
        if buf.remaining() < 2 {
            return Err(Error::ErrUnexpectedEof);
        }
        let version = buf.get_u16();
        let random = get_random(&mut buf)?;
        let _session_id = get_vec_u8(&mut buf)?;
        if buf.remaining() < 3 {
            return Err(Error::ErrUnexpectedEof);
        }
        let cipher_suite = buf.get_u16();
        let _compression = buf.get_u8();
        Ok(Self {
            version,
            random,
            cipher_suite,
        })
    }
}

/// HelloVerifyRequest body (RFC 6347 Section 4.2.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloVerifyRequest {
    pub version: u16,
    pub cookie: Vec<u8>,
}

impl HelloVerifyRequest {
    pub fn marshal(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u16(self.version);
        buf.put_u8(self.cookie.len() as u8);
        buf.put_slice(&self.cookie);
        buf.freeze()
    }

    pub fn unmarshal(body: &[u8]) -> Result<Self> {
        let mut buf = body;
        if buf.remaining() < 2 {
            return Err(Error::ErrUnexpectedEof);
        }
        let version = buf.get_u16();
        let cookie = get_vec_u8(&mut buf)?;
        Ok(Self { version, cookie })
    }
}

/// Certificate body: a list of DER certificates, leaf first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateMsg {
    pub certificates: Vec<Vec<u8>>,
}

impl CertificateMsg {
    pub fn marshal(&self) -> Bytes {
        let mut list = BytesMut::new();
        for cert in &self.certificates {
            put_u24(&mut list, cert.len() as u32);
            list.put_slice(cert);
        }
        let mut buf = BytesMut::new();
        put_u24(&mut buf, list.len() as u32);
        buf.put_slice(&list);
        buf.freeze()
    }

    pub fn unmarshal(body: &[u8]) -> Result<Self> {
        let mut buf = body;
        let total = get_u24(&mut buf)? as usize;
        if buf.remaining() < total {
            return Err(Error::ErrUnexpectedEof);
        }
        let mut list = &buf[..total];
        let mut certificates = vec![];
        while list.has_remaining() {
            let len = get_u24(&mut list)? as usize;
            if list.remaining() < len {
                return Err(Error::ErrUnexpectedEof);
            }
            certificates.push(list[..len].to_vec());
            list.advance(len);
        }
        Ok(Self { certificates })
    }
}

/// ServerKeyExchange body for an ECDHE exchange over a named curve
/// (RFC 8422 Section 5.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerKeyExchange {
    pub named_curve: u16,
    pub public_key: Vec<u8>,
    pub signature_scheme: u16,
    pub signature: Vec<u8>,
}

impl ServerKeyExchange {
    /// The part covered by the signature, prefixed by both hello randoms.
    pub fn params_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u8(EC_CURVE_TYPE_NAMED);
        buf.put_u16(self.named_curve);
        buf.put_u8(self.public_key.len() as u8);
        buf.put_slice(&self.public_key);
        buf.freeze()
    }

    pub fn marshal(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_slice(&self.params_bytes());
        buf.put_u16(self.signature_scheme);
        buf.put_u16(self.signature.len() as u16);
        buf.put_slice(&self.signature);
        buf.freeze()
    }

    pub fn unmarshal(body: &[u8]) -> Result<Self> {
        let mut buf = body;
        if buf.remaining() < 3 {
            return Err(Error::ErrUnexpectedEof);
        }
        let curve_type = buf.get_u8();
        if curve_type != EC_CURVE_TYPE_NAMED {
            return Err(Error::ErrDtlsHandshakeFailed(format!(
                "unsupported curve type {curve_type}"
            )));
        }
        let named_curve = buf.get_u16();
        let public_key = get_vec_u8(&mut buf)?;
        if buf.remaining() < 2 {
            return Err(Error::ErrUnexpectedEof);
        }
        let signature_scheme = buf.get_u16();
        let signature = get_vec_u16(&mut buf)?;
        Ok(Self {
            named_curve,
            public_key,
            signature_scheme,
            signature,
        })
    }
}

/// CertificateRequest body (RFC 5246 Section 7.4.4); certificate authorities
/// are never constrained in the WebRTC profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    pub signature_schemes: Vec<u16>,
}

impl CertificateRequest {
    pub fn marshal(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u8(2); // certificate types
        buf.put_u8(CLIENT_CERTIFICATE_TYPE_ECDSA_SIGN);
        buf.put_u8(CLIENT_CERTIFICATE_TYPE_RSA_SIGN);
        buf.put_u16((self.signature_schemes.len() * 2) as u16);
        for scheme in &self.signature_schemes {
            buf.put_u16(*scheme);
        }
        buf.put_u16(0); // no distinguished names
        buf.freeze()
    }

    pub fn unmarshal(body: &[u8]) -> Result<Self> {
        let mut buf = body;
        let _cert_types = get_vec_u8(&mut buf)?;
        let schemes_raw = get_vec_u16(&mut buf)?;
        if schemes_raw.len() % 2 != 0 {
            return Err(Error::ErrUnexpectedEof);
        }
        let signature_schemes = schemes_raw
            .chunks(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        Ok(Self { signature_schemes })
    }
}

/// ClientKeyExchange body: the client's ephemeral public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKeyExchange {
    pub public_key: Vec<u8>,
}

impl ClientKeyExchange {
    pub fn marshal(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u8(self.public_key.len() as u8);
        buf.put_slice(&self.public_key);
        buf.freeze()
    }

    pub fn unmarshal(body: &[u8]) -> Result<Self> {
        let mut buf = body;
        let public_key = get_vec_u8(&mut buf)?;
        Ok(Self { public_key })
    }
}

/// CertificateVerify body: a signature over the handshake transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateVerify {
    pub signature_scheme: u16,
    pub signature: Vec<u8>,
}

impl CertificateVerify {
    pub fn marshal(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u16(self.signature_scheme);
        buf.put_u16(self.signature.len() as u16);
        buf.put_slice(&self.signature);
        buf.freeze()
    }

    pub fn unmarshal(body: &[u8]) -> Result<Self> {
        let mut buf = body;
        if buf.remaining() < 2 {
            return Err(Error::ErrUnexpectedEof);
        }
        let signature_scheme = buf.get_u16();
        let signature = get_vec_u16(&mut buf)?;
        Ok(Self {
            signature_scheme,
            signature,
        })
    }
}

/// Finished body: 12 bytes of verify data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finished {
    pub verify_data: Vec<u8>,
}

impl Finished {
    pub fn marshal(&self) -> Bytes {
        Bytes::copy_from_slice(&self.verify_data)
    }

    pub fn unmarshal(body: &[u8]) -> Result<Self> {
        Ok(Self {
            verify_data: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cipher_suite::{
        TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256, TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    };
    use crate::crypto::SIGNATURE_SCHEME_ECDSA_P256_SHA256;

    #[test]
    fn test_client_hello_round_trip() -> Result<()> {
        let hello = ClientHello {
            version: crate::PROTOCOL_VERSION,
            random: [7u8; 32],
            cookie: vec![1, 2, 3],
            cipher_suites: vec![
                TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
                TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
            ],
            signature_schemes: vec![SIGNATURE_SCHEME_ECDSA_P256_SHA256],
        };

        let body = hello.marshal();
        let parsed = ClientHello::unmarshal(&body)?;
        assert_eq!(parsed, hello);
        Ok(())
    }

    #[test]
    fn test_server_hello_round_trip() -> Result<()> {
        let hello = ServerHello {
            version: crate::PROTOCOL_VERSION,
            random: [3u8; 32],
            cipher_suite: TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
        };
        let parsed = ServerHello::unmarshal(&hello.marshal())?;
        assert_eq!(parsed, hello);
        Ok(())
    }

    #[test]
    fn test_handshake_message_framing() -> Result<()> {
        let hvr = HelloVerifyRequest {
            version: crate::PROTOCOL_VERSION,
            cookie: vec![9; 20],
        };
        let msg = HandshakeMessage::new(HandshakeType::HelloVerifyRequest, 1, hvr.marshal());
        assert_eq!(msg.header.length, msg.body.len() as u32);
        assert_eq!(msg.header.fragment_length, msg.header.length);

        let parsed = HandshakeMessage::unmarshal_record(&msg.raw)?;
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0], msg);
        Ok(())
    }

    #[test]
    fn test_certificate_round_trip() -> Result<()> {
        let msg = CertificateMsg {
            certificates: vec![vec![1, 2, 3], vec![4, 5]],
        };
        let parsed = CertificateMsg::unmarshal(&msg.marshal())?;
        assert_eq!(parsed, msg);
        Ok(())
    }

    #[test]
    fn test_server_key_exchange_round_trip() -> Result<()> {
        let ske = ServerKeyExchange {
            named_curve: NAMED_CURVE_X25519,
            public_key: vec![0xaa; 32],
            signature_scheme: SIGNATURE_SCHEME_ECDSA_P256_SHA256,
            signature: vec![0xbb; 70],
        };
        let parsed = ServerKeyExchange::unmarshal(&ske.marshal())?;
        assert_eq!(parsed, ske);
        Ok(())
    }

    #[test]
    fn test_fragmented_messages_are_rejected() {
        let msg = HandshakeMessage::new(HandshakeType::Finished, 5, Bytes::from_static(&[0; 12]));
        let mut raw = BytesMut::from(&msg.raw[..]);
        // pretend the body continues beyond this datagram
        raw[9] = 1; // fragment_offset != 0
        assert!(HandshakeMessage::unmarshal_record(&raw).is_err());
    }
}
