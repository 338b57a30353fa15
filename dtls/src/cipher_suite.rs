use crate::crypto::prf;
use crate::record::RecordHeader;
use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes128Gcm, KeyInit, Nonce};
use bytes::{BufMut, Bytes, BytesMut};
use shared::error::{Error, Result};
use std::fmt;

/// TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256
pub const TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256: u16 = 0xc02b;
/// TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256
pub const TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256: u16 = 0xc02f;

const KEY_LEN: usize = 16;
const FIXED_IV_LEN: usize = 4;
const EXPLICIT_NONCE_LEN: usize = 8;
const TAG_LEN: usize = 16;

/// The mandatory suites of this profile: ECDHE key exchange with
/// AES-128-GCM. The two ids differ only in the certificate signature family.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CipherSuiteId(pub u16);

impl fmt::Display for CipherSuiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self.0 {
            TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256 => {
                "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256"
            }
            TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256 => "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
            _ => return write!(f, "unknown suite {:#06x}", self.0),
        };
        write!(f, "{s}")
    }
}

impl CipherSuiteId {
    pub fn is_supported(v: u16) -> bool {
        v == TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256 || v == TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256
    }
}

/// Keys and AEAD state for one direction of an established epoch.
struct HalfConn {
    cipher: Aes128Gcm,
    write_iv: [u8; FIXED_IV_LEN],
}

/// AES-128-GCM record protection (RFC 5288) with the DTLS additional data
/// layout of RFC 6347 Section 4.1.2.1.
pub struct CipherSuite {
    local: HalfConn,
    remote: HalfConn,
}

impl CipherSuite {
    /// Derives the key block and splits it by role. `is_client` refers to
    /// the local side.
    pub fn new(master_secret: &[u8], client_random: &[u8], server_random: &[u8], is_client: bool) -> Result<Self> {
        let key_block = prf::prf_key_block(
            master_secret,
            client_random,
            server_random,
            2 * KEY_LEN + 2 * FIXED_IV_LEN,
        );

        let client_key = &key_block[0..KEY_LEN];
        let server_key = &key_block[KEY_LEN..2 * KEY_LEN];
        let client_iv = &key_block[2 * KEY_LEN..2 * KEY_LEN + FIXED_IV_LEN];
        let server_iv = &key_block[2 * KEY_LEN + FIXED_IV_LEN..];

        let build = |key: &[u8], iv: &[u8]| -> Result<HalfConn> {
            let cipher = Aes128Gcm::new_from_slice(key)
                .map_err(|e| Error::ErrDtlsHandshakeFailed(e.to_string()))?;
            let mut write_iv = [0u8; FIXED_IV_LEN];
            write_iv.copy_from_slice(iv);
            Ok(HalfConn { cipher, write_iv })
        };

        let (local, remote) = if is_client {
            (build(client_key, client_iv)?, build(server_key, server_iv)?)
        } else {
            (build(server_key, server_iv)?, build(client_key, client_iv)?)
        };

        Ok(Self { local, remote })
    }

    fn nonce(write_iv: &[u8; FIXED_IV_LEN], explicit: &[u8]) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        nonce[..FIXED_IV_LEN].copy_from_slice(write_iv);
        nonce[FIXED_IV_LEN..].copy_from_slice(explicit);
        nonce
    }

    fn additional_data(header: &RecordHeader, payload_len: usize) -> [u8; 13] {
        let mut aad = [0u8; 13];
        aad[..2].copy_from_slice(&header.epoch.to_be_bytes());
        aad[2..8].copy_from_slice(&header.sequence_number.to_be_bytes()[2..]);
        aad[8] = header.content_type as u8;
        aad[9..11].copy_from_slice(&header.version.to_be_bytes());
        aad[11..13].copy_from_slice(&(payload_len as u16).to_be_bytes());
        aad
    }

    /// Seals a plaintext record payload; the result carries the 8-byte
    /// explicit nonce followed by ciphertext and tag.
    pub fn encrypt(&self, header: &RecordHeader, plaintext: &[u8]) -> Result<Bytes> {
        let mut explicit = [0u8; EXPLICIT_NONCE_LEN];
        explicit[..2].copy_from_slice(&header.epoch.to_be_bytes());
        explicit[2..].copy_from_slice(&header.sequence_number.to_be_bytes()[2..]);

        let nonce = Self::nonce(&self.local.write_iv, &explicit);
        let aad = Self::additional_data(header, plaintext.len());

        let ciphertext = self
            .local
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| Error::ErrDtlsHandshakeFailed("record seal failed".to_owned()))?;

        let mut out = BytesMut::with_capacity(EXPLICIT_NONCE_LEN + ciphertext.len());
        out.put_slice(&explicit);
        out.put_slice(&ciphertext);
        Ok(out.freeze())
    }

    /// Opens a protected record payload.
    pub fn decrypt(&self, header: &RecordHeader, payload: &[u8]) -> Result<Bytes> {
        if payload.len() < EXPLICIT_NONCE_LEN + TAG_LEN {
            return Err(Error::ErrUnexpectedEof);
        }
        let (explicit, ciphertext) = payload.split_at(EXPLICIT_NONCE_LEN);

        let nonce = Self::nonce(&self.remote.write_iv, explicit);
        let aad = Self::additional_data(header, ciphertext.len() - TAG_LEN);

        let plaintext = self
            .remote
            .cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| Error::ErrAlertFatalOrClose)?;
        Ok(Bytes::from(plaintext))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::record::ContentType;

    fn header(epoch: u16, seq: u64, typ: ContentType) -> RecordHeader {
        RecordHeader {
            content_type: typ,
            version: crate::PROTOCOL_VERSION,
            epoch,
            sequence_number: seq,
            length: 0,
        }
    }

    fn pair() -> (CipherSuite, CipherSuite) {
        let master = [0x42u8; 48];
        let client_random = [1u8; 32];
        let server_random = [2u8; 32];
        let client = CipherSuite::new(&master, &client_random, &server_random, true).unwrap();
        let server = CipherSuite::new(&master, &client_random, &server_random, false).unwrap();
        (client, server)
    }

    #[test]
    fn test_seal_open_round_trip() -> Result<()> {
        let (client, server) = pair();
        let h = header(1, 7, ContentType::ApplicationData);

        let sealed = client.encrypt(&h, b"hello dtls")?;
        assert_ne!(sealed.as_ref(), b"hello dtls");
        let opened = server.decrypt(&h, &sealed)?;
        assert_eq!(opened.as_ref(), b"hello dtls");

        // and the reverse direction uses different keys
        let sealed = server.encrypt(&h, b"pong")?;
        let opened = client.decrypt(&h, &sealed)?;
        assert_eq!(opened.as_ref(), b"pong");
        Ok(())
    }

    #[test]
    fn test_tampered_record_fails_open() {
        let (client, server) = pair();
        let h = header(1, 9, ContentType::ApplicationData);

        let mut sealed = BytesMut::from(&client.encrypt(&h, b"payload").unwrap()[..]);
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(server.decrypt(&h, &sealed).is_err());
    }

    #[test]
    fn test_header_is_authenticated() {
        let (client, server) = pair();
        let h = header(1, 3, ContentType::ApplicationData);
        let sealed = client.encrypt(&h, b"payload").unwrap();

        // a different sequence number must break authentication
        let wrong = header(1, 4, ContentType::ApplicationData);
        assert!(server.decrypt(&wrong, &sealed).is_err());
    }
}
