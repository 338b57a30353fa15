pub mod prf;

use rcgen::{CertificateParams, KeyPair};
use ring::rand::SystemRandom;
use ring::signature::{self, EcdsaKeyPair, KeyPair as _};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use shared::error::{Error, Result};
use shared::util::math_rand_alpha;

/// ecdsa_secp256r1_sha256 (RFC 8422)
pub const SIGNATURE_SCHEME_ECDSA_P256_SHA256: u16 = 0x0403;
/// rsa_pkcs1_sha256 (RFC 5246)
pub const SIGNATURE_SCHEME_RSA_PKCS1_SHA256: u16 = 0x0401;

/// Key algorithm of a local certificate.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum KeyAlgorithm {
    #[default]
    EcdsaP256,
    Rsa,
}

pub enum CryptoPrivateKeyKind {
    Ecdsa256(EcdsaKeyPair),
    Rsa256(ring::rsa::KeyPair),
}

/// A private key usable for the handshake signatures, kept alongside its
/// PKCS#8 serialization so certificates can round-trip through PEM.
pub struct CryptoPrivateKey {
    pub kind: CryptoPrivateKeyKind,
    pub serialized_der: Vec<u8>,
}

impl CryptoPrivateKey {
    pub fn from_pkcs8(der: &[u8]) -> Result<Self> {
        if let Ok(kp) = EcdsaKeyPair::from_pkcs8(
            &signature::ECDSA_P256_SHA256_ASN1_SIGNING,
            der,
            &SystemRandom::new(),
        ) {
            return Ok(Self {
                kind: CryptoPrivateKeyKind::Ecdsa256(kp),
                serialized_der: der.to_vec(),
            });
        }
        let kp = ring::rsa::KeyPair::from_pkcs8(der)
            .map_err(|e| Error::Other(format!("unsupported private key: {e}")))?;
        Ok(Self {
            kind: CryptoPrivateKeyKind::Rsa256(kp),
            serialized_der: der.to_vec(),
        })
    }

    pub fn signature_scheme(&self) -> u16 {
        match self.kind {
            CryptoPrivateKeyKind::Ecdsa256(_) => SIGNATURE_SCHEME_ECDSA_P256_SHA256,
            CryptoPrivateKeyKind::Rsa256(_) => SIGNATURE_SCHEME_RSA_PKCS1_SHA256,
        }
    }

    /// Signs `message` with this key's native scheme.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let rng = SystemRandom::new();
        match &self.kind {
            CryptoPrivateKeyKind::Ecdsa256(kp) => kp
                .sign(&rng, message)
                .map(|s| s.as_ref().to_vec())
                .map_err(|e| Error::Other(e.to_string())),
            CryptoPrivateKeyKind::Rsa256(kp) => {
                let mut sig = vec![0u8; kp.public().modulus_len()];
                kp.sign(&signature::RSA_PKCS1_SHA256, &rng, message, &mut sig)
                    .map_err(|e| Error::Other(e.to_string()))?;
                Ok(sig)
            }
        }
    }
}

impl std::fmt::Debug for CryptoPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            CryptoPrivateKeyKind::Ecdsa256(_) => "Ecdsa256",
            CryptoPrivateKeyKind::Rsa256(_) => "Rsa256",
        };
        f.debug_struct("CryptoPrivateKey").field("kind", &kind).finish()
    }
}

impl PartialEq for CryptoPrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.serialized_der == other.serialized_der
    }
}

impl Clone for CryptoPrivateKey {
    fn clone(&self) -> Self {
        // the DER always re-parses: it parsed once to get here
        Self::from_pkcs8(&self.serialized_der).expect("key DER round trip")
    }
}

/// A leaf certificate chain with its private key.
#[derive(Debug, Clone, PartialEq)]
pub struct Certificate {
    /// DER-encoded certificates, leaf first.
    pub certificate: Vec<Vec<u8>>,
    pub private_key: CryptoPrivateKey,
}

impl Certificate {
    /// Generates a self-signed ECDSA-P256 certificate with a random subject.
    /// RSA generation is unavailable (`rcgen` cannot emit RSA keys); RSA
    /// identities must be preprovisioned via [from_key_and_certificate].
    pub fn generate_self_signed() -> Result<Self> {
        let key_pair = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)
            .map_err(|e| Error::Other(e.to_string()))?;
        let params = CertificateParams::new(vec![math_rand_alpha(16)])
            .map_err(|e| Error::Other(e.to_string()))?;
        let x509 = params
            .self_signed(&key_pair)
            .map_err(|e| Error::Other(e.to_string()))?;
        let serialized_der = key_pair.serialize_der();

        Ok(Self {
            certificate: vec![x509.der().to_vec()],
            private_key: CryptoPrivateKey::from_pkcs8(&serialized_der)?,
        })
    }

    /// Builds a certificate from preprovisioned PKCS#8 key and DER cert.
    pub fn from_key_and_certificate(key_der: &[u8], cert_der: Vec<u8>) -> Result<Self> {
        Ok(Self {
            certificate: vec![cert_der],
            private_key: CryptoPrivateKey::from_pkcs8(key_der)?,
        })
    }

    /// Serializes certificate and private key as concatenated PEM blocks.
    pub fn serialize_pem(&self) -> String {
        let mut out = String::new();
        for der in &self.certificate {
            out += &pem::encode(&pem::Pem::new("CERTIFICATE".to_owned(), der.clone()));
        }
        out += &pem::encode(&pem::Pem::new(
            "PRIVATE KEY".to_owned(),
            self.private_key.serialized_der.clone(),
        ));
        out
    }

    /// Parses the PEM produced by [serialize_pem](Self::serialize_pem).
    pub fn from_pem(pem_str: &str) -> Result<Self> {
        let blocks =
            pem::parse_many(pem_str).map_err(|e| Error::Other(format!("can't parse PEM: {e}")))?;
        let mut certificate = vec![];
        let mut key = None;
        for block in blocks {
            match block.tag() {
                "CERTIFICATE" => certificate.push(block.contents().to_vec()),
                "PRIVATE KEY" => key = Some(block.contents().to_vec()),
                tag => return Err(Error::Other(format!("unexpected PEM tag {tag}"))),
            }
        }
        let key = key.ok_or(Error::ErrNoCertificate)?;
        if certificate.is_empty() {
            return Err(Error::ErrNoCertificate);
        }
        Ok(Self {
            certificate,
            private_key: CryptoPrivateKey::from_pkcs8(&key)?,
        })
    }
}

/// Extracts the SubjectPublicKeyInfo key bits of a DER certificate for
/// signature verification.
fn public_key_bits(cert_der: &[u8]) -> Result<Vec<u8>> {
    let (_, cert) = x509_parser::parse_x509_certificate(cert_der)
        .map_err(|e| Error::Other(format!("bad certificate: {e}")))?;
    Ok(cert
        .tbs_certificate
        .subject_pki
        .subject_public_key
        .data
        .to_vec())
}

/// Verifies a handshake signature made by the holder of `cert_der`.
pub fn verify_signature(
    cert_der: &[u8],
    signature_scheme: u16,
    message: &[u8],
    sig: &[u8],
) -> Result<()> {
    let key_bits = public_key_bits(cert_der)?;
    let verified = match signature_scheme {
        SIGNATURE_SCHEME_ECDSA_P256_SHA256 => {
            signature::UnparsedPublicKey::new(&signature::ECDSA_P256_SHA256_ASN1, &key_bits)
                .verify(message, sig)
        }
        SIGNATURE_SCHEME_RSA_PKCS1_SHA256 => {
            signature::UnparsedPublicKey::new(&signature::RSA_PKCS1_2048_8192_SHA256, &key_bits)
                .verify(message, sig)
        }
        _ => return Err(Error::ErrInvalidSignature),
    };
    verified.map_err(|_| Error::ErrInvalidSignature)
}

/// Hex-colon digest of a certificate under a named hash algorithm, as it
/// appears in an SDP fingerprint attribute.
pub fn fingerprint(cert_der: &[u8], algorithm: &str) -> Result<String> {
    let digest: Vec<u8> = match algorithm {
        "sha-1" => Sha1::digest(cert_der).to_vec(),
        "sha-256" => Sha256::digest(cert_der).to_vec(),
        "sha-384" => Sha384::digest(cert_der).to_vec(),
        "sha-512" => Sha512::digest(cert_der).to_vec(),
        _ => return Err(Error::Other(format!("unsupported hash {algorithm}"))),
    };
    let hex: Vec<String> = digest.iter().map(|b| format!("{b:02x}")).collect();
    Ok(hex.join(":"))
}

/// Case-insensitive comparison of two hex-colon fingerprints.
pub fn fingerprints_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_generate_and_sign_verify() -> Result<()> {
        let cert = Certificate::generate_self_signed()?;
        assert_eq!(
            cert.private_key.signature_scheme(),
            SIGNATURE_SCHEME_ECDSA_P256_SHA256
        );

        let message = b"ephemeral parameters to be signed";
        let sig = cert.private_key.sign(message)?;
        verify_signature(
            &cert.certificate[0],
            SIGNATURE_SCHEME_ECDSA_P256_SHA256,
            message,
            &sig,
        )?;

        // a different message must not verify
        assert!(verify_signature(
            &cert.certificate[0],
            SIGNATURE_SCHEME_ECDSA_P256_SHA256,
            b"a different message",
            &sig,
        )
        .is_err());
        Ok(())
    }

    #[test]
    fn test_pem_round_trip() -> Result<()> {
        let cert = Certificate::generate_self_signed()?;
        let pem = cert.serialize_pem();
        let parsed = Certificate::from_pem(&pem)?;
        assert_eq!(parsed, cert);
        Ok(())
    }

    #[test]
    fn test_fingerprint_format() -> Result<()> {
        let cert = Certificate::generate_self_signed()?;
        let fp = fingerprint(&cert.certificate[0], "sha-256")?;
        // 32 bytes -> 32 hex pairs joined by colons
        assert_eq!(fp.len(), 32 * 3 - 1);
        assert!(fp
            .split(':')
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit())));

        let upper = fp.to_ascii_uppercase();
        assert!(fingerprints_match(&fp, &upper));
        Ok(())
    }

    #[test]
    fn test_verify_signature_rejects_unknown_scheme() -> Result<()> {
        let cert = Certificate::generate_self_signed()?;
        let sig = cert.private_key.sign(b"m")?;
        assert_eq!(
            verify_signature(&cert.certificate[0], 0x0601, b"m", &sig),
            Err(Error::ErrInvalidSignature)
        );
        Ok(())
    }
}
