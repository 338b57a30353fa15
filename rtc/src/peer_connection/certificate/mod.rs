use std::time::{Duration, SystemTime};

use crate::transport::RTCDtlsFingerprint;
use dtls::crypto::{fingerprint, Certificate};
use shared::error::{Error, Result};

/// Certificate lifetime handed out by [generate](RTCCertificate::generate).
const DEFAULT_EXPIRES: Duration = Duration::from_secs(30 * 24 * 3600);

/// An X.509 certificate used to authenticate the DTLS handshake.
///
/// Certificates are self-signed and identified to the peer by digest: the
/// fingerprints returned from
/// [get_fingerprints](RTCCertificate::get_fingerprints) are placed in the
/// local session description, and the peer's leaf certificate must match one
/// of the fingerprints in the remote description. Certificates may be shared
/// read-only across connections.
#[derive(Clone, Debug)]
pub struct RTCCertificate {
    /// DTLS certificate containing the X.509 certificate and private key.
    pub(crate) dtls_certificate: Certificate,

    /// Timestamp after which this certificate is no longer valid.
    pub(crate) expires: SystemTime,
}

impl PartialEq for RTCCertificate {
    fn eq(&self, other: &Self) -> bool {
        self.dtls_certificate == other.dtls_certificate
    }
}

impl RTCCertificate {
    /// Generates a new ECDSA-P256 certificate with a random subject.
    pub fn generate() -> Result<Self> {
        Ok(Self {
            dtls_certificate: Certificate::generate_self_signed()?,
            expires: SystemTime::now() + DEFAULT_EXPIRES,
        })
    }

    /// Wraps a preprovisioned key + certificate (`dtls.keys` configuration):
    /// PKCS#8 private key DER and certificate DER. This is also the only way
    /// to use an RSA identity.
    pub fn from_key_and_certificate(key_der: &[u8], cert_der: Vec<u8>) -> Result<Self> {
        Ok(Self {
            dtls_certificate: Certificate::from_key_and_certificate(key_der, cert_der)?,
            expires: SystemTime::now() + DEFAULT_EXPIRES,
        })
    }

    /// Uses an existing DTLS certificate with an explicit expiry.
    pub fn from_existing(dtls_certificate: Certificate, expires: SystemTime) -> Self {
        Self {
            dtls_certificate,
            expires,
        }
    }

    pub fn expires(&self) -> SystemTime {
        self.expires
    }

    pub(crate) fn dtls_certificate(&self) -> &Certificate {
        &self.dtls_certificate
    }

    /// Returns sha-256 fingerprints of the certificate chain, one per
    /// certificate, for the `a=fingerprint` attribute.
    pub fn get_fingerprints(&self) -> Vec<RTCDtlsFingerprint> {
        self.dtls_certificate
            .certificate
            .iter()
            .filter_map(|c| {
                fingerprint(c, "sha-256").ok().map(|value| RTCDtlsFingerprint {
                    algorithm: "sha-256".to_owned(),
                    value,
                })
            })
            .collect()
    }

    pub(crate) fn check_expiry(&self) -> Result<()> {
        if SystemTime::now() > self.expires {
            return Err(Error::ErrCertificateExpired);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_generate_certificate() -> Result<()> {
        let cert = RTCCertificate::generate()?;
        assert!(cert.check_expiry().is_ok());

        let fingerprints = cert.get_fingerprints();
        assert_eq!(fingerprints.len(), 1);
        assert_eq!(fingerprints[0].algorithm, "sha-256");
        Ok(())
    }

    #[test]
    fn test_certificate_equality() -> Result<()> {
        let a = RTCCertificate::generate()?;
        let b = RTCCertificate::generate()?;
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        Ok(())
    }

    #[test]
    fn test_from_existing_expiry() -> Result<()> {
        let inner = dtls::crypto::Certificate::generate_self_signed()?;
        let past = SystemTime::now() - Duration::from_secs(60);
        let cert = RTCCertificate::from_existing(inner, past);
        assert_eq!(cert.check_expiry(), Err(Error::ErrCertificateExpired));
        Ok(())
    }
}
