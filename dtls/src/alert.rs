use bytes::{Buf, BufMut, BytesMut};
use shared::error::{Error, Result};
use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertLevel {
    Warning = 1,
    Fatal = 2,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertDescription {
    CloseNotify = 0,
    UnexpectedMessage = 10,
    BadRecordMac = 20,
    HandshakeFailure = 40,
    BadCertificate = 42,
    UnsupportedCertificate = 43,
    CertificateUnknown = 46,
    IllegalParameter = 47,
    DecodeError = 50,
    DecryptError = 51,
    InternalError = 80,
}

impl fmt::Display for AlertDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::CloseNotify => "close notify",
            Self::UnexpectedMessage => "unexpected message",
            Self::BadRecordMac => "bad record mac",
            Self::HandshakeFailure => "handshake failure",
            Self::BadCertificate => "bad certificate",
            Self::UnsupportedCertificate => "unsupported certificate",
            Self::CertificateUnknown => "certificate unknown",
            Self::IllegalParameter => "illegal parameter",
            Self::DecodeError => "decode error",
            Self::DecryptError => "decrypt error",
            Self::InternalError => "internal error",
        };
        write!(f, "{s}")
    }
}

/// A TLS alert (RFC 5246 Section 7.2).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub description: AlertDescription,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "alert {:?}: {}", self.level, self.description)
    }
}

impl Alert {
    pub fn marshal(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(2);
        buf.put_u8(self.level as u8);
        buf.put_u8(self.description as u8);
        buf
    }

    pub fn unmarshal<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < 2 {
            return Err(Error::ErrUnexpectedEof);
        }
        let level = match buf.get_u8() {
            1 => AlertLevel::Warning,
            2 => AlertLevel::Fatal,
            _ => return Err(Error::ErrAlertFatalOrClose),
        };
        let description = match buf.get_u8() {
            0 => AlertDescription::CloseNotify,
            10 => AlertDescription::UnexpectedMessage,
            20 => AlertDescription::BadRecordMac,
            40 => AlertDescription::HandshakeFailure,
            42 => AlertDescription::BadCertificate,
            43 => AlertDescription::UnsupportedCertificate,
            46 => AlertDescription::CertificateUnknown,
            47 => AlertDescription::IllegalParameter,
            50 => AlertDescription::DecodeError,
            51 => AlertDescription::DecryptError,
            _ => AlertDescription::InternalError,
        };
        Ok(Self { level, description })
    }
}
