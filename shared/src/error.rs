use std::io;
use std::net;
use std::num::ParseIntError;
use std::string::FromUtf8Error;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    //
    // Session description
    //
    #[error("invalid sdp: {0}")]
    ErrInvalidSdp(String),
    #[error("sdp: unexpected line prefix {0}")]
    ErrSdpInvalidSyntax(String),
    #[error("sdp: invalid value {0}")]
    ErrSdpInvalidValue(String),

    //
    // Peer connection / signaling
    //
    #[error("invalid state")]
    ErrInvalidState,
    #[error("connection closed")]
    ErrConnectionClosed,
    #[error("invalid signaling state transition: {0}")]
    ErrSignalingStateProposedTransitionInvalid(String),
    #[error("rollback is not allowed from stable")]
    ErrSignalingStateCannotRollback,
    #[error("remote description is not set")]
    ErrNoRemoteDescription,
    #[error("certificate expired")]
    ErrCertificateExpired,
    #[error("protocol string too long")]
    ErrProtocolTooLarge,
    #[error("data channel id already in use")]
    ErrDataChannelIdInUse,

    //
    // STUN
    //
    #[error("stun: attribute not found")]
    ErrAttributeNotFound,
    #[error("stun: unexpected end of buffer")]
    ErrUnexpectedEof,
    #[error("stun: attribute size overflows message")]
    ErrAttrSizeOverflow,
    #[error("stun: magic cookie mismatch")]
    ErrMagicCookieMismatch,
    #[error("stun: integrity check failed")]
    ErrIntegrityMismatch,
    #[error("stun: fingerprint check failed")]
    ErrFingerprintMismatch,
    #[error("stun: client closed")]
    ErrClientClosed,
    #[error("stun: transaction exhausted its retransmission budget")]
    ErrTransactionTimeOut,
    #[error("stun: error response {0}")]
    ErrErrorResponse(u16),

    //
    // ICE
    //
    #[error("ice: connectivity failed")]
    ErrIceFailed,
    #[error("ice: remote ufrag is empty")]
    ErrRemoteUfragEmpty,
    #[error("ice: remote pwd is empty")]
    ErrRemotePwdEmpty,
    #[error("ice: local ufrag has insufficient bits")]
    ErrLocalUfragInsufficientBits,
    #[error("ice: local pwd has insufficient bits")]
    ErrLocalPwdInsufficientBits,
    #[error("ice: username mismatch")]
    ErrMismatchUsername,
    #[error("ice: unknown candidate type")]
    ErrUnknownCandidateType,
    #[error("ice: malformed candidate attribute: {0}")]
    ErrInvalidCandidateAttribute(String),
    #[error("ice: unsupported scheme")]
    ErrSchemeType,
    #[error("ice: port range min must be below max")]
    ErrInvalidPortRange,
    #[error("ice: no usable local addresses")]
    ErrNoLocalAddress,
    #[error("ice: agent closed")]
    ErrAgentClosed,

    //
    // DTLS
    //
    #[error("dtls: handshake failed: {0}")]
    ErrDtlsHandshakeFailed(String),
    #[error("dtls: certificate fingerprint does not match any remote fingerprint")]
    ErrDtlsFingerprintMismatch,
    #[error("dtls: alert is fatal or close notify")]
    ErrAlertFatalOrClose,
    #[error("dtls: no cipher suite negotiated")]
    ErrCipherSuiteUnset,
    #[error("dtls: unsupported cipher suite {0:#06x}")]
    ErrInvalidCipherSuite(u16),
    #[error("dtls: cookie mismatch")]
    ErrCookieMismatch,
    #[error("dtls: no certificate configured")]
    ErrNoCertificate,
    #[error("dtls: peer sent no certificate")]
    ErrPeerCertificateMissing,
    #[error("dtls: invalid signature")]
    ErrInvalidSignature,
    #[error("dtls: unsupported protocol version")]
    ErrUnsupportedProtocolVersion,
    #[error("dtls: record overflow")]
    ErrRecordOverflow,
    #[error("dtls: invalid handshake fsm transition")]
    ErrInvalidFsmTransition,
    #[error("dtls: connection closed")]
    ErrDtlsClosed,

    //
    // SCTP
    //
    #[error("sctp: association is not established")]
    ErrSctpClosed,
    #[error("sctp: state cookie hmac is invalid")]
    ErrSctpCookieInvalid,
    #[error("sctp: state cookie is stale")]
    ErrSctpCookieStale,
    #[error("sctp: verification tag mismatch")]
    ErrVerificationTagMismatch,
    #[error("sctp: packet shorter than the common header")]
    ErrPacketTooShort,
    #[error("sctp: checksum mismatch")]
    ErrChecksumMismatch,
    #[error("sctp: malformed chunk of type {0}")]
    ErrMalformedChunk(u8),
    #[error("outbound packet larger than maximum message size")]
    ErrOutboundPacketTooLarge,
    #[error("sctp: a reconfig request is already in flight")]
    ErrReconfigInFlight,

    //
    // Data channel
    //
    #[error("datachannel: unknown message type {0}")]
    ErrInvalidMessageType(u8),
    #[error("datachannel: unexpected end of buffer: (expected: {expected}, actual: {actual})")]
    UnexpectedEndOfBuffer { expected: usize, actual: usize },

    //
    // Wrapped foreign errors
    //
    #[error("parse int: {0}")]
    ErrParseInt(#[from] ParseIntError),
    #[error("parse addr: {0}")]
    ErrParseAddr(#[from] net::AddrParseError),
    #[error("utf8: {0}")]
    ErrUtf8(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("{0}")]
    Other(String),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<FromUtf8Error> for Error {
    fn from(e: FromUtf8Error) -> Self {
        Error::ErrUtf8(e.to_string())
    }
}
