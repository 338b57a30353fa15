use super::{padded, put_chunk, CT_ABORT, CT_ERROR};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use shared::error::{Error, Result};
use std::fmt;

pub const CAUSE_INVALID_STREAM_IDENTIFIER: u16 = 1;
pub const CAUSE_STALE_COOKIE_ERROR: u16 = 3;
pub const CAUSE_UNRECOGNIZED_CHUNK_TYPE: u16 = 6;
pub const CAUSE_PROTOCOL_VIOLATION: u16 = 13;

const CAUSE_HEADER_SIZE: usize = 4;

/// One error cause TLV (RFC 4960 Section 3.3.10).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCause {
    pub code: u16,
    pub value: Bytes,
}

impl fmt::Display for ErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self.code {
            CAUSE_INVALID_STREAM_IDENTIFIER => "Invalid Stream Identifier",
            CAUSE_STALE_COOKIE_ERROR => "Stale Cookie Error",
            CAUSE_UNRECOGNIZED_CHUNK_TYPE => "Unrecognized Chunk Type",
            CAUSE_PROTOCOL_VIOLATION => "Protocol Violation",
            _ => "Unknown Cause",
        };
        write!(f, "{s} ({})", self.code)
    }
}

impl ErrorCause {
    /// RFC 4960 Section 3.3.10.3: the value is the measure of staleness in
    /// microseconds, zero when not measured.
    pub fn stale_cookie(staleness_us: u32) -> Self {
        Self {
            code: CAUSE_STALE_COOKIE_ERROR,
            value: Bytes::copy_from_slice(&staleness_us.to_be_bytes()),
        }
    }

    fn marshal(&self, buf: &mut BytesMut) {
        buf.put_u16(self.code);
        buf.put_u16((CAUSE_HEADER_SIZE + self.value.len()) as u16);
        buf.put_slice(&self.value);
        for _ in self.value.len()..padded(self.value.len()) {
            buf.put_u8(0);
        }
    }

    fn unmarshal_causes(mut buf: &[u8]) -> Result<Vec<Self>> {
        let mut causes = vec![];
        while buf.has_remaining() {
            if buf.remaining() < CAUSE_HEADER_SIZE {
                return Err(Error::ErrMalformedChunk(CT_ERROR));
            }
            let code = buf.get_u16();
            let length = buf.get_u16() as usize;
            if length < CAUSE_HEADER_SIZE {
                return Err(Error::ErrMalformedChunk(CT_ERROR));
            }
            let value_len = length - CAUSE_HEADER_SIZE;
            if buf.remaining() < value_len {
                return Err(Error::ErrMalformedChunk(CT_ERROR));
            }
            let value = Bytes::copy_from_slice(&buf[..value_len]);
            buf.advance(value_len);
            let pad = padded(value_len) - value_len;
            buf.advance(pad.min(buf.remaining()));
            causes.push(Self { code, value });
        }
        Ok(causes)
    }
}

/// ERROR chunk (RFC 4960 Section 3.3.10).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkError {
    pub causes: Vec<ErrorCause>,
}

impl ChunkError {
    pub(crate) fn marshal(&self, buf: &mut BytesMut) {
        let mut value = BytesMut::new();
        for cause in &self.causes {
            cause.marshal(&mut value);
        }
        put_chunk(buf, CT_ERROR, 0, &value);
    }

    pub(crate) fn unmarshal(value: &[u8]) -> Result<Self> {
        Ok(Self {
            causes: ErrorCause::unmarshal_causes(value)?,
        })
    }
}

/// ABORT chunk (RFC 4960 Section 3.3.7), carrying zero or more causes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkAbort {
    pub causes: Vec<ErrorCause>,
}

impl ChunkAbort {
    pub(crate) fn marshal(&self, buf: &mut BytesMut) {
        let mut value = BytesMut::new();
        for cause in &self.causes {
            cause.marshal(&mut value);
        }
        put_chunk(buf, CT_ABORT, 0, &value);
    }

    pub(crate) fn unmarshal(value: &[u8]) -> Result<Self> {
        Ok(Self {
            causes: ErrorCause::unmarshal_causes(value)?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::chunk::Chunk;

    #[test]
    fn test_stale_cookie_error_round_trip() -> Result<()> {
        let chunk = ChunkError {
            causes: vec![ErrorCause::stale_cookie(120_000_000)],
        };

        let mut buf = BytesMut::new();
        chunk.marshal(&mut buf);
        let parsed = Chunk::unmarshal(&mut buf.freeze())?;
        if let Chunk::Error(e) = parsed {
            assert_eq!(e.causes.len(), 1);
            assert_eq!(e.causes[0].code, CAUSE_STALE_COOKIE_ERROR);
        } else {
            panic!("expected ERROR chunk");
        }
        Ok(())
    }
}
