use crate::chunk::padded;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use shared::error::{Error, Result};

pub const PARAM_STATE_COOKIE: u16 = 0x0007;
/// SUPPORTED_CHUNK_EXT (32778), listing chunk types the sender understands.
pub const PARAM_SUPPORTED_EXTENSIONS: u16 = 0x8008;
/// PRSCTP_SUPPORTED (49152) from RFC 3758.
pub const PARAM_FORWARD_TSN_SUPPORTED: u16 = 0xC000;
pub const PARAM_OUTGOING_SSN_RESET_REQUEST: u16 = 13;
pub const PARAM_RECONFIG_RESPONSE: u16 = 16;
pub const PARAM_ADD_OUTGOING_STREAMS_REQUEST: u16 = 17;

/// RFC 6525 Section 4.4 result code for a performed reconfiguration.
pub const RECONFIG_RESULT_SUCCESS_PERFORMED: u32 = 1;

const PARAM_HEADER_SIZE: usize = 4;

/// A chunk parameter TLV as used by INIT/INIT_ACK and RE-CONFIG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    StateCookie(Bytes),
    SupportedExtensions(Vec<u8>),
    ForwardTsnSupported,
    OutgoingSsnResetRequest {
        request_seq: u32,
        response_seq: u32,
        last_tsn: u32,
        streams: Vec<u16>,
    },
    AddOutgoingStreamsRequest {
        request_seq: u32,
        new_streams: u16,
    },
    ReconfigResponse {
        response_seq: u32,
        result: u32,
    },
    Unknown {
        typ: u16,
        value: Bytes,
    },
}

impl Param {
    fn typ(&self) -> u16 {
        match self {
            Param::StateCookie(_) => PARAM_STATE_COOKIE,
            Param::SupportedExtensions(_) => PARAM_SUPPORTED_EXTENSIONS,
            Param::ForwardTsnSupported => PARAM_FORWARD_TSN_SUPPORTED,
            Param::OutgoingSsnResetRequest { .. } => PARAM_OUTGOING_SSN_RESET_REQUEST,
            Param::AddOutgoingStreamsRequest { .. } => PARAM_ADD_OUTGOING_STREAMS_REQUEST,
            Param::ReconfigResponse { .. } => PARAM_RECONFIG_RESPONSE,
            Param::Unknown { typ, .. } => *typ,
        }
    }

    fn value(&self) -> BytesMut {
        let mut value = BytesMut::new();
        match self {
            Param::StateCookie(cookie) => value.put_slice(cookie),
            Param::SupportedExtensions(types) => value.put_slice(types),
            Param::ForwardTsnSupported => {}
            Param::OutgoingSsnResetRequest {
                request_seq,
                response_seq,
                last_tsn,
                streams,
            } => {
                value.put_u32(*request_seq);
                value.put_u32(*response_seq);
                value.put_u32(*last_tsn);
                for s in streams {
                    value.put_u16(*s);
                }
            }
            Param::AddOutgoingStreamsRequest {
                request_seq,
                new_streams,
            } => {
                value.put_u32(*request_seq);
                value.put_u16(*new_streams);
                value.put_u16(0); // reserved
            }
            Param::ReconfigResponse {
                response_seq,
                result,
            } => {
                value.put_u32(*response_seq);
                value.put_u32(*result);
            }
            Param::Unknown { value: v, .. } => value.put_slice(v),
        }
        value
    }

    fn unmarshal_one(typ: u16, value: &[u8]) -> Result<Self> {
        let mut buf = value;
        Ok(match typ {
            PARAM_STATE_COOKIE => Param::StateCookie(Bytes::copy_from_slice(value)),
            PARAM_SUPPORTED_EXTENSIONS => Param::SupportedExtensions(value.to_vec()),
            PARAM_FORWARD_TSN_SUPPORTED => Param::ForwardTsnSupported,
            PARAM_OUTGOING_SSN_RESET_REQUEST => {
                if value.len() < 12 || (value.len() - 12) % 2 != 0 {
                    return Err(Error::ErrMalformedChunk(0));
                }
                let request_seq = buf.get_u32();
                let response_seq = buf.get_u32();
                let last_tsn = buf.get_u32();
                let mut streams = vec![];
                while buf.has_remaining() {
                    streams.push(buf.get_u16());
                }
                Param::OutgoingSsnResetRequest {
                    request_seq,
                    response_seq,
                    last_tsn,
                    streams,
                }
            }
            PARAM_ADD_OUTGOING_STREAMS_REQUEST => {
                if value.len() < 8 {
                    return Err(Error::ErrMalformedChunk(0));
                }
                let request_seq = buf.get_u32();
                let new_streams = buf.get_u16();
                Param::AddOutgoingStreamsRequest {
                    request_seq,
                    new_streams,
                }
            }
            PARAM_RECONFIG_RESPONSE => {
                if value.len() < 8 {
                    return Err(Error::ErrMalformedChunk(0));
                }
                Param::ReconfigResponse {
                    response_seq: buf.get_u32(),
                    result: buf.get_u32(),
                }
            }
            _ => Param::Unknown {
                typ,
                value: Bytes::copy_from_slice(value),
            },
        })
    }
}

/// An ordered list of parameters with TLV framing.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct ParamSet(pub Vec<Param>);

impl ParamSet {
    pub(crate) fn marshal(&self, buf: &mut BytesMut) {
        for param in &self.0 {
            let value = param.value();
            buf.put_u16(param.typ());
            buf.put_u16((PARAM_HEADER_SIZE + value.len()) as u16);
            buf.put_slice(&value);
            for _ in value.len()..padded(value.len()) {
                buf.put_u8(0);
            }
        }
    }

    pub(crate) fn unmarshal(mut buf: &[u8]) -> Result<Self> {
        let mut params = vec![];
        while buf.has_remaining() {
            if buf.remaining() < PARAM_HEADER_SIZE {
                return Err(Error::ErrMalformedChunk(0));
            }
            let typ = buf.get_u16();
            let length = buf.get_u16() as usize;
            if length < PARAM_HEADER_SIZE || buf.remaining() < length - PARAM_HEADER_SIZE {
                return Err(Error::ErrMalformedChunk(0));
            }
            let value_len = length - PARAM_HEADER_SIZE;
            let value = &buf[..value_len];
            params.push(Param::unmarshal_one(typ, value)?);
            buf.advance(value_len);
            let pad = padded(value_len) - value_len;
            buf.advance(pad.min(buf.remaining()));
        }
        Ok(Self(params))
    }
}
