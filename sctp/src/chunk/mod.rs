pub mod chunk_cookie;
pub mod chunk_data;
pub mod chunk_error;
pub mod chunk_init;
pub mod chunk_reconfig;
pub mod chunk_sack;
pub mod chunk_shutdown;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use shared::error::{Error, Result};

pub const CT_DATA: u8 = 0;
pub const CT_INIT: u8 = 1;
pub const CT_INIT_ACK: u8 = 2;
pub const CT_SACK: u8 = 3;
pub const CT_HEARTBEAT: u8 = 4;
pub const CT_HEARTBEAT_ACK: u8 = 5;
pub const CT_ABORT: u8 = 6;
pub const CT_SHUTDOWN: u8 = 7;
pub const CT_SHUTDOWN_ACK: u8 = 8;
pub const CT_ERROR: u8 = 9;
pub const CT_COOKIE_ECHO: u8 = 10;
pub const CT_COOKIE_ACK: u8 = 11;
pub const CT_SHUTDOWN_COMPLETE: u8 = 14;
pub const CT_RECONFIG: u8 = 130;
pub const CT_FORWARD_TSN: u8 = 192;

pub(crate) const CHUNK_HEADER_SIZE: usize = 4;

/// Rounds a TLV length up to its 4-byte padded size.
pub(crate) fn padded(len: usize) -> usize {
    (len + 3) & !3
}

/// Appends one chunk TLV (type, flags, length, padded value).
pub(crate) fn put_chunk(buf: &mut BytesMut, typ: u8, flags: u8, value: &[u8]) {
    buf.put_u8(typ);
    buf.put_u8(flags);
    buf.put_u16((CHUNK_HEADER_SIZE + value.len()) as u16);
    buf.put_slice(value);
    for _ in value.len()..padded(value.len()) {
        buf.put_u8(0);
    }
}

/// A single chunk parsed out of an SCTP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Data(chunk_data::ChunkData),
    /// INIT and INIT_ACK share a wire layout.
    Init(chunk_init::ChunkInit),
    Sack(chunk_sack::ChunkSack),
    Abort(chunk_error::ChunkAbort),
    Error(chunk_error::ChunkError),
    CookieEcho(chunk_cookie::ChunkCookieEcho),
    CookieAck,
    Shutdown,
    ShutdownAck,
    ShutdownComplete,
    Reconfig(chunk_reconfig::ChunkReconfig),
    /// Unrecognized chunk types are carried opaquely and dropped upstream.
    Unknown { typ: u8, flags: u8, value: Bytes },
}

impl Chunk {
    pub fn chunk_type(&self) -> u8 {
        match self {
            Chunk::Data(_) => CT_DATA,
            Chunk::Init(init) => {
                if init.is_ack {
                    CT_INIT_ACK
                } else {
                    CT_INIT
                }
            }
            Chunk::Sack(_) => CT_SACK,
            Chunk::Abort(_) => CT_ABORT,
            Chunk::Error(_) => CT_ERROR,
            Chunk::CookieEcho(_) => CT_COOKIE_ECHO,
            Chunk::CookieAck => CT_COOKIE_ACK,
            Chunk::Shutdown => CT_SHUTDOWN,
            Chunk::ShutdownAck => CT_SHUTDOWN_ACK,
            Chunk::ShutdownComplete => CT_SHUTDOWN_COMPLETE,
            Chunk::Reconfig(_) => CT_RECONFIG,
            Chunk::Unknown { typ, .. } => *typ,
        }
    }

    pub(crate) fn marshal(&self, buf: &mut BytesMut) {
        match self {
            Chunk::Data(c) => c.marshal(buf),
            Chunk::Init(c) => c.marshal(buf),
            Chunk::Sack(c) => c.marshal(buf),
            Chunk::Abort(c) => c.marshal(buf),
            Chunk::Error(c) => c.marshal(buf),
            Chunk::CookieEcho(c) => c.marshal(buf),
            Chunk::CookieAck => put_chunk(buf, CT_COOKIE_ACK, 0, &[]),
            Chunk::Shutdown => {
                // the reduced profile carries no cumulative TSN in SHUTDOWN;
                // the field is still present on the wire
                put_chunk(buf, CT_SHUTDOWN, 0, &0u32.to_be_bytes())
            }
            Chunk::ShutdownAck => put_chunk(buf, CT_SHUTDOWN_ACK, 0, &[]),
            Chunk::ShutdownComplete => put_chunk(buf, CT_SHUTDOWN_COMPLETE, 0, &[]),
            Chunk::Reconfig(c) => c.marshal(buf),
            Chunk::Unknown { typ, flags, value } => put_chunk(buf, *typ, *flags, value),
        }
    }

    /// Parses one chunk TLV, consuming its padding.
    pub(crate) fn unmarshal<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < CHUNK_HEADER_SIZE {
            return Err(Error::ErrPacketTooShort);
        }
        let typ = buf.get_u8();
        let flags = buf.get_u8();
        let length = buf.get_u16() as usize;
        if length < CHUNK_HEADER_SIZE {
            return Err(Error::ErrMalformedChunk(typ));
        }
        let value_len = length - CHUNK_HEADER_SIZE;
        if buf.remaining() < value_len {
            return Err(Error::ErrMalformedChunk(typ));
        }
        let value = buf.copy_to_bytes(value_len);
        let padding = padded(value_len) - value_len;
        if buf.remaining() < padding {
            return Err(Error::ErrMalformedChunk(typ));
        }
        buf.advance(padding);

        Ok(match typ {
            CT_DATA => Chunk::Data(chunk_data::ChunkData::unmarshal(flags, &value)?),
            CT_INIT => Chunk::Init(chunk_init::ChunkInit::unmarshal(false, &value)?),
            CT_INIT_ACK => Chunk::Init(chunk_init::ChunkInit::unmarshal(true, &value)?),
            CT_SACK => Chunk::Sack(chunk_sack::ChunkSack::unmarshal(&value)?),
            CT_ABORT => Chunk::Abort(chunk_error::ChunkAbort::unmarshal(&value)?),
            CT_ERROR => Chunk::Error(chunk_error::ChunkError::unmarshal(&value)?),
            CT_COOKIE_ECHO => {
                Chunk::CookieEcho(chunk_cookie::ChunkCookieEcho { cookie: value })
            }
            CT_COOKIE_ACK => Chunk::CookieAck,
            CT_SHUTDOWN => Chunk::Shutdown,
            CT_SHUTDOWN_ACK => Chunk::ShutdownAck,
            CT_SHUTDOWN_COMPLETE => Chunk::ShutdownComplete,
            CT_RECONFIG => Chunk::Reconfig(chunk_reconfig::ChunkReconfig::unmarshal(&value)?),
            _ => Chunk::Unknown { typ, flags, value },
        })
    }
}
