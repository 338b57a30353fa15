use super::{put_chunk, CT_DATA};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use shared::error::{Error, Result};
use std::fmt;

const FLAG_UNORDERED: u8 = 0x04;
const FLAG_BEGINNING_FRAGMENT: u8 = 0x02;
const FLAG_ENDING_FRAGMENT: u8 = 0x01;

const PAYLOAD_DATA_HEADER_SIZE: usize = 12;

/// The payload protocol identifier carried in every DATA chunk, assigned for
/// WebRTC data channels in RFC 8831.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum PayloadProtocolIdentifier {
    Dcep = 50,
    String = 51,
    Binary = 53,
    StringEmpty = 56,
    BinaryEmpty = 57,
    #[default]
    Unknown = 0,
}

impl From<u32> for PayloadProtocolIdentifier {
    fn from(v: u32) -> Self {
        match v {
            50 => Self::Dcep,
            51 => Self::String,
            53 => Self::Binary,
            56 => Self::StringEmpty,
            57 => Self::BinaryEmpty,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for PayloadProtocolIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Dcep => "WebRTC DCEP",
            Self::String => "WebRTC String",
            Self::Binary => "WebRTC Binary",
            Self::StringEmpty => "WebRTC String (Empty)",
            Self::BinaryEmpty => "WebRTC Binary (Empty)",
            Self::Unknown => "Unknown Payload Protocol Identifier",
        };
        write!(f, "{s}")
    }
}

/// DATA chunk (RFC 4960 Section 3.3.1). In this profile every chunk is a
/// complete message: the beginning and ending fragment flags are always set
/// together and the receiver never reassembles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkData {
    pub unordered: bool,
    pub tsn: u32,
    pub stream_identifier: u16,
    pub stream_sequence_number: u16,
    pub payload_type: PayloadProtocolIdentifier,
    pub user_data: Bytes,
}

impl ChunkData {
    pub(crate) fn marshal(&self, buf: &mut BytesMut) {
        let mut flags = FLAG_BEGINNING_FRAGMENT | FLAG_ENDING_FRAGMENT;
        if self.unordered {
            flags |= FLAG_UNORDERED;
        }

        let mut value = BytesMut::with_capacity(PAYLOAD_DATA_HEADER_SIZE + self.user_data.len());
        value.put_u32(self.tsn);
        value.put_u16(self.stream_identifier);
        value.put_u16(self.stream_sequence_number);
        value.put_u32(self.payload_type as u32);
        value.put_slice(&self.user_data);

        put_chunk(buf, CT_DATA, flags, &value);
    }

    pub(crate) fn unmarshal(flags: u8, value: &[u8]) -> Result<Self> {
        if value.len() < PAYLOAD_DATA_HEADER_SIZE {
            return Err(Error::ErrMalformedChunk(CT_DATA));
        }
        let mut buf = value;
        let tsn = buf.get_u32();
        let stream_identifier = buf.get_u16();
        let stream_sequence_number = buf.get_u16();
        let payload_type = PayloadProtocolIdentifier::from(buf.get_u32());
        let user_data = Bytes::copy_from_slice(buf);

        Ok(Self {
            unordered: flags & FLAG_UNORDERED != 0,
            tsn,
            stream_identifier,
            stream_sequence_number,
            payload_type,
            user_data,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::chunk::Chunk;

    #[test]
    fn test_data_chunk_round_trip() -> Result<()> {
        let chunk = ChunkData {
            unordered: true,
            tsn: 0xfffffffe,
            stream_identifier: 7,
            stream_sequence_number: 0,
            payload_type: PayloadProtocolIdentifier::Binary,
            user_data: Bytes::from_static(&[1, 2, 3]),
        };

        let mut buf = BytesMut::new();
        chunk.marshal(&mut buf);
        // value is padded to a 4-byte boundary
        assert_eq!(buf.len() % 4, 0);

        let parsed = Chunk::unmarshal(&mut buf.freeze())?;
        assert_eq!(parsed, Chunk::Data(chunk));
        Ok(())
    }
}
