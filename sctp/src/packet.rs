use crate::chunk::Chunk;
use bytes::{Buf, BufMut, BytesMut};
use crc::{Crc, CRC_32_ISCSI};
use shared::error::{Error, Result};

pub(crate) const COMMON_HEADER_SIZE: usize = 12;

const CRC32C: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// An SCTP packet: the common header followed by one or more chunks
/// (RFC 4960 Section 3). The checksum is CRC-32C, stored in the byte order
/// of RFC 4960 Appendix B.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub source_port: u16,
    pub destination_port: u16,
    /// Zero only on a packet carrying INIT; otherwise the peer's
    /// initiate tag.
    pub verification_tag: u32,
    pub chunks: Vec<Chunk>,
}

impl Packet {
    pub fn marshal(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(COMMON_HEADER_SIZE);
        buf.put_u16(self.source_port);
        buf.put_u16(self.destination_port);
        buf.put_u32(self.verification_tag);
        buf.put_u32(0); // checksum placeholder

        for chunk in &self.chunks {
            chunk.marshal(&mut buf);
        }

        let checksum = CRC32C.checksum(&buf);
        buf[8..12].copy_from_slice(&checksum.to_le_bytes());
        buf
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        if raw.len() < COMMON_HEADER_SIZE {
            return Err(Error::ErrPacketTooShort);
        }

        let mut zeroed = raw.to_vec();
        let stored = u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]);
        zeroed[8..12].copy_from_slice(&[0, 0, 0, 0]);
        if CRC32C.checksum(&zeroed) != stored {
            return Err(Error::ErrChecksumMismatch);
        }

        let mut buf = &raw[..];
        let source_port = buf.get_u16();
        let destination_port = buf.get_u16();
        let verification_tag = buf.get_u32();
        buf.advance(4); // checksum

        let mut chunks = vec![];
        while buf.has_remaining() {
            chunks.push(Chunk::unmarshal(&mut buf)?);
        }
        if chunks.is_empty() {
            return Err(Error::ErrPacketTooShort);
        }

        Ok(Self {
            source_port,
            destination_port,
            verification_tag,
            chunks,
        })
    }

    /// The chunk type of the first chunk, used for verification-tag rules.
    pub fn first_chunk_type(&self) -> u8 {
        self.chunks[0].chunk_type()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::chunk::chunk_data::{ChunkData, PayloadProtocolIdentifier};
    use bytes::Bytes;

    fn data_packet() -> Packet {
        Packet {
            source_port: 5000,
            destination_port: 5000,
            verification_tag: 0x01020304,
            chunks: vec![Chunk::Data(ChunkData {
                unordered: true,
                tsn: 1,
                stream_identifier: 0,
                stream_sequence_number: 0,
                payload_type: PayloadProtocolIdentifier::Binary,
                user_data: Bytes::from_static(&[0xde, 0xad]),
            })],
        }
    }

    #[test]
    fn test_packet_round_trip() -> Result<()> {
        let packet = data_packet();
        let raw = packet.marshal();
        let parsed = Packet::unmarshal(&raw)?;
        assert_eq!(parsed, packet);

        // serialize-again law
        assert_eq!(parsed.marshal(), raw);
        Ok(())
    }

    #[test]
    fn test_checksum_is_verified() {
        let mut raw = data_packet().marshal();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        assert_eq!(
            Packet::unmarshal(&raw).err(),
            Some(Error::ErrChecksumMismatch)
        );
    }

    #[test]
    fn test_short_packet_is_rejected() {
        assert_eq!(
            Packet::unmarshal(&[0u8; 4]).err(),
            Some(Error::ErrPacketTooShort)
        );
    }
}
