use bytes::{Buf, BufMut, Bytes, BytesMut};
use shared::error::{Error, Result};

pub const RECORD_HEADER_SIZE: usize = 13;
/// Sequence numbers are 48 bits; overflow requires re-keying which the
/// profile does not do, so it closes the transport instead.
pub const MAX_SEQUENCE_NUMBER: u64 = (1 << 48) - 1;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
}

impl TryFrom<u8> for ContentType {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            20 => Ok(Self::ChangeCipherSpec),
            21 => Ok(Self::Alert),
            22 => Ok(Self::Handshake),
            23 => Ok(Self::ApplicationData),
            _ => Err(Error::ErrUnsupportedProtocolVersion),
        }
    }
}

/// DTLSPlaintext/DTLSCiphertext record header (RFC 6347 Section 4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub content_type: ContentType,
    pub version: u16,
    pub epoch: u16,
    pub sequence_number: u64,
    pub length: u16,
}

impl RecordHeader {
    pub fn marshal(&self, buf: &mut BytesMut) {
        buf.put_u8(self.content_type as u8);
        buf.put_u16(self.version);
        buf.put_u16(self.epoch);
        // 48-bit sequence number
        buf.put_slice(&self.sequence_number.to_be_bytes()[2..]);
        buf.put_u16(self.length);
    }

    pub fn unmarshal<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < RECORD_HEADER_SIZE {
            return Err(Error::ErrUnexpectedEof);
        }
        let content_type = ContentType::try_from(buf.get_u8())?;
        let version = buf.get_u16();
        let epoch = buf.get_u16();
        let mut seq = [0u8; 8];
        buf.copy_to_slice(&mut seq[2..]);
        let sequence_number = u64::from_be_bytes(seq);
        let length = buf.get_u16();
        Ok(Self {
            content_type,
            version,
            epoch,
            sequence_number,
            length,
        })
    }
}

/// One parsed record: header plus its (possibly still encrypted) payload.
#[derive(Debug, Clone)]
pub struct Record {
    pub header: RecordHeader,
    pub payload: Bytes,
}

impl Record {
    pub fn marshal(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(RECORD_HEADER_SIZE + self.payload.len());
        let mut header = self.header.clone();
        header.length = self.payload.len() as u16;
        header.marshal(&mut buf);
        buf.put_slice(&self.payload);
        buf
    }

    /// Splits a datagram into records; trailing garbage is an error.
    pub fn unmarshal_datagram(raw: &[u8]) -> Result<Vec<Record>> {
        let mut buf = raw;
        let mut records = vec![];
        while buf.has_remaining() {
            let header = RecordHeader::unmarshal(&mut buf)?;
            let length = header.length as usize;
            if buf.remaining() < length {
                return Err(Error::ErrUnexpectedEof);
            }
            let payload = Bytes::copy_from_slice(&buf[..length]);
            buf.advance(length);
            records.push(Record { header, payload });
        }
        Ok(records)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_record_round_trip() -> Result<()> {
        let record = Record {
            header: RecordHeader {
                content_type: ContentType::Handshake,
                version: crate::PROTOCOL_VERSION,
                epoch: 0,
                sequence_number: 0x0000_0102_0304_0506 & MAX_SEQUENCE_NUMBER,
                length: 0,
            },
            payload: Bytes::from_static(&[9, 9, 9]),
        };

        let raw = record.marshal();
        assert_eq!(raw.len(), RECORD_HEADER_SIZE + 3);

        let parsed = Record::unmarshal_datagram(&raw)?;
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].header.content_type, ContentType::Handshake);
        assert_eq!(parsed[0].header.sequence_number, 0x0102_0304_0506);
        assert_eq!(parsed[0].payload.as_ref(), &[9, 9, 9]);
        Ok(())
    }

    #[test]
    fn test_multiple_records_per_datagram() -> Result<()> {
        let a = Record {
            header: RecordHeader {
                content_type: ContentType::ChangeCipherSpec,
                version: crate::PROTOCOL_VERSION,
                epoch: 0,
                sequence_number: 5,
                length: 0,
            },
            payload: Bytes::from_static(&[1]),
        };
        let b = Record {
            header: RecordHeader {
                content_type: ContentType::ApplicationData,
                version: crate::PROTOCOL_VERSION,
                epoch: 1,
                sequence_number: 0,
                length: 0,
            },
            payload: Bytes::from_static(&[2, 3]),
        };

        let mut datagram = a.marshal();
        datagram.extend_from_slice(&b.marshal());

        let parsed = Record::unmarshal_datagram(&datagram)?;
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].header.epoch, 1);
        Ok(())
    }

    #[test]
    fn test_truncated_record_rejected() {
        let record = Record {
            header: RecordHeader {
                content_type: ContentType::Handshake,
                version: crate::PROTOCOL_VERSION,
                epoch: 0,
                sequence_number: 1,
                length: 0,
            },
            payload: Bytes::from_static(&[1, 2, 3, 4]),
        };
        let raw = record.marshal();
        assert!(Record::unmarshal_datagram(&raw[..raw.len() - 1]).is_err());
    }
}
