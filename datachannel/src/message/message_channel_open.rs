use bytes::Buf;
use shared::error::{Error, Result};
use shared::marshal::{Marshal, MarshalSize, Unmarshal};

/// Channel types from draft-ietf-rtcweb-data-protocol Section 8.2.2. The
/// transport below is always unreliable in this profile; the channel type is
/// carried for interoperability with conforming peers.
pub const CHANNEL_TYPE_RELIABLE: u8 = 0x00;
pub const CHANNEL_TYPE_RELIABLE_UNORDERED: u8 = 0x80;
pub const CHANNEL_TYPE_PARTIAL_RELIABLE_REXMIT: u8 = 0x01;
pub const CHANNEL_TYPE_PARTIAL_RELIABLE_REXMIT_UNORDERED: u8 = 0x81;
pub const CHANNEL_TYPE_PARTIAL_RELIABLE_TIMED: u8 = 0x02;
pub const CHANNEL_TYPE_PARTIAL_RELIABLE_TIMED_UNORDERED: u8 = 0x82;

const CHANNEL_OPEN_HEADER_LEN: usize = 11;

/// DATA_CHANNEL_OPEN message body (the leading type octet is framed by
/// [Message](super::Message)).
#[derive(Eq, PartialEq, Clone, Debug)]
pub struct DataChannelOpen {
    pub channel_type: u8,
    pub priority: u16,
    pub reliability_parameter: u32,
    pub label: Vec<u8>,
    pub protocol: Vec<u8>,
}

impl DataChannelOpen {
    pub fn unordered(&self) -> bool {
        self.channel_type & 0x80 != 0
    }
}

impl MarshalSize for DataChannelOpen {
    fn marshal_size(&self) -> usize {
        CHANNEL_OPEN_HEADER_LEN + self.label.len() + self.protocol.len()
    }
}

impl Marshal for DataChannelOpen {
    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize> {
        let required = self.marshal_size();
        if buf.len() < required {
            return Err(Error::UnexpectedEndOfBuffer {
                expected: required,
                actual: buf.len(),
            });
        }

        buf[0] = self.channel_type;
        buf[1..3].copy_from_slice(&self.priority.to_be_bytes());
        buf[3..7].copy_from_slice(&self.reliability_parameter.to_be_bytes());
        buf[7..9].copy_from_slice(&(self.label.len() as u16).to_be_bytes());
        buf[9..11].copy_from_slice(&(self.protocol.len() as u16).to_be_bytes());
        let label_end = CHANNEL_OPEN_HEADER_LEN + self.label.len();
        buf[CHANNEL_OPEN_HEADER_LEN..label_end].copy_from_slice(&self.label);
        buf[label_end..label_end + self.protocol.len()].copy_from_slice(&self.protocol);

        Ok(required)
    }
}

impl Unmarshal for DataChannelOpen {
    fn unmarshal<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        if buf.remaining() < CHANNEL_OPEN_HEADER_LEN {
            return Err(Error::UnexpectedEndOfBuffer {
                expected: CHANNEL_OPEN_HEADER_LEN,
                actual: buf.remaining(),
            });
        }

        let channel_type = buf.get_u8();
        let priority = buf.get_u16();
        let reliability_parameter = buf.get_u32();
        let label_len = buf.get_u16() as usize;
        let protocol_len = buf.get_u16() as usize;

        if buf.remaining() < label_len + protocol_len {
            return Err(Error::UnexpectedEndOfBuffer {
                expected: label_len + protocol_len,
                actual: buf.remaining(),
            });
        }

        let mut label = vec![0u8; label_len];
        buf.copy_to_slice(&mut label);
        let mut protocol = vec![0u8; protocol_len];
        buf.copy_to_slice(&mut protocol);

        Ok(Self {
            channel_type,
            priority,
            reliability_parameter,
            label,
            protocol,
        })
    }
}
