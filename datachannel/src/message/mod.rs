pub mod message_channel_ack;
pub mod message_channel_open;
pub mod message_type;

use bytes::Buf;
use message_channel_ack::*;
use message_channel_open::*;
use message_type::*;
use shared::error::Result;
use shared::marshal::{Marshal, MarshalSize, Unmarshal};

/// A parsed DCEP message.
#[derive(Eq, PartialEq, Clone, Debug)]
pub enum Message {
    DataChannelAck(DataChannelAck),
    DataChannelOpen(DataChannelOpen),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::DataChannelAck(_) => MessageType::DataChannelAck,
            Self::DataChannelOpen(_) => MessageType::DataChannelOpen,
        }
    }
}

impl MarshalSize for Message {
    fn marshal_size(&self) -> usize {
        match self {
            Message::DataChannelAck(m) => m.marshal_size() + MESSAGE_TYPE_LEN,
            Message::DataChannelOpen(m) => m.marshal_size() + MESSAGE_TYPE_LEN,
        }
    }
}

impl Marshal for Message {
    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize> {
        let mut bytes_written = 0;
        let n = self.message_type().marshal_to(buf)?;
        let buf = &mut buf[n..];
        bytes_written += n;
        bytes_written += match self {
            Message::DataChannelAck(_) => 0,
            Message::DataChannelOpen(open) => open.marshal_to(buf)?,
        };
        Ok(bytes_written)
    }
}

impl Unmarshal for Message {
    fn unmarshal<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        match MessageType::unmarshal(buf)? {
            MessageType::DataChannelAck => Ok(Self::DataChannelAck(DataChannelAck::unmarshal(buf)?)),
            MessageType::DataChannelOpen => {
                Ok(Self::DataChannelOpen(DataChannelOpen::unmarshal(buf)?))
            }
        }
    }
}

#[cfg(test)]
mod message_test {
    use super::*;
    use shared::error::Error;

    #[test]
    fn test_channel_open_round_trip() -> Result<()> {
        let open = Message::DataChannelOpen(DataChannelOpen {
            channel_type: CHANNEL_TYPE_PARTIAL_RELIABLE_REXMIT_UNORDERED,
            priority: 0,
            reliability_parameter: 0,
            label: b"t".to_vec(),
            protocol: vec![],
        });

        let raw = open.marshal()?;
        let mut buf = &raw[..];
        let parsed = Message::unmarshal(&mut buf)?;
        assert_eq!(parsed, open);
        Ok(())
    }

    #[test]
    fn test_channel_ack_round_trip() -> Result<()> {
        let ack = Message::DataChannelAck(DataChannelAck);
        let raw = ack.marshal()?;
        assert_eq!(raw.len(), 1);
        let mut buf = &raw[..];
        assert_eq!(Message::unmarshal(&mut buf)?, ack);
        Ok(())
    }

    #[test]
    fn test_unknown_message_type_rejected() {
        let raw = [0x07u8];
        let mut buf = &raw[..];
        assert_eq!(
            Message::unmarshal(&mut buf).err(),
            Some(Error::ErrInvalidMessageType(0x07))
        );
    }

    #[test]
    fn test_unordered_flag() {
        let open = DataChannelOpen {
            channel_type: CHANNEL_TYPE_PARTIAL_RELIABLE_REXMIT_UNORDERED,
            priority: 0,
            reliability_parameter: 0,
            label: vec![],
            protocol: vec![],
        };
        assert!(open.unordered());

        let open = DataChannelOpen {
            channel_type: CHANNEL_TYPE_RELIABLE,
            ..open
        };
        assert!(!open.unordered());
    }
}
