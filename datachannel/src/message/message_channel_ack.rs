use bytes::Buf;
use shared::error::Result;
use shared::marshal::{Marshal, MarshalSize, Unmarshal};

/// DATA_CHANNEL_ACK carries no body.
#[derive(Eq, PartialEq, Copy, Clone, Debug, Default)]
pub struct DataChannelAck;

impl MarshalSize for DataChannelAck {
    fn marshal_size(&self) -> usize {
        0
    }
}

impl Marshal for DataChannelAck {
    fn marshal_to(&self, _buf: &mut [u8]) -> Result<usize> {
        Ok(0)
    }
}

impl Unmarshal for DataChannelAck {
    fn unmarshal<B>(_buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        Ok(Self)
    }
}
