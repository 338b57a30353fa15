use super::{put_chunk, CT_INIT, CT_INIT_ACK};
use crate::param::{Param, ParamSet};
use bytes::{Buf, BufMut, BytesMut};
use shared::error::{Error, Result};

const INIT_CHUNK_FIXED_SIZE: usize = 16;

/// INIT and INIT_ACK chunk (RFC 4960 Sections 3.3.2/3.3.3); both share the
/// same fixed layout followed by optional parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInit {
    pub is_ack: bool,
    /// The tag the peer must place in the common header of every packet sent
    /// to the sender of this INIT.
    pub initiate_tag: u32,
    pub advertised_receiver_window_credit: u32,
    pub num_outbound_streams: u16,
    pub num_inbound_streams: u16,
    pub initial_tsn: u32,
    pub params: ParamSet,
}

impl ChunkInit {
    pub(crate) fn marshal(&self, buf: &mut BytesMut) {
        let mut value = BytesMut::with_capacity(INIT_CHUNK_FIXED_SIZE);
        value.put_u32(self.initiate_tag);
        value.put_u32(self.advertised_receiver_window_credit);
        value.put_u16(self.num_outbound_streams);
        value.put_u16(self.num_inbound_streams);
        value.put_u32(self.initial_tsn);
        self.params.marshal(&mut value);

        let typ = if self.is_ack { CT_INIT_ACK } else { CT_INIT };
        put_chunk(buf, typ, 0, &value);
    }

    pub(crate) fn unmarshal(is_ack: bool, value: &[u8]) -> Result<Self> {
        if value.len() < INIT_CHUNK_FIXED_SIZE {
            return Err(Error::ErrMalformedChunk(if is_ack {
                CT_INIT_ACK
            } else {
                CT_INIT
            }));
        }
        let mut buf = value;
        let initiate_tag = buf.get_u32();
        let advertised_receiver_window_credit = buf.get_u32();
        let num_outbound_streams = buf.get_u16();
        let num_inbound_streams = buf.get_u16();
        let initial_tsn = buf.get_u32();
        let params = ParamSet::unmarshal(buf)?;

        Ok(Self {
            is_ack,
            initiate_tag,
            advertised_receiver_window_credit,
            num_outbound_streams,
            num_inbound_streams,
            initial_tsn,
            params,
        })
    }

    /// The state cookie parameter; mandatory in INIT_ACK.
    pub fn cookie(&self) -> Option<&[u8]> {
        self.params.0.iter().find_map(|p| match p {
            Param::StateCookie(cookie) => Some(cookie.as_ref()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::chunk::Chunk;
    use crate::param::Param;
    use bytes::Bytes;

    #[test]
    fn test_init_round_trip() -> Result<()> {
        let init = ChunkInit {
            is_ack: false,
            initiate_tag: 0xdeadbeef,
            advertised_receiver_window_credit: 1024 * 1024,
            num_outbound_streams: 16,
            num_inbound_streams: 16,
            initial_tsn: 12345,
            params: ParamSet(vec![
                Param::ForwardTsnSupported,
                Param::SupportedExtensions(vec![
                    crate::chunk::CT_FORWARD_TSN,
                    crate::chunk::CT_RECONFIG,
                ]),
            ]),
        };

        let mut buf = BytesMut::new();
        init.marshal(&mut buf);
        let parsed = Chunk::unmarshal(&mut buf.freeze())?;
        assert_eq!(parsed, Chunk::Init(init));
        Ok(())
    }

    #[test]
    fn test_init_ack_cookie_access() -> Result<()> {
        let init_ack = ChunkInit {
            is_ack: true,
            initiate_tag: 1,
            advertised_receiver_window_credit: 1500,
            num_outbound_streams: 1,
            num_inbound_streams: 1,
            initial_tsn: 0,
            params: ParamSet(vec![Param::StateCookie(Bytes::from_static(&[9u8; 24]))]),
        };

        let mut buf = BytesMut::new();
        init_ack.marshal(&mut buf);
        if let Chunk::Init(parsed) = Chunk::unmarshal(&mut buf.freeze())? {
            assert!(parsed.is_ack);
            assert_eq!(parsed.cookie(), Some(&[9u8; 24][..]));
        } else {
            panic!("expected INIT_ACK");
        }
        Ok(())
    }
}
