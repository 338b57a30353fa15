use super::{put_chunk, CT_RECONFIG};
use crate::param::{Param, ParamSet};
use bytes::BytesMut;
use shared::error::Result;

/// RE-CONFIG chunk (RFC 6525 Section 3.1), carrying one or two
/// reconfiguration parameters. This profile uses it for outgoing SSN reset
/// requests, add-outgoing-streams requests, and their responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkReconfig {
    pub params: ParamSet,
}

impl ChunkReconfig {
    pub(crate) fn marshal(&self, buf: &mut BytesMut) {
        let mut value = BytesMut::new();
        self.params.marshal(&mut value);
        put_chunk(buf, CT_RECONFIG, 0, &value);
    }

    pub(crate) fn unmarshal(value: &[u8]) -> Result<Self> {
        Ok(Self {
            params: ParamSet::unmarshal(value)?,
        })
    }

    pub fn first(&self) -> Option<&Param> {
        self.params.0.first()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::chunk::Chunk;

    #[test]
    fn test_reconfig_reset_round_trip() -> Result<()> {
        let chunk = ChunkReconfig {
            params: ParamSet(vec![Param::OutgoingSsnResetRequest {
                request_seq: 1,
                response_seq: 0,
                last_tsn: 42,
                streams: vec![0, 2],
            }]),
        };

        let mut buf = BytesMut::new();
        chunk.marshal(&mut buf);
        let parsed = Chunk::unmarshal(&mut buf.freeze())?;
        assert_eq!(parsed, Chunk::Reconfig(chunk));
        Ok(())
    }

    #[test]
    fn test_reconfig_add_streams_round_trip() -> Result<()> {
        let chunk = ChunkReconfig {
            params: ParamSet(vec![Param::AddOutgoingStreamsRequest {
                request_seq: 9,
                new_streams: 4,
            }]),
        };

        let mut buf = BytesMut::new();
        chunk.marshal(&mut buf);
        let parsed = Chunk::unmarshal(&mut buf.freeze())?;
        assert_eq!(parsed, Chunk::Reconfig(chunk));
        Ok(())
    }
}
