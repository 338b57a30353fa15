use super::{put_chunk, CT_SACK};
use bytes::{Buf, BufMut, BytesMut};
use shared::error::{Error, Result};

const SACK_FIXED_SIZE: usize = 12;

/// SACK chunk (RFC 4960 Section 3.3.4). This profile parses inbound SACKs so
/// conforming peers do not confuse the demultiplexer, but their content is
/// ignored and the association never emits one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSack {
    pub cumulative_tsn_ack: u32,
    pub advertised_receiver_window_credit: u32,
    pub gap_ack_blocks: Vec<(u16, u16)>,
    pub duplicate_tsns: Vec<u32>,
}

impl ChunkSack {
    pub(crate) fn marshal(&self, buf: &mut BytesMut) {
        let mut value = BytesMut::with_capacity(
            SACK_FIXED_SIZE + 4 * self.gap_ack_blocks.len() + 4 * self.duplicate_tsns.len(),
        );
        value.put_u32(self.cumulative_tsn_ack);
        value.put_u32(self.advertised_receiver_window_credit);
        value.put_u16(self.gap_ack_blocks.len() as u16);
        value.put_u16(self.duplicate_tsns.len() as u16);
        for (start, end) in &self.gap_ack_blocks {
            value.put_u16(*start);
            value.put_u16(*end);
        }
        for tsn in &self.duplicate_tsns {
            value.put_u32(*tsn);
        }
        put_chunk(buf, CT_SACK, 0, &value);
    }

    pub(crate) fn unmarshal(value: &[u8]) -> Result<Self> {
        if value.len() < SACK_FIXED_SIZE {
            return Err(Error::ErrMalformedChunk(CT_SACK));
        }
        let mut buf = value;
        let cumulative_tsn_ack = buf.get_u32();
        let advertised_receiver_window_credit = buf.get_u32();
        let num_gap_blocks = buf.get_u16() as usize;
        let num_duplicates = buf.get_u16() as usize;
        if buf.remaining() < 4 * num_gap_blocks + 4 * num_duplicates {
            return Err(Error::ErrMalformedChunk(CT_SACK));
        }

        let mut gap_ack_blocks = Vec::with_capacity(num_gap_blocks);
        for _ in 0..num_gap_blocks {
            gap_ack_blocks.push((buf.get_u16(), buf.get_u16()));
        }
        let mut duplicate_tsns = Vec::with_capacity(num_duplicates);
        for _ in 0..num_duplicates {
            duplicate_tsns.push(buf.get_u32());
        }

        Ok(Self {
            cumulative_tsn_ack,
            advertised_receiver_window_credit,
            gap_ack_blocks,
            duplicate_tsns,
        })
    }
}
