//! SHUTDOWN, SHUTDOWN ACK and SHUTDOWN COMPLETE (RFC 4960 Sections
//! 3.3.8/3.3.9/3.3.13) carry no state in this profile; their variants live
//! directly on [Chunk](crate::chunk::Chunk) and are framed in
//! `chunk::mod`. This module exists to keep the chunk inventory explicit.

#[cfg(test)]
mod test {
    use crate::chunk::{Chunk, CT_SHUTDOWN};
    use bytes::BytesMut;
    use shared::error::Result;

    #[test]
    fn test_shutdown_family_round_trip() -> Result<()> {
        for chunk in [Chunk::Shutdown, Chunk::ShutdownAck, Chunk::ShutdownComplete] {
            let mut buf = BytesMut::new();
            chunk.marshal(&mut buf);
            let parsed = Chunk::unmarshal(&mut buf.freeze())?;
            assert_eq!(parsed, chunk);
        }
        Ok(())
    }

    #[test]
    fn test_shutdown_carries_cumulative_tsn_field() {
        let mut buf = BytesMut::new();
        Chunk::Shutdown.marshal(&mut buf);
        assert_eq!(buf[0], CT_SHUTDOWN);
        // type + flags + length + 4-byte cumulative TSN ack field
        assert_eq!(buf.len(), 8);
    }
}
