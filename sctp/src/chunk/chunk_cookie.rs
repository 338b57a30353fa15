use super::{put_chunk, CT_COOKIE_ECHO};
use bytes::{Bytes, BytesMut};

/// COOKIE ECHO chunk (RFC 4960 Section 3.3.11): the state cookie from
/// INIT_ACK reflected verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkCookieEcho {
    pub cookie: Bytes,
}

impl ChunkCookieEcho {
    pub(crate) fn marshal(&self, buf: &mut BytesMut) {
        put_chunk(buf, CT_COOKIE_ECHO, 0, &self.cookie);
    }
}
