use super::message::{DTLSMessage, RTCMessage, STUNMessage, TaggedRTCMessage};
use log::{debug, error};
use shared::error::Result;
use shared::util::{match_dtls, match_stun};
use shared::Transmit;
use std::collections::VecDeque;

/// Demuxer classifies datagrams on the nominated flow by their first byte
/// (RFC 7983): 0..3 is STUN, 20..63 is DTLS, anything else is dropped
/// because only DTLS runs above ICE in this profile.
#[derive(Default)]
pub(crate) struct DemuxerHandlerContext {
    pub(crate) read_outs: VecDeque<TaggedRTCMessage>,
    pub(crate) write_outs: VecDeque<TaggedRTCMessage>,
}

pub(crate) struct DemuxerHandler<'a> {
    ctx: &'a mut DemuxerHandlerContext,
}

impl<'a> DemuxerHandler<'a> {
    pub(crate) fn new(ctx: &'a mut DemuxerHandlerContext) -> Self {
        DemuxerHandler { ctx }
    }

    pub(crate) fn handle_read(&mut self, msg: TaggedRTCMessage) -> Result<()> {
        if let RTCMessage::Raw(message) = msg.message {
            if message.is_empty() {
                error!("drop invalid packet due to zero length");
            } else if match_dtls(&message) {
                self.ctx.read_outs.push_back(Transmit {
                    now: msg.now,
                    transport: msg.transport,
                    message: RTCMessage::Dtls(DTLSMessage::Raw(message)),
                });
            } else if match_stun(&message) {
                self.ctx.read_outs.push_back(Transmit {
                    now: msg.now,
                    transport: msg.transport,
                    message: RTCMessage::Stun(STUNMessage::Raw(message)),
                });
            } else {
                debug!(
                    "drop unclassified packet (first byte {}) from {}",
                    message[0], msg.transport.peer_addr
                );
            }
        } else {
            debug!("drop non-RAW packet {:?}", msg.message);
        }

        Ok(())
    }

    pub(crate) fn poll_read(&mut self) -> Option<TaggedRTCMessage> {
        self.ctx.read_outs.pop_front()
    }

    pub(crate) fn handle_write(&mut self, msg: TaggedRTCMessage) -> Result<()> {
        match msg.message {
            RTCMessage::Stun(STUNMessage::Raw(message))
            | RTCMessage::Dtls(DTLSMessage::Raw(message)) => {
                self.ctx.write_outs.push_back(Transmit {
                    now: msg.now,
                    transport: msg.transport,
                    message: RTCMessage::Raw(message),
                })
            }
            _ => {
                debug!("drop non-RAW packet {:?}", msg.message);
            }
        }

        Ok(())
    }

    pub(crate) fn poll_write(&mut self) -> Option<TaggedRTCMessage> {
        self.ctx.write_outs.pop_front()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::BytesMut;
    use shared::TransportContext;
    use std::time::Instant;

    fn raw(first_byte: u8) -> TaggedRTCMessage {
        let mut payload = BytesMut::new();
        payload.extend_from_slice(&[first_byte, 0, 0, 0]);
        Transmit {
            now: Instant::now(),
            transport: TransportContext::default(),
            message: RTCMessage::Raw(payload),
        }
    }

    #[test]
    fn test_classification() -> Result<()> {
        let mut ctx = DemuxerHandlerContext::default();
        let mut demuxer = DemuxerHandler::new(&mut ctx);

        demuxer.handle_read(raw(0))?;
        assert!(matches!(
            demuxer.poll_read().unwrap().message,
            RTCMessage::Stun(STUNMessage::Raw(_))
        ));

        demuxer.handle_read(raw(20))?;
        assert!(matches!(
            demuxer.poll_read().unwrap().message,
            RTCMessage::Dtls(DTLSMessage::Raw(_))
        ));
        demuxer.handle_read(raw(63))?;
        assert!(demuxer.poll_read().is_some());

        // 64..127 and RTP-range bytes are dropped in this profile
        demuxer.handle_read(raw(64))?;
        demuxer.handle_read(raw(128))?;
        assert!(demuxer.poll_read().is_none());
        Ok(())
    }
}
