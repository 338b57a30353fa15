use super::message::{RTCMessage, STUNMessage, TaggedRTCMessage};
use bytes::BytesMut;
use log::{debug, warn};
use shared::error::Result;
use shared::Transmit;
use std::collections::VecDeque;
use stun::message::Message;

/// StunHandler decodes raw STUN datagrams for the ICE stage above and
/// serializes outbound STUN messages.
#[derive(Default)]
pub(crate) struct StunHandlerContext {
    pub(crate) read_outs: VecDeque<TaggedRTCMessage>,
    pub(crate) write_outs: VecDeque<TaggedRTCMessage>,
}

pub(crate) struct StunHandler<'a> {
    ctx: &'a mut StunHandlerContext,
}

impl<'a> StunHandler<'a> {
    pub(crate) fn new(ctx: &'a mut StunHandlerContext) -> Self {
        StunHandler { ctx }
    }

    pub(crate) fn handle_read(&mut self, msg: TaggedRTCMessage) -> Result<()> {
        if let RTCMessage::Stun(STUNMessage::Raw(message)) = msg.message {
            let try_read = || -> Result<Message> {
                let mut stun_message = Message {
                    raw: message.to_vec(),
                    ..Default::default()
                };
                stun_message.decode()?;
                debug!(
                    "StunMessage type {} received from {}",
                    stun_message.typ, msg.transport.peer_addr
                );
                Ok(stun_message)
            };

            match try_read() {
                Ok(stun_message) => {
                    self.ctx.read_outs.push_back(Transmit {
                        now: msg.now,
                        transport: msg.transport,
                        message: RTCMessage::Stun(STUNMessage::Stun(Box::new(stun_message))),
                    });
                }
                Err(err) => {
                    warn!("try_read got error {}", err);
                    return Err(err);
                }
            }
        } else {
            debug!("bypass StunHandler read for {}", msg.transport.peer_addr);
            self.ctx.read_outs.push_back(msg);
        }
        Ok(())
    }

    pub(crate) fn poll_read(&mut self) -> Option<TaggedRTCMessage> {
        self.ctx.read_outs.pop_front()
    }

    pub(crate) fn handle_write(&mut self, msg: TaggedRTCMessage) -> Result<()> {
        if let RTCMessage::Stun(STUNMessage::Stun(mut stun_message)) = msg.message {
            debug!(
                "StunMessage type {} sent to {}",
                stun_message.typ, msg.transport.peer_addr
            );
            stun_message.encode();
            let message = BytesMut::from(&stun_message.raw[..]);
            self.ctx.write_outs.push_back(Transmit {
                now: msg.now,
                transport: msg.transport,
                message: RTCMessage::Stun(STUNMessage::Raw(message)),
            });
        } else {
            debug!("bypass StunHandler write for {}", msg.transport.peer_addr);
            self.ctx.write_outs.push_back(msg);
        }
        Ok(())
    }

    pub(crate) fn poll_write(&mut self) -> Option<TaggedRTCMessage> {
        self.ctx.write_outs.pop_front()
    }
}
