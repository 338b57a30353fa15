use super::message::{DTLSMessage, DataChannelMessage, RTCMessage, TaggedRTCMessage};
use bytes::BytesMut;
use log::{debug, warn};
use sctp::{Association, AssociationEvent};
use shared::error::{Error, Result};
use shared::Transmit;
use std::collections::VecDeque;
use std::time::Instant;

/// SctpHandler runs the reduced association over the DTLS datagram channel.
#[derive(Default)]
pub(crate) struct SctpHandlerContext {
    pub(crate) association: Option<Association>,
    /// True once ESTABLISHED was reported upward.
    pub(crate) connected_signaled: bool,
    /// Set when the association reached CLOSED.
    pub(crate) closed: bool,
    /// Streams the peer reset, pending delivery upward.
    pub(crate) reset_streams: Vec<u16>,

    pub(crate) read_outs: VecDeque<TaggedRTCMessage>,
    pub(crate) write_outs: VecDeque<TaggedRTCMessage>,
}

pub(crate) struct SctpHandler<'a> {
    ctx: &'a mut SctpHandlerContext,
}

impl<'a> SctpHandler<'a> {
    pub(crate) fn new(ctx: &'a mut SctpHandlerContext) -> Self {
        SctpHandler { ctx }
    }

    pub(crate) fn handle_read(&mut self, msg: TaggedRTCMessage) -> Result<()> {
        if let RTCMessage::Dtls(DTLSMessage::Raw(sctp_packet)) = msg.message {
            debug!("recv sctp RAW from {}", msg.transport.peer_addr);
            let Some(association) = self.ctx.association.as_mut() else {
                warn!("drop sctp RAW, association not ready yet");
                return Ok(());
            };

            association.handle_read(msg.now, &sctp_packet)?;
            while let Some(event) = association.poll_event() {
                match event {
                    AssociationEvent::Connected => {
                        debug!("sctp association established");
                    }
                    AssociationEvent::Data {
                        stream_id,
                        ppi,
                        payload,
                    } => {
                        self.ctx.read_outs.push_back(Transmit {
                            now: msg.now,
                            transport: msg.transport,
                            message: RTCMessage::Dtls(DTLSMessage::Sctp(DataChannelMessage {
                                stream_id,
                                ppi,
                                ordered: false,
                                payload: BytesMut::from(&payload[..]),
                            })),
                        });
                    }
                    AssociationEvent::StreamsReset(streams) => {
                        self.ctx.reset_streams.extend(streams);
                    }
                    AssociationEvent::StreamsAdded(n) => {
                        debug!("peer added {} outgoing streams", n);
                    }
                    AssociationEvent::Closed => {
                        self.ctx.closed = true;
                    }
                }
            }
            self.drain_association(msg.now);
        } else {
            // Bypass
            debug!("bypass sctp read for {}", msg.transport.peer_addr);
            self.ctx.read_outs.push_back(msg);
        }
        Ok(())
    }

    pub(crate) fn poll_read(&mut self) -> Option<TaggedRTCMessage> {
        self.ctx.read_outs.pop_front()
    }

    pub(crate) fn handle_write(&mut self, msg: TaggedRTCMessage) -> Result<()> {
        if let RTCMessage::Dtls(DTLSMessage::Sctp(message)) = msg.message {
            debug!("send sctp message to {}", msg.transport.peer_addr);
            let association = self
                .ctx
                .association
                .as_mut()
                .ok_or(Error::ErrSctpClosed)?;
            association.send(
                message.stream_id,
                message.ppi,
                message.payload.freeze(),
                message.ordered,
            )?;
            self.drain_association(msg.now);
        } else {
            // Bypass
            debug!("bypass sctp write for {}", msg.transport.peer_addr);
            self.ctx.write_outs.push_back(msg);
        }
        Ok(())
    }

    pub(crate) fn poll_write(&mut self) -> Option<TaggedRTCMessage> {
        self.drain_association(Instant::now());
        self.ctx.write_outs.pop_front()
    }

    pub(crate) fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        if let Some(association) = self.ctx.association.as_mut() {
            association.handle_timeout(now)?;
            while let Some(event) = association.poll_event() {
                if event == AssociationEvent::Closed {
                    self.ctx.closed = true;
                }
            }
        }
        self.drain_association(now);
        Ok(())
    }

    pub(crate) fn poll_timeout(&mut self) -> Option<Instant> {
        self.ctx
            .association
            .as_ref()
            .and_then(|association| association.poll_timeout())
    }

    /// Moves serialized SCTP packets towards the DTLS stage for sealing.
    fn drain_association(&mut self, now: Instant) {
        if let Some(association) = self.ctx.association.as_mut() {
            while let Some(packet) = association.poll_transmit() {
                self.ctx.write_outs.push_back(Transmit {
                    now,
                    transport: Default::default(),
                    message: RTCMessage::Dtls(DTLSMessage::Raw(packet)),
                });
            }
        }
    }
}
