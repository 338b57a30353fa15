use super::message::{
    ApplicationMessage, DTLSMessage, DataChannelEvent, DataChannelMessage, RTCMessage,
    TaggedRTCMessage,
};
use bytes::BytesMut;
use datachannel::data_channel::{DataChannel, DataChannelConfig, DataChannelState};
use datachannel::message::message_channel_ack::DataChannelAck;
use datachannel::message::Message;
use log::{debug, warn};
use sctp::PayloadProtocolIdentifier;
use shared::error::Result;
use shared::marshal::{Marshal, Unmarshal};
use shared::Transmit;
use std::collections::{HashMap, VecDeque};
use std::time::Instant;

/// DataChannelHandler maps (stream id, payload protocol) pairs to named
/// channels: DCEP control traffic terminates here, user payloads are
/// surfaced as application messages.
#[derive(Default)]
pub(crate) struct DataChannelHandlerContext {
    pub(crate) channels: HashMap<u16, DataChannel>,

    pub(crate) read_outs: VecDeque<TaggedRTCMessage>,
    pub(crate) write_outs: VecDeque<TaggedRTCMessage>,
}

impl DataChannelHandlerContext {
    /// Queues the DCEP OPEN announcing a locally created channel.
    pub(crate) fn queue_open(&mut self, now: Instant, stream_id: u16) -> Result<()> {
        let Some(channel) = self.channels.get(&stream_id) else {
            return Ok(());
        };
        let open = Message::DataChannelOpen(channel.open_message());
        let payload = open.marshal()?;
        self.write_outs.push_back(Transmit {
            now,
            transport: Default::default(),
            message: RTCMessage::Dtls(DTLSMessage::Sctp(DataChannelMessage {
                stream_id,
                ppi: PayloadProtocolIdentifier::Dcep,
                ordered: true,
                payload,
            })),
        });
        Ok(())
    }
}

pub(crate) struct DataChannelHandler<'a> {
    ctx: &'a mut DataChannelHandlerContext,
}

impl<'a> DataChannelHandler<'a> {
    pub(crate) fn new(ctx: &'a mut DataChannelHandlerContext) -> Self {
        DataChannelHandler { ctx }
    }

    pub(crate) fn handle_read(&mut self, msg: TaggedRTCMessage) -> Result<()> {
        if let RTCMessage::Dtls(DTLSMessage::Sctp(message)) = msg.message {
            match message.ppi {
                PayloadProtocolIdentifier::Dcep => {
                    let mut buf = &message.payload[..];
                    match Message::unmarshal(&mut buf)? {
                        Message::DataChannelOpen(open) => {
                            debug!(
                                "remote opened channel {} ({:?})",
                                message.stream_id,
                                String::from_utf8_lossy(&open.label)
                            );
                            let label = String::from_utf8_lossy(&open.label).into_owned();
                            let protocol = String::from_utf8_lossy(&open.protocol).into_owned();
                            let ordered = !open.unordered();

                            let mut channel = DataChannel::new(
                                message.stream_id,
                                DataChannelConfig {
                                    label: label.clone(),
                                    protocol: protocol.clone(),
                                    ordered,
                                    negotiated: false,
                                },
                                false,
                            );
                            channel.state = DataChannelState::Open;
                            self.ctx.channels.insert(message.stream_id, channel);

                            // acknowledge on the same stream
                            let ack = Message::DataChannelAck(DataChannelAck);
                            self.ctx.write_outs.push_back(Transmit {
                                now: msg.now,
                                transport: Default::default(),
                                message: RTCMessage::Dtls(DTLSMessage::Sctp(
                                    DataChannelMessage {
                                        stream_id: message.stream_id,
                                        ppi: PayloadProtocolIdentifier::Dcep,
                                        ordered: true,
                                        payload: ack.marshal()?,
                                    },
                                )),
                            });

                            self.ctx.read_outs.push_back(Transmit {
                                now: msg.now,
                                transport: msg.transport,
                                message: RTCMessage::Dtls(DTLSMessage::DataChannel(
                                    ApplicationMessage {
                                        data_channel_id: message.stream_id,
                                        data_channel_event: DataChannelEvent::Open,
                                        remote_open: Some((label, protocol, ordered)),
                                    },
                                )),
                            });
                        }
                        Message::DataChannelAck(_) => {
                            debug!("channel {} acknowledged", message.stream_id);
                            if let Some(channel) =
                                self.ctx.channels.get_mut(&message.stream_id)
                            {
                                channel.state = DataChannelState::Open;
                            }
                            self.ctx.read_outs.push_back(Transmit {
                                now: msg.now,
                                transport: msg.transport,
                                message: RTCMessage::Dtls(DTLSMessage::DataChannel(
                                    ApplicationMessage {
                                        data_channel_id: message.stream_id,
                                        data_channel_event: DataChannelEvent::Open,
                                        remote_open: None,
                                    },
                                )),
                            });
                        }
                    }
                }
                PayloadProtocolIdentifier::Binary
                | PayloadProtocolIdentifier::BinaryEmpty
                | PayloadProtocolIdentifier::String
                | PayloadProtocolIdentifier::StringEmpty => {
                    if self.ctx.channels.contains_key(&message.stream_id) {
                        self.ctx.read_outs.push_back(Transmit {
                            now: msg.now,
                            transport: msg.transport,
                            message: RTCMessage::Dtls(DTLSMessage::DataChannel(
                                ApplicationMessage {
                                    data_channel_id: message.stream_id,
                                    data_channel_event: DataChannelEvent::Message(
                                        message.payload,
                                    ),
                                    remote_open: None,
                                },
                            )),
                        });
                    } else {
                        warn!("drop payload on unknown stream {}", message.stream_id);
                    }
                }
                PayloadProtocolIdentifier::Unknown => {
                    warn!(
                        "drop payload with unknown protocol identifier on stream {}",
                        message.stream_id
                    );
                }
            }
        } else {
            // Bypass
            debug!("bypass datachannel read for {}", msg.transport.peer_addr);
            self.ctx.read_outs.push_back(msg);
        }
        Ok(())
    }

    pub(crate) fn poll_read(&mut self) -> Option<TaggedRTCMessage> {
        self.ctx.read_outs.pop_front()
    }

    pub(crate) fn handle_write(&mut self, msg: TaggedRTCMessage) -> Result<()> {
        if let RTCMessage::Dtls(DTLSMessage::DataChannel(app)) = msg.message {
            match app.data_channel_event {
                DataChannelEvent::Message(payload) => {
                    let Some(channel) = self.ctx.channels.get(&app.data_channel_id) else {
                        warn!("drop send on unknown channel {}", app.data_channel_id);
                        return Ok(());
                    };
                    let empty = payload.is_empty();
                    self.ctx.write_outs.push_back(Transmit {
                        now: msg.now,
                        transport: msg.transport,
                        message: RTCMessage::Dtls(DTLSMessage::Sctp(DataChannelMessage {
                            stream_id: channel.stream_id,
                            ppi: if empty {
                                PayloadProtocolIdentifier::BinaryEmpty
                            } else {
                                channel.payload_protocol_identifier()
                            },
                            ordered: channel.config.ordered,
                            payload,
                        })),
                    });
                }
                DataChannelEvent::Open | DataChannelEvent::Close => {
                    debug!("channel control event on write path is handled upstream");
                }
            }
        } else {
            // Bypass
            debug!("bypass datachannel write for {}", msg.transport.peer_addr);
            self.ctx.write_outs.push_back(msg);
        }
        Ok(())
    }

    pub(crate) fn poll_write(&mut self) -> Option<TaggedRTCMessage> {
        self.ctx.write_outs.pop_front()
    }
}
