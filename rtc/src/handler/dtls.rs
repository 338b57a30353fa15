use super::message::{DTLSMessage, RTCMessage, TaggedRTCMessage};
use dtls::conn::{DtlsConn, DtlsEvent};
use log::{debug, error};
use shared::error::{Error, Result};
use shared::Transmit;
use std::collections::VecDeque;
use std::time::Instant;

/// DtlsHandler runs the DTLS connection: inbound records are decrypted into
/// plaintext SCTP packets for the stage above, outbound SCTP packets are
/// sealed into records for the stage below.
/// Records that raced ahead of the handshake (a ClientHello can beat the
/// pair nomination signal) are buffered, bounded, until the transport runs.
const MAX_EARLY_DATAGRAMS: usize = 16;

#[derive(Default)]
pub(crate) struct DtlsHandlerContext {
    pub(crate) conn: Option<DtlsConn>,
    /// True once the handshake completed and was reported upward.
    pub(crate) handshake_signaled: bool,
    /// Set when the peer sent close_notify.
    pub(crate) peer_closed: bool,
    /// Datagrams received before the transport started.
    pub(crate) early_datagrams: VecDeque<TaggedRTCMessage>,

    pub(crate) read_outs: VecDeque<TaggedRTCMessage>,
    pub(crate) write_outs: VecDeque<TaggedRTCMessage>,
}

pub(crate) struct DtlsHandler<'a> {
    ctx: &'a mut DtlsHandlerContext,
}

impl<'a> DtlsHandler<'a> {
    pub(crate) fn new(ctx: &'a mut DtlsHandlerContext) -> Self {
        DtlsHandler { ctx }
    }

    pub(crate) fn handle_read(&mut self, msg: TaggedRTCMessage) -> Result<()> {
        if let RTCMessage::Dtls(DTLSMessage::Raw(dtls_message)) = msg.message {
            debug!("recv dtls RAW from {}", msg.transport.peer_addr);
            let Some(conn) = self.ctx.conn.as_mut() else {
                debug!("buffering dtls RAW, transport not started yet");
                if self.ctx.early_datagrams.len() < MAX_EARLY_DATAGRAMS {
                    self.ctx.early_datagrams.push_back(Transmit {
                        now: msg.now,
                        transport: msg.transport,
                        message: RTCMessage::Dtls(DTLSMessage::Raw(dtls_message)),
                    });
                }
                return Ok(());
            };

            let result = conn.handle_read(msg.now, &dtls_message);
            while let Some(event) = conn.poll_event() {
                match event {
                    DtlsEvent::HandshakeComplete => {
                        debug!("recv dtls handshake complete");
                    }
                    DtlsEvent::ApplicationData(plaintext) => {
                        self.ctx.read_outs.push_back(Transmit {
                            now: msg.now,
                            transport: msg.transport,
                            message: RTCMessage::Dtls(DTLSMessage::Raw(plaintext)),
                        });
                    }
                    DtlsEvent::PeerClose => {
                        self.ctx.peer_closed = true;
                    }
                }
            }
            self.drain_conn(msg.now);
            if let Err(err) = result {
                error!("dtls read error: {}", err);
                return Err(err);
            }
        } else {
            // Bypass
            debug!("bypass dtls read for {}", msg.transport.peer_addr);
            self.ctx.read_outs.push_back(msg);
        }
        Ok(())
    }

    pub(crate) fn poll_read(&mut self) -> Option<TaggedRTCMessage> {
        self.ctx.read_outs.pop_front()
    }

    pub(crate) fn handle_write(&mut self, msg: TaggedRTCMessage) -> Result<()> {
        if let RTCMessage::Dtls(DTLSMessage::Raw(plaintext)) = msg.message {
            debug!("send dtls RAW to {}", msg.transport.peer_addr);
            let conn = self.ctx.conn.as_mut().ok_or(Error::ErrDtlsClosed)?;
            conn.write(&plaintext)?;
            self.drain_conn(msg.now);
        } else {
            // Bypass
            debug!("bypass dtls write for {}", msg.transport.peer_addr);
            self.ctx.write_outs.push_back(msg);
        }
        Ok(())
    }

    pub(crate) fn poll_write(&mut self) -> Option<TaggedRTCMessage> {
        self.drain_conn(Instant::now());
        self.ctx.write_outs.pop_front()
    }

    pub(crate) fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        let result = if let Some(conn) = self.ctx.conn.as_mut() {
            conn.handle_timeout(now)
        } else {
            Ok(())
        };
        self.drain_conn(now);
        result
    }

    pub(crate) fn poll_timeout(&mut self) -> Option<Instant> {
        self.ctx.conn.as_ref().and_then(|conn| conn.poll_timeout())
    }

    /// Moves sealed records towards the wire; addressing is stamped by the
    /// ICE stage below.
    fn drain_conn(&mut self, now: Instant) {
        if let Some(conn) = self.ctx.conn.as_mut() {
            while let Some(datagram) = conn.poll_transmit() {
                self.ctx.write_outs.push_back(Transmit {
                    now,
                    transport: Default::default(),
                    message: RTCMessage::Dtls(DTLSMessage::Raw(datagram)),
                });
            }
        }
    }
}
