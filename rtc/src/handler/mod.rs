pub(crate) mod datachannel;
pub(crate) mod demuxer;
pub(crate) mod dtls;
pub(crate) mod ice;
pub mod message;
pub(crate) mod sctp;
pub(crate) mod stun;

use crate::handler::datachannel::{DataChannelHandler, DataChannelHandlerContext};
use crate::handler::demuxer::{DemuxerHandler, DemuxerHandlerContext};
use crate::handler::dtls::{DtlsHandler, DtlsHandlerContext};
use crate::handler::ice::{IceHandler, IceHandlerContext};
use crate::handler::message::{RTCMessage, TaggedRTCMessage};
use crate::handler::sctp::{SctpHandler, SctpHandlerContext};
use crate::handler::stun::{StunHandler, StunHandlerContext};
use crate::peer_connection::event::RTCPeerConnectionEvent;
use crate::peer_connection::RTCPeerConnection;
use log::warn;
use shared::error::{Error, Result};
use shared::{Protocol, TaggedBytesMut, Transmit};
use std::collections::VecDeque;
use std::time::Instant;

/*
 Pipeline Flow (Read Path):
 Raw Bytes -> Demuxer -> STUN -> ICE -> DTLS -> SCTP -> DataChannel -> Application

 Pipeline Flow (Write Path):
 Application -> DataChannel -> SCTP -> DTLS -> ICE -> STUN -> Demuxer -> Raw Bytes
*/
#[derive(Default)]
pub(crate) struct PipelineContext {
    pub(crate) demuxer_handler_context: DemuxerHandlerContext,
    pub(crate) stun_handler_context: StunHandlerContext,
    pub(crate) ice_handler_context: IceHandlerContext,
    pub(crate) dtls_handler_context: DtlsHandlerContext,
    pub(crate) sctp_handler_context: SctpHandlerContext,
    pub(crate) datachannel_handler_context: DataChannelHandlerContext,

    /// Application writes awaiting the next poll_write.
    pub(crate) write_ins: VecDeque<TaggedRTCMessage>,
    /// Raw datagrams ready for the socket.
    pub(crate) pending_wouts: VecDeque<TaggedBytesMut>,
}

impl RTCPeerConnection {
    pub(crate) fn get_demuxer_handler(&mut self) -> DemuxerHandler<'_> {
        DemuxerHandler::new(&mut self.pipeline_context.demuxer_handler_context)
    }

    pub(crate) fn get_stun_handler(&mut self) -> StunHandler<'_> {
        StunHandler::new(&mut self.pipeline_context.stun_handler_context)
    }

    pub(crate) fn get_ice_handler(&mut self) -> IceHandler<'_> {
        IceHandler::new(&mut self.pipeline_context.ice_handler_context)
    }

    pub(crate) fn get_dtls_handler(&mut self) -> DtlsHandler<'_> {
        DtlsHandler::new(&mut self.pipeline_context.dtls_handler_context)
    }

    pub(crate) fn get_sctp_handler(&mut self) -> SctpHandler<'_> {
        SctpHandler::new(&mut self.pipeline_context.sctp_handler_context)
    }

    pub(crate) fn get_datachannel_handler(&mut self) -> DataChannelHandler<'_> {
        DataChannelHandler::new(&mut self.pipeline_context.datachannel_handler_context)
    }

    /// Drives every queued outbound message down the reverse chain into
    /// `pending_wouts`.
    pub(crate) fn flush_writes(&mut self) {
        let mut intermediate: VecDeque<TaggedRTCMessage> =
            self.pipeline_context.write_ins.drain(..).collect();

        macro_rules! stage {
            ($get:ident) => {{
                let mut handler = self.$get();
                while let Some(msg) = intermediate.pop_front() {
                    if let Err(err) = handler.handle_write(msg) {
                        warn!("handle_write got error: {}", err);
                    }
                }
                while let Some(msg) = handler.poll_write() {
                    intermediate.push_back(msg);
                }
            }};
        }

        stage!(get_datachannel_handler);
        stage!(get_sctp_handler);
        stage!(get_dtls_handler);
        stage!(get_ice_handler);
        stage!(get_stun_handler);
        stage!(get_demuxer_handler);

        while let Some(msg) = intermediate.pop_front() {
            if let RTCMessage::Raw(message) = msg.message {
                if msg.transport.peer_addr.port() == 0 {
                    warn!("drop outbound datagram without a nominated pair");
                    continue;
                }
                self.pipeline_context.pending_wouts.push_back(TaggedBytesMut {
                    now: msg.now,
                    transport: msg.transport,
                    message,
                });
            }
        }
    }

    /// Fatal transport errors advance the connection to failed; everything
    /// else is logged and absorbed (a datagram path must survive garbage).
    pub(crate) fn absorb_pipeline_error(&mut self, err: Error) {
        match err {
            Error::ErrDtlsFingerprintMismatch
            | Error::ErrDtlsHandshakeFailed(_)
            | Error::ErrAlertFatalOrClose => {
                warn!("fatal transport error: {}", err);
                self.transport_failed();
            }
            err => {
                warn!("pipeline error: {}", err);
            }
        }
    }
}

impl Protocol for RTCPeerConnection {
    type Ein = ();
    type Eout = RTCPeerConnectionEvent;
    type Rin = bytes::BytesMut;
    type Rout = RTCMessage;
    type Win = RTCMessage;
    type Wout = bytes::BytesMut;

    fn handle_read(&mut self, msg: TaggedBytesMut) -> Result<()> {
        let now = msg.now;
        let mut intermediate = VecDeque::new();
        intermediate.push_back(Transmit {
            now: msg.now,
            transport: msg.transport,
            message: RTCMessage::Raw(msg.message),
        });

        macro_rules! stage {
            ($get:ident) => {{
                let mut failure: Option<Error> = None;
                {
                    let mut handler = self.$get();
                    let mut next = VecDeque::new();
                    while let Some(msg) = intermediate.pop_front() {
                        if let Err(err) = handler.handle_read(msg) {
                            failure = Some(err);
                        }
                    }
                    while let Some(msg) = handler.poll_read() {
                        next.push_back(msg);
                    }
                    intermediate = next;
                }
                if let Some(err) = failure {
                    self.absorb_pipeline_error(err);
                }
            }};
        }

        stage!(get_demuxer_handler);
        stage!(get_stun_handler);
        stage!(get_ice_handler);
        stage!(get_dtls_handler);
        stage!(get_sctp_handler);
        stage!(get_datachannel_handler);

        // whatever reaches the top is an application message
        while let Some(msg) = intermediate.pop_front() {
            self.handle_application_message(msg);
        }

        self.sync_layers(now);
        Ok(())
    }

    fn poll_read(&mut self) -> Option<Transmit<Self::Rout>> {
        // application traffic surfaces through poll_event instead
        None
    }

    fn handle_write(&mut self, msg: Transmit<Self::Win>) -> Result<()> {
        self.pipeline_context.write_ins.push_back(msg);
        Ok(())
    }

    fn poll_write(&mut self) -> Option<Transmit<Self::Wout>> {
        if self.pipeline_context.pending_wouts.is_empty() {
            self.flush_writes();
        }
        self.pipeline_context.pending_wouts.pop_front()
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        self.check_negotiation_needed();
        self.events.pop_front()
    }

    fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        let ice_result = self.get_ice_handler().handle_timeout(now);
        let dtls_result = self.get_dtls_handler().handle_timeout(now);
        let sctp_result = self.get_sctp_handler().handle_timeout(now);

        for result in [ice_result, dtls_result, sctp_result] {
            if let Err(err) = result {
                self.absorb_pipeline_error(err);
            }
        }

        self.sync_layers(now);
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Instant> {
        if self.is_closed() {
            return None;
        }
        let mut eto: Option<Instant> = None;
        let mut consider = |deadline: Option<Instant>| {
            if let Some(d) = deadline {
                eto = Some(eto.map_or(d, |e| e.min(d)));
            }
        };
        consider(self.get_ice_handler().poll_timeout());
        consider(self.get_dtls_handler().poll_timeout());
        consider(self.get_sctp_handler().poll_timeout());
        eto
    }

    fn close(&mut self) -> Result<()> {
        RTCPeerConnection::close(self)
    }
}
