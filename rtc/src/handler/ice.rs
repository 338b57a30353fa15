use super::message::{RTCMessage, STUNMessage, TaggedRTCMessage};
use ice::agent::Agent;
use log::{debug, warn};
use shared::error::Result;
use shared::Transmit;
use std::collections::VecDeque;
use std::time::Instant;

/// IceHandler feeds decoded STUN traffic into the agent and stamps outbound
/// messages with the nominated pair's addresses.
#[derive(Default)]
pub(crate) struct IceHandlerContext {
    pub(crate) agent: Option<Agent>,

    pub(crate) read_outs: VecDeque<TaggedRTCMessage>,
    pub(crate) write_outs: VecDeque<TaggedRTCMessage>,
}

pub(crate) struct IceHandler<'a> {
    ctx: &'a mut IceHandlerContext,
}

impl<'a> IceHandler<'a> {
    pub(crate) fn new(ctx: &'a mut IceHandlerContext) -> Self {
        IceHandler { ctx }
    }

    pub(crate) fn handle_read(&mut self, msg: TaggedRTCMessage) -> Result<()> {
        match msg.message {
            RTCMessage::Stun(STUNMessage::Stun(mut stun_message)) => {
                // STUN terminates here; the agent replies via its own queue
                if let Some(agent) = self.ctx.agent.as_mut() {
                    agent.handle_read(
                        msg.now,
                        &mut stun_message,
                        msg.transport.local_addr,
                        msg.transport.peer_addr,
                    )?;
                } else {
                    warn!("dropping STUN, agent not running yet");
                }
                self.drain_agent();
            }
            RTCMessage::Dtls(dtls) => {
                let valid = self
                    .ctx
                    .agent
                    .as_mut()
                    .map(|agent| agent.validate_non_stun_traffic(msg.transport.peer_addr))
                    .unwrap_or(false);
                if valid {
                    self.ctx.read_outs.push_back(Transmit {
                        now: msg.now,
                        transport: msg.transport,
                        message: RTCMessage::Dtls(dtls),
                    });
                } else {
                    debug!(
                        "dropping non-STUN traffic from unknown remote {}",
                        msg.transport.peer_addr
                    );
                }
            }
            other => {
                debug!("bypass ice read for {}", msg.transport.peer_addr);
                self.ctx.read_outs.push_back(Transmit {
                    now: msg.now,
                    transport: msg.transport,
                    message: other,
                });
            }
        }
        Ok(())
    }

    pub(crate) fn poll_read(&mut self) -> Option<TaggedRTCMessage> {
        self.ctx.read_outs.pop_front()
    }

    pub(crate) fn handle_write(&mut self, mut msg: TaggedRTCMessage) -> Result<()> {
        // everything below DTLS flows through the nominated pair
        if let Some(agent) = self.ctx.agent.as_ref() {
            if let Some((local_addr, peer_addr)) = agent.selected_addrs() {
                msg.transport.local_addr = local_addr;
                msg.transport.peer_addr = peer_addr;
            }
        }
        self.ctx.write_outs.push_back(msg);
        Ok(())
    }

    pub(crate) fn poll_write(&mut self) -> Option<TaggedRTCMessage> {
        self.drain_agent();
        self.ctx.write_outs.pop_front()
    }

    pub(crate) fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        if let Some(agent) = self.ctx.agent.as_mut() {
            agent.handle_timeout(now)?;
        }
        self.drain_agent();
        Ok(())
    }

    pub(crate) fn poll_timeout(&mut self) -> Option<Instant> {
        self.ctx.agent.as_ref().and_then(|agent| agent.poll_timeout())
    }

    /// Moves the agent's outbound STUN datagrams into the write queue.
    fn drain_agent(&mut self) {
        if let Some(agent) = self.ctx.agent.as_mut() {
            while let Some(transmit) = agent.poll_transmit() {
                self.ctx.write_outs.push_back(Transmit {
                    now: transmit.now,
                    transport: transmit.transport,
                    message: RTCMessage::Stun(STUNMessage::Raw(transmit.message)),
                });
            }
        }
    }
}
