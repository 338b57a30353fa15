use crate::error::Result;
use crate::transport::Transmit;
use std::time::Instant;

/// A sans-IO protocol stage.
///
/// A `Protocol` performs no I/O whatsoever: inbound datagrams are fed in via
/// [handle_read](Protocol::handle_read) and drained via
/// [poll_read](Protocol::poll_read); outbound messages flow through
/// [handle_write](Protocol::handle_write) / [poll_write](Protocol::poll_write).
/// Timers are exposed as deadlines through
/// [poll_timeout](Protocol::poll_timeout) and fired by the embedder calling
/// [handle_timeout](Protocol::handle_timeout).
pub trait Protocol {
    /// Associated event input message type
    type Ein: 'static;
    /// Associated event output message type
    type Eout: 'static;
    /// Associated read input message type
    type Rin: 'static;
    /// Associated read output message type
    type Rout: 'static;
    /// Associated write input message type
    type Win: 'static;
    /// Associated write output message type
    type Wout: 'static;

    /// Handles Rin for next inbound stage handling
    fn handle_read(&mut self, msg: Transmit<Self::Rin>) -> Result<()>;

    /// Polls Rout from internal queue for next inbound stage handling
    fn poll_read(&mut self) -> Option<Transmit<Self::Rout>>;

    /// Handles Win for next outbound stage handling
    fn handle_write(&mut self, msg: Transmit<Self::Win>) -> Result<()>;

    /// Polls Wout from internal queue for next outbound stage handling
    fn poll_write(&mut self) -> Option<Transmit<Self::Wout>>;

    /// Handles event
    fn handle_event(&mut self, _evt: Self::Ein) -> Result<()> {
        Ok(())
    }

    /// Polls event
    fn poll_event(&mut self) -> Option<Self::Eout> {
        None
    }

    /// Handles timeout
    fn handle_timeout(&mut self, _now: Instant) -> Result<()> {
        Ok(())
    }

    /// Polls timeout
    fn poll_timeout(&mut self) -> Option<Instant> {
        None
    }

    /// Closes the stage, releasing its resources
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
