use std::fmt;

/// ConnectionState is the overall state of the ICE agent, aggregated per
/// component (only one component exists in this profile).
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Unspecified,
    /// The agent is gathering addresses or waiting for remote candidates.
    New,
    /// The agent has remote candidates and is performing connectivity checks.
    Checking,
    /// A working pair was found; checks may still be running.
    Connected,
    /// Checks have finished and a pair has been nominated.
    Completed,
    /// The nominated pair stopped receiving traffic; the agent may recover.
    Disconnected,
    /// Every pair failed and the retry budget is exhausted.
    Failed,
    /// The agent was shut down.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Unspecified => "Unspecified",
            Self::New => "new",
            Self::Checking => "checking",
            Self::Connected => "connected",
            Self::Completed => "completed",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

/// GatheringState describes candidate collection progress.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum GatheringState {
    #[default]
    New,
    /// Gathering transactions towards the configured servers are in flight.
    Gathering,
    /// Every server produced a candidate or exhausted its retransmissions.
    Complete,
}

impl fmt::Display for GatheringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::New => "new",
            Self::Gathering => "gathering",
            Self::Complete => "complete",
        };
        write!(f, "{s}")
    }
}
