use crate::message::message_channel_open::{
    DataChannelOpen, CHANNEL_TYPE_PARTIAL_RELIABLE_REXMIT_UNORDERED, CHANNEL_TYPE_RELIABLE,
};
use sctp::PayloadProtocolIdentifier;
use std::fmt;

/// Configuration of a channel before it opens.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct DataChannelConfig {
    pub label: String,
    pub protocol: String,
    /// Advisory only: the transport below never reorders or retransmits.
    pub ordered: bool,
    /// Negotiated channels skip the DCEP exchange; both sides preagree on
    /// the stream id.
    pub negotiated: bool,
}

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum DataChannelState {
    #[default]
    Connecting,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for DataChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

/// One data channel: the (stream id, payload protocol) pair bound to a
/// label. Channels only open once the association is established.
#[derive(Debug, Clone)]
pub struct DataChannel {
    pub stream_id: u16,
    pub config: DataChannelConfig,
    pub state: DataChannelState,
    /// Whether this side created the channel (and therefore sends OPEN).
    pub locally_created: bool,
}

impl DataChannel {
    pub fn new(stream_id: u16, config: DataChannelConfig, locally_created: bool) -> Self {
        Self {
            stream_id,
            config,
            state: DataChannelState::Connecting,
            locally_created,
        }
    }

    /// The payload protocol identifier for user payloads on this channel.
    /// Payloads are opaque byte buffers only in this profile.
    pub fn payload_protocol_identifier(&self) -> PayloadProtocolIdentifier {
        PayloadProtocolIdentifier::Binary
    }

    /// Builds the DCEP OPEN message announcing this channel.
    pub fn open_message(&self) -> DataChannelOpen {
        let channel_type = if self.config.ordered {
            CHANNEL_TYPE_RELIABLE
        } else {
            CHANNEL_TYPE_PARTIAL_RELIABLE_REXMIT_UNORDERED
        };
        DataChannelOpen {
            channel_type,
            priority: 0,
            // zero retransmissions: the unordered channel type is partial
            // reliable so conforming peers do not wait for redelivery
            reliability_parameter: 0,
            label: self.config.label.as_bytes().to_vec(),
            protocol: self.config.protocol.as_bytes().to_vec(),
        }
    }
}

#[cfg(test)]
mod data_channel_test {
    use super::*;

    #[test]
    fn test_open_message_reflects_ordering() {
        let unordered = DataChannel::new(
            0,
            DataChannelConfig {
                label: "t".to_owned(),
                ordered: false,
                ..Default::default()
            },
            true,
        );
        assert_eq!(
            unordered.open_message().channel_type,
            CHANNEL_TYPE_PARTIAL_RELIABLE_REXMIT_UNORDERED
        );
        assert!(unordered.open_message().unordered());

        let ordered = DataChannel::new(
            2,
            DataChannelConfig {
                label: "t".to_owned(),
                ordered: true,
                ..Default::default()
            },
            true,
        );
        assert_eq!(ordered.open_message().channel_type, CHANNEL_TYPE_RELIABLE);
    }

    #[test]
    fn test_initial_state() {
        let ch = DataChannel::new(4, DataChannelConfig::default(), false);
        assert_eq!(ch.state, DataChannelState::Connecting);
        assert!(!ch.locally_created);
        assert_eq!(
            ch.payload_protocol_identifier(),
            PayloadProtocolIdentifier::Binary
        );
    }
}
