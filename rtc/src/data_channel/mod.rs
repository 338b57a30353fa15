use serde::{Deserialize, Serialize};

/// A data channel is addressed by its SCTP stream id.
pub type RTCDataChannelId = u16;

/// Options for [create_data_channel](crate::RTCPeerConnection::create_data_channel).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RTCDataChannelInit {
    /// Advisory only in this profile: the transport below never reorders.
    pub ordered: bool,
    /// Explicit stream id for negotiated channels.
    pub id: Option<RTCDataChannelId>,
    /// Subprotocol string announced in the DCEP OPEN.
    pub protocol: String,
    /// Skip the DCEP exchange; both sides preagree on the id.
    pub negotiated: bool,
}

impl Default for RTCDataChannelInit {
    fn default() -> Self {
        Self {
            ordered: false,
            id: None,
            protocol: String::new(),
            negotiated: false,
        }
    }
}

/// Public view of a channel, surfaced with `datachannel` events.
#[derive(Debug, Clone)]
pub struct RTCDataChannelInfo {
    pub id: RTCDataChannelId,
    pub label: String,
    pub protocol: String,
    pub ordered: bool,
}
