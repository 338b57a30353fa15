use bytes::BytesMut;
use sctp::PayloadProtocolIdentifier;
use shared::Transmit;

/// One SCTP user message addressed by stream id and payload protocol.
#[derive(Debug, Clone)]
pub struct DataChannelMessage {
    pub stream_id: u16,
    pub ppi: PayloadProtocolIdentifier,
    /// Advisory; the transport below never reorders in this profile.
    pub ordered: bool,
    pub payload: BytesMut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DataChannelEvent {
    /// A channel opened (DCEP OPEN received, or our OPEN was acknowledged).
    Open,
    Message(BytesMut),
    Close,
}

/// A decoded channel event addressed to the application layer.
#[derive(Debug, Clone)]
pub struct ApplicationMessage {
    pub(crate) data_channel_id: u16,
    pub(crate) data_channel_event: DataChannelEvent,
    /// Set on Open when the channel was created by the remote peer.
    pub(crate) remote_open: Option<(String, String, bool)>,
}

#[derive(Debug)]
pub enum STUNMessage {
    Raw(BytesMut),
    Stun(Box<stun::message::Message>),
}

#[derive(Debug)]
pub enum DTLSMessage {
    /// Wire bytes below the DTLS record layer, or plaintext SCTP packets
    /// above it; the pipeline position disambiguates.
    Raw(BytesMut),
    Sctp(DataChannelMessage),
    DataChannel(ApplicationMessage),
}

#[derive(Debug)]
pub enum RTCMessage {
    Raw(BytesMut),
    Stun(STUNMessage),
    Dtls(DTLSMessage),
}

pub(crate) type TaggedRTCMessage = Transmit<RTCMessage>;
