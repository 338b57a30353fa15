use crate::data_channel::{RTCDataChannelId, RTCDataChannelInfo};
use crate::peer_connection::state::{
    RTCIceConnectionState, RTCIceGatheringState, RTCPeerConnectionState, RTCSignalingState,
};
use crate::transport::RTCIceCandidateInit;
use bytes::BytesMut;

/// The fixed set of notifications a peer connection emits. Polled by the
/// embedder; emitted synchronously from within the receive path and never
/// re-entering the send path.
#[derive(Debug, Clone)]
pub enum RTCPeerConnectionEvent {
    /// A local candidate is ready for trickling to the peer.
    OnIceCandidate(RTCIceCandidateInit),
    OnIceGatheringStateChange(RTCIceGatheringState),
    OnIceConnectionStateChange(RTCIceConnectionState),
    OnSignalingStateChange(RTCSignalingState),
    OnConnectionStateChange(RTCPeerConnectionState),
    /// The remote peer opened a channel.
    OnDataChannel(RTCDataChannelInfo),
    /// A channel finished opening (locally or remotely created).
    OnDataChannelOpen(RTCDataChannelId),
    /// An inbound message on an open channel.
    OnDataChannelMessage(RTCDataChannelId, BytesMut),
    OnDataChannelClose(RTCDataChannelId),
    /// Session renegotiation is required (first channel created from
    /// stable); suppressed while signaling is not stable.
    OnNegotiationNeeded,
}
