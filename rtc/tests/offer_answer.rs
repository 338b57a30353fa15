use rtc::peer_connection::configuration::RTCConfiguration;
use rtc::peer_connection::event::RTCPeerConnectionEvent;
use rtc::peer_connection::sdp::{RTCSessionDescription, SessionDescription};
use rtc::peer_connection::state::RTCSignalingState;
use rtc::RTCPeerConnection;
use shared::error::{Error, Result};
use shared::Protocol;

fn new_peer(port: u16) -> Result<RTCPeerConnection> {
    RTCPeerConnection::new(RTCConfiguration {
        local_addrs: vec![format!("127.0.0.1:{port}").parse().unwrap()],
        ..Default::default()
    })
}

#[test]
fn test_offer_contains_profile_lines() -> Result<()> {
    let mut pc = new_peer(4101)?;
    let offer = pc.create_offer()?;

    assert!(offer.sdp.contains("m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n"));
    assert!(offer.sdp.contains("a=setup:actpass\r\n"));
    assert!(offer.sdp.contains("a=sctp-port:5000\r\n"));
    assert!(offer.sdp.contains("a=max-message-size:1200\r\n"));
    assert!(offer.sdp.contains("a=group:BUNDLE 0\r\n"));
    assert!(offer.sdp.contains("a=fingerprint:sha-256 "));
    assert!(offer.sdp.contains("a=ice-ufrag:"));
    assert!(offer.sdp.contains("a=ice-pwd:"));
    Ok(())
}

#[test]
fn test_emitted_sdp_round_trips_byte_identical() -> Result<()> {
    let mut pc = new_peer(4102)?;
    let offer = pc.create_offer()?;

    let parsed = SessionDescription::unmarshal(&offer.sdp)?;
    assert_eq!(parsed.marshal(), offer.sdp);
    Ok(())
}

#[test]
fn test_signaling_state_happy_path() -> Result<()> {
    let mut offerer = new_peer(4103)?;
    let mut answerer = new_peer(4104)?;
    assert_eq!(offerer.signaling_state(), RTCSignalingState::Stable);

    let offer = offerer.create_offer()?;
    offerer.set_local_description(offer.clone())?;
    assert_eq!(offerer.signaling_state(), RTCSignalingState::HaveLocalOffer);

    answerer.set_remote_description(offer)?;
    assert_eq!(answerer.signaling_state(), RTCSignalingState::HaveRemoteOffer);

    let answer = answerer.create_answer()?;
    answerer.set_local_description(answer.clone())?;
    assert_eq!(answerer.signaling_state(), RTCSignalingState::Stable);

    offerer.set_remote_description(answer)?;
    assert_eq!(offerer.signaling_state(), RTCSignalingState::Stable);
    Ok(())
}

#[test]
fn test_invalid_transitions_leave_state_unchanged() -> Result<()> {
    let mut offerer = new_peer(4105)?;
    let mut answerer = new_peer(4106)?;

    let offer = offerer.create_offer()?;
    // an answer out of the blue is an invalid transition
    let answer_like = RTCSessionDescription::answer(offer.sdp.clone())?;
    assert!(offerer.set_local_description(answer_like.clone()).is_err());
    assert_eq!(offerer.signaling_state(), RTCSignalingState::Stable);

    assert!(answerer.set_remote_description(answer_like).is_err());
    assert_eq!(answerer.signaling_state(), RTCSignalingState::Stable);

    // create_answer without a remote offer is invalid state
    assert_eq!(answerer.create_answer().err(), Some(Error::ErrInvalidState));
    Ok(())
}

#[test]
fn test_negotiation_needed_fires_once_in_stable() -> Result<()> {
    let mut pc = new_peer(4107)?;
    pc.create_data_channel("first", None)?;

    let mut fired = 0;
    while let Some(event) = pc.poll_event() {
        if matches!(event, RTCPeerConnectionEvent::OnNegotiationNeeded) {
            fired += 1;
        }
    }
    assert_eq!(fired, 1);

    // no re-fire without another trigger
    assert!(pc.poll_event().is_none());
    Ok(())
}

#[test]
fn test_negotiation_needed_suppressed_while_not_stable() -> Result<()> {
    let mut pc = new_peer(4108)?;
    let offer = pc.create_offer()?;
    pc.set_local_description(offer)?;
    while pc.poll_event().is_some() {}

    pc.create_data_channel("late", None)?;
    // signaling is have-local-offer: nothing may fire
    assert!(!std::iter::from_fn(|| pc.poll_event())
        .any(|e| matches!(e, RTCPeerConnectionEvent::OnNegotiationNeeded)));
    Ok(())
}

#[test]
fn test_closed_connection_rejects_operations() -> Result<()> {
    let mut pc = new_peer(4109)?;
    pc.close()?;
    assert_eq!(pc.signaling_state(), RTCSignalingState::Closed);

    assert_eq!(pc.create_offer().err(), Some(Error::ErrConnectionClosed));
    assert_eq!(
        pc.create_data_channel("x", None).err(),
        Some(Error::ErrConnectionClosed)
    );
    let offer = RTCSessionDescription::offer(
        "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\nm=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n".to_owned(),
    )?;
    assert_eq!(
        pc.set_remote_description(offer).err(),
        Some(Error::ErrConnectionClosed)
    );
    Ok(())
}

#[test]
fn test_add_ice_candidate_requires_remote_description() -> Result<()> {
    let mut pc = new_peer(4110)?;
    let result = pc.add_ice_candidate(rtc::transport::RTCIceCandidateInit {
        candidate: "candidate:1 1 udp 2130706431 127.0.0.1 5000 typ host".to_owned(),
        ..Default::default()
    });
    assert_eq!(result.err(), Some(Error::ErrNoRemoteDescription));
    Ok(())
}
