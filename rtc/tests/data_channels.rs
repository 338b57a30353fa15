//! Two in-process peer connections wired back to back: the sans-IO design
//! lets these scenarios run deterministically without sockets by shuttling
//! datagrams between the two pipelines.

use bytes::BytesMut;
use rtc::data_channel::RTCDataChannelInit;
use rtc::peer_connection::configuration::RTCConfiguration;
use rtc::peer_connection::event::RTCPeerConnectionEvent;
use rtc::peer_connection::state::RTCPeerConnectionState;
use rtc::transport::RTCIceCandidateInit;
use rtc::RTCPeerConnection;
use shared::error::{Error, Result};
use shared::{Protocol, TaggedBytesMut, TransportContext};
use std::net::SocketAddr;
use std::time::Instant;

struct Peer {
    pc: RTCPeerConnection,
    addr: SocketAddr,
    events: Vec<RTCPeerConnectionEvent>,
}

impl Peer {
    fn new(port: u16) -> Result<Self> {
        let _ = env_logger::try_init();
        let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
        let pc = RTCPeerConnection::new(RTCConfiguration {
            local_addrs: vec![addr],
            ..Default::default()
        })?;
        Ok(Self {
            pc,
            addr,
            events: vec![],
        })
    }

    fn drain_events(&mut self) {
        while let Some(event) = self.pc.poll_event() {
            self.events.push(event);
        }
    }

    fn connection_state(&self) -> RTCPeerConnectionState {
        self.pc.connection_state()
    }
}

/// Delivers every queued datagram between the two peers until both go
/// quiescent. Datagrams addressed to anyone but the two peers are dropped.
/// The clock is advanced one second per round so retransmission timers can
/// recover anything a layer was not ready for yet.
fn pump(a: &mut Peer, b: &mut Peer) {
    let start = Instant::now();
    for round in 0..200u32 {
        let now = start + std::time::Duration::from_secs(u64::from(round));
        let _ = a.pc.handle_timeout(now);
        let _ = b.pc.handle_timeout(now);

        let mut progressed = false;
        for _ in 0..64 {
            let Some(datagram) = a.pc.poll_write() else {
                break;
            };
            progressed = true;
            if datagram.transport.peer_addr == b.addr {
                let _ = b.pc.handle_read(TaggedBytesMut {
                    now,
                    transport: TransportContext {
                        local_addr: b.addr,
                        peer_addr: a.addr,
                    },
                    message: datagram.message,
                });
            }
        }
        for _ in 0..64 {
            let Some(datagram) = b.pc.poll_write() else {
                break;
            };
            progressed = true;
            if datagram.transport.peer_addr == a.addr {
                let _ = a.pc.handle_read(TaggedBytesMut {
                    now,
                    transport: TransportContext {
                        local_addr: a.addr,
                        peer_addr: b.addr,
                    },
                    message: datagram.message,
                });
            }
        }

        a.drain_events();
        b.drain_events();
        if !progressed {
            break;
        }
    }
}

/// Exchanges offer/answer and trickled candidates.
fn signal(offerer: &mut Peer, answerer: &mut Peer) -> Result<()> {
    let offer = offerer.pc.create_offer()?;
    offerer.pc.set_local_description(offer.clone())?;
    answerer.pc.set_remote_description(offer)?;

    let answer = answerer.pc.create_answer()?;
    answerer.pc.set_local_description(answer.clone())?;
    offerer.pc.set_remote_description(answer)?;

    offerer.drain_events();
    answerer.drain_events();
    trickle(offerer, answerer)?;
    Ok(())
}

fn trickle(a: &mut Peer, b: &mut Peer) -> Result<()> {
    let a_candidates: Vec<RTCIceCandidateInit> = a
        .events
        .iter()
        .filter_map(|e| match e {
            RTCPeerConnectionEvent::OnIceCandidate(c) => Some(c.clone()),
            _ => None,
        })
        .collect();
    let b_candidates: Vec<RTCIceCandidateInit> = b
        .events
        .iter()
        .filter_map(|e| match e {
            RTCPeerConnectionEvent::OnIceCandidate(c) => Some(c.clone()),
            _ => None,
        })
        .collect();
    for c in a_candidates {
        b.pc.add_ice_candidate(c)?;
    }
    for c in b_candidates {
        a.pc.add_ice_candidate(c)?;
    }
    Ok(())
}

fn channel_open(peer: &Peer, id: u16) -> bool {
    peer.events
        .iter()
        .any(|e| matches!(e, RTCPeerConnectionEvent::OnDataChannelOpen(got) if *got == id))
}

fn received_messages(peer: &Peer) -> Vec<(u16, BytesMut)> {
    peer.events
        .iter()
        .filter_map(|e| match e {
            RTCPeerConnectionEvent::OnDataChannelMessage(id, payload) => {
                Some((*id, payload.clone()))
            }
            _ => None,
        })
        .collect()
}

#[test]
fn test_loopback_data_channel() -> Result<()> {
    let mut offerer = Peer::new(4001)?;
    let mut answerer = Peer::new(4002)?;

    let channel_id = offerer.pc.create_data_channel(
        "t",
        Some(RTCDataChannelInit {
            ordered: false,
            ..Default::default()
        }),
    )?;

    signal(&mut offerer, &mut answerer)?;
    pump(&mut offerer, &mut answerer);

    assert_eq!(offerer.connection_state(), RTCPeerConnectionState::Connected);
    assert_eq!(
        answerer.connection_state(),
        RTCPeerConnectionState::Connected
    );

    // the answerer learned about the channel with its label
    let datachannel_event = answerer.events.iter().find_map(|e| match e {
        RTCPeerConnectionEvent::OnDataChannel(info) => Some(info.clone()),
        _ => None,
    });
    let info = datachannel_event.expect("datachannel event on the answerer");
    assert_eq!(info.label, "t");
    assert!(!info.ordered);
    assert!(channel_open(&offerer, channel_id));

    // payload crosses the wire intact
    offerer.pc.send(channel_id, &[0x01, 0x02, 0x03])?;
    pump(&mut offerer, &mut answerer);

    let messages = received_messages(&answerer);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].1.as_ref(), &[0x01, 0x02, 0x03]);
    Ok(())
}

#[test]
fn test_send_ordering_is_preserved_on_the_wire() -> Result<()> {
    let mut offerer = Peer::new(4011)?;
    let mut answerer = Peer::new(4012)?;
    let channel_id = offerer.pc.create_data_channel("seq", None)?;
    signal(&mut offerer, &mut answerer)?;
    pump(&mut offerer, &mut answerer);
    assert!(channel_open(&offerer, channel_id));

    for i in 0..10u8 {
        offerer.pc.send(channel_id, &[i])?;
    }
    pump(&mut offerer, &mut answerer);

    let payloads: Vec<u8> = received_messages(&answerer)
        .iter()
        .map(|(_, p)| p[0])
        .collect();
    assert_eq!(payloads, (0..10).collect::<Vec<u8>>());
    Ok(())
}

#[test]
fn test_fingerprint_mismatch_fails_connection() -> Result<()> {
    let mut offerer = Peer::new(4021)?;
    let mut answerer = Peer::new(4022)?;
    offerer.pc.create_data_channel("t", None)?;

    let offer = offerer.pc.create_offer()?;
    offerer.pc.set_local_description(offer.clone())?;

    // hand the answerer a fabricated fingerprint for the offerer's cert
    let forged_sdp = {
        let mut lines: Vec<String> = offer.sdp.split("\r\n").map(str::to_owned).collect();
        for line in &mut lines {
            if line.starts_with("a=fingerprint:sha-256 ") {
                *line = "a=fingerprint:sha-256 00:11:22:33:44:55:66:77:88:99:aa:bb:cc:dd:ee:ff:00:11:22:33:44:55:66:77:88:99:aa:bb:cc:dd:ee:ff".to_owned();
            }
        }
        lines.join("\r\n")
    };
    let forged_offer =
        rtc::peer_connection::sdp::RTCSessionDescription::offer(forged_sdp)?;
    answerer.pc.set_remote_description(forged_offer)?;

    let answer = answerer.pc.create_answer()?;
    answerer.pc.set_local_description(answer.clone())?;
    offerer.pc.set_remote_description(answer)?;
    offerer.drain_events();
    answerer.drain_events();
    trickle(&mut offerer, &mut answerer)?;

    pump(&mut offerer, &mut answerer);

    // the answerer rejects the certificate and never sees a channel
    assert_eq!(answerer.connection_state(), RTCPeerConnectionState::Failed);
    assert!(!answerer
        .events
        .iter()
        .any(|e| matches!(e, RTCPeerConnectionEvent::OnDataChannel(_))));
    Ok(())
}

#[test]
fn test_answer_media_mismatch_is_rejected() -> Result<()> {
    let mut offerer = Peer::new(4031)?;
    let mut answerer = Peer::new(4032)?;
    offerer.pc.create_data_channel("t", None)?;

    let offer = offerer.pc.create_offer()?;
    offerer.pc.set_local_description(offer.clone())?;
    answerer.pc.set_remote_description(offer)?;
    let answer = answerer.pc.create_answer()?;

    // the answer comes back with an audio section instead of application
    let mangled_sdp = answer.sdp.replace(
        "m=application 9 UDP/DTLS/SCTP webrtc-datachannel",
        "m=audio 9 UDP/TLS/RTP/SAVPF 111",
    );
    let mangled = rtc::peer_connection::sdp::RTCSessionDescription::answer(mangled_sdp)?;

    let signaling_before = offerer.pc.signaling_state();
    let result = offerer.pc.set_remote_description(mangled);
    assert!(matches!(result, Err(Error::ErrInvalidSdp(_))));
    // a rejected call leaves the signaling state unchanged
    assert_eq!(offerer.pc.signaling_state(), signaling_before);
    Ok(())
}

#[test]
fn test_oversize_send_fails_synchronously() -> Result<()> {
    let mut offerer = Peer::new(4041)?;
    let mut answerer = Peer::new(4042)?;
    let channel_id = offerer.pc.create_data_channel("t", None)?;
    signal(&mut offerer, &mut answerer)?;
    pump(&mut offerer, &mut answerer);
    assert!(channel_open(&offerer, channel_id));

    // 1201 zero bytes: surfaced synchronously, nothing transmitted
    assert_eq!(
        offerer.pc.send(channel_id, &vec![0u8; 1201]),
        Err(Error::ErrOutboundPacketTooLarge)
    );

    // a subsequent 1200-byte send succeeds and is delivered
    offerer.pc.send(channel_id, &vec![0u8; 1200])?;
    pump(&mut offerer, &mut answerer);

    let messages = received_messages(&answerer);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].1.len(), 1200);
    Ok(())
}

#[test]
fn test_graceful_close() -> Result<()> {
    let mut offerer = Peer::new(4051)?;
    let mut answerer = Peer::new(4052)?;
    let channel_id = offerer.pc.create_data_channel("t", None)?;
    signal(&mut offerer, &mut answerer)?;
    pump(&mut offerer, &mut answerer);
    assert!(channel_open(&offerer, channel_id));

    offerer.pc.close()?;
    pump(&mut offerer, &mut answerer);

    assert_eq!(offerer.connection_state(), RTCPeerConnectionState::Closed);
    assert_eq!(answerer.connection_state(), RTCPeerConnectionState::Closed);

    // close is idempotent
    offerer.pc.close()?;
    offerer.pc.close()?;
    assert_eq!(offerer.connection_state(), RTCPeerConnectionState::Closed);

    // further operations fail
    assert_eq!(
        offerer.pc.create_data_channel("late", None).err(),
        Some(Error::ErrConnectionClosed)
    );
    assert_eq!(
        offerer.pc.send(channel_id, &[1]).err(),
        Some(Error::ErrConnectionClosed)
    );
    Ok(())
}
