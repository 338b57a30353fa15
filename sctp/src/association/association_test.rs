use super::*;

fn client_server() -> (Association, Association) {
    let client = Association::new(AssociationConfig {
        side: Side::Client,
        ..Default::default()
    });
    let server = Association::new(AssociationConfig {
        side: Side::Server,
        ..Default::default()
    });
    (client, server)
}

/// Shuttles packets between two associations until both queues drain.
fn pump(now: Instant, a: &mut Association, b: &mut Association) {
    loop {
        let mut progressed = false;
        while let Some(raw) = a.poll_transmit() {
            b.handle_read(now, &raw).unwrap();
            progressed = true;
        }
        while let Some(raw) = b.poll_transmit() {
            a.handle_read(now, &raw).unwrap();
            progressed = true;
        }
        if !progressed {
            break;
        }
    }
}

fn establish(client: &mut Association, server: &mut Association) {
    let now = Instant::now();
    client.connect(now).unwrap();
    pump(now, client, server);
    assert_eq!(client.state(), AssociationState::Established);
    assert_eq!(server.state(), AssociationState::Established);
    assert_eq!(client.poll_event(), Some(AssociationEvent::Connected));
    assert_eq!(server.poll_event(), Some(AssociationEvent::Connected));
}

#[test]
fn test_four_way_handshake() {
    let (mut client, mut server) = client_server();
    establish(&mut client, &mut server);
}

#[test]
fn test_data_delivery() {
    let (mut client, mut server) = client_server();
    establish(&mut client, &mut server);
    let now = Instant::now();

    client
        .send(
            0,
            PayloadProtocolIdentifier::Binary,
            Bytes::from_static(&[1, 2, 3]),
            false,
        )
        .unwrap();
    pump(now, &mut client, &mut server);

    match server.poll_event() {
        Some(AssociationEvent::Data {
            stream_id,
            ppi,
            payload,
        }) => {
            assert_eq!(stream_id, 0);
            assert_eq!(ppi, PayloadProtocolIdentifier::Binary);
            assert_eq!(payload.as_ref(), &[1, 2, 3]);
        }
        other => panic!("expected Data event, got {other:?}"),
    }
}

#[test]
fn test_send_requires_established() {
    let (mut client, _) = client_server();
    assert_eq!(
        client.send(
            0,
            PayloadProtocolIdentifier::Binary,
            Bytes::from_static(&[0]),
            false,
        ),
        Err(Error::ErrSctpClosed)
    );
}

#[test]
fn test_payload_size_boundary() {
    let (mut client, mut server) = client_server();
    establish(&mut client, &mut server);
    let now = Instant::now();

    // exactly the MTU succeeds
    let at_limit = Bytes::from(vec![0u8; MAX_MESSAGE_SIZE]);
    client
        .send(0, PayloadProtocolIdentifier::Binary, at_limit, false)
        .unwrap();
    pump(now, &mut client, &mut server);
    match server.poll_event() {
        Some(AssociationEvent::Data { payload, .. }) => {
            assert_eq!(payload.len(), MAX_MESSAGE_SIZE)
        }
        other => panic!("expected Data event, got {other:?}"),
    }

    // one byte over fails synchronously, nothing is transmitted
    let over_limit = Bytes::from(vec![0u8; MAX_MESSAGE_SIZE + 1]);
    assert_eq!(
        client.send(0, PayloadProtocolIdentifier::Binary, over_limit, false),
        Err(Error::ErrOutboundPacketTooLarge)
    );
    assert!(client.poll_transmit().is_none());

    // a follow-up send at the limit still works
    client
        .send(
            0,
            PayloadProtocolIdentifier::Binary,
            Bytes::from(vec![0u8; MAX_MESSAGE_SIZE]),
            false,
        )
        .unwrap();
    pump(now, &mut client, &mut server);
    assert!(matches!(
        server.poll_event(),
        Some(AssociationEvent::Data { .. })
    ));
}

#[test]
fn test_tsn_wrap() {
    let (mut client, mut server) = client_server();
    establish(&mut client, &mut server);
    let now = Instant::now();

    // force the sender to the wrap point and align the receiver with it
    client.my_next_tsn = u32::MAX;
    server.peer_last_tsn = u32::MAX - 1;
    server.ooo_tsns.clear();

    for i in 0..3u8 {
        client
            .send(
                0,
                PayloadProtocolIdentifier::Binary,
                Bytes::from(vec![i]),
                false,
            )
            .unwrap();
    }
    assert_eq!(client.my_next_tsn, 2); // u32::MAX, 0, 1 were used

    pump(now, &mut client, &mut server);
    let mut delivered = vec![];
    while let Some(AssociationEvent::Data { payload, .. }) = server.poll_event() {
        delivered.push(payload[0]);
    }
    assert_eq!(delivered, vec![0, 1, 2]);
    assert_eq!(server.peer_last_tsn, 1);
}

#[test]
fn test_out_of_order_delivery_is_immediate() {
    let (mut client, mut server) = client_server();
    establish(&mut client, &mut server);
    let now = Instant::now();

    for i in 0..3u8 {
        client
            .send(
                0,
                PayloadProtocolIdentifier::Binary,
                Bytes::from(vec![i]),
                false,
            )
            .unwrap();
    }

    // deliver in reverse order; each datagram is still surfaced on arrival
    let mut packets = vec![];
    while let Some(raw) = client.poll_transmit() {
        packets.push(raw);
    }
    let base_tsn = server.peer_last_tsn;
    for raw in packets.iter().rev() {
        server.handle_read(now, raw).unwrap();
    }

    let mut delivered = vec![];
    while let Some(AssociationEvent::Data { payload, .. }) = server.poll_event() {
        delivered.push(payload[0]);
    }
    assert_eq!(delivered, vec![2, 1, 0]);
    // the cumulative point advanced across the whole burst
    assert_eq!(server.peer_last_tsn, base_tsn.wrapping_add(3));
}

#[test]
fn test_duplicate_data_dropped() {
    let (mut client, mut server) = client_server();
    establish(&mut client, &mut server);
    let now = Instant::now();

    client
        .send(
            0,
            PayloadProtocolIdentifier::Binary,
            Bytes::from_static(&[7]),
            false,
        )
        .unwrap();
    let raw = client.poll_transmit().unwrap();
    server.handle_read(now, &raw).unwrap();
    server.handle_read(now, &raw).unwrap();

    assert!(matches!(
        server.poll_event(),
        Some(AssociationEvent::Data { .. })
    ));
    assert_eq!(server.poll_event(), None);
}

#[test]
fn test_sack_is_ignored() {
    let (mut client, mut server) = client_server();
    establish(&mut client, &mut server);
    let now = Instant::now();

    // a SACK from a conforming peer must be accepted and produce nothing
    let sack = Packet {
        source_port: 5000,
        destination_port: 5000,
        verification_tag: server.my_verification_tag,
        chunks: vec![Chunk::Sack(crate::chunk::chunk_sack::ChunkSack {
            cumulative_tsn_ack: client.my_next_tsn,
            advertised_receiver_window_credit: 1500,
            gap_ack_blocks: vec![(1, 2)],
            duplicate_tsns: vec![],
        })],
    }
    .marshal();
    server.handle_read(now, &sack).unwrap();

    assert_eq!(server.poll_event(), None);
    assert!(server.poll_transmit().is_none());
}

#[test]
fn test_verification_tag_mismatch_drops_packet() {
    let (mut client, mut server) = client_server();
    establish(&mut client, &mut server);
    let now = Instant::now();

    let bogus = Packet {
        source_port: 5000,
        destination_port: 5000,
        verification_tag: server.my_verification_tag.wrapping_add(1),
        chunks: vec![Chunk::Data(ChunkData {
            unordered: true,
            tsn: server.peer_last_tsn.wrapping_add(1),
            stream_identifier: 0,
            stream_sequence_number: 0,
            payload_type: PayloadProtocolIdentifier::Binary,
            user_data: Bytes::from_static(&[1]),
        })],
    }
    .marshal();
    server.handle_read(now, &bogus).unwrap();
    assert_eq!(server.poll_event(), None);
}

#[test]
fn test_cookie_age_boundaries() {
    let key = [7u8; 16];
    let now_unix = 1_000_000u64;

    // exactly at the lifetime boundary: accepted
    let cookie = generate_cookie(&key, now_unix - 60);
    assert!(validate_cookie(&key, &cookie, now_unix).is_ok());

    // one second past: stale
    let cookie = generate_cookie(&key, now_unix - 61);
    assert_eq!(
        validate_cookie(&key, &cookie, now_unix),
        Err(Error::ErrSctpCookieStale)
    );

    // from the future: stale (clock skew is not forgiven)
    let cookie = generate_cookie(&key, now_unix + 5);
    assert_eq!(
        validate_cookie(&key, &cookie, now_unix),
        Err(Error::ErrSctpCookieStale)
    );

    // forged tag: invalid, not stale
    let mut forged = generate_cookie(&key, now_unix).to_vec();
    forged[10] ^= 0xff;
    assert_eq!(
        validate_cookie(&key, &forged, now_unix),
        Err(Error::ErrSctpCookieInvalid)
    );

    // truncated cookie
    assert_eq!(
        validate_cookie(&key, &forged[..10], now_unix),
        Err(Error::ErrSctpCookieInvalid)
    );
}

#[test]
fn test_stale_cookie_echo_gets_error_chunk() {
    let (mut client, mut server) = client_server();
    let now = Instant::now();

    // run INIT / INIT_ACK so the server knows the peer tag
    client.connect(now).unwrap();
    let init = client.poll_transmit().unwrap();
    server.handle_read(now, &init).unwrap();
    let init_ack = server.poll_transmit().unwrap();
    client.handle_read(now, &init_ack).unwrap();
    let _cookie_echo = client.poll_transmit().unwrap();

    // replay a COOKIE_ECHO whose cookie timestamp is two minutes old
    let stale_cookie = generate_cookie(&server.cookie_key, unix_now() - 120);
    let replay = Packet {
        source_port: 5000,
        destination_port: 5000,
        verification_tag: server.my_verification_tag,
        chunks: vec![Chunk::CookieEcho(
            crate::chunk::chunk_cookie::ChunkCookieEcho {
                cookie: stale_cookie,
            },
        )],
    }
    .marshal();
    server.handle_read(now, &replay).unwrap();

    // the server answers with ERROR carrying a Stale Cookie cause and the
    // association never reaches ESTABLISHED
    let raw = server.poll_transmit().expect("ERROR chunk expected");
    let packet = Packet::unmarshal(&raw).unwrap();
    match &packet.chunks[0] {
        Chunk::Error(e) => {
            assert_eq!(e.causes[0].code, CAUSE_STALE_COOKIE_ERROR);
        }
        other => panic!("expected ERROR chunk, got {other:?}"),
    }
    assert_eq!(server.state(), AssociationState::Closed);
}

#[test]
fn test_forged_cookie_echo_is_silently_dropped() {
    let (mut client, mut server) = client_server();
    let now = Instant::now();

    client.connect(now).unwrap();
    let init = client.poll_transmit().unwrap();
    server.handle_read(now, &init).unwrap();
    let _init_ack = server.poll_transmit().unwrap();

    let forged = Packet {
        source_port: 5000,
        destination_port: 5000,
        verification_tag: server.my_verification_tag,
        chunks: vec![Chunk::CookieEcho(
            crate::chunk::chunk_cookie::ChunkCookieEcho {
                cookie: Bytes::from(vec![0u8; 24]),
            },
        )],
    }
    .marshal();
    server.handle_read(now, &forged).unwrap();

    assert!(server.poll_transmit().is_none());
    assert_eq!(server.state(), AssociationState::Closed);
}

#[test]
fn test_graceful_shutdown() {
    let (mut client, mut server) = client_server();
    establish(&mut client, &mut server);
    let now = Instant::now();

    client.shutdown(now).unwrap();
    assert_eq!(client.state(), AssociationState::ShutdownSent);
    pump(now, &mut client, &mut server);

    assert_eq!(client.state(), AssociationState::Closed);
    assert_eq!(server.state(), AssociationState::Closed);
    assert_eq!(client.poll_event(), Some(AssociationEvent::Closed));
    assert_eq!(server.poll_event(), Some(AssociationEvent::Closed));
}

#[test]
fn test_abort_is_idempotent() {
    let (mut client, mut server) = client_server();
    establish(&mut client, &mut server);
    let now = Instant::now();

    client.abort();
    assert_eq!(client.state(), AssociationState::Closed);
    pump(now, &mut client, &mut server);
    assert_eq!(server.state(), AssociationState::Closed);

    // repeated aborts change nothing and emit nothing further
    client.abort();
    client.abort();
    assert_eq!(client.poll_event(), Some(AssociationEvent::Closed));
    assert_eq!(client.poll_event(), None);
    assert!(client.poll_transmit().is_none());
}

#[test]
fn test_init_retransmit_budget_closes_association() {
    let (mut client, _server) = client_server();
    let mut now = Instant::now();
    client.connect(now).unwrap();
    let _ = client.poll_transmit();

    for _ in 0..=MAX_INIT_RETRANS {
        now += Duration::from_secs(120);
        client.handle_timeout(now).unwrap();
    }

    assert_eq!(client.state(), AssociationState::Closed);
    assert_eq!(client.poll_event(), Some(AssociationEvent::Closed));
}

#[test]
fn test_stream_reset_round_trip() {
    let (mut client, mut server) = client_server();
    establish(&mut client, &mut server);
    let now = Instant::now();

    client.reset_streams(now, &[0, 4]).unwrap();
    // a second request while one is in flight must be refused
    assert_eq!(
        client.reset_streams(now, &[1]),
        Err(Error::ErrReconfigInFlight)
    );

    pump(now, &mut client, &mut server);
    assert_eq!(
        server.poll_event(),
        Some(AssociationEvent::StreamsReset(vec![0, 4]))
    );
    // the response cleared the in-flight slot
    assert!(client.pending_reconfig.is_none());
    client.reset_streams(now, &[1]).unwrap();
}

#[test]
fn test_add_outgoing_streams_round_trip() {
    let (mut client, mut server) = client_server();
    establish(&mut client, &mut server);
    let now = Instant::now();

    client.add_outgoing_streams(now, 8).unwrap();
    pump(now, &mut client, &mut server);
    assert_eq!(
        server.poll_event(),
        Some(AssociationEvent::StreamsAdded(8))
    );
    assert!(client.pending_reconfig.is_none());
}

#[test]
fn test_reconfig_retransmit_backoff() {
    let (mut client, mut server) = client_server();
    establish(&mut client, &mut server);
    let mut now = Instant::now();

    client.reset_streams(now, &[0]).unwrap();
    let first = client.poll_transmit().unwrap();

    // rto := ceil(rto * 1.5) on each firing
    let rto0 = client.pending_reconfig.as_ref().unwrap().rto_secs;
    now += Duration::from_secs_f64(rto0 + 0.1);
    client.handle_timeout(now).unwrap();
    let retransmitted = client.poll_transmit().unwrap();
    assert_eq!(first, retransmitted);
    let rto1 = client.pending_reconfig.as_ref().unwrap().rto_secs;
    assert_eq!(rto1, (rto0 * 1.5).ceil());

    // the response still settles the request
    server.handle_read(now, &retransmitted).unwrap();
    pump(now, &mut client, &mut server);
    assert!(client.pending_reconfig.is_none());
}

#[test]
fn test_ordered_send_keeps_per_stream_counters() {
    let (mut client, mut server) = client_server();
    establish(&mut client, &mut server);
    let now = Instant::now();

    client
        .send(
            3,
            PayloadProtocolIdentifier::Binary,
            Bytes::from_static(&[0]),
            true,
        )
        .unwrap();
    client
        .send(
            3,
            PayloadProtocolIdentifier::Binary,
            Bytes::from_static(&[1]),
            true,
        )
        .unwrap();
    client
        .send(
            9,
            PayloadProtocolIdentifier::Binary,
            Bytes::from_static(&[2]),
            true,
        )
        .unwrap();

    let mut ssns = vec![];
    while let Some(raw) = client.poll_transmit() {
        let packet = Packet::unmarshal(&raw).unwrap();
        if let Chunk::Data(d) = &packet.chunks[0] {
            ssns.push((d.stream_identifier, d.stream_sequence_number));
            assert!(!d.unordered);
        }
        server.handle_read(now, &raw).unwrap();
    }
    assert_eq!(ssns, vec![(3, 0), (3, 1), (9, 0)]);
}

#[test]
fn test_sna32_gt() {
    assert!(sna32_gt(1, 0));
    assert!(!sna32_gt(0, 1));
    assert!(!sna32_gt(5, 5));
    // wrap-around ordering
    assert!(sna32_gt(0, u32::MAX));
    assert!(sna32_gt(10, u32::MAX - 10));
    assert!(!sna32_gt(u32::MAX, 10));
}
