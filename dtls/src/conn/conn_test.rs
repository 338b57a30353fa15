use super::*;
use crate::config::RemoteFingerprint;
use crate::crypto::Certificate;

fn conn_pair() -> (DtlsConn, DtlsConn) {
    let client_cert = Certificate::generate_self_signed().unwrap();
    let server_cert = Certificate::generate_self_signed().unwrap();

    let client_fp = RemoteFingerprint {
        algorithm: "sha-256".to_owned(),
        value: fingerprint(&client_cert.certificate[0], "sha-256").unwrap(),
    };
    let server_fp = RemoteFingerprint {
        algorithm: "sha-256".to_owned(),
        value: fingerprint(&server_cert.certificate[0], "sha-256").unwrap(),
    };

    let client = DtlsConn::new(
        Arc::new(HandshakeConfig::new(client_cert).with_remote_fingerprints(vec![server_fp])),
        true,
    );
    let server = DtlsConn::new(
        Arc::new(HandshakeConfig::new(server_cert).with_remote_fingerprints(vec![client_fp])),
        false,
    );
    (client, server)
}

fn pump(now: Instant, a: &mut DtlsConn, b: &mut DtlsConn) -> Result<()> {
    loop {
        let mut progressed = false;
        while let Some(datagram) = a.poll_transmit() {
            b.handle_read(now, &datagram)?;
            progressed = true;
        }
        while let Some(datagram) = b.poll_transmit() {
            a.handle_read(now, &datagram)?;
            progressed = true;
        }
        if !progressed {
            return Ok(());
        }
    }
}

#[test]
fn test_handshake_completes() -> Result<()> {
    let (mut client, mut server) = conn_pair();
    let now = Instant::now();

    client.start_handshake(now)?;
    pump(now, &mut client, &mut server)?;

    assert!(client.is_handshake_completed());
    assert!(server.is_handshake_completed());
    assert_eq!(client.poll_event(), Some(DtlsEvent::HandshakeComplete));
    assert_eq!(server.poll_event(), Some(DtlsEvent::HandshakeComplete));
    assert!(client.peer_certificate().is_some());
    assert!(server.peer_certificate().is_some());
    Ok(())
}

#[test]
fn test_application_data_round_trip() -> Result<()> {
    let (mut client, mut server) = conn_pair();
    let now = Instant::now();
    client.start_handshake(now)?;
    pump(now, &mut client, &mut server)?;
    let _ = client.poll_event();
    let _ = server.poll_event();

    client.write(b"ping over dtls")?;
    pump(now, &mut client, &mut server)?;
    assert_eq!(
        server.poll_event(),
        Some(DtlsEvent::ApplicationData(BytesMut::from(
            &b"ping over dtls"[..]
        )))
    );

    server.write(b"pong")?;
    pump(now, &mut client, &mut server)?;
    assert_eq!(
        client.poll_event(),
        Some(DtlsEvent::ApplicationData(BytesMut::from(&b"pong"[..])))
    );
    Ok(())
}

#[test]
fn test_write_before_handshake_fails() {
    let (mut client, _server) = conn_pair();
    assert_eq!(client.write(b"too early"), Err(Error::ErrDtlsClosed));
}

#[test]
fn test_fingerprint_mismatch_is_fatal() {
    let client_cert = Certificate::generate_self_signed().unwrap();
    let server_cert = Certificate::generate_self_signed().unwrap();

    // the client advertises a fabricated fingerprint for the server
    let bogus = RemoteFingerprint {
        algorithm: "sha-256".to_owned(),
        value: "00:11:22:33:44:55:66:77:88:99:aa:bb:cc:dd:ee:ff:00:11:22:33:44:55:66:77:88:99:aa:bb:cc:dd:ee:ff".to_owned(),
    };
    let real_client_fp = RemoteFingerprint {
        algorithm: "sha-256".to_owned(),
        value: fingerprint(&client_cert.certificate[0], "sha-256").unwrap(),
    };

    let mut client = DtlsConn::new(
        Arc::new(HandshakeConfig::new(client_cert).with_remote_fingerprints(vec![bogus])),
        true,
    );
    let mut server = DtlsConn::new(
        Arc::new(
            HandshakeConfig::new(server_cert).with_remote_fingerprints(vec![real_client_fp]),
        ),
        false,
    );

    let now = Instant::now();
    client.start_handshake(now).unwrap();
    let result = pump(now, &mut client, &mut server);
    assert_eq!(result, Err(Error::ErrDtlsFingerprintMismatch));
    assert!(!client.is_handshake_completed());
    assert!(!server.is_handshake_completed());
}

#[test]
fn test_case_insensitive_fingerprint_match() -> Result<()> {
    let client_cert = Certificate::generate_self_signed().unwrap();
    let server_cert = Certificate::generate_self_signed().unwrap();

    let server_fp_upper = RemoteFingerprint {
        algorithm: "sha-256".to_owned(),
        value: fingerprint(&server_cert.certificate[0], "sha-256")
            .unwrap()
            .to_ascii_uppercase(),
    };
    let client_fp = RemoteFingerprint {
        algorithm: "sha-256".to_owned(),
        value: fingerprint(&client_cert.certificate[0], "sha-256").unwrap(),
    };

    let mut client = DtlsConn::new(
        Arc::new(
            HandshakeConfig::new(client_cert).with_remote_fingerprints(vec![server_fp_upper]),
        ),
        true,
    );
    let mut server = DtlsConn::new(
        Arc::new(HandshakeConfig::new(server_cert).with_remote_fingerprints(vec![client_fp])),
        false,
    );

    let now = Instant::now();
    client.start_handshake(now)?;
    pump(now, &mut client, &mut server)?;
    assert!(client.is_handshake_completed());
    Ok(())
}

#[test]
fn test_flight_retransmission_with_backoff() -> Result<()> {
    let (mut client, _server) = conn_pair();
    let mut now = Instant::now();

    client.start_handshake(now)?;
    let first = client.poll_transmit().expect("ClientHello");
    assert!(client.poll_transmit().is_none());

    // nothing back from the server: the flight fires again after 1 s
    assert_eq!(client.poll_timeout(), Some(now + Duration::from_secs(1)));
    now += Duration::from_secs(1);
    client.handle_timeout(now)?;
    let second = client.poll_transmit().expect("retransmitted ClientHello");
    assert_eq!(first, second);

    // and the interval doubled
    assert_eq!(client.poll_timeout(), Some(now + Duration::from_secs(2)));
    Ok(())
}

#[test]
fn test_retransmit_budget_exhaustion() {
    let (mut client, _server) = conn_pair();
    let mut now = Instant::now();
    client.start_handshake(now).unwrap();

    let mut result = Ok(());
    for _ in 0..=8 {
        now += Duration::from_secs(120);
        result = client.handle_timeout(now);
        while client.poll_transmit().is_some() {}
        if result.is_err() {
            break;
        }
    }
    assert!(matches!(result, Err(Error::ErrDtlsHandshakeFailed(_))));
    assert!(!client.is_handshake_completed());
}

#[test]
fn test_lost_flight_recovery() -> Result<()> {
    let (mut client, mut server) = conn_pair();
    let mut now = Instant::now();

    client.start_handshake(now)?;
    // drop the first ClientHello on the floor
    let _lost = client.poll_transmit().expect("ClientHello");

    // retransmission timer recovers the handshake
    now += Duration::from_secs(1);
    client.handle_timeout(now)?;
    pump(now, &mut client, &mut server)?;

    assert!(client.is_handshake_completed());
    assert!(server.is_handshake_completed());
    Ok(())
}

#[test]
fn test_close_notify() -> Result<()> {
    let (mut client, mut server) = conn_pair();
    let now = Instant::now();
    client.start_handshake(now)?;
    pump(now, &mut client, &mut server)?;
    let _ = client.poll_event();
    let _ = server.poll_event();

    client.close();
    pump(now, &mut client, &mut server)?;
    assert_eq!(server.poll_event(), Some(DtlsEvent::PeerClose));

    // close is idempotent and the connection refuses writes
    client.close();
    assert_eq!(client.write(b"after close"), Err(Error::ErrDtlsClosed));
    Ok(())
}

#[test]
fn test_garbage_datagram_is_rejected() {
    let (_, mut server) = conn_pair();
    let now = Instant::now();
    assert!(server.handle_read(now, &[0xff; 40]).is_err());
}
