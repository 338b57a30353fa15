use crate::config::HandshakeConfig;
use crate::conn::{DtlsConn, DtlsEvent};
use bytes::BytesMut;
use shared::error::{Error, Result};
use shared::{Transmit, TransportContext};
use std::collections::hash_map::Entry::Vacant;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// The entry point of the dtls crate for embedders driving several remotes
/// over one socket.
///
/// This object performs no I/O whatsoever. Instead, it routes datagrams to
/// per-remote connections, collects their transmits via `poll_transmit`, and
/// surfaces their events tagged with the remote address.
pub struct Endpoint {
    local_addr: SocketAddr,
    server_config: Option<Arc<HandshakeConfig>>,
    connections: HashMap<SocketAddr, DtlsConn>,
    transmits: VecDeque<Transmit<BytesMut>>,
}

impl Endpoint {
    pub fn new(local_addr: SocketAddr, server_config: Option<Arc<HandshakeConfig>>) -> Self {
        Self {
            local_addr,
            server_config,
            connections: HashMap::new(),
            transmits: VecDeque::new(),
        }
    }

    /// Replace the server configuration, affecting new connections only.
    pub fn set_server_config(&mut self, server_config: Option<Arc<HandshakeConfig>>) {
        self.server_config = server_config;
    }

    pub fn get_connection(&self, remote: SocketAddr) -> Option<&DtlsConn> {
        self.connections.get(&remote)
    }

    pub fn get_connection_mut(&mut self, remote: SocketAddr) -> Option<&mut DtlsConn> {
        self.connections.get_mut(&remote)
    }

    /// Initiate a client handshake towards `remote`.
    pub fn connect(
        &mut self,
        now: Instant,
        remote: SocketAddr,
        client_config: Arc<HandshakeConfig>,
    ) -> Result<()> {
        if remote.port() == 0 {
            return Err(Error::Other(format!("invalid remote address: {remote}")));
        }

        if let Vacant(e) = self.connections.entry(remote) {
            let conn = e.insert(DtlsConn::new(client_config, true));
            conn.start_handshake(now)?;
        }
        self.drain(now, remote);
        Ok(())
    }

    /// Process an incoming datagram, creating a server-side connection for
    /// an unknown remote when a server config is present.
    pub fn read(
        &mut self,
        now: Instant,
        remote: SocketAddr,
        data: &[u8],
    ) -> Result<Vec<DtlsEvent>> {
        if let Vacant(e) = self.connections.entry(remote) {
            if let Some(server_config) = &self.server_config {
                e.insert(DtlsConn::new(server_config.clone(), false));
            } else {
                return Err(Error::ErrNoCertificate);
            }
        }

        let mut events = vec![];
        if let Some(conn) = self.connections.get_mut(&remote) {
            let result = conn.handle_read(now, data);
            while let Some(event) = conn.poll_event() {
                events.push(event);
            }
            self.drain(now, remote);
            result?;
        }
        Ok(events)
    }

    /// Send one application datagram to `remote`.
    pub fn write(&mut self, now: Instant, remote: SocketAddr, data: &[u8]) -> Result<()> {
        let conn = self
            .connections
            .get_mut(&remote)
            .ok_or_else(|| Error::Other(format!("invalid remote address: {remote}")))?;
        conn.write(data)?;
        self.drain(now, remote);
        Ok(())
    }

    pub fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        let remotes: Vec<SocketAddr> = self.connections.keys().copied().collect();
        let mut first_err = Ok(());
        for remote in remotes {
            if let Some(conn) = self.connections.get_mut(&remote) {
                if let Err(err) = conn.handle_timeout(now) {
                    if first_err.is_ok() {
                        first_err = Err(err);
                    }
                }
            }
            self.drain(now, remote);
        }
        first_err
    }

    pub fn poll_timeout(&self) -> Option<Instant> {
        self.connections
            .values()
            .filter_map(|c| c.poll_timeout())
            .min()
    }

    #[must_use]
    pub fn poll_transmit(&mut self) -> Option<Transmit<BytesMut>> {
        self.transmits.pop_front()
    }

    /// Close one connection (close_notify) and drop its state.
    pub fn close(&mut self, now: Instant, remote: SocketAddr) {
        if let Some(conn) = self.connections.get_mut(&remote) {
            conn.close();
        }
        self.drain(now, remote);
        self.connections.remove(&remote);
    }

    fn drain(&mut self, now: Instant, remote: SocketAddr) {
        if let Some(conn) = self.connections.get_mut(&remote) {
            while let Some(payload) = conn.poll_transmit() {
                self.transmits.push_back(Transmit {
                    now,
                    transport: TransportContext {
                        local_addr: self.local_addr,
                        peer_addr: remote,
                    },
                    message: payload,
                });
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::RemoteFingerprint;
    use crate::crypto::{fingerprint, Certificate};

    #[test]
    fn test_endpoint_pair_handshake() -> Result<()> {
        let client_cert = Certificate::generate_self_signed()?;
        let server_cert = Certificate::generate_self_signed()?;
        let client_fp = RemoteFingerprint {
            algorithm: "sha-256".to_owned(),
            value: fingerprint(&client_cert.certificate[0], "sha-256")?,
        };
        let server_fp = RemoteFingerprint {
            algorithm: "sha-256".to_owned(),
            value: fingerprint(&server_cert.certificate[0], "sha-256")?,
        };

        let client_addr: SocketAddr = "127.0.0.1:4444".parse().unwrap();
        let server_addr: SocketAddr = "127.0.0.1:5555".parse().unwrap();

        let mut client = Endpoint::new(client_addr, None);
        let mut server = Endpoint::new(
            server_addr,
            Some(Arc::new(
                HandshakeConfig::new(server_cert).with_remote_fingerprints(vec![client_fp]),
            )),
        );

        let now = Instant::now();
        client.connect(
            now,
            server_addr,
            Arc::new(HandshakeConfig::new(client_cert).with_remote_fingerprints(vec![server_fp])),
        )?;

        let mut client_events = vec![];
        let mut server_events = vec![];
        loop {
            let mut progressed = false;
            while let Some(t) = client.poll_transmit() {
                server_events.extend(server.read(now, client_addr, &t.message)?);
                progressed = true;
            }
            while let Some(t) = server.poll_transmit() {
                client_events.extend(client.read(now, server_addr, &t.message)?);
                progressed = true;
            }
            if !progressed {
                break;
            }
        }

        assert!(client_events.contains(&DtlsEvent::HandshakeComplete));
        assert!(server_events.contains(&DtlsEvent::HandshakeComplete));
        Ok(())
    }
}
