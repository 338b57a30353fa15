use crate::message::{Message, TransactionId};
use bytes::BytesMut;
use shared::error::{Error, Result};
use shared::{Transmit, TransportContext};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::ops::Add;
use std::time::{Duration, Instant};

const DEFAULT_RTO: Duration = Duration::from_millis(500);
const DEFAULT_MAX_ATTEMPTS: u32 = 7;

/// ClientTransaction represents a transaction in progress. It owns the
/// serialized request so retransmissions re-send identical bytes.
#[derive(Debug, Clone)]
pub struct ClientTransaction {
    id: TransactionId,
    attempt: u32,
    rto: Duration,
    deadline: Instant,
    remote: SocketAddr,
    raw: Vec<u8>,
}

impl ClientTransaction {
    fn next_timeout(&self, now: Instant) -> Instant {
        // RFC 5389 Section 7.2.1: RTO doubles with each retransmission.
        now.add(self.rto * 2u32.pow(self.attempt.min(16)))
    }
}

/// Event is the terminal outcome of a transaction.
pub struct Event {
    pub id: TransactionId,
    pub remote: SocketAddr,
    pub result: Result<Message>,
}

/// Client drives retransmitting STUN transactions over an unreliable
/// datagram path. It performs no I/O: requests entered via `handle_write`
/// surface as transmits from `poll_transmit`, inbound responses are fed to
/// `handle_read`, and retransmission deadlines come from `poll_timeout`.
pub struct Client {
    local_addr: SocketAddr,
    max_attempts: u32,
    rto: Duration,
    closed: bool,
    transactions: HashMap<TransactionId, ClientTransaction>,
    transmits: VecDeque<Transmit<BytesMut>>,
    events: VecDeque<Event>,
}

impl Client {
    pub fn new(local_addr: SocketAddr) -> Self {
        Self {
            local_addr,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            rto: DEFAULT_RTO,
            closed: false,
            transactions: HashMap::new(),
            transmits: VecDeque::new(),
            events: VecDeque::new(),
        }
    }

    pub fn with_rto(mut self, rto: Duration) -> Self {
        self.rto = rto;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Whether any transaction is still awaiting a response.
    pub fn has_pending(&self) -> bool {
        !self.transactions.is_empty()
    }

    /// Starts a transaction towards `remote`.
    pub fn handle_write(&mut self, now: Instant, m: &Message, remote: SocketAddr) -> Result<()> {
        if self.closed {
            return Err(Error::ErrClientClosed);
        }

        let ct = ClientTransaction {
            id: m.transaction_id,
            attempt: 0,
            rto: self.rto,
            deadline: now.add(self.rto),
            remote,
            raw: m.raw.clone(),
        };

        self.transmits.push_back(Transmit {
            now,
            transport: TransportContext {
                local_addr: self.local_addr,
                peer_addr: remote,
            },
            message: BytesMut::from(&ct.raw[..]),
        });
        self.transactions.insert(ct.id, ct);

        Ok(())
    }

    /// Feeds a datagram that was classified as STUN. Returns true when the
    /// message matched a pending transaction.
    pub fn handle_read(&mut self, buf: &[u8]) -> Result<bool> {
        let mut msg = Message {
            raw: buf.to_vec(),
            ..Default::default()
        };
        msg.decode()?;

        if let Some(ct) = self.transactions.remove(&msg.transaction_id) {
            self.events.push_back(Event {
                id: ct.id,
                remote: ct.remote,
                result: Ok(msg),
            });
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Retransmits overdue transactions; exhausted ones fail.
    pub fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        let mut expired = vec![];
        for (id, ct) in self.transactions.iter_mut() {
            if now < ct.deadline {
                continue;
            }
            ct.attempt += 1;
            if ct.attempt >= self.max_attempts {
                expired.push(*id);
                continue;
            }
            ct.deadline = ct.next_timeout(now);
            self.transmits.push_back(Transmit {
                now,
                transport: TransportContext {
                    local_addr: self.local_addr,
                    peer_addr: ct.remote,
                },
                message: BytesMut::from(&ct.raw[..]),
            });
        }

        for id in expired {
            if let Some(ct) = self.transactions.remove(&id) {
                self.events.push_back(Event {
                    id,
                    remote: ct.remote,
                    result: Err(Error::ErrTransactionTimeOut),
                });
            }
        }

        Ok(())
    }

    pub fn poll_timeout(&self) -> Option<Instant> {
        self.transactions.values().map(|ct| ct.deadline).min()
    }

    #[must_use]
    pub fn poll_transmit(&mut self) -> Option<Transmit<BytesMut>> {
        self.transmits.pop_front()
    }

    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Fails every pending transaction and refuses further writes.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for (id, ct) in self.transactions.drain() {
            self.events.push_back(Event {
                id,
                remote: ct.remote,
                result: Err(Error::ErrClientClosed),
            });
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::message::{TransactionId, BINDING_REQUEST, BINDING_SUCCESS};

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn request() -> Message {
        let mut m = Message::new();
        m.build(&[Box::new(BINDING_REQUEST), Box::new(TransactionId::new())])
            .unwrap();
        m
    }

    #[test]
    fn test_transaction_success() -> Result<()> {
        let mut client = Client::new(addr("127.0.0.1:4000"));
        let now = Instant::now();
        let req = request();

        client.handle_write(now, &req, addr("127.0.0.1:3478"))?;
        let transmit = client.poll_transmit().expect("request transmit");
        assert_eq!(transmit.transport.peer_addr, addr("127.0.0.1:3478"));

        let mut resp = Message::new();
        resp.build(&[Box::new(req.clone()), Box::new(BINDING_SUCCESS)])?;
        resp.encode();
        assert!(client.handle_read(&resp.raw)?);

        let event = client.poll_event().expect("event");
        assert_eq!(event.id, req.transaction_id);
        assert!(event.result.is_ok());
        assert!(!client.has_pending());
        Ok(())
    }

    #[test]
    fn test_transaction_retransmit_then_fail() -> Result<()> {
        let mut client = Client::new(addr("127.0.0.1:4000")).with_max_attempts(3);
        let mut now = Instant::now();

        client.handle_write(now, &request(), addr("127.0.0.1:3478"))?;
        assert!(client.poll_transmit().is_some());

        // first deadline: retransmission
        now += Duration::from_secs(1);
        client.handle_timeout(now)?;
        assert!(client.poll_transmit().is_some());

        // keep firing deadlines until the budget is exhausted
        for _ in 0..4 {
            now += Duration::from_secs(8);
            client.handle_timeout(now)?;
            let _ = client.poll_transmit();
        }

        let event = client.poll_event().expect("failure event");
        assert_eq!(event.result.err(), Some(Error::ErrTransactionTimeOut));
        Ok(())
    }

    #[test]
    fn test_unmatched_response_ignored() -> Result<()> {
        let mut client = Client::new(addr("127.0.0.1:4000"));
        let mut resp = Message::new();
        resp.build(&[Box::new(BINDING_SUCCESS), Box::new(TransactionId::new())])?;
        resp.encode();
        assert!(!client.handle_read(&resp.raw)?);
        assert!(client.poll_event().is_none());
        Ok(())
    }
}
