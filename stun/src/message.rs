use crate::attributes::{AttrType, Attributes, RawAttribute, ATTR_FINGERPRINT};
use rand::Rng;
use shared::error::{Error, Result};
use std::fmt;

/// Magic cookie value from RFC 5389 Section 6.
pub const MAGIC_COOKIE: u32 = 0x2112_A442;

pub const MESSAGE_HEADER_SIZE: usize = 20;
pub const ATTRIBUTE_HEADER_SIZE: usize = 4;
pub const TRANSACTION_ID_SIZE: usize = 12;

/// is_message returns true if b looks like a STUN message: the two topmost
/// bits of the first byte are zero and the magic cookie is in place.
pub fn is_message(b: &[u8]) -> bool {
    b.len() >= MESSAGE_HEADER_SIZE
        && b[0] < 4
        && u32::from_be_bytes([b[4], b[5], b[6], b[7]]) == MAGIC_COOKIE
}

/// STUN message class as defined in RFC 5389 Section 6.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct MessageClass(pub u8);

pub const CLASS_REQUEST: MessageClass = MessageClass(0x00);
pub const CLASS_INDICATION: MessageClass = MessageClass(0x01);
pub const CLASS_SUCCESS_RESPONSE: MessageClass = MessageClass(0x02);
pub const CLASS_ERROR_RESPONSE: MessageClass = MessageClass(0x03);

impl fmt::Display for MessageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            CLASS_REQUEST => "request",
            CLASS_INDICATION => "indication",
            CLASS_SUCCESS_RESPONSE => "success response",
            CLASS_ERROR_RESPONSE => "error response",
            _ => "unknown class",
        };
        write!(f, "{s}")
    }
}

/// STUN message method.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct Method(pub u16);

pub const METHOD_BINDING: Method = Method(0x001);
pub const METHOD_ALLOCATE: Method = Method(0x003);
pub const METHOD_REFRESH: Method = Method(0x004);
pub const METHOD_CREATE_PERMISSION: Method = Method(0x008);

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            METHOD_BINDING => "Binding",
            METHOD_ALLOCATE => "Allocate",
            METHOD_REFRESH => "Refresh",
            METHOD_CREATE_PERMISSION => "CreatePermission",
            Method(v) => return write!(f, "0x{v:x}"),
        };
        write!(f, "{s}")
    }
}

// Splitting and interleaving of method and class bits per RFC 5389 Section 6.
const METHOD_ABITS: u16 = 0xf; // 0b0000000000001111
const METHOD_BBITS: u16 = 0x70; // 0b0000000001110000
const METHOD_DBITS: u16 = 0xf80; // 0b0000111110000000

const METHOD_BSHIFT: u16 = 1;
const METHOD_DSHIFT: u16 = 2;

const FIRST_BIT: u16 = 0x1;
const SECOND_BIT: u16 = 0x2;

const C0BIT: u16 = FIRST_BIT;
const C1BIT: u16 = SECOND_BIT;

const CLASS_C0SHIFT: u16 = 4;
const CLASS_C1SHIFT: u16 = 7;

/// MessageType is STUN Message Type Field.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct MessageType {
    pub method: Method,
    pub class: MessageClass,
}

pub const BINDING_REQUEST: MessageType = MessageType {
    method: METHOD_BINDING,
    class: CLASS_REQUEST,
};
pub const BINDING_SUCCESS: MessageType = MessageType {
    method: METHOD_BINDING,
    class: CLASS_SUCCESS_RESPONSE,
};
pub const BINDING_ERROR: MessageType = MessageType {
    method: METHOD_BINDING,
    class: CLASS_ERROR_RESPONSE,
};
pub const ALLOCATE_REQUEST: MessageType = MessageType {
    method: METHOD_ALLOCATE,
    class: CLASS_REQUEST,
};

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.class)
    }
}

impl MessageType {
    pub const fn new(method: Method, class: MessageClass) -> Self {
        Self { method, class }
    }

    /// Returns the bit representation of the message type.
    pub fn value(&self) -> u16 {
        let m = self.method.0;
        let a = m & METHOD_ABITS;
        let b = (m & METHOD_BBITS) << METHOD_BSHIFT;
        let d = (m & METHOD_DBITS) << METHOD_DSHIFT;

        let c = self.class.0 as u16;
        let c0 = (c & C0BIT) << CLASS_C0SHIFT;
        let c1 = (c & C1BIT) << CLASS_C1SHIFT;

        a + b + d + c0 + c1
    }

    /// Decodes the message type from its bit representation.
    pub fn read_value(&mut self, v: u16) {
        let c0 = (v >> CLASS_C0SHIFT) & C0BIT;
        let c1 = (v >> CLASS_C1SHIFT) & C1BIT;
        self.class = MessageClass((c0 + c1) as u8);

        let a = v & METHOD_ABITS;
        let b = (v >> METHOD_BSHIFT) & METHOD_BBITS;
        let d = (v >> METHOD_DSHIFT) & METHOD_DBITS;
        self.method = Method(a + b + d);
    }
}

/// The 96-bit transaction identifier of a STUN message.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub [u8; TRANSACTION_ID_SIZE]);

impl TransactionId {
    /// Creates a cryptographically random transaction id.
    pub fn new() -> Self {
        let mut b = TransactionId([0u8; TRANSACTION_ID_SIZE]);
        rand::rng().fill(&mut b.0[..]);
        b
    }
}

impl Setter for TransactionId {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.transaction_id = *self;
        m.write_header();
        Ok(())
    }
}

/// Setter adds an attribute or field to a message being built.
pub trait Setter {
    fn add_to(&self, m: &mut Message) -> Result<()>;
}

/// Getter decodes an attribute or field out of a parsed message.
pub trait Getter {
    fn get_from(&mut self, m: &Message) -> Result<()>;
}

impl Setter for MessageType {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.typ = *self;
        m.write_header();
        Ok(())
    }
}

// A Message used as a Setter copies its transaction id, so responses can be
// built from the request they answer.
impl Setter for Message {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.transaction_id = self.transaction_id;
        m.write_header();
        Ok(())
    }
}

/// Message represents a single STUN packet. The `raw` buffer is kept in sync
/// with the decoded fields: building appends to it, `decode` parses from it.
#[derive(Default, Debug, Clone)]
pub struct Message {
    pub typ: MessageType,
    pub length: u32,
    pub transaction_id: TransactionId,
    pub attributes: Attributes,
    pub raw: Vec<u8>,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} l={} attrs={} id={:?}",
            self.typ,
            self.length,
            self.attributes.0.len(),
            self.transaction_id.0,
        )
    }
}

impl Message {
    pub fn new() -> Self {
        Self {
            raw: vec![0u8; MESSAGE_HEADER_SIZE],
            ..Default::default()
        }
    }

    /// Resets the message to an empty state, keeping the allocation.
    pub fn reset(&mut self) {
        self.typ = MessageType::default();
        self.length = 0;
        self.transaction_id = TransactionId::default();
        self.attributes.0.clear();
        self.raw.clear();
        self.raw.resize(MESSAGE_HEADER_SIZE, 0);
    }

    /// Applies setters in order on a freshly reset message.
    pub fn build(&mut self, setters: &[Box<dyn Setter>]) -> Result<()> {
        self.reset();
        self.write_header();
        for s in setters {
            s.add_to(self)?;
        }
        Ok(())
    }

    /// Re-writes the 20-byte header from the current fields.
    pub fn write_header(&mut self) {
        if self.raw.len() < MESSAGE_HEADER_SIZE {
            self.raw.resize(MESSAGE_HEADER_SIZE, 0);
        }
        let len = (self.raw.len() - MESSAGE_HEADER_SIZE) as u16;
        self.length = len as u32;

        let typ = self.typ.value();
        self.raw[0..2].copy_from_slice(&typ.to_be_bytes());
        self.raw[2..4].copy_from_slice(&len.to_be_bytes());
        self.raw[4..8].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
        self.raw[8..MESSAGE_HEADER_SIZE].copy_from_slice(&self.transaction_id.0);
    }

    /// Finalizes the raw buffer; kept for symmetry with `decode`.
    pub fn encode(&mut self) {
        self.write_header();
    }

    /// Appends an attribute, keeping `raw` and the attribute list in sync.
    pub fn add(&mut self, t: AttrType, v: &[u8]) {
        let offset = self.raw.len();
        let attr = RawAttribute {
            typ: t,
            length: v.len() as u16,
            value: v.to_vec(),
            offset,
        };

        self.raw.extend_from_slice(&t.0.to_be_bytes());
        self.raw.extend_from_slice(&attr.length.to_be_bytes());
        self.raw.extend_from_slice(v);
        // attribute values are padded to a 4-byte boundary
        let padded = (v.len() + 3) & !3;
        self.raw.resize(offset + ATTRIBUTE_HEADER_SIZE + padded, 0);

        self.attributes.0.push(attr);
        self.write_header();
    }

    /// Returns the (unpadded) value of the first attribute of type t.
    pub fn get(&self, t: AttrType) -> Result<Vec<u8>> {
        self.attributes
            .get(t)
            .map(|a| a.value.clone())
            .ok_or(Error::ErrAttributeNotFound)
    }

    pub fn contains(&self, t: AttrType) -> bool {
        self.attributes.get(t).is_some()
    }

    /// Parses `raw` into header fields and the attribute list.
    pub fn decode(&mut self) -> Result<()> {
        if self.raw.len() < MESSAGE_HEADER_SIZE {
            return Err(Error::ErrUnexpectedEof);
        }

        let t = u16::from_be_bytes([self.raw[0], self.raw[1]]);
        let length = u16::from_be_bytes([self.raw[2], self.raw[3]]) as usize;
        let cookie = u32::from_be_bytes([self.raw[4], self.raw[5], self.raw[6], self.raw[7]]);
        if cookie != MAGIC_COOKIE {
            return Err(Error::ErrMagicCookieMismatch);
        }
        if self.raw.len() != MESSAGE_HEADER_SIZE + length {
            return Err(Error::ErrAttrSizeOverflow);
        }

        self.typ.read_value(t);
        self.length = length as u32;
        self.transaction_id
            .0
            .copy_from_slice(&self.raw[8..MESSAGE_HEADER_SIZE]);

        self.attributes.0.clear();
        let mut offset = MESSAGE_HEADER_SIZE;
        while offset < self.raw.len() {
            if self.raw.len() - offset < ATTRIBUTE_HEADER_SIZE {
                return Err(Error::ErrUnexpectedEof);
            }
            let typ = AttrType(u16::from_be_bytes([self.raw[offset], self.raw[offset + 1]]));
            let alen = u16::from_be_bytes([self.raw[offset + 2], self.raw[offset + 3]]) as usize;
            let padded = (alen + 3) & !3;
            if self.raw.len() - offset - ATTRIBUTE_HEADER_SIZE < padded {
                return Err(Error::ErrAttrSizeOverflow);
            }
            let start = offset + ATTRIBUTE_HEADER_SIZE;
            self.attributes.0.push(RawAttribute {
                typ,
                length: alen as u16,
                value: self.raw[start..start + alen].to_vec(),
                offset,
            });
            offset = start + padded;
        }

        Ok(())
    }

    /// Byte offset of the first attribute of type t within `raw`.
    pub(crate) fn attr_offset(&self, t: AttrType) -> Option<usize> {
        self.attributes.get(t).map(|a| a.offset)
    }

    /// Returns a copy of `raw` truncated before the attribute at `offset`,
    /// with the header length patched to cover `extra` additional bytes.
    /// MESSAGE-INTEGRITY and FINGERPRINT are computed over such a prefix.
    pub(crate) fn prefix_with_length(&self, offset: usize, extra: usize) -> Vec<u8> {
        let mut buf = self.raw[..offset].to_vec();
        let len = (offset + extra - MESSAGE_HEADER_SIZE) as u16;
        buf[2..4].copy_from_slice(&len.to_be_bytes());
        buf
    }

    /// True once a FINGERPRINT attribute was appended; nothing may follow it.
    pub fn sealed(&self) -> bool {
        self.contains(ATTR_FINGERPRINT)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::attributes::ATTR_SOFTWARE;

    #[test]
    fn test_message_type_value_round_trip() {
        let tests = vec![
            BINDING_REQUEST,
            BINDING_SUCCESS,
            BINDING_ERROR,
            ALLOCATE_REQUEST,
            MessageType::new(METHOD_REFRESH, CLASS_SUCCESS_RESPONSE),
        ];
        for typ in tests {
            let mut decoded = MessageType::default();
            decoded.read_value(typ.value());
            assert_eq!(decoded, typ, "{typ} did not round trip");
        }
    }

    #[test]
    fn test_binding_request_value() {
        // RFC 5389: Binding request message type is 0x0001.
        assert_eq!(BINDING_REQUEST.value(), 0x0001);
        assert_eq!(BINDING_SUCCESS.value(), 0x0101);
        assert_eq!(BINDING_ERROR.value(), 0x0111);
    }

    #[test]
    fn test_message_encode_decode() -> shared::error::Result<()> {
        let mut m = Message::new();
        m.build(&[
            Box::new(BINDING_REQUEST),
            Box::new(TransactionId::new()),
        ])?;
        m.add(ATTR_SOFTWARE, b"test agent");
        m.encode();

        let mut decoded = Message {
            raw: m.raw.clone(),
            ..Default::default()
        };
        decoded.decode()?;

        assert_eq!(decoded.typ, BINDING_REQUEST);
        assert_eq!(decoded.transaction_id, m.transaction_id);
        assert_eq!(decoded.get(ATTR_SOFTWARE)?, b"test agent".to_vec());

        // parse-then-serialize must be byte identical
        let mut re = decoded.clone();
        re.encode();
        assert_eq!(re.raw, m.raw);
        Ok(())
    }

    #[test]
    fn test_is_message() {
        let mut m = Message::new();
        m.build(&[Box::new(BINDING_REQUEST), Box::new(TransactionId::new())])
            .unwrap();
        assert!(is_message(&m.raw));
        assert!(!is_message(&[0u8; 8]));
        assert!(!is_message(&[128u8; 20]));
    }
}
