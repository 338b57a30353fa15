use crate::message::{Getter, Message, Setter};
use shared::error::{Error, Result};
use std::fmt;

/// AttrType is the 16-bit attribute type from RFC 5389 Section 15.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AttrType(pub u16);

impl AttrType {
    /// Attributes with a type above 0x7FFF are comprehension-optional.
    pub fn optional(&self) -> bool {
        self.0 > 0x7fff
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            ATTR_MAPPED_ADDRESS => "MAPPED-ADDRESS",
            ATTR_USERNAME => "USERNAME",
            ATTR_MESSAGE_INTEGRITY => "MESSAGE-INTEGRITY",
            ATTR_ERROR_CODE => "ERROR-CODE",
            ATTR_REALM => "REALM",
            ATTR_NONCE => "NONCE",
            ATTR_XOR_RELAYED_ADDRESS => "XOR-RELAYED-ADDRESS",
            ATTR_REQUESTED_TRANSPORT => "REQUESTED-TRANSPORT",
            ATTR_XOR_MAPPED_ADDRESS => "XOR-MAPPED-ADDRESS",
            ATTR_PRIORITY => "PRIORITY",
            ATTR_USE_CANDIDATE => "USE-CANDIDATE",
            ATTR_SOFTWARE => "SOFTWARE",
            ATTR_FINGERPRINT => "FINGERPRINT",
            ATTR_ICE_CONTROLLED => "ICE-CONTROLLED",
            ATTR_ICE_CONTROLLING => "ICE-CONTROLLING",
            ATTR_LIFETIME => "LIFETIME",
            AttrType(v) => return write!(f, "0x{v:04x}"),
        };
        write!(f, "{s}")
    }
}

// Comprehension-required range (0x0000-0x7FFF).
pub const ATTR_MAPPED_ADDRESS: AttrType = AttrType(0x0001);
pub const ATTR_USERNAME: AttrType = AttrType(0x0006);
pub const ATTR_MESSAGE_INTEGRITY: AttrType = AttrType(0x0008);
pub const ATTR_ERROR_CODE: AttrType = AttrType(0x0009);
pub const ATTR_LIFETIME: AttrType = AttrType(0x000D);
pub const ATTR_REALM: AttrType = AttrType(0x0014);
pub const ATTR_NONCE: AttrType = AttrType(0x0015);
pub const ATTR_XOR_RELAYED_ADDRESS: AttrType = AttrType(0x0016);
pub const ATTR_REQUESTED_TRANSPORT: AttrType = AttrType(0x0019);
pub const ATTR_XOR_MAPPED_ADDRESS: AttrType = AttrType(0x0020);
pub const ATTR_PRIORITY: AttrType = AttrType(0x0024);
pub const ATTR_USE_CANDIDATE: AttrType = AttrType(0x0025);

// Comprehension-optional range (0x8000-0xFFFF).
pub const ATTR_SOFTWARE: AttrType = AttrType(0x8022);
pub const ATTR_FINGERPRINT: AttrType = AttrType(0x8028);
pub const ATTR_ICE_CONTROLLED: AttrType = AttrType(0x8029);
pub const ATTR_ICE_CONTROLLING: AttrType = AttrType(0x802A);

/// RawAttribute is a TLV as it appears on the wire; `offset` is its byte
/// position within the owning message for integrity/fingerprint prefixes.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct RawAttribute {
    pub typ: AttrType,
    pub length: u16,
    pub value: Vec<u8>,
    pub offset: usize,
}

/// Attributes is the ordered list of attributes of a message.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Attributes(pub Vec<RawAttribute>);

impl Attributes {
    pub fn get(&self, t: AttrType) -> Option<&RawAttribute> {
        self.0.iter().find(|a| a.typ == t)
    }
}

/// A zero-length flag attribute such as USE-CANDIDATE.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FlagAttr(pub AttrType);

/// USE-CANDIDATE attribute from RFC 8445 Section 7.1.2.
pub const USE_CANDIDATE: FlagAttr = FlagAttr(ATTR_USE_CANDIDATE);

impl Setter for FlagAttr {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.add(self.0, &[]);
        Ok(())
    }
}

/// A 4-byte unsigned integer attribute (PRIORITY, LIFETIME).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Uint32Attr {
    pub attr: AttrType,
    pub value: u32,
}

impl Uint32Attr {
    pub fn new(attr: AttrType, value: u32) -> Self {
        Self { attr, value }
    }
}

impl Setter for Uint32Attr {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.add(self.attr, &self.value.to_be_bytes());
        Ok(())
    }
}

impl Getter for Uint32Attr {
    fn get_from(&mut self, m: &Message) -> Result<()> {
        let v = m.get(self.attr)?;
        if v.len() != 4 {
            return Err(Error::ErrAttrSizeOverflow);
        }
        self.value = u32::from_be_bytes([v[0], v[1], v[2], v[3]]);
        Ok(())
    }
}

/// An 8-byte unsigned integer attribute (ICE-CONTROLLING, ICE-CONTROLLED).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Uint64Attr {
    pub attr: AttrType,
    pub value: u64,
}

impl Uint64Attr {
    pub fn new(attr: AttrType, value: u64) -> Self {
        Self { attr, value }
    }
}

impl Setter for Uint64Attr {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.add(self.attr, &self.value.to_be_bytes());
        Ok(())
    }
}

impl Getter for Uint64Attr {
    fn get_from(&mut self, m: &Message) -> Result<()> {
        let v = m.get(self.attr)?;
        if v.len() != 8 {
            return Err(Error::ErrAttrSizeOverflow);
        }
        self.value = u64::from_be_bytes([v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7]]);
        Ok(())
    }
}

const PROTO_UDP: u8 = 17;

/// REQUESTED-TRANSPORT attribute from RFC 5766 Section 14.7. Only UDP relay
/// transport exists in this profile.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct RequestedTransport;

impl Setter for RequestedTransport {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.add(ATTR_REQUESTED_TRANSPORT, &[PROTO_UDP, 0, 0, 0]);
        Ok(())
    }
}
