use crate::attributes::{AttrType, ATTR_XOR_MAPPED_ADDRESS};
use crate::message::{Getter, Message, Setter, MAGIC_COOKIE};
use shared::error::{Error, Result};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

const FAMILY_IPV4: u8 = 0x01;
const FAMILY_IPV6: u8 = 0x02;

/// XorMappedAddress implements XOR-MAPPED-ADDRESS from RFC 5389
/// Section 15.2. With `add_to_as`/`get_from_as` it also carries
/// XOR-RELAYED-ADDRESS (RFC 5766).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XorMappedAddress {
    pub ip: IpAddr,
    pub port: u16,
}

impl Default for XorMappedAddress {
    fn default() -> Self {
        Self {
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
        }
    }
}

impl fmt::Display for XorMappedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            IpAddr::V4(ip) => write!(f, "{ip}:{}", self.port),
            IpAddr::V6(ip) => write!(f, "[{ip}]:{}", self.port),
        }
    }
}

impl XorMappedAddress {
    /// Encodes the address under the given attribute type.
    pub fn add_to_as(&self, m: &mut Message, t: AttrType) -> Result<()> {
        let xor_port = self.port ^ (MAGIC_COOKIE >> 16) as u16;
        let mut value = Vec::with_capacity(20);
        value.push(0);

        match self.ip {
            IpAddr::V4(ip) => {
                value.push(FAMILY_IPV4);
                value.extend_from_slice(&xor_port.to_be_bytes());
                let xored = u32::from(ip) ^ MAGIC_COOKIE;
                value.extend_from_slice(&xored.to_be_bytes());
            }
            IpAddr::V6(ip) => {
                value.push(FAMILY_IPV6);
                value.extend_from_slice(&xor_port.to_be_bytes());
                let mut xor_mask = [0u8; 16];
                xor_mask[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
                xor_mask[4..].copy_from_slice(&m.transaction_id.0);
                let octets = ip.octets();
                for i in 0..16 {
                    value.push(octets[i] ^ xor_mask[i]);
                }
            }
        }

        m.add(t, &value);
        Ok(())
    }

    /// Decodes the address stored under the given attribute type.
    pub fn get_from_as(&mut self, m: &Message, t: AttrType) -> Result<()> {
        let v = m.get(t)?;
        if v.len() < 8 {
            return Err(Error::ErrUnexpectedEof);
        }

        let family = v[1];
        let xor_port = u16::from_be_bytes([v[2], v[3]]);
        self.port = xor_port ^ (MAGIC_COOKIE >> 16) as u16;

        match family {
            FAMILY_IPV4 => {
                let xored = u32::from_be_bytes([v[4], v[5], v[6], v[7]]);
                self.ip = IpAddr::V4(Ipv4Addr::from(xored ^ MAGIC_COOKIE));
            }
            FAMILY_IPV6 => {
                if v.len() < 20 {
                    return Err(Error::ErrUnexpectedEof);
                }
                let mut xor_mask = [0u8; 16];
                xor_mask[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
                xor_mask[4..].copy_from_slice(&m.transaction_id.0);
                let mut octets = [0u8; 16];
                for i in 0..16 {
                    octets[i] = v[4 + i] ^ xor_mask[i];
                }
                self.ip = IpAddr::V6(Ipv6Addr::from(octets));
            }
            _ => return Err(Error::Other(format!("unknown address family {family}"))),
        }

        Ok(())
    }
}

impl Setter for XorMappedAddress {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        self.add_to_as(m, ATTR_XOR_MAPPED_ADDRESS)
    }
}

impl Getter for XorMappedAddress {
    fn get_from(&mut self, m: &Message) -> Result<()> {
        self.get_from_as(m, ATTR_XOR_MAPPED_ADDRESS)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::message::{TransactionId, BINDING_SUCCESS};

    #[test]
    fn test_xor_mapped_address_v4() -> Result<()> {
        let mut m = Message::new();
        m.build(&[Box::new(BINDING_SUCCESS), Box::new(TransactionId::new())])?;

        let addr = XorMappedAddress {
            ip: "192.0.2.1".parse().unwrap(),
            port: 32768,
        };
        addr.add_to(&mut m)?;

        let mut got = XorMappedAddress::default();
        got.get_from(&m)?;
        assert_eq!(got, addr);
        Ok(())
    }

    #[test]
    fn test_xor_mapped_address_v6() -> Result<()> {
        let mut m = Message::new();
        m.build(&[Box::new(BINDING_SUCCESS), Box::new(TransactionId::new())])?;

        let addr = XorMappedAddress {
            ip: "2001:db8::1".parse().unwrap(),
            port: 5000,
        };
        addr.add_to(&mut m)?;

        let mut got = XorMappedAddress::default();
        got.get_from(&m)?;
        assert_eq!(got, addr);
        Ok(())
    }
}
