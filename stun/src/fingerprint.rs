use crate::attributes::ATTR_FINGERPRINT;
use crate::message::{Message, Setter, ATTRIBUTE_HEADER_SIZE};
use crc::{Crc, CRC_32_ISO_HDLC};
use shared::error::{Error, Result};

const FINGERPRINT_XOR_VALUE: u32 = 0x5354_554e;
const FINGERPRINT_SIZE: usize = 4;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

fn fingerprint_value(b: &[u8]) -> u32 {
    CRC32.checksum(b) ^ FINGERPRINT_XOR_VALUE
}

/// FingerprintAttr implements the FINGERPRINT attribute from RFC 5389
/// Section 15.5: CRC-32 of the message XOR'ed with 0x5354554e, always the
/// last attribute.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct FingerprintAttr;

pub const FINGERPRINT: FingerprintAttr = FingerprintAttr;

impl FingerprintAttr {
    /// Verifies the attribute on a decoded message.
    pub fn check(&self, m: &Message) -> Result<()> {
        let offset = m
            .attr_offset(ATTR_FINGERPRINT)
            .ok_or(Error::ErrAttributeNotFound)?;
        let stored = m.get(ATTR_FINGERPRINT)?;
        if stored.len() != FINGERPRINT_SIZE {
            return Err(Error::ErrAttrSizeOverflow);
        }

        let prefix = m.prefix_with_length(offset, ATTRIBUTE_HEADER_SIZE + FINGERPRINT_SIZE);
        let expected = fingerprint_value(&prefix);
        let got = u32::from_be_bytes([stored[0], stored[1], stored[2], stored[3]]);
        if expected != got {
            return Err(Error::ErrFingerprintMismatch);
        }
        Ok(())
    }
}

impl Setter for FingerprintAttr {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        let prefix =
            m.prefix_with_length(m.raw.len(), ATTRIBUTE_HEADER_SIZE + FINGERPRINT_SIZE);
        let v = fingerprint_value(&prefix);
        m.add(ATTR_FINGERPRINT, &v.to_be_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::integrity::MessageIntegrity;
    use crate::message::{TransactionId, BINDING_REQUEST};

    #[test]
    fn test_fingerprint_check() -> Result<()> {
        let mut m = Message::new();
        m.build(&[
            Box::new(BINDING_REQUEST),
            Box::new(TransactionId::new()),
            Box::new(MessageIntegrity::new_short_term_integrity("pwd".to_owned())),
            Box::new(FINGERPRINT),
        ])?;
        m.encode();

        let mut decoded = Message {
            raw: m.raw.clone(),
            ..Default::default()
        };
        decoded.decode()?;
        FINGERPRINT.check(&decoded)?;

        // flipping a payload byte must break the fingerprint
        let mut corrupted = decoded.clone();
        corrupted.raw[MESSAGE_HEADER_POS] ^= 0xff;
        corrupted.decode()?;
        assert_eq!(
            FINGERPRINT.check(&corrupted),
            Err(Error::ErrFingerprintMismatch)
        );
        Ok(())
    }

    const MESSAGE_HEADER_POS: usize = 9; // inside the transaction id
}
