use crate::attributes::{ATTR_FINGERPRINT, ATTR_MESSAGE_INTEGRITY};
use crate::message::{Message, Setter, ATTRIBUTE_HEADER_SIZE};
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use sha1::Sha1;
use shared::error::{Error, Result};

type HmacSha1 = Hmac<Sha1>;

const MESSAGE_INTEGRITY_SIZE: usize = 20;

/// MessageIntegrity implements the MESSAGE-INTEGRITY attribute from RFC 5389
/// Section 15.4: an HMAC-SHA1 over the message up to (and covering the length
/// of) the attribute itself.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct MessageIntegrity(pub Vec<u8>);

impl MessageIntegrity {
    /// Short-term credential key: the raw password (RFC 5389 Section 10.1).
    pub fn new_short_term_integrity(password: String) -> Self {
        Self(password.into_bytes())
    }

    /// Long-term credential key: MD5(username ":" realm ":" password)
    /// (RFC 5389 Section 10.2), used by the TURN Allocate retry.
    pub fn new_long_term_integrity(username: String, realm: String, password: String) -> Self {
        let mut h = Md5::new();
        h.update(format!("{username}:{realm}:{password}").as_bytes());
        Self(h.finalize().to_vec())
    }

    fn hmac(key: &[u8], message: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha1::new_from_slice(key).expect("hmac accepts any key size");
        mac.update(message);
        mac.finalize().into_bytes().to_vec()
    }

    /// Verifies the attribute on a decoded message.
    pub fn check(&self, m: &mut Message) -> Result<()> {
        let offset = m
            .attr_offset(ATTR_MESSAGE_INTEGRITY)
            .ok_or(Error::ErrAttributeNotFound)?;
        let stored = m.get(ATTR_MESSAGE_INTEGRITY)?;
        if stored.len() != MESSAGE_INTEGRITY_SIZE {
            return Err(Error::ErrAttrSizeOverflow);
        }

        // the prefix length must cover the attribute itself, but nothing past it
        let prefix =
            m.prefix_with_length(offset, ATTRIBUTE_HEADER_SIZE + MESSAGE_INTEGRITY_SIZE);
        let expected = Self::hmac(&self.0, &prefix);
        if expected != stored {
            return Err(Error::ErrIntegrityMismatch);
        }
        Ok(())
    }
}

impl Setter for MessageIntegrity {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        // FINGERPRINT is always the last attribute
        if m.sealed() {
            return Err(Error::Other(
                "MESSAGE-INTEGRITY must precede FINGERPRINT".to_owned(),
            ));
        }
        let prefix = m.prefix_with_length(
            m.raw.len(),
            ATTRIBUTE_HEADER_SIZE + MESSAGE_INTEGRITY_SIZE,
        );
        let digest = Self::hmac(&self.0, &prefix);
        m.add(ATTR_MESSAGE_INTEGRITY, &digest);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::message::{TransactionId, BINDING_REQUEST};

    #[test]
    fn test_message_integrity_check() -> Result<()> {
        let integrity = MessageIntegrity::new_short_term_integrity("qwerty".to_owned());

        let mut m = Message::new();
        m.build(&[
            Box::new(BINDING_REQUEST),
            Box::new(TransactionId::new()),
            Box::new(integrity.clone()),
        ])?;
        m.encode();

        let mut decoded = Message {
            raw: m.raw.clone(),
            ..Default::default()
        };
        decoded.decode()?;
        integrity.check(&mut decoded)?;

        let wrong = MessageIntegrity::new_short_term_integrity("dvorak".to_owned());
        assert_eq!(
            wrong.check(&mut decoded),
            Err(Error::ErrIntegrityMismatch)
        );
        Ok(())
    }

    #[test]
    fn test_long_term_key_derivation() {
        // RFC 5389 Section 15.4 example key input
        let a = MessageIntegrity::new_long_term_integrity(
            "user".to_owned(),
            "realm".to_owned(),
            "pass".to_owned(),
        );
        let b = MessageIntegrity::new_long_term_integrity(
            "user".to_owned(),
            "realm".to_owned(),
            "pass".to_owned(),
        );
        assert_eq!(a, b);
        assert_eq!(a.0.len(), 16);
    }
}
