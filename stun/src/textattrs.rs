use crate::attributes::{AttrType, ATTR_NONCE, ATTR_REALM, ATTR_SOFTWARE, ATTR_USERNAME};
use crate::message::{Getter, Message, Setter};
use shared::error::Result;
use std::fmt;

const MAX_TEXT_LENGTH: usize = 763;

/// TextAttribute is a textual STUN attribute (USERNAME, REALM, NONCE,
/// SOFTWARE). The value is carried verbatim, without padding in the
/// decoded form.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct TextAttribute {
    pub attr: AttrType,
    pub text: String,
}

pub type Username = TextAttribute;
pub type Realm = TextAttribute;
pub type Nonce = TextAttribute;
pub type Software = TextAttribute;

impl fmt::Display for TextAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl TextAttribute {
    pub fn new(attr: AttrType, text: String) -> Self {
        Self { attr, text }
    }

    pub fn new_username(text: String) -> Self {
        Self::new(ATTR_USERNAME, text)
    }

    pub fn new_realm(text: String) -> Self {
        Self::new(ATTR_REALM, text)
    }

    pub fn new_nonce(text: String) -> Self {
        Self::new(ATTR_NONCE, text)
    }

    pub fn new_software(text: String) -> Self {
        Self::new(ATTR_SOFTWARE, text)
    }
}

impl Setter for TextAttribute {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        let text = self.text.as_bytes();
        let truncated = &text[..text.len().min(MAX_TEXT_LENGTH)];
        m.add(self.attr, truncated);
        Ok(())
    }
}

impl Getter for TextAttribute {
    fn get_from(&mut self, m: &Message) -> Result<()> {
        let v = m.get(self.attr)?;
        self.text = String::from_utf8(v)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::message::{TransactionId, BINDING_REQUEST};

    #[test]
    fn test_text_attribute_round_trip() -> Result<()> {
        let mut m = Message::new();
        m.build(&[Box::new(BINDING_REQUEST), Box::new(TransactionId::new())])?;
        TextAttribute::new_username("alice:bob".to_owned()).add_to(&mut m)?;
        m.encode();

        let mut decoded = Message {
            raw: m.raw.clone(),
            ..Default::default()
        };
        decoded.decode()?;

        let mut username = Username::new(ATTR_USERNAME, String::new());
        username.get_from(&decoded)?;
        assert_eq!(username.to_string(), "alice:bob");
        Ok(())
    }
}
