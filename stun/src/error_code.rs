use crate::attributes::ATTR_ERROR_CODE;
use crate::message::{Getter, Message, Setter};
use shared::error::{Error, Result};
use std::fmt;

/// ErrorCode is the numeric part of the ERROR-CODE attribute.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct ErrorCode(pub u16);

pub const CODE_TRY_ALTERNATE: ErrorCode = ErrorCode(300);
pub const CODE_BAD_REQUEST: ErrorCode = ErrorCode(400);
pub const CODE_UNAUTHORIZED: ErrorCode = ErrorCode(401);
pub const CODE_UNKNOWN_ATTRIBUTE: ErrorCode = ErrorCode(420);
pub const CODE_STALE_NONCE: ErrorCode = ErrorCode(438);
pub const CODE_ROLE_CONFLICT: ErrorCode = ErrorCode(487);
pub const CODE_SERVER_ERROR: ErrorCode = ErrorCode(500);

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ErrorCodeAttribute implements ERROR-CODE from RFC 5389 Section 15.6.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct ErrorCodeAttribute {
    pub code: ErrorCode,
    pub reason: Vec<u8>,
}

impl fmt::Display for ErrorCodeAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.code,
            String::from_utf8_lossy(&self.reason)
        )
    }
}

const ERROR_CODE_MODULO: u16 = 100;

impl Setter for ErrorCodeAttribute {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        let mut value = Vec::with_capacity(4 + self.reason.len());
        let class = (self.code.0 / ERROR_CODE_MODULO) as u8;
        let number = (self.code.0 % ERROR_CODE_MODULO) as u8;
        value.extend_from_slice(&[0, 0, class, number]);
        value.extend_from_slice(&self.reason);
        m.add(ATTR_ERROR_CODE, &value);
        Ok(())
    }
}

impl Getter for ErrorCodeAttribute {
    fn get_from(&mut self, m: &Message) -> Result<()> {
        let v = m.get(ATTR_ERROR_CODE)?;
        if v.len() < 4 {
            return Err(Error::ErrUnexpectedEof);
        }
        let class = v[2] as u16;
        let number = v[3] as u16;
        self.code = ErrorCode(class * ERROR_CODE_MODULO + number);
        self.reason = v[4..].to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::message::{TransactionId, BINDING_ERROR};

    #[test]
    fn test_error_code_round_trip() -> Result<()> {
        let mut m = Message::new();
        m.build(&[Box::new(BINDING_ERROR), Box::new(TransactionId::new())])?;

        let attr = ErrorCodeAttribute {
            code: CODE_ROLE_CONFLICT,
            reason: b"Role Conflict".to_vec(),
        };
        attr.add_to(&mut m)?;

        let mut got = ErrorCodeAttribute::default();
        got.get_from(&m)?;
        assert_eq!(got, attr);
        Ok(())
    }
}
