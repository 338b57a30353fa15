use shared::error::{Error, Result};
use std::fmt;

/// SchemeType of an ICE server url.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum SchemeType {
    #[default]
    Unknown,
    Stun,
    Turn,
}

impl From<&str> for SchemeType {
    fn from(raw: &str) -> Self {
        match raw {
            "stun" => Self::Stun,
            "turn" => Self::Turn,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for SchemeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Stun => "stun",
            Self::Turn => "turn",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Url represents a STUN or TURN server address with optional credentials,
/// parsed from the `stun:`/`turn:` URI forms of RFC 7064 / RFC 7065.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Url {
    pub scheme: SchemeType,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.scheme, self.host, self.port)
    }
}

impl Url {
    /// Parses `stun:host[:port]` or `turn:host[:port][?transport=udp]`.
    pub fn parse_url(raw: &str) -> Result<Self> {
        let (scheme_str, rest) = raw
            .split_once(':')
            .ok_or_else(|| Error::ErrInvalidCandidateAttribute(raw.to_owned()))?;
        let scheme = SchemeType::from(scheme_str);
        if scheme == SchemeType::Unknown {
            return Err(Error::ErrSchemeType);
        }

        // strip any ?transport=... query; only UDP exists in this profile
        let rest = rest.split('?').next().unwrap_or(rest);

        let (host, port) = if let Some(stripped) = rest.strip_prefix('[') {
            // bracketed IPv6 literal
            let (host, tail) = stripped
                .split_once(']')
                .ok_or_else(|| Error::ErrInvalidCandidateAttribute(raw.to_owned()))?;
            let port = match tail.strip_prefix(':') {
                Some(p) => p.parse::<u16>()?,
                None => stun::DEFAULT_PORT,
            };
            (host.to_owned(), port)
        } else if let Some((host, port)) = rest.split_once(':') {
            (host.to_owned(), port.parse::<u16>()?)
        } else {
            (rest.to_owned(), stun::DEFAULT_PORT)
        };

        if host.is_empty() {
            return Err(Error::ErrInvalidCandidateAttribute(raw.to_owned()));
        }

        Ok(Self {
            scheme,
            host,
            port,
            username: String::new(),
            password: String::new(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_url() -> Result<()> {
        let url = Url::parse_url("stun:stun.l.google.com:19302")?;
        assert_eq!(url.scheme, SchemeType::Stun);
        assert_eq!(url.host, "stun.l.google.com");
        assert_eq!(url.port, 19302);

        let url = Url::parse_url("turn:turn.example.org")?;
        assert_eq!(url.scheme, SchemeType::Turn);
        assert_eq!(url.port, stun::DEFAULT_PORT);

        let url = Url::parse_url("turn:turn.example.org:5000?transport=udp")?;
        assert_eq!(url.port, 5000);

        let url = Url::parse_url("stun:[::1]:3478")?;
        assert_eq!(url.host, "::1");

        assert!(Url::parse_url("http://example.com").is_err());
        assert!(Url::parse_url("garbage").is_err());
        Ok(())
    }
}
