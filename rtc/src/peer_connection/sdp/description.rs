use shared::error::{Error, Result};
use std::fmt;

/// One `a=` line: a flag (`a=ice-lite`) or a key-value (`a=mid:0`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub key: String,
    pub value: Option<String>,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: Option<String>) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}:{}", self.key, value),
            None => write!(f, "{}", self.key),
        }
    }
}

/// The `o=` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub username: String,
    pub session_id: u64,
    pub session_version: u64,
    pub network_type: String,
    pub address_type: String,
    pub unicast_address: String,
}

impl Default for Origin {
    fn default() -> Self {
        Self {
            username: "-".to_owned(),
            session_id: 0,
            session_version: 2,
            network_type: "IN".to_owned(),
            address_type: "IP4".to_owned(),
            unicast_address: "127.0.0.1".to_owned(),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            self.username,
            self.session_id,
            self.session_version,
            self.network_type,
            self.address_type,
            self.unicast_address,
        )
    }
}

/// One `m=` section. Only `application` sections with the
/// `UDP/DTLS/SCTP` profile exist in this stack, but foreign kinds are
/// parsed so mismatched answers can be rejected rather than misread.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct MediaDescription {
    pub media: String,
    pub port: u16,
    pub protos: Vec<String>,
    pub formats: Vec<String>,
    pub connection: Option<String>,
    pub attributes: Vec<Attribute>,
}

impl MediaDescription {
    /// Looks up the first attribute with the given key. The outer Option is
    /// presence; the inner is the value (None for flag attributes).
    pub fn attribute(&self, key: &str) -> Option<Option<&str>> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_deref())
    }

    pub fn attribute_value(&self, key: &str) -> Option<&str> {
        self.attribute(key).flatten()
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.attribute(key).is_some()
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Option<String>) -> Self {
        self.attributes.push(Attribute::new(key, value));
        self
    }
}

/// A parsed session description covering the profile's line set
/// (RFC 8866 subset). Serialization is canonical: parse-then-marshal of
/// anything this stack emits is byte identical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub version: u32,
    pub origin: Origin,
    pub session_name: String,
    pub connection: Option<String>,
    pub timing: String,
    pub attributes: Vec<Attribute>,
    pub media_descriptions: Vec<MediaDescription>,
}

impl Default for SessionDescription {
    fn default() -> Self {
        Self {
            version: 0,
            origin: Origin::default(),
            session_name: "-".to_owned(),
            connection: None,
            timing: "0 0".to_owned(),
            attributes: vec![],
            media_descriptions: vec![],
        }
    }
}

impl SessionDescription {
    pub fn attribute(&self, key: &str) -> Option<Option<&str>> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_deref())
    }

    pub fn attribute_value(&self, key: &str) -> Option<&str> {
        self.attribute(key).flatten()
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.attribute(key).is_some()
    }

    /// A session-level attribute, or its media-level override in `m`.
    pub fn media_or_session_attribute<'a>(
        &'a self,
        media: &'a MediaDescription,
        key: &str,
    ) -> Option<&'a str> {
        media
            .attribute_value(key)
            .or_else(|| self.attribute_value(key))
    }

    /// Serializes with CRLF line endings in canonical order.
    pub fn marshal(&self) -> String {
        let mut out = String::new();
        out += &format!("v={}\r\n", self.version);
        out += &format!("o={}\r\n", self.origin);
        out += &format!("s={}\r\n", self.session_name);
        if let Some(connection) = &self.connection {
            out += &format!("c={connection}\r\n");
        }
        out += &format!("t={}\r\n", self.timing);
        for attribute in &self.attributes {
            out += &format!("a={attribute}\r\n");
        }
        for media in &self.media_descriptions {
            out += &format!(
                "m={} {} {} {}\r\n",
                media.media,
                media.port,
                media.protos.join("/"),
                media.formats.join(" "),
            );
            if let Some(connection) = &media.connection {
                out += &format!("c={connection}\r\n");
            }
            for attribute in &media.attributes {
                out += &format!("a={attribute}\r\n");
            }
        }
        out
    }

    /// Parses CRLF-separated lines, accepting bare LF as a fallback.
    pub fn unmarshal(raw: &str) -> Result<Self> {
        let mut sd = SessionDescription {
            session_name: String::new(),
            timing: String::new(),
            ..Default::default()
        };
        let mut saw_version = false;
        let mut saw_origin = false;
        let mut current_media: Option<MediaDescription> = None;

        for line in raw.split("\r\n").flat_map(|l| l.split('\n')) {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (kind, value) = line
                .split_once('=')
                .ok_or_else(|| Error::ErrSdpInvalidSyntax(line.to_owned()))?;

            match kind {
                "v" => {
                    sd.version = value
                        .parse()
                        .map_err(|_| Error::ErrSdpInvalidValue(line.to_owned()))?;
                    saw_version = true;
                }
                "o" => {
                    let fields: Vec<&str> = value.split_whitespace().collect();
                    if fields.len() != 6 {
                        return Err(Error::ErrSdpInvalidValue(line.to_owned()));
                    }
                    sd.origin = Origin {
                        username: fields[0].to_owned(),
                        session_id: fields[1]
                            .parse()
                            .map_err(|_| Error::ErrSdpInvalidValue(line.to_owned()))?,
                        session_version: fields[2]
                            .parse()
                            .map_err(|_| Error::ErrSdpInvalidValue(line.to_owned()))?,
                        network_type: fields[3].to_owned(),
                        address_type: fields[4].to_owned(),
                        unicast_address: fields[5].to_owned(),
                    };
                    saw_origin = true;
                }
                "s" => sd.session_name = value.to_owned(),
                "t" => {
                    if current_media.is_none() {
                        sd.timing = value.to_owned();
                    }
                }
                "c" => match &mut current_media {
                    Some(media) => media.connection = Some(value.to_owned()),
                    None => sd.connection = Some(value.to_owned()),
                },
                "m" => {
                    if let Some(media) = current_media.take() {
                        sd.media_descriptions.push(media);
                    }
                    let fields: Vec<&str> = value.split_whitespace().collect();
                    if fields.len() < 3 {
                        return Err(Error::ErrSdpInvalidValue(line.to_owned()));
                    }
                    current_media = Some(MediaDescription {
                        media: fields[0].to_owned(),
                        port: fields[1]
                            .parse()
                            .map_err(|_| Error::ErrSdpInvalidValue(line.to_owned()))?,
                        protos: fields[2].split('/').map(str::to_owned).collect(),
                        formats: fields[3..].iter().map(|s| (*s).to_owned()).collect(),
                        connection: None,
                        attributes: vec![],
                    });
                }
                "a" => {
                    let attribute = match value.split_once(':') {
                        Some((key, v)) => Attribute::new(key, Some(v.to_owned())),
                        None => Attribute::new(value, None),
                    };
                    match &mut current_media {
                        Some(media) => media.attributes.push(attribute),
                        None => sd.attributes.push(attribute),
                    }
                }
                // b=, k=, i=, u=, e=, p=, r=, z= are outside the profile;
                // carried lines of those kinds are dropped
                _ => {}
            }
        }

        if let Some(media) = current_media.take() {
            sd.media_descriptions.push(media);
        }
        if !saw_version || !saw_origin {
            return Err(Error::ErrInvalidSdp("missing v= or o= line".to_owned()));
        }

        Ok(sd)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const DATA_CHANNEL_SDP: &str = "v=0\r\n\
o=- 1676398392635545971 2 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
a=group:BUNDLE 0\r\n\
a=extmap-allow-mixed\r\n\
a=msid-semantic: WMS\r\n\
m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n\
c=IN IP4 0.0.0.0\r\n\
a=ice-ufrag:ACMExyzACMExyzAB\r\n\
a=ice-pwd:ACMExyzACMExyzABACMExyzACMExyzAB\r\n\
a=ice-options:trickle\r\n\
a=fingerprint:sha-256 aa:bb:cc:dd:ee:ff:00:11:22:33:44:55:66:77:88:99:aa:bb:cc:dd:ee:ff:00:11:22:33:44:55:66:77:88:99\r\n\
a=setup:actpass\r\n\
a=mid:0\r\n\
a=sctp-port:5000\r\n\
a=max-message-size:1200\r\n";

    #[test]
    fn test_parse_then_marshal_is_byte_identical() -> Result<()> {
        let sd = SessionDescription::unmarshal(DATA_CHANNEL_SDP)?;
        assert_eq!(sd.marshal(), DATA_CHANNEL_SDP);
        Ok(())
    }

    #[test]
    fn test_lf_fallback() -> Result<()> {
        let lf_only = DATA_CHANNEL_SDP.replace("\r\n", "\n");
        let sd = SessionDescription::unmarshal(&lf_only)?;
        // normalization back to CRLF
        assert_eq!(sd.marshal(), DATA_CHANNEL_SDP);
        Ok(())
    }

    #[test]
    fn test_attribute_access() -> Result<()> {
        let sd = SessionDescription::unmarshal(DATA_CHANNEL_SDP)?;
        assert!(sd.has_attribute("extmap-allow-mixed"));
        assert_eq!(sd.attribute_value("group"), Some("BUNDLE 0"));

        let media = &sd.media_descriptions[0];
        assert_eq!(media.media, "application");
        assert_eq!(media.protos, vec!["UDP", "DTLS", "SCTP"]);
        assert_eq!(media.formats, vec!["webrtc-datachannel"]);
        assert_eq!(media.attribute_value("sctp-port"), Some("5000"));
        assert_eq!(media.attribute_value("mid"), Some("0"));
        assert_eq!(
            sd.media_or_session_attribute(media, "ice-ufrag"),
            Some("ACMExyzACMExyzAB")
        );
        Ok(())
    }

    #[test]
    fn test_session_level_ice_params_inherited() -> Result<()> {
        let sdp = "v=0\r\n\
o=- 1 2 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
a=ice-ufrag:sessionUfrag0000\r\n\
a=ice-pwd:sessionPwd0000000000000000000000\r\n\
m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n";
        let sd = SessionDescription::unmarshal(sdp)?;
        let media = &sd.media_descriptions[0];
        assert_eq!(
            sd.media_or_session_attribute(media, "ice-ufrag"),
            Some("sessionUfrag0000")
        );
        Ok(())
    }

    #[test]
    fn test_malformed_lines_rejected() {
        assert!(SessionDescription::unmarshal("not sdp at all").is_err());
        assert!(SessionDescription::unmarshal("v=0\r\no=bad\r\n").is_err());
        assert!(SessionDescription::unmarshal("v=zero\r\n").is_err());
        // an m= line with too few fields
        assert!(SessionDescription::unmarshal(
            "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\nm=application\r\n"
        )
        .is_err());
    }
}
