use crate::peer_connection::configuration::RTCBundlePolicy;
use crate::peer_connection::sdp::description::{
    Attribute, MediaDescription, Origin, SessionDescription,
};
use crate::peer_connection::RTCPeerConnection;
use crate::transport::{RTCDtlsFingerprint, RTCDtlsRole};
use shared::error::{Error, Result};

pub(crate) const MEDIA_KIND_APPLICATION: &str = "application";
pub(crate) const PROFILE_UDP_DTLS_SCTP: &str = "UDP/DTLS/SCTP";
pub(crate) const FORMAT_WEBRTC_DATACHANNEL: &str = "webrtc-datachannel";
pub(crate) const DEFAULT_SCTP_PORT: u16 = 5000;

/// Everything the transports need out of a remote description.
#[derive(Debug, Clone)]
pub(crate) struct RemoteDescriptionParams {
    pub(crate) ice_ufrag: String,
    pub(crate) ice_pwd: String,
    pub(crate) ice_lite: bool,
    pub(crate) fingerprints: Vec<RTCDtlsFingerprint>,
    pub(crate) setup: RTCDtlsRole,
    pub(crate) sctp_port: u16,
    pub(crate) candidates: Vec<String>,
    pub(crate) media_kinds: Vec<String>,
    pub(crate) mid: String,
}

impl RTCPeerConnection {
    /// Builds a local description. `is_offer` selects the `a=setup` value:
    /// the offerer advertises `actpass`, the answerer commits to a role.
    pub(crate) fn build_session_description(
        &mut self,
        is_offer: bool,
    ) -> Result<SessionDescription> {
        let agent = self
            .pipeline_context
            .ice_handler_context
            .agent
            .as_ref()
            .ok_or(Error::ErrAgentClosed)?;
        let (ice_ufrag, ice_pwd) = agent.get_local_user_credentials();

        let setup = if is_offer {
            RTCDtlsRole::Auto.to_string()
        } else {
            let remote_setup = self
                .remote_params
                .as_ref()
                .map(|p| p.setup)
                .unwrap_or(RTCDtlsRole::Auto);
            // the unidirectional fallback: an active offerer gets a passive
            // answer, everyone else answers active
            match remote_setup {
                RTCDtlsRole::Client => RTCDtlsRole::Server.to_string(),
                _ => RTCDtlsRole::Client.to_string(),
            }
        };

        let mid = if is_offer {
            "0".to_owned()
        } else {
            self.remote_params
                .as_ref()
                .map(|p| p.mid.clone())
                .unwrap_or_else(|| "0".to_owned())
        };

        let mut sd = SessionDescription {
            origin: Origin {
                session_id: rand::random::<u64>() >> 1,
                ..Default::default()
            },
            ..Default::default()
        };

        if self.configuration.bundle_policy != RTCBundlePolicy::Disable {
            sd.attributes
                .push(Attribute::new("group", Some(format!("BUNDLE {mid}"))));
        }
        sd.attributes.push(Attribute::new("extmap-allow-mixed", None));
        sd.attributes
            .push(Attribute::new("msid-semantic", Some(" WMS".to_owned())));

        let mut media = MediaDescription {
            media: MEDIA_KIND_APPLICATION.to_owned(),
            port: 9,
            protos: PROFILE_UDP_DTLS_SCTP
                .split('/')
                .map(str::to_owned)
                .collect(),
            formats: vec![FORMAT_WEBRTC_DATACHANNEL.to_owned()],
            connection: Some("IN IP4 0.0.0.0".to_owned()),
            attributes: vec![],
        };
        media = media
            .with_attribute("ice-ufrag", Some(ice_ufrag))
            .with_attribute("ice-pwd", Some(ice_pwd))
            .with_attribute("ice-options", Some("trickle".to_owned()));
        for fingerprint in self.certificate.get_fingerprints() {
            media = media.with_attribute("fingerprint", Some(fingerprint.to_string()));
        }
        media = media
            .with_attribute("setup", Some(setup))
            .with_attribute("mid", Some(mid))
            .with_attribute("sctp-port", Some(DEFAULT_SCTP_PORT.to_string()))
            .with_attribute(
                "max-message-size",
                Some(sctp::MAX_MESSAGE_SIZE.to_string()),
            );

        sd.media_descriptions.push(media);
        Ok(sd)
    }

    /// Extracts the transport parameters from a parsed remote description.
    pub(crate) fn parse_remote_description(
        sd: &SessionDescription,
    ) -> Result<RemoteDescriptionParams> {
        let media_kinds: Vec<String> = sd
            .media_descriptions
            .iter()
            .map(|m| m.media.clone())
            .collect();

        let application = sd
            .media_descriptions
            .iter()
            .find(|m| m.media == MEDIA_KIND_APPLICATION)
            .ok_or_else(|| Error::ErrInvalidSdp("no application media section".to_owned()))?;

        if application.protos.join("/") != PROFILE_UDP_DTLS_SCTP {
            return Err(Error::ErrInvalidSdp(format!(
                "unexpected profile {}",
                application.protos.join("/")
            )));
        }

        let ice_ufrag = sd
            .media_or_session_attribute(application, "ice-ufrag")
            .ok_or_else(|| Error::ErrInvalidSdp("missing ice-ufrag".to_owned()))?
            .to_owned();
        let ice_pwd = sd
            .media_or_session_attribute(application, "ice-pwd")
            .ok_or_else(|| Error::ErrInvalidSdp("missing ice-pwd".to_owned()))?
            .to_owned();

        let mut fingerprints = vec![];
        let fingerprint_lines = sd
            .attributes
            .iter()
            .chain(application.attributes.iter())
            .filter(|a| a.key == "fingerprint");
        for line in fingerprint_lines {
            let value = line
                .value
                .as_deref()
                .ok_or_else(|| Error::ErrInvalidSdp("empty fingerprint".to_owned()))?;
            let (algorithm, digest) = value
                .split_once(' ')
                .ok_or_else(|| Error::ErrInvalidSdp("malformed fingerprint".to_owned()))?;
            fingerprints.push(RTCDtlsFingerprint {
                algorithm: algorithm.to_owned(),
                value: digest.to_owned(),
            });
        }

        let setup = sd
            .media_or_session_attribute(application, "setup")
            .map(RTCDtlsRole::from)
            .unwrap_or(RTCDtlsRole::Auto);

        let sctp_port = application
            .attribute_value("sctp-port")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_SCTP_PORT);

        let candidates = application
            .attributes
            .iter()
            .filter(|a| a.key == "candidate")
            .filter_map(|a| a.value.clone())
            .collect();

        let mid = application
            .attribute_value("mid")
            .unwrap_or("0")
            .to_owned();

        Ok(RemoteDescriptionParams {
            ice_ufrag,
            ice_pwd,
            ice_lite: sd.has_attribute("ice-lite"),
            fingerprints,
            setup,
            sctp_port,
            candidates,
            media_kinds,
            mid,
        })
    }

    /// An accepted answer must mirror the offer's ordered media kinds.
    pub(crate) fn check_answer_matches_offer(
        offer: &SessionDescription,
        answer: &SessionDescription,
    ) -> Result<()> {
        let offered: Vec<&str> = offer
            .media_descriptions
            .iter()
            .map(|m| m.media.as_str())
            .collect();
        let answered: Vec<&str> = answer
            .media_descriptions
            .iter()
            .map(|m| m.media.as_str())
            .collect();
        if offered != answered {
            return Err(Error::ErrInvalidSdp(format!(
                "answer media sections {answered:?} do not match offer {offered:?}"
            )));
        }
        Ok(())
    }
}
