use serde::{Deserialize, Serialize};
use std::fmt;

/// The type of a session description in the offer/answer model.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RTCSdpType {
    #[default]
    #[serde(rename = "Unspecified")]
    Unspecified = 0,

    /// An offer starting a negotiation.
    #[serde(rename = "offer")]
    Offer,

    /// A provisional answer; may be followed by a final answer.
    #[serde(rename = "pranswer")]
    Pranswer,

    /// The final answer of a negotiation.
    #[serde(rename = "answer")]
    Answer,

    /// Cancels the current negotiation and returns to stable.
    #[serde(rename = "rollback")]
    Rollback,
}

const SDP_TYPE_OFFER_STR: &str = "offer";
const SDP_TYPE_PRANSWER_STR: &str = "pranswer";
const SDP_TYPE_ANSWER_STR: &str = "answer";
const SDP_TYPE_ROLLBACK_STR: &str = "rollback";

impl From<&str> for RTCSdpType {
    fn from(raw: &str) -> Self {
        match raw {
            SDP_TYPE_OFFER_STR => RTCSdpType::Offer,
            SDP_TYPE_PRANSWER_STR => RTCSdpType::Pranswer,
            SDP_TYPE_ANSWER_STR => RTCSdpType::Answer,
            SDP_TYPE_ROLLBACK_STR => RTCSdpType::Rollback,
            _ => RTCSdpType::Unspecified,
        }
    }
}

impl fmt::Display for RTCSdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RTCSdpType::Offer => write!(f, "{SDP_TYPE_OFFER_STR}"),
            RTCSdpType::Pranswer => write!(f, "{SDP_TYPE_PRANSWER_STR}"),
            RTCSdpType::Answer => write!(f, "{SDP_TYPE_ANSWER_STR}"),
            RTCSdpType::Rollback => write!(f, "{SDP_TYPE_ROLLBACK_STR}"),
            _ => write!(f, "Unspecified"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sdp_type_string_round_trip() {
        let tests = vec![
            (RTCSdpType::Offer, "offer"),
            (RTCSdpType::Pranswer, "pranswer"),
            (RTCSdpType::Answer, "answer"),
            (RTCSdpType::Rollback, "rollback"),
        ];
        for (typ, s) in tests {
            assert_eq!(typ.to_string(), s);
            assert_eq!(RTCSdpType::from(s), typ);
        }
        assert_eq!(RTCSdpType::from("bogus"), RTCSdpType::Unspecified);
    }
}
