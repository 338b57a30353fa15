use rand::{rng, Rng};

// match_range is a MatchFunc that accepts packets with the first byte in [lower..upper]
fn match_range(lower: u8, upper: u8, buf: &[u8]) -> bool {
    if buf.is_empty() {
        return false;
    }
    let b = buf[0];
    b >= lower && b <= upper
}

/// MatchFuncs as described in RFC7983
/// <https://tools.ietf.org/html/rfc7983>
///              +----------------+
///              |        [0..3] -+--> forward to STUN
///              |                |
///  packet -->  |      [20..63] -+--> forward to DTLS
///              |                |
///              |         other -+--> drop
///              +----------------+
/// match_dtls is a MatchFunc that accepts packets with the first byte in [20..63]
/// as defined in RFC7983
pub fn match_dtls(b: &[u8]) -> bool {
    match_range(20, 63, b)
}

/// match_stun is a MatchFunc that accepts packets with the first byte in [0..3]
/// as defined in RFC7983
pub fn match_stun(b: &[u8]) -> bool {
    match_range(0, 3, b)
}

const RUNES_ALPHA: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const RUNES_ALPHA_NUMBER: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// math_rand_alpha generates a mathematical random alphabet sequence of the requested length.
pub fn math_rand_alpha(n: usize) -> String {
    generate_random_string(n, RUNES_ALPHA)
}

/// math_rand_alpha_number generates a mathematical random alphabet and number sequence of the requested length.
pub fn math_rand_alpha_number(n: usize) -> String {
    generate_random_string(n, RUNES_ALPHA_NUMBER)
}

fn generate_random_string(n: usize, runes: &[u8]) -> String {
    let mut rng = rng();

    (0..n)
        .map(|_| {
            let idx = rng.random_range(0..runes.len());
            runes[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_match_dtls() {
        assert!(match_dtls(&[20, 0, 0]));
        assert!(match_dtls(&[63]));
        assert!(!match_dtls(&[19]));
        assert!(!match_dtls(&[64]));
        assert!(!match_dtls(&[]));
    }

    #[test]
    fn test_match_stun() {
        assert!(match_stun(&[0, 1]));
        assert!(match_stun(&[1, 1]));
        assert!(!match_stun(&[4]));
        assert!(!match_stun(&[128]));
    }

    #[test]
    fn test_rand_alpha() {
        let s = math_rand_alpha(16);
        assert_eq!(s.len(), 16);
        assert!(s.chars().all(|c| c.is_ascii_alphabetic()));
    }
}
