use shared::util::math_rand_alpha_number;

// Character sizes from RFC 8445 Section 5.3: ufrag at least 24 bits,
// pwd at least 128 bits of randomness.
const UFRAG_LEN: usize = 16;
const PWD_LEN: usize = 32;

/// Generates an ICE username fragment.
pub fn generate_ufrag() -> String {
    math_rand_alpha_number(UFRAG_LEN)
}

/// Generates an ICE password.
pub fn generate_pwd() -> String {
    math_rand_alpha_number(PWD_LEN)
}

/// Generates a candidate id.
pub fn generate_cand_id() -> String {
    format!("candidate:{}", math_rand_alpha_number(10))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_credential_lengths() {
        assert!(generate_ufrag().len() * 8 >= 24);
        assert!(generate_pwd().len() * 8 >= 128);
    }
}
