use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const MASTER_SECRET_LABEL: &[u8] = b"master secret";
const KEY_EXPANSION_LABEL: &[u8] = b"key expansion";
const CLIENT_FINISHED_LABEL: &[u8] = b"client finished";
const SERVER_FINISHED_LABEL: &[u8] = b"server finished";

pub const MASTER_SECRET_LEN: usize = 48;
pub const VERIFY_DATA_LEN: usize = 12;

fn hmac_sha256(key: &[u8], data: &[&[u8]]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key size");
    for d in data {
        mac.update(d);
    }
    mac.finalize().into_bytes().to_vec()
}

/// P_SHA256 from RFC 5246 Section 5.
fn p_hash(secret: &[u8], seed: &[u8], out_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(out_len);
    let mut a = hmac_sha256(secret, &[seed]); // A(1)
    while out.len() < out_len {
        let chunk = hmac_sha256(secret, &[&a, seed]);
        let take = chunk.len().min(out_len - out.len());
        out.extend_from_slice(&chunk[..take]);
        a = hmac_sha256(secret, &[&a]);
    }
    out
}

fn prf(secret: &[u8], label: &[u8], seed: &[u8], out_len: usize) -> Vec<u8> {
    let mut label_seed = Vec::with_capacity(label.len() + seed.len());
    label_seed.extend_from_slice(label);
    label_seed.extend_from_slice(seed);
    p_hash(secret, &label_seed, out_len)
}

/// master_secret = PRF(pre_master, "master secret", client_random + server_random)[0..48]
pub fn prf_master_secret(
    pre_master_secret: &[u8],
    client_random: &[u8],
    server_random: &[u8],
) -> Vec<u8> {
    let mut seed = Vec::with_capacity(client_random.len() + server_random.len());
    seed.extend_from_slice(client_random);
    seed.extend_from_slice(server_random);
    prf(pre_master_secret, MASTER_SECRET_LABEL, &seed, MASTER_SECRET_LEN)
}

/// key_block = PRF(master, "key expansion", server_random + client_random)
pub fn prf_key_block(
    master_secret: &[u8],
    client_random: &[u8],
    server_random: &[u8],
    out_len: usize,
) -> Vec<u8> {
    let mut seed = Vec::with_capacity(client_random.len() + server_random.len());
    seed.extend_from_slice(server_random);
    seed.extend_from_slice(client_random);
    prf(master_secret, KEY_EXPANSION_LABEL, &seed, out_len)
}

/// verify_data = PRF(master, finished label, Hash(handshake_messages))[0..12]
pub fn prf_verify_data(master_secret: &[u8], handshake_messages: &[u8], is_client: bool) -> Vec<u8> {
    let label = if is_client {
        CLIENT_FINISHED_LABEL
    } else {
        SERVER_FINISHED_LABEL
    };
    let transcript = Sha256::digest(handshake_messages);
    prf(master_secret, label, &transcript, VERIFY_DATA_LEN)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_prf_is_deterministic() {
        let a = prf_master_secret(&[1; 32], &[2; 32], &[3; 32]);
        let b = prf_master_secret(&[1; 32], &[2; 32], &[3; 32]);
        assert_eq!(a, b);
        assert_eq!(a.len(), MASTER_SECRET_LEN);
    }

    #[test]
    fn test_prf_seed_order_matters() {
        // master secret seeds client||server, key block server||client
        let master = prf_master_secret(&[1; 32], &[2; 32], &[3; 32]);
        let swapped = prf_master_secret(&[1; 32], &[3; 32], &[2; 32]);
        assert_ne!(master, swapped);
    }

    #[test]
    fn test_verify_data_role_separation() {
        let master = [7u8; 48];
        let transcript = b"some handshake transcript";
        let client = prf_verify_data(&master, transcript, true);
        let server = prf_verify_data(&master, transcript, false);
        assert_eq!(client.len(), VERIFY_DATA_LEN);
        assert_ne!(client, server);
    }
}
