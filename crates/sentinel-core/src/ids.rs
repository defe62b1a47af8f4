//! Random identifier generation.
//!
//! All Sentinel identifiers are lowercase hex drawn from the OS CSPRNG:
//! request ids are 8 chars (4 bytes), record ids are 16 chars (8 bytes).

use rand::RngCore;
use rand::rngs::OsRng;

/// Length in characters of a request id (and approval marker).
pub const REQUEST_ID_LEN: usize = 8;

/// Length in characters of a store record id.
pub const RECORD_ID_LEN: usize = 16;

/// Generate `n_bytes` of OS randomness, hex-encoded (2 chars per byte).
pub fn random_hex(n_bytes: usize) -> String {
    let mut buf = vec![0u8; n_bytes];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Fresh 8-char request id.
pub fn new_request_id() -> String {
    random_hex(REQUEST_ID_LEN / 2)
}

/// Fresh 16-char record id for approval, break-glass, and session rows.
pub fn new_record_id() -> String {
    random_hex(RECORD_ID_LEN / 2)
}

/// True when `s` is exactly `len` lowercase hex characters.
pub fn is_lower_hex(s: &str, len: usize) -> bool {
    s.len() == len
        && s.bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_hex_length_and_alphabet() {
        let id = random_hex(4);
        assert_eq!(id.len(), 8);
        assert!(is_lower_hex(&id, 8));
    }

    #[test]
    fn lower_hex_rejects_uppercase_and_wrong_length() {
        assert!(is_lower_hex("a1b2c3d4", 8));
        assert!(!is_lower_hex("A1B2C3D4", 8));
        assert!(!is_lower_hex("a1b2c3", 8));
        assert!(!is_lower_hex("a1b2c3dg", 8));
    }
}
