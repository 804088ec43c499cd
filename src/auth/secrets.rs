use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};

/// Alphabet for referral codes, matching what users see in the app.
const REFERRAL_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const REFERRAL_CODE_LEN: usize = 6;

/// Mint a single-use opaque secret: the raw value goes into a URL/email, the
/// digest is what gets persisted. The raw value is never stored.
pub fn mint_secret() -> (String, String) {
    let mut bytes = [0u8; 20];
    OsRng.fill_bytes(&mut bytes);
    let raw = hex::encode(bytes);
    let stored = digest(&raw);
    (raw, stored)
}

/// Deterministic one-way digest of a raw secret, hex-encoded. Used both when
/// issuing (stored form) and when redeeming (lookup key).
pub fn digest(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// Uniformly random 6-digit code, zero-padded.
pub fn mint_otp() -> String {
    let n: u32 = OsRng.gen_range(0..1_000_000);
    format!("{n:06}")
}

/// Random 6-character referral code over [A-Z0-9]. Uniqueness is enforced by
/// the store; callers re-roll on collision.
pub fn mint_referral_code() -> String {
    (0..REFERRAL_CODE_LEN)
        .map(|_| REFERRAL_ALPHABET[OsRng.gen_range(0..REFERRAL_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_raw_is_40_hex_chars_and_never_equals_digest() {
        let (raw, stored) = mint_secret();
        assert_eq!(raw.len(), 40);
        assert!(raw.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(raw, stored);
    }

    #[test]
    fn digest_is_deterministic_and_matches_stored_form() {
        let (raw, stored) = mint_secret();
        assert_eq!(digest(&raw), stored);
        assert_eq!(digest(&raw), digest(&raw));
    }

    #[test]
    fn different_secrets_have_different_digests() {
        assert_ne!(digest("token-a"), digest("token-b"));
    }

    #[test]
    fn otp_is_exactly_six_digits() {
        for _ in 0..200 {
            let otp = mint_otp();
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn referral_code_uses_uppercase_alphanumeric_alphabet() {
        for _ in 0..200 {
            let code = mint_referral_code();
            assert_eq!(code.len(), REFERRAL_CODE_LEN);
            assert!(code
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
        }
    }
}
