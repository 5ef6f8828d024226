//! Short, human-shareable referral codes.
//!
//! The generator only makes collisions unlikely; uniqueness is guaranteed by
//! the engine's retry loop and the `UNIQUE(referral_code)` constraint.

use rand::Rng;

/// Uppercase letters and digits without the look-alikes `0 O 1 I`.
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const CODE_LEN: usize = 8;

/// Draw a fresh code from the thread-local RNG.
pub fn generate() -> String {
    generate_with(&mut rand::thread_rng())
}

pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// `^[A-Z0-9]{8,10}$`
pub fn is_valid_format(code: &str) -> bool {
    (8..=10).contains(&code.len())
        && code
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}
