//! API key token generation.

use rand::prelude::RngExt;
use rand::rng;

/// Alphabet for key tokens: digits plus upper and lower case ASCII letters.
const KEY_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Length of a generated key token.
pub const KEY_LENGTH: usize = 16;

/// How many times an insert is retried when the generated token collides with
/// an existing key before giving up with an error.
pub const MAX_KEY_GENERATION_ATTEMPTS: u32 = 5;

/// Generate a random 16-character alphanumeric key token.
///
/// Uniqueness is enforced by the database unique constraint; callers retry on
/// collision up to [`MAX_KEY_GENERATION_ATTEMPTS`].
pub fn generate_key() -> String {
    let mut rng = rng();
    (0..KEY_LENGTH)
        .map(|_| KEY_ALPHABET[rng.random_range(0..KEY_ALPHABET.len())] as char)
        .collect()
}
