use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};
use sha2::{Digest, Sha256};

use crate::error::ShortenError;

const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Characters derived from the seed hash.
pub const HASH_CHARS: usize = 7;
/// Random characters appended after the hash-derived prefix.
pub const RANDOM_CHARS: usize = 4;
/// Candidates tried before giving up with [`ShortenError::CodeSpaceExhausted`].
pub const MAX_ATTEMPTS: u32 = 50;

/// Mints short codes from a seed string.
///
/// All entropy comes from the injected RNG: seed it with
/// [`CodeGenerator::seeded`] for reproducible output.
pub struct CodeGenerator {
    rng: StdRng,
}

impl CodeGenerator {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Produce a code for `seed` that `exists` reports as free.
    ///
    /// Every attempt re-salts the hash input, so a collision never repeats
    /// the same candidate.
    pub fn generate(
        &mut self,
        seed: &str,
        exists: impl Fn(&str) -> bool,
    ) -> Result<String, ShortenError> {
        for attempt in 0..MAX_ATTEMPTS {
            let code = self.candidate(seed, attempt);
            if !exists(&code) {
                return Ok(code);
            }
            tracing::debug!("Short code {} already taken (attempt {})", code, attempt + 1);
        }

        Err(ShortenError::CodeSpaceExhausted(MAX_ATTEMPTS))
    }

    fn candidate(&mut self, seed: &str, attempt: u32) -> String {
        let salt = self.rng.next_u64();

        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        hasher.update(b"|salt:");
        hasher.update(salt.to_be_bytes());
        hasher.update(attempt.to_be_bytes());
        let digest = hasher.finalize();

        let mut leading = [0u8; 8];
        leading.copy_from_slice(&digest[..8]);

        let mut code = base62(u64::from_be_bytes(leading), HASH_CHARS);
        code.extend(
            (0..RANDOM_CHARS).map(|_| ALPHABET[self.rng.gen_range(0..ALPHABET.len())] as char),
        );
        code
    }
}

/// The `len` most significant base-62 digits of `value`, zero-padded on the
/// left when `value` has fewer digits.
fn base62(mut value: u64, len: usize) -> String {
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(ALPHABET[(value % 62) as usize]);
        value /= 62;
    }
    digits.resize(digits.len().max(len), b'0');
    digits.iter().rev().take(len).map(|&b| char::from(b)).collect()
}

/// Whether `alias` may be used as a custom code: 3–32 chars of `[A-Za-z0-9_-]`.
pub fn is_valid_alias(alias: &str) -> bool {
    (3..=32).contains(&alias.len())
        && alias
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn codes_are_eleven_alphanumeric_chars() {
        let mut generator = CodeGenerator::seeded(7);
        for _ in 0..100 {
            let code = generator.generate("http://example.com/", |_| false).unwrap();
            assert_eq!(code.len(), HASH_CHARS + RANDOM_CHARS);
            assert!(code.bytes().all(|b| b.is_ascii_alphanumeric()));
            assert!(is_valid_alias(&code));
        }
    }

    #[test]
    fn same_rng_seed_reproduces_codes() {
        let mut a = CodeGenerator::seeded(42);
        let mut b = CodeGenerator::seeded(42);
        let url = "http://example.com/page";
        assert_eq!(
            a.generate(url, |_| false).unwrap(),
            b.generate(url, |_| false).unwrap()
        );
    }

    #[test]
    fn repeated_seed_does_not_repeat_code() {
        let mut generator = CodeGenerator::seeded(1);
        let first = generator.generate("http://example.com/", |_| false).unwrap();
        let second = generator.generate("http://example.com/", |_| false).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn retries_past_taken_codes() {
        let mut generator = CodeGenerator::seeded(3);
        let calls = Cell::new(0);
        let code = generator
            .generate("http://example.com/", |_| {
                calls.set(calls.get() + 1);
                calls.get() <= 3
            })
            .unwrap();
        assert_eq!(calls.get(), 4);
        assert_eq!(code.len(), 11);
    }

    #[test]
    fn gives_up_after_bounded_attempts() {
        let mut generator = CodeGenerator::seeded(9);
        let calls = Cell::new(0u32);
        let err = generator
            .generate("http://example.com/", |_| {
                calls.set(calls.get() + 1);
                true
            })
            .unwrap_err();
        assert_eq!(err, ShortenError::CodeSpaceExhausted(MAX_ATTEMPTS));
        assert_eq!(calls.get(), MAX_ATTEMPTS);
    }

    #[test]
    fn base62_keeps_leading_digits() {
        assert_eq!(base62(0, 7), "0000000");
        assert_eq!(base62(61, 3), "00z");
        assert_eq!(base62(62, 3), "010");
        // 62^4 + 2 * 62^3 + 3 is "12003"; the low-order digits are cut.
        assert_eq!(base62(14_776_336 + 2 * 238_328 + 3, 3), "120");
        assert_eq!(base62(u64::MAX, 7), "LygHa16");
    }

    #[test]
    fn alias_rules() {
        assert!(is_valid_alias("abc"));
        assert!(is_valid_alias("my_link-2024"));
        assert!(is_valid_alias(&"x".repeat(32)));
        assert!(!is_valid_alias("ab"));
        assert!(!is_valid_alias(&"x".repeat(33)));
        assert!(!is_valid_alias("has space"));
        assert!(!is_valid_alias("slash/y"));
        assert!(!is_valid_alias("ünï"));
    }
}
