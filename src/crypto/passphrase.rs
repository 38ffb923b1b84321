//! Passphrase generation
//!
//! Passphrases are drawn from the operating system CSPRNG, one uniformly
//! chosen character at a time, and live in a buffer that is wiped on drop.

use crate::config::{
    PassphraseConfig, DEFAULT_ALPHABET, DEFAULT_PASSPHRASE_LENGTH, MAX_PASSPHRASE_LENGTH,
    MIN_PASSPHRASE_LENGTH,
};
use crate::error::{Error, Result};
use rand::rngs::OsRng;
use rand::Rng;
use std::fmt;
use zeroize::Zeroizing;

/// A human-copyable secret.
///
/// Never serialized, never logged; `Debug` is redacted.
pub struct Passphrase {
    value: Zeroizing<String>,
}

impl Passphrase {
    /// Wrap a passphrase typed or pasted by the user
    pub fn from_string(value: String) -> Self {
        Passphrase {
            value: Zeroizing::new(value),
        }
    }

    /// Borrow the secret text
    pub fn expose(&self) -> &str {
        &self.value
    }

    /// Length in characters
    pub fn len(&self) -> usize {
        self.value.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Passphrase")
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Generator of random passphrases over a fixed alphabet
#[derive(Debug, Clone)]
pub struct PassphraseGenerator {
    alphabet: Vec<char>,
    default_length: usize,
}

impl Default for PassphraseGenerator {
    fn default() -> Self {
        PassphraseGenerator {
            alphabet: DEFAULT_ALPHABET.chars().collect(),
            default_length: DEFAULT_PASSPHRASE_LENGTH,
        }
    }
}

impl PassphraseGenerator {
    /// Create a generator over `alphabet`. Duplicate characters are dropped
    /// so every symbol is equally likely.
    pub fn new(alphabet: &str, default_length: usize) -> Result<Self> {
        let mut symbols: Vec<char> = Vec::with_capacity(alphabet.len());
        for c in alphabet.chars() {
            if !symbols.contains(&c) {
                symbols.push(c);
            }
        }

        if symbols.len() < 2 {
            return Err(Error::Passphrase(
                "alphabet needs at least two distinct characters".to_string(),
            ));
        }

        Ok(PassphraseGenerator {
            alphabet: symbols,
            default_length,
        })
    }

    pub fn from_config(config: &PassphraseConfig) -> Result<Self> {
        Self::new(&config.alphabet, config.length)
    }

    pub fn default_length(&self) -> usize {
        self.default_length
    }

    /// Generate a passphrase of `length` characters
    pub fn generate(&self, length: usize) -> Result<Passphrase> {
        if !(MIN_PASSPHRASE_LENGTH..=MAX_PASSPHRASE_LENGTH).contains(&length) {
            return Err(Error::Passphrase(format!(
                "length must be between {} and {}, got {}",
                MIN_PASSPHRASE_LENGTH, MAX_PASSPHRASE_LENGTH, length
            )));
        }

        // Reserve up front so the buffer never reallocates and leaves
        // unwiped copies behind.
        let mut value = Zeroizing::new(String::with_capacity(length * 4));
        let mut rng = OsRng;
        for _ in 0..length {
            let idx = rng.gen_range(0..self.alphabet.len());
            value.push(self.alphabet[idx]);
        }

        Ok(Passphrase { value })
    }

    /// Generate a passphrase of the configured length
    pub fn generate_default(&self) -> Result<Passphrase> {
        self.generate(self.default_length)
    }

    /// Entropy of a `length`-character passphrase, in bits
    pub fn entropy_bits(&self, length: usize) -> f64 {
        length as f64 * (self.alphabet.len() as f64).log2()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_length() {
        let generator = PassphraseGenerator::default();
        let passphrase = generator.generate_default().unwrap();
        assert_eq!(passphrase.len(), 24);
    }

    #[test]
    fn test_uses_only_alphabet() {
        let generator = PassphraseGenerator::default();
        let passphrase = generator.generate(200).unwrap();
        assert!(passphrase
            .expose()
            .chars()
            .all(|c| DEFAULT_ALPHABET.contains(c)));
    }

    #[test]
    fn test_custom_alphabet() {
        let generator = PassphraseGenerator::new("abcdefghijklmnop-", 32).unwrap();
        let passphrase = generator.generate_default().unwrap();
        assert_eq!(passphrase.len(), 32);
        assert!(passphrase
            .expose()
            .chars()
            .all(|c| "abcdefghijklmnop-".contains(c)));
    }

    #[test]
    fn test_consecutive_passphrases_differ() {
        let generator = PassphraseGenerator::default();
        let a = generator.generate_default().unwrap();
        let b = generator.generate_default().unwrap();
        assert_ne!(a.expose(), b.expose());
    }

    #[test]
    fn test_length_bounds() {
        let generator = PassphraseGenerator::default();
        assert!(matches!(generator.generate(0), Err(Error::Passphrase(_))));
        assert!(generator.generate(MIN_PASSPHRASE_LENGTH - 1).is_err());
        assert!(generator.generate(MAX_PASSPHRASE_LENGTH + 1).is_err());
        assert!(matches!(
            generator.generate(usize::MAX),
            Err(Error::Passphrase(_))
        ));

        assert_eq!(generator.generate(MIN_PASSPHRASE_LENGTH).unwrap().len(), 16);
        assert_eq!(
            generator.generate(MAX_PASSPHRASE_LENGTH).unwrap().len(),
            MAX_PASSPHRASE_LENGTH
        );
    }

    #[test]
    fn test_degenerate_alphabet_rejected() {
        assert!(PassphraseGenerator::new("aaaa", 24).is_err());
    }

    #[test]
    fn test_debug_is_redacted() {
        let passphrase = Passphrase::from_string("correct-horse".to_string());
        let debug = format!("{:?}", passphrase);
        assert!(!debug.contains("correct-horse"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_default_entropy() {
        let generator = PassphraseGenerator::default();
        assert!(generator.entropy_bits(24) > 128.0);
    }
}
