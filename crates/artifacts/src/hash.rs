//! Content hashes for integrity verification.
//!
//! Catalog hashes are lowercase hex: 40 digits for SHA-1, 64 for SHA-256.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;

/// Hash algorithm, inferred from digest length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
}

/// A parsed content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHash {
    algorithm: HashAlgorithm,
    digest: Vec<u8>,
}

impl ContentHash {
    /// Parse a hex digest.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHash` if the string is not 40 or 64 hex digits.
    pub fn parse(hex_digest: &str) -> Result<Self> {
        let algorithm = match hex_digest.len() {
            40 => HashAlgorithm::Sha1,
            64 => HashAlgorithm::Sha256,
            _ => return Err(Error::InvalidHash(hex_digest.to_string())),
        };
        let digest =
            hex::decode(hex_digest).map_err(|_| Error::InvalidHash(hex_digest.to_string()))?;
        Ok(Self { algorithm, digest })
    }

    /// Hash bytes with the given algorithm.
    #[must_use]
    pub fn compute(algorithm: HashAlgorithm, data: &[u8]) -> Self {
        let digest = match algorithm {
            HashAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
        };
        Self { algorithm, digest }
    }

    #[must_use]
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Lowercase hex form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.digest)
    }

    /// Check data against this hash.
    ///
    /// # Errors
    ///
    /// Returns `Error::HashMismatch` naming both digests.
    pub fn verify(&self, url: &str, data: &[u8]) -> Result<()> {
        let actual = Self::compute(self.algorithm, data);
        if actual != *self {
            return Err(Error::HashMismatch {
                url: url.to_string(),
                expected: self.to_hex(),
                actual: actual.to_hex(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // sha1("hello") and sha256("hello")
    const HELLO_SHA1: &str = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";
    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_parse_infers_algorithm() {
        assert_eq!(
            ContentHash::parse(HELLO_SHA1).unwrap().algorithm(),
            HashAlgorithm::Sha1
        );
        assert_eq!(
            ContentHash::parse(HELLO_SHA256).unwrap().algorithm(),
            HashAlgorithm::Sha256
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(ContentHash::parse("").is_err());
        assert!(ContentHash::parse("abc").is_err());
        assert!(ContentHash::parse(&"z".repeat(40)).is_err());
    }

    #[test]
    fn test_verify() {
        ContentHash::parse(HELLO_SHA1)
            .unwrap()
            .verify("mem://hello", b"hello")
            .unwrap();
        ContentHash::parse(HELLO_SHA256)
            .unwrap()
            .verify("mem://hello", b"hello")
            .unwrap();

        let err = ContentHash::parse(HELLO_SHA256)
            .unwrap()
            .verify("mem://hello", b"goodbye")
            .unwrap_err();
        assert!(matches!(err, Error::HashMismatch { .. }));
    }
}
