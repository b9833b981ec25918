//! Content hashes: opaque, fixed-width byte sequences with a canonical
//! nixbase32 string form. Grounded on `nix-compat/src/nixhash/mod.rs` and
//! `derivation/src/nix_hash.rs`'s `compress_hash`.

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::nixbase32;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash(Vec<u8>);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashParseError {
    #[error("invalid hash encoding: {0}")]
    InvalidEncoding(String),
}

impl Hash {
    pub fn sha256(data: &[u8]) -> Self {
        Hash(Sha256::digest(data).to_vec())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Hash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// XORs `self`'s bytes down into an `output_size`-byte digest, cycling
    /// through the input. Used to derive the 20-byte digest a `StorePath`
    /// is built from out of a full 32-byte sha256 hash.
    pub fn compress(&self, output_size: usize) -> Vec<u8> {
        compress_hash(&self.0, output_size)
    }

    pub fn to_nixbase32(&self) -> String {
        nixbase32::encode(&self.0)
    }

    pub fn parse(s: &str) -> Result<Self, HashParseError> {
        nixbase32::decode(s.as_bytes())
            .map(Hash)
            .map_err(|e| HashParseError::InvalidEncoding(e.to_string()))
    }
}

impl std::fmt::Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_nixbase32())
    }
}

/// See `derivation/src/nix_hash.rs::compress_hash`: repeatedly XORs
/// `output_size`-byte windows of `input` together, wrapping around.
pub fn compress_hash(input: &[u8], output_size: usize) -> Vec<u8> {
    let mut output = vec![0u8; output_size];
    for (i, b) in input.iter().enumerate() {
        output[i % output_size] ^= b;
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_hash_is_deterministic_and_sized() {
        let digest = Hash::sha256(b"hello world");
        let compressed = digest.compress(20);
        assert_eq!(compressed.len(), 20);
        assert_eq!(compressed, digest.compress(20));
    }

    #[test]
    fn parse_round_trips_through_display() {
        let digest = Hash::sha256(b"hello world");
        let printed = digest.to_string();
        let parsed = Hash::parse(&printed).expect("valid nixbase32");
        assert_eq!(parsed, digest);
    }
}
