//! Nix's custom base32 alphabet: digit-first, vowel-free, and read
//! least-significant-byte-first (the encoded string is the byte string
//! reversed before being fed to a standard base32 encoder).
//!
//! Ported from `store/src/nixbase32.rs`, swapping the `lazy_static`
//! table for a `OnceLock` since this crate doesn't otherwise need that
//! dependency.

use std::sync::OnceLock;

use data_encoding::{DecodeError, Encoding, Specification};

fn encoding() -> &'static Encoding {
    static ENCODING: OnceLock<Encoding> = OnceLock::new();
    ENCODING.get_or_init(|| {
        let mut spec = Specification::new();
        spec.symbols.push_str("0123456789abcdfghijklmnpqrsvwxyz");
        spec.encoding().expect("nixbase32 alphabet is a valid data_encoding spec")
    })
}

/// Encodes `input` the way Nix prints store path hashes: bytes reversed,
/// then run through the custom base32 alphabet above.
pub fn encode(input: &[u8]) -> String {
    let reversed: Vec<u8> = input.iter().rev().copied().collect();
    encoding().encode(&reversed).to_lowercase()
}

/// Inverse of [`encode`].
pub fn decode(input: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut output = encoding().decode(input)?;
    output.reverse();
    Ok(output)
}
