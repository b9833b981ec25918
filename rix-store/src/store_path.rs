//! `StorePath`: a 20-byte compressed digest plus a validated name,
//! rendered as `<store-dir>/<nixbase32-digest>-<name>`. Grounded on
//! `nix-compat/src/store_path/mod.rs` and `store_path/utils.rs`.

use thiserror::Error;

use crate::nixbase32;

pub const DIGEST_SIZE: usize = 20;
pub const ENCODED_DIGEST_SIZE: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseStorePathError {
    #[error("store path is missing the '-' separator between hash and name")]
    MissingDash,
    #[error("invalid hash encoding: {0}")]
    InvalidHashEncoding(String),
    #[error("store path is too short to contain a valid digest and name")]
    InvalidLength,
    #[error("invalid character in store path name at byte offset {0}")]
    InvalidName(usize),
    #[error("path does not live under the configured store directory")]
    WrongStoreDir,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorePath {
    pub digest: [u8; DIGEST_SIZE],
    pub name: String,
}

impl StorePath {
    /// Store path names are restricted to the characters Nix accepts:
    /// ASCII alphanumerics plus `-_.+?=`.
    pub fn validate_name(name: &str) -> Result<(), ParseStorePathError> {
        if name.is_empty() {
            return Err(ParseStorePathError::InvalidLength);
        }
        for (i, c) in name.char_indices() {
            if !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+' | '?' | '=')) {
                return Err(ParseStorePathError::InvalidName(i));
            }
        }
        Ok(())
    }

    pub fn new(digest: [u8; DIGEST_SIZE], name: impl Into<String>) -> Result<Self, ParseStorePathError> {
        let name = name.into();
        Self::validate_name(&name)?;
        Ok(StorePath { digest, name })
    }

    pub fn to_absolute_path(&self, store_dir: &str) -> String {
        format!(
            "{}/{}-{}",
            store_dir.trim_end_matches('/'),
            nixbase32::encode(&self.digest),
            self.name
        )
    }

    pub fn from_absolute_path(s: &str, store_dir: &str) -> Result<Self, ParseStorePathError> {
        let prefix = format!("{}/", store_dir.trim_end_matches('/'));
        let rest = s.strip_prefix(&prefix).ok_or(ParseStorePathError::WrongStoreDir)?;
        Self::from_base_name(rest)
    }

    /// Parses just the `<digest>-<name>` component (no store directory
    /// prefix), as used for e.g. directory entries under the store root.
    pub fn from_base_name(s: &str) -> Result<Self, ParseStorePathError> {
        let bytes = s.as_bytes();
        if bytes.len() < ENCODED_DIGEST_SIZE + 2 {
            return Err(ParseStorePathError::InvalidLength);
        }
        let digest_text = &bytes[..ENCODED_DIGEST_SIZE];
        if bytes[ENCODED_DIGEST_SIZE] != b'-' {
            return Err(ParseStorePathError::MissingDash);
        }
        let digest = nixbase32::decode(digest_text)
            .map_err(|e| ParseStorePathError::InvalidHashEncoding(e.to_string()))?;
        let digest: [u8; DIGEST_SIZE] = digest
            .try_into()
            .map_err(|_| ParseStorePathError::InvalidLength)?;
        let name = std::str::from_utf8(&bytes[ENCODED_DIGEST_SIZE + 1..])
            .map_err(|_| ParseStorePathError::InvalidLength)?;
        Self::validate_name(name)?;
        Ok(StorePath { digest, name: name.to_string() })
    }
}

impl std::fmt::Display for StorePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", nixbase32::encode(&self.digest), self.name)
    }
}
