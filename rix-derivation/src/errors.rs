use rix_store::StoreError;
use thiserror::Error;

/// Errors raised while assembling a derivation or closure descriptor
/// (`spec.md` §7, the rows owned by module G).
#[derive(Debug, Error)]
pub enum DerivationError {
    #[error("derivation is missing required attribute `{0}`")]
    InvalidDerivation(&'static str),

    #[error("`{0}` does not parse as a valid hash")]
    BadHash(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
