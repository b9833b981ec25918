use thiserror::Error;

use crate::store_path::ParseStorePathError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error accessing the store: {0}")]
    Io(#[from] std::io::Error),

    #[error("store was opened read-only")]
    ReadOnly,

    #[error("invalid store path: {0}")]
    InvalidStorePath(#[from] ParseStorePathError),

    #[error("{0} is not a store path the evaluator has written a descriptor for")]
    UnknownDescriptor(String),

    #[error("nix_expr_roots({0}) found {1} output roots, expected exactly 1")]
    AmbiguousRoots(String, usize),

    #[error("{path} is not a valid symlink chain ending in the store: {source}")]
    BrokenLink {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
