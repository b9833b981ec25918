use thiserror::Error;

/// Converges every crate's error enum behind one `#[from]`-based type,
/// the way `tvix-cli`'s top-level error handling folds compiler/runtime
/// errors into one reportable value (`spec.md` §6's exit-code rule).
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Parse(#[from] rix_parser::ParseError),

    #[error(transparent)]
    Eval(#[from] rix_eval::EvalError),

    #[error(transparent)]
    Store(#[from] rix_store::StoreError),

    #[error(transparent)]
    Cycles(#[from] rix_cycles::CycleError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("evaluation result is not a derivation (missing `drvPath`)")]
    NotADerivation,

    #[error("unknown store path `{0}`: not under the configured store directory")]
    InvalidRef(String, #[source] rix_store::ParseStorePathError),
}
