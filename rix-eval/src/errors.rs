use rix_arena::TermId;
use rix_derivation::DerivationError;
use rix_store::StoreError;
use thiserror::Error;

/// Error kinds of `spec.md` §7 owned by the evaluator and primop table.
/// Every variant carries enough of the offending term/path to report a
/// source location; `rix-derivation`'s and `rix-store`'s own errors are
/// folded in rather than re-wrapped in a new kind per clause.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Parse(#[from] rix_parser::ParseError),

    #[error("undefined variable `{name}`")]
    UndefinedVariable { name: String },

    #[error("type error: expected {expected}, found {found}")]
    TypeError { expected: &'static str, found: &'static str, term: TermId },

    #[error("attribute `{name}` is missing")]
    MissingAttribute { name: String, term: TermId },

    #[error("infinite recursion on term {0:?}")]
    InfiniteRecursion(TermId),

    #[error("not callable: {found}")]
    NotCallable { found: &'static str, term: TermId },

    #[error("invalid binding: {0}")]
    InvalidBinding(String),

    /// Argument attrs don't match a function's formals (§4.D `Call`
    /// dispatch's "every key... every name..." checks). Not its own row
    /// in `spec.md` §7's table -- `fix-ng/eval.cc`'s `substArgs` raises
    /// this as a generic `badTerm`, and no existing kind above fits an
    /// argument-shape mismatch better than inventing a one-off `TypeError`
    /// variant would.
    #[error("invalid call: {message}")]
    InvalidCall { message: String, term: TermId },

    #[error("`{0}` not found under any search directory")]
    ImportNotFound(String),

    #[error(transparent)]
    Derivation(#[from] DerivationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
