//! String/path coercion helpers shared by `toString`, `baseNameOf`, and
//! the derivation binding coercion of `spec.md` §4.G step 1. Binding
//! coercion lives here rather than in `rix-derivation` because it needs
//! the evaluator to force thunks and the store to copy `Path` literals
//! and register nested derivations as inputs -- `rix-derivation` only
//! assembles already-coerced data (see its `assemble` module doc).

use std::collections::BTreeSet;
use std::path::Path;

use rix_arena::{Term, TermId};
use rix_derivation::assemble_closure;
use rix_store::{Store, StorePath};

use crate::errors::EvalError;
use crate::EvalState;

/// Coerces an already-evaluated `Str`/`Path`/`Uri` term to a plain
/// `String`, the conversion `toString`/`baseNameOf` need (`spec.md`
/// §4.E table).
pub fn to_string_value(state: &EvalState, term: TermId) -> Result<String, EvalError> {
    match state.arena().get(term) {
        Term::Str(s) => Ok(s.to_string()),
        Term::Path(s) => Ok(s.to_string()),
        Term::Uri(s) => Ok(s.to_string()),
        other => Err(EvalError::TypeError {
            expected: "string, path, or uri",
            found: other.tag(),
            term,
        }),
    }
}

/// Looks up (and caches) the single output root of a previously
/// written descriptor, as every binding-coercion case below needs
/// (`spec.md` §4.F: "the evaluator asserts this set has exactly one
/// element when used for coercion").
fn single_root(state: &EvalState, drv_path: &StorePath) -> Result<StorePath, EvalError> {
    let roots = state.nix_expr_roots_cached(drv_path)?;
    if roots.len() != 1 {
        return Err(EvalError::Store(rix_store::StoreError::AmbiguousRoots(drv_path.to_string(), roots.len())));
    }
    Ok(roots.into_iter().next().expect("len() == 1 checked above"))
}

/// Coerces `term` (un-evaluated) into the string a derivation builder
/// sees for one binding, per `spec.md` §4.G "Binding coercion".
/// Returns the string plus any descriptor paths that must be recorded
/// as inputs of the enclosing derivation.
pub fn coerce_for_binding(state: &EvalState, term: TermId) -> Result<(String, Vec<StorePath>), EvalError> {
    let evaluated = state.eval(term)?;
    let arena = state.arena();
    match arena.get(evaluated) {
        Term::Str(s) => Ok((s.to_string(), Vec::new())),
        Term::Uri(s) => Ok((s.to_string(), Vec::new())),
        Term::Bool(true) => Ok(("1".to_string(), Vec::new())),
        Term::Bool(false) => Ok((String::new(), Vec::new())),

        Term::Attrs(bindings) => {
            let type_field = bindings.iter().find(|(k, _)| k.as_ref() == "type");
            let is_derivation = match type_field {
                Some((_, v)) => matches!(arena.get(state.eval(*v)?), Term::Str(s) if s.as_ref() == "derivation"),
                None => false,
            };
            if !is_derivation {
                return Err(EvalError::InvalidBinding("attribute set is not a derivation".to_string()));
            }
            let drv_path_field = bindings
                .iter()
                .find(|(k, _)| k.as_ref() == "drvPath")
                .ok_or_else(|| EvalError::InvalidBinding("derivation attrs missing `drvPath`".to_string()))?;
            let drv_path_text = state.eval_path(drv_path_field.1)?;
            let drv_path = StorePath::from_absolute_path(&drv_path_text, state.store().store_dir())
                .map_err(rix_store::StoreError::from)?;
            let root = single_root(state, &drv_path)?;
            Ok((root.to_absolute_path(state.store().store_dir()), vec![drv_path]))
        }

        Term::Path(s) => {
            let atom = state.store().add_to_store(Path::new(s.as_ref()))?;
            let closure = assemble_closure(state.store(), &atom)?;
            state.record_hash(closure.drv_path.clone(), closure.storage_hash);
            let root = single_root(state, &closure.drv_path)?;
            Ok((root.to_absolute_path(state.store().store_dir()), vec![closure.drv_path]))
        }

        Term::Derivation(path) => {
            let drv_path = StorePath::from_absolute_path(&path, state.store().store_dir())
                .map_err(rix_store::StoreError::from)?;
            let root = single_root(state, &drv_path)?;
            Ok((root.to_absolute_path(state.store().store_dir()), vec![drv_path]))
        }

        Term::List(elems) => {
            let mut parts = Vec::with_capacity(elems.len());
            let mut inputs = BTreeSet::new();
            for elem in elems.iter() {
                let (s, ins) = coerce_for_binding(state, *elem)?;
                parts.push(s);
                inputs.extend(ins);
            }
            Ok((parts.join(" "), inputs.into_iter().collect()))
        }

        other => Err(EvalError::InvalidBinding(format!("cannot use a {} as a derivation binding", other.tag()))),
    }
}
