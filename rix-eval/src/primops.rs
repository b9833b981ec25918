//! The primop table (`spec.md` §4.E) and the internal, tag-matched
//! operators §4.E/§9 describe as "not addressable by name" (infix
//! arithmetic/comparison/update, `hasSubstr`, the current-platform
//! constant). Grounded on `fix-ng/primops.cc`'s `primImport`/
//! `primDerivation`/`primBaseNameOf`/`primToString`, kept in a
//! `&'static str` table the way `eval_step`'s `Call` dispatch expects
//! rather than `tvix-eval`'s `Builtin`/`BuiltinArgument` closures, since
//! every primop here also needs direct access to `EvalState`/`Arena`
//! rather than a stack-based VM calling convention.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use rix_arena::Term;

use crate::coerce::to_string_value;
use crate::errors::EvalError;
use crate::EvalState;
use rix_arena::TermId;

/// Names recognized by `Var` resolution and addressable via `Call`,
/// per `spec.md` §4.E's table.
pub const PRIMOP_NAMES: &[&str] = &["import", "derivation", "baseNameOf", "toString"];

/// Internal binary (and in `__curPlatform`'s case, nullary) operators:
/// recognized purely by tag-matching inside `eval_step`, never entered
/// into the primop name table primop resolution consults (`spec.md`
/// §4.E, §9's "Open question" and the `SPEC_FULL.md` §3 clarification).
pub const OPERATOR_NAMES: &[&str] = &[
    "__add",
    "__sub",
    "__mul",
    "__div",
    "__concat",
    "__update",
    "__eq",
    "__lt",
    "__hasSubstr",
    "__curPlatform",
];

/// Whether `name` is a free variable `eval_step` must leave in normal
/// form rather than rejecting with `UndefinedVariable` (`spec.md` §4.D
/// `Var` case).
pub fn is_known_name(name: &str) -> bool {
    PRIMOP_NAMES.contains(&name) || OPERATOR_NAMES.contains(&name)
}

/// Dispatches a named primop (`spec.md` §4.E table) applied to its
/// single, un-evaluated argument `arg`. Called from `eval_step`'s
/// `Call` handling once the function position has reduced to
/// `Var(name)` for one of `PRIMOP_NAMES`.
pub fn invoke_named(state: &EvalState, name: &str, arg: TermId) -> Result<TermId, EvalError> {
    match name {
        "import" => prim_import(state, arg),
        "derivation" => crate::derivation::prim_derivation(state, arg),
        "baseNameOf" => prim_base_name_of(state, arg),
        "toString" => prim_to_string(state, arg),
        other => unreachable!("invoke_named called with non-primop name `{other}`"),
    }
}

fn prim_import(state: &EvalState, arg: TermId) -> Result<TermId, EvalError> {
    let path_text = state.eval_path(arg)?;
    let resolved = resolve_import_path(state, &path_text)?;
    let source = std::fs::read_to_string(&resolved).map_err(|_| EvalError::ImportNotFound(path_text.clone()))?;
    let term = rix_parser::parse(state.arena(), &source)?;
    state.eval(term)
}

/// Resolves a possibly-relative import path against `search_dirs`
/// (`spec.md` §4.E `import` row). Absolute paths (and paths that
/// already exist relative to the current directory) are returned
/// unchanged; otherwise each search directory is tried in order.
fn resolve_import_path(state: &EvalState, path_text: &str) -> Result<PathBuf, EvalError> {
    let candidate = Path::new(path_text);
    if candidate.is_absolute() {
        return Ok(candidate.to_path_buf());
    }
    if candidate.exists() {
        return Ok(candidate.to_path_buf());
    }
    for dir in state.search_dirs() {
        let joined = Path::new(dir).join(candidate);
        if joined.exists() {
            return Ok(joined);
        }
    }
    Err(EvalError::ImportNotFound(path_text.to_string()))
}

fn prim_base_name_of(state: &EvalState, arg: TermId) -> Result<TermId, EvalError> {
    let evaluated = state.eval(arg)?;
    let s = to_string_value(state, evaluated)?;
    let base = s.rsplit('/').next().unwrap_or(&s);
    Ok(state.arena().str(base))
}

fn prim_to_string(state: &EvalState, arg: TermId) -> Result<TermId, EvalError> {
    let evaluated = state.eval(arg)?;
    let s = to_string_value(state, evaluated)?;
    Ok(state.arena().str(s))
}

/// Operators recognized at the shape `Call(Call(Var(op), lhs), rhs)`
/// (binary) that `eval_step` matches before falling back to the
/// general apply protocol. See `SPEC_FULL.md` §3/§4.D for why this is
/// the only sound encoding of infix operators given this `Term` shape.
pub fn eval_binop(state: &EvalState, op: &str, lhs: TermId, rhs: TermId) -> Result<TermId, EvalError> {
    let a = state.eval(lhs)?;
    let b = state.eval(rhs)?;
    match op {
        "__add" => eval_add(state, a, b),
        "__sub" => eval_arith(state, a, b, |x, y| x - y, |x, y| x - y),
        "__mul" => eval_arith(state, a, b, |x, y| x * y, |x, y| x * y),
        "__div" => eval_div(state, a, b),
        "__concat" => eval_concat(state, a, b),
        "__update" => eval_update(state, a, b),
        "__eq" => eval_eq(state, a, b),
        "__lt" => eval_lt(state, a, b),
        "__hasSubstr" => eval_has_substr(state, a, b),
        other => unreachable!("eval_binop called with non-operator `{other}`"),
    }
}

fn numeric_tag_error(state: &EvalState, found: TermId) -> EvalError {
    EvalError::TypeError {
        expected: "int or float",
        found: state.arena().tag(found),
        term: found,
    }
}

fn eval_add(state: &EvalState, a: TermId, b: TermId) -> Result<TermId, EvalError> {
    let arena = state.arena();
    match (arena.get(a), arena.get(b)) {
        (Term::Str(x), Term::Str(y)) => Ok(arena.str(format!("{x}{y}"))),
        (Term::Path(x), Term::Path(y)) => Ok(arena.path(format!("{x}{y}"))),
        (Term::Path(x), Term::Str(y)) => Ok(arena.path(format!("{x}{y}"))),
        (Term::Str(x), Term::Path(y)) => Ok(arena.path(format!("{x}{y}"))),
        _ => eval_arith(state, a, b, |x, y| x + y, |x, y| x + y),
    }
}

fn eval_arith(
    state: &EvalState,
    a: TermId,
    b: TermId,
    int_op: impl Fn(i64, i64) -> i64,
    float_op: impl Fn(f64, f64) -> f64,
) -> Result<TermId, EvalError> {
    let arena = state.arena();
    match (arena.get(a), arena.get(b)) {
        (Term::Int(x), Term::Int(y)) => Ok(arena.int(int_op(x, y))),
        (Term::Int(x), Term::Float(y)) => Ok(arena.float(float_op(x as f64, y.0))),
        (Term::Float(x), Term::Int(y)) => Ok(arena.float(float_op(x.0, y as f64))),
        (Term::Float(x), Term::Float(y)) => Ok(arena.float(float_op(x.0, y.0))),
        _ => Err(numeric_tag_error(state, a)),
    }
}

fn eval_div(state: &EvalState, a: TermId, b: TermId) -> Result<TermId, EvalError> {
    let arena = state.arena();
    match (arena.get(a), arena.get(b)) {
        (Term::Int(_), Term::Int(y)) if y == 0 => Err(numeric_tag_error(state, b)),
        (Term::Int(x), Term::Int(y)) => Ok(arena.int(x / y)),
        (Term::Int(x), Term::Float(y)) => Ok(arena.float(x as f64 / y.0)),
        (Term::Float(x), Term::Int(y)) => Ok(arena.float(x.0 / y as f64)),
        (Term::Float(x), Term::Float(y)) => Ok(arena.float(x.0 / y.0)),
        _ => Err(numeric_tag_error(state, a)),
    }
}

fn eval_concat(state: &EvalState, a: TermId, b: TermId) -> Result<TermId, EvalError> {
    let arena = state.arena();
    match (arena.get(a), arena.get(b)) {
        (Term::List(x), Term::List(y)) => {
            let mut elems: Vec<TermId> = x.to_vec();
            elems.extend(y.iter().copied());
            Ok(arena.list(elems))
        }
        _ => Err(EvalError::TypeError {
            expected: "list",
            found: arena.tag(a),
            term: a,
        }),
    }
}

fn eval_update(state: &EvalState, a: TermId, b: TermId) -> Result<TermId, EvalError> {
    let arena = state.arena();
    match (arena.get(a), arena.get(b)) {
        (Term::Attrs(x), Term::Attrs(y)) => {
            let mut merged: std::collections::BTreeMap<Rc<str>, TermId> = x.iter().cloned().collect();
            for (k, v) in y.iter() {
                merged.insert(k.clone(), *v);
            }
            Ok(arena.attrs(merged.into_iter().collect()))
        }
        _ => Err(EvalError::TypeError {
            expected: "attrs",
            found: arena.tag(a),
            term: a,
        }),
    }
}

/// Deep structural equality: `Attrs`/`List` normal forms may still hold
/// unevaluated thunks in their fields, so naive `TermId` comparison
/// would consider `{ a = 1 + 1; }` unequal to `{ a = 2; }`. Forces
/// every field/element before comparing, matching Nix's `==` which is
/// defined over fully-evaluated values.
fn eval_eq(state: &EvalState, a: TermId, b: TermId) -> Result<TermId, EvalError> {
    let x = force_deep(state, a)?;
    let y = force_deep(state, b)?;
    Ok(state.arena().boolean(x == y))
}

fn force_deep(state: &EvalState, id: TermId) -> Result<TermId, EvalError> {
    let nf = state.eval(id)?;
    let arena = state.arena();
    match arena.get(nf) {
        Term::Attrs(bindings) => {
            let mut out = Vec::with_capacity(bindings.len());
            for (k, v) in bindings.iter() {
                out.push((k.clone(), force_deep(state, *v)?));
            }
            Ok(arena.attrs(out))
        }
        Term::List(elems) => {
            let mut out = Vec::with_capacity(elems.len());
            for e in elems.iter() {
                out.push(force_deep(state, *e)?);
            }
            Ok(arena.list(out))
        }
        _ => Ok(nf),
    }
}

fn eval_lt(state: &EvalState, a: TermId, b: TermId) -> Result<TermId, EvalError> {
    let arena = state.arena();
    let less = match (arena.get(a), arena.get(b)) {
        (Term::Int(x), Term::Int(y)) => x < y,
        (Term::Int(x), Term::Float(y)) => (x as f64) < y.0,
        (Term::Float(x), Term::Int(y)) => x.0 < (y as f64),
        (Term::Float(x), Term::Float(y)) => x.0 < y.0,
        (Term::Str(x), Term::Str(y)) => *x < *y,
        _ => return Err(numeric_tag_error(state, a)),
    };
    Ok(arena.boolean(less))
}

fn eval_has_substr(state: &EvalState, needle: TermId, haystack: TermId) -> Result<TermId, EvalError> {
    let arena = state.arena();
    let (Term::Str(needle), Term::Str(haystack)) = (arena.get(needle), arena.get(haystack)) else {
        return Err(EvalError::TypeError {
            expected: "string",
            found: arena.tag(needle),
            term: needle,
        });
    };
    Ok(arena.boolean(haystack.contains(needle.as_ref())))
}
