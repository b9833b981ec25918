//! Capture-avoiding substitution of free variables in a term.
//!
//! Ports the `substitute` function of `fix-ng/fix-expr.cc`: a purely
//! structural ATerm rewrite. The only two binding forms in the term
//! language, `Function` and `Rec`/`LetRec`, remove their own bound names
//! from the substitution map before descending so a substitution never
//! captures a name re-bound underneath it.

use std::rc::Rc;

use rix_arena::{Arena, Term, TermId};
use rustc_hash::FxHashMap;

/// A substitution: free variable name -> replacement term.
pub type Subs = FxHashMap<Rc<str>, TermId>;

/// Substitutes `subs` into `e`, returning the (possibly unchanged) result.
///
/// This is a pure function of `(subs, e)`: it never consults or mutates
/// any evaluator state, and never fails — a well-formed `Term` graph has
/// no shape `substitute` doesn't know how to recurse into.
pub fn substitute(arena: &Arena, subs: &Subs, e: TermId) -> TermId {
    if subs.is_empty() {
        return e;
    }

    match arena.get(e) {
        Term::Var(name) => subs.get(&name).copied().unwrap_or(e),

        Term::Function(formals, body) => {
            let inner = remove_names(subs, formals.iter());
            let new_body = substitute(arena, &inner, body);
            if new_body == body {
                e
            } else {
                arena.intern(Term::Function(formals, new_body))
            }
        }

        Term::Rec(bindings) => {
            let inner = remove_names(subs, bindings.iter().map(|(k, _)| k));
            let new_bindings = substitute_bindings(arena, &inner, &bindings);
            if new_bindings.iter().eq(bindings.iter()) {
                e
            } else {
                arena.intern(Term::Rec(new_bindings.into()))
            }
        }

        Term::LetRec(bindings) => {
            let inner = remove_names(subs, bindings.iter().map(|(k, _)| k));
            let new_bindings = substitute_bindings(arena, &inner, &bindings);
            if new_bindings.iter().eq(bindings.iter()) {
                e
            } else {
                arena.intern(Term::LetRec(new_bindings.into()))
            }
        }

        Term::Attrs(bindings) => {
            let new_bindings = substitute_bindings(arena, subs, &bindings);
            if new_bindings.iter().eq(bindings.iter()) {
                e
            } else {
                arena.intern(Term::Attrs(new_bindings.into()))
            }
        }

        Term::Call(f, a) => {
            let nf = substitute(arena, subs, f);
            let na = substitute(arena, subs, a);
            if nf == f && na == a {
                e
            } else {
                arena.intern(Term::Call(nf, na))
            }
        }

        Term::Select(inner, name) => {
            let ni = substitute(arena, subs, inner);
            if ni == inner {
                e
            } else {
                arena.intern(Term::Select(ni, name))
            }
        }

        Term::List(elems) => {
            let new_elems: Vec<TermId> = elems.iter().map(|&el| substitute(arena, subs, el)).collect();
            if new_elems.iter().eq(elems.iter()) {
                e
            } else {
                arena.intern(Term::List(new_elems.into()))
            }
        }

        Term::If(c, t, f) => {
            let nc = substitute(arena, subs, c);
            let nt = substitute(arena, subs, t);
            let nf = substitute(arena, subs, f);
            if nc == c && nt == t && nf == f {
                e
            } else {
                arena.intern(Term::If(nc, nt, nf))
            }
        }

        // Normal-form leaves: no free variables to replace.
        Term::Str(_)
        | Term::Path(_)
        | Term::Uri(_)
        | Term::Bool(_)
        | Term::Int(_)
        | Term::Float(_)
        | Term::Derivation(_) => e,
    }
}

fn remove_names<'a>(subs: &Subs, names: impl Iterator<Item = &'a Rc<str>>) -> Subs {
    let mut inner = subs.clone();
    for name in names {
        inner.remove(name);
    }
    inner
}

fn substitute_bindings(
    arena: &Arena,
    subs: &Subs,
    bindings: &[(Rc<str>, TermId)],
) -> Vec<(Rc<str>, TermId)> {
    bindings
        .iter()
        .map(|(k, v)| (k.clone(), substitute(arena, subs, *v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn subs_of(pairs: Vec<(&str, TermId)>) -> Subs {
        pairs.into_iter().map(|(k, v)| (Rc::from(k), v)).collect()
    }

    #[test_case(|a: &Arena| a.str("x") ; "string")]
    #[test_case(|a: &Arena| a.int(1) ; "int")]
    #[test_case(|a: &Arena| a.boolean(true) ; "bool")]
    #[test_case(|a: &Arena| a.path("/x") ; "path")]
    fn normal_form_leaves_are_unaffected_by_unrelated_substitutions(make: fn(&Arena) -> TermId) {
        let arena = Arena::new();
        let leaf = make(&arena);
        let replacement = arena.int(99);
        let subs = subs_of(vec![("unrelated", replacement)]);
        assert_eq!(substitute(&arena, &subs, leaf), leaf);
    }

    #[test]
    fn replaces_free_variable() {
        let arena = Arena::new();
        let x = arena.var("x");
        let forty_two = arena.int(42);
        let subs = subs_of(vec![("x", forty_two)]);
        assert_eq!(substitute(&arena, &subs, x), forty_two);
    }

    #[test]
    fn leaves_unrelated_variable_alone() {
        let arena = Arena::new();
        let y = arena.var("y");
        let forty_two = arena.int(42);
        let subs = subs_of(vec![("x", forty_two)]);
        assert_eq!(substitute(&arena, &subs, y), y);
    }

    #[test]
    fn does_not_capture_under_function_formal() {
        let arena = Arena::new();
        let x_var = arena.var("x");
        let body = arena.function(vec![Rc::from("x")], x_var);
        let replacement = arena.int(1);
        let subs = subs_of(vec![("x", replacement)]);

        let result = substitute(&arena, &subs, body);
        // `x` is bound by the function, so the substitution must not reach
        // into the body and the term comes back unchanged.
        assert_eq!(result, body);
    }

    #[test]
    fn substitutes_free_variable_inside_function_body() {
        let arena = Arena::new();
        let y_var = arena.var("y");
        let body = arena.function(vec![Rc::from("x")], y_var);
        let replacement = arena.int(1);
        let subs = subs_of(vec![("y", replacement)]);

        let result = substitute(&arena, &subs, body);
        match arena.get(result) {
            Term::Function(_, new_body) => assert_eq!(new_body, replacement),
            other => panic!("expected Function, got {other:?}"),
        }
    }

    #[test]
    fn rec_bindings_shadow_their_own_names() {
        let arena = Arena::new();
        let a_var = arena.var("a");
        let rec = arena.rec(vec![(Rc::from("a"), a_var)]);
        let replacement = arena.int(7);
        let subs = subs_of(vec![("a", replacement)]);

        // `a` inside the rec set refers to the rec's own binding, which
        // `subs` must not shadow.
        assert_eq!(substitute(&arena, &subs, rec), rec);
    }

    #[test]
    fn structural_recursion_reaches_call_children() {
        let arena = Arena::new();
        let x_var = arena.var("x");
        let call = arena.call(x_var, x_var);
        let replacement = arena.int(3);
        let subs = subs_of(vec![("x", replacement)]);

        let result = substitute(&arena, &subs, call);
        match arena.get(result) {
            Term::Call(f, a) => {
                assert_eq!(f, replacement);
                assert_eq!(a, replacement);
            }
            other => panic!("expected Call, got {other:?}"),
        }
    }
}
