//! Lazy reduction to normal form with memoization and black-holing
//! (`spec.md` §4.D), the primop table it dispatches through (§4.E), and
//! the `EvalState` session object both live in (§3). Grounded on
//! `fix-ng/eval.cc`'s `evalExpr`/`evalExpr2` for control flow, with the
//! blackhole sentinel mapped onto an explicit `Slot` enum the way
//! `tvix-eval::value::thunk::ThunkRepr` distinguishes `Blackhole` from
//! `Evaluated` (`SPEC_FULL.md` §9).

pub mod config;
mod coerce;
mod derivation;
pub mod errors;
mod primops;

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;

use rix_arena::{Arena, Term, TermId};
use rix_store::{Hash, Store, StorePath};
use rix_subst::Subs;
use rustc_hash::FxHashMap;

pub use config::Config;
pub use errors::EvalError;
pub use primops::{OPERATOR_NAMES, PRIMOP_NAMES};

/// Memo entry for a single term. `BlackHole` marks a reduction in
/// progress; re-entering `eval` while it's installed is how the
/// infinite-recursion check (`spec.md` §4.D step 1) is implemented.
#[derive(Clone, Copy, Debug)]
enum Slot {
    BlackHole,
    Done(TermId),
}

/// The mutable session object of `spec.md` §3: memoization, the two
/// derivation-assembly caches, the `import` search path, and the
/// `nr_evaluated`/`nr_cached` telemetry counters. Single-threaded per
/// §5 -- every field uses `Cell`/`RefCell` interior mutability, never a
/// lock.
pub struct EvalState<'a> {
    arena: &'a Arena,
    store: &'a dyn Store,
    config: Config,
    normal_forms: RefCell<FxHashMap<TermId, Slot>>,
    /// Cached root set per descriptor (`spec.md` §3's `drv_paths`),
    /// populated lazily from `Store::nix_expr_roots` so repeated
    /// binding coercions of the same nested derivation don't re-hit the
    /// store (mirrors `fix-ng/primops.cc`'s `nixExprRootsCached`).
    drv_paths: RefCell<FxHashMap<StorePath, BTreeSet<StorePath>>>,
    /// Normalized (input-free) content hash cache, keyed by the
    /// descriptor's own store path, populated whenever this session
    /// assembles a derivation or closure (`spec.md` §3's `drv_hashes`).
    drv_hashes: RefCell<FxHashMap<StorePath, Hash>>,
    nr_evaluated: Cell<u64>,
    nr_cached: Cell<u64>,
}

impl<'a> EvalState<'a> {
    pub fn new(arena: &'a Arena, store: &'a dyn Store, config: Config) -> Self {
        EvalState {
            arena,
            store,
            config,
            normal_forms: RefCell::new(FxHashMap::default()),
            drv_paths: RefCell::new(FxHashMap::default()),
            drv_hashes: RefCell::new(FxHashMap::default()),
            nr_evaluated: Cell::new(0),
            nr_cached: Cell::new(0),
        }
    }

    pub fn arena(&self) -> &'a Arena {
        self.arena
    }

    pub fn store(&self) -> &'a dyn Store {
        self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn search_dirs(&self) -> &[String] {
        &self.config.search_dirs
    }

    pub fn nr_evaluated(&self) -> u64 {
        self.nr_evaluated.get()
    }

    pub fn nr_cached(&self) -> u64 {
        self.nr_cached.get()
    }

    /// Emits the `nr_evaluated`/`nr_cached` telemetry counters as a
    /// single `tracing` event, mirroring `fix-ng/eval.cc`'s
    /// `printEvalStats` (also logged, not printed to stdout, and at the
    /// same debug-not-info granularity since these are diagnostic
    /// counters rather than user-facing output).
    pub fn log_stats(&self) {
        tracing::debug!(nr_evaluated = self.nr_evaluated(), nr_cached = self.nr_cached(), "evaluation complete");
    }

    /// Records the storage hash of a descriptor this session just
    /// assembled, so later bindings that depend on it (and later
    /// fixed-point derivations whose normalized hash needs it) can
    /// find it without re-reading the store.
    pub fn record_hash(&self, drv_path: StorePath, hash: Hash) {
        self.drv_hashes.borrow_mut().insert(drv_path, hash);
    }

    pub fn drv_hash(&self, drv_path: &StorePath) -> Option<Hash> {
        self.drv_hashes.borrow().get(drv_path).cloned()
    }

    /// `nix_expr_roots`, cached per session (`spec.md` §4.F).
    pub fn nix_expr_roots_cached(&self, drv_path: &StorePath) -> Result<BTreeSet<StorePath>, EvalError> {
        if let Some(cached) = self.drv_paths.borrow().get(drv_path) {
            return Ok(cached.clone());
        }
        let roots = self.store.nix_expr_roots(drv_path)?;
        self.drv_paths.borrow_mut().insert(drv_path.clone(), roots.clone());
        Ok(roots)
    }

    /// `eval(state, e)` of `spec.md` §4.D: the memoization/black-hole
    /// protocol around `eval_step`.
    pub fn eval(&self, e: TermId) -> Result<TermId, EvalError> {
        match self.normal_forms.borrow().get(&e) {
            Some(Slot::BlackHole) => return Err(EvalError::InfiniteRecursion(e)),
            Some(Slot::Done(nf)) => {
                self.nr_cached.set(self.nr_cached.get() + 1);
                return Ok(*nf);
            }
            None => {}
        }

        self.normal_forms.borrow_mut().insert(e, Slot::BlackHole);
        match self.eval_step(e) {
            Ok(nf) => {
                self.normal_forms.borrow_mut().insert(e, Slot::Done(nf));
                self.nr_evaluated.set(self.nr_evaluated.get() + 1);
                Ok(nf)
            }
            Err(err) => {
                // Failures are never memoized (`spec.md` §7): clear the
                // black hole so a later call can re-attempt.
                self.normal_forms.borrow_mut().remove(&e);
                Err(err)
            }
        }
    }

    /// `eval_step` of `spec.md` §4.D, dispatched by root tag.
    fn eval_step(&self, e: TermId) -> Result<TermId, EvalError> {
        let arena = self.arena;
        match arena.get(e) {
            // Normal forms: returned unchanged. `Attrs`/`List` are
            // normal at the container level even though their
            // fields/elements may still be unevaluated thunks -- that's
            // exactly what makes the language lazy (`spec.md` §3).
            Term::Str(_)
            | Term::Path(_)
            | Term::Uri(_)
            | Term::Bool(_)
            | Term::Int(_)
            | Term::Float(_)
            | Term::Function(..)
            | Term::Attrs(_)
            | Term::List(_)
            | Term::Derivation(_) => Ok(e),

            Term::Var(name) => {
                if name.as_ref() == "__curPlatform" {
                    // The one nullary internal operator (`spec.md`
                    // §4.E "Platform"): it has no second operand to
                    // wait for, so it reduces to its value immediately
                    // rather than staying in `Var` form like the named
                    // primops/binary operators do.
                    return Ok(arena.str(self.config.this_system.clone()));
                }
                if primops::is_known_name(&name) {
                    Ok(e)
                } else {
                    Err(EvalError::UndefinedVariable { name: name.to_string() })
                }
            }

            Term::Call(f, arg) => self.eval_call(e, f, arg),

            Term::Select(inner, name) => {
                let inner_nf = self.eval(inner)?;
                let bindings = match arena.get(inner_nf) {
                    Term::Attrs(bindings) => bindings,
                    other => {
                        return Err(EvalError::TypeError {
                            expected: "attrs",
                            found: other.tag(),
                            term: inner_nf,
                        })
                    }
                };
                let value = bindings
                    .iter()
                    .find(|(k, _)| k.as_ref() == name.as_ref())
                    .map(|(_, v)| *v)
                    .ok_or_else(|| EvalError::MissingAttribute { name: name.to_string(), term: e })?;
                self.eval(value)
            }

            Term::Rec(bindings) => {
                // `expandRec` (`spec.md` §4.D): rewrite to a non-recursive
                // `Attrs` whose every value is substituted so that its own
                // free occurrences of sibling names become `Select`s on
                // the *original* `Rec` node `e`, preserving sharing
                // instead of any cyclic ownership (`SPEC_FULL.md` §9).
                let mut subs = Subs::default();
                for (k, _) in bindings.iter() {
                    subs.insert(k.clone(), arena.select(e, k.clone()));
                }
                let new_bindings: Vec<_> = bindings
                    .iter()
                    .map(|(k, v)| (k.clone(), rix_subst::substitute(arena, &subs, *v)))
                    .collect();
                Ok(arena.attrs(new_bindings))
            }

            Term::LetRec(bindings) => {
                let rec = arena.rec(bindings.to_vec());
                let select = arena.select(rec, "body");
                self.eval(select)
            }

            Term::If(cond, then_branch, else_branch) => {
                let cond_nf = self.eval(cond)?;
                match arena.get(cond_nf) {
                    Term::Bool(true) => self.eval(then_branch),
                    Term::Bool(false) => self.eval(else_branch),
                    other => Err(EvalError::TypeError {
                        expected: "bool",
                        found: other.tag(),
                        term: cond_nf,
                    }),
                }
            }
        }
    }

    /// `Call(f, a)` dispatch (`spec.md` §4.D). Internal binary operators
    /// are recognized at the `Call(Call(Var(op), lhs), rhs)` shape
    /// *before* `f` is evaluated, since evaluating a bare `Var(op)`
    /// alone has no value to produce (`SPEC_FULL.md` §3).
    fn eval_call(&self, _e: TermId, f: TermId, arg: TermId) -> Result<TermId, EvalError> {
        let arena = self.arena;

        if let Term::Call(inner_f, inner_arg) = arena.get(f) {
            if let Term::Var(name) = arena.get(inner_f) {
                if name.as_ref() != "__curPlatform" && OPERATOR_NAMES.contains(&name.as_ref()) {
                    return primops::eval_binop(self, &name, inner_arg, arg);
                }
            }
        }

        let f_nf = self.eval(f)?;
        match arena.get(f_nf) {
            Term::Var(name) if PRIMOP_NAMES.contains(&name.as_ref()) => {
                let result = primops::invoke_named(self, &name, arg)?;
                self.eval(result)
            }

            Term::Function(formals, body) => {
                let arg_nf = self.eval(arg)?;
                let supplied = match arena.get(arg_nf) {
                    Term::Attrs(bindings) => bindings,
                    other => {
                        return Err(EvalError::TypeError {
                            expected: "attrs",
                            found: other.tag(),
                            term: arg_nf,
                        })
                    }
                };

                let mut subs = Subs::default();
                for (k, v) in supplied.iter() {
                    if !formals.iter().any(|formal| formal.as_ref() == k.as_ref()) {
                        return Err(EvalError::InvalidCall {
                            message: format!("argument `{k}` not declared"),
                            term: arg_nf,
                        });
                    }
                    subs.insert(k.clone(), *v);
                }
                for formal in formals.iter() {
                    if !subs.contains_key(formal) {
                        return Err(EvalError::InvalidCall {
                            message: format!("formal argument `{formal}` missing"),
                            term: arg_nf,
                        });
                    }
                }

                let substituted = rix_subst::substitute(arena, &subs, body);
                self.eval(substituted)
            }

            other => Err(EvalError::NotCallable { found: other.tag(), term: f_nf }),
        }
    }

    /// `eval_string` of `spec.md` §4.D.
    pub fn eval_string(&self, e: TermId) -> Result<String, EvalError> {
        let nf = self.eval(e)?;
        match self.arena.get(nf) {
            Term::Str(s) => Ok(s.to_string()),
            other => Err(EvalError::TypeError { expected: "string", found: other.tag(), term: nf }),
        }
    }

    /// `eval_path` of `spec.md` §4.D.
    pub fn eval_path(&self, e: TermId) -> Result<String, EvalError> {
        let nf = self.eval(e)?;
        match self.arena.get(nf) {
            Term::Path(s) => Ok(s.to_string()),
            other => Err(EvalError::TypeError { expected: "path", found: other.tag(), term: nf }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rix_store::{FsStore, Store as _};
    use test_case::test_case;

    fn fixture() -> (Arena, FsStore) {
        (Arena::new(), FsStore::new(std::env::temp_dir().join("rix-eval-test-store"), false))
    }

    #[test_case("__add", 3, 4, 7 ; "add")]
    #[test_case("__sub", 10, 4, 6 ; "sub")]
    #[test_case("__mul", 3, 4, 12 ; "mul")]
    #[test_case("__div", 12, 4, 3 ; "div")]
    fn arithmetic_operators_reduce_int_pairs(op: &str, a: i64, b: i64, expected: i64) {
        let (arena, store) = fixture();
        let state = EvalState::new(&arena, &store, Config::default());
        let call = arena.call(arena.call(arena.var(op), arena.int(a)), arena.int(b));
        assert_eq!(arena.get(state.eval(call).unwrap()), Term::Int(expected));
    }

    #[test]
    fn literal_evaluates_to_itself_and_is_cached_on_second_call() {
        let (arena, store) = fixture();
        let state = EvalState::new(&arena, &store, Config::default());
        let s = arena.str("hello");
        assert_eq!(state.eval(s).unwrap(), s);
        assert_eq!(state.nr_cached(), 0);
        assert_eq!(state.eval(s).unwrap(), s);
        assert_eq!(state.nr_cached(), 1);
    }

    #[test]
    fn function_application_adds_one() {
        let (arena, store) = fixture();
        let state = EvalState::new(&arena, &store, Config::default());

        // (x: x + 1) { x = 41; }
        let body = {
            let x = arena.var("x");
            let one = arena.int(1);
            let add = arena.var("__add");
            arena.call(arena.call(add, x), one)
        };
        let f = arena.function(vec![std::rc::Rc::from("x")], body);
        let forty_one = arena.int(41);
        let attrs = arena.attrs(vec![(std::rc::Rc::from("x"), forty_one)]);
        let call = arena.call(f, attrs);

        let result = state.eval(call).unwrap();
        assert_eq!(arena.get(result), Term::Int(42));
    }

    #[test]
    fn recursive_attrs_resolve_through_select_on_the_original_rec() {
        let (arena, store) = fixture();
        let state = EvalState::new(&arena, &store, Config::default());

        // rec { a = 1; b = a + 1; body = b + 1; }.body
        let a_val = arena.int(1);
        let b_val = {
            let a = arena.var("a");
            let one = arena.int(1);
            arena.call(arena.call(arena.var("__add"), a), one)
        };
        let body_val = {
            let b = arena.var("b");
            let one = arena.int(1);
            arena.call(arena.call(arena.var("__add"), b), one)
        };
        let rec = arena.rec(vec![
            (std::rc::Rc::from("a"), a_val),
            (std::rc::Rc::from("b"), b_val),
            (std::rc::Rc::from("body"), body_val),
        ]);
        let select = arena.select(rec, "body");

        let result = state.eval(select).unwrap();
        assert_eq!(arena.get(result), Term::Int(3));
    }

    #[test]
    fn self_referential_let_fails_with_infinite_recursion_and_state_stays_usable() {
        let (arena, store) = fixture();
        let state = EvalState::new(&arena, &store, Config::default());

        // let x = x; in x
        let x = arena.var("x");
        let letrec = arena.letrec(vec![(std::rc::Rc::from("x"), x), (std::rc::Rc::from("body"), x)]);

        let err = state.eval(letrec).unwrap_err();
        assert!(matches!(err, EvalError::InfiniteRecursion(_)));

        // The state is still usable for an unrelated term (Property 3).
        let forty_two = arena.int(42);
        assert_eq!(state.eval(forty_two).unwrap(), forty_two);
    }

    #[test]
    fn idempotence_of_evaluation() {
        let (arena, store) = fixture();
        let state = EvalState::new(&arena, &store, Config::default());
        let one = arena.int(1);
        let two = arena.int(2);
        let sum = arena.call(arena.call(arena.var("__add"), one), two);

        let first = state.eval(sum).unwrap();
        let second = state.eval(first).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn minimal_derivation_call_produces_drv_and_out_path() {
        let dir = tempfile::tempdir().unwrap();
        let arena = Arena::new();
        let store = FsStore::new(dir.path().join("store"), false);
        let mut config = Config::default();
        config.store_dir = store.store_dir().to_string();
        let state = EvalState::new(&arena, &store, config);

        let attrs = arena.attrs(vec![
            (std::rc::Rc::from("name"), arena.str("x")),
            (std::rc::Rc::from("system"), arena.str("X")),
            (std::rc::Rc::from("builder"), arena.str("/b")),
        ]);
        let call = arena.call(arena.var("derivation"), attrs);

        let result = state.eval(call).unwrap();
        let bindings = match arena.get(result) {
            Term::Attrs(b) => b,
            other => panic!("expected Attrs, got {other:?}"),
        };
        let find = |key: &str| bindings.iter().find(|(k, _)| k.as_ref() == key).map(|(_, v)| *v);
        assert!(matches!(arena.get(find("drvPath").unwrap()), Term::Path(_)));
        assert!(matches!(arena.get(find("outPath").unwrap()), Term::Path(_)));
        assert_eq!(arena.get(find("type").unwrap()), Term::Str(std::rc::Rc::from("derivation")));
    }

    #[test]
    fn undefined_bare_variable_is_an_error() {
        let (arena, store) = fixture();
        let state = EvalState::new(&arena, &store, Config::default());
        let v = arena.var("nonexistent");
        assert!(matches!(state.eval(v).unwrap_err(), EvalError::UndefinedVariable { .. }));
    }

    #[test]
    fn select_on_missing_attribute_fails() {
        let (arena, store) = fixture();
        let state = EvalState::new(&arena, &store, Config::default());
        let attrs = arena.attrs(vec![]);
        let select = arena.select(attrs, "missing");
        assert!(matches!(state.eval(select).unwrap_err(), EvalError::MissingAttribute { .. }));
    }
}
