//! Interned, maximal-sharing term graph.
//!
//! Every [`Term`] is hash-consed into an [`Arena`]: two terms with the same
//! tag and the same child pointers are interned exactly once, so pointer
//! (here, [`TermId`]) equality implies structural equality. This is what
//! makes [`TermId`] cheap to use as a memoization key in `rix-eval`.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use total_float_wrap::TotalF64;

/// A handle into an [`Arena`]. Cheap to copy, compare and hash.
///
/// Two `TermId`s compare equal iff the arena interned them from
/// structurally equal [`Term`] values (see [`Arena::intern`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TermId(u32);

impl TermId {
    /// Exposes the raw index, for diagnostics only (e.g. ordering error
    /// output deterministically). Not meaningful across arenas.
    pub fn index(self) -> u32 {
        self.0
    }
}

/// A `(name, value)` binding inside an `Attrs`/`Rec`/`LetRec` body.
pub type Binding = (Rc<str>, TermId);

/// The term language evaluated by `rix-eval`. See `spec.md` §3.
///
/// `Attrs`/`Rec`/`LetRec` bindings are stored pre-sorted by key: this is
/// the one representation that simultaneously satisfies hash-consing
/// (equal attribute sets intern to the same `TermId` regardless of the
/// order they were written in source), the deterministic-iteration
/// invariant of §3, and the derivation assembler's "sorted by key"
/// serialization rule (§4.G).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Term {
    Str(Rc<str>),
    Path(Rc<str>),
    Uri(Rc<str>),
    Bool(bool),
    Int(i64),
    Float(TotalF64),
    Var(Rc<str>),
    Function(Rc<[Rc<str>]>, TermId),
    Call(TermId, TermId),
    Attrs(Rc<[Binding]>),
    Rec(Rc<[Binding]>),
    Select(TermId, Rc<str>),
    List(Rc<[TermId]>),
    If(TermId, TermId, TermId),
    LetRec(Rc<[Binding]>),
    Derivation(Rc<str>),
}

impl Term {
    /// Short tag name, used in error messages and the `toString`/type-error
    /// machinery; never addressable from source.
    pub fn tag(&self) -> &'static str {
        match self {
            Term::Str(_) => "string",
            Term::Path(_) => "path",
            Term::Uri(_) => "uri",
            Term::Bool(_) => "bool",
            Term::Int(_) => "int",
            Term::Float(_) => "float",
            Term::Var(_) => "var",
            Term::Function(..) => "function",
            Term::Call(..) => "call",
            Term::Attrs(_) => "attrs",
            Term::Rec(_) => "rec",
            Term::Select(..) => "select",
            Term::List(_) => "list",
            Term::If(..) => "if",
            Term::LetRec(_) => "letrec",
            Term::Derivation(_) => "derivation",
        }
    }

    /// Whether this root tag can never be a redex on its own (§3 invariant
    /// 3, restricted to what's decidable from the tag alone — `Attrs`/
    /// `List` still need their elements checked, which `rix-eval` does).
    pub fn is_normal_form_tag(&self) -> bool {
        matches!(
            self,
            Term::Str(_)
                | Term::Path(_)
                | Term::Uri(_)
                | Term::Bool(_)
                | Term::Int(_)
                | Term::Float(_)
                | Term::Function(..)
                | Term::Attrs(_)
                | Term::List(_)
                | Term::Derivation(_)
        )
    }
}

#[derive(Default)]
struct ArenaInner {
    terms: Vec<Term>,
    table: FxHashMap<Term, TermId>,
}

/// A hash-cons table of [`Term`]s, owning the arena's backing storage.
///
/// Single-threaded per `spec.md` §5: interior mutability is a `RefCell`,
/// not a lock. An `Arena` outlives every `EvalState` built against it.
#[derive(Default)]
pub struct Arena {
    inner: RefCell<ArenaInner>,
}

impl Arena {
    pub fn new() -> Self {
        Arena::default()
    }

    /// Interns `term`, returning its handle. Structurally equal terms
    /// (including their transitive children, since children are already
    /// `TermId`s) always return the same `TermId`.
    pub fn intern(&self, term: Term) -> TermId {
        let mut inner = self.inner.borrow_mut();
        if let Some(id) = inner.table.get(&term) {
            return *id;
        }
        let id = TermId(inner.terms.len() as u32);
        inner.terms.push(term.clone());
        inner.table.insert(term, id);
        id
    }

    /// Fetches a clone of the term behind `id`. Cloning is cheap: every
    /// variant's payload is `Copy` or an `Rc`.
    pub fn get(&self, id: TermId) -> Term {
        self.inner.borrow().terms[id.0 as usize].clone()
    }

    pub fn tag(&self, id: TermId) -> &'static str {
        // tag() doesn't borrow any Rc contents, so this clone is cheap
        // and lets us avoid holding the RefCell borrow across the call.
        self.get(id).tag()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // --- convenience constructors -----------------------------------

    pub fn str(&self, s: impl Into<Rc<str>>) -> TermId {
        self.intern(Term::Str(s.into()))
    }

    pub fn path(&self, s: impl Into<Rc<str>>) -> TermId {
        self.intern(Term::Path(s.into()))
    }

    pub fn uri(&self, s: impl Into<Rc<str>>) -> TermId {
        self.intern(Term::Uri(s.into()))
    }

    pub fn boolean(&self, b: bool) -> TermId {
        self.intern(Term::Bool(b))
    }

    pub fn int(&self, n: i64) -> TermId {
        self.intern(Term::Int(n))
    }

    pub fn float(&self, f: f64) -> TermId {
        self.intern(Term::Float(TotalF64::from(f)))
    }

    pub fn var(&self, name: impl Into<Rc<str>>) -> TermId {
        self.intern(Term::Var(name.into()))
    }

    pub fn function(&self, formals: Vec<Rc<str>>, body: TermId) -> TermId {
        self.intern(Term::Function(formals.into(), body))
    }

    pub fn call(&self, f: TermId, arg: TermId) -> TermId {
        self.intern(Term::Call(f, arg))
    }

    /// Builds an `Attrs` term, sorting `bindings` by key first (duplicate
    /// keys are not deduplicated here; `rix-parser` is responsible for
    /// rejecting them at parse time).
    pub fn attrs(&self, mut bindings: Vec<Binding>) -> TermId {
        bindings.sort_by(|a, b| a.0.cmp(&b.0));
        self.intern(Term::Attrs(bindings.into()))
    }

    pub fn rec(&self, mut bindings: Vec<Binding>) -> TermId {
        bindings.sort_by(|a, b| a.0.cmp(&b.0));
        self.intern(Term::Rec(bindings.into()))
    }

    pub fn select(&self, e: TermId, name: impl Into<Rc<str>>) -> TermId {
        self.intern(Term::Select(e, name.into()))
    }

    pub fn list(&self, elems: Vec<TermId>) -> TermId {
        self.intern(Term::List(elems.into()))
    }

    pub fn if_(&self, c: TermId, t: TermId, e: TermId) -> TermId {
        self.intern(Term::If(c, t, e))
    }

    pub fn letrec(&self, mut bindings: Vec<Binding>) -> TermId {
        bindings.sort_by(|a, b| a.0.cmp(&b.0));
        self.intern(Term::LetRec(bindings.into()))
    }

    pub fn derivation(&self, store_path: impl Into<Rc<str>>) -> TermId {
        self.intern(Term::Derivation(store_path.into()))
    }
}
