//! Renders a normal-form term back to source-like text for `rix eval`'s
//! output, the same role `tvix-eval`'s `Value::Display` plays for its
//! CLI. Strings are quoted and escaped with `rix_derivation`'s escaper
//! so the same quoting rules apply on both sides of the evaluator.

use rix_arena::{Arena, Term};
use rix_derivation::string_escape::escape_string;

pub fn format_term(arena: &Arena, id: rix_arena::TermId) -> String {
    match arena.get(id) {
        Term::Str(s) => escape_string(&s),
        Term::Path(s) => s.to_string(),
        Term::Uri(s) => s.to_string(),
        Term::Bool(b) => b.to_string(),
        Term::Int(n) => n.to_string(),
        Term::Float(f) => f.0.to_string(),
        Term::Var(name) => name.to_string(),
        Term::Derivation(path) => format!("<derivation {path}>"),
        Term::Function(..) => "<function>".to_string(),
        Term::Call(..) => "<call>".to_string(),
        Term::Select(..) => "<select>".to_string(),
        Term::If(..) => "<if>".to_string(),
        Term::Rec(_) => "<rec>".to_string(),
        Term::LetRec(_) => "<letrec>".to_string(),

        Term::List(elems) => {
            let items: Vec<String> = elems.iter().map(|e| format_term(arena, *e)).collect();
            format!("[ {} ]", items.join(" "))
        }

        Term::Attrs(bindings) => {
            let items: Vec<String> = bindings
                .iter()
                .map(|(k, v)| format!("{} = {};", k, format_term(arena, *v)))
                .collect();
            format!("{{ {} }}", items.join(" "))
        }
    }
}
