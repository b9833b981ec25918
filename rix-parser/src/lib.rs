//! Recursive-descent parser: source text -> `rix_arena::TermId`.
//!
//! Grounded in `nix-compat`'s hand-written `nom`-based `aterm`/derivation
//! parsers (the pack's established way to write a small parser by hand),
//! but built as a classic recursive-descent grammar over plain `&str`
//! cursors rather than a fully combinator-composed `nom::Parser` chain,
//! since every production also needs a `&Arena` to intern into. `nom`'s
//! primitive token recognizers (`digit1`, `take_while`, ...) do the
//! character-class work; the grammar glue and backtracking are hand-rolled.
//!
//! Supports the literal/operator surface `spec.md` §8's scenarios need:
//! literals, `rec { }`, `let .. in`, function literals (`x: body`,
//! `{ a, b }: body`), application, attribute selection, lists,
//! `if/then/else`, and the infix operators `+ - * / ++ // == != < <= > >=
//! && || !` plus string/path concatenation (overloaded onto `+`).

use std::rc::Rc;

use nom::bytes::complete::take_while1;
use nom::character::complete::digit1;
use thiserror::Error;

use rix_arena::{Arena, TermId};

/// A parse failure, carrying a human-readable message and a source
/// position. Kept deliberately simple (a plain `(line, column, offset)`
/// triple) rather than full `codemap`-style diagnostics, since this
/// tree-walking core has no compiler-observer machinery to report through.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

type PResult<'a, T> = Result<(&'a str, T), ParseError>;

const KEYWORDS: &[&str] = &["if", "then", "else", "let", "in", "rec", "true", "false"];

/// Parses `source` to a term, interning nodes into `arena`.
pub fn parse(arena: &Arena, source: &str) -> Result<TermId, ParseError> {
    let (rest, e) = expr(arena, source, source)?;
    let rest = skip_trivia(rest);
    if !rest.is_empty() {
        return Err(make_error(source, rest, "trailing input after expression"));
    }
    Ok(e)
}

// --- trivia & positions --------------------------------------------------

fn skip_trivia(mut input: &str) -> &str {
    loop {
        let start_len = input.len();
        input = input.trim_start_matches([' ', '\t', '\r', '\n']);
        if let Some(rest) = input.strip_prefix('#') {
            let idx = rest.find('\n').map(|i| i + 1).unwrap_or(rest.len());
            input = &rest[idx..];
        } else if let Some(rest) = input.strip_prefix("/*") {
            match rest.find("*/") {
                Some(end) => input = &rest[end + 2..],
                None => input = "",
            }
        }
        if input.len() == start_len {
            break;
        }
    }
    input
}

fn offset_of(full: &str, input: &str) -> usize {
    full.len() - input.len()
}

fn line_col(full: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for ch in full[..offset.min(full.len())].chars() {
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

fn make_error(full: &str, input: &str, message: impl Into<String>) -> ParseError {
    let offset = offset_of(full, input);
    let (line, column) = line_col(full, offset);
    ParseError {
        message: message.into(),
        line,
        column,
        offset,
    }
}

// --- lexical helpers ------------------------------------------------------

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '\'' || c == '-'
}

/// Tries to consume `kw` as a whole word (not a prefix of a longer
/// identifier) from the trivia-skipped input.
fn keyword<'a>(input: &'a str, kw: &str) -> Option<&'a str> {
    let input = skip_trivia(input);
    let rest = input.strip_prefix(kw)?;
    match rest.chars().next() {
        Some(c) if is_ident_continue(c) => None,
        _ => Some(rest),
    }
}

/// Tries to consume a literal symbol (operator/punctuation) after trivia.
fn symbol<'a>(input: &'a str, sym: &str) -> Option<&'a str> {
    skip_trivia(input).strip_prefix(sym)
}

fn parse_ident(full: &str, input: &str) -> PResult<'_, &str> {
    let trimmed = skip_trivia(input);
    let mut chars = trimmed.char_indices();
    match chars.next() {
        Some((_, c)) if is_ident_start(c) => {}
        _ => return Err(make_error(full, trimmed, "expected an identifier")),
    }
    let end = chars
        .find(|&(_, c)| !is_ident_continue(c))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    let name = &trimmed[..end];
    if KEYWORDS.contains(&name) {
        return Err(make_error(full, trimmed, format!("unexpected keyword `{name}`")));
    }
    Ok((&trimmed[end..], name))
}

fn expect_symbol<'a>(full: &str, input: &'a str, sym: &str) -> PResult<'a, ()> {
    match symbol(input, sym) {
        Some(rest) => Ok((rest, ())),
        None => Err(make_error(full, skip_trivia(input), format!("expected `{sym}`"))),
    }
}

// --- atoms: numbers, strings, paths, uris ---------------------------------

fn parse_number(full: &str, input: &str) -> PResult<'_, TermData> {
    let trimmed = skip_trivia(input);
    let (rest_int, int_digits) =
        digit1::<&str, nom::error::Error<&str>>(trimmed).map_err(|_| make_error(full, trimmed, "expected a number"))?;

    if let Some(after_dot) = rest_int.strip_prefix('.') {
        if let Ok((rest_frac, frac_digits)) = digit1::<&str, nom::error::Error<&str>>(after_dot) {
            let text_len = trimmed.len() - rest_frac.len();
            let text = &trimmed[..text_len];
            let value: f64 = text
                .parse()
                .map_err(|_| make_error(full, trimmed, "invalid float literal"))?;
            let _ = frac_digits;
            return Ok((rest_frac, TermData::Float(value)));
        }
    }

    let value: i64 = int_digits
        .parse()
        .map_err(|_| make_error(full, trimmed, "invalid integer literal"))?;
    Ok((rest_int, TermData::Int(value)))
}

/// The non-final outcome of parsing a literal token: we only intern once
/// we know which arena constructor applies.
enum TermData {
    Int(i64),
    Float(f64),
}

fn parse_string(full: &str, input: &str) -> PResult<'_, Rc<str>> {
    let trimmed = skip_trivia(input);
    let rest = trimmed
        .strip_prefix('"')
        .ok_or_else(|| make_error(full, trimmed, "expected a string literal"))?;

    let mut out = String::new();
    let mut chars = rest.char_indices();
    loop {
        match chars.next() {
            None => return Err(make_error(full, trimmed, "unterminated string literal")),
            Some((i, '"')) => {
                let after = &rest[i + 1..];
                return Ok((after, Rc::from(out)));
            }
            Some((i, '\\')) => {
                let escaped = rest[i + 1..].chars().next();
                match escaped {
                    Some('n') => {
                        out.push('\n');
                        chars.next();
                    }
                    Some('t') => {
                        out.push('\t');
                        chars.next();
                    }
                    Some('r') => {
                        out.push('\r');
                        chars.next();
                    }
                    Some('"') => {
                        out.push('"');
                        chars.next();
                    }
                    Some('\\') => {
                        out.push('\\');
                        chars.next();
                    }
                    Some('$') => {
                        out.push('$');
                        chars.next();
                    }
                    Some(other) => {
                        out.push(other);
                        chars.next();
                    }
                    None => return Err(make_error(full, trimmed, "unterminated escape sequence")),
                }
            }
            Some((_, c)) => out.push(c),
        }
    }
}

fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+' | '/' | '~')
}

/// Recognizes the bare path literal forms `/abs/path`, `./rel/path`,
/// `../rel/path`, `~/home/path`. Requires at least one `/` so that it
/// can't be confused with an ordinary identifier.
fn parse_path(full: &str, input: &str) -> PResult<'_, Rc<str>> {
    let trimmed = skip_trivia(input);
    let looks_like_path = trimmed.starts_with('/')
        || trimmed.starts_with("./")
        || trimmed.starts_with("../")
        || trimmed.starts_with("~/");
    if !looks_like_path {
        return Err(make_error(full, trimmed, "expected a path literal"));
    }
    let (text, _) = take_while1::<_, &str, nom::error::Error<&str>>(is_path_char)(trimmed)
        .map_err(|_| make_error(full, trimmed, "expected a path literal"))?;
    if !text.contains('/') {
        return Err(make_error(full, trimmed, "expected a path literal"));
    }
    let rest = &trimmed[text.len()..];
    Ok((rest, Rc::from(text)))
}

/// Recognizes `scheme://rest-of-uri`, the one unambiguous URI shape given
/// this grammar also uses `ident : body` for single-argument lambdas (a
/// bare `scheme:path` would be indistinguishable from a lambda head, so
/// only the `//`-suffixed form is treated as a URI literal).
fn parse_uri(full: &str, input: &str) -> PResult<'_, Rc<str>> {
    let trimmed = skip_trivia(input);
    let mut chars = trimmed.char_indices();
    match chars.next() {
        Some((_, c)) if c.is_ascii_alphabetic() => {}
        _ => return Err(make_error(full, trimmed, "expected a URI literal")),
    }
    let scheme_end = chars
        .find(|&(_, c)| !(c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.'))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    let after_scheme = &trimmed[scheme_end..];
    if !after_scheme.starts_with("://") {
        return Err(make_error(full, trimmed, "expected a URI literal"));
    }
    let body_start = scheme_end + "://".len();
    let body = &trimmed[body_start..];
    let body_len = body
        .find(|c: char| c.is_whitespace() || matches!(c, ';' | ',' | ')' | ']' | '}'))
        .unwrap_or(body.len());
    let end = body_start + body_len;
    let text = &trimmed[..end];
    Ok((&trimmed[end..], Rc::from(text)))
}

// --- grammar ---------------------------------------------------------------

pub(crate) fn expr<'a>(arena: &Arena, full: &str, input: &'a str) -> PResult<'a, TermId> {
    let trimmed = skip_trivia(input);

    if let Some(rest) = keyword(trimmed, "if") {
        let (rest, cond) = expr(arena, full, rest)?;
        let rest = expect_keyword(full, rest, "then")?;
        let (rest, then_branch) = expr(arena, full, rest)?;
        let rest = expect_keyword(full, rest, "else")?;
        let (rest, else_branch) = expr(arena, full, rest)?;
        return Ok((rest, arena.if_(cond, then_branch, else_branch)));
    }

    if let Some(rest) = keyword(trimmed, "let") {
        let (rest, bindings) = bindings(arena, full, rest)?;
        let rest = expect_keyword(full, rest, "in")?;
        let (rest, body) = expr(arena, full, rest)?;
        let mut all = bindings;
        all.push((Rc::from("body"), body));
        return Ok((rest, arena.letrec(all)));
    }

    // Single-formal lambda: `ident : body`. Backtrack if it turns out to
    // just be a bare variable reference followed by something else, or if
    // this is actually a `scheme://...` URI literal (which also has the
    // shape `ident ':' ...`).
    if let Ok((after_ident, name)) = parse_ident(full, trimmed) {
        if let Some(after_colon) = symbol(after_ident, ":") {
            if !after_colon.starts_with("//") {
                let (rest, body) = expr(arena, full, after_colon)?;
                return Ok((rest, arena.function(vec![Rc::from(name)], body)));
            }
        }
    }

    or_expr(arena, full, trimmed)
}

fn expect_keyword<'a>(full: &str, input: &'a str, kw: &str) -> Result<&'a str, ParseError> {
    keyword(input, kw).ok_or_else(|| make_error(full, skip_trivia(input), format!("expected `{kw}`")))
}

/// `ident '=' expr ';'` repeated zero or more times.
fn bindings<'a>(arena: &Arena, full: &str, input: &'a str) -> PResult<'a, Vec<(Rc<str>, TermId)>> {
    let mut rest = input;
    let mut out = Vec::new();
    loop {
        let Ok((after_ident, name)) = parse_ident(full, rest) else {
            break;
        };
        let Some(after_eq) = symbol(after_ident, "=") else {
            break;
        };
        let (after_value, value) = expr(arena, full, after_eq)?;
        let after_semi = expect_symbol(full, after_value, ";")?.0;
        out.push((Rc::from(name), value));
        rest = after_semi;
    }
    Ok((rest, out))
}

macro_rules! left_assoc_binop {
    ($name:ident, $next:ident, [$($sym:literal => $op:literal),+ $(,)?]) => {
        fn $name<'a>(arena: &Arena, full: &str, input: &'a str) -> PResult<'a, TermId> {
            let (mut rest, mut lhs) = $next(arena, full, input)?;
            loop {
                $(
                    if let Some(after_sym) = symbol(rest, $sym) {
                        let (after_rhs, rhs) = $next(arena, full, after_sym)?;
                        lhs = binop(arena, $op, lhs, rhs);
                        rest = after_rhs;
                        continue;
                    }
                )+
                break;
            }
            Ok((rest, lhs))
        }
    };
}

fn binop(arena: &Arena, op: &str, a: TermId, b: TermId) -> TermId {
    let f = arena.var(op);
    let partial = arena.call(f, a);
    arena.call(partial, b)
}

fn or_expr<'a>(arena: &Arena, full: &str, input: &'a str) -> PResult<'a, TermId> {
    let (mut rest, mut lhs) = and_expr(arena, full, input)?;
    loop {
        if let Some(after) = symbol(rest, "||") {
            let (after_rhs, rhs) = and_expr(arena, full, after)?;
            let true_ = arena.boolean(true);
            lhs = arena.if_(lhs, true_, rhs);
            rest = after_rhs;
            continue;
        }
        break;
    }
    Ok((rest, lhs))
}

fn and_expr<'a>(arena: &Arena, full: &str, input: &'a str) -> PResult<'a, TermId> {
    let (mut rest, mut lhs) = eq_expr(arena, full, input)?;
    loop {
        if let Some(after) = symbol(rest, "&&") {
            let (after_rhs, rhs) = eq_expr(arena, full, after)?;
            let false_ = arena.boolean(false);
            lhs = arena.if_(lhs, rhs, false_);
            rest = after_rhs;
            continue;
        }
        break;
    }
    Ok((rest, lhs))
}

fn eq_expr<'a>(arena: &Arena, full: &str, input: &'a str) -> PResult<'a, TermId> {
    let (rest, lhs) = rel_expr(arena, full, input)?;
    if let Some(after) = symbol(rest, "==") {
        let (after_rhs, rhs) = rel_expr(arena, full, after)?;
        return Ok((after_rhs, binop(arena, "__eq", lhs, rhs)));
    }
    if let Some(after) = symbol(rest, "!=") {
        let (after_rhs, rhs) = rel_expr(arena, full, after)?;
        let eq = binop(arena, "__eq", lhs, rhs);
        let t = arena.boolean(false);
        let f = arena.boolean(true);
        return Ok((after_rhs, arena.if_(eq, t, f)));
    }
    Ok((rest, lhs))
}

fn rel_expr<'a>(arena: &Arena, full: &str, input: &'a str) -> PResult<'a, TermId> {
    let (rest, lhs) = update_expr(arena, full, input)?;
    if let Some(after) = symbol(rest, "<=") {
        let (after_rhs, rhs) = update_expr(arena, full, after)?;
        let lt = binop(arena, "__lt", rhs, lhs);
        let t = arena.boolean(false);
        let f = arena.boolean(true);
        return Ok((after_rhs, arena.if_(lt, t, f)));
    }
    if let Some(after) = symbol(rest, ">=") {
        let (after_rhs, rhs) = update_expr(arena, full, after)?;
        let lt = binop(arena, "__lt", lhs, rhs);
        let t = arena.boolean(false);
        let f = arena.boolean(true);
        return Ok((after_rhs, arena.if_(lt, t, f)));
    }
    if let Some(after) = symbol(rest, "<") {
        let (after_rhs, rhs) = update_expr(arena, full, after)?;
        return Ok((after_rhs, binop(arena, "__lt", lhs, rhs)));
    }
    if let Some(after) = symbol(rest, ">") {
        let (after_rhs, rhs) = update_expr(arena, full, after)?;
        return Ok((after_rhs, binop(arena, "__lt", rhs, lhs)));
    }
    Ok((rest, lhs))
}

fn update_expr<'a>(arena: &Arena, full: &str, input: &'a str) -> PResult<'a, TermId> {
    let (rest, lhs) = add_expr(arena, full, input)?;
    if let Some(after) = symbol(rest, "//") {
        // Right-associative, matching the original system's `//` binding.
        let (after_rhs, rhs) = update_expr(arena, full, after)?;
        return Ok((after_rhs, binop(arena, "__update", lhs, rhs)));
    }
    Ok((rest, lhs))
}

left_assoc_binop!(add_expr, mul_expr, ["+" => "__add", "-" => "__sub"]);
left_assoc_binop!(mul_expr, concat_expr, ["*" => "__mul", "/" => "__div"]);
left_assoc_binop!(concat_expr, unary_expr, ["++" => "__concat"]);

fn unary_expr<'a>(arena: &Arena, full: &str, input: &'a str) -> PResult<'a, TermId> {
    let trimmed = skip_trivia(input);
    if let Some(rest) = symbol(trimmed, "-") {
        let (rest, inner) = unary_expr(arena, full, rest)?;
        let zero = arena.int(0);
        return Ok((rest, binop(arena, "__sub", zero, inner)));
    }
    if let Some(rest) = symbol(trimmed, "!") {
        let (rest, inner) = unary_expr(arena, full, rest)?;
        let t = arena.boolean(false);
        let f = arena.boolean(true);
        return Ok((rest, arena.if_(inner, t, f)));
    }
    app_expr(arena, full, trimmed)
}

fn app_expr<'a>(arena: &Arena, full: &str, input: &'a str) -> PResult<'a, TermId> {
    let (mut rest, mut head) = select_expr(arena, full, input)?;
    loop {
        match select_expr(arena, full, rest) {
            Ok((after, arg)) => {
                head = arena.call(head, arg);
                rest = after;
            }
            Err(_) => break,
        }
    }
    Ok((rest, head))
}

fn select_expr<'a>(arena: &Arena, full: &str, input: &'a str) -> PResult<'a, TermId> {
    let (mut rest, mut head) = atom(arena, full, input)?;
    loop {
        if let Some(after_dot) = symbol(rest, ".") {
            let (after_ident, name) = parse_ident(full, after_dot)?;
            head = arena.select(head, name);
            rest = after_ident;
            continue;
        }
        break;
    }
    Ok((rest, head))
}

fn atom<'a>(arena: &Arena, full: &str, input: &'a str) -> PResult<'a, TermId> {
    let trimmed = skip_trivia(input);

    if let Some(rest) = keyword(trimmed, "true") {
        return Ok((rest, arena.boolean(true)));
    }
    if let Some(rest) = keyword(trimmed, "false") {
        return Ok((rest, arena.boolean(false)));
    }
    if let Some(rest) = keyword(trimmed, "rec") {
        let rest = expect_symbol(full, rest, "{")?.0;
        let (rest, binds) = bindings(arena, full, rest)?;
        let rest = expect_symbol(full, rest, "}")?.0;
        return Ok((rest, arena.rec(binds)));
    }

    if let Ok((rest, uri)) = parse_uri(full, trimmed) {
        return Ok((rest, arena.uri(uri)));
    }
    if let Ok((rest, path)) = parse_path(full, trimmed) {
        return Ok((rest, arena.path(path)));
    }
    if let Ok((rest, s)) = parse_string(full, trimmed) {
        return Ok((rest, arena.str(s)));
    }
    if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        let (rest, num) = parse_number(full, trimmed)?;
        return Ok((
            rest,
            match num {
                TermData::Int(n) => arena.int(n),
                TermData::Float(f) => arena.float(f),
            },
        ));
    }

    if let Some(rest) = symbol(trimmed, "(") {
        let (rest, inner) = expr(arena, full, rest)?;
        let rest = expect_symbol(full, rest, ")")?.0;
        return Ok((rest, inner));
    }

    if let Some(rest) = symbol(trimmed, "[") {
        let mut rest = rest;
        let mut elems = Vec::new();
        loop {
            if let Some(after) = symbol(rest, "]") {
                rest = after;
                break;
            }
            let (after_elem, elem) = select_expr(arena, full, rest)?;
            elems.push(elem);
            rest = after_elem;
        }
        return Ok((rest, arena.list(elems)));
    }

    if let Some(rest) = symbol(trimmed, "{") {
        if let Some((after_formals, formals)) = try_formals(full, rest) {
            if let Some(after_colon) = symbol(after_formals, ":") {
                let (rest, body) = expr(arena, full, after_colon)?;
                return Ok((rest, arena.function(formals, body)));
            }
        }
        let (rest, binds) = bindings(arena, full, rest)?;
        let rest = expect_symbol(full, rest, "}")?.0;
        return Ok((rest, arena.attrs(binds)));
    }

    if let Ok((rest, name)) = parse_ident(full, trimmed) {
        return Ok((rest, arena.var(name)));
    }

    Err(make_error(full, trimmed, "expected an expression"))
}

/// Tries to parse `{ a, b, c }`-style formals (a comma-separated list of
/// bare identifiers up to the closing brace). Returns `None` without
/// consuming anything if the content doesn't look like a formals list
/// (e.g. it's an attribute-set literal with `name = value;` bindings).
fn try_formals<'a>(full: &str, input: &'a str) -> Option<(&'a str, Vec<Rc<str>>)> {
    let mut rest = input;
    let mut formals = Vec::new();
    loop {
        if let Some(after) = symbol(rest, "}") {
            return Some((after, formals));
        }
        let (after_ident, name) = parse_ident(full, rest).ok()?;
        formals.push(Rc::from(name));
        rest = after_ident;
        if let Some(after_comma) = symbol(rest, ",") {
            rest = after_comma;
            continue;
        }
        if let Some(after) = symbol(rest, "}") {
            return Some((after, formals));
        }
        return None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rix_arena::Term;
    use test_case::test_case;

    fn p(src: &str) -> (Arena, TermId) {
        let arena = Arena::new();
        let id = parse(&arena, src).unwrap_or_else(|e| panic!("parse error for {src:?}: {e}"));
        (arena, id)
    }

    #[test_case("1 - 2", "__sub" ; "subtraction")]
    #[test_case("1 * 2", "__mul" ; "multiplication")]
    #[test_case("1 / 2", "__div" ; "division")]
    #[test_case("[1] ++ [2]", "__concat" ; "list concat")]
    #[test_case("{} // {}", "__update" ; "attrset update")]
    #[test_case("1 < 2", "__lt" ; "less than")]
    fn desugars_infix_operator_to_named_primop_call(src: &str, expected_op: &str) {
        let (arena, id) = p(src);
        match arena.get(id) {
            Term::Call(partial, _) => match arena.get(partial) {
                Term::Call(op, _) => assert_eq!(arena.get(op), Term::Var(Rc::from(expected_op))),
                other => panic!("expected inner Call, got {other:?}"),
            },
            other => panic!("expected Call, got {other:?}"),
        }
    }

    #[test]
    fn parses_string_literal() {
        let (arena, id) = p(r#""hello""#);
        assert_eq!(arena.get(id), Term::Str(Rc::from("hello")));
    }

    #[test]
    fn parses_integer() {
        let (arena, id) = p("42");
        assert_eq!(arena.get(id), Term::Int(42));
    }

    #[test]
    fn parses_simple_lambda_and_application() {
        let (arena, id) = p("(x: x) 1");
        match arena.get(id) {
            Term::Call(f, a) => {
                assert!(matches!(arena.get(f), Term::Function(..)));
                assert_eq!(arena.get(a), Term::Int(1));
            }
            other => panic!("expected Call, got {other:?}"),
        }
    }

    #[test]
    fn desugars_addition_to_curried_primop_call() {
        let (arena, id) = p("1 + 2");
        match arena.get(id) {
            Term::Call(partial, two) => {
                assert_eq!(arena.get(two), Term::Int(2));
                match arena.get(partial) {
                    Term::Call(op, one) => {
                        assert_eq!(arena.get(op), Term::Var(Rc::from("__add")));
                        assert_eq!(arena.get(one), Term::Int(1));
                    }
                    other => panic!("expected inner Call, got {other:?}"),
                }
            }
            other => panic!("expected Call, got {other:?}"),
        }
    }

    #[test]
    fn parses_rec_attrs() {
        let (arena, id) = p("rec { a = 1; b = a; }");
        match arena.get(id) {
            Term::Rec(binds) => assert_eq!(binds.len(), 2),
            other => panic!("expected Rec, got {other:?}"),
        }
    }

    #[test]
    fn parses_let_in_as_letrec() {
        let (arena, id) = p("let a = 1; in a");
        match arena.get(id) {
            Term::LetRec(binds) => {
                let keys: Vec<&str> = binds.iter().map(|(k, _)| k.as_ref()).collect();
                assert!(keys.contains(&"body"));
                assert!(keys.contains(&"a"));
            }
            other => panic!("expected LetRec, got {other:?}"),
        }
    }

    #[test]
    fn parses_attrset_function_formals() {
        let (arena, id) = p("{ a, b }: a");
        match arena.get(id) {
            Term::Function(formals, _) => {
                assert_eq!(formals.as_ref(), &[Rc::from("a"), Rc::from("b")]);
            }
            other => panic!("expected Function, got {other:?}"),
        }
    }

    #[test]
    fn distinguishes_attrset_literal_from_formals() {
        let (arena, id) = p("{ a = 1; b = 2; }");
        match arena.get(id) {
            Term::Attrs(binds) => assert_eq!(binds.len(), 2),
            other => panic!("expected Attrs, got {other:?}"),
        }
    }

    #[test]
    fn parses_select_chain() {
        let (arena, id) = p("{ a = { b = 1; }; }.a.b");
        match arena.get(id) {
            Term::Select(inner, name) => {
                assert_eq!(name.as_ref(), "b");
                assert!(matches!(arena.get(inner), Term::Select(..)));
            }
            other => panic!("expected Select, got {other:?}"),
        }
    }

    #[test]
    fn parses_if_then_else() {
        let (arena, id) = p("if true then 1 else 2");
        assert!(matches!(arena.get(id), Term::If(..)));
    }

    #[test]
    fn parses_path_literal() {
        let (arena, id) = p("./foo.nix");
        assert_eq!(arena.get(id), Term::Path(Rc::from("./foo.nix")));
    }

    #[test]
    fn parses_list_literal() {
        let (arena, id) = p("[ 1 2 3 ]");
        match arena.get(id) {
            Term::List(elems) => assert_eq!(elems.len(), 3),
            other => panic!("expected List, got {other:?}"),
        }
    }

    #[test]
    fn parses_derivation_call() {
        let (arena, id) = p(r#"derivation { name = "x"; system = "y"; builder = "/b"; }"#);
        match arena.get(id) {
            Term::Call(f, _) => assert_eq!(arena.get(f), Term::Var(Rc::from("derivation"))),
            other => panic!("expected Call, got {other:?}"),
        }
    }

    #[test]
    fn reports_position_on_error() {
        let arena = Arena::new();
        let err = parse(&arena, "let a = ; in a").unwrap_err();
        assert_eq!(err.line, 1);
    }
}
