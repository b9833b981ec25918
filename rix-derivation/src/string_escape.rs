//! String escaping for the canonical descriptor serialization. Mirrors
//! `derivation/src/string_escape.rs`'s fixed substitution table.

const ESCAPES: [(char, &str); 5] = [
    ('\\', "\\\\"),
    ('\n', "\\n"),
    ('\r', "\\r"),
    ('\t', "\\t"),
    ('"', "\\\""),
];

/// Escapes `s` and wraps it in double quotes, as every string field of
/// the canonical serialization requires (`spec.md` §4.G "escaped string
/// values").
pub fn escape_string(s: &str) -> String {
    let mut out = s.to_string();
    for (from, to) in ESCAPES {
        out = out.replace(from, to);
    }
    format!("\"{out}\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(r#"a"b\c"#, r#""a\"b\\c""# ; "quotes and backslashes")]
    #[test_case("a\nb\tc", "\"a\\nb\\tc\"" ; "control characters")]
    #[test_case("", "\"\"" ; "empty string")]
    #[test_case("plain", "\"plain\"" ; "no escaping needed")]
    fn escapes_as_expected(input: &str, expected: &str) {
        assert_eq!(escape_string(input), expected);
    }
}
