//! Canonical textual serialization of a derivation or closure descriptor
//! (`spec.md` §4.G "Canonical serialization"). Grounded on
//! `derivation/src/write.rs`'s `ATermWriteable` derivation writer, but
//! working over pre-sorted `String` identifiers rather than typed lists:
//! callers choose whether those identifiers are real store paths (the
//! on-disk form) or cached hashes (the normalized form used to compute
//! a derivation's content hash), letting both forms share one writer.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::string_escape::escape_string;

const DERIVE_PREFIX: &str = "Derive";
const CLOSURE_PREFIX: &str = "Closure";

/// Renders a `Derive(outputs, inputs, platform, builder, args, env)`
/// term. `outputs` and `inputs` must already be sorted by the caller;
/// sortedness isn't enforced here since the normalized form sorts
/// cached hashes while the real form sorts store path strings, and
/// re-deriving an ordering from opaque strings isn't this module's job.
pub fn serialize_derivation(
    outputs: &[String],
    inputs: &[String],
    platform: &str,
    builder: &str,
    args: &[String],
    env: &BTreeMap<String, String>,
) -> String {
    let mut out = String::new();
    write!(out, "{DERIVE_PREFIX}(").unwrap();
    write_string_list(&mut out, outputs);
    out.push(',');
    write_string_list(&mut out, inputs);
    out.push(',');
    out.push_str(&escape_string(platform));
    out.push(',');
    out.push_str(&escape_string(builder));
    out.push(',');
    write_string_list(&mut out, args);
    out.push(',');
    write_env(&mut out, env);
    out.push(')');
    out
}

/// Renders a `Closure(outputs)` term: the descriptor written for a bare
/// path copied into the store, with no builder, env, or inputs of its
/// own (`spec.md` §4.G, the binding-coercion "copy into store" case).
pub fn serialize_closure(outputs: &[String]) -> String {
    let mut out = String::new();
    write!(out, "{CLOSURE_PREFIX}(").unwrap();
    write_string_list(&mut out, outputs);
    out.push(')');
    out
}

fn write_string_list(out: &mut String, items: &[String]) {
    out.push('[');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape_string(item));
    }
    out.push(']');
}

fn write_env(out: &mut String, env: &BTreeMap<String, String>) {
    out.push('[');
    for (i, (k, v)) in env.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('(');
        out.push_str(&escape_string(k));
        out.push(',');
        out.push_str(&escape_string(v));
        out.push(')');
    }
    out.push(']');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_derivation_has_stable_shape() {
        let env = BTreeMap::new();
        let s = serialize_derivation(&[], &[], "x86_64-linux", "/bin/sh", &[], &env);
        assert_eq!(s, r#"Derive([],[],"x86_64-linux","/bin/sh",[],[])"#);
    }

    #[test]
    fn env_is_rendered_in_key_order_regardless_of_insertion_order() {
        let mut env = BTreeMap::new();
        env.insert("zzz".to_string(), "1".to_string());
        env.insert("aaa".to_string(), "2".to_string());
        let s = serialize_derivation(&[], &[], "x", "/b", &[], &env);
        assert!(s.contains(r#"[("aaa","2"),("zzz","1")]"#));
    }

    #[test]
    fn differing_env_values_produce_differing_output() {
        let mut env_a = BTreeMap::new();
        env_a.insert("k".to_string(), "1".to_string());
        let mut env_b = BTreeMap::new();
        env_b.insert("k".to_string(), "2".to_string());
        assert_ne!(
            serialize_derivation(&[], &[], "x", "/b", &[], &env_a),
            serialize_derivation(&[], &[], "x", "/b", &[], &env_b)
        );
    }

    #[test]
    fn closure_has_no_builder_or_env_fields() {
        assert_eq!(
            serialize_closure(&["/store/abc-foo".to_string()]),
            r#"Closure(["/store/abc-foo"])"#
        );
    }
}
