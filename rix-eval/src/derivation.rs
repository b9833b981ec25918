//! The `derivation` primop (`spec.md` §4.E row, driving §4.G). Ports
//! `fix-ng/primops.cc`'s `primDerivation`: walks the evaluated argument
//! attrs key by key, coerces each binding (`crate::coerce`), and hands
//! the assembled `DerivationInput` to `rix_derivation::assemble`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use rix_arena::{Term, TermId};
use rix_derivation::{assemble, DerivationInput};
use rix_store::StoreError;

use crate::coerce::coerce_for_binding;
use crate::errors::EvalError;
use crate::EvalState;

pub fn prim_derivation(state: &EvalState, arg: TermId) -> Result<TermId, EvalError> {
    let args_term = state.eval(arg)?;
    let arena = state.arena();
    let bindings = match arena.get(args_term) {
        Term::Attrs(bindings) => bindings,
        other => {
            return Err(EvalError::TypeError {
                expected: "attrs",
                found: other.tag(),
                term: args_term,
            })
        }
    };

    let mut name = String::new();
    let mut builder = String::new();
    let mut platform = String::new();
    let mut args: Vec<String> = Vec::new();
    let mut env: BTreeMap<String, String> = BTreeMap::new();
    let mut inputs: BTreeSet<rix_store::StorePath> = BTreeSet::new();
    let mut out_path_override = None;
    let mut id = None;

    for (key, value) in bindings.iter() {
        if key.as_ref() == "args" {
            let list_term = state.eval(*value)?;
            let elems = match arena.get(list_term) {
                Term::List(elems) => elems,
                other => {
                    return Err(EvalError::TypeError {
                        expected: "list",
                        found: other.tag(),
                        term: list_term,
                    })
                }
            };
            for elem in elems.iter() {
                let (s, ins) = coerce_for_binding(state, *elem)?;
                args.push(s);
                inputs.extend(ins);
            }
            continue;
        }

        let (s, ins) = coerce_for_binding(state, *value)?;
        inputs.extend(ins);
        match key.as_ref() {
            "builder" => builder = s.clone(),
            "system" => platform = s.clone(),
            "name" => name = s.clone(),
            "outPath" => out_path_override = Some(s.clone()),
            "id" => id = Some(s.clone()),
            _ => {}
        }
        env.insert(key.to_string(), s);
    }

    let mut input_hashes = HashMap::new();
    for path in &inputs {
        let hash = state
            .drv_hash(path)
            .ok_or_else(|| EvalError::Store(StoreError::UnknownDescriptor(path.to_string())))?;
        input_hashes.insert(path.clone(), hash);
    }

    let input = DerivationInput {
        name,
        builder,
        platform,
        args,
        env,
        inputs,
        out_path_override,
        id,
    };

    let assembled = assemble(state.store(), input, &input_hashes)?;
    state.record_hash(assembled.drv_path.clone(), assembled.storage_hash.clone());

    let drv_path_term = arena.path(assembled.drv_path.to_absolute_path(state.store().store_dir()));
    let out_path_term = arena.path(assembled.out_path.to_absolute_path(state.store().store_dir()));
    let type_term = arena.str("derivation");

    let mut result_bindings: Vec<(Rc<str>, TermId)> = bindings
        .iter()
        .filter(|(k, _)| !matches!(k.as_ref(), "drvPath" | "outPath" | "type"))
        .cloned()
        .collect();
    result_bindings.push((Rc::from("drvPath"), drv_path_term));
    result_bindings.push((Rc::from("outPath"), out_path_term));
    result_bindings.push((Rc::from("type"), type_term));

    Ok(arena.attrs(result_bindings))
}
