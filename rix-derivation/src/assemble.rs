//! Steps 2-8 of `spec.md` §4.G: given already-coerced bindings, validate,
//! hash, and write a derivation descriptor. Step 1 (binding coercion --
//! recognizing nested derivations and copying `Path` literals into the
//! store) lives in `rix-eval` instead, which depends on this crate rather
//! than the other way around: `rix-eval`'s `derivation` primop needs the
//! evaluator to resolve nested attrs and paths before it can call here,
//! and this crate must not depend back on the evaluator. This mirrors
//! the real split between `tvix-glue`'s coercion logic and
//! `tvix-derivation`'s pure assembly; see `DESIGN.md`.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rix_store::{Hash, Store, StorePath};

use crate::descriptor::{serialize_closure, serialize_derivation};
use crate::errors::DerivationError;

/// Already-coerced derivation bindings, ready for assembly.
#[derive(Debug, Clone)]
pub struct DerivationInput {
    pub name: String,
    pub builder: String,
    pub platform: String,
    pub args: Vec<String>,
    /// Every plain string/path/bool/int binding other than the fields
    /// above, already stringified by the caller's binding coercion.
    pub env: BTreeMap<String, String>,
    /// Store paths (of derivations or copied atoms) this derivation
    /// depends on.
    pub inputs: BTreeSet<StorePath>,
    /// `outPath`, if the caller supplied one explicitly.
    pub out_path_override: Option<String>,
    /// `id`, if the caller supplied one: marks a fixed-output derivation.
    pub id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AssembledDerivation {
    pub drv_path: StorePath,
    pub out_path: StorePath,
    /// Cached for later derivations that depend on this one: fed into
    /// their normalized content hash in place of re-reading this
    /// descriptor from disk (`spec.md` §4.G step 3).
    pub storage_hash: Hash,
}

#[derive(Debug, Clone)]
pub struct AssembledClosure {
    pub drv_path: StorePath,
    pub storage_hash: Hash,
}

/// Assembles and writes a `Derive(...)` descriptor. `input_hashes` maps
/// each of `input.inputs` to the `storage_hash` it was assembled with;
/// every entry of `input.inputs` must have one, or assembly fails with
/// `DerivationError::Store(UnknownDescriptor)`.
pub fn assemble(
    store: &dyn Store,
    mut input: DerivationInput,
    input_hashes: &HashMap<StorePath, Hash>,
) -> Result<AssembledDerivation, DerivationError> {
    if input.name.is_empty() {
        return Err(DerivationError::InvalidDerivation("name"));
    }
    if input.builder.is_empty() {
        return Err(DerivationError::InvalidDerivation("builder"));
    }
    if input.platform.is_empty() {
        return Err(DerivationError::InvalidDerivation("system"));
    }

    let fixed_output_hash = input
        .id
        .as_deref()
        .map(Hash::parse)
        .transpose()
        .map_err(|_| DerivationError::BadHash(input.id.clone().unwrap_or_default()))?;

    let mut input_id_strings = Vec::with_capacity(input.inputs.len());
    for path in &input.inputs {
        let hash = input_hashes
            .get(path)
            .ok_or_else(|| DerivationError::Store(rix_store::StoreError::UnknownDescriptor(path.to_string())))?;
        input_id_strings.push(hash.to_nixbase32());
    }
    input_id_strings.sort();

    // Step 3: determine the output hash. For an ordinary derivation this
    // is the normalized content hash -- the descriptor hashed with real
    // inputs replaced by their cached storage hashes, and with no
    // `outputs` yet (the output path is what we're about to derive from
    // this very hash, so it can't appear inside it).
    let output_hash = match &fixed_output_hash {
        Some(h) => h.clone(),
        None => {
            let normalized = serialize_derivation(
                &[],
                &input_id_strings,
                &input.platform,
                &input.builder,
                &input.args,
                &input.env,
            );
            Hash::sha256(normalized.as_bytes())
        }
    };

    let out_path = match input.out_path_override.take() {
        Some(p) => p,
        None => {
            let digest = output_hash.compress(rix_store::DIGEST_SIZE);
            format!("{}/{}-{}", store.store_dir(), rix_store::nixbase32::encode(&digest), input.name)
        }
    };
    let out_store_path = StorePath::from_absolute_path(&out_path, store.store_dir())?;

    input.env.insert("out".to_string(), out_path.clone());

    // Step 6: the storage hash differs from the output hash only for
    // fixed-output derivations, where it binds the user-declared content
    // hash to the specific output path it ended up at.
    let storage_hash = if fixed_output_hash.is_some() {
        Hash::sha256(format!("{}{}", output_hash.to_nixbase32(), out_path).as_bytes())
    } else {
        output_hash
    };

    let mut real_inputs: Vec<String> = input.inputs.iter().map(|p| p.to_absolute_path(store.store_dir())).collect();
    real_inputs.sort();

    let serialized = serialize_derivation(
        &[out_path.clone()],
        &real_inputs,
        &input.platform,
        &input.builder,
        &input.args,
        &input.env,
    );

    let drv_path = store.write_term(serialized.as_bytes(), &format!("d-{}", input.name), &[out_store_path.clone()])?;

    Ok(AssembledDerivation { drv_path, out_path: out_store_path, storage_hash })
}

/// Wraps a content-addressed store path (the result of copying a bare
/// `Path` literal) in a `Closure(...)` descriptor, so it can stand
/// alongside derivations in an `inputs` set and be looked up via
/// `nix_expr_roots`. Mirrors `fix-ng/primops.cc`'s `copyAtom`: unlike a
/// derivation, a closure's storage hash is simply the hash of its own
/// unparsed text, since it has no inputs to normalize away.
pub fn assemble_closure(store: &dyn Store, root: &StorePath) -> Result<AssembledClosure, DerivationError> {
    let root_str = root.to_absolute_path(store.store_dir());
    let serialized = serialize_closure(&[root_str]);
    let storage_hash = Hash::sha256(serialized.as_bytes());
    let drv_path = store.write_term(serialized.as_bytes(), &format!("c-{}", root.name), std::slice::from_ref(root))?;
    Ok(AssembledClosure { drv_path, storage_hash })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rix_store::FsStore;

    fn store(dir: &std::path::Path) -> FsStore {
        FsStore::new(dir.join("store"), false)
    }

    fn minimal_input() -> DerivationInput {
        DerivationInput {
            name: "x".to_string(),
            builder: "/b".to_string(),
            platform: "X".to_string(),
            args: Vec::new(),
            env: BTreeMap::new(),
            inputs: BTreeSet::new(),
            out_path_override: None,
            id: None,
        }
    }

    #[test]
    fn minimal_derivation_assembles_with_out_in_env_and_a_single_output() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let assembled = assemble(&store, minimal_input(), &HashMap::new()).unwrap();
        assert!(store.is_valid_path(&assembled.drv_path));
        assert!(store.is_valid_path(&assembled.out_path));
        let roots = store.nix_expr_roots(&assembled.drv_path).unwrap();
        assert_eq!(roots.len(), 1);
        assert!(roots.contains(&assembled.out_path));
    }

    #[test]
    fn rejects_empty_builder() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let mut input = minimal_input();
        input.builder = String::new();
        assert!(matches!(assemble(&store, input, &HashMap::new()), Err(DerivationError::InvalidDerivation("builder"))));
    }

    #[test]
    fn two_field_equal_derivations_hash_to_the_same_drv_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let a = assemble(&store, minimal_input(), &HashMap::new()).unwrap();
        let b = assemble(&store, minimal_input(), &HashMap::new()).unwrap();
        assert_eq!(a.drv_path, b.drv_path);
        assert_eq!(a.out_path, b.out_path);
        assert_eq!(a.storage_hash, b.storage_hash);
    }

    #[test]
    fn differing_env_produces_a_differing_output_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let a = assemble(&store, minimal_input(), &HashMap::new()).unwrap();
        let mut input = minimal_input();
        input.env.insert("extra".to_string(), "yes".to_string());
        let b = assemble(&store, input, &HashMap::new()).unwrap();
        assert_ne!(a.out_path, b.out_path);
    }

    #[test]
    fn fixed_output_derivation_storage_hash_binds_hash_and_out_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let declared = Hash::sha256(b"expected content");
        let mut input = minimal_input();
        input.id = Some(declared.to_nixbase32());
        let assembled = assemble(&store, input, &HashMap::new()).unwrap();
        let expected = Hash::sha256(format!("{}{}", declared.to_nixbase32(), assembled.out_path.to_absolute_path(store.store_dir())).as_bytes());
        assert_eq!(assembled.storage_hash, expected);
    }

    #[test]
    fn rejects_unparseable_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let mut input = minimal_input();
        input.id = Some("not a hash!".to_string());
        assert!(matches!(assemble(&store, input, &HashMap::new()), Err(DerivationError::BadHash(_))));
    }

    #[test]
    fn missing_input_hash_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let mut input = minimal_input();
        input.inputs.insert(StorePath::new([3u8; rix_store::DIGEST_SIZE], "dep").unwrap());
        assert!(matches!(assemble(&store, input, &HashMap::new()), Err(DerivationError::Store(_))));
    }

    #[test]
    fn dependency_hash_changes_propagate_to_the_output_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let dep = StorePath::new([3u8; rix_store::DIGEST_SIZE], "dep").unwrap();

        let mut input = minimal_input();
        input.inputs.insert(dep.clone());

        let mut hashes_a = HashMap::new();
        hashes_a.insert(dep.clone(), Hash::sha256(b"dep-v1"));
        let a = assemble(&store, input.clone(), &hashes_a).unwrap();

        let mut hashes_b = HashMap::new();
        hashes_b.insert(dep, Hash::sha256(b"dep-v2"));
        let b = assemble(&store, input, &hashes_b).unwrap();

        assert_ne!(a.out_path, b.out_path);
    }

    #[test]
    fn assemble_closure_wraps_a_copied_atom() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let root = StorePath::new([1u8; rix_store::DIGEST_SIZE], "src").unwrap();
        let closure = assemble_closure(&store, &root).unwrap();
        assert!(store.is_valid_path(&closure.drv_path));
        let roots = store.nix_expr_roots(&closure.drv_path).unwrap();
        assert!(roots.contains(&root));
    }
}
