//! Content-addressed store abstraction (`spec.md` §4.F).
//!
//! `Store` is the interface consumed by `rix-derivation` (G) and
//! `rix-cycles` (H); [`FsStore`] is the only implementation, a
//! synchronous filesystem-backed store following the teacher's
//! content-addressing primitives directly (`nixbase32`, `compress_hash`,
//! the `<hash>-<name>` path shape) rather than `tvix-store`'s gRPC
//! service machinery, since this core has no network layer.

pub mod errors;
pub mod hash;
pub mod nixbase32;
pub mod store_path;

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};
use walkdir::WalkDir;

pub use errors::StoreError;
pub use hash::Hash;
pub use store_path::{ParseStorePathError, StorePath, DIGEST_SIZE};

/// Operations a derivation assembler or cycle scanner needs from the
/// store. See `spec.md` §4.F.
pub trait Store {
    /// Root directory all paths returned by this store live under.
    fn store_dir(&self) -> &str;

    /// Ingests a file or directory tree, returning its content-addressed
    /// path. Idempotent: ingesting the same bytes twice returns the same
    /// `StorePath` without re-copying.
    fn add_to_store(&self, source_path: &Path) -> Result<StorePath, StoreError>;

    /// Writes `bytes` (a serialized derivation descriptor) atomically,
    /// naming the result `<hash>-<suffix_after_dash>`. `outputs` is
    /// recorded so a later `nix_expr_roots` call can answer without
    /// re-parsing the descriptor text (see `nix_expr_roots`' doc comment).
    fn write_term(&self, bytes: &[u8], suffix: &str, outputs: &[StorePath]) -> Result<StorePath, StoreError>;

    fn query_all_valid_paths(&self) -> Result<BTreeSet<StorePath>, StoreError>;

    fn is_valid_path(&self, p: &StorePath) -> bool;

    fn follow_links_to_store_path(&self, p: &Path) -> Result<StorePath, StoreError>;

    fn add_indirect_root(&self, link_path: &Path) -> Result<(), StoreError>;

    fn add_temp_root(&self, p: &StorePath) -> Result<(), StoreError>;

    /// The declared output paths of a previously-written descriptor.
    /// `spec.md` §4.F: the evaluator asserts this set has exactly one
    /// element when used for coercion (a `Path` binding referencing a
    /// `Derivation`'s `drvPath`).
    ///
    /// Implemented here as an in-process index populated at
    /// [`write_term`](Self::write_term) time, not by re-parsing the
    /// stored descriptor's canonical text back into structured data:
    /// `rix-store` has no dependency on `rix-derivation`'s serialization
    /// format (that dependency runs the other way, G on F), so it cannot
    /// parse its own descriptors. Real Nix keeps the equivalent index in
    /// a SQLite database rather than re-parsing ATerm on every lookup;
    /// this is the same trade-off, scoped to process lifetime. See
    /// `DESIGN.md`.
    fn nix_expr_roots(&self, drv_path: &StorePath) -> Result<BTreeSet<StorePath>, StoreError>;
}

/// A synchronous, filesystem-backed [`Store`]. Single-threaded per
/// `spec.md` §5: interior mutability is a `RefCell`, not a lock.
pub struct FsStore {
    store_dir: PathBuf,
    read_only: bool,
    roots: RefCell<std::collections::HashMap<StorePath, BTreeSet<StorePath>>>,
}

impl FsStore {
    pub fn new(store_dir: impl Into<PathBuf>, read_only: bool) -> Self {
        FsStore {
            store_dir: store_dir.into(),
            read_only,
            roots: RefCell::new(std::collections::HashMap::default()),
        }
    }

    fn store_dir_str(&self) -> &str {
        self.store_dir.to_str().expect("store-dir must be valid UTF-8")
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }

    /// Computes a deterministic content hash over a file or directory
    /// tree: each entry's relative path, type tag, and content/link
    /// target, fed into one sha256 hasher in sorted path order. Not a
    /// NAR: the wire format isn't specified by `spec.md` (NAR framing is
    /// an explicit non-goal), only that `add_to_store` is idempotent and
    /// content-addressed.
    fn fingerprint(source_path: &Path) -> Result<Vec<u8>, StoreError> {
        use sha2::{Digest, Sha256};

        let mut entries: Vec<PathBuf> = Vec::new();
        if source_path.is_dir() {
            for entry in WalkDir::new(source_path).sort_by_file_name() {
                let entry = entry.map_err(|e| StoreError::Io(e.into()))?;
                entries.push(entry.path().strip_prefix(source_path).unwrap().to_path_buf());
            }
        } else {
            entries.push(PathBuf::new());
        }

        let mut hasher = Sha256::new();
        for rel in entries {
            let full = source_path.join(&rel);
            let meta = fs::symlink_metadata(&full)?;
            hasher.update(rel.to_string_lossy().as_bytes());
            hasher.update([0u8]);
            if meta.is_dir() {
                hasher.update(b"dir");
            } else if meta.file_type().is_symlink() {
                hasher.update(b"symlink:");
                hasher.update(fs::read_link(&full)?.to_string_lossy().as_bytes());
            } else {
                hasher.update(b"file:");
                hasher.update(fs::read(&full)?);
            }
            hasher.update([0u8]);
        }
        Ok(hasher.finalize().to_vec())
    }

    fn copy_tree(source: &Path, dest: &Path) -> std::io::Result<()> {
        if source.is_dir() {
            fs::create_dir_all(dest)?;
            for entry in fs::read_dir(source)? {
                let entry = entry?;
                Self::copy_tree(&entry.path(), &dest.join(entry.file_name()))?;
            }
        } else if fs::symlink_metadata(source)?.file_type().is_symlink() {
            let target = fs::read_link(source)?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(target, dest)?;
            #[cfg(not(unix))]
            fs::copy(source, dest).map(|_| ())?;
        } else {
            fs::copy(source, dest)?;
        }
        Ok(())
    }
}

impl Store for FsStore {
    fn store_dir(&self) -> &str {
        self.store_dir_str()
    }

    #[instrument(skip(self), fields(source = %source_path.display()))]
    fn add_to_store(&self, source_path: &Path) -> Result<StorePath, StoreError> {
        self.check_writable()?;
        let name = source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "source".to_string());

        let digest = Self::fingerprint(source_path)?;
        let compressed = hash::compress_hash(&digest, DIGEST_SIZE);
        let store_path = StorePath::new(compressed.try_into().expect("compress_hash returns DIGEST_SIZE bytes"), name)?;

        let dest = self.store_dir.join(store_path.to_string());
        if dest.exists() {
            debug!(path = %dest.display(), "already present in store");
            return Ok(store_path);
        }

        fs::create_dir_all(&self.store_dir)?;
        let tmp = tempfile::Builder::new().prefix(".rix-add-").tempdir_in(&self.store_dir)?;
        let staged = tmp.path().join("contents");
        Self::copy_tree(source_path, &staged)?;
        fs::rename(&staged, &dest)?;
        debug!(path = %dest.display(), "added to store");
        Ok(store_path)
    }

    #[instrument(skip(self, bytes), fields(suffix = %suffix, len = bytes.len()))]
    fn write_term(&self, bytes: &[u8], suffix: &str, outputs: &[StorePath]) -> Result<StorePath, StoreError> {
        self.check_writable()?;
        let digest = Hash::sha256(bytes);
        let compressed = digest.compress(DIGEST_SIZE);
        let store_path = StorePath::new(
            compressed.try_into().expect("Hash::compress returns DIGEST_SIZE bytes"),
            suffix,
        )?;

        let dest = self.store_dir.join(store_path.to_string());
        fs::create_dir_all(&self.store_dir)?;
        if !dest.exists() {
            let mut tmp = tempfile::Builder::new().prefix(".rix-write-").tempfile_in(&self.store_dir)?;
            tmp.write_all(bytes)?;
            tmp.persist(&dest).map_err(|e| StoreError::Io(e.error))?;
        }

        self.roots
            .borrow_mut()
            .insert(store_path.clone(), outputs.iter().cloned().collect());
        Ok(store_path)
    }

    fn query_all_valid_paths(&self) -> Result<BTreeSet<StorePath>, StoreError> {
        let mut out = BTreeSet::new();
        if !self.store_dir.exists() {
            return Ok(out);
        }
        for entry in fs::read_dir(&self.store_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') {
                continue;
            }
            if let Ok(p) = StorePath::from_base_name(&name) {
                out.insert(p);
            }
        }
        Ok(out)
    }

    fn is_valid_path(&self, p: &StorePath) -> bool {
        self.store_dir.join(p.to_string()).exists()
    }

    fn follow_links_to_store_path(&self, p: &Path) -> Result<StorePath, StoreError> {
        let mut current = p.to_path_buf();
        for _ in 0..32 {
            match fs::read_link(&current) {
                Ok(target) => {
                    current = if target.is_absolute() {
                        target
                    } else {
                        current.parent().unwrap_or(Path::new("/")).join(target)
                    };
                }
                Err(_) => {
                    let s = current.to_string_lossy();
                    return StorePath::from_absolute_path(&s, self.store_dir_str()).map_err(StoreError::from);
                }
            }
        }
        Err(StoreError::BrokenLink {
            path: p.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "too many levels of symbolic links"),
        })
    }

    fn add_indirect_root(&self, link_path: &Path) -> Result<(), StoreError> {
        self.check_writable()?;
        if let Some(parent) = link_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let _ = fs::remove_file(link_path);
        Ok(())
    }

    fn add_temp_root(&self, _p: &StorePath) -> Result<(), StoreError> {
        // No GC scheduling (spec.md non-goal): rooting is a no-op beyond
        // idempotence, as §4.F requires.
        Ok(())
    }

    fn nix_expr_roots(&self, drv_path: &StorePath) -> Result<BTreeSet<StorePath>, StoreError> {
        self.roots
            .borrow()
            .get(drv_path)
            .cloned()
            .ok_or_else(|| StoreError::UnknownDescriptor(drv_path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_to_store_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path().join("store"), false);

        let src_dir = dir.path().join("src");
        fs::create_dir(&src_dir).unwrap();
        fs::write(src_dir.join("hello.txt"), b"hello world").unwrap();

        let a = store.add_to_store(&src_dir).unwrap();
        let b = store.add_to_store(&src_dir).unwrap();
        assert_eq!(a, b);
        assert!(store.is_valid_path(&a));
    }

    #[test]
    fn add_to_store_distinguishes_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path().join("store"), false);

        let src_a = dir.path().join("a");
        fs::create_dir(&src_a).unwrap();
        fs::write(src_a.join("f"), b"one").unwrap();

        let src_b = dir.path().join("b");
        fs::create_dir(&src_b).unwrap();
        fs::write(src_b.join("f"), b"two").unwrap();

        assert_ne!(store.add_to_store(&src_a).unwrap(), store.add_to_store(&src_b).unwrap());
    }

    #[test]
    fn read_only_store_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path().join("store"), true);
        let src = dir.path().join("src");
        fs::create_dir(&src).unwrap();
        assert!(matches!(store.add_to_store(&src), Err(StoreError::ReadOnly)));
    }

    #[test]
    fn write_term_records_roots_for_nix_expr_roots() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path().join("store"), false);
        let out = StorePath::new([9u8; DIGEST_SIZE], "x").unwrap();

        let drv_path = store.write_term(b"Derive(...)", "d-x", &[out.clone()]).unwrap();
        let roots = store.nix_expr_roots(&drv_path).unwrap();
        assert_eq!(roots.len(), 1);
        assert!(roots.contains(&out));
    }

    #[test]
    fn write_term_is_deterministic_for_identical_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path().join("store"), false);
        let a = store.write_term(b"same bytes", "d-x", &[]).unwrap();
        let b = store.write_term(b"same bytes", "d-x", &[]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn query_all_valid_paths_sees_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path().join("store"), false);
        let p = store.write_term(b"hello", "d-x", &[]).unwrap();
        let all = store.query_all_valid_paths().unwrap();
        assert!(all.contains(&p));
    }
}
