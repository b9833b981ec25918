//! Typed configuration (`spec.md` §6). A caller that wants to source
//! these values from TOML/JSON/env is free to do so via `serde`; parsing
//! the file itself is the out-of-scope external collaborator `rix-cli`
//! hands this struct its fields from.

use serde::Deserialize;

/// Recognized configuration keys from `spec.md` §6.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory for all content-addressed artifacts.
    pub store_dir: String,
    /// Ordered directories searched by `import` when given a relative path.
    pub search_dirs: Vec<String>,
    /// Surfaced as the `__curPlatform` primop and defaulted into a
    /// derivation's `system` field by callers that don't set one.
    pub this_system: String,
    /// Advisory parallelism limit for external builders; not consumed
    /// by the core itself.
    pub max_jobs: u32,
    /// When true, store writes fail fast with `StoreError::ReadOnly`.
    pub read_only_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            store_dir: "/nix/store".to_string(),
            search_dirs: Vec::new(),
            this_system: default_system().to_string(),
            max_jobs: 1,
            read_only_mode: false,
        }
    }
}

#[cfg(target_arch = "x86_64")]
#[cfg(target_os = "linux")]
fn default_system() -> &'static str {
    "x86_64-linux"
}

#[cfg(target_arch = "aarch64")]
#[cfg(target_os = "linux")]
fn default_system() -> &'static str {
    "aarch64-linux"
}

#[cfg(not(any(all(target_arch = "x86_64", target_os = "linux"), all(target_arch = "aarch64", target_os = "linux"))))]
fn default_system() -> &'static str {
    "x86_64-linux"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_fix_ng_conventions() {
        let config = Config::default();
        assert_eq!(config.store_dir, "/nix/store");
        assert!(config.search_dirs.is_empty());
        assert!(!config.read_only_mode);
    }
}
