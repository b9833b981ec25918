//! Cycle-edge scanner over built output trees (`spec.md` §4.H).
//!
//! Ports `find-cycles.cc`'s two passes: [`scan_for_cycles`] walks a
//! built output looking for any of a set of store-path hashes inside
//! file contents and symlink targets (`scanForCycleEdges`/
//! `walkAndScanPath`), and [`join_edges`] greedily stitches the
//! resulting single-hop edges into full cycle paths
//! (`transformEdgesToMultiedges`). Traversal uses `walkdir` the way
//! `castore::import::fs` walks a tree to ingest it; substring search
//! over each file's bytes uses `aho-corasick` rather than hand-rolled
//! buffer-boundary bookkeeping, since every needle here is a
//! fixed-length nixbase32 hash and `aho-corasick` already solves
//! multi-pattern search over a byte stream.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fs;
use std::path::Path;

use aho_corasick::AhoCorasick;
use rix_store::{nixbase32, StorePath};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// One hop of a cycle: a file (or symlink) and the store-path hash its
/// contents reference. `find-cycles.cc`'s `StoreCycleEdge` is a
/// `std::deque<std::string>` precisely so both ends can grow cheaply
/// once [`join_edges`] starts stitching edges together; `VecDeque`
/// gives the same push-front/push-back cost here.
pub type CycleEdge = VecDeque<String>;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("I/O error scanning for cycle edges: {0}")]
    Io(#[from] std::io::Error),

    #[error("file '{path}' has an unsupported type")]
    UnsupportedFileType { path: String },
}

/// Walks `path`, searching every regular file's bytes and every
/// symlink's target for the nixbase32 hash component of any path in
/// `refs`. Returns one edge per (file, hash) pair found, in the order
/// encountered -- joining them into full cycles is [`join_edges`]'s job.
pub fn scan_for_cycles(path: &Path, refs: &BTreeSet<StorePath>) -> Result<Vec<CycleEdge>, CycleError> {
    if refs.is_empty() {
        return Ok(Vec::new());
    }

    let store_prefix = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => format!("{}/", parent.display()),
        _ => String::new(),
    };

    let hashes: Vec<String> = refs.iter().map(|p| nixbase32::encode(&p.digest)).collect();
    let mut sink = ScanSink::new(&hashes, store_prefix);

    for entry in WalkDir::new(path).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| CycleError::Io(e.into()))?;
        let display_path = entry.path().display().to_string();
        let file_type = entry.file_type();

        if file_type.is_dir() {
            continue;
        } else if file_type.is_file() {
            let bytes = fs::read(entry.path())?;
            sink.set_current_path(display_path);
            sink.feed(&bytes);
        } else if file_type.is_symlink() {
            let target = fs::read_link(entry.path())?;
            sink.set_current_path(display_path);
            sink.feed(target.to_string_lossy().as_bytes());
        } else {
            return Err(CycleError::UnsupportedFileType { path: display_path });
        }
    }

    Ok(sink.into_edges())
}

/// Accumulates edges while scanning, mirroring `CycleEdgeScanSink`:
/// `recorded_for_current_file` stops the same hash from producing a
/// second edge out of the same file once it's already been recorded.
struct ScanSink {
    ac: Option<AhoCorasick>,
    hashes: Vec<String>,
    store_prefix: String,
    current_path: String,
    recorded_for_current_file: BTreeSet<String>,
    edges: Vec<CycleEdge>,
}

impl ScanSink {
    fn new(hashes: &[String], store_prefix: String) -> Self {
        let ac = AhoCorasick::new(hashes).ok();
        ScanSink {
            ac,
            hashes: hashes.to_vec(),
            store_prefix,
            current_path: String::new(),
            recorded_for_current_file: BTreeSet::new(),
            edges: Vec::new(),
        }
    }

    fn set_current_path(&mut self, path: String) {
        self.current_path = path;
        self.recorded_for_current_file.clear();
    }

    fn feed(&mut self, data: &[u8]) {
        let Some(ac) = &self.ac else { return };
        for m in ac.find_iter(data) {
            let hash = &self.hashes[m.pattern().as_usize()];
            if self.recorded_for_current_file.insert(hash.clone()) {
                let target_path = format!("{}{}", self.store_prefix, hash);
                debug!(from = %self.current_path, to = %target_path, "found cycle edge");
                self.edges.push(VecDeque::from([self.current_path.clone(), target_path]));
            }
        }
    }

    fn into_edges(self) -> Vec<CycleEdge> {
        self.edges
    }
}

/// Stitches single-hop edges produced by [`scan_for_cycles`] into full
/// paths, greedily joining an edge onto any existing path it can
/// extend at either end. Ports `transformEdgesToMultiedges` exactly,
/// including its five cases (self-cycle, merge-two-paths, extend-at-
/// end, extend-at-start, start-a-new-path).
pub fn join_edges(edges: Vec<CycleEdge>) -> Vec<CycleEdge> {
    debug!(count = edges.len(), "joining cycle edges into multiedges");

    let mut multiedges: Vec<CycleEdge> = Vec::new();
    let mut starting_at: HashMap<String, usize> = HashMap::new();
    let mut ending_at: HashMap<String, usize> = HashMap::new();

    for edge in edges {
        if edge.is_empty() {
            continue;
        }
        let edge_start = edge.front().expect("checked non-empty above").clone();
        let edge_end = edge.back().expect("checked non-empty above").clone();

        let extends_at_end = ending_at.get(&edge_start).copied();
        let extends_at_start = starting_at.get(&edge_end).copied();

        match (extends_at_end, extends_at_start) {
            (Some(a), Some(b)) if a == b => {
                // The edge closes a loop on the path it's already part of.
                multiedges[a].extend(edge.into_iter().skip(1));
                ending_at.remove(&edge_start);
                ending_at.insert(edge_end, a);
            }
            (Some(a), Some(b)) => {
                // The edge bridges two distinct paths into one.
                let tail: Vec<String> = multiedges[b].iter().skip(1).cloned().collect();
                let tail_end = multiedges[b].back().expect("a path index never holds an empty edge").clone();
                let tail_start = multiedges[b].front().expect("a path index never holds an empty edge").clone();

                multiedges[a].extend(edge.into_iter().skip(1));
                multiedges[a].extend(tail);

                ending_at.remove(&edge_start);
                ending_at.insert(tail_end, a);
                starting_at.remove(&tail_start);
                multiedges[b].clear();
            }
            (Some(a), None) => {
                multiedges[a].extend(edge.into_iter().skip(1));
                ending_at.remove(&edge_start);
                ending_at.insert(edge_end, a);
            }
            (None, Some(b)) => {
                let mut prefix: Vec<String> = edge.into_iter().collect();
                prefix.pop();
                for v in prefix.into_iter().rev() {
                    multiedges[b].push_front(v);
                }
                starting_at.remove(&edge_end);
                starting_at.insert(edge_start, b);
            }
            (None, None) => {
                let idx = multiedges.len();
                multiedges.push(edge);
                starting_at.insert(edge_start, idx);
                ending_at.insert(edge_end, idx);
            }
        }
    }

    multiedges.retain(|p| !p.is_empty());
    debug!(count = multiedges.len(), "joined into multiedges");
    multiedges
}

/// Convenience wrapper: scan then join in one call, for callers (e.g.
/// `rix-cli`) that only want finished cycle paths.
pub fn find_cycles(path: &Path, refs: &BTreeSet<StorePath>) -> Result<Vec<CycleEdge>, CycleError> {
    Ok(join_edges(scan_for_cycles(path, refs)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rix_store::DIGEST_SIZE;

    fn path(digest_byte: u8, name: &str) -> StorePath {
        StorePath::new([digest_byte; DIGEST_SIZE], name).unwrap()
    }

    #[test]
    fn scan_finds_a_hash_embedded_in_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();

        let referenced = path(7, "dep");
        let hash = nixbase32::encode(&referenced.digest);
        fs::write(out.join("file1"), format!("references {hash} right here")).unwrap();

        let mut refs = BTreeSet::new();
        refs.insert(referenced);

        let edges = scan_for_cycles(&out, &refs).unwrap();
        assert_eq!(edges.len(), 1);
        assert!(edges[0].back().unwrap().ends_with(&hash));
    }

    #[test]
    fn scan_finds_a_hash_in_a_symlink_target() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();

        let referenced = path(8, "dep");
        let hash = nixbase32::encode(&referenced.digest);
        #[cfg(unix)]
        std::os::unix::fs::symlink(format!("/nix/store/{hash}-dep"), out.join("link")).unwrap();

        let mut refs = BTreeSet::new();
        refs.insert(referenced);

        #[cfg(unix)]
        {
            let edges = scan_for_cycles(&out, &refs).unwrap();
            assert_eq!(edges.len(), 1);
        }
    }

    #[test]
    fn scan_with_no_refs_short_circuits_to_no_edges() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("f"), b"anything").unwrap();
        let edges = scan_for_cycles(dir.path(), &BTreeSet::new()).unwrap();
        assert!(edges.is_empty());
    }

    #[test]
    fn join_edges_chains_a_simple_path() {
        let edges = vec![
            VecDeque::from(["a".to_string(), "b".to_string()]),
            VecDeque::from(["b".to_string(), "c".to_string()]),
        ];
        let joined = join_edges(edges);
        assert_eq!(joined, vec![VecDeque::from(["a".to_string(), "b".to_string(), "c".to_string()])]);
    }

    #[test]
    fn join_edges_detects_a_three_node_cycle() {
        // a -> b -> c -> a
        let edges = vec![
            VecDeque::from(["a".to_string(), "b".to_string()]),
            VecDeque::from(["b".to_string(), "c".to_string()]),
            VecDeque::from(["c".to_string(), "a".to_string()]),
        ];
        let joined = join_edges(edges);
        assert_eq!(joined.len(), 1);
        let cycle = &joined[0];
        assert_eq!(cycle.front(), cycle.back());
        assert_eq!(cycle.len(), 4);
    }

    #[test]
    fn join_edges_merges_two_paths_sharing_an_endpoint() {
        // a -> b, c -> d, b -> c  (built out of order, should merge into a -> b -> c -> d)
        let edges = vec![
            VecDeque::from(["a".to_string(), "b".to_string()]),
            VecDeque::from(["c".to_string(), "d".to_string()]),
            VecDeque::from(["b".to_string(), "c".to_string()]),
        ];
        let joined = join_edges(edges);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0], VecDeque::from(["a", "b", "c", "d"].map(String::from)));
    }

    #[test]
    fn join_edges_prepends_when_only_the_end_matches() {
        // b -> c first, then a -> b should prepend.
        let edges = vec![
            VecDeque::from(["b".to_string(), "c".to_string()]),
            VecDeque::from(["a".to_string(), "b".to_string()]),
        ];
        let joined = join_edges(edges);
        assert_eq!(joined, vec![VecDeque::from(["a", "b", "c"].map(String::from))]);
    }

    #[test]
    fn unrelated_edges_stay_separate() {
        let edges = vec![
            VecDeque::from(["a".to_string(), "b".to_string()]),
            VecDeque::from(["x".to_string(), "y".to_string()]),
        ];
        let joined = join_edges(edges);
        assert_eq!(joined.len(), 2);
    }

    #[test]
    fn end_to_end_finds_and_joins_a_two_file_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();

        let a = path(1, "a");
        let b = path(2, "b");
        let hash_a = nixbase32::encode(&a.digest);
        let hash_b = nixbase32::encode(&b.digest);

        fs::write(out.join(format!("{hash_a}-a")), hash_b.clone()).unwrap();
        fs::write(out.join(format!("{hash_b}-b")), hash_a.clone()).unwrap();

        let mut refs = BTreeSet::new();
        refs.insert(a);
        refs.insert(b);

        let multiedges = find_cycles(&out, &refs).unwrap();
        assert!(!multiedges.is_empty());
    }
}
