//! File Discovery & Change Detector.
//!
//! Single-pass, deterministic directory walk that applies the Ignore
//! Matcher, computes per-file content digests, and diffs the result
//! against the prior [`IndexSnapshot`] set to produce an incremental
//! change set. Content hashing (rather than mtime/size alone) is used
//! since symbol ids here are cross-language and must survive trivial
//! reformatting independent of the adapter.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use md5::{Digest, Md5};

use crate::ignore::IgnoreMatcher;
use crate::model::IndexSnapshot;

/// Default cap protecting memory against pathologically large files;
/// overridable via `config.index.max_file_size_bytes`.
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;

/// First-N-bytes heuristic used to decide whether a file is binary.
const BINARY_SNIFF_LEN: usize = 8000;

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub max_file_size_bytes: u64,
    /// When non-empty, only paths matching at least one pattern are
    /// discovered (`.wicked-search/config.toml`'s `index.include_globs`).
    pub include_globs: Vec<String>,
    /// Applied on top of the Ignore Matcher; a match here excludes a path
    /// even if no ignore file mentions it (`index.exclude_globs`).
    pub exclude_globs: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            include_globs: Vec::new(),
            exclude_globs: Vec::new(),
        }
    }
}

/// Compiles a list of glob patterns into one `GlobSet`, built once.
/// Returns `None` for an empty pattern list so callers can skip matching
/// entirely rather than testing against a trivially-empty set.
pub fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(Some(builder.build()?))
}

/// A file surfaced by the walk, with its content already read into memory
/// (the Parsing Pool consumes `content` directly; binary files carry an
/// empty `content` and `is_binary=true` so the orchestrator can route them
/// to the Document Extractor instead of a language adapter).
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub content: String,
    pub content_hash: String,
    pub mtime: i64,
    pub size: u64,
    pub is_binary: bool,
}

/// Added/modified/removed/unchanged paths relative to the prior snapshot
/// set for a project.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub added: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

/// MD5 digest of `bytes`, truncated to 12 lowercase hex chars. The
/// canonical content-hash and workspace-hash algorithm; changing it is a
/// breaking change that forces a full re-index.
pub fn content_hash12(bytes: &[u8]) -> String {
    let digest = Md5::digest(bytes);
    let full = format!("{digest:x}");
    full[..12].to_string()
}

/// Workspace hash: MD5 of the newline-joined, sorted list of
/// `(relative_path \t content_hash)` lines, truncated to 12 hex chars.
pub fn workspace_hash<'a>(entries: impl IntoIterator<Item = (&'a Path, &'a str)>) -> String {
    let mut lines: Vec<String> = entries
        .into_iter()
        .map(|(path, hash)| format!("{}\t{}", path.to_string_lossy(), hash))
        .collect();
    lines.sort();
    content_hash12(lines.join("\n").as_bytes())
}

/// Heuristic binary detection: a NUL byte within the first
/// [`BINARY_SNIFF_LEN`] bytes marks the file as binary.
pub fn looks_binary(bytes: &[u8]) -> bool {
    let probe = &bytes[..bytes.len().min(BINARY_SNIFF_LEN)];
    probe.contains(&0u8)
}

/// Walk `root`, applying `matcher`'s ignore rules, and return every
/// candidate file in deterministic (sorted, depth-first) order. Unreadable
/// files are skipped; files past `config.max_file_size_bytes` are skipped
/// to protect memory.
pub fn walk(root: &Path, matcher: &mut IgnoreMatcher, config: &DiscoveryConfig) -> Result<Vec<DiscoveredFile>> {
    let mut builder = WalkBuilder::new(root);
    builder.standard_filters(false).sort_by_file_name(|a, b| a.cmp(b));
    let walker = builder.build();

    let include = build_globset(&config.include_globs)?;
    let exclude = build_globset(&config.exclude_globs)?;

    let mut files = Vec::new();

    for entry_result in walker {
        let entry = match entry_result {
            Ok(e) => e,
            Err(_) => continue,
        };
        let path = entry.path();
        let is_dir = entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false);

        if is_dir {
            if path != root {
                matcher.load_dir_rules(path);
            }
            if matcher.is_ignored(path, true) {
                continue;
            }
            continue;
        }

        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }

        if matcher.is_ignored(path, false) {
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(path);
        if let Some(include) = &include {
            if !include.is_match(relative) {
                continue;
            }
        }
        if let Some(exclude) = &exclude {
            if exclude.is_match(relative) {
                continue;
            }
        }

        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file");
                continue;
            }
        };

        let size = metadata.len();
        if size > config.max_file_size_bytes {
            tracing::warn!(path = %path.display(), size, "skipping file exceeding max size");
            continue;
        }

        let raw = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file");
                continue;
            }
        };

        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let is_binary = looks_binary(&raw);
        let content_hash = content_hash12(&raw);
        let content = if is_binary {
            String::new()
        } else {
            String::from_utf8_lossy(&raw).to_string()
        };

        files.push(DiscoveredFile {
            path: path.to_path_buf(),
            content,
            content_hash,
            mtime,
            size,
            is_binary,
        });
    }

    Ok(files)
}

/// Diff a freshly discovered file list against the prior snapshot set,
/// keyed by path, to compute the incremental change set.
pub fn diff_against_snapshots(
    discovered: &[DiscoveredFile],
    prior: &HashMap<PathBuf, IndexSnapshot>,
) -> ChangeSet {
    let mut change_set = ChangeSet::default();
    let mut seen = std::collections::HashSet::new();

    for file in discovered {
        seen.insert(file.path.clone());
        match prior.get(&file.path) {
            None => change_set.added.push(file.path.clone()),
            Some(snapshot) if snapshot.content_hash != file.content_hash => {
                change_set.modified.push(file.path.clone())
            }
            Some(_) => change_set.unchanged.push(file.path.clone()),
        }
    }

    for path in prior.keys() {
        if !seen.contains(path) {
            change_set.removed.push(path.clone());
        }
    }

    change_set
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn content_hash12_is_stable_and_12_chars() {
        let a = content_hash12(b"hello world");
        let b = content_hash12(b"hello world");
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);
    }

    #[test]
    fn workspace_hash_is_order_independent_in_input() {
        let entries_a = vec![(Path::new("b.rs"), "aaa111222333"), (Path::new("a.rs"), "bbb111222333")];
        let entries_b = vec![(Path::new("a.rs"), "bbb111222333"), (Path::new("b.rs"), "aaa111222333")];
        assert_eq!(workspace_hash(entries_a), workspace_hash(entries_b));
    }

    #[test]
    fn looks_binary_detects_nul_byte() {
        assert!(looks_binary(&[0x00, 0x01, 0x02]));
        assert!(!looks_binary(b"plain text content"));
    }

    #[test]
    fn walk_skips_ignored_and_oversized_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "fn main() {}").unwrap();
        fs::create_dir_all(dir.path().join("target")).unwrap();
        fs::write(dir.path().join("target/debug.rs"), "junk").unwrap();

        let mut matcher = IgnoreMatcher::new(dir.path()).unwrap();
        let config = DiscoveryConfig {
            max_file_size_bytes: 1024,
            ..DiscoveryConfig::default()
        };
        let files = walk(dir.path(), &mut matcher, &config).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(names.contains(&"a.rs".to_string()));
        assert!(!names.contains(&"debug.rs".to_string()));
    }

    #[test]
    fn walk_honors_include_and_exclude_globs() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "fn main() {}").unwrap();
        fs::write(dir.path().join("b.md"), "# notes").unwrap();
        fs::create_dir_all(dir.path().join("vendor")).unwrap();
        fs::write(dir.path().join("vendor/c.rs"), "// vendored").unwrap();

        let mut matcher = IgnoreMatcher::new(dir.path()).unwrap();
        let config = DiscoveryConfig {
            include_globs: vec!["**/*.rs".to_string()],
            exclude_globs: vec!["vendor/**".to_string()],
            ..DiscoveryConfig::default()
        };
        let files = walk(dir.path(), &mut matcher, &config).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(names.contains(&"a.rs".to_string()));
        assert!(!names.contains(&"b.md".to_string()));
        assert!(!names.contains(&"c.rs".to_string()));
    }

    #[test]
    fn diff_against_snapshots_buckets_added_modified_removed() {
        let dir = tempdir().unwrap();
        let path_a = dir.path().join("a.rs");
        let path_b = dir.path().join("b.rs");

        let discovered = vec![
            DiscoveredFile {
                path: path_a.clone(),
                content: "fn a() {}".to_string(),
                content_hash: "newhash11111".to_string(),
                mtime: 1,
                size: 9,
                is_binary: false,
            },
        ];

        let mut prior = HashMap::new();
        prior.insert(
            path_a.clone(),
            IndexSnapshot {
                path: path_a.clone(),
                content_hash: "oldhash00000".to_string(),
                mtime: 0,
                size: 9,
                parsed_ok: true,
                symbol_count: 1,
                adapter_id: "rust".to_string(),
            },
        );
        prior.insert(
            path_b.clone(),
            IndexSnapshot {
                path: path_b.clone(),
                content_hash: "bbbbbbbbbbbb".to_string(),
                mtime: 0,
                size: 5,
                parsed_ok: true,
                symbol_count: 1,
                adapter_id: "rust".to_string(),
            },
        );

        let change_set = diff_against_snapshots(&discovered, &prior);
        assert_eq!(change_set.modified, vec![path_a]);
        assert_eq!(change_set.removed, vec![path_b]);
        assert!(change_set.added.is_empty());
    }
}
