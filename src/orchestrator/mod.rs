//! Incremental Orchestrator.
//!
//! Top-level driver wiring File Discovery → Parsing Pool → Linker
//! Registry → Unified Store persistence. Project isolation is explicit:
//! every call threads a `project` string through rather than relying on
//! module-level state.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};

use crate::discovery::{self, DiscoveryConfig};
use crate::ignore::IgnoreMatcher;
use crate::linker;
use crate::model::{
    self, Confidence, IndexSnapshot, LineagePath, Project, Reference, Symbol, SymbolType,
};
use crate::parsing;
use crate::store::Store;

/// Maximum hop count a lineage walk will take before giving up — long
/// enough for the canonical UI → controller → service → repository →
/// entity-field → column chain (5 steps) plus slack for extra layers.
const MAX_LINEAGE_DEPTH: usize = 8;

/// Symbol types that can anchor a lineage path's UI-facing end.
const LINEAGE_ROOT_TYPES: &[SymbolType] = &[
    SymbolType::ElExpression,
    SymbolType::DataBinding,
    SymbolType::JspPage,
    SymbolType::Component,
    SymbolType::Template,
];

#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub project: String,
    pub incremental: bool,
    pub max_file_size_bytes: u64,
    pub max_workers: usize,
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            project: "default".to_string(),
            incremental: true,
            max_file_size_bytes: discovery::DEFAULT_MAX_FILE_SIZE_BYTES,
            max_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            include_globs: Vec::new(),
            exclude_globs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct IndexSummary {
    pub project: String,
    pub root_path: PathBuf,
    pub full_index: bool,
    pub fast_path: bool,
    pub files_added: u64,
    pub files_modified: u64,
    pub files_removed: u64,
    pub files_unreadable: u64,
    pub symbol_count: u64,
    pub ref_count: u64,
    pub workspace_hash: String,
    pub duration_ms: u64,
}

/// `index(root, project=None, incremental=True)`.
pub fn index(store: &mut Store, root: &Path, options: &IndexOptions) -> Result<IndexSummary> {
    let start = Instant::now();
    model::validate_project_name(&options.project).context("invalid project name")?;
    let project = model::normalize_project(Some(options.project.as_str()));

    // Step 1: load prior snapshots; fall back to full index when there
    // are none or the caller didn't ask for incremental mode.
    let prior_snapshots = store.list_snapshots(&project)?;
    let full_index = !options.incremental || prior_snapshots.is_empty();

    // Step 2: walk the tree and filter to files an adapter understands.
    let mut matcher = IgnoreMatcher::new(root)?;
    let discovery_config = DiscoveryConfig {
        max_file_size_bytes: options.max_file_size_bytes,
        include_globs: options.include_globs.clone(),
        exclude_globs: options.exclude_globs.clone(),
    };
    let discovered = discovery::walk(root, &mut matcher, &discovery_config)?;
    let indexable: Vec<_> = discovered
        .into_iter()
        .filter(|f| parsing::is_indexable(&f.path))
        .collect();

    let change_set = discovery::diff_against_snapshots(&indexable, &prior_snapshots);

    // Fast path: incremental with an empty change set completes without
    // touching the store beyond what's already there.
    if !full_index && change_set.is_empty() {
        let meta = store
            .get_project_meta(&project)?
            .unwrap_or_else(|| empty_project(&project, root));
        return Ok(IndexSummary {
            project,
            root_path: root.to_path_buf(),
            full_index: false,
            fast_path: true,
            files_added: 0,
            files_modified: 0,
            files_removed: 0,
            files_unreadable: 0,
            symbol_count: meta.symbol_count,
            ref_count: meta.ref_count,
            workspace_hash: meta.workspace_hash,
            duration_ms: start.elapsed().as_millis() as u64,
        });
    }

    // Step 3: reconcile stored state with the change set.
    if full_index {
        store.delete_all_for_project(&project)?;
    } else {
        for path in change_set.removed.iter().chain(change_set.modified.iter()) {
            store.delete_file(&project, path)?;
        }
    }

    let to_parse: Vec<_> = if full_index {
        indexable.clone()
    } else {
        indexable
            .iter()
            .filter(|f| change_set.added.contains(&f.path) || change_set.modified.contains(&f.path))
            .cloned()
            .collect()
    };

    let parsed = parsing::run(&to_parse, options.max_workers);

    let mut files_unreadable = 0u64;
    for outcome in &parsed {
        if !outcome.parsed_ok {
            files_unreadable += 1;
        }
        store.replace_file_symbols(&project, &outcome.path, &outcome.symbols)?;
        store.replace_file_raw_refs(&project, &outcome.path, &outcome.raw_refs)?;
        if let Some(doc) = &outcome.document {
            store.upsert_document(&project, doc)?;
        }

        let source_meta = to_parse.iter().find(|f| f.path == outcome.path);
        let snapshot = IndexSnapshot {
            path: outcome.path.clone(),
            content_hash: source_meta
                .map(|f| f.content_hash.clone())
                .unwrap_or_default(),
            mtime: source_meta.map(|f| f.mtime).unwrap_or(0),
            size: source_meta.map(|f| f.size).unwrap_or(0),
            parsed_ok: outcome.parsed_ok,
            symbol_count: outcome.symbols.len() as u64,
            adapter_id: outcome.adapter_id.clone(),
        };
        store.upsert_snapshot(&project, &snapshot)?;
    }

    // Step 4: re-run the Linker Registry over the FULL project symbol
    // set (not just the files that changed) — cross-file references may
    // be invalidated by edits far from the observed symbol.
    let all_symbols = store.all_symbols(&project)?;
    let all_raw_refs = store.all_raw_refs(&project)?;
    let refs = linker::run_linkers(&all_symbols, &all_raw_refs);
    store.replace_all_refs(&project, &refs)?;

    // Step 5: recompute lineage paths and the workspace hash, then
    // update project_meta.
    let lineage_paths = compute_lineage_paths(&all_symbols, &refs);
    store.upsert_lineage_paths(&project, &lineage_paths)?;

    let snapshots = store.list_snapshots(&project)?;
    let hash_entries: Vec<(&Path, &str)> = snapshots
        .values()
        .map(|s| (s.path.as_path(), s.content_hash.as_str()))
        .collect();
    let workspace_hash = discovery::workspace_hash(hash_entries);

    let indexed_at = current_timestamp_rfc3339();
    let meta = Project {
        name: project.clone(),
        root_path: root.to_string_lossy().to_string(),
        indexed_at,
        file_count: snapshots.len() as u64,
        symbol_count: all_symbols.len() as u64,
        ref_count: refs.len() as u64,
        workspace_hash: workspace_hash.clone(),
    };
    store.upsert_project_meta(&meta)?;

    Ok(IndexSummary {
        project,
        root_path: root.to_path_buf(),
        full_index,
        fast_path: false,
        files_added: change_set.added.len() as u64,
        files_modified: change_set.modified.len() as u64,
        files_removed: change_set.removed.len() as u64,
        files_unreadable,
        symbol_count: meta.symbol_count,
        ref_count: meta.ref_count,
        workspace_hash: meta.workspace_hash,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

fn empty_project(name: &str, root: &Path) -> Project {
    Project {
        name: name.to_string(),
        root_path: root.to_string_lossy().to_string(),
        indexed_at: String::new(),
        file_count: 0,
        symbol_count: 0,
        ref_count: 0,
        workspace_hash: String::new(),
    }
}

/// RFC3339 timestamp for `project_meta.indexed_at`, via `time`'s
/// `OffsetDateTime::now_utc`.
fn current_timestamp_rfc3339() -> String {
    use time::OffsetDateTime;
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Build every acyclic forward walk from a UI-side anchor symbol to a
/// `Column` sink, bounded by [`MAX_LINEAGE_DEPTH`] hops. Confidence of a
/// path is the minimum confidence among its constituent edges; cycles are
/// avoided with a bounded-depth DFS that never revisits a node within one
/// walk rather than a literal read/write edge-typing pass.
fn compute_lineage_paths(symbols: &[Symbol], refs: &[Reference]) -> Vec<LineagePath> {
    let mut adjacency: std::collections::HashMap<&str, Vec<(&str, Confidence)>> =
        std::collections::HashMap::new();
    for r in refs {
        let Some(target) = r.target_id.as_deref() else {
            continue;
        };
        adjacency
            .entry(r.source_id.as_str())
            .or_default()
            .push((target, r.confidence));
    }

    let sinks: HashSet<&str> = symbols
        .iter()
        .filter(|s| s.symbol_type == SymbolType::Column)
        .map(|s| s.id.as_str())
        .collect();
    let roots: Vec<&Symbol> = symbols
        .iter()
        .filter(|s| LINEAGE_ROOT_TYPES.contains(&s.symbol_type))
        .collect();

    let mut paths = Vec::new();

    for root in roots {
        let mut queue: VecDeque<(String, Vec<String>, Confidence)> = VecDeque::new();
        queue.push_back((root.id.clone(), vec![root.id.clone()], Confidence::High));
        let mut visited_for_root: HashSet<String> = HashSet::new();
        visited_for_root.insert(root.id.clone());

        while let Some((current, path, confidence)) = queue.pop_front() {
            if path.len() > MAX_LINEAGE_DEPTH {
                continue;
            }
            if sinks.contains(current.as_str()) && path.len() > 1 {
                paths.push(LineagePath {
                    project: String::new(),
                    root_id: root.id.clone(),
                    sink_id: current.clone(),
                    steps: path.clone(),
                    confidence,
                });
                continue;
            }
            let Some(neighbors) = adjacency.get(current.as_str()) else {
                continue;
            };
            for (next, edge_confidence) in neighbors {
                if visited_for_root.contains(*next) {
                    continue;
                }
                visited_for_root.insert(next.to_string());
                let mut next_path = path.clone();
                next_path.push(next.to_string());
                let next_confidence = confidence.min(*edge_confidence);
                queue.push_back((next.to_string(), next_path, next_confidence));
            }
        }
    }

    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::reference::Location;
    use crate::model::ReferenceType;
    use std::fs;
    use tempfile::tempdir;

    fn rust_symbol(file: &str, name: &str, qname: &str, line: u32) -> Symbol {
        Symbol::new(
            PathBuf::from(file),
            name.to_string(),
            qname.to_string(),
            SymbolType::Function,
            "rust".to_string(),
            line,
            line,
        )
    }

    #[test]
    fn full_index_populates_store_from_a_small_rust_tree() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("lib.rs"),
            "pub fn add(a: i32, b: i32) -> i32 { a + b }\n",
        )
        .unwrap();

        let mut store = Store::open_in_memory().unwrap();
        let options = IndexOptions {
            project: "alpha".to_string(),
            incremental: true,
            ..IndexOptions::default()
        };
        let summary = index(&mut store, dir.path(), &options).unwrap();

        assert!(!summary.fast_path);
        assert!(summary.symbol_count >= 1);
        assert!(!summary.workspace_hash.is_empty());

        let meta = store.get_project_meta("alpha").unwrap().unwrap();
        assert_eq!(meta.file_count, 1);
    }

    #[test]
    fn incremental_reindex_with_no_changes_is_a_fast_path_noop() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("lib.rs"), "pub fn add() {}\n").unwrap();

        let mut store = Store::open_in_memory().unwrap();
        let options = IndexOptions {
            project: "alpha".to_string(),
            ..IndexOptions::default()
        };
        let first = index(&mut store, dir.path(), &options).unwrap();
        let second = index(&mut store, dir.path(), &options).unwrap();

        assert!(second.fast_path);
        assert_eq!(first.symbol_count, second.symbol_count);
        assert_eq!(first.workspace_hash, second.workspace_hash);
    }

    #[test]
    fn modifying_one_file_only_touches_that_files_symbols() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "pub fn a() {}\n").unwrap();
        fs::write(dir.path().join("b.rs"), "pub fn b() {}\n").unwrap();

        let mut store = Store::open_in_memory().unwrap();
        let options = IndexOptions {
            project: "alpha".to_string(),
            ..IndexOptions::default()
        };
        index(&mut store, dir.path(), &options).unwrap();

        let b_snapshot_before = store.list_snapshots("alpha").unwrap()[&PathBuf::from(dir.path().join("b.rs"))]
            .content_hash
            .clone();

        fs::write(dir.path().join("a.rs"), "pub fn a() { let _ = 1; }\n").unwrap();
        index(&mut store, dir.path(), &options).unwrap();

        let b_snapshot_after = store.list_snapshots("alpha").unwrap()[&PathBuf::from(dir.path().join("b.rs"))]
            .content_hash
            .clone();
        assert_eq!(b_snapshot_before, b_snapshot_after);
    }

    #[test]
    fn compute_lineage_paths_finds_a_path_from_root_to_column() {
        let root = {
            let mut s = rust_symbol("login.jsp", "email", "login::email", 1);
            s.symbol_type = SymbolType::ElExpression;
            s
        };
        let field = {
            let mut s = rust_symbol("User.java", "email", "User.email", 1);
            s.symbol_type = SymbolType::EntityField;
            s
        };
        let column = {
            let mut s = rust_symbol("schema.sql", "email", "users::email", 1);
            s.symbol_type = SymbolType::Column;
            s
        };
        let symbols = vec![root.clone(), field.clone(), column.clone()];

        let refs = vec![
            Reference {
                source_id: root.id.clone(),
                target_id: Some(field.id.clone()),
                target_name: field.name.clone(),
                ref_type: ReferenceType::BindsTo,
                confidence: Confidence::High,
                location: Location { file: PathBuf::from("login.jsp"), line: 1 },
                metadata: None,
            },
            Reference {
                source_id: field.id.clone(),
                target_id: Some(column.id.clone()),
                target_name: column.name.clone(),
                ref_type: ReferenceType::MapsTo,
                confidence: Confidence::High,
                location: Location { file: PathBuf::from("User.java"), line: 1 },
                metadata: None,
            },
        ];

        let paths = compute_lineage_paths(&symbols, &refs);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].root_id, root.id);
        assert_eq!(paths[0].sink_id, column.id);
        assert_eq!(paths[0].confidence, Confidence::High);
        assert_eq!(paths[0].steps.len(), 3);
    }
}
