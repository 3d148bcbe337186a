//! Query Engine: multi-tier ranked search, BFS traversal, blast-radius,
//! hotspots, lineage, and the other read-only verbs the gateway and CLI
//! expose. Every verb is a plain function over `&Store` rather than a
//! stateful service object.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::WickedError;
use crate::model::{Confidence, LineagePath, Reference, ReferenceType, ServiceGraph, Symbol};
use crate::store::Store;

pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    Both,
}

impl Direction {
    pub fn parse(s: &str) -> Result<Self, WickedError> {
        match s {
            "in" => Ok(Direction::In),
            "out" => Ok(Direction::Out),
            "both" => Ok(Direction::Both),
            other => Err(WickedError::InputError(format!(
                "invalid direction: {other} (expected in|out|both)"
            ))),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Freshness {
    pub indexed_at: String,
    pub workspace_hash: String,
    pub stale: bool,
}

impl Default for Freshness {
    fn default() -> Self {
        Self {
            indexed_at: String::new(),
            workspace_hash: String::new(),
            stale: true,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Meta {
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
    pub schema_version: String,
    pub freshness: Freshness,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Envelope<T> {
    pub items: Vec<T>,
    pub meta: Meta,
}

pub struct QueryEngine<'a> {
    store: &'a Store,
}

impl<'a> QueryEngine<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    fn freshness(&self, project: &str) -> Freshness {
        match self.store.get_project_meta(project) {
            Ok(Some(meta)) => {
                let stale = self
                    .live_workspace_hash(&meta.root_path)
                    .map(|live| live != meta.workspace_hash)
                    .unwrap_or(false);
                Freshness {
                    indexed_at: meta.indexed_at,
                    workspace_hash: meta.workspace_hash,
                    stale,
                }
            }
            _ => Freshness::default(),
        }
    }

    /// Re-derive the workspace hash live from disk (same walk + ignore
    /// rules + algorithm the orchestrator uses at index time, filtered to
    /// the same indexable file set) so `StaleIndex` is detectable at
    /// query time rather than only ever reported via `Freshness::default`.
    /// A re-walk failure (root moved, unreadable) can't tell us anything,
    /// so it's treated as "not stale" rather than failing the query.
    fn live_workspace_hash(&self, root_path: &str) -> Option<String> {
        let root = std::path::Path::new(root_path);
        let mut matcher = crate::ignore::IgnoreMatcher::new(root).ok()?;
        let config = crate::discovery::DiscoveryConfig::default();
        let files = crate::discovery::walk(root, &mut matcher, &config).ok()?;
        let entries: Vec<(&std::path::Path, &str)> = files
            .iter()
            .filter(|f| crate::parsing::is_indexable(&f.path))
            .map(|f| (f.path.as_path(), f.content_hash.as_str()))
            .collect();
        Some(crate::discovery::workspace_hash(entries))
    }

    /// Wrap an arbitrary verb result in the same `{items, meta}` envelope
    /// `list`/`search` build directly (Testable Property 9: every
    /// successful gateway response carries `items` and a full `meta`,
    /// including `freshness`, not just the two verbs that paginate).
    pub fn envelope<T>(&self, project: &str, items: Vec<T>, limit: u32, offset: u32) -> Envelope<T> {
        let total = items.len() as u64;
        let meta = self.meta(project, total, limit, offset);
        Envelope { items, meta }
    }

    fn meta(&self, project: &str, total: u64, limit: u32, offset: u32) -> Meta {
        Meta {
            total,
            limit,
            offset,
            schema_version: crate::store::SCHEMA_VERSION.to_string(),
            freshness: self.freshness(project),
        }
    }

    fn paginate<T>(mut items: Vec<T>, limit: u32, offset: u32) -> (Vec<T>, u64) {
        let total = items.len() as u64;
        let offset = offset as usize;
        if offset >= items.len() {
            return (Vec::new(), total);
        }
        let end = (offset + limit as usize).min(items.len());
        let page = items.drain(offset..end).collect();
        (page, total)
    }

    /// `list(source)`: deterministic, paginated enumeration of every
    /// symbol in the project, ordered by id.
    pub fn list(&self, project: &str, limit: u32, offset: u32) -> Result<Envelope<Symbol>, WickedError> {
        let mut symbols = self.store.all_symbols(project)?;
        symbols.sort_by(|a, b| a.id.cmp(&b.id));
        let (page, total) = Self::paginate(symbols, limit, offset);
        let meta = self.meta(project, total, limit, offset);
        Ok(Envelope { items: page, meta })
    }

    /// `get(source, id)`: direct O(1) lookup.
    pub fn get(&self, project: &str, id: &str) -> Result<Symbol, WickedError> {
        self.store.get_symbol(project, id)?.ok_or_else(|| {
            let suggestions = self
                .search(project, id, 5, 0)
                .map(|env| env.items.into_iter().map(|s| s.id).collect())
                .unwrap_or_default();
            WickedError::not_found_with_suggestions(format!("no symbol with id {id}"), suggestions)
        })
    }

    /// `content(id)`: the source text slice for a symbol's declaration
    /// span. Reads the underlying file relative to the project root; the
    /// caller must only invoke this against a freshly indexed project.
    pub fn content(&self, project: &str, id: &str) -> Result<String, WickedError> {
        let symbol = self.get(project, id)?;
        if let Some(doc) = self.store.get_document(project, &symbol.file_path)? {
            return Ok(doc.text);
        }

        let meta = self
            .store
            .get_project_meta(project)?
            .ok_or_else(|| WickedError::not_found(format!("project {project} has not been indexed")))?;
        let full_path = std::path::Path::new(&meta.root_path).join(&symbol.file_path);
        let contents = std::fs::read_to_string(&full_path)
            .map_err(|e| WickedError::StorageError(format!("reading {}: {e}", full_path.display())))?;

        let start = symbol.line_start.saturating_sub(1) as usize;
        let end = symbol.line_end as usize;
        let slice: String = contents
            .lines()
            .skip(start)
            .take(end.saturating_sub(start))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(slice)
    }

    /// Five-tier ranked `search(source, query)`. Tie-break within a tier
    /// is by ascending symbol-count-of-owning-file (less noisy files
    /// rank higher), then lexicographic id.
    pub fn search(&self, project: &str, query: &str, limit: u32, offset: u32) -> Result<Envelope<Symbol>, WickedError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut ranked: Vec<Symbol> = Vec::new();

        if let Some(exact) = self.store.get_symbol(project, query)? {
            seen.insert(exact.id.clone());
            ranked.push(exact);
        }

        let by_name = self.store.find_symbols_by_name(project, query)?;
        self.append_tier(&mut ranked, &mut seen, by_name, project)?;

        let by_prefix = self.store.find_symbols_by_prefix_ci(project, query)?;
        self.append_tier(&mut ranked, &mut seen, by_prefix, project)?;

        let by_fts = self.store.search_fts(project, query, MAX_LIMIT)?;
        self.append_tier(&mut ranked, &mut seen, by_fts, project)?;

        let by_substring = self.store.find_symbols_by_qualified_substring_ci(project, query)?;
        self.append_tier(&mut ranked, &mut seen, by_substring, project)?;

        let (page, total) = Self::paginate(ranked, limit, offset);
        let meta = self.meta(project, total, limit, offset);
        Ok(Envelope { items: page, meta })
    }

    fn append_tier(
        &self,
        ranked: &mut Vec<Symbol>,
        seen: &mut HashSet<String>,
        mut tier: Vec<Symbol>,
        project: &str,
    ) -> Result<(), WickedError> {
        tier.retain(|s| seen.insert(s.id.clone()));
        let file_noise = self.file_symbol_counts(project)?;
        tier.sort_by(|a, b| {
            let noise_a = file_noise.get(&a.file_path).copied().unwrap_or(0);
            let noise_b = file_noise.get(&b.file_path).copied().unwrap_or(0);
            noise_a.cmp(&noise_b).then_with(|| a.id.cmp(&b.id))
        });
        ranked.extend(tier);
        Ok(())
    }

    fn file_symbol_counts(&self, project: &str) -> Result<HashMap<std::path::PathBuf, u64>, WickedError> {
        let mut counts = HashMap::new();
        for symbol in self.store.all_symbols(project)? {
            *counts.entry(symbol.file_path).or_insert(0u64) += 1;
        }
        Ok(counts)
    }

    /// Resolve a symbol name or id to its canonical id via the search
    /// fallback used by `refs`, `blast_radius`, `lineage`, `impact`.
    fn resolve_id(&self, project: &str, name_or_id: &str) -> Result<String, WickedError> {
        if self.store.get_symbol(project, name_or_id)?.is_some() {
            return Ok(name_or_id.to_string());
        }
        let env = self.search(project, name_or_id, 1, 0)?;
        env.items
            .into_iter()
            .next()
            .map(|s| s.id)
            .ok_or_else(|| WickedError::not_found(format!("no symbol matching {name_or_id}")))
    }

    /// `stats(source)`: aggregate histograms by type/language/layer/domain.
    pub fn stats(&self, project: &str) -> Result<HashMap<String, HashMap<String, u64>>, WickedError> {
        self.store.stats(project)
    }

    /// `refs(id)`: every reference where the resolved symbol participates
    /// as source or target, labeled with the forward/inverse relation.
    pub fn refs(&self, project: &str, id_or_name: &str) -> Result<Vec<LabeledRef>, WickedError> {
        let id = self.resolve_id(project, id_or_name)?;
        let refs = self.store.refs_for_symbol(project, &id)?;
        Ok(refs
            .into_iter()
            .map(|r| {
                let label = if r.source_id == id {
                    r.ref_type.forward_label()
                } else {
                    r.ref_type.inverse_label()
                };
                LabeledRef { label: label.to_string(), reference: r }
            })
            .collect())
    }

    /// `traverse(id, depth, direction)`: BFS bounded to `depth` hops,
    /// cycle-safe via a visited set, edges beyond depth are not returned.
    pub fn traverse(
        &self,
        project: &str,
        id_or_name: &str,
        depth: u32,
        direction: Direction,
    ) -> Result<TraverseResult, WickedError> {
        if !(1..=3).contains(&depth) {
            return Err(WickedError::InputError(format!(
                "depth must be in 1..=3, got {depth}"
            )));
        }
        let root = self.resolve_id(project, id_or_name)?;

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(root.clone());
        let mut nodes = vec![TraverseNode { id: root.clone(), depth: 0, path: vec![root.clone()] }];
        let mut edges: Vec<Reference> = Vec::new();
        let mut frontier: VecDeque<(String, u32, Vec<String>)> = VecDeque::new();
        frontier.push_back((root.clone(), 0, vec![root.clone()]));

        while let Some((current, current_depth, path)) = frontier.pop_front() {
            if current_depth >= depth {
                continue;
            }
            let neighbors = self.neighbors(project, &current, direction)?;
            for (neighbor_id, reference) in neighbors {
                edges.push(reference);
                if visited.contains(&neighbor_id) {
                    continue;
                }
                visited.insert(neighbor_id.clone());
                let mut next_path = path.clone();
                next_path.push(neighbor_id.clone());
                nodes.push(TraverseNode {
                    id: neighbor_id.clone(),
                    depth: current_depth + 1,
                    path: next_path.clone(),
                });
                frontier.push_back((neighbor_id, current_depth + 1, next_path));
            }
        }

        Ok(TraverseResult { root, nodes, edges })
    }

    fn neighbors(
        &self,
        project: &str,
        id: &str,
        direction: Direction,
    ) -> Result<Vec<(String, Reference)>, WickedError> {
        let mut out = Vec::new();
        if matches!(direction, Direction::Out | Direction::Both) {
            for r in self.store.refs_from(project, id)? {
                if let Some(target) = r.target_id.clone() {
                    out.push((target, r));
                }
            }
        }
        if matches!(direction, Direction::In | Direction::Both) {
            for r in self.store.refs_into(project, id)? {
                let source = r.source_id.clone();
                out.push((source, r));
            }
        }
        Ok(out)
    }

    /// `blast_radius(id, depth)`: upstream dependents grouped by hop
    /// distance. A thin regrouping of `traverse(direction=in)`.
    pub fn blast_radius(
        &self,
        project: &str,
        id_or_name: &str,
        depth: u32,
    ) -> Result<BlastRadius, WickedError> {
        let traversal = self.traverse(project, id_or_name, depth, Direction::In)?;
        let mut by_depth: HashMap<u32, Vec<String>> = HashMap::new();
        for node in &traversal.nodes {
            if node.depth == 0 {
                continue;
            }
            by_depth.entry(node.depth).or_default().push(node.id.clone());
        }
        Ok(BlastRadius { root: traversal.root, by_depth })
    }

    /// `hotspots(limit, filters)`: symbols ranked by total degree
    /// (in + out), equal-weighted regardless of confidence.
    pub fn hotspots(
        &self,
        project: &str,
        limit: u32,
        layer: Option<&str>,
        symbol_type: Option<&str>,
    ) -> Result<Vec<(Symbol, u64)>, WickedError> {
        let degrees = self.store.degree_counts(project)?;
        let mut symbols = self.store.all_symbols(project)?;
        if let Some(layer) = layer {
            symbols.retain(|s| serde_json::to_value(s.layer).ok().and_then(|v| v.as_str().map(String::from)).as_deref() == Some(layer));
        }
        if let Some(symbol_type) = symbol_type {
            symbols.retain(|s| serde_json::to_value(s.symbol_type).ok().and_then(|v| v.as_str().map(String::from)).as_deref() == Some(symbol_type));
        }

        let mut ranked: Vec<(Symbol, u64)> = symbols
            .into_iter()
            .map(|s| {
                let degree = degrees.get(&s.id).copied().unwrap_or(0);
                (s, degree)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.id.cmp(&b.0.id)));
        ranked.truncate(limit as usize);
        Ok(ranked)
    }

    /// `lineage(symbol_name)`: precomputed source→sink paths that touch
    /// the named symbol at any step.
    pub fn lineage(&self, project: &str, symbol_name: &str) -> Result<Vec<LineagePath>, WickedError> {
        self.store.lineage_paths_touching(project, symbol_name)
    }

    /// `service_map()`: merged infra + code-inferred service graph.
    pub fn service_map(&self, project: &str) -> Result<ServiceGraph, WickedError> {
        self.store.get_service_graph(project)
    }

    /// `categories()`: folksonomy grouping by path-derived `domains` tag,
    /// plus a count of cross-category reference edges.
    pub fn categories(&self, project: &str) -> Result<Categories, WickedError> {
        let symbols = self.store.all_symbols(project)?;
        let mut by_tag: HashMap<String, Vec<String>> = HashMap::new();
        let mut tag_of: HashMap<String, Vec<String>> = HashMap::new();
        for s in &symbols {
            tag_of.insert(s.id.clone(), s.domains.clone());
            for tag in &s.domains {
                by_tag.entry(tag.clone()).or_default().push(s.id.clone());
            }
        }

        let mut cross_edges: HashMap<String, u64> = HashMap::new();
        for id in tag_of.keys().cloned().collect::<Vec<_>>() {
            for r in self.store.refs_from(project, &id)? {
                let Some(target) = &r.target_id else { continue };
                let Some(source_tags) = tag_of.get(&id) else { continue };
                let Some(target_tags) = tag_of.get(target) else { continue };
                for a in source_tags {
                    for b in target_tags {
                        if a != b {
                            let key = format!("{a}->{b}");
                            *cross_edges.entry(key).or_insert(0) += 1;
                        }
                    }
                }
            }
        }

        Ok(Categories { by_tag, cross_edges })
    }

    /// `impact(symbol_name)`: composed verb — resolve, then upstream
    /// blast radius plus any lineage paths touching the symbol.
    pub fn impact(&self, project: &str, symbol_name: &str, depth: u32) -> Result<Impact, WickedError> {
        let resolved = self.resolve_id(project, symbol_name)?;
        let blast_radius = self.blast_radius(project, &resolved, depth)?;
        let lineage = self.lineage(project, symbol_name)?;
        Ok(Impact { symbol_id: resolved, blast_radius, lineage })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct LabeledRef {
    pub label: String,
    #[serde(flatten)]
    pub reference: Reference,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TraverseNode {
    pub id: String,
    pub depth: u32,
    pub path: Vec<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TraverseResult {
    pub root: String,
    pub nodes: Vec<TraverseNode>,
    pub edges: Vec<Reference>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BlastRadius {
    pub root: String,
    pub by_depth: HashMap<u32, Vec<String>>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Categories {
    pub by_tag: HashMap<String, Vec<String>>,
    pub cross_edges: HashMap<String, u64>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Impact {
    pub symbol_id: String,
    pub blast_radius: BlastRadius,
    pub lineage: Vec<LineagePath>,
}

/// Minimum confidence floor applied when callers request filtered refs.
pub const DEFAULT_CONFIDENCE_FLOOR: Confidence = Confidence::Low;

pub fn filter_by_confidence(refs: Vec<Reference>, floor: Confidence) -> Vec<Reference> {
    refs.into_iter().filter(|r| r.confidence >= floor).collect()
}

pub fn reference_type_label(t: ReferenceType) -> &'static str {
    t.forward_label()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::reference::Location;
    use crate::model::SymbolType;
    use std::path::PathBuf;

    fn symbol(name: &str, qname: &str, file: &str, line: u32) -> Symbol {
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

    fn seeded_store() -> (Store, Symbol, Symbol, Symbol) {
        let mut store = Store::open_in_memory().unwrap();
        let login = symbol("Login", "app::Login", "src/a.rs", 1);
        let login_controller = symbol("LoginController", "app::LoginController", "src/b.rs", 1);
        let validate = symbol("validateToken", "app::validateToken", "src/c.rs", 1);

        store
            .replace_file_symbols("default", &PathBuf::from("src/a.rs"), &[login.clone()])
            .unwrap();
        store
            .replace_file_symbols("default", &PathBuf::from("src/b.rs"), &[login_controller.clone()])
            .unwrap();
        store
            .replace_file_symbols("default", &PathBuf::from("src/c.rs"), &[validate.clone()])
            .unwrap();

        let calls = Reference {
            source_id: login_controller.id.clone(),
            target_id: Some(validate.id.clone()),
            target_name: "validateToken".to_string(),
            ref_type: ReferenceType::Calls,
            confidence: Confidence::High,
            location: Location { file: PathBuf::from("src/b.rs"), line: 2 },
            metadata: None,
        };
        store.replace_all_refs("default", &[calls]).unwrap();

        (store, login, login_controller, validate)
    }

    #[test]
    fn search_ranks_exact_match_above_prefix_match() {
        let (store, login, login_controller, _validate) = seeded_store();
        let engine = QueryEngine::new(&store);
        let result = engine.search("default", "Login", 10, 0).unwrap();
        assert_eq!(result.items[0].id, login.id);
        assert!(result.items.iter().any(|s| s.id == login_controller.id));
    }

    #[test]
    fn traverse_respects_depth_bound_and_visited_set() {
        let (store, _login, login_controller, validate) = seeded_store();
        let engine = QueryEngine::new(&store);
        let result = engine
            .traverse("default", &login_controller.id, 1, Direction::Out)
            .unwrap();
        assert_eq!(result.nodes.len(), 2);
        assert!(result.nodes.iter().any(|n| n.id == validate.id && n.depth == 1));
    }

    #[test]
    fn blast_radius_groups_by_depth_with_no_overlap() {
        let (store, _login, login_controller, validate) = seeded_store();
        let engine = QueryEngine::new(&store);
        let radius = engine.blast_radius("default", &validate.id, 2).unwrap();
        let depth1 = radius.by_depth.get(&1).cloned().unwrap_or_default();
        assert!(depth1.contains(&login_controller.id));
        for (depth, ids) in &radius.by_depth {
            if *depth != 1 {
                assert!(!ids.contains(&login_controller.id));
            }
        }
    }

    #[test]
    fn hotspots_matches_degree_counts_exactly() {
        let (store, _login, login_controller, validate) = seeded_store();
        let engine = QueryEngine::new(&store);
        let hotspots = engine.hotspots("default", 10, None, None).unwrap();
        let controller_degree = hotspots.iter().find(|(s, _)| s.id == login_controller.id).unwrap().1;
        let validate_degree = hotspots.iter().find(|(s, _)| s.id == validate.id).unwrap().1;
        assert_eq!(controller_degree, 1);
        assert_eq!(validate_degree, 1);
    }

    #[test]
    fn envelope_wraps_arbitrary_verb_result_with_total_and_meta() {
        let (store, login, _login_controller, _validate) = seeded_store();
        let engine = QueryEngine::new(&store);
        let env = engine.envelope("default", vec![login.clone()], 10, 0);
        assert_eq!(env.items.len(), 1);
        assert_eq!(env.meta.total, 1);
        assert_eq!(env.meta.limit, 10);
        assert_eq!(env.meta.schema_version, crate::store::SCHEMA_VERSION);
    }

    #[test]
    fn freshness_reports_stale_when_workspace_changes_on_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let file_path = tmp.path().join("a.rs");
        std::fs::write(&file_path, "fn one() {}\n").unwrap();

        let mut matcher = crate::ignore::IgnoreMatcher::new(tmp.path()).unwrap();
        let config = crate::discovery::DiscoveryConfig::default();
        let discovered = crate::discovery::walk(tmp.path(), &mut matcher, &config).unwrap();
        let entries: Vec<(&std::path::Path, &str)> = discovered
            .iter()
            .map(|f| (f.path.as_path(), f.content_hash.as_str()))
            .collect();
        let indexed_hash = crate::discovery::workspace_hash(entries);

        let store = Store::open_in_memory().unwrap();
        store
            .upsert_project_meta(&crate::model::Project {
                name: "default".to_string(),
                root_path: tmp.path().to_string_lossy().to_string(),
                indexed_at: "2026-01-01T00:00:00Z".to_string(),
                file_count: 1,
                symbol_count: 0,
                ref_count: 0,
                workspace_hash: indexed_hash,
            })
            .unwrap();

        let engine = QueryEngine::new(&store);
        assert!(!engine.list("default", 10, 0).unwrap().meta.freshness.stale);

        std::fs::write(&file_path, "fn one() { /* changed */ }\n").unwrap();
        assert!(engine.list("default", 10, 0).unwrap().meta.freshness.stale);
    }
}
