//! Unified Store: a single SQLite database per project directory, with
//! FTS5 full-text search and graph-friendly secondary indexes. WAL mode
//! plus a busy timeout, transaction-per-file discipline, and a flat
//! symbol/reference/document/lineage/service/snapshot model under one
//! connection.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::WickedError;
use crate::model::reference::Location;
use crate::model::{
    Confidence, Document, IndexSnapshot, LineagePath, Project, Reference, ReferenceType,
    ServiceConnection, ServiceGraph, ServiceNode, Symbol, SymbolLayer, SymbolType,
};

/// `MAJOR.MINOR`; major bumps require re-index, minor additions stay
/// backward-compatible.
pub const SCHEMA_VERSION: &str = "1.0";

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the unified store at `path`, enabling WAL mode and
    /// a busy timeout so readers can proceed while this connection holds
    /// the single writer role.
    pub fn open(path: &Path) -> Result<Self, WickedError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| WickedError::StorageError(e.to_string()))?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(std::time::Duration::from_millis(5000))?;

        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store, used by tests and by ephemeral query-only runs.
    pub fn open_in_memory() -> Result<Self, WickedError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), WickedError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS project_meta (
                name TEXT PRIMARY KEY,
                root_path TEXT NOT NULL,
                indexed_at TEXT NOT NULL,
                file_count INTEGER NOT NULL DEFAULT 0,
                symbol_count INTEGER NOT NULL DEFAULT 0,
                ref_count INTEGER NOT NULL DEFAULT 0,
                workspace_hash TEXT NOT NULL DEFAULT '',
                schema_version TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS symbols (
                project TEXT NOT NULL,
                id TEXT NOT NULL,
                name TEXT NOT NULL,
                qualified_name TEXT NOT NULL,
                type TEXT NOT NULL,
                layer TEXT NOT NULL,
                file_path TEXT NOT NULL,
                line_start INTEGER NOT NULL,
                line_end INTEGER NOT NULL,
                parent_id TEXT,
                language TEXT NOT NULL,
                domain TEXT NOT NULL,
                inferred_type TEXT,
                description TEXT,
                domains_json TEXT NOT NULL DEFAULT '[]',
                metadata_json TEXT,
                PRIMARY KEY (project, id)
            );
            CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(project, name);
            CREATE INDEX IF NOT EXISTS idx_symbols_qname ON symbols(project, qualified_name COLLATE NOCASE);
            CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(project, file_path);
            CREATE INDEX IF NOT EXISTS idx_symbols_type ON symbols(project, type);
            CREATE INDEX IF NOT EXISTS idx_symbols_layer ON symbols(project, layer);

            CREATE VIRTUAL TABLE IF NOT EXISTS symbols_fts USING fts5(
                project UNINDEXED,
                symbol_id UNINDEXED,
                name,
                qualified_name,
                description
            );

            CREATE TABLE IF NOT EXISTS refs (
                project TEXT NOT NULL,
                source_id TEXT NOT NULL,
                target_id TEXT,
                target_name TEXT NOT NULL,
                type TEXT NOT NULL,
                confidence TEXT NOT NULL,
                loc_file TEXT NOT NULL,
                loc_line INTEGER NOT NULL,
                metadata_json TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_refs_source ON refs(project, source_id);
            CREATE INDEX IF NOT EXISTS idx_refs_target ON refs(project, target_id);
            CREATE INDEX IF NOT EXISTS idx_refs_type ON refs(project, type);

            CREATE TABLE IF NOT EXISTS documents (
                project TEXT NOT NULL,
                path TEXT NOT NULL,
                title TEXT,
                frontmatter_json TEXT NOT NULL DEFAULT '{}',
                text TEXT NOT NULL,
                sections_json TEXT NOT NULL DEFAULT '[]',
                mtime INTEGER NOT NULL,
                size INTEGER NOT NULL,
                PRIMARY KEY (project, path)
            );

            CREATE TABLE IF NOT EXISTS lineage_paths (
                project TEXT NOT NULL,
                root_id TEXT NOT NULL,
                sink_id TEXT NOT NULL,
                steps_json TEXT NOT NULL,
                confidence TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_lineage_project ON lineage_paths(project);

            CREATE TABLE IF NOT EXISTS services (
                project TEXT NOT NULL,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                ports_json TEXT NOT NULL DEFAULT '[]',
                depends_on_json TEXT NOT NULL DEFAULT '[]',
                PRIMARY KEY (project, name)
            );

            CREATE TABLE IF NOT EXISTS service_connections (
                project TEXT NOT NULL,
                from_name TEXT NOT NULL,
                to_name TEXT NOT NULL,
                kind TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS snapshots (
                project TEXT NOT NULL,
                path TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                mtime INTEGER NOT NULL,
                size INTEGER NOT NULL,
                parsed_ok INTEGER NOT NULL,
                symbol_count INTEGER NOT NULL,
                adapter_id TEXT NOT NULL,
                PRIMARY KEY (project, path)
            );

            CREATE TABLE IF NOT EXISTS raw_refs (
                project TEXT NOT NULL,
                file_path TEXT NOT NULL,
                source_qualified_name TEXT NOT NULL,
                target_expression TEXT NOT NULL,
                ref_type_hint TEXT NOT NULL,
                loc_file TEXT NOT NULL,
                loc_line INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_raw_refs_file ON raw_refs(project, file_path);
            "#,
        )?;
        Ok(())
    }

    /// Replace every symbol and FTS row belonging to `file_path` in one
    /// transaction (incremental re-index deletes-then-inserts per file).
    pub fn replace_file_symbols(
        &mut self,
        project: &str,
        file_path: &Path,
        symbols: &[Symbol],
    ) -> Result<(), WickedError> {
        let file_path_str = file_path.to_string_lossy().to_string();
        let tx = self.conn.transaction()?;
        {
            let mut del_fts = tx.prepare(
                "DELETE FROM symbols_fts WHERE symbol_id IN (SELECT id FROM symbols WHERE project = ?1 AND file_path = ?2)",
            )?;
            del_fts.execute(params![project, file_path_str])?;
        }
        tx.execute(
            "DELETE FROM symbols WHERE project = ?1 AND file_path = ?2",
            params![project, file_path_str],
        )?;

        {
            let mut insert = tx.prepare(
                "INSERT INTO symbols (
                    project, id, name, qualified_name, type, layer, file_path,
                    line_start, line_end, parent_id, language, domain,
                    inferred_type, description, domains_json, metadata_json
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
            )?;
            let mut insert_fts = tx.prepare(
                "INSERT INTO symbols_fts (project, symbol_id, name, qualified_name, description) VALUES (?1,?2,?3,?4,?5)",
            )?;

            for symbol in symbols {
                insert.execute(params![
                    project,
                    symbol.id,
                    symbol.name,
                    symbol.qualified_name,
                    type_to_str(symbol.symbol_type),
                    layer_to_str(symbol.layer),
                    symbol.file_path.to_string_lossy().to_string(),
                    symbol.line_start,
                    symbol.line_end,
                    symbol.parent_id,
                    symbol.language,
                    domain_to_str(symbol.domain),
                    symbol.inferred_type,
                    symbol.description,
                    serde_json::to_string(&symbol.domains).unwrap_or_else(|_| "[]".to_string()),
                    symbol.metadata.as_ref().map(|v| v.to_string()),
                ])?;
                insert_fts.execute(params![
                    project,
                    symbol.id,
                    symbol.name,
                    symbol.qualified_name,
                    symbol.description,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Remove every symbol belonging to `file_path` (used for removed
    /// files during incremental re-index).
    pub fn delete_file(&mut self, project: &str, file_path: &Path) -> Result<(), WickedError> {
        self.replace_file_symbols(project, file_path, &[])?;
        self.replace_file_raw_refs(project, file_path, &[])?;
        let file_path_str = file_path.to_string_lossy().to_string();
        self.conn.execute(
            "DELETE FROM snapshots WHERE project = ?1 AND path = ?2",
            params![project, file_path_str],
        )?;
        self.conn.execute(
            "DELETE FROM documents WHERE project = ?1 AND path = ?2",
            params![project, file_path_str],
        )?;
        Ok(())
    }

    /// Replace every `RawReference` observed in `file_path`, in one
    /// transaction. Persisted so the Linker Registry can re-run over the
    /// full project's raw references without re-parsing files the Parsing
    /// Pool did not touch this run.
    pub fn replace_file_raw_refs(
        &mut self,
        project: &str,
        file_path: &Path,
        raw_refs: &[crate::model::RawReference],
    ) -> Result<(), WickedError> {
        let file_path_str = file_path.to_string_lossy().to_string();
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM raw_refs WHERE project = ?1 AND file_path = ?2",
            params![project, file_path_str],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO raw_refs (project, file_path, source_qualified_name, target_expression, ref_type_hint, loc_file, loc_line)
                 VALUES (?1,?2,?3,?4,?5,?6,?7)",
            )?;
            for raw in raw_refs {
                insert.execute(params![
                    project,
                    file_path_str,
                    raw.source_qualified_name,
                    raw.target_expression,
                    ref_type_to_str(raw.ref_type_hint),
                    raw.location.file.to_string_lossy().to_string(),
                    raw.location.line,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Every `RawReference` persisted for `project`, across all files —
    /// the input the Linker Registry re-runs over on every index pass.
    pub fn all_raw_refs(&self, project: &str) -> Result<Vec<crate::model::RawReference>, WickedError> {
        let mut stmt = self.conn.prepare(
            "SELECT source_qualified_name, target_expression, ref_type_hint, loc_file, loc_line
             FROM raw_refs WHERE project = ?1",
        )?;
        let rows = stmt.query_map(params![project], |row| {
            let loc_file: String = row.get(3)?;
            Ok(crate::model::RawReference {
                source_qualified_name: row.get(0)?,
                target_expression: row.get(1)?,
                ref_type_hint: ref_type_from_str(&row.get::<_, String>(2)?),
                location: Location {
                    file: PathBuf::from(loc_file),
                    line: row.get(4)?,
                },
            })
        })?;
        collect(rows)
    }

    /// Wipe every row belonging to `project` across all tables. Used at
    /// the start of a full (non-incremental) index run.
    pub fn delete_all_for_project(&mut self, project: &str) -> Result<(), WickedError> {
        let tx = self.conn.transaction()?;
        for table in [
            "symbols",
            "refs",
            "documents",
            "lineage_paths",
            "services",
            "service_connections",
            "snapshots",
            "raw_refs",
        ] {
            tx.execute(&format!("DELETE FROM {table} WHERE project = ?1"), params![project])?;
        }
        {
            let mut del_fts = tx.prepare("DELETE FROM symbols_fts WHERE project = ?1")?;
            del_fts.execute(params![project])?;
        }
        tx.execute("DELETE FROM project_meta WHERE name = ?1", params![project])?;
        tx.commit()?;
        Ok(())
    }

    /// Replace the full reference set for `project` in one transaction.
    /// The Linker Registry always re-runs over the full symbol set, so
    /// refs are replaced wholesale rather than patched per file.
    pub fn replace_all_refs(&mut self, project: &str, refs: &[Reference]) -> Result<(), WickedError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM refs WHERE project = ?1", params![project])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO refs (project, source_id, target_id, target_name, type, confidence, loc_file, loc_line, metadata_json)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            )?;
            for r in refs {
                insert.execute(params![
                    project,
                    r.source_id,
                    r.target_id,
                    r.target_name,
                    ref_type_to_str(r.ref_type),
                    r.confidence.as_str(),
                    r.location.file.to_string_lossy().to_string(),
                    r.location.line,
                    r.metadata.as_ref().map(|v| v.to_string()),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn upsert_snapshot(&self, project: &str, snapshot: &IndexSnapshot) -> Result<(), WickedError> {
        self.conn.execute(
            "INSERT INTO snapshots (project, path, content_hash, mtime, size, parsed_ok, symbol_count, adapter_id)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8)
             ON CONFLICT(project, path) DO UPDATE SET
                content_hash=excluded.content_hash, mtime=excluded.mtime, size=excluded.size,
                parsed_ok=excluded.parsed_ok, symbol_count=excluded.symbol_count, adapter_id=excluded.adapter_id",
            params![
                project,
                snapshot.path.to_string_lossy().to_string(),
                snapshot.content_hash,
                snapshot.mtime,
                snapshot.size,
                snapshot.parsed_ok,
                snapshot.symbol_count,
                snapshot.adapter_id,
            ],
        )?;
        Ok(())
    }

    pub fn remove_snapshot(&self, project: &str, path: &Path) -> Result<(), WickedError> {
        self.conn.execute(
            "DELETE FROM snapshots WHERE project = ?1 AND path = ?2",
            params![project, path.to_string_lossy().to_string()],
        )?;
        Ok(())
    }

    pub fn list_snapshots(&self, project: &str) -> Result<HashMap<PathBuf, IndexSnapshot>, WickedError> {
        let mut stmt = self.conn.prepare(
            "SELECT path, content_hash, mtime, size, parsed_ok, symbol_count, adapter_id FROM snapshots WHERE project = ?1",
        )?;
        let rows = stmt.query_map(params![project], |row| {
            let path: String = row.get(0)?;
            Ok(IndexSnapshot {
                path: PathBuf::from(path),
                content_hash: row.get(1)?,
                mtime: row.get(2)?,
                size: row.get(3)?,
                parsed_ok: row.get(4)?,
                symbol_count: row.get(5)?,
                adapter_id: row.get(6)?,
            })
        })?;
        let mut map = HashMap::new();
        for row in rows {
            let snapshot = row?;
            map.insert(snapshot.path.clone(), snapshot);
        }
        Ok(map)
    }

    pub fn all_symbols(&self, project: &str) -> Result<Vec<Symbol>, WickedError> {
        let mut stmt = self.conn.prepare(&symbol_select_sql("WHERE project = ?1"))?;
        let rows = stmt.query_map(params![project], row_to_symbol)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn get_symbol(&self, project: &str, id: &str) -> Result<Option<Symbol>, WickedError> {
        let mut stmt = self.conn.prepare(&symbol_select_sql("WHERE project = ?1 AND id = ?2"))?;
        Ok(stmt.query_row(params![project, id], row_to_symbol).optional()?)
    }

    pub fn find_symbols_by_exact_id(&self, project: &str, id: &str) -> Result<Vec<Symbol>, WickedError> {
        Ok(self.get_symbol(project, id)?.into_iter().collect())
    }

    pub fn find_symbols_by_name(&self, project: &str, name: &str) -> Result<Vec<Symbol>, WickedError> {
        let mut stmt = self.conn.prepare(&symbol_select_sql("WHERE project = ?1 AND name = ?2"))?;
        let rows = stmt.query_map(params![project, name], row_to_symbol)?;
        collect(rows)
    }

    pub fn find_symbols_by_prefix_ci(&self, project: &str, prefix: &str) -> Result<Vec<Symbol>, WickedError> {
        let pattern = format!("{prefix}%");
        let mut stmt = self.conn.prepare(&symbol_select_sql(
            "WHERE project = ?1 AND name LIKE ?2 ESCAPE '\\' COLLATE NOCASE",
        ))?;
        let rows = stmt.query_map(params![project, pattern], row_to_symbol)?;
        collect(rows)
    }

    pub fn find_symbols_by_qualified_substring_ci(&self, project: &str, substr: &str) -> Result<Vec<Symbol>, WickedError> {
        let pattern = format!("%{substr}%");
        let mut stmt = self.conn.prepare(&symbol_select_sql(
            "WHERE project = ?1 AND qualified_name LIKE ?2 ESCAPE '\\' COLLATE NOCASE",
        ))?;
        let rows = stmt.query_map(params![project, pattern], row_to_symbol)?;
        collect(rows)
    }

    pub fn search_fts(&self, project: &str, query: &str, limit: u32) -> Result<Vec<Symbol>, WickedError> {
        let sanitized: String = query
            .chars()
            .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
            .collect();
        if sanitized.trim().is_empty() {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "SELECT s.project, s.id, s.name, s.qualified_name, s.type, s.layer, s.file_path,
                    s.line_start, s.line_end, s.parent_id, s.language, s.domain,
                    s.inferred_type, s.description, s.domains_json, s.metadata_json
             FROM symbols_fts f
             JOIN symbols s ON s.project = f.project AND s.id = f.symbol_id
             WHERE f.project = ?1 AND symbols_fts MATCH ?2
             ORDER BY rank
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![project, sanitized, limit], row_to_symbol)?;
        collect(rows)
    }

    pub fn refs_for_symbol(&self, project: &str, id: &str) -> Result<Vec<Reference>, WickedError> {
        let mut stmt = self.conn.prepare(
            "SELECT source_id, target_id, target_name, type, confidence, loc_file, loc_line, metadata_json
             FROM refs WHERE project = ?1 AND (source_id = ?2 OR target_id = ?2)",
        )?;
        let rows = stmt.query_map(params![project, id], row_to_reference)?;
        collect(rows)
    }

    pub fn refs_from(&self, project: &str, id: &str) -> Result<Vec<Reference>, WickedError> {
        let mut stmt = self.conn.prepare(
            "SELECT source_id, target_id, target_name, type, confidence, loc_file, loc_line, metadata_json
             FROM refs WHERE project = ?1 AND source_id = ?2",
        )?;
        let rows = stmt.query_map(params![project, id], row_to_reference)?;
        collect(rows)
    }

    pub fn refs_into(&self, project: &str, id: &str) -> Result<Vec<Reference>, WickedError> {
        let mut stmt = self.conn.prepare(
            "SELECT source_id, target_id, target_name, type, confidence, loc_file, loc_line, metadata_json
             FROM refs WHERE project = ?1 AND target_id = ?2",
        )?;
        let rows = stmt.query_map(params![project, id], row_to_reference)?;
        collect(rows)
    }

    /// `count(refs where source_id=s) + count(refs where target_id=s)`,
    /// the canonical hotspot definition.
    pub fn degree_counts(&self, project: &str) -> Result<HashMap<String, u64>, WickedError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, 0 FROM symbols WHERE project = ?1
             UNION ALL
             SELECT source_id, 1 FROM refs WHERE project = ?1
             UNION ALL
             SELECT target_id, 1 FROM refs WHERE project = ?1 AND target_id IS NOT NULL",
        )?;
        let rows = stmt.query_map(params![project], |row| {
            let id: String = row.get(0)?;
            let weight: i64 = row.get(1)?;
            Ok((id, weight))
        })?;
        let mut counts = HashMap::new();
        for row in rows {
            let (id, weight) = row?;
            let entry = counts.entry(id).or_insert(0u64);
            *entry += weight as u64;
        }
        Ok(counts)
    }

    pub fn stats(&self, project: &str) -> Result<HashMap<String, HashMap<String, u64>>, WickedError> {
        let mut out = HashMap::new();
        for (key, column) in [("by_type", "type"), ("by_language", "language"), ("by_layer", "layer"), ("by_domain", "domain")] {
            let sql = format!("SELECT {column}, COUNT(*) FROM symbols WHERE project = ?1 GROUP BY {column}");
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params![project], |row| {
                let k: String = row.get(0)?;
                let v: u64 = row.get(1)?;
                Ok((k, v))
            })?;
            let mut histogram = HashMap::new();
            for row in rows {
                let (k, v) = row?;
                histogram.insert(k, v);
            }
            out.insert(key.to_string(), histogram);
        }
        Ok(out)
    }

    pub fn upsert_project_meta(&self, project: &Project) -> Result<(), WickedError> {
        self.conn.execute(
            "INSERT INTO project_meta (name, root_path, indexed_at, file_count, symbol_count, ref_count, workspace_hash, schema_version)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8)
             ON CONFLICT(name) DO UPDATE SET
                root_path=excluded.root_path, indexed_at=excluded.indexed_at, file_count=excluded.file_count,
                symbol_count=excluded.symbol_count, ref_count=excluded.ref_count,
                workspace_hash=excluded.workspace_hash, schema_version=excluded.schema_version",
            params![
                project.name,
                project.root_path,
                project.indexed_at,
                project.file_count,
                project.symbol_count,
                project.ref_count,
                project.workspace_hash,
                SCHEMA_VERSION,
            ],
        )?;
        Ok(())
    }

    pub fn get_project_meta(&self, project: &str) -> Result<Option<Project>, WickedError> {
        let mut stmt = self.conn.prepare(
            "SELECT name, root_path, indexed_at, file_count, symbol_count, ref_count, workspace_hash, schema_version
             FROM project_meta WHERE name = ?1",
        )?;
        let row = stmt
            .query_row(params![project], |row| {
                let schema_version: String = row.get(7)?;
                Ok((
                    Project {
                        name: row.get(0)?,
                        root_path: row.get(1)?,
                        indexed_at: row.get(2)?,
                        file_count: row.get(3)?,
                        symbol_count: row.get(4)?,
                        ref_count: row.get(5)?,
                        workspace_hash: row.get(6)?,
                    },
                    schema_version,
                ))
            })
            .optional()?;

        match row {
            None => Ok(None),
            Some((project, schema_version)) => {
                if schema_version != SCHEMA_VERSION {
                    return Err(WickedError::SchemaMismatch {
                        found: schema_version,
                        expected: SCHEMA_VERSION.to_string(),
                    });
                }
                Ok(Some(project))
            }
        }
    }

    pub fn upsert_document(&self, project: &str, doc: &Document) -> Result<(), WickedError> {
        self.conn.execute(
            "INSERT INTO documents (project, path, title, frontmatter_json, text, sections_json, mtime, size)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8)
             ON CONFLICT(project, path) DO UPDATE SET
                title=excluded.title, frontmatter_json=excluded.frontmatter_json, text=excluded.text,
                sections_json=excluded.sections_json, mtime=excluded.mtime, size=excluded.size",
            params![
                project,
                doc.path.to_string_lossy().to_string(),
                doc.title,
                serde_json::to_string(&doc.frontmatter).unwrap_or_else(|_| "{}".to_string()),
                doc.text,
                serde_json::to_string(&doc.sections).unwrap_or_else(|_| "[]".to_string()),
                doc.mtime,
                doc.size,
            ],
        )?;
        Ok(())
    }

    pub fn get_document(&self, project: &str, path: &Path) -> Result<Option<Document>, WickedError> {
        let mut stmt = self.conn.prepare(
            "SELECT path, title, frontmatter_json, text, sections_json, mtime, size
             FROM documents WHERE project = ?1 AND path = ?2",
        )?;
        Ok(stmt
            .query_row(params![project, path.to_string_lossy().to_string()], row_to_document)
            .optional()?)
    }

    pub fn upsert_lineage_paths(&mut self, project: &str, paths: &[LineagePath]) -> Result<(), WickedError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM lineage_paths WHERE project = ?1", params![project])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO lineage_paths (project, root_id, sink_id, steps_json, confidence) VALUES (?1,?2,?3,?4,?5)",
            )?;
            for path in paths {
                insert.execute(params![
                    project,
                    path.root_id,
                    path.sink_id,
                    serde_json::to_string(&path.steps).unwrap_or_else(|_| "[]".to_string()),
                    path.confidence.as_str(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn lineage_paths_touching(&self, project: &str, symbol_name: &str) -> Result<Vec<LineagePath>, WickedError> {
        let mut stmt = self.conn.prepare(
            "SELECT root_id, sink_id, steps_json, confidence FROM lineage_paths WHERE project = ?1",
        )?;
        let rows = stmt.query_map(params![project], |row| {
            let root_id: String = row.get(0)?;
            let sink_id: String = row.get(1)?;
            let steps_json: String = row.get(2)?;
            let confidence: String = row.get(3)?;
            Ok((root_id, sink_id, steps_json, confidence))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (root_id, sink_id, steps_json, confidence) = row?;
            let steps: Vec<String> = serde_json::from_str(&steps_json).unwrap_or_default();
            if !steps.iter().any(|step_id| step_id.contains(symbol_name)) {
                continue;
            }
            out.push(LineagePath {
                project: project.to_string(),
                root_id,
                sink_id,
                steps,
                confidence: confidence_from_str(&confidence),
            });
        }
        Ok(out)
    }

    pub fn upsert_service_graph(&mut self, project: &str, graph: &ServiceGraph) -> Result<(), WickedError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM services WHERE project = ?1", params![project])?;
        tx.execute("DELETE FROM service_connections WHERE project = ?1", params![project])?;
        {
            let mut insert_node = tx.prepare(
                "INSERT INTO services (project, name, kind, ports_json, depends_on_json) VALUES (?1,?2,?3,?4,?5)",
            )?;
            for node in &graph.nodes {
                insert_node.execute(params![
                    project,
                    node.name,
                    node.kind,
                    serde_json::to_string(&node.ports).unwrap_or_else(|_| "[]".to_string()),
                    serde_json::to_string(&node.depends_on).unwrap_or_else(|_| "[]".to_string()),
                ])?;
            }
            let mut insert_conn = tx.prepare(
                "INSERT INTO service_connections (project, from_name, to_name, kind) VALUES (?1,?2,?3,?4)",
            )?;
            for conn in &graph.connections {
                insert_conn.execute(params![project, conn.from, conn.to, conn.kind])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_service_graph(&self, project: &str) -> Result<ServiceGraph, WickedError> {
        let mut nodes = Vec::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT name, kind, ports_json, depends_on_json FROM services WHERE project = ?1")?;
            let rows = stmt.query_map(params![project], |row| {
                let name: String = row.get(0)?;
                let kind: String = row.get(1)?;
                let ports_json: String = row.get(2)?;
                let depends_on_json: String = row.get(3)?;
                Ok(ServiceNode {
                    name,
                    kind,
                    ports: serde_json::from_str(&ports_json).unwrap_or_default(),
                    depends_on: serde_json::from_str(&depends_on_json).unwrap_or_default(),
                })
            })?;
            for row in rows {
                nodes.push(row?);
            }
        }

        let mut connections = Vec::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT from_name, to_name, kind FROM service_connections WHERE project = ?1")?;
            let rows = stmt.query_map(params![project], |row| {
                Ok(ServiceConnection {
                    from: row.get(0)?,
                    to: row.get(1)?,
                    kind: row.get(2)?,
                })
            })?;
            for row in rows {
                connections.push(row?);
            }
        }

        Ok(ServiceGraph { nodes, connections })
    }

    pub fn source_for_symbol(&self, project: &str, id: &str) -> Result<Option<(PathBuf, u32, u32)>, WickedError> {
        let symbol = self.get_symbol(project, id)?;
        Ok(symbol.map(|s| (s.file_path, s.line_start, s.line_end)))
    }
}

fn symbol_select_sql(filter: &str) -> String {
    format!(
        "SELECT project, id, name, qualified_name, type, layer, file_path,
                line_start, line_end, parent_id, language, domain,
                inferred_type, description, domains_json, metadata_json
         FROM symbols {filter}"
    )
}

fn collect<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>, WickedError> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn row_to_symbol(row: &rusqlite::Row) -> rusqlite::Result<Symbol> {
    let file_path: String = row.get(6)?;
    let domains_json: String = row.get(14)?;
    let metadata_json: Option<String> = row.get(15)?;
    Ok(Symbol {
        id: row.get(1)?,
        name: row.get(2)?,
        qualified_name: row.get(3)?,
        symbol_type: type_from_str(&row.get::<_, String>(4)?),
        layer: layer_from_str(&row.get::<_, String>(5)?),
        file_path: PathBuf::from(file_path),
        line_start: row.get(7)?,
        line_end: row.get(8)?,
        parent_id: row.get(9)?,
        language: row.get(10)?,
        domain: domain_from_str(&row.get::<_, String>(11)?),
        inferred_type: row.get(12)?,
        description: row.get(13)?,
        domains: serde_json::from_str(&domains_json).unwrap_or_default(),
        metadata: metadata_json.and_then(|s| serde_json::from_str(&s).ok()),
    })
}

fn row_to_reference(row: &rusqlite::Row) -> rusqlite::Result<Reference> {
    let loc_file: String = row.get(5)?;
    let metadata_json: Option<String> = row.get(7)?;
    Ok(Reference {
        source_id: row.get(0)?,
        target_id: row.get(1)?,
        target_name: row.get(2)?,
        ref_type: ref_type_from_str(&row.get::<_, String>(3)?),
        confidence: confidence_from_str(&row.get::<_, String>(4)?),
        location: Location {
            file: PathBuf::from(loc_file),
            line: row.get(6)?,
        },
        metadata: metadata_json.and_then(|s| serde_json::from_str(&s).ok()),
    })
}

fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<Document> {
    let path: String = row.get(0)?;
    let frontmatter_json: String = row.get(2)?;
    let sections_json: String = row.get(4)?;
    Ok(Document {
        path: PathBuf::from(path),
        title: row.get(1)?,
        frontmatter: serde_json::from_str(&frontmatter_json).unwrap_or_default(),
        text: row.get(3)?,
        sections: serde_json::from_str(&sections_json).unwrap_or_default(),
        mtime: row.get(5)?,
        size: row.get(6)?,
    })
}

fn type_to_str(t: SymbolType) -> String {
    serde_json::to_value(t).ok().and_then(|v| v.as_str().map(String::from)).unwrap_or_default()
}

fn type_from_str(s: &str) -> SymbolType {
    serde_json::from_value(serde_json::Value::String(s.to_string())).unwrap_or(SymbolType::Variable)
}

fn layer_to_str(l: SymbolLayer) -> String {
    serde_json::to_value(l).ok().and_then(|v| v.as_str().map(String::from)).unwrap_or_default()
}

fn layer_from_str(s: &str) -> SymbolLayer {
    serde_json::from_value(serde_json::Value::String(s.to_string())).unwrap_or(SymbolLayer::Backend)
}

fn domain_to_str(d: crate::model::Domain) -> String {
    serde_json::to_value(d).ok().and_then(|v| v.as_str().map(String::from)).unwrap_or_default()
}

fn domain_from_str(s: &str) -> crate::model::Domain {
    serde_json::from_value(serde_json::Value::String(s.to_string())).unwrap_or(crate::model::Domain::Code)
}

fn ref_type_to_str(t: ReferenceType) -> &'static str {
    t.forward_label()
}

fn ref_type_from_str(s: &str) -> ReferenceType {
    ReferenceType::normalize(s).unwrap_or(ReferenceType::Calls)
}

fn confidence_from_str(s: &str) -> Confidence {
    match s {
        "high" => Confidence::High,
        "medium" => Confidence::Medium,
        "low" => Confidence::Low,
        _ => Confidence::Inferred,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Domain, SymbolType};

    fn sample_symbol() -> Symbol {
        Symbol::new(
            PathBuf::from("src/lib.rs"),
            "add".to_string(),
            "crate::add".to_string(),
            SymbolType::Function,
            "rust".to_string(),
            1,
            3,
        )
    }

    #[test]
    fn replace_file_symbols_round_trips_and_is_queryable() {
        let mut store = Store::open_in_memory().unwrap();
        let symbol = sample_symbol();
        store.replace_file_symbols("default", &PathBuf::from("src/lib.rs"), &[symbol.clone()]).unwrap();

        let fetched = store.get_symbol("default", &symbol.id).unwrap().unwrap();
        assert_eq!(fetched.name, "add");
        assert_eq!(fetched.domain, Domain::Code);

        let by_name = store.find_symbols_by_name("default", "add").unwrap();
        assert_eq!(by_name.len(), 1);
    }

    #[test]
    fn replace_file_symbols_clears_prior_symbols_for_same_file() {
        let mut store = Store::open_in_memory().unwrap();
        let symbol = sample_symbol();
        store.replace_file_symbols("default", &PathBuf::from("src/lib.rs"), &[symbol.clone()]).unwrap();
        store.replace_file_symbols("default", &PathBuf::from("src/lib.rs"), &[]).unwrap();

        assert!(store.get_symbol("default", &symbol.id).unwrap().is_none());
    }

    #[test]
    fn search_fts_matches_description() {
        let mut store = Store::open_in_memory().unwrap();
        let mut symbol = sample_symbol();
        symbol.description = Some("adds two numbers together".to_string());
        store.replace_file_symbols("default", &PathBuf::from("src/lib.rs"), &[symbol]).unwrap();

        let results = store.search_fts("default", "numbers", 10).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn project_isolation_keeps_symbols_separate() {
        let mut store = Store::open_in_memory().unwrap();
        let symbol = sample_symbol();
        store.replace_file_symbols("alpha", &PathBuf::from("src/lib.rs"), &[symbol.clone()]).unwrap();

        assert!(store.get_symbol("beta", &symbol.id).unwrap().is_none());
        assert!(store.get_symbol("alpha", &symbol.id).unwrap().is_some());
    }

    #[test]
    fn raw_refs_round_trip_across_files() {
        let mut store = Store::open_in_memory().unwrap();
        let raw = crate::model::RawReference {
            source_qualified_name: "Foo.bar".to_string(),
            target_expression: "Helper.util".to_string(),
            ref_type_hint: ReferenceType::Calls,
            location: Location { file: PathBuf::from("src/a.rs"), line: 4 },
        };
        store.replace_file_raw_refs("default", &PathBuf::from("src/a.rs"), &[raw.clone()]).unwrap();

        let all = store.all_raw_refs("default").unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].target_expression, "Helper.util");

        store.replace_file_raw_refs("default", &PathBuf::from("src/a.rs"), &[]).unwrap();
        assert!(store.all_raw_refs("default").unwrap().is_empty());
    }

    #[test]
    fn delete_all_for_project_clears_every_table() {
        let mut store = Store::open_in_memory().unwrap();
        let symbol = sample_symbol();
        store.replace_file_symbols("alpha", &PathBuf::from("src/lib.rs"), &[symbol.clone()]).unwrap();
        store.replace_file_raw_refs("alpha", &PathBuf::from("src/lib.rs"), &[crate::model::RawReference {
            source_qualified_name: "crate::add".to_string(),
            target_expression: "crate::helper".to_string(),
            ref_type_hint: ReferenceType::Calls,
            location: Location { file: PathBuf::from("src/lib.rs"), line: 2 },
        }]).unwrap();

        store.delete_all_for_project("alpha").unwrap();

        assert!(store.get_symbol("alpha", &symbol.id).unwrap().is_none());
        assert!(store.all_raw_refs("alpha").unwrap().is_empty());
        assert!(store.get_project_meta("alpha").unwrap().is_none());
    }

    #[test]
    fn degree_counts_match_source_and_target_occurrences() {
        let mut store = Store::open_in_memory().unwrap();
        let a = sample_symbol();
        let mut b = sample_symbol();
        b.id = "src/lib.rs::crate::sub::function@10".to_string();
        b.qualified_name = "crate::sub".to_string();
        b.name = "sub".to_string();
        store.replace_file_symbols("default", &PathBuf::from("src/lib.rs"), &[a.clone(), b.clone()]).unwrap();

        let reference = Reference {
            source_id: a.id.clone(),
            target_id: Some(b.id.clone()),
            target_name: b.name.clone(),
            ref_type: ReferenceType::Calls,
            confidence: Confidence::High,
            location: Location { file: PathBuf::from("src/lib.rs"), line: 2 },
            metadata: None,
        };
        store.replace_all_refs("default", &[reference]).unwrap();

        let counts = store.degree_counts("default").unwrap();
        assert_eq!(*counts.get(&a.id).unwrap(), 1);
        assert_eq!(*counts.get(&b.id).unwrap(), 1);
    }
}
