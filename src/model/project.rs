use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Metadata record for a named, isolated index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub root_path: String,
    /// ISO-8601 timestamp of the last successful index run.
    pub indexed_at: String,
    pub file_count: u64,
    pub symbol_count: u64,
    pub ref_count: u64,
    /// 12-char hex digest of the workspace content (see
    /// `discovery::workspace_hash`).
    pub workspace_hash: String,
}

/// Per-file record used to diff the filesystem against the prior index
/// state and determine the incremental change set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub path: PathBuf,
    pub content_hash: String,
    pub mtime: i64,
    pub size: u64,
    pub parsed_ok: bool,
    pub symbol_count: u64,
    pub adapter_id: String,
}
