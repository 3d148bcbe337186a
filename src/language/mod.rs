//! Language adapter registry.
//!
//! Maps a file extension to a [`LanguageAdapter`] and runs it over parsed
//! source. Each adapter owns its own tree-sitter grammar and produces the
//! unified `Symbol`/`RawReference` pairs described in the data model;
//! resolving `RawReference`s into concrete `Reference` edges is the
//! Linker Registry's job (`crate::linker`), not the adapter's.
//!
//! The registry itself is a static array, built once at process start and
//! read-only thereafter — matching the "read-heavy, occasional
//! registration at startup" resource policy.

use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

use tree_sitter::Tree;

use crate::model::{RawReference, Symbol};

mod cpp;
mod csharp;
mod go;
mod java;
mod javascript;
mod php;
mod python;
mod ruby;
mod rust;
mod typescript;
mod view;

pub mod orm;

/// Error produced by a language adapter. Kept internal to the parsing
/// layer; callers see only `parsed_ok=false` in the resulting snapshot.
#[derive(Debug)]
pub struct BackendError {
    message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "language adapter error: {}", self.message)
    }
}

impl Error for BackendError {}

impl From<tree_sitter::LanguageError> for BackendError {
    fn from(err: tree_sitter::LanguageError) -> Self {
        BackendError::new(err.to_string())
    }
}

impl From<tree_sitter::QueryError> for BackendError {
    fn from(err: tree_sitter::QueryError) -> Self {
        BackendError::new(err.to_string())
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// A parsed file: the tree-sitter tree plus enough metadata for adapters
/// to compute qualified names and line numbers from node positions.
pub struct ParsedFile {
    pub language_id: &'static str,
    pub path: PathBuf,
    pub tree: Tree,
    pub source: String,
}

impl ParsedFile {
    pub fn new(language_id: &'static str, path: &Path, tree: Tree, source: String) -> Self {
        Self {
            language_id,
            path: path.to_path_buf(),
            tree,
            source,
        }
    }

    pub fn has_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Convert a tree-sitter byte-oriented node position into a 1-based line
/// number, the unit every Symbol/Location uses.
pub(crate) fn node_line_start(node: &tree_sitter::Node) -> u32 {
    node.start_position().row as u32 + 1
}

pub(crate) fn node_line_end(node: &tree_sitter::Node) -> u32 {
    node.end_position().row as u32 + 1
}

/// Extract the text of `node` from `source`, or an empty string if the
/// byte range is somehow invalid (should not happen on a clean parse).
pub(crate) fn node_text<'a>(node: &tree_sitter::Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// Leading-comment extraction shared across every adapter: walks upward
/// from `start_line - 1` collecting contiguous `//`, `/* */`, `#`, or
/// `"""`-delimited lines, stopping at the first blank or unrelated line.
/// Returns the normalized comment text (delimiters stripped).
pub(crate) fn collect_leading_comment(source: &str, start_line: u32) -> Option<String> {
    if start_line <= 1 {
        return None;
    }
    let lines: Vec<&str> = source.lines().collect();
    let mut idx = (start_line - 1).saturating_sub(1) as usize;
    let mut collected: Vec<String> = Vec::new();

    loop {
        if idx >= lines.len() {
            break;
        }
        let trimmed = lines[idx].trim();
        if trimmed.is_empty() {
            break;
        }
        let stripped = strip_comment_delimiters(trimmed);
        match stripped {
            Some(text) => collected.push(text),
            None => break,
        }
        if idx == 0 {
            break;
        }
        idx -= 1;
    }

    if collected.is_empty() {
        None
    } else {
        collected.reverse();
        Some(collected.join("\n"))
    }
}

fn strip_comment_delimiters(line: &str) -> Option<String> {
    if let Some(rest) = line.strip_prefix("///") {
        return Some(rest.trim().to_string());
    }
    if let Some(rest) = line.strip_prefix("//") {
        return Some(rest.trim().to_string());
    }
    if let Some(rest) = line.strip_prefix("#") {
        return Some(rest.trim().to_string());
    }
    if line.starts_with("/*") || line.starts_with("*/") {
        let body = line
            .trim_start_matches("/**")
            .trim_start_matches("/*")
            .trim_end_matches("*/")
            .trim();
        return Some(body.to_string());
    }
    if let Some(rest) = line.strip_prefix('*') {
        return Some(rest.trim().to_string());
    }
    if line == "\"\"\"" || line == "'''" {
        return Some(String::new());
    }
    if line.starts_with("\"\"\"") || line.starts_with("'''") {
        let body = line.trim_matches(|c| c == '"' || c == '\'').trim();
        return Some(body.to_string());
    }
    None
}

/// A derived heuristic category (`test`, `controller`, `service`,
/// `repository`, `utility`, …) attached to a symbol's `inferred_type`
/// field. Adapters compute this from path conventions and naming.
pub(crate) fn infer_type_from_path_and_name(path: &Path, name: &str) -> Option<String> {
    let path_str = path.to_string_lossy().to_ascii_lowercase();
    let lower_name = name.to_ascii_lowercase();

    if path_str.contains("/test") || path_str.contains("test_") || lower_name.ends_with("test") {
        Some("test".to_string())
    } else if lower_name.ends_with("controller") {
        Some("controller".to_string())
    } else if lower_name.ends_with("service") {
        Some("service".to_string())
    } else if lower_name.ends_with("repository") || lower_name.ends_with("dao") {
        Some("repository".to_string())
    } else if lower_name.ends_with("util") || lower_name.ends_with("utils") || lower_name.ends_with("helper") {
        Some("utility".to_string())
    } else {
        None
    }
}

/// Path-derived folksonomy tags used by the `categories` query verb
/// (e.g. `src/billing/invoice.rs` → `["billing"]`).
pub(crate) fn derive_domains_from_path(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| c.as_os_str().to_str())
        .filter(|c| {
            !matches!(
                *c,
                "src" | "lib" | "test" | "tests" | "main" | "app" | "." | ".."
            )
        })
        .take(3)
        .map(|c| c.to_string())
        .collect()
}

/// Implemented by every per-language adapter. `parse` is the single-entry
/// contract: source text in, symbols and raw references out. Adapters
/// never resolve references themselves — that is the Linker Registry's
/// job over the full project symbol set.
pub trait LanguageAdapter: Sync + Send {
    /// Stable language identifier (e.g. `"rust"`, `"typescript"`).
    fn id(&self) -> &'static str;

    /// File extensions (without leading dots) this adapter claims.
    fn file_extensions(&self) -> &'static [&'static str];

    /// Parse source into a syntax tree. Returns an error if tree-sitter
    /// fails outright; callers treat tree-sitter error nodes within an
    /// otherwise-successful parse as a softer signal (still indexed, but
    /// the file is flagged for review) rather than a hard failure.
    fn parse_file(&self, path: &Path, source: &str) -> BackendResult<ParsedFile>;

    /// Extract top-level structural symbols and raw (unresolved)
    /// references from an already-parsed file.
    fn extract(&self, file: &ParsedFile) -> BackendResult<(Vec<Symbol>, Vec<RawReference>)>;
}

/// All statically-registered adapters. New languages are added here and
/// nowhere else; the registry performs no dynamic loading.
static ADAPTERS: [&dyn LanguageAdapter; 11] = [
    &rust::BACKEND,
    &typescript::BACKEND,
    &javascript::BACKEND,
    &cpp::BACKEND,
    &python::BACKEND,
    &java::BACKEND,
    &csharp::BACKEND,
    &go::BACKEND,
    &ruby::BACKEND,
    &php::BACKEND,
    &view::BACKEND,
];

/// Look up an adapter by file extension (case-insensitive).
pub fn adapter_for_path(path: &Path) -> Option<&'static dyn LanguageAdapter> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    ADAPTERS.iter().copied().find(|adapter| {
        adapter
            .file_extensions()
            .iter()
            .any(|e| e.eq_ignore_ascii_case(&ext))
    })
}

/// Look up an adapter by its logical language id, accepting a few common
/// aliases (`ts`/`tsx`, `js`/`jsx`, `cpp`/`c++`, `cs`, `rb`, `py`).
pub fn adapter_for_language(id: &str) -> Option<&'static dyn LanguageAdapter> {
    let id = id.to_ascii_lowercase();
    let canonical = match id.as_str() {
        "ts" | "tsx" => "typescript",
        "js" | "jsx" => "javascript",
        "cpp" | "c++" | "cc" | "cxx" => "cpp",
        "rs" => "rust",
        "py" => "python",
        "cs" | "c#" => "csharp",
        "rb" => "ruby",
        other => other,
    };
    ADAPTERS
        .iter()
        .copied()
        .find(|adapter| adapter.id().eq_ignore_ascii_case(canonical))
}

/// Parse and extract in one call, the convenience entry point used by
/// the Parsing Pool for every file in the change set.
pub fn parse_and_extract(
    adapter: &dyn LanguageAdapter,
    path: &Path,
    source: &str,
) -> BackendResult<(Vec<Symbol>, Vec<RawReference>)> {
    let parsed = adapter.parse_file(path, source)?;
    adapter.extract(&parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_maps_extensions_to_adapters() {
        assert_eq!(adapter_for_path(Path::new("a.rs")).unwrap().id(), "rust");
        assert_eq!(adapter_for_path(Path::new("a.ts")).unwrap().id(), "typescript");
        assert_eq!(adapter_for_path(Path::new("a.tsx")).unwrap().id(), "typescript");
        assert_eq!(adapter_for_path(Path::new("a.js")).unwrap().id(), "javascript");
        assert_eq!(adapter_for_path(Path::new("a.py")).unwrap().id(), "python");
        assert_eq!(adapter_for_path(Path::new("a.java")).unwrap().id(), "java");
        assert_eq!(adapter_for_path(Path::new("a.cs")).unwrap().id(), "csharp");
        assert_eq!(adapter_for_path(Path::new("a.go")).unwrap().id(), "go");
        assert_eq!(adapter_for_path(Path::new("a.rb")).unwrap().id(), "ruby");
        assert_eq!(adapter_for_path(Path::new("a.php")).unwrap().id(), "php");
        assert_eq!(adapter_for_path(Path::new("a.cpp")).unwrap().id(), "cpp");
        assert!(adapter_for_path(Path::new("a.unknown")).is_none());
    }

    #[test]
    fn registry_maps_language_aliases() {
        assert_eq!(adapter_for_language("ts").unwrap().id(), "typescript");
        assert_eq!(adapter_for_language("js").unwrap().id(), "javascript");
        assert_eq!(adapter_for_language("c++").unwrap().id(), "cpp");
        assert_eq!(adapter_for_language("py").unwrap().id(), "python");
        assert_eq!(adapter_for_language("rb").unwrap().id(), "ruby");
    }

    #[test]
    fn collect_leading_comment_strips_delimiters() {
        let source = "// first line\n// second line\nfn foo() {}\n";
        let comment = collect_leading_comment(source, 3).unwrap();
        assert_eq!(comment, "first line\nsecond line");
    }

    #[test]
    fn infer_type_from_path_and_name_detects_controller() {
        assert_eq!(
            infer_type_from_path_and_name(Path::new("src/user_controller.rs"), "UserController"),
            Some("controller".to_string())
        );
    }
}
