//! Unified symbol-and-reference data model.
//!
//! Every adapter, linker, and store implementation in this crate speaks in
//! terms of the types defined here: `Symbol`, `Reference`, `Document`,
//! `LineagePath`, `ServiceNode`/`ServiceConnection`, `Project`, and
//! `IndexSnapshot`. These are the stable JSON API surface returned by the
//! query engine and gateway.

pub mod document;
pub mod project;
pub mod reference;
pub mod service;
pub mod symbol;

pub use document::{Document, DocumentSection};
pub use project::{IndexSnapshot, Project};
pub use reference::{Location, Reference, ReferenceType};
pub use service::{ServiceConnection, ServiceGraph, ServiceNode};
pub use symbol::{Confidence, Domain, Symbol, SymbolLayer, SymbolType};

use serde::{Deserialize, Serialize};

/// A precomputed, immutable source-to-sink walk through the reference
/// graph (UI binding → controller → service → repository → entity field →
/// database column, or similar chains for other stacks).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineagePath {
    pub project: String,
    pub root_id: String,
    pub sink_id: String,
    pub steps: Vec<String>,
    pub confidence: Confidence,
}

/// A raw, unresolved reference emitted directly by a language adapter.
///
/// The linker registry consumes these during the second indexing pass and
/// turns them into concrete `Reference` values with resolved (or orphaned)
/// targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawReference {
    /// Qualified name of the symbol that owns this reference.
    pub source_qualified_name: String,
    /// Unresolved target expression as written in source (e.g.
    /// `${person.address.city}`, `com.acme.User`, `"user/login"`).
    pub target_expression: String,
    /// Hint about what kind of reference this might resolve to.
    pub ref_type_hint: ReferenceType,
    /// File and line where the reference was observed.
    pub location: Location,
}

/// Project name validation per the wire contract: alphanumeric + hyphen,
/// starting with an alphanumeric character, length 1..=64. Empty or
/// `"default"` selects the reserved legacy flat project.
pub fn validate_project_name(name: &str) -> Result<(), crate::error::WickedError> {
    if name.is_empty() || name == "default" {
        return Ok(());
    }
    if name.len() > 64 {
        return Err(crate::error::WickedError::InputError(format!(
            "project name too long: {} (max 64)",
            name.len()
        )));
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap();
    if !first.is_ascii_alphanumeric() {
        return Err(crate::error::WickedError::InputError(format!(
            "project name must start with an alphanumeric character: {name}"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(crate::error::WickedError::InputError(format!(
            "project name must be alphanumeric with hyphens only: {name}"
        )));
    }
    Ok(())
}

/// Normalize an empty or absent project name to the reserved `"default"`
/// legacy flat project.
pub fn normalize_project(name: Option<&str>) -> String {
    match name {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => "default".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_project_name_accepts_alphanumeric_and_hyphen() {
        assert!(validate_project_name("alpha").is_ok());
        assert!(validate_project_name("alpha-2").is_ok());
        assert!(validate_project_name("default").is_ok());
        assert!(validate_project_name("").is_ok());
    }

    #[test]
    fn validate_project_name_rejects_bad_chars() {
        assert!(validate_project_name("alpha_beta").is_err());
        assert!(validate_project_name("-alpha").is_err());
        assert!(validate_project_name(&"a".repeat(65)).is_err());
    }

    #[test]
    fn normalize_project_defaults_empty_to_default() {
        assert_eq!(normalize_project(None), "default");
        assert_eq!(normalize_project(Some("")), "default");
        assert_eq!(normalize_project(Some("alpha")), "alpha");
    }
}
