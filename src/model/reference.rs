use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::Confidence;

/// Canonical, plural-lowercase reference type. History drifted between
/// singular and plural spellings (`call` vs `calls`); this enum fixes the
/// canonical plural spelling and callers must normalize incoming strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    Calls,
    Imports,
    Extends,
    Implements,
    DependsOn,
    BindsTo,
    MapsTo,
    ReturnsView,
    Renders,
    Documents,
    ReadsFrom,
    WritesTo,
}

impl ReferenceType {
    /// Normalize a historical singular spelling (or other casing) to the
    /// canonical plural-lowercase form. Returns `None` if unrecognized.
    pub fn normalize(raw: &str) -> Option<Self> {
        let lowered = raw.to_ascii_lowercase();
        let plural = if lowered.ends_with('s') {
            lowered.clone()
        } else {
            format!("{lowered}s")
        };
        match plural.as_str() {
            "calls" => Some(Self::Calls),
            "imports" => Some(Self::Imports),
            "extends" => Some(Self::Extends),
            "implements" => Some(Self::Implements),
            "depends_ons" | "depends_on" => Some(Self::DependsOn),
            "binds_tos" | "binds_to" => Some(Self::BindsTo),
            "maps_tos" | "maps_to" => Some(Self::MapsTo),
            "returns_views" | "returns_view" => Some(Self::ReturnsView),
            "renders" => Some(Self::Renders),
            "documents" => Some(Self::Documents),
            "reads_froms" | "reads_from" => Some(Self::ReadsFrom),
            "writes_tos" | "writes_to" => Some(Self::WritesTo),
            _ => None,
        }
    }

    /// Inverse relation label used when grouping `refs()` query output
    /// (e.g. `calls` on the source side pairs with `called_by` on the
    /// target side).
    pub fn inverse_label(self) -> &'static str {
        match self {
            Self::Calls => "called_by",
            Self::Imports => "imported_by",
            Self::Extends => "extended_by",
            Self::Implements => "implemented_by",
            Self::DependsOn => "depended_on_by",
            Self::BindsTo => "bound_by",
            Self::MapsTo => "mapped_by",
            Self::ReturnsView => "returned_by",
            Self::Renders => "rendered_by",
            Self::Documents => "documented_by",
            Self::ReadsFrom => "read_by",
            Self::WritesTo => "written_by",
        }
    }

    pub fn forward_label(self) -> &'static str {
        match self {
            Self::Calls => "calls",
            Self::Imports => "imports",
            Self::Extends => "extends",
            Self::Implements => "implements",
            Self::DependsOn => "depends_on",
            Self::BindsTo => "binds_to",
            Self::MapsTo => "maps_to",
            Self::ReturnsView => "returns_view",
            Self::Renders => "renders",
            Self::Documents => "documents",
            Self::ReadsFrom => "reads_from",
            Self::WritesTo => "writes_to",
        }
    }
}

/// File + line where a reference was observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub file: PathBuf,
    pub line: u32,
}

/// A directed, typed edge between two symbols. `target_id` may be `None`
/// for an **orphan reference** — the linker could not bind the target to
/// any indexed symbol. Orphan references are preserved, never dropped:
/// they are evidence that a dependency exists outside the indexed scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub source_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    /// The unresolved target expression/name, retained so that orphan
    /// references can still show *what* was referenced.
    pub target_name: String,
    #[serde(rename = "type")]
    pub ref_type: ReferenceType,
    pub confidence: Confidence,
    pub location: Location,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Reference {
    pub fn is_orphan(&self) -> bool {
        self.target_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_accepts_singular_and_plural() {
        assert_eq!(ReferenceType::normalize("call"), Some(ReferenceType::Calls));
        assert_eq!(ReferenceType::normalize("calls"), Some(ReferenceType::Calls));
        assert_eq!(
            ReferenceType::normalize("depends_on"),
            Some(ReferenceType::DependsOn)
        );
        assert_eq!(ReferenceType::normalize("bogus"), None);
    }

    #[test]
    fn inverse_labels_are_distinct_from_forward() {
        assert_ne!(
            ReferenceType::Calls.forward_label(),
            ReferenceType::Calls.inverse_label()
        );
    }
}
