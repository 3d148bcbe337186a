//! Linker Registry.
//!
//! Runs registered Linkers in ascending priority order over the full
//! project symbol set, turning each adapter's RawReferences into typed,
//! confidence-scored `Reference` edges. Orphan references — a raw
//! reference whose target cannot be resolved — are never dropped; they
//! come back as a `Reference` with `target_id: None` and
//! `Confidence::Inferred` so the graph still records that a dependency
//! exists outside the indexed scope.

use std::collections::HashMap;

use crate::model::reference::{Location, ReferenceType};
use crate::model::{Confidence, RawReference, Reference, Symbol};

mod call_import;
mod controller;
mod el_resolver;
mod frontend;

pub use call_import::CallImportLinker;
pub use controller::ControllerLinker;
pub use el_resolver::ElResolverLinker;
pub use frontend::FrontendLinker;

/// Read-only index over a project's full symbol set, shared by every
/// linker during a single linking pass.
pub struct LinkContext<'a> {
    pub symbols: &'a [Symbol],
    by_qualified_name: HashMap<&'a str, &'a Symbol>,
    by_name: HashMap<&'a str, Vec<&'a Symbol>>,
}

impl<'a> LinkContext<'a> {
    pub fn new(symbols: &'a [Symbol]) -> Self {
        let mut by_qualified_name = HashMap::new();
        let mut by_name: HashMap<&str, Vec<&Symbol>> = HashMap::new();
        for symbol in symbols {
            by_qualified_name.insert(symbol.qualified_name.as_str(), symbol);
            by_name.entry(symbol.name.as_str()).or_default().push(symbol);
        }
        Self {
            symbols,
            by_qualified_name,
            by_name,
        }
    }

    pub fn by_qualified_name(&self, name: &str) -> Option<&'a Symbol> {
        self.by_qualified_name.get(name).copied()
    }

    /// Deterministic: when multiple symbols share a bare name, the one
    /// with the lexicographically smallest id wins so resolution is
    /// stable across runs.
    pub fn by_name(&self, name: &str) -> Option<&'a Symbol> {
        self.by_name.get(name).and_then(|candidates| {
            candidates.iter().min_by_key(|s| s.id.as_str()).copied()
        })
    }

    pub fn by_name_ci(&self, name: &str) -> Option<&'a Symbol> {
        let lowered = name.to_ascii_lowercase();
        self.symbols
            .iter()
            .filter(|s| s.name.to_ascii_lowercase() == lowered)
            .min_by_key(|s| s.id.as_str())
    }

    pub fn qualified_name_contains_ci(&self, needle: &str) -> Option<&'a Symbol> {
        let needle = needle.to_ascii_lowercase();
        self.symbols
            .iter()
            .filter(|s| s.qualified_name.to_ascii_lowercase().contains(&needle))
            .min_by_key(|s| s.id.as_str())
    }
}

/// A resolution strategy that converts a subset of RawReferences (by
/// `ref_type_hint`) into concrete References. Linkers are an open set —
/// the registry depends only on this capability surface.
pub trait Linker: Sync + Send {
    fn name(&self) -> &'static str;
    /// Lower runs first.
    fn priority(&self) -> u32;
    fn link_all(&self, ctx: &LinkContext, raw_refs: &[RawReference]) -> Vec<Reference>;
}

/// Build an orphan `Reference` for a raw reference nothing could resolve.
/// Always a `Reference`, never a dropped row — this is what makes the
/// orphan-preservation property hold.
pub(crate) fn orphan_reference(source_id: String, raw: &RawReference) -> Reference {
    Reference {
        source_id,
        target_id: None,
        target_name: raw.target_expression.clone(),
        ref_type: raw.ref_type_hint,
        confidence: Confidence::Inferred,
        location: raw.location.clone(),
        metadata: None,
    }
}

pub(crate) fn resolved_reference(
    source_id: String,
    target: &Symbol,
    raw: &RawReference,
    confidence: Confidence,
) -> Reference {
    Reference {
        source_id,
        target_id: Some(target.id.clone()),
        target_name: target.name.clone(),
        ref_type: raw.ref_type_hint,
        confidence,
        location: raw.location.clone(),
        metadata: None,
    }
}

/// Resolve a RawReference's `source_qualified_name` to a source symbol id.
/// Adapters emit qualified names rather than ids (the id also needs the
/// symbol type and line, which the adapter's own RawReference does not
/// carry), so every linker performs this same lookup first.
pub(crate) fn source_id_for(ctx: &LinkContext, raw: &RawReference) -> String {
    ctx.by_qualified_name(&raw.source_qualified_name)
        .or_else(|| ctx.by_name(&raw.source_qualified_name))
        .map(|s| s.id.clone())
        .unwrap_or_else(|| raw.source_qualified_name.clone())
}

/// All statically-registered linkers, in priority order low-to-high
/// (`sort_linkers` re-sorts defensively so registration order here
/// doesn't have to match declared priority).
fn registered_linkers() -> Vec<Box<dyn Linker>> {
    vec![
        Box::new(CallImportLinker),
        Box::new(ElResolverLinker),
        Box::new(ControllerLinker),
        Box::new(FrontendLinker),
    ]
}

/// Internal key for conflict resolution: References for the same
/// `(source_id, target_id, type)` tuple collapse to one, keeping the
/// highest confidence and breaking ties by lowest-priority linker id.
/// Orphan rows (`target_id: None`) never collapse against each other —
/// each carries its own `target_name` in the key, since two distinct
/// unresolved expressions from the same source and ref type (e.g. two
/// separate `Calls` orphans) are different edges, not duplicates.
#[derive(Hash, PartialEq, Eq)]
struct ConflictKey {
    source_id: String,
    target_id: Option<String>,
    ref_type: ReferenceType,
    orphan_target_name: Option<String>,
}

/// Run every registered linker (lowest priority first) over the full
/// symbol set and raw reference list, then resolve same-tuple conflicts.
pub fn run_linkers(symbols: &[Symbol], raw_refs: &[RawReference]) -> Vec<Reference> {
    let ctx = LinkContext::new(symbols);
    let mut linkers = registered_linkers();
    linkers.sort_by_key(|l| l.priority());

    let mut best: HashMap<ConflictKey, (Reference, u32)> = HashMap::new();

    for linker in &linkers {
        let priority = linker.priority();
        for reference in linker.link_all(&ctx, raw_refs) {
            let key = ConflictKey {
                source_id: reference.source_id.clone(),
                target_id: reference.target_id.clone(),
                ref_type: reference.ref_type,
                orphan_target_name: if reference.target_id.is_none() {
                    Some(reference.target_name.clone())
                } else {
                    None
                },
            };
            match best.get(&key) {
                Some((existing, existing_priority)) => {
                    let replace = reference.confidence > existing.confidence
                        || (reference.confidence == existing.confidence && priority < *existing_priority);
                    if replace {
                        best.insert(key, (reference, priority));
                    }
                }
                None => {
                    best.insert(key, (reference, priority));
                }
            }
        }
    }

    let mut out: Vec<Reference> = best.into_values().map(|(r, _)| r).collect();
    out.sort_by(|a, b| {
        a.source_id
            .cmp(&b.source_id)
            .then(a.target_name.cmp(&b.target_name))
            .then_with(|| format!("{:?}", a.ref_type).cmp(&format!("{:?}", b.ref_type)))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SymbolType;
    use std::path::PathBuf;

    fn loc() -> Location {
        Location {
            file: PathBuf::from("a.rs"),
            line: 1,
        }
    }

    #[test]
    fn run_linkers_preserves_orphan_reference() {
        let symbols: Vec<Symbol> = Vec::new();
        let raw = vec![RawReference {
            source_qualified_name: "Foo.bar".to_string(),
            target_expression: "Helper.util".to_string(),
            ref_type_hint: ReferenceType::Calls,
            location: loc(),
        }];

        let refs = run_linkers(&symbols, &raw);
        assert_eq!(refs.len(), 1);
        assert!(refs[0].is_orphan());
        assert_eq!(refs[0].confidence, Confidence::Inferred);
        assert_eq!(refs[0].target_name, "Helper.util");
    }

    #[test]
    fn run_linkers_preserves_distinct_orphans_from_same_source_and_type() {
        let symbols: Vec<Symbol> = Vec::new();
        let raw = vec![
            RawReference {
                source_qualified_name: "Foo.bar".to_string(),
                target_expression: "Helper.util".to_string(),
                ref_type_hint: ReferenceType::Calls,
                location: loc(),
            },
            RawReference {
                source_qualified_name: "Foo.bar".to_string(),
                target_expression: "Other.thing".to_string(),
                ref_type_hint: ReferenceType::Calls,
                location: loc(),
            },
        ];

        let refs = run_linkers(&symbols, &raw);
        assert_eq!(refs.len(), 2);
        assert!(refs.iter().all(|r| r.is_orphan()));
        let mut names: Vec<&str> = refs.iter().map(|r| r.target_name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["Helper.util", "Other.thing"]);
    }

    #[test]
    fn run_linkers_resolves_qualified_name_match_with_high_confidence() {
        let target = Symbol::new(
            PathBuf::from("b.rs"),
            "util".to_string(),
            "Helper.util".to_string(),
            SymbolType::Method,
            "rust".to_string(),
            5,
            6,
        );
        let symbols = vec![target.clone()];
        let raw = vec![RawReference {
            source_qualified_name: "Foo.bar".to_string(),
            target_expression: "Helper.util".to_string(),
            ref_type_hint: ReferenceType::Calls,
            location: loc(),
        }];

        let refs = run_linkers(&symbols, &raw);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].target_id.as_deref(), Some(target.id.as_str()));
        assert_eq!(refs[0].confidence, Confidence::High);
    }
}
