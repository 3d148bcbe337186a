//! Call/Import Linker (priority 10).
//!
//! The general-purpose fallback: resolves call/import/extends/implements/
//! depends_on/maps_to/documents/reads_from/writes_to raw refs by
//! qualified-name lookup across the project, falling back to a bare-name
//! lookup and finally a qualified-name substring match.

use crate::model::reference::ReferenceType;
use crate::model::{Confidence, RawReference, Reference};

use super::{orphan_reference, resolved_reference, source_id_for, LinkContext, Linker};

pub struct CallImportLinker;

const HANDLED: &[ReferenceType] = &[
    ReferenceType::Calls,
    ReferenceType::Imports,
    ReferenceType::Extends,
    ReferenceType::Implements,
    ReferenceType::DependsOn,
    ReferenceType::MapsTo,
    ReferenceType::Documents,
    ReferenceType::ReadsFrom,
    ReferenceType::WritesTo,
];

impl Linker for CallImportLinker {
    fn name(&self) -> &'static str {
        "call_import"
    }

    fn priority(&self) -> u32 {
        10
    }

    fn link_all(&self, ctx: &LinkContext, raw_refs: &[RawReference]) -> Vec<Reference> {
        raw_refs
            .iter()
            .filter(|r| HANDLED.contains(&r.ref_type_hint))
            .map(|raw| {
                let source_id = source_id_for(ctx, raw);

                // `maps_to` targets are `table::column` pseudo-symbols
                // until a schema adapter defines the column; an exact
                // qualified-name match there still counts as an explicit
                // declaration.
                if let Some(target) = ctx.by_qualified_name(&raw.target_expression) {
                    return resolved_reference(source_id, target, raw, Confidence::High);
                }
                if let Some(target) = ctx.by_name(&raw.target_expression) {
                    return resolved_reference(source_id, target, raw, Confidence::Medium);
                }
                if let Some(target) = ctx.qualified_name_contains_ci(&raw.target_expression) {
                    return resolved_reference(source_id, target, raw, Confidence::Low);
                }
                orphan_reference(source_id, raw)
            })
            .collect()
    }
}
