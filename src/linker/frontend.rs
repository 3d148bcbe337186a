//! Frontend Linker (priority 40).
//!
//! Resolves component usages and data bindings in HTML/Vue/React —
//! `v-model`, `[(ngModel)]`, `{state.x}` — to entity-field or plain
//! variable symbols. These are naming-convention matches by construction
//! (no annotation backs a template binding), so the best achievable
//! confidence is MEDIUM.

use crate::model::reference::ReferenceType;
use crate::model::{Confidence, RawReference, Reference, SymbolType};

use super::el_resolver::is_el_expression;
use super::{orphan_reference, resolved_reference, source_id_for, LinkContext, Linker};

pub struct FrontendLinker;

fn strip_binding_syntax(expr: &str) -> &str {
    expr.trim()
        .trim_start_matches("[(")
        .trim_end_matches(")]")
        .trim_start_matches('{')
        .trim_end_matches('}')
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim()
}

impl Linker for FrontendLinker {
    fn name(&self) -> &'static str {
        "frontend"
    }

    fn priority(&self) -> u32 {
        40
    }

    fn link_all(&self, ctx: &LinkContext, raw_refs: &[RawReference]) -> Vec<Reference> {
        raw_refs
            .iter()
            .filter(|r| r.ref_type_hint == ReferenceType::BindsTo && !is_el_expression(&r.target_expression))
            .map(|raw| {
                let source_id = source_id_for(ctx, raw);
                let stripped = strip_binding_syntax(&raw.target_expression);
                let last_segment = stripped.rsplit('.').next().unwrap_or(stripped);

                let candidate = ctx
                    .symbols
                    .iter()
                    .filter(|s| {
                        matches!(s.symbol_type, SymbolType::EntityField | SymbolType::Variable | SymbolType::Field)
                            && s.name == last_segment
                    })
                    .min_by_key(|s| s.id.as_str());

                match candidate {
                    Some(target) => resolved_reference(source_id, target, raw, Confidence::Medium),
                    None => orphan_reference(source_id, raw),
                }
            })
            .collect()
    }
}
