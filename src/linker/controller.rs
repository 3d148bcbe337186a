//! Controller Linker (priority 30).
//!
//! Matches controller return strings/annotations to view symbols
//! (JSP/template files) using naming conventions: the view expression is
//! typically a path with the template's extension stripped (e.g.
//! `"user/login"` -> `user/login.jsp`).

use crate::model::reference::ReferenceType;
use crate::model::{Confidence, RawReference, Reference, SymbolType};

use super::{orphan_reference, resolved_reference, source_id_for, LinkContext, Linker};

pub struct ControllerLinker;

fn view_stem(path: &std::path::Path) -> String {
    let without_ext = path.with_extension("");
    without_ext.to_string_lossy().replace('\\', "/")
}

impl Linker for ControllerLinker {
    fn name(&self) -> &'static str {
        "controller"
    }

    fn priority(&self) -> u32 {
        30
    }

    fn link_all(&self, ctx: &LinkContext, raw_refs: &[RawReference]) -> Vec<Reference> {
        raw_refs
            .iter()
            .filter(|r| matches!(r.ref_type_hint, ReferenceType::ReturnsView | ReferenceType::Renders))
            .map(|raw| {
                let source_id = source_id_for(ctx, raw);
                let view_candidates: Vec<_> = ctx
                    .symbols
                    .iter()
                    .filter(|s| matches!(s.symbol_type, SymbolType::JspPage | SymbolType::Template))
                    .collect();

                let wanted = raw.target_expression.trim_start_matches('/').trim_end_matches('/');

                if let Some(exact) = view_candidates.iter().find(|s| view_stem(&s.file_path).ends_with(wanted)) {
                    return resolved_reference(source_id, exact, raw, Confidence::High);
                }
                if let Some(partial) = view_candidates
                    .iter()
                    .find(|s| view_stem(&s.file_path).to_ascii_lowercase().contains(&wanted.to_ascii_lowercase()))
                {
                    return resolved_reference(source_id, partial, raw, Confidence::Medium);
                }
                orphan_reference(source_id, raw)
            })
            .collect()
    }
}
