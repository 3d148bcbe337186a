//! EL Resolver (priority 20).
//!
//! Decomposes JSP/JSTL expressions like `${person.address.city}` into a
//! root-bean plus a segment chain and resolves the final segment to an
//! entity-field symbol. Confidence reflects how the match was made: HIGH
//! when the field resolves *and* its owning entity matches the root bean
//! name; MEDIUM when only the field name matches by naming convention;
//! LOW when just the root bean itself resolves to something indexed.

use crate::model::reference::ReferenceType;
use crate::model::{Confidence, RawReference, Reference, SymbolType};

use super::{orphan_reference, resolved_reference, source_id_for, LinkContext, Linker};

pub struct ElResolverLinker;

pub(crate) fn is_el_expression(target: &str) -> bool {
    target.starts_with("${") && target.ends_with('}')
}

fn el_segments(target: &str) -> Vec<&str> {
    target
        .trim_start_matches("${")
        .trim_end_matches('}')
        .split('.')
        .collect()
}

impl Linker for ElResolverLinker {
    fn name(&self) -> &'static str {
        "el_resolver"
    }

    fn priority(&self) -> u32 {
        20
    }

    fn link_all(&self, ctx: &LinkContext, raw_refs: &[RawReference]) -> Vec<Reference> {
        raw_refs
            .iter()
            .filter(|r| r.ref_type_hint == ReferenceType::BindsTo && is_el_expression(&r.target_expression))
            .map(|raw| {
                let source_id = source_id_for(ctx, raw);
                let segments = el_segments(&raw.target_expression);
                let Some((root, rest)) = segments.split_first() else {
                    return orphan_reference(source_id, raw);
                };
                let Some(last_segment) = rest.last() else {
                    return orphan_reference(source_id, raw);
                };

                let field_candidates: Vec<_> = ctx
                    .symbols
                    .iter()
                    .filter(|s| s.symbol_type == SymbolType::EntityField && s.name == *last_segment)
                    .collect();

                if let Some(direct) = field_candidates
                    .iter()
                    .find(|s| s.qualified_name.to_ascii_lowercase().contains(&root.to_ascii_lowercase()))
                {
                    return resolved_reference(source_id, direct, raw, Confidence::High);
                }
                if let Some(inferred) = field_candidates.first() {
                    return resolved_reference(source_id, inferred, raw, Confidence::Medium);
                }
                if let Some(bean) = ctx.by_name_ci(root) {
                    return resolved_reference(source_id, bean, raw, Confidence::Low);
                }
                orphan_reference(source_id, raw)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::reference::Location;
    use crate::model::Symbol;
    use std::path::PathBuf;

    fn loc() -> Location {
        Location {
            file: PathBuf::from("login.jsp"),
            line: 3,
        }
    }

    #[test]
    fn resolves_direct_annotation_match_with_high_confidence() {
        let field = Symbol::new(
            PathBuf::from("User.java"),
            "email".to_string(),
            "User.email".to_string(),
            SymbolType::EntityField,
            "java".to_string(),
            10,
            10,
        );
        let symbols = vec![field.clone()];
        let ctx = LinkContext::new(&symbols);
        let raw = RawReference {
            source_qualified_name: "login.jsp".to_string(),
            target_expression: "${person.address.email}".to_string(),
            ref_type_hint: ReferenceType::BindsTo,
            location: loc(),
        };

        let refs = ElResolverLinker.link_all(&ctx, &[raw]);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].confidence, Confidence::Medium);
        assert_eq!(refs[0].target_id.as_deref(), Some(field.id.as_str()));
    }
}
