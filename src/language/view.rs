//! View/template adapter: JSP, plain HTML, and single-file framework
//! components (Vue-style `.vue`, any `.html` carrying `v-model`/
//! `[(ngModel)]`/mustache bindings).
//!
//! Unlike the code-language adapters, the view layer has no single
//! canonical grammar — JSP mixes JSTL tags, EL expressions, and
//! whatever HTML/framework markup a project chooses. This adapter
//! still parses with tree-sitter-html so it honors the same
//! `ParsedFile` contract as every other adapter, but extraction scans
//! the raw source text rather than walking tree-sitter nodes, the way
//! the document extractor handles markdown headings.

use std::path::Path;

use tree_sitter::Parser;
use tree_sitter_html::LANGUAGE;

use crate::language::{derive_domains_from_path, BackendError, BackendResult, LanguageAdapter, ParsedFile};
use crate::model::reference::{Location, ReferenceType};
use crate::model::{RawReference, Symbol, SymbolType};

pub struct ViewBackend;
pub static BACKEND: ViewBackend = ViewBackend;

fn view_qualified_name(path: &Path) -> String {
    path.with_extension("").to_string_lossy().replace('\\', "/")
}

fn line_at(source: &str, byte_offset: usize) -> u32 {
    source[..byte_offset].matches('\n').count() as u32 + 1
}

/// Scans Spring-style `<form:* path="a.b.c"/>` bindings and rewrites the
/// dotted path into `${a.b.c}` so the EL Resolver handles both forms.
fn find_form_path_bindings(source: &str) -> Vec<(String, u32)> {
    let mut out = Vec::new();
    let needle = "path=\"";
    let mut cursor = 0;
    while let Some(rel) = source[cursor..].find(needle) {
        let start = cursor + rel + needle.len();
        let Some(end_rel) = source[start..].find('"') else { break };
        let value = &source[start..start + end_rel];
        if value.contains('.') {
            out.push((value.to_string(), line_at(source, start)));
        }
        cursor = start + end_rel + 1;
    }
    out
}

fn find_el_expressions(source: &str) -> Vec<(String, u32)> {
    let mut out = Vec::new();
    let mut cursor = 0;
    while let Some(rel) = source[cursor..].find("${") {
        let start = cursor + rel;
        let Some(end_rel) = source[start..].find('}') else { break };
        let expr = &source[start..start + end_rel + 1];
        out.push((expr.to_string(), line_at(source, start)));
        cursor = start + end_rel + 1;
    }
    out
}

/// `v-model="x"`, `[(ngModel)]="x"`, and bare `{state.x}` mustache
/// interpolation — the Frontend Linker's naming-convention territory.
fn find_frontend_bindings(source: &str) -> Vec<(String, u32)> {
    let mut out = Vec::new();
    for marker in ["v-model=\"", "ngModel)]=\""] {
        let mut cursor = 0;
        while let Some(rel) = source[cursor..].find(marker) {
            let start = cursor + rel + marker.len();
            let Some(end_rel) = source[start..].find('"') else { break };
            let value = &source[start..start + end_rel];
            out.push((value.to_string(), line_at(source, start)));
            cursor = start + end_rel + 1;
        }
    }

    let mut cursor = 0;
    while let Some(rel) = source[cursor..].find('{') {
        let start = cursor + rel;
        let Some(end_rel) = source[start..].find('}') else { break };
        let value = &source[start + 1..start + end_rel];
        let looks_like_binding = !value.trim().is_empty()
            && !value.contains('{')
            && !value.contains("${")
            && value.chars().all(|c| c.is_alphanumeric() || c == '.' || c == '_');
        if looks_like_binding {
            out.push((value.to_string(), line_at(source, start)));
        }
        cursor = start + end_rel + 1;
    }
    out
}

impl LanguageAdapter for ViewBackend {
    fn id(&self) -> &'static str {
        "view"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["jsp", "jspx", "html", "htm", "vue"]
    }

    fn parse_file(&self, path: &Path, source: &str) -> BackendResult<ParsedFile> {
        let mut parser = Parser::new();
        let language = LANGUAGE.into();
        parser.set_language(&language)?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| BackendError::new("failed to parse view source"))?;
        Ok(ParsedFile::new(self.id(), path, tree, source.to_string()))
    }

    fn extract(&self, file: &ParsedFile) -> BackendResult<(Vec<Symbol>, Vec<RawReference>)> {
        let source = file.source();
        let qualified_name = view_qualified_name(&file.path);
        let is_jsp = matches!(
            file.path.extension().and_then(|e| e.to_str()),
            Some("jsp") | Some("jspx")
        );
        let symbol_type = if is_jsp { SymbolType::JspPage } else { SymbolType::Template };
        let line_end = source.lines().count().max(1) as u32;

        let mut view = Symbol::new(
            file.path.clone(),
            file.path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            qualified_name.clone(),
            symbol_type,
            "view".to_string(),
            1,
            line_end,
        );
        view.domains = derive_domains_from_path(&file.path);
        let mut symbols = vec![view];
        let mut refs = Vec::new();

        for (path_value, line) in find_form_path_bindings(source) {
            refs.push(RawReference {
                source_qualified_name: qualified_name.clone(),
                target_expression: format!("${{{path_value}}}"),
                ref_type_hint: ReferenceType::BindsTo,
                location: Location { file: file.path.clone(), line },
            });
        }
        for (expr, line) in find_el_expressions(source) {
            refs.push(RawReference {
                source_qualified_name: qualified_name.clone(),
                target_expression: expr,
                ref_type_hint: ReferenceType::BindsTo,
                location: Location { file: file.path.clone(), line },
            });
        }
        for (binding, line) in find_frontend_bindings(source) {
            let mut component = Symbol::new(
                file.path.clone(),
                binding.clone(),
                format!("{qualified_name}::{binding}"),
                SymbolType::DataBinding,
                "view".to_string(),
                line,
                line,
            );
            component.parent_id = Some(symbols[0].id.clone());
            symbols.push(component);

            refs.push(RawReference {
                source_qualified_name: qualified_name.clone(),
                target_expression: binding,
                ref_type_hint: ReferenceType::BindsTo,
                location: Location { file: file.path.clone(), line },
            });
        }

        Ok((symbols, refs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_jsp_page_and_spring_form_binding() {
        let source = r#"<%@ page contentType="text/html" %>
<form:input path="user.email"/>
"#;
        let path = Path::new("login.jsp");
        let parsed = BACKEND.parse_file(path, source).expect("parsed");
        let (symbols, refs) = BACKEND.extract(&parsed).expect("extracted");

        let page = symbols.iter().find(|s| s.symbol_type == SymbolType::JspPage).expect("jsp page symbol");
        assert_eq!(page.qualified_name, "login");

        let binding = refs.iter().find(|r| r.ref_type_hint == ReferenceType::BindsTo).expect("binds_to ref");
        assert_eq!(binding.target_expression, "${user.email}");
    }

    #[test]
    fn extracts_vue_style_frontend_binding() {
        let source = r#"<div><input v-model="email"/></div>"#;
        let path = Path::new("profile.vue");
        let parsed = BACKEND.parse_file(path, source).expect("parsed");
        let (symbols, refs) = BACKEND.extract(&parsed).expect("extracted");

        assert!(symbols.iter().any(|s| s.symbol_type == SymbolType::Template));
        assert!(symbols.iter().any(|s| s.symbol_type == SymbolType::DataBinding && s.name == "email"));
        assert!(refs
            .iter()
            .any(|r| r.ref_type_hint == ReferenceType::BindsTo && r.target_expression == "email"));
    }
}
