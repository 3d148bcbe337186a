use std::path::Path;

use tree_sitter::{Node, Parser, TreeCursor};
use tree_sitter_rust::LANGUAGE;

use crate::language::{
    collect_leading_comment, derive_domains_from_path, infer_type_from_path_and_name,
    node_line_end, node_line_start, node_text, BackendError, BackendResult, LanguageAdapter,
    ParsedFile,
};
use crate::model::reference::{Location, ReferenceType};
use crate::model::{RawReference, Symbol, SymbolType};

pub struct RustBackend;
pub static BACKEND: RustBackend = RustBackend;

fn ident_name(file: &ParsedFile, node: Node) -> Option<String> {
    let name_node = node.child_by_field_name("name")?;
    Some(node_text(&name_node, file.source()).to_string())
}

fn has_self_parameter(node: Node) -> bool {
    let Some(params) = node.child_by_field_name("parameters") else {
        return false;
    };
    let mut cursor = params.walk();
    params
        .children(&mut cursor)
        .any(|child| child.kind() == "self_parameter")
}

fn function_symbol_type(node: Node) -> SymbolType {
    let mut in_impl_or_trait = false;
    let mut parent = node.parent();
    while let Some(p) = parent {
        if matches!(p.kind(), "impl_item" | "trait_item") {
            in_impl_or_trait = true;
            break;
        }
        parent = p.parent();
    }
    if in_impl_or_trait && has_self_parameter(node) {
        SymbolType::Method
    } else {
        SymbolType::Function
    }
}

fn impl_type_name(file: &ParsedFile, node: Node) -> Option<String> {
    let type_node = node.child_by_field_name("type")?;
    type_leaf_name(file, type_node)
}

fn impl_trait_name(file: &ParsedFile, node: Node) -> Option<String> {
    let trait_node = node.child_by_field_name("trait")?;
    type_leaf_name(file, trait_node)
}

fn type_leaf_name(file: &ParsedFile, node: Node) -> Option<String> {
    match node.kind() {
        "type_identifier" => Some(node_text(&node, file.source()).to_string()),
        "generic_type" => {
            let inner = node.child_by_field_name("type")?;
            type_leaf_name(file, inner)
        }
        "scoped_type_identifier" | "scoped_identifier" => {
            let mut cursor = node.walk();
            node.children(&mut cursor)
                .filter(|c| matches!(c.kind(), "type_identifier" | "identifier"))
                .last()
                .map(|c| node_text(&c, file.source()).to_string())
        }
        _ => {
            let mut cursor = node.walk();
            node.children(&mut cursor).find_map(|c| type_leaf_name(file, c))
        }
    }
}

/// Walk ancestors collecting module/type names to build a `::`-joined
/// qualified name, matching Rust's own path syntax.
fn qualified_name_for(file: &ParsedFile, node: Node, leaf: &str) -> String {
    let mut segments: Vec<String> = Vec::new();
    let mut current = node.parent();
    while let Some(p) = current {
        match p.kind() {
            "mod_item" => {
                if let Some(name) = ident_name(file, p) {
                    segments.push(name);
                }
            }
            "impl_item" => {
                if let Some(name) = impl_type_name(file, p) {
                    segments.push(name);
                }
            }
            "trait_item" | "struct_item" | "enum_item" => {
                if let Some(name) = ident_name(file, p) {
                    segments.push(name);
                }
            }
            _ => {}
        }
        current = p.parent();
    }
    segments.reverse();
    segments.push(leaf.to_string());
    segments.join("::")
}

struct Visitor<'a> {
    file: &'a ParsedFile,
    symbols: Vec<Symbol>,
    refs: Vec<RawReference>,
    /// Qualified name of the innermost enclosing function, used as the
    /// source of `calls` raw references.
    enclosing_fn: Vec<String>,
}

impl<'a> Visitor<'a> {
    fn push_symbol(&mut self, name: String, qualified_name: String, symbol_type: SymbolType, node: Node) {
        let line_start = node_line_start(&node);
        let line_end = node_line_end(&node);
        let mut symbol = Symbol::new(
            self.file.path.clone(),
            name.clone(),
            qualified_name,
            symbol_type,
            "rust".to_string(),
            line_start,
            line_end,
        );
        symbol.description = collect_leading_comment(self.file.source(), line_start);
        symbol.inferred_type = infer_type_from_path_and_name(&self.file.path, &name);
        symbol.domains = derive_domains_from_path(&self.file.path);
        self.symbols.push(symbol);
    }

    fn visit(&mut self, cursor: &mut TreeCursor<'a>) {
        loop {
            let node = cursor.node();
            self.visit_node(node);

            if cursor.goto_first_child() {
                self.visit(cursor);
                cursor.goto_parent();
            }
            if !cursor.goto_next_sibling() {
                break;
            }
        }
    }

    fn visit_node(&mut self, node: Node<'a>) {
        match node.kind() {
            "function_item" | "function_signature_item" => {
                if let Some(name) = ident_name(self.file, node) {
                    let symbol_type = function_symbol_type(node);
                    let qname = qualified_name_for(self.file, node, &name);
                    self.push_symbol(name, qname.clone(), symbol_type, node);
                    self.enclosing_fn.push(qname);
                    self.visit_calls_within(node);
                    self.enclosing_fn.pop();
                }
            }
            "struct_item" | "enum_item" | "union_item" => {
                if let Some(name) = ident_name(self.file, node) {
                    let symbol_type = if node.kind() == "enum_item" {
                        SymbolType::Enum
                    } else {
                        SymbolType::Struct
                    };
                    let qname = qualified_name_for(self.file, node, &name);
                    self.push_symbol(name, qname, symbol_type, node);
                }
            }
            "trait_item" => {
                if let Some(name) = ident_name(self.file, node) {
                    let qname = qualified_name_for(self.file, node, &name);
                    self.push_symbol(name, qname, SymbolType::Trait, node);
                }
            }
            "mod_item" => {
                if let Some(name) = ident_name(self.file, node) {
                    let qname = qualified_name_for(self.file, node, &name);
                    self.push_symbol(name, qname, SymbolType::Namespace, node);
                }
            }
            "impl_item" => {
                if let (Some(type_name), Some(trait_name)) =
                    (impl_type_name(self.file, node), impl_trait_name(self.file, node))
                {
                    self.refs.push(RawReference {
                        source_qualified_name: type_name,
                        target_expression: trait_name,
                        ref_type_hint: ReferenceType::Implements,
                        location: Location {
                            file: self.file.path.clone(),
                            line: node_line_start(&node),
                        },
                    });
                }
            }
            _ => {}
        }
    }

    /// Collect `call_expression` callees textually within `fn_node` without
    /// descending into nested function items (those get their own pass).
    fn visit_calls_within(&mut self, fn_node: Node<'a>) {
        let Some(caller) = self.enclosing_fn.last().cloned() else {
            return;
        };
        let mut cursor = fn_node.walk();
        self.collect_calls(fn_node, &mut cursor, &caller);
    }

    fn collect_calls(&mut self, node: Node<'a>, cursor: &mut TreeCursor<'a>, caller: &str) {
        if node.kind() == "call_expression" {
            if let Some(function_node) = node.child_by_field_name("function") {
                if let Some(callee) = type_leaf_name(self.file, function_node).or_else(|| {
                    if function_node.kind() == "identifier" {
                        Some(node_text(&function_node, self.file.source()).to_string())
                    } else {
                        None
                    }
                }) {
                    self.refs.push(RawReference {
                        source_qualified_name: caller.to_string(),
                        target_expression: callee,
                        ref_type_hint: ReferenceType::Calls,
                        location: Location {
                            file: self.file.path.clone(),
                            line: node_line_start(&node),
                        },
                    });
                }
            }
        }
        if cursor.goto_first_child() {
            loop {
                let child = cursor.node();
                if child.kind() != "function_item" {
                    self.collect_calls(child, cursor, caller);
                }
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
            cursor.goto_parent();
        }
    }
}

impl LanguageAdapter for RustBackend {
    fn id(&self) -> &'static str {
        "rust"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["rs"]
    }

    fn parse_file(&self, path: &Path, source: &str) -> BackendResult<ParsedFile> {
        let mut parser = Parser::new();
        let language = LANGUAGE.into();
        parser.set_language(&language)?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| BackendError::new("failed to parse Rust source"))?;
        Ok(ParsedFile::new(self.id(), path, tree, source.to_string()))
    }

    fn extract(&self, file: &ParsedFile) -> BackendResult<(Vec<Symbol>, Vec<RawReference>)> {
        let mut visitor = Visitor {
            file,
            symbols: Vec::new(),
            refs: Vec::new(),
            enclosing_fn: Vec::new(),
        };
        let mut cursor = file.tree.root_node().walk();
        visitor.visit(&mut cursor);
        Ok((visitor.symbols, visitor.refs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn fixture(name: &str) -> (PathBuf, String) {
        let path = PathBuf::from("tests/fixtures/rust_repo").join(name);
        let source = fs::read_to_string(&path).expect("fixture source");
        (path, source)
    }

    #[test]
    fn parses_fixture_without_hard_error() {
        let (path, source) = fixture("lib.rs");
        let parsed = BACKEND.parse_file(&path, &source).expect("parsed");
        assert_eq!(parsed.language_id, "rust");
    }

    #[test]
    fn extracts_functions_methods_and_types() {
        let (path, source) = fixture("lib.rs");
        let parsed = BACKEND.parse_file(&path, &source).expect("parsed");
        let (symbols, _refs) = BACKEND.extract(&parsed).expect("extracted");

        assert!(symbols.iter().any(|s| s.name == "add" && s.symbol_type == SymbolType::Function));
        assert!(symbols.iter().any(|s| s.name == "Widget" && s.symbol_type == SymbolType::Struct));
        assert!(symbols.iter().any(|s| s.name == "increment" && s.symbol_type == SymbolType::Method));
        assert!(symbols.iter().all(|s| s.language == "rust"));
    }

    #[test]
    fn qualified_names_include_module_and_type_prefix() {
        let (path, source) = fixture("lib.rs");
        let parsed = BACKEND.parse_file(&path, &source).expect("parsed");
        let (symbols, _refs) = BACKEND.extract(&parsed).expect("extracted");

        let increment = symbols.iter().find(|s| s.name == "increment").unwrap();
        assert!(increment.qualified_name.contains("Widget"));
    }
}
