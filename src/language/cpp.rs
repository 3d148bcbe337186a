use std::path::Path;

use tree_sitter::{Node, Parser, TreeCursor};
use tree_sitter_cpp::LANGUAGE;

use crate::language::{
    collect_leading_comment, derive_domains_from_path, infer_type_from_path_and_name,
    node_line_end, node_line_start, node_text, BackendError, BackendResult, LanguageAdapter,
    ParsedFile,
};
use crate::model::reference::{Location, ReferenceType};
use crate::model::{RawReference, Symbol, SymbolType};

pub struct CppBackend;
pub static BACKEND: CppBackend = CppBackend;

fn symbol_name(file: &ParsedFile, node: Node) -> Option<String> {
    if let Some(name_node) = node.child_by_field_name("name") {
        return Some(node_text(&name_node, file.source()).to_string());
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "identifier" | "field_identifier" | "type_identifier" | "namespace_identifier" => {
                return Some(node_text(&child, file.source()).to_string());
            }
            "function_declarator" | "pointer_declarator" | "reference_declarator"
            | "qualified_identifier" => {
                if let Some(name) = symbol_name(file, child) {
                    return Some(name);
                }
            }
            _ => {}
        }
    }
    None
}

fn is_method(node: Node) -> bool {
    let mut parent = node.parent();
    while let Some(p) = parent {
        match p.kind() {
            "class_specifier" | "struct_specifier" => return true,
            "translation_unit" => return false,
            _ => parent = p.parent(),
        }
    }
    false
}

fn qualified_name_for(file: &ParsedFile, node: Node, leaf: &str) -> String {
    let mut segments = Vec::new();
    let mut current = node.parent();
    while let Some(p) = current {
        if matches!(p.kind(), "namespace_definition" | "class_specifier" | "struct_specifier") {
            if let Some(name) = symbol_name(file, p) {
                segments.push(name);
            }
        }
        current = p.parent();
    }
    segments.reverse();
    segments.push(leaf.to_string());
    segments.join("::")
}

fn callee_name(file: &ParsedFile, call_node: Node) -> Option<String> {
    let function = call_node.child_by_field_name("function")?;
    match function.kind() {
        "identifier" | "field_identifier" => Some(node_text(&function, file.source()).to_string()),
        "field_expression" => {
            let field = function.child_by_field_name("field")?;
            Some(node_text(&field, file.source()).to_string())
        }
        "qualified_identifier" => symbol_name(file, function),
        _ => None,
    }
}

struct Visitor<'a> {
    file: &'a ParsedFile,
    symbols: Vec<Symbol>,
    refs: Vec<RawReference>,
    enclosing: Vec<String>,
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
            "cpp".to_string(),
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
            "function_definition" => {
                if let Some(declarator) = node.child_by_field_name("declarator") {
                    if let Some(name) = symbol_name(self.file, declarator) {
                        let symbol_type = if is_method(node) {
                            SymbolType::Method
                        } else {
                            SymbolType::Function
                        };
                        let qname = qualified_name_for(self.file, node, &name);
                        self.push_symbol(name, qname.clone(), symbol_type, node);
                        self.enclosing.push(qname);
                        self.collect_calls(node);
                        self.enclosing.pop();
                    }
                }
            }
            "class_specifier" | "struct_specifier" => {
                if let Some(name) = symbol_name(self.file, node) {
                    let qname = qualified_name_for(self.file, node, &name);
                    self.push_symbol(name.clone(), qname, SymbolType::Class, node);

                    if let Some(base_clause) = node.child_by_field_name("base_class_clause") {
                        let text = node_text(&base_clause, self.file.source());
                        for target in text
                            .trim_start_matches(':')
                            .split(',')
                            .map(|s| s.trim().trim_start_matches("public").trim_start_matches("private").trim())
                            .filter(|s| !s.is_empty())
                        {
                            self.refs.push(RawReference {
                                source_qualified_name: name.clone(),
                                target_expression: target.to_string(),
                                ref_type_hint: ReferenceType::Extends,
                                location: Location {
                                    file: self.file.path.clone(),
                                    line: node_line_start(&node),
                                },
                            });
                        }
                    }
                }
            }
            "namespace_definition" => {
                if let Some(name) = symbol_name(self.file, node) {
                    let qname = qualified_name_for(self.file, node, &name);
                    self.push_symbol(name, qname, SymbolType::Namespace, node);
                }
            }
            "preproc_include" => {
                if let Some(path_node) = node.child(1) {
                    let target = node_text(&path_node, self.file.source())
                        .trim_matches(|c| c == '"' || c == '<' || c == '>')
                        .to_string();
                    self.refs.push(RawReference {
                        source_qualified_name: self.file.path.display().to_string(),
                        target_expression: target,
                        ref_type_hint: ReferenceType::Imports,
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

    fn collect_calls(&mut self, fn_node: Node<'a>) {
        let Some(caller) = self.enclosing.last().cloned() else {
            return;
        };
        let mut cursor = fn_node.walk();
        self.walk_calls(fn_node, &mut cursor, &caller);
    }

    fn walk_calls(&mut self, node: Node<'a>, cursor: &mut TreeCursor<'a>, caller: &str) {
        if node.kind() == "call_expression" {
            if let Some(callee) = callee_name(self.file, node) {
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
        if cursor.goto_first_child() {
            loop {
                let child = cursor.node();
                if child.kind() != "function_definition" {
                    self.walk_calls(child, cursor, caller);
                }
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
            cursor.goto_parent();
        }
    }
}

impl LanguageAdapter for CppBackend {
    fn id(&self) -> &'static str {
        "cpp"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["cpp", "cc", "cxx", "hpp", "hh", "hxx", "h"]
    }

    fn parse_file(&self, path: &Path, source: &str) -> BackendResult<ParsedFile> {
        let mut parser = Parser::new();
        let language = LANGUAGE.into();
        parser.set_language(&language)?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| BackendError::new("failed to parse C++ source"))?;
        Ok(ParsedFile::new(self.id(), path, tree, source.to_string()))
    }

    fn extract(&self, file: &ParsedFile) -> BackendResult<(Vec<Symbol>, Vec<RawReference>)> {
        let mut visitor = Visitor {
            file,
            symbols: Vec::new(),
            refs: Vec::new(),
            enclosing: Vec::new(),
        };
        let mut cursor = file.tree.root_node().walk();
        visitor.visit(&mut cursor);
        Ok((visitor.symbols, visitor.refs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_namespace_class_and_methods() {
        let source = r#"
namespace util {

struct Widget {
    int value;

    int increment(int delta) {
        return add(value, delta);
    }
};

int add(int a, int b) {
    return a + b;
}

}
"#;
        let path = Path::new("sample.cpp");
        let parsed = BACKEND.parse_file(path, source).expect("parsed");
        let (symbols, refs) = BACKEND.extract(&parsed).expect("extracted");

        assert!(symbols.iter().any(|s| s.name == "util" && s.symbol_type == SymbolType::Namespace));
        assert!(symbols.iter().any(|s| s.name == "Widget" && s.symbol_type == SymbolType::Class));
        assert!(symbols.iter().any(|s| s.name == "add" && s.symbol_type == SymbolType::Function));
        assert!(symbols.iter().any(|s| s.name == "increment" && s.symbol_type == SymbolType::Method));
        assert!(refs.iter().any(|r| r.ref_type_hint == ReferenceType::Calls && r.target_expression == "add"));
    }
}
