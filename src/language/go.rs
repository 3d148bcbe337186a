use std::path::Path;

use tree_sitter::{Parser, Query, QueryCursor, StreamingIterator};
use tree_sitter_go::LANGUAGE;

use crate::language::{
    collect_leading_comment, derive_domains_from_path, infer_type_from_path_and_name, node_text,
    BackendError, BackendResult, LanguageAdapter, ParsedFile,
};
use crate::model::reference::{Location, ReferenceType};
use crate::model::{RawReference, Symbol, SymbolType};

pub struct GoBackend;
pub static BACKEND: GoBackend = GoBackend;

const QUERY_SRC: &str = r#"
(function_declaration
  name: (identifier) @function.name) @function.def

(method_declaration
  receiver: (parameter_list) @method.receiver
  name: (field_identifier) @method.name) @method.def

(type_declaration
  (type_spec
    name: (type_identifier) @type.name
    type: (struct_type))) @type.def

(type_declaration
  (type_spec
    name: (type_identifier) @interface.name
    type: (interface_type))) @interface.def

(import_spec
  path: (interpreted_string_literal) @import.module)

(call_expression
  function: (identifier) @call.callee)

(call_expression
  function: (selector_expression
    field: (field_identifier) @call.callee))
"#;

/// The receiver's named type, e.g. `(w *Widget)` -> `Widget`.
fn receiver_type_name(receiver_list: &tree_sitter::Node, source: &str) -> Option<String> {
    let text = node_text(receiver_list, source);
    let inner = text.trim_start_matches('(').trim_end_matches(')').trim();
    let type_part = inner.split_whitespace().last()?;
    Some(type_part.trim_start_matches('*').to_string())
}

fn enclosing_function(node: &tree_sitter::Node, source: &str) -> Option<String> {
    let mut current = node.parent();
    while let Some(p) = current {
        match p.kind() {
            "function_declaration" => {
                let name_node = p.child_by_field_name("name")?;
                return Some(node_text(&name_node, source).to_string());
            }
            "method_declaration" => {
                let name_node = p.child_by_field_name("name")?;
                let name = node_text(&name_node, source).to_string();
                let receiver = p.child_by_field_name("receiver");
                return Some(match receiver.and_then(|r| receiver_type_name(&r, source)) {
                    Some(type_name) => format!("{type_name}.{name}"),
                    None => name,
                });
            }
            _ => current = p.parent(),
        }
    }
    None
}

impl LanguageAdapter for GoBackend {
    fn id(&self) -> &'static str {
        "go"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["go"]
    }

    fn parse_file(&self, path: &Path, source: &str) -> BackendResult<ParsedFile> {
        let mut parser = Parser::new();
        let language = LANGUAGE.into();
        parser.set_language(&language)?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| BackendError::new("failed to parse Go source"))?;
        Ok(ParsedFile::new(self.id(), path, tree, source.to_string()))
    }

    fn extract(&self, file: &ParsedFile) -> BackendResult<(Vec<Symbol>, Vec<RawReference>)> {
        let language = LANGUAGE.into();
        let query = Query::new(&language, QUERY_SRC)?;
        let mut cursor = QueryCursor::new();
        let source = file.source();
        let mut symbols = Vec::new();
        let mut refs = Vec::new();

        let mut matches = cursor.matches(&query, file.tree.root_node(), source.as_bytes());
        while let Some(m) = matches.next() {
            for capture in m.captures {
                let capture_name = query.capture_names()[capture.index as usize];
                let node = capture.node;
                match capture_name {
                    "function.def" => {
                        let Some(name_node) = node.child_by_field_name("name") else { continue };
                        let name = node_text(&name_node, source).to_string();
                        let line_start = node.start_position().row as u32 + 1;
                        let line_end = node.end_position().row as u32 + 1;
                        let mut symbol = Symbol::new(
                            file.path.clone(),
                            name.clone(),
                            name.clone(),
                            SymbolType::Function,
                            "go".to_string(),
                            line_start,
                            line_end,
                        );
                        symbol.description = collect_leading_comment(source, line_start);
                        symbol.inferred_type = infer_type_from_path_and_name(&file.path, &name);
                        symbol.domains = derive_domains_from_path(&file.path);
                        symbols.push(symbol);
                    }
                    "method.def" => {
                        let Some(name_node) = node.child_by_field_name("name") else { continue };
                        let name = node_text(&name_node, source).to_string();
                        let line_start = node.start_position().row as u32 + 1;
                        let line_end = node.end_position().row as u32 + 1;
                        let receiver = node.child_by_field_name("receiver");
                        let qualified_name = receiver
                            .and_then(|r| receiver_type_name(&r, source))
                            .map(|t| format!("{t}.{name}"))
                            .unwrap_or_else(|| name.clone());
                        let mut symbol = Symbol::new(
                            file.path.clone(),
                            name.clone(),
                            qualified_name,
                            SymbolType::Method,
                            "go".to_string(),
                            line_start,
                            line_end,
                        );
                        symbol.description = collect_leading_comment(source, line_start);
                        symbol.inferred_type = infer_type_from_path_and_name(&file.path, &name);
                        symbol.domains = derive_domains_from_path(&file.path);
                        symbols.push(symbol);
                    }
                    "type.def" => {
                        let Some(name_node) = node.child_by_field_name("name") else { continue };
                        let name = node_text(&name_node, source).to_string();
                        let line_start = node.start_position().row as u32 + 1;
                        let line_end = node.end_position().row as u32 + 1;
                        let mut symbol = Symbol::new(
                            file.path.clone(),
                            name.clone(),
                            name,
                            SymbolType::Struct,
                            "go".to_string(),
                            line_start,
                            line_end,
                        );
                        symbol.description = collect_leading_comment(source, line_start);
                        symbols.push(symbol);
                    }
                    "interface.def" => {
                        let Some(name_node) = node.child_by_field_name("name") else { continue };
                        let name = node_text(&name_node, source).to_string();
                        let line_start = node.start_position().row as u32 + 1;
                        let line_end = node.end_position().row as u32 + 1;
                        let mut symbol = Symbol::new(
                            file.path.clone(),
                            name.clone(),
                            name,
                            SymbolType::Interface,
                            "go".to_string(),
                            line_start,
                            line_end,
                        );
                        symbol.description = collect_leading_comment(source, line_start);
                        symbols.push(symbol);
                    }
                    "import.module" => {
                        let module = node_text(&node, source).trim_matches('"').to_string();
                        refs.push(RawReference {
                            source_qualified_name: file.path.display().to_string(),
                            target_expression: module,
                            ref_type_hint: ReferenceType::Imports,
                            location: Location {
                                file: file.path.clone(),
                                line: node.start_position().row as u32 + 1,
                            },
                        });
                    }
                    "call.callee" => {
                        let callee = node_text(&node, source).to_string();
                        let line = node.start_position().row as u32 + 1;
                        let caller = enclosing_function(&node, source).unwrap_or_else(|| file.path.display().to_string());
                        refs.push(RawReference {
                            source_qualified_name: caller,
                            target_expression: callee,
                            ref_type_hint: ReferenceType::Calls,
                            location: Location { file: file.path.clone(), line },
                        });
                    }
                    _ => {}
                }
            }
        }

        Ok((symbols, refs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_functions_structs_and_methods() {
        let source = r#"
package widget

import "fmt"

type Widget struct {
	Value int
}

func (w *Widget) Increment(delta int) int {
	return add(w.Value, delta)
}

func add(a, b int) int {
	fmt.Println(a, b)
	return a + b
}
"#;
        let path = Path::new("widget.go");
        let parsed = BACKEND.parse_file(path, source).expect("parsed");
        let (symbols, refs) = BACKEND.extract(&parsed).expect("extracted");

        assert!(symbols.iter().any(|s| s.name == "Widget" && s.symbol_type == SymbolType::Struct));
        assert!(symbols.iter().any(|s| s.name == "add" && s.symbol_type == SymbolType::Function));
        assert!(symbols.iter().any(|s| {
            s.name == "Increment" && s.symbol_type == SymbolType::Method && s.qualified_name == "Widget.Increment"
        }));
        assert!(refs.iter().any(|r| r.ref_type_hint == ReferenceType::Imports && r.target_expression == "fmt"));
        assert!(refs.iter().any(|r| r.ref_type_hint == ReferenceType::Calls && r.target_expression == "add"));
    }
}
