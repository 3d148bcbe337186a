use std::path::Path;

use tree_sitter::{Parser, Query, QueryCursor, StreamingIterator};
use tree_sitter_python::LANGUAGE;

use crate::language::orm::to_snake_case;
use crate::language::{
    collect_leading_comment, derive_domains_from_path, infer_type_from_path_and_name, node_text,
    BackendError, BackendResult, LanguageAdapter, ParsedFile,
};
use crate::model::reference::{Location, ReferenceType};
use crate::model::{RawReference, Symbol, SymbolType};

pub struct PythonBackend;
pub static BACKEND: PythonBackend = PythonBackend;

/// Declarative tree-sitter query: classes, functions/methods, imports, and
/// call expressions in one pass. Mirrors the query-based extraction style
/// used for the corpus's other modern adapters, trading a hand-rolled
/// cursor walk for a single `.scm`-equivalent pattern set.
const QUERY_SRC: &str = r#"
(class_definition
  name: (identifier) @class.name
  superclasses: (argument_list)? @class.bases) @class.def

(function_definition
  name: (identifier) @function.name) @function.def

(import_statement
  name: (dotted_name) @import.module)

(import_from_statement
  module_name: (dotted_name) @import.module)

(call
  function: (identifier) @call.callee) @call.expr

(call
  function: (attribute attribute: (identifier) @call.callee)) @call.expr
"#;

/// SQLAlchemy/Django field-assignment pattern: `name = Column(...)` or
/// `name = models.CharField(...)`. Detected textually per class body line
/// since tree-sitter's Python grammar does not expose a dedicated ORM
/// field node — every ORM relies on plain assignment syntax here.
fn orm_field_metadata(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    let eq = trimmed.find('=')?;
    let (lhs, rhs) = trimmed.split_at(eq);
    let field_name = lhs.trim();
    let rhs = rhs[1..].trim();
    if !field_name.chars().next().map(|c| c.is_alphabetic() || c == '_').unwrap_or(false) {
        return None;
    }
    if rhs.contains("Column(") || rhs.contains("Field(") || rhs.contains("relationship(") {
        Some((field_name.to_string(), to_snake_case(field_name)))
    } else {
        None
    }
}

impl LanguageAdapter for PythonBackend {
    fn id(&self) -> &'static str {
        "python"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["py", "pyi"]
    }

    fn parse_file(&self, path: &Path, source: &str) -> BackendResult<ParsedFile> {
        let mut parser = Parser::new();
        let language = LANGUAGE.into();
        parser.set_language(&language)?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| BackendError::new("failed to parse Python source"))?;
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
                    "class.def" => {
                        let Some(name_node) = node.child_by_field_name("name") else { continue };
                        let name = node_text(&name_node, source).to_string();
                        let line_start = node.start_position().row as u32 + 1;
                        let line_end = node.end_position().row as u32 + 1;
                        let mut symbol = Symbol::new(
                            file.path.clone(),
                            name.clone(),
                            name.clone(),
                            SymbolType::Class,
                            "python".to_string(),
                            line_start,
                            line_end,
                        );
                        symbol.description = collect_leading_comment(source, line_start);
                        symbol.inferred_type = infer_type_from_path_and_name(&file.path, &name);
                        symbol.domains = derive_domains_from_path(&file.path);

                        if is_orm_base(&node, source) {
                            symbol.symbol_type = SymbolType::Entity;
                            symbol.layer = SymbolType::Entity.default_layer();
                            symbol.metadata = Some(serde_json::json!({
                                "table_name": crate::language::orm::pluralize_table_name(&name),
                            }));
                            for (field_name, column_name) in
                                class_body_lines(&node, source).iter().filter_map(|line| orm_field_metadata(line))
                            {
                                let field_line = line_start;
                                let mut field_symbol = Symbol::new(
                                    file.path.clone(),
                                    field_name.clone(),
                                    format!("{name}.{field_name}"),
                                    SymbolType::EntityField,
                                    "python".to_string(),
                                    field_line,
                                    field_line,
                                );
                                field_symbol.metadata =
                                    Some(serde_json::json!({ "column_name": column_name }));
                                symbols.push(field_symbol);
                                refs.push(RawReference {
                                    source_qualified_name: format!("{name}.{field_name}"),
                                    target_expression: format!(
                                        "{}::{}",
                                        crate::language::orm::pluralize_table_name(&name),
                                        column_name
                                    ),
                                    ref_type_hint: ReferenceType::MapsTo,
                                    location: Location {
                                        file: file.path.clone(),
                                        line: field_line,
                                    },
                                });
                            }
                        }
                        symbols.push(symbol);
                    }
                    "function.def" => {
                        let Some(name_node) = node.child_by_field_name("name") else { continue };
                        let name = node_text(&name_node, source).to_string();
                        let is_method = node
                            .parent()
                            .and_then(|p| p.parent())
                            .map(|p| p.kind() == "class_definition")
                            .unwrap_or(false);
                        let symbol_type = if is_method { SymbolType::Method } else { SymbolType::Function };
                        let qualified_name = enclosing_class(&node, source)
                            .map(|c| format!("{c}.{name}"))
                            .unwrap_or_else(|| name.clone());
                        let line_start = node.start_position().row as u32 + 1;
                        let line_end = node.end_position().row as u32 + 1;
                        let mut symbol = Symbol::new(
                            file.path.clone(),
                            name.clone(),
                            qualified_name,
                            symbol_type,
                            "python".to_string(),
                            line_start,
                            line_end,
                        );
                        symbol.description = collect_leading_comment(source, line_start);
                        symbol.inferred_type = infer_type_from_path_and_name(&file.path, &name);
                        symbol.domains = derive_domains_from_path(&file.path);
                        symbols.push(symbol);
                    }
                    "import.module" => {
                        let module = node_text(&node, source).to_string();
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
                            location: Location {
                                file: file.path.clone(),
                                line,
                            },
                        });
                    }
                    _ => {}
                }
            }
        }

        Ok((symbols, refs))
    }
}

fn is_orm_base(class_node: &tree_sitter::Node, source: &str) -> bool {
    let Some(superclasses) = class_node.child_by_field_name("superclasses") else {
        return false;
    };
    let text = node_text(&superclasses, source);
    text.contains("Base") || text.contains("models.Model") || text.contains("Model")
}

fn class_body_lines<'a>(class_node: &tree_sitter::Node, source: &'a str) -> Vec<&'a str> {
    let Some(body) = class_node.child_by_field_name("body") else {
        return Vec::new();
    };
    let start = body.start_position().row;
    let end = body.end_position().row;
    source.lines().skip(start).take(end - start + 1).collect()
}

fn enclosing_class(node: &tree_sitter::Node, source: &str) -> Option<String> {
    let mut current = node.parent();
    while let Some(p) = current {
        if p.kind() == "class_definition" {
            let name_node = p.child_by_field_name("name")?;
            return Some(node_text(&name_node, source).to_string());
        }
        current = p.parent();
    }
    None
}

fn enclosing_function(node: &tree_sitter::Node, source: &str) -> Option<String> {
    let mut current = node.parent();
    while let Some(p) = current {
        if p.kind() == "function_definition" {
            let name_node = p.child_by_field_name("name")?;
            let name = node_text(&name_node, source).to_string();
            return Some(
                enclosing_class(&p, source)
                    .map(|c| format!("{c}.{name}"))
                    .unwrap_or(name),
            );
        }
        current = p.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_functions_classes_and_calls() {
        let source = r#"
import os

class User(Base):
    id = Column(Integer, primary_key=True)
    first_name = Column(String)

    def greet(self):
        return helper()

def helper():
    return "hi"
"#;
        let path = Path::new("models.py");
        let parsed = BACKEND.parse_file(path, source).expect("parsed");
        let (symbols, refs) = BACKEND.extract(&parsed).expect("extracted");

        assert!(symbols.iter().any(|s| s.name == "User" && s.symbol_type == SymbolType::Entity));
        assert!(symbols.iter().any(|s| s.name == "greet" && s.symbol_type == SymbolType::Method));
        assert!(symbols.iter().any(|s| s.name == "helper" && s.symbol_type == SymbolType::Function));
        assert!(symbols
            .iter()
            .any(|s| s.symbol_type == SymbolType::EntityField && s.name == "first_name"));
        assert!(refs.iter().any(|r| r.ref_type_hint == ReferenceType::Imports && r.target_expression == "os"));
        assert!(refs.iter().any(|r| r.ref_type_hint == ReferenceType::Calls && r.target_expression == "helper"));
    }
}
