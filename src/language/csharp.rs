use std::path::Path;

use tree_sitter::{Parser, Query, QueryCursor, StreamingIterator};
use tree_sitter_c_sharp::LANGUAGE;

use crate::language::orm::{pluralize_table_name, to_snake_case};
use crate::language::{
    collect_leading_comment, derive_domains_from_path, infer_type_from_path_and_name, node_text,
    BackendError, BackendResult, LanguageAdapter, ParsedFile,
};
use crate::model::reference::{Location, ReferenceType};
use crate::model::{RawReference, Symbol, SymbolType};

pub struct CSharpBackend;
pub static BACKEND: CSharpBackend = CSharpBackend;

const QUERY_SRC: &str = r#"
(class_declaration
  name: (identifier) @class.name
  (base_list)? @class.bases) @class.def

(interface_declaration
  name: (identifier) @interface.name) @interface.def

(method_declaration
  name: (identifier) @method.name) @method.def

(property_declaration
  name: (identifier) @property.name) @property.def

(using_directive
  (qualified_name) @import.module)

(using_directive
  (identifier) @import.module)

(invocation_expression
  function: (identifier) @call.callee)

(invocation_expression
  function: (member_access_expression
    name: (identifier) @call.callee))
"#;

/// `[Table("users")]` above a class, or the bare `[Table]` / EF Core
/// convention fallback of the pluralized class name.
fn table_attribute(class_node: &tree_sitter::Node, source: &str) -> Option<(bool, Option<String>)> {
    let mut cursor = class_node.walk();
    let mut is_entity = false;
    let mut table_name = None;
    for child in class_node.children(&mut cursor) {
        if child.kind() == "attribute_list" {
            let text = node_text(&child, source);
            if text.contains("Table") || text.contains("Entity") {
                is_entity = true;
            }
            if let Some(idx) = text.find("Table") {
                let rest = &text[idx..];
                if let Some(quote_start) = rest.find('"') {
                    if let Some(quote_end) = rest[quote_start + 1..].find('"') {
                        table_name = Some(rest[quote_start + 1..quote_start + 1 + quote_end].to_string());
                    }
                }
            }
        }
    }
    if is_entity {
        Some((is_entity, table_name))
    } else {
        None
    }
}

fn is_dbset_member(node: &tree_sitter::Node, source: &str) -> bool {
    node.child_by_field_name("type")
        .map(|t| node_text(&t, source).starts_with("DbSet"))
        .unwrap_or(false)
}

fn column_attribute(node: &tree_sitter::Node, source: &str) -> Option<String> {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "attribute_list" {
            let text = node_text(&child, source);
            if let Some(idx) = text.find("Column") {
                let rest = &text[idx..];
                if let Some(quote_start) = rest.find('"') {
                    if let Some(quote_end) = rest[quote_start + 1..].find('"') {
                        return Some(rest[quote_start + 1..quote_start + 1 + quote_end].to_string());
                    }
                }
            }
        }
    }
    None
}

fn enclosing_class(node: &tree_sitter::Node, source: &str) -> Option<String> {
    let mut current = node.parent();
    while let Some(p) = current {
        if matches!(p.kind(), "class_declaration" | "interface_declaration") {
            let name_node = p.child_by_field_name("name")?;
            return Some(node_text(&name_node, source).to_string());
        }
        current = p.parent();
    }
    None
}

fn enclosing_method(node: &tree_sitter::Node, source: &str) -> Option<String> {
    let mut current = node.parent();
    while let Some(p) = current {
        if p.kind() == "method_declaration" {
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

impl LanguageAdapter for CSharpBackend {
    fn id(&self) -> &'static str {
        "csharp"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["cs"]
    }

    fn parse_file(&self, path: &Path, source: &str) -> BackendResult<ParsedFile> {
        let mut parser = Parser::new();
        let language = LANGUAGE.into();
        parser.set_language(&language)?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| BackendError::new("failed to parse C# source"))?;
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
                        let entity_info = table_attribute(&node, source);
                        let symbol_type = if entity_info.is_some() { SymbolType::Entity } else { SymbolType::Class };
                        let mut symbol = Symbol::new(
                            file.path.clone(),
                            name.clone(),
                            name.clone(),
                            symbol_type,
                            "csharp".to_string(),
                            line_start,
                            line_end,
                        );
                        symbol.description = collect_leading_comment(source, line_start);
                        symbol.inferred_type = infer_type_from_path_and_name(&file.path, &name);
                        symbol.domains = derive_domains_from_path(&file.path);
                        if let Some((_, explicit_table)) = &entity_info {
                            let table = explicit_table.clone().unwrap_or_else(|| pluralize_table_name(&name));
                            symbol.metadata = Some(serde_json::json!({ "table_name": table }));
                        }
                        symbols.push(symbol);

                        if let Some(bases) = node.child_by_field_name("bases").or_else(|| {
                            let mut c = node.walk();
                            node.children(&mut c).find(|n| n.kind() == "base_list")
                        }) {
                            let text = node_text(&bases, source);
                            for target in text
                                .trim_start_matches(':')
                                .split(',')
                                .map(|s| s.trim())
                                .filter(|s| !s.is_empty())
                            {
                                refs.push(RawReference {
                                    source_qualified_name: name.clone(),
                                    target_expression: target.to_string(),
                                    ref_type_hint: ReferenceType::Extends,
                                    location: Location { file: file.path.clone(), line: line_start },
                                });
                            }
                        }
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
                            "csharp".to_string(),
                            line_start,
                            line_end,
                        );
                        symbol.description = collect_leading_comment(source, line_start);
                        symbols.push(symbol);
                    }
                    "method.def" => {
                        let Some(name_node) = node.child_by_field_name("name") else { continue };
                        let name = node_text(&name_node, source).to_string();
                        let line_start = node.start_position().row as u32 + 1;
                        let line_end = node.end_position().row as u32 + 1;
                        let qualified_name = enclosing_class(&node, source)
                            .map(|c| format!("{c}.{name}"))
                            .unwrap_or_else(|| name.clone());
                        let mut symbol = Symbol::new(
                            file.path.clone(),
                            name.clone(),
                            qualified_name,
                            SymbolType::Method,
                            "csharp".to_string(),
                            line_start,
                            line_end,
                        );
                        symbol.description = collect_leading_comment(source, line_start);
                        symbol.inferred_type = infer_type_from_path_and_name(&file.path, &name);
                        symbol.domains = derive_domains_from_path(&file.path);
                        symbols.push(symbol);
                    }
                    "property.def" => {
                        let Some(name_node) = node.child_by_field_name("name") else { continue };
                        let name = node_text(&name_node, source).to_string();
                        let Some(class_name) = enclosing_class(&node, source) else { continue };
                        let line_start = node.start_position().row as u32 + 1;
                        if is_dbset_member(&node, source) {
                            continue;
                        }
                        let field_type = if column_attribute(&node, source).is_some() {
                            SymbolType::EntityField
                        } else {
                            SymbolType::Field
                        };
                        let mut symbol = Symbol::new(
                            file.path.clone(),
                            name.clone(),
                            format!("{class_name}.{name}"),
                            field_type,
                            "csharp".to_string(),
                            line_start,
                            line_start,
                        );
                        if field_type == SymbolType::EntityField {
                            let column = column_attribute(&node, source).unwrap_or_else(|| to_snake_case(&name));
                            symbol.metadata = Some(serde_json::json!({ "column_name": column }));
                            symbols.push(symbol);
                            refs.push(RawReference {
                                source_qualified_name: format!("{class_name}.{name}"),
                                target_expression: format!("{}::{}", pluralize_table_name(&class_name), column),
                                ref_type_hint: ReferenceType::MapsTo,
                                location: Location { file: file.path.clone(), line: line_start },
                            });
                        } else {
                            symbols.push(symbol);
                        }
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
                        let caller = enclosing_method(&node, source).unwrap_or_else(|| file.path.display().to_string());
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
    fn extracts_entity_class_and_properties() {
        let source = r#"
using System.Collections.Generic;

[Table("users")]
public class User
{
    [Column("first_name")]
    public string FirstName { get; set; }

    public string Greet()
    {
        return Helper();
    }
}
"#;
        let path = Path::new("User.cs");
        let parsed = BACKEND.parse_file(path, source).expect("parsed");
        let (symbols, refs) = BACKEND.extract(&parsed).expect("extracted");

        let user = symbols.iter().find(|s| s.name == "User").expect("User symbol");
        assert_eq!(user.symbol_type, SymbolType::Entity);
        assert_eq!(
            user.metadata.as_ref().unwrap().get("table_name").unwrap(),
            "users"
        );

        let field = symbols
            .iter()
            .find(|s| s.symbol_type == SymbolType::EntityField)
            .expect("field symbol");
        assert_eq!(
            field.metadata.as_ref().unwrap().get("column_name").unwrap(),
            "first_name"
        );

        assert!(refs.iter().any(|r| r.ref_type_hint == ReferenceType::Imports));
        assert!(refs.iter().any(|r| r.ref_type_hint == ReferenceType::MapsTo));
    }
}
