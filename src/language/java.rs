use std::path::Path;

use tree_sitter::{Parser, Query, QueryCursor, StreamingIterator};
use tree_sitter_java::LANGUAGE;

use crate::language::orm::{pluralize_table_name, to_snake_case};
use crate::language::{
    collect_leading_comment, derive_domains_from_path, infer_type_from_path_and_name, node_text,
    BackendError, BackendResult, LanguageAdapter, ParsedFile,
};
use crate::model::reference::{Location, ReferenceType};
use crate::model::{RawReference, Symbol, SymbolType};

pub struct JavaBackend;
pub static BACKEND: JavaBackend = JavaBackend;

const QUERY_SRC: &str = r#"
(class_declaration
  name: (identifier) @class.name
  superclass: (superclass)? @class.extends
  interfaces: (super_interfaces)? @class.implements) @class.def

(interface_declaration
  name: (identifier) @interface.name) @interface.def

(method_declaration
  name: (identifier) @method.name) @method.def

(field_declaration
  (modifiers (marker_annotation name: (identifier) @field.annotation))?
  (variable_declarator name: (identifier) @field.name)) @field.def

(import_declaration
  (scoped_identifier) @import.module)

(method_invocation
  name: (identifier) @call.callee) @call.expr
"#;

/// Does a JPA `@Entity`/`@Table` annotation decorate this class? Java's
/// grammar attaches annotations as siblings of the class declaration
/// inside the enclosing `class_declaration`'s `modifiers` node, so the
/// check walks the class's own leading modifiers text.
fn jpa_annotations(class_node: &tree_sitter::Node, source: &str) -> (bool, Option<String>) {
    let mut cursor = class_node.walk();
    let mut is_entity = false;
    let mut table_name = None;
    for child in class_node.children(&mut cursor) {
        if child.kind() == "modifiers" {
            let text = node_text(&child, source);
            if text.contains("@Entity") {
                is_entity = true;
            }
            if let Some(idx) = text.find("@Table") {
                if let Some(name_start) = text[idx..].find("name") {
                    let rest = &text[idx + name_start..];
                    if let Some(quote_start) = rest.find('"') {
                        if let Some(quote_end) = rest[quote_start + 1..].find('"') {
                            table_name = Some(rest[quote_start + 1..quote_start + 1 + quote_end].to_string());
                        }
                    }
                }
            }
        }
    }
    (is_entity, table_name)
}

fn column_annotation_name(field_node: &tree_sitter::Node, source: &str) -> Option<String> {
    let mut cursor = field_node.walk();
    for child in field_node.children(&mut cursor) {
        if child.kind() == "modifiers" {
            let text = node_text(&child, source);
            if let Some(idx) = text.find("@Column") {
                if let Some(name_start) = text[idx..].find("name") {
                    let rest = &text[idx + name_start..];
                    if let Some(quote_start) = rest.find('"') {
                        if let Some(quote_end) = rest[quote_start + 1..].find('"') {
                            return Some(rest[quote_start + 1..quote_start + 1 + quote_end].to_string());
                        }
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

impl LanguageAdapter for JavaBackend {
    fn id(&self) -> &'static str {
        "java"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["java"]
    }

    fn parse_file(&self, path: &Path, source: &str) -> BackendResult<ParsedFile> {
        let mut parser = Parser::new();
        let language = LANGUAGE.into();
        parser.set_language(&language)?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| BackendError::new("failed to parse Java source"))?;
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
                        let (is_entity, explicit_table) = jpa_annotations(&node, source);
                        let symbol_type = if is_entity { SymbolType::Entity } else { SymbolType::Class };
                        let mut symbol = Symbol::new(
                            file.path.clone(),
                            name.clone(),
                            name.clone(),
                            symbol_type,
                            "java".to_string(),
                            line_start,
                            line_end,
                        );
                        symbol.description = collect_leading_comment(source, line_start);
                        symbol.inferred_type = infer_type_from_path_and_name(&file.path, &name);
                        symbol.domains = derive_domains_from_path(&file.path);
                        if is_entity {
                            let table = explicit_table.unwrap_or_else(|| pluralize_table_name(&name));
                            symbol.metadata = Some(serde_json::json!({ "table_name": table }));
                        }
                        symbols.push(symbol);

                        if let Some(extends_node) = node.child_by_field_name("superclass") {
                            let text = node_text(&extends_node, source)
                                .trim_start_matches("extends")
                                .trim()
                                .to_string();
                            refs.push(RawReference {
                                source_qualified_name: name.clone(),
                                target_expression: text,
                                ref_type_hint: ReferenceType::Extends,
                                location: Location { file: file.path.clone(), line: line_start },
                            });
                        }
                        if let Some(impl_node) = node.child_by_field_name("interfaces") {
                            let text = node_text(&impl_node, source);
                            for target in text
                                .trim_start_matches("implements")
                                .split(',')
                                .map(|s| s.trim())
                                .filter(|s| !s.is_empty())
                            {
                                refs.push(RawReference {
                                    source_qualified_name: name.clone(),
                                    target_expression: target.to_string(),
                                    ref_type_hint: ReferenceType::Implements,
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
                            "java".to_string(),
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
                            "java".to_string(),
                            line_start,
                            line_end,
                        );
                        symbol.description = collect_leading_comment(source, line_start);
                        symbol.inferred_type = infer_type_from_path_and_name(&file.path, &name);
                        symbol.domains = derive_domains_from_path(&file.path);
                        symbols.push(symbol);
                    }
                    "field.def" => {
                        if let Some(declarator) = find_variable_declarator(&node) {
                            let Some(name_node) = declarator.child_by_field_name("name") else { continue };
                            let name = node_text(&name_node, source).to_string();
                            let Some(class_name) = enclosing_class(&node, source) else { continue };
                            let line_start = node.start_position().row as u32 + 1;
                            let column = column_annotation_name(&node, source)
                                .unwrap_or_else(|| to_snake_case(&name));
                            let mut symbol = Symbol::new(
                                file.path.clone(),
                                name.clone(),
                                format!("{class_name}.{name}"),
                                SymbolType::EntityField,
                                "java".to_string(),
                                line_start,
                                line_start,
                            );
                            symbol.metadata = Some(serde_json::json!({ "column_name": column }));
                            symbols.push(symbol);
                            refs.push(RawReference {
                                source_qualified_name: format!("{class_name}.{name}"),
                                target_expression: format!("{}::{}", pluralize_table_name(&class_name), column),
                                ref_type_hint: ReferenceType::MapsTo,
                                location: Location { file: file.path.clone(), line: line_start },
                            });
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

fn find_variable_declarator<'a>(field_node: &tree_sitter::Node<'a>) -> Option<tree_sitter::Node<'a>> {
    let mut cursor = field_node.walk();
    field_node
        .children(&mut cursor)
        .find(|c| c.kind() == "variable_declarator")
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_entity_and_field_metadata() {
        let source = r#"
import java.util.List;

@Entity
@Table(name = "users")
public class User {
    @Column(name = "first_name")
    private String firstName;

    public String greet() {
        return helper();
    }
}
"#;
        let path = Path::new("User.java");
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
