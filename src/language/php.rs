use std::path::Path;

use tree_sitter::{Parser, Query, QueryCursor, StreamingIterator};
use tree_sitter_php::LANGUAGE_PHP;

use crate::language::orm::pluralize_table_name;
use crate::language::{
    collect_leading_comment, derive_domains_from_path, infer_type_from_path_and_name, node_text,
    BackendError, BackendResult, LanguageAdapter, ParsedFile,
};
use crate::model::reference::{Location, ReferenceType};
use crate::model::{RawReference, Symbol, SymbolType};

pub struct PhpBackend;
pub static BACKEND: PhpBackend = PhpBackend;

const QUERY_SRC: &str = r#"
(class_declaration
  name: (name) @class.name
  (base_clause (name) @class.extends)?) @class.def

(method_declaration
  name: (name) @method.name) @method.def

(property_declaration
  (property_element (variable_name (name) @property.name))) @property.def

(namespace_use_clause
  (qualified_name) @import.module)

(function_call_expression
  function: (name) @call.callee)

(member_call_expression
  name: (name) @call.callee)
"#;

/// `protected $table = 'custom_table';` inside an Eloquent model body.
fn explicit_table_name(body: &tree_sitter::Node, source: &str) -> Option<String> {
    let text = node_text(body, source);
    let idx = text.find("$table")?;
    let rest = &text[idx..];
    let eq = rest.find('=')?;
    let after_eq = rest[eq + 1..].trim_start();
    let quote = after_eq.chars().next()?;
    if quote != '\'' && quote != '"' {
        return None;
    }
    let end = after_eq[1..].find(quote)?;
    Some(after_eq[1..1 + end].to_string())
}

fn is_eloquent_model(extends: Option<&str>) -> bool {
    extends.map(|e| e.contains("Model")).unwrap_or(false)
}

fn enclosing_class(node: &tree_sitter::Node, source: &str) -> Option<String> {
    let mut current = node.parent();
    while let Some(p) = current {
        if p.kind() == "class_declaration" {
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
                    .map(|c| format!("{c}::{name}"))
                    .unwrap_or(name),
            );
        }
        current = p.parent();
    }
    None
}

impl LanguageAdapter for PhpBackend {
    fn id(&self) -> &'static str {
        "php"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["php"]
    }

    fn parse_file(&self, path: &Path, source: &str) -> BackendResult<ParsedFile> {
        let mut parser = Parser::new();
        let language = LANGUAGE_PHP.into();
        parser.set_language(&language)?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| BackendError::new("failed to parse PHP source"))?;
        Ok(ParsedFile::new(self.id(), path, tree, source.to_string()))
    }

    fn extract(&self, file: &ParsedFile) -> BackendResult<(Vec<Symbol>, Vec<RawReference>)> {
        let language = LANGUAGE_PHP.into();
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
                        let extends_text = node
                            .child_by_field_name("base_clause")
                            .or_else(|| {
                                let mut c = node.walk();
                                node.children(&mut c).find(|n| n.kind() == "base_clause")
                            })
                            .map(|n| node_text(&n, source).trim_start_matches("extends").trim().to_string());
                        let is_model = is_eloquent_model(extends_text.as_deref());
                        let symbol_type = if is_model { SymbolType::Entity } else { SymbolType::Class };
                        let mut symbol = Symbol::new(
                            file.path.clone(),
                            name.clone(),
                            name.clone(),
                            symbol_type,
                            "php".to_string(),
                            line_start,
                            line_end,
                        );
                        symbol.description = collect_leading_comment(source, line_start);
                        symbol.inferred_type = infer_type_from_path_and_name(&file.path, &name);
                        symbol.domains = derive_domains_from_path(&file.path);
                        if is_model {
                            let body = node.child_by_field_name("body");
                            let table = body
                                .as_ref()
                                .and_then(|b| explicit_table_name(b, source))
                                .unwrap_or_else(|| pluralize_table_name(&name));
                            symbol.metadata = Some(serde_json::json!({ "table_name": table }));
                        } else if let Some(extends) = extends_text {
                            refs.push(RawReference {
                                source_qualified_name: name.clone(),
                                target_expression: extends,
                                ref_type_hint: ReferenceType::Extends,
                                location: Location { file: file.path.clone(), line: line_start },
                            });
                        }
                        symbols.push(symbol);
                    }
                    "method.def" => {
                        let Some(name_node) = node.child_by_field_name("name") else { continue };
                        let name = node_text(&name_node, source).to_string();
                        let line_start = node.start_position().row as u32 + 1;
                        let line_end = node.end_position().row as u32 + 1;
                        let qualified_name = enclosing_class(&node, source)
                            .map(|c| format!("{c}::{name}"))
                            .unwrap_or_else(|| name.clone());
                        let mut symbol = Symbol::new(
                            file.path.clone(),
                            name.clone(),
                            qualified_name,
                            SymbolType::Method,
                            "php".to_string(),
                            line_start,
                            line_end,
                        );
                        symbol.description = collect_leading_comment(source, line_start);
                        symbol.inferred_type = infer_type_from_path_and_name(&file.path, &name);
                        symbol.domains = derive_domains_from_path(&file.path);
                        symbols.push(symbol);
                    }
                    "property.def" => {
                        let name = node_text(&node, source).to_string();
                        let Some(class_name) = enclosing_class(&node, source) else { continue };
                        if name == "table" {
                            continue;
                        }
                        let line_start = node.start_position().row as u32 + 1;
                        let symbol = Symbol::new(
                            file.path.clone(),
                            name.clone(),
                            format!("{class_name}::{name}"),
                            SymbolType::Field,
                            "php".to_string(),
                            line_start,
                            line_start,
                        );
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
    fn extracts_eloquent_model_and_table_override() {
        let source = r#"<?php
use App\Support\Helper;

class User extends Model
{
    protected $table = 'app_users';

    public function greet()
    {
        return helper();
    }
}
"#;
        let path = Path::new("User.php");
        let parsed = BACKEND.parse_file(path, source).expect("parsed");
        let (symbols, refs) = BACKEND.extract(&parsed).expect("extracted");

        let user = symbols.iter().find(|s| s.name == "User").expect("User symbol");
        assert_eq!(user.symbol_type, SymbolType::Entity);
        assert_eq!(
            user.metadata.as_ref().unwrap().get("table_name").unwrap(),
            "app_users"
        );
        assert!(symbols.iter().any(|s| s.name == "greet" && s.symbol_type == SymbolType::Method));
        assert!(refs.iter().any(|r| r.ref_type_hint == ReferenceType::Imports));
        assert!(refs.iter().any(|r| r.ref_type_hint == ReferenceType::Calls && r.target_expression == "helper"));
    }
}
