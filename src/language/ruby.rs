use std::path::Path;

use tree_sitter::{Parser, Query, QueryCursor, StreamingIterator};
use tree_sitter_ruby::LANGUAGE;

use crate::language::orm::pluralize_table_name;
use crate::language::{
    collect_leading_comment, derive_domains_from_path, infer_type_from_path_and_name, node_text,
    BackendError, BackendResult, LanguageAdapter, ParsedFile,
};
use crate::model::reference::{Location, ReferenceType};
use crate::model::{RawReference, Symbol, SymbolType};

pub struct RubyBackend;
pub static BACKEND: RubyBackend = RubyBackend;

const QUERY_SRC: &str = r#"
(class
  name: (constant) @class.name
  superclass: (superclass (constant) @class.super)?) @class.def

(module
  name: (constant) @module.name) @module.def

(method
  name: (identifier) @method.name) @method.def

(call
  method: (identifier) @relation.name
  arguments: (argument_list (simple_symbol) @relation.target)
  (#eq? @relation.name "has_many")) @relation.call

(call
  method: (identifier) @relation.name
  arguments: (argument_list (simple_symbol) @relation.target)
  (#eq? @relation.name "belongs_to")) @relation.call

(call
  method: (identifier) @relation.name
  arguments: (argument_list (simple_symbol) @relation.target)
  (#eq? @relation.name "has_one")) @relation.call

(call
  method: (identifier) @require.name
  arguments: (argument_list (string (string_content) @require.target))
  (#eq? @require.name "require")) @require.call

(call
  method: (identifier) @require.name
  arguments: (argument_list (string (string_content) @require.target))
  (#eq? @require.name "require_relative")) @require.call

(call
  method: (identifier) @call.callee)
"#;

fn is_active_record_model(superclass: Option<&str>) -> bool {
    superclass
        .map(|s| s.contains("ActiveRecord::Base") || s == "ApplicationRecord")
        .unwrap_or(false)
}

fn enclosing_class(node: &tree_sitter::Node, source: &str) -> Option<String> {
    let mut current = node.parent();
    while let Some(p) = current {
        if p.kind() == "class" {
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
        if p.kind() == "method" {
            let name_node = p.child_by_field_name("name")?;
            let name = node_text(&name_node, source).to_string();
            return Some(
                enclosing_class(&p, source)
                    .map(|c| format!("{c}#{name}"))
                    .unwrap_or(name),
            );
        }
        current = p.parent();
    }
    None
}

impl LanguageAdapter for RubyBackend {
    fn id(&self) -> &'static str {
        "ruby"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["rb"]
    }

    fn parse_file(&self, path: &Path, source: &str) -> BackendResult<ParsedFile> {
        let mut parser = Parser::new();
        let language = LANGUAGE.into();
        parser.set_language(&language)?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| BackendError::new("failed to parse Ruby source"))?;
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
                        let superclass_text = node
                            .child_by_field_name("superclass")
                            .map(|n| node_text(&n, source).trim_start_matches('<').trim().to_string());
                        let is_model = is_active_record_model(superclass_text.as_deref());
                        let symbol_type = if is_model { SymbolType::Entity } else { SymbolType::Class };
                        let mut symbol = Symbol::new(
                            file.path.clone(),
                            name.clone(),
                            name.clone(),
                            symbol_type,
                            "ruby".to_string(),
                            line_start,
                            line_end,
                        );
                        symbol.description = collect_leading_comment(source, line_start);
                        symbol.inferred_type = infer_type_from_path_and_name(&file.path, &name);
                        symbol.domains = derive_domains_from_path(&file.path);
                        if is_model {
                            symbol.metadata = Some(serde_json::json!({
                                "table_name": pluralize_table_name(&name),
                            }));
                        }
                        symbols.push(symbol);

                        if let Some(superclass) = superclass_text {
                            if !is_model {
                                refs.push(RawReference {
                                    source_qualified_name: name,
                                    target_expression: superclass,
                                    ref_type_hint: ReferenceType::Extends,
                                    location: Location { file: file.path.clone(), line: line_start },
                                });
                            }
                        }
                    }
                    "module.def" => {
                        let Some(name_node) = node.child_by_field_name("name") else { continue };
                        let name = node_text(&name_node, source).to_string();
                        let line_start = node.start_position().row as u32 + 1;
                        let line_end = node.end_position().row as u32 + 1;
                        let mut symbol = Symbol::new(
                            file.path.clone(),
                            name.clone(),
                            name,
                            SymbolType::Namespace,
                            "ruby".to_string(),
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
                        let is_top_level = enclosing_class(&node, source).is_none();
                        let symbol_type = if is_top_level { SymbolType::Function } else { SymbolType::Method };
                        let qualified_name = enclosing_class(&node, source)
                            .map(|c| format!("{c}#{name}"))
                            .unwrap_or_else(|| name.clone());
                        let mut symbol = Symbol::new(
                            file.path.clone(),
                            name.clone(),
                            qualified_name,
                            symbol_type,
                            "ruby".to_string(),
                            line_start,
                            line_end,
                        );
                        symbol.description = collect_leading_comment(source, line_start);
                        symbol.inferred_type = infer_type_from_path_and_name(&file.path, &name);
                        symbol.domains = derive_domains_from_path(&file.path);
                        symbols.push(symbol);
                    }
                    "relation.call" => {
                        let Some(class_name) = enclosing_class(&node, source) else { continue };
                        let mut relation = None;
                        let mut target = None;
                        let mut c2 = node.walk();
                        for capture2 in m.captures {
                            let _ = &mut c2;
                            let cap_name = query.capture_names()[capture2.index as usize];
                            if cap_name == "relation.name" {
                                relation = Some(node_text(&capture2.node, source).to_string());
                            }
                            if cap_name == "relation.target" {
                                target = Some(node_text(&capture2.node, source).trim_start_matches(':').to_string());
                            }
                        }
                        if let (Some(relation), Some(target)) = (relation, target) {
                            let ref_type = match relation.as_str() {
                                "has_many" | "has_one" | "belongs_to" => ReferenceType::DependsOn,
                                _ => continue,
                            };
                            refs.push(RawReference {
                                source_qualified_name: class_name,
                                target_expression: target,
                                ref_type_hint: ref_type,
                                location: Location {
                                    file: file.path.clone(),
                                    line: node.start_position().row as u32 + 1,
                                },
                            });
                        }
                    }
                    "require.call" => {
                        let mut target = None;
                        for capture2 in m.captures {
                            let cap_name = query.capture_names()[capture2.index as usize];
                            if cap_name == "require.target" {
                                target = Some(node_text(&capture2.node, source).to_string());
                            }
                        }
                        if let Some(target) = target {
                            refs.push(RawReference {
                                source_qualified_name: file.path.display().to_string(),
                                target_expression: target,
                                ref_type_hint: ReferenceType::Imports,
                                location: Location {
                                    file: file.path.clone(),
                                    line: node.start_position().row as u32 + 1,
                                },
                            });
                        }
                    }
                    "call.callee" => {
                        let callee = node_text(&node, source).to_string();
                        if matches!(callee.as_str(), "has_many" | "belongs_to" | "has_one" | "require" | "require_relative") {
                            continue;
                        }
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
    fn extracts_active_record_model_and_relations() {
        let source = r#"
require 'set'

class Post < ApplicationRecord
  belongs_to :user
  has_many :comments

  def summary
    helper
  end
end
"#;
        let path = Path::new("post.rb");
        let parsed = BACKEND.parse_file(path, source).expect("parsed");
        let (symbols, refs) = BACKEND.extract(&parsed).expect("extracted");

        let post = symbols.iter().find(|s| s.name == "Post").expect("Post symbol");
        assert_eq!(post.symbol_type, SymbolType::Entity);
        assert_eq!(
            post.metadata.as_ref().unwrap().get("table_name").unwrap(),
            "posts"
        );

        assert!(refs.iter().any(|r| r.ref_type_hint == ReferenceType::DependsOn && r.target_expression == "user"));
        assert!(refs.iter().any(|r| r.ref_type_hint == ReferenceType::DependsOn && r.target_expression == "comments"));
        assert!(refs.iter().any(|r| r.ref_type_hint == ReferenceType::Imports && r.target_expression == "set"));
        assert!(refs.iter().any(|r| r.ref_type_hint == ReferenceType::Calls && r.target_expression == "helper"));
    }
}
