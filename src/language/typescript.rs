use std::path::Path;

use tree_sitter::{Node, Parser, TreeCursor};

use crate::language::orm::{pluralize_table_name, to_snake_case};
use crate::language::{
    collect_leading_comment, derive_domains_from_path, infer_type_from_path_and_name,
    node_line_end, node_line_start, node_text, BackendError, BackendResult, LanguageAdapter,
    ParsedFile,
};
use crate::model::reference::{Location, ReferenceType};
use crate::model::{RawReference, Symbol, SymbolType};

pub struct TypeScriptBackend;
pub static BACKEND: TypeScriptBackend = TypeScriptBackend;

/// TypeORM decorates entity classes and columns with `@Entity()`/`@Column()`.
/// The grammar attaches decorators as source lines immediately above the
/// decorated declaration rather than as a queryable child field, so this
/// scans upward the same way `collect_leading_comment` does for comments.
fn decorators_above(source: &str, line_start: u32) -> String {
    if line_start <= 1 {
        return String::new();
    }
    let lines: Vec<&str> = source.lines().collect();
    let mut idx = (line_start - 1).saturating_sub(1) as usize;
    let mut collected = Vec::new();
    loop {
        if idx >= lines.len() {
            break;
        }
        let trimmed = lines[idx].trim();
        if trimmed.is_empty() || !trimmed.starts_with('@') {
            break;
        }
        collected.push(trimmed.to_string());
        if idx == 0 {
            break;
        }
        idx -= 1;
    }
    collected.reverse();
    collected.join("\n")
}

fn quoted_arg_after(text: &str, marker: &str) -> Option<String> {
    let idx = text.find(marker)?;
    let rest = &text[idx..];
    let quote_start = rest.find(|c| c == '"' || c == '\'')?;
    let quote_char = rest.as_bytes()[quote_start] as char;
    let after = &rest[quote_start + 1..];
    let quote_end = after.find(quote_char)?;
    Some(after[..quote_end].to_string())
}

fn symbol_name(file: &ParsedFile, node: Node) -> Option<String> {
    if let Some(name_node) = node.child_by_field_name("name") {
        return Some(node_text(&name_node, file.source()).to_string());
    }
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .find(|c| matches!(c.kind(), "identifier" | "property_identifier" | "type_identifier"))
        .map(|c| node_text(&c, file.source()).to_string())
}

fn qualified_name_for(file: &ParsedFile, node: Node, leaf: &str) -> String {
    let mut segments = Vec::new();
    let mut current = node.parent();
    while let Some(p) = current {
        if matches!(p.kind(), "class_declaration" | "interface_declaration") {
            if let Some(name) = symbol_name(file, p) {
                segments.push(name);
            }
        }
        current = p.parent();
    }
    segments.reverse();
    segments.push(leaf.to_string());
    segments.join(".")
}

fn callee_name(file: &ParsedFile, call_node: Node) -> Option<String> {
    let function = call_node.child_by_field_name("function")?;
    match function.kind() {
        "identifier" | "property_identifier" => Some(node_text(&function, file.source()).to_string()),
        "member_expression" => {
            let prop = function.child_by_field_name("property")?;
            Some(node_text(&prop, file.source()).to_string())
        }
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
            self.file.language_id.to_string(),
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
            "function_declaration" => {
                if let Some(name) = symbol_name(self.file, node) {
                    let qname = qualified_name_for(self.file, node, &name);
                    self.push_symbol(name, qname.clone(), SymbolType::Function, node);
                    self.enclosing.push(qname);
                    self.collect_calls(node);
                    self.enclosing.pop();
                }
            }
            "method_definition" => {
                if let Some(name) = symbol_name(self.file, node) {
                    let qname = qualified_name_for(self.file, node, &name);
                    self.push_symbol(name, qname.clone(), SymbolType::Method, node);
                    self.enclosing.push(qname);
                    self.collect_calls(node);
                    self.enclosing.pop();
                }
            }
            "class_declaration" => {
                if let Some(name) = symbol_name(self.file, node) {
                    let qname = qualified_name_for(self.file, node, &name);
                    let line_start = node_line_start(&node);
                    let decorators = decorators_above(self.file.source(), line_start);
                    let is_entity = decorators.contains("@Entity");
                    let symbol_type = if is_entity { SymbolType::Entity } else { SymbolType::Class };
                    self.push_symbol(name.clone(), qname, symbol_type, node);
                    if is_entity {
                        let table = quoted_arg_after(&decorators, "@Entity")
                            .unwrap_or_else(|| pluralize_table_name(&name));
                        if let Some(last) = self.symbols.last_mut() {
                            last.metadata = Some(serde_json::json!({ "table_name": table }));
                        }
                    }
                    self.emit_heritage_refs(node, &name);
                    if is_entity {
                        self.emit_typeorm_fields(node, &name);
                    }
                }
            }
            "interface_declaration" => {
                if let Some(name) = symbol_name(self.file, node) {
                    let qname = qualified_name_for(self.file, node, &name);
                    self.push_symbol(name, qname, SymbolType::Interface, node);
                }
            }
            "import_statement" => {
                if let Some(source_node) = node.child_by_field_name("source") {
                    let module = node_text(&source_node, self.file.source())
                        .trim_matches(|c| c == '"' || c == '\'')
                        .to_string();
                    self.refs.push(RawReference {
                        source_qualified_name: self.file.path.display().to_string(),
                        target_expression: module,
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

    fn emit_heritage_refs(&mut self, class_node: Node<'a>, class_name: &str) {
        let mut cursor = class_node.walk();
        for child in class_node.children(&mut cursor) {
            if child.kind() == "class_heritage" {
                let text = node_text(&child, self.file.source());
                let (kind, body) = if let Some(rest) = text.strip_prefix("extends") {
                    (ReferenceType::Extends, rest)
                } else if let Some(rest) = text.strip_prefix("implements") {
                    (ReferenceType::Implements, rest)
                } else {
                    continue;
                };
                for target in body.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
                    self.refs.push(RawReference {
                        source_qualified_name: class_name.to_string(),
                        target_expression: target.to_string(),
                        ref_type_hint: kind,
                        location: Location {
                            file: self.file.path.clone(),
                            line: node_line_start(&class_node),
                        },
                    });
                }
            }
        }
    }

    /// Walk a `@Entity()`-decorated class body for `@Column()`-decorated
    /// properties, emitting `entity_field` symbols and `maps_to` raw
    /// references the same way the Java/C# adapters do for JPA/EF Core.
    fn emit_typeorm_fields(&mut self, class_node: Node<'a>, class_name: &str) {
        let Some(body) = class_node.child_by_field_name("body") else { return };
        let mut cursor = body.walk();
        for child in body.children(&mut cursor) {
            if !matches!(child.kind(), "public_field_definition" | "property_declaration") {
                continue;
            }
            let Some(name_node) = child.child_by_field_name("name") else { continue };
            let name = node_text(&name_node, self.file.source()).to_string();
            let line_start = node_line_start(&child);
            let decorators = decorators_above(self.file.source(), line_start);
            if !decorators.contains("@Column") && !decorators.contains("@PrimaryGeneratedColumn") {
                continue;
            }
            let column = quoted_arg_after(&decorators, "@Column").unwrap_or_else(|| to_snake_case(&name));
            let qualified_name = format!("{class_name}.{name}");
            let mut symbol = Symbol::new(
                self.file.path.clone(),
                name.clone(),
                qualified_name.clone(),
                SymbolType::EntityField,
                self.file.language_id.to_string(),
                line_start,
                line_start,
            );
            symbol.metadata = Some(serde_json::json!({ "column_name": column }));
            self.symbols.push(symbol);
            self.refs.push(RawReference {
                source_qualified_name: qualified_name,
                target_expression: format!("{}::{}", pluralize_table_name(class_name), column),
                ref_type_hint: ReferenceType::MapsTo,
                location: Location { file: self.file.path.clone(), line: line_start },
            });
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
                if !matches!(child.kind(), "function_declaration" | "method_definition") {
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

impl LanguageAdapter for TypeScriptBackend {
    fn id(&self) -> &'static str {
        "typescript"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["ts", "tsx"]
    }

    fn parse_file(&self, path: &Path, source: &str) -> BackendResult<ParsedFile> {
        let mut parser = Parser::new();
        let is_tsx = path.extension().and_then(|e| e.to_str()) == Some("tsx");
        let language = if is_tsx {
            tree_sitter_typescript::LANGUAGE_TSX.into()
        } else {
            tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
        };
        parser.set_language(&language)?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| BackendError::new("failed to parse TypeScript source"))?;
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
    fn extracts_interfaces_classes_and_heritage() {
        let source = r#"
import { Base } from "./base";

interface Greeter {
    greet(): void;
}

class Widget extends Base implements Greeter {
    greet(): void {
        console.log("hi");
    }
}
"#;
        let path = Path::new("widget.ts");
        let parsed = BACKEND.parse_file(path, source).expect("parsed");
        let (symbols, refs) = BACKEND.extract(&parsed).expect("extracted");

        assert!(symbols.iter().any(|s| s.name == "Greeter" && s.symbol_type == SymbolType::Interface));
        assert!(symbols.iter().any(|s| s.name == "Widget" && s.symbol_type == SymbolType::Class));
        assert!(refs.iter().any(|r| r.ref_type_hint == ReferenceType::Extends));
        assert!(refs.iter().any(|r| r.ref_type_hint == ReferenceType::Implements));
        assert!(refs.iter().any(|r| r.ref_type_hint == ReferenceType::Imports && r.target_expression == "./base"));
    }

    #[test]
    fn parses_tsx_without_hard_error() {
        let source = "const Widget = () => <div>hi</div>;\n";
        let path = Path::new("widget.tsx");
        let parsed = BACKEND.parse_file(path, source).expect("parsed");
        assert_eq!(parsed.language_id, "typescript");
    }

    #[test]
    fn extracts_typeorm_entity_and_column() {
        let source = r#"
@Entity("users")
class User {
    @PrimaryGeneratedColumn()
    id: number;

    @Column("first_name")
    firstName: string;
}
"#;
        let path = Path::new("user.ts");
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
            .find(|s| s.symbol_type == SymbolType::EntityField && s.name == "firstName")
            .expect("field symbol");
        assert_eq!(
            field.metadata.as_ref().unwrap().get("column_name").unwrap(),
            "first_name"
        );

        assert!(refs.iter().any(|r| r.ref_type_hint == ReferenceType::MapsTo));
    }
}
