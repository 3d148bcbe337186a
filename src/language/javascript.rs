use std::path::Path;

use tree_sitter::{Node, Parser, TreeCursor};
use tree_sitter_javascript::LANGUAGE;

use crate::language::orm::{pluralize_table_name, to_snake_case};
use crate::language::{
    collect_leading_comment, derive_domains_from_path, infer_type_from_path_and_name,
    node_line_end, node_line_start, node_text, BackendError, BackendResult, LanguageAdapter,
    ParsedFile,
};
use crate::model::reference::{Location, ReferenceType};
use crate::model::{RawReference, Symbol, SymbolType};

pub struct JavaScriptBackend;
pub static BACKEND: JavaScriptBackend = JavaScriptBackend;

fn string_literal_value(node: &Node, source: &str) -> Option<String> {
    if node.kind() != "string" {
        return None;
    }
    Some(node_text(node, source).trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string())
}

fn symbol_name(file: &ParsedFile, node: Node) -> Option<String> {
    if let Some(name_node) = node.child_by_field_name("name") {
        return Some(node_text(&name_node, file.source()).to_string());
    }
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .find(|c| matches!(c.kind(), "identifier" | "property_identifier"))
        .map(|c| node_text(&c, file.source()).to_string())
}

fn is_top_level(node: Node) -> bool {
    let mut parent = node.parent();
    while let Some(p) = parent {
        match p.kind() {
            "program" => return true,
            "function_declaration" | "function" | "method_definition" | "arrow_function"
            | "generator_function" | "class_body" => return false,
            _ => parent = p.parent(),
        }
    }
    false
}

fn qualified_name_for(file: &ParsedFile, node: Node, leaf: &str) -> String {
    let mut segments = Vec::new();
    let mut current = node.parent();
    while let Some(p) = current {
        if p.kind() == "class_declaration" {
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
                    let superclass_text = node
                        .child_by_field_name("superclass")
                        .map(|h| node_text(&h, self.file.source()).to_string())
                        .unwrap_or_default();
                    let is_sequelize_model = superclass_text.contains("Model");
                    let symbol_type = if is_sequelize_model { SymbolType::Entity } else { SymbolType::Class };
                    self.push_symbol(name.clone(), qname, symbol_type, node);
                    if is_sequelize_model {
                        if let Some(last) = self.symbols.last_mut() {
                            last.metadata = Some(serde_json::json!({
                                "table_name": pluralize_table_name(&name)
                            }));
                        }
                    }
                    if !superclass_text.is_empty() {
                        let target = superclass_text.trim_start_matches("extends").trim().to_string();
                        if !target.is_empty() {
                            self.refs.push(RawReference {
                                source_qualified_name: name,
                                target_expression: target,
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
            "call_expression" => {
                self.maybe_extract_sequelize_init(node);
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
            "variable_declarator" if is_top_level(node) => {
                if let Some(name) = symbol_name(self.file, node) {
                    let qname = qualified_name_for(self.file, node, &name);
                    self.push_symbol(name, qname, SymbolType::Variable, node);
                }
            }
            _ => {}
        }
    }

    /// Sequelize entities declare their fields separately from the class
    /// body via `User.init({ firstName: DataTypes.STRING }, { tableName:
    /// "users" })`. Resolve the field object's keys into `entity_field`
    /// symbols and `maps_to` refs, and backfill the entity's table name
    /// from the options object when present.
    fn maybe_extract_sequelize_init(&mut self, node: Node<'a>) {
        let Some(function) = node.child_by_field_name("function") else { return };
        if function.kind() != "member_expression" {
            return;
        }
        let Some(prop) = function.child_by_field_name("property") else { return };
        if node_text(&prop, self.file.source()) != "init" {
            return;
        }
        let Some(object) = function.child_by_field_name("object") else { return };
        let class_name = node_text(&object, self.file.source()).to_string();
        if !self
            .symbols
            .iter()
            .any(|s| s.name == class_name && s.symbol_type == SymbolType::Entity)
        {
            return;
        }

        let Some(args) = node.child_by_field_name("arguments") else { return };
        let mut arg_cursor = args.walk();
        let object_args: Vec<Node> = args
            .children(&mut arg_cursor)
            .filter(|c| c.kind() == "object")
            .collect();
        let Some(fields_obj) = object_args.first() else { return };

        if let Some(options_obj) = object_args.get(1) {
            if let Some(table_name) = self.find_object_string_prop(*options_obj, "tableName") {
                if let Some(entity) = self.symbols.iter_mut().find(|s| s.name == class_name) {
                    entity.metadata = Some(serde_json::json!({ "table_name": table_name }));
                }
            }
        }

        let mut field_cursor = fields_obj.walk();
        for pair in fields_obj.children(&mut field_cursor) {
            if pair.kind() != "pair" {
                continue;
            }
            let Some(key_node) = pair.child_by_field_name("key") else { continue };
            let field_name = node_text(&key_node, self.file.source()).to_string();
            let line_start = node_line_start(&pair);
            let qualified_name = format!("{class_name}.{field_name}");
            let mut symbol = Symbol::new(
                self.file.path.clone(),
                field_name.clone(),
                qualified_name.clone(),
                SymbolType::EntityField,
                self.file.language_id.to_string(),
                line_start,
                line_start,
            );
            let column = to_snake_case(&field_name);
            symbol.metadata = Some(serde_json::json!({ "column_name": column }));
            self.symbols.push(symbol);
            self.refs.push(RawReference {
                source_qualified_name: qualified_name,
                target_expression: format!("{}::{}", pluralize_table_name(&class_name), column),
                ref_type_hint: ReferenceType::MapsTo,
                location: Location { file: self.file.path.clone(), line: line_start },
            });
        }
    }

    fn find_object_string_prop(&self, object_node: Node<'a>, key: &str) -> Option<String> {
        let mut cursor = object_node.walk();
        for pair in object_node.children(&mut cursor) {
            if pair.kind() != "pair" {
                continue;
            }
            let Some(key_node) = pair.child_by_field_name("key") else { continue };
            if node_text(&key_node, self.file.source()) != key {
                continue;
            }
            let Some(value_node) = pair.child_by_field_name("value") else { continue };
            if let Some(v) = string_literal_value(&value_node, self.file.source()) {
                return Some(v);
            }
        }
        None
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

impl LanguageAdapter for JavaScriptBackend {
    fn id(&self) -> &'static str {
        "javascript"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["js", "jsx", "mjs", "cjs"]
    }

    fn parse_file(&self, path: &Path, source: &str) -> BackendResult<ParsedFile> {
        let mut parser = Parser::new();
        let language = LANGUAGE.into();
        parser.set_language(&language)?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| BackendError::new("failed to parse JavaScript source"))?;
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
    fn extracts_function_and_class_symbols() {
        let source = r#"
/**
 * Adds two numbers.
 */
function add(a, b) {
    return helper(a, b);
}

function helper(a, b) {
    return a + b;
}

class Widget extends Base {
    render() {
        return add(1, 2);
    }
}
"#;
        let path = Path::new("widget.js");
        let parsed = BACKEND.parse_file(path, source).expect("parsed");
        let (symbols, refs) = BACKEND.extract(&parsed).expect("extracted");

        assert!(symbols.iter().any(|s| s.name == "add" && s.symbol_type == SymbolType::Function));
        assert!(symbols.iter().any(|s| s.name == "Widget" && s.symbol_type == SymbolType::Class));
        assert!(symbols.iter().any(|s| s.name == "render" && s.symbol_type == SymbolType::Method));

        assert!(refs
            .iter()
            .any(|r| r.ref_type_hint == ReferenceType::Calls && r.target_expression == "helper"));
        assert!(refs
            .iter()
            .any(|r| r.ref_type_hint == ReferenceType::Extends && r.target_expression == "Base"));
    }

    #[test]
    fn extracts_sequelize_entity_and_fields() {
        let source = r#"
class User extends Model {}

User.init({
    firstName: DataTypes.STRING
}, {
    sequelize,
    tableName: "app_users"
});
"#;
        let path = Path::new("user.js");
        let parsed = BACKEND.parse_file(path, source).expect("parsed");
        let (symbols, refs) = BACKEND.extract(&parsed).expect("extracted");

        let user = symbols.iter().find(|s| s.name == "User").expect("User symbol");
        assert_eq!(user.symbol_type, SymbolType::Entity);
        assert_eq!(
            user.metadata.as_ref().unwrap().get("table_name").unwrap(),
            "app_users"
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
