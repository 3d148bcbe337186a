use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Coarse architectural bucket a symbol belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolLayer {
    Backend,
    View,
    Frontend,
    Database,
    Document,
    Config,
}

/// Fine-grained symbol tag. Closed enum grouped by architectural layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolType {
    // backend
    Function,
    Method,
    Class,
    Interface,
    Struct,
    Enum,
    Trait,
    Namespace,
    Variable,
    Field,
    Controller,
    ControllerMethod,
    Service,
    Dao,
    Repository,
    // database / ORM
    Entity,
    EntityField,
    Table,
    Column,
    // view / frontend
    JspPage,
    Template,
    Component,
    DataBinding,
    ElExpression,
    // document
    DocSection,
    // infra
    ServiceNode,
    ConfigKey,
}

impl SymbolType {
    /// The architectural layer a given symbol type belongs to by default.
    /// Adapters may still assign a different layer when context demands it.
    pub fn default_layer(self) -> SymbolLayer {
        use SymbolType::*;
        match self {
            Function | Method | Class | Interface | Struct | Enum | Trait | Namespace
            | Variable | Field | Controller | ControllerMethod | Service | Dao | Repository => {
                SymbolLayer::Backend
            }
            Entity | EntityField | Table | Column => SymbolLayer::Database,
            JspPage | Template => SymbolLayer::View,
            Component | DataBinding | ElExpression => SymbolLayer::Frontend,
            DocSection => SymbolLayer::Document,
            ServiceNode | ConfigKey => SymbolLayer::Config,
        }
    }
}

/// `code` for parsed source symbols, `doc` for document-derived symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Code,
    Doc,
}

/// Resolution confidence for a `Reference`, also used as the lineage
/// path confidence (the minimum of its constituent edge confidences).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Inferred,
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
            Confidence::Inferred => "inferred",
        }
    }
}

/// A structural symbol: a function, class, entity field, view, template,
/// doc section, or any other unit the language/document adapters extract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    /// `file_path + "::" + qualified_name + "::" + symbol_type + "@" + line_start`.
    pub id: String,
    pub name: String,
    pub qualified_name: String,
    #[serde(rename = "type")]
    pub symbol_type: SymbolType,
    pub layer: SymbolLayer,
    pub file_path: PathBuf,
    pub line_start: u32,
    pub line_end: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub language: String,
    pub domain: Domain,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inferred_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Symbol {
    /// Compute the stable, content-independent identity for a symbol.
    /// Survives trivial reformatting: it depends only on file path,
    /// qualified name, type tag, and starting line.
    pub fn compute_id(
        file_path: &std::path::Path,
        qualified_name: &str,
        symbol_type: SymbolType,
        line_start: u32,
    ) -> String {
        let type_tag = serde_json::to_value(symbol_type)
            .ok()
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .unwrap_or_else(|| "unknown".to_string());
        format!(
            "{}::{}::{}@{}",
            file_path.display(),
            qualified_name,
            type_tag,
            line_start
        )
    }

    pub fn new(
        file_path: PathBuf,
        name: String,
        qualified_name: String,
        symbol_type: SymbolType,
        language: String,
        line_start: u32,
        line_end: u32,
    ) -> Self {
        let id = Self::compute_id(&file_path, &qualified_name, symbol_type, line_start);
        let layer = symbol_type.default_layer();
        Self {
            id,
            name,
            qualified_name,
            symbol_type,
            layer,
            file_path,
            line_start,
            line_end,
            parent_id: None,
            language,
            domain: Domain::Code,
            inferred_type: None,
            description: None,
            domains: Vec::new(),
            metadata: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_id_is_stable_and_content_independent() {
        let a = Symbol::compute_id(
            std::path::Path::new("src/lib.rs"),
            "crate::foo",
            SymbolType::Function,
            10,
        );
        let b = Symbol::compute_id(
            std::path::Path::new("src/lib.rs"),
            "crate::foo",
            SymbolType::Function,
            10,
        );
        assert_eq!(a, b);
        assert_eq!(a, "src/lib.rs::crate::foo::function@10");
    }

    #[test]
    fn default_layer_groups_symbol_types_correctly() {
        assert_eq!(SymbolType::Entity.default_layer(), SymbolLayer::Database);
        assert_eq!(SymbolType::Component.default_layer(), SymbolLayer::Frontend);
        assert_eq!(SymbolType::DocSection.default_layer(), SymbolLayer::Document);
        assert_eq!(SymbolType::Function.default_layer(), SymbolLayer::Backend);
    }

    #[test]
    fn confidence_orders_high_above_inferred() {
        assert!(Confidence::High > Confidence::Medium);
        assert!(Confidence::Medium > Confidence::Low);
        assert!(Confidence::Low > Confidence::Inferred);
    }
}
