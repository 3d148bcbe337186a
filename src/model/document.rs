use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A heading-anchored span within an extracted document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSection {
    pub heading: String,
    pub level: u8,
    /// Byte offset into the document's extracted `text` where this
    /// section begins.
    pub offset: usize,
}

/// An indexed textual or binary document. Each section emits a
/// `doc_section` Symbol that participates in the reference graph on equal
/// footing with code symbols.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub frontmatter: HashMap<String, String>,
    pub text: String,
    pub sections: Vec<DocumentSection>,
    pub mtime: i64,
    pub size: u64,
}
