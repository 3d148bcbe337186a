//! Document Extractor Adapter.
//!
//! Turns a document path into text plus coarse structure behind a uniform
//! `extract(path) -> (text, metadata)` contract. Markdown/plaintext are
//! extracted in-process; PDF delegates to `pdf-extract`. After extraction,
//! [`candidate_symbol_mentions`] scans the text for code-symbol-shaped
//! tokens so the orchestrator can hand them to the Linker Registry as
//! `documents` RawReferences.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};

use crate::language::{BackendError, BackendResult};
use crate::model::{Document, DocumentSection};

/// Everything a [`DocumentExtractor`] produces before the Unified Store
/// wraps it in a `Document` (which also carries `mtime`/`size`).
pub struct ExtractedDocument {
    pub title: Option<String>,
    pub frontmatter: HashMap<String, String>,
    pub text: String,
    pub sections: Vec<DocumentSection>,
}

pub trait DocumentExtractor: Sync + Send {
    fn id(&self) -> &'static str;
    fn file_extensions(&self) -> &'static [&'static str];
    fn extract(&self, path: &Path, raw: &[u8]) -> BackendResult<ExtractedDocument>;
}

pub struct MarkdownExtractor;
pub struct PlaintextExtractor;
pub struct PdfExtractor;

static MARKDOWN: MarkdownExtractor = MarkdownExtractor;
static PLAINTEXT: PlaintextExtractor = PlaintextExtractor;
static PDF: PdfExtractor = PdfExtractor;

static EXTRACTORS: [&dyn DocumentExtractor; 3] = [&MARKDOWN, &PLAINTEXT, &PDF];

/// Split a leading `---\n...\n---` YAML block off the document body.
/// Returns the parsed frontmatter (flattened to string values — the store
/// only needs a simple key/value map, per `Document::frontmatter`) and the
/// remaining text with the frontmatter block stripped.
fn split_frontmatter(raw: &str) -> (HashMap<String, String>, &str) {
    let Some(rest) = raw.strip_prefix("---\n") else {
        return (HashMap::new(), raw);
    };
    let Some(end) = rest.find("\n---") else {
        return (HashMap::new(), raw);
    };
    let yaml_block = &rest[..end];
    let after_marker = &rest[end + 4..];
    let body = after_marker.strip_prefix('\n').unwrap_or(after_marker);

    let mut map = HashMap::new();
    if let Ok(serde_yaml::Value::Mapping(mapping)) = serde_yaml::from_str(yaml_block) {
        for (k, v) in mapping {
            let (Some(key), Some(value)) = (yaml_scalar(&k), yaml_scalar(&v)) else {
                continue;
            };
            map.insert(key, value);
        }
    }
    (map, body)
}

fn yaml_scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn heading_level_to_u8(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Heading-anchored section split, computed over the extracted text's byte
/// offsets (not the raw markdown, so `offset` lines up with `text`).
fn markdown_sections(body: &str) -> Vec<DocumentSection> {
    let mut sections = Vec::new();
    let mut current_heading: Option<(String, u8)> = None;
    let mut text_so_far = String::new();
    let mut pending_heading_text = String::new();
    let mut in_heading = false;

    for event in Parser::new(body) {
        match event {
            Event::Start(Tag::Heading { .. }) => {
                in_heading = true;
                pending_heading_text.clear();
            }
            Event::End(TagEnd::Heading(level)) => {
                in_heading = false;
                current_heading = Some((pending_heading_text.trim().to_string(), heading_level_to_u8(level)));
                sections.push(DocumentSection {
                    heading: current_heading.as_ref().unwrap().0.clone(),
                    level: current_heading.as_ref().unwrap().1,
                    offset: text_so_far.len(),
                });
                text_so_far.push_str(&pending_heading_text);
                text_so_far.push('\n');
            }
            Event::Text(text) | Event::Code(text) => {
                if in_heading {
                    pending_heading_text.push_str(&text);
                } else {
                    text_so_far.push_str(&text);
                }
            }
            Event::SoftBreak | Event::HardBreak => text_so_far.push('\n'),
            _ => {}
        }
    }

    if sections.is_empty() {
        sections.push(DocumentSection {
            heading: String::new(),
            level: 0,
            offset: 0,
        });
    }

    sections
}

impl DocumentExtractor for MarkdownExtractor {
    fn id(&self) -> &'static str {
        "markdown"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["md", "markdown", "mdx"]
    }

    fn extract(&self, _path: &Path, raw: &[u8]) -> BackendResult<ExtractedDocument> {
        let raw_text = String::from_utf8_lossy(raw);
        let (frontmatter, body) = split_frontmatter(&raw_text);
        let sections = markdown_sections(body);
        let title = frontmatter
            .get("title")
            .cloned()
            .or_else(|| sections.iter().find(|s| s.level == 1).map(|s| s.heading.clone()));

        Ok(ExtractedDocument {
            title,
            frontmatter,
            text: body.to_string(),
            sections,
        })
    }
}

impl DocumentExtractor for PlaintextExtractor {
    fn id(&self) -> &'static str {
        "plaintext"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["txt"]
    }

    fn extract(&self, _path: &Path, raw: &[u8]) -> BackendResult<ExtractedDocument> {
        let text = String::from_utf8_lossy(raw).to_string();
        Ok(ExtractedDocument {
            title: None,
            frontmatter: HashMap::new(),
            sections: vec![DocumentSection {
                heading: String::new(),
                level: 0,
                offset: 0,
            }],
            text,
        })
    }
}

impl DocumentExtractor for PdfExtractor {
    fn id(&self) -> &'static str {
        "pdf"
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["pdf"]
    }

    fn extract(&self, path: &Path, _raw: &[u8]) -> BackendResult<ExtractedDocument> {
        let text = pdf_extract::extract_text(path)
            .map_err(|e| BackendError::new(format!("pdf extraction failed: {e}")))?;
        Ok(ExtractedDocument {
            title: None,
            frontmatter: HashMap::new(),
            sections: vec![DocumentSection {
                heading: String::new(),
                level: 0,
                offset: 0,
            }],
            text,
        })
    }
}

pub fn extractor_for_path(path: &Path) -> Option<&'static dyn DocumentExtractor> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    EXTRACTORS.iter().copied().find(|e| {
        e.file_extensions().iter().any(|e| e.eq_ignore_ascii_case(&ext))
    })
}

/// Extract a document at `path`, stamping the resulting `Document` with
/// its on-disk `mtime`/`size`. Office formats (docx/xlsx/pptx) have no
/// registered extractor and are out of scope.
pub fn extract_document(path: &Path) -> BackendResult<Document> {
    let extractor = extractor_for_path(path)
        .ok_or_else(|| BackendError::new(format!("no document extractor for {}", path.display())))?;

    let metadata = fs::metadata(path)
        .map_err(|e| BackendError::new(format!("failed to stat {}: {e}", path.display())))?;
    let raw = fs::read(path)
        .map_err(|e| BackendError::new(format!("failed to read {}: {e}", path.display())))?;

    let extracted = extractor.extract(path, &raw)?;

    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    Ok(Document {
        path: path.to_path_buf(),
        title: extracted.title,
        frontmatter: extracted.frontmatter,
        text: extracted.text,
        sections: extracted.sections,
        mtime,
        size: metadata.len(),
    })
}

/// Scan a section's text for code-symbol-shaped tokens: backtick-quoted
/// spans, CamelCase/PascalCase identifiers, and snake_case identifiers.
/// Returns deduplicated candidate names in first-seen order; the Linker
/// Registry resolves each candidate against the project's symbol set,
/// preserving unmatched candidates as orphan `documents` references.
pub fn candidate_symbol_mentions(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    let mut push = |candidate: &str| {
        if candidate.len() < 3 {
            return;
        }
        if seen.insert(candidate.to_string()) {
            out.push(candidate.to_string());
        }
    };

    let mut chars = text.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if c == '`' {
            let rest = &text[start + 1..];
            if let Some(end) = rest.find('`') {
                push(&rest[..end]);
            }
            continue;
        }
        if !(c.is_alphabetic() || c == '_') {
            continue;
        }
        let token_start = start;
        let mut token_end = start + c.len_utf8();
        while let Some(&(i, c2)) = chars.peek() {
            if c2.is_alphanumeric() || c2 == '_' {
                token_end = i + c2.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        let token = &text[token_start..token_end];
        let has_upper = token.chars().any(|c| c.is_uppercase());
        let has_lower = token.chars().any(|c| c.is_lowercase());
        let is_snake = token.contains('_') && has_lower;
        let is_camel_or_pascal = has_upper && has_lower && !token.contains('_');
        if is_snake || is_camel_or_pascal {
            push(token);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn markdown_extractor_splits_frontmatter_and_headings() {
        let source = "---\ntitle: Auth Guide\n---\n# Auth Guide\n\nUse `AuthService` to validate tokens.\n\n## Details\n\nMore text.\n";
        let dir = tempdir().unwrap();
        let path = dir.path().join("auth.md");
        std::fs::write(&path, source).unwrap();

        let doc = extract_document(&path).expect("extracted");
        assert_eq!(doc.title.as_deref(), Some("Auth Guide"));
        assert_eq!(doc.frontmatter.get("title").unwrap(), "Auth Guide");
        assert_eq!(doc.sections.len(), 2);
        assert_eq!(doc.sections[0].heading, "Auth Guide");
        assert_eq!(doc.sections[0].level, 1);
        assert_eq!(doc.sections[1].heading, "Details");
    }

    #[test]
    fn plaintext_extractor_returns_single_section() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "just some notes").unwrap();

        let doc = extract_document(&path).expect("extracted");
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.text, "just some notes");
    }

    #[test]
    fn candidate_symbol_mentions_finds_backtick_and_camel_case() {
        let text = "Use `AuthService` to validate tokens via validate_token or LoginController.";
        let mentions = candidate_symbol_mentions(text);
        assert!(mentions.contains(&"AuthService".to_string()));
        assert!(mentions.contains(&"validate_token".to_string()));
        assert!(mentions.contains(&"LoginController".to_string()));
    }

    #[test]
    fn unknown_extension_has_no_extractor() {
        assert!(extractor_for_path(Path::new("image.png")).is_none());
    }
}
