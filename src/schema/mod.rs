//! SQL DDL schema adapter: extracts `Table`/`Column` symbols from
//! `CREATE TABLE` statements so the Linker Registry can
//! promote an ORM adapter's `table::column` `maps_to` pseudo-target into
//! a real, resolved reference once the schema defines that column.
//!
//! This is not a `LanguageAdapter` — SQL has no tree-sitter grammar
//! among this crate's dependencies, so `.sql` files are routed here
//! directly by the orchestrator rather than through the tree-sitter
//! registry. Extraction walks the sqlparser tokenizer's token stream by
//! hand instead of the `Statement` AST, which keeps this adapter stable
//! across the AST's frequent shape changes upstream.

use std::path::Path;

use sqlparser::dialect::GenericDialect;
use sqlparser::tokenizer::{Token, Tokenizer};

use crate::language::derive_domains_from_path;
use crate::model::{Symbol, SymbolType};

const TABLE_LEVEL_CONSTRAINT_KEYWORDS: &[&str] =
    &["PRIMARY", "FOREIGN", "UNIQUE", "CONSTRAINT", "CHECK", "KEY", "INDEX"];

pub fn extract_schema(path: &Path, source: &str) -> Vec<Symbol> {
    let dialect = GenericDialect {};
    let tokens = match Tokenizer::new(&dialect, source).tokenize() {
        Ok(t) => t,
        Err(_) => return Vec::new(),
    };

    let mut symbols = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        i = skip_ws(&tokens, i);
        if i >= tokens.len() {
            break;
        }
        if !is_word_ci(&tokens, i, "CREATE") {
            i += 1;
            continue;
        }

        let mut j = skip_ws(&tokens, i + 1);
        while is_word_ci(&tokens, j, "OR") || is_word_ci(&tokens, j, "REPLACE") || is_word_ci(&tokens, j, "TEMPORARY") || is_word_ci(&tokens, j, "TEMP") {
            j = skip_ws(&tokens, j + 1);
        }
        if !is_word_ci(&tokens, j, "TABLE") {
            i += 1;
            continue;
        }
        j = skip_ws(&tokens, j + 1);
        while is_word_ci(&tokens, j, "IF") || is_word_ci(&tokens, j, "NOT") || is_word_ci(&tokens, j, "EXISTS") {
            j = skip_ws(&tokens, j + 1);
        }

        let Some(first_name) = word_at(&tokens, j) else {
            i += 1;
            continue;
        };
        let mut table_name = unquote(first_name);
        let mut k = skip_ws(&tokens, j + 1);
        if matches!(tokens.get(k), Some(Token::Period)) {
            k = skip_ws(&tokens, k + 1);
            if let Some(second_name) = word_at(&tokens, k) {
                table_name = unquote(second_name);
                k = skip_ws(&tokens, k + 1);
            }
        }

        if matches!(tokens.get(k), Some(Token::LParen)) {
            let (columns, after) = read_columns(&tokens, k + 1);
            symbols.push(table_symbol(path, &table_name));
            for (col_name, nullable) in &columns {
                symbols.push(column_symbol(path, &table_name, col_name, *nullable));
            }
            i = after;
        } else {
            i = k;
        }
    }
    symbols
}

fn skip_ws(tokens: &[Token], mut i: usize) -> usize {
    while matches!(tokens.get(i), Some(Token::Whitespace(_))) {
        i += 1;
    }
    i
}

fn word_at(tokens: &[Token], i: usize) -> Option<&str> {
    match tokens.get(i) {
        Some(Token::Word(w)) => Some(w.value.as_str()),
        _ => None,
    }
}

fn is_word_ci(tokens: &[Token], i: usize, expected: &str) -> bool {
    word_at(tokens, i).map(|w| w.eq_ignore_ascii_case(expected)).unwrap_or(false)
}

fn unquote(raw: &str) -> String {
    raw.trim_matches(|c| c == '`' || c == '"' || c == '\'').to_string()
}

/// Reads a parenthesized column list starting just after the opening
/// `(`. Table-level constraints (`PRIMARY KEY (...)`, etc.) are skipped
/// rather than misread as columns. Returns the parsed columns and the
/// token index just past the matching closing `)`.
fn read_columns(tokens: &[Token], mut i: usize) -> (Vec<(String, bool)>, usize) {
    let mut columns = Vec::new();
    loop {
        i = skip_ws(tokens, i);
        match tokens.get(i) {
            None => break,
            Some(Token::RParen) => {
                i += 1;
                break;
            }
            Some(Token::Comma) => {
                i += 1;
            }
            Some(Token::Word(w)) => {
                let upper = w.value.to_uppercase();
                if TABLE_LEVEL_CONSTRAINT_KEYWORDS.contains(&upper.as_str()) {
                    i = skip_to_top_level_boundary(tokens, i + 1);
                } else {
                    let col_name = unquote(&w.value);
                    let (nullable, next) = scan_column_tail(tokens, i + 1);
                    columns.push((col_name, nullable));
                    i = next;
                }
            }
            _ => {
                i += 1;
            }
        }
    }
    (columns, i)
}

/// Skips a table-level constraint clause up to (but not past) its
/// terminating top-level comma or the list's closing paren.
fn skip_to_top_level_boundary(tokens: &[Token], mut i: usize) -> usize {
    let mut depth = 0i32;
    loop {
        match tokens.get(i) {
            None => break,
            Some(Token::LParen) => {
                depth += 1;
                i += 1;
            }
            Some(Token::RParen) => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
                i += 1;
            }
            Some(Token::Comma) if depth == 0 => break,
            _ => i += 1,
        }
    }
    i
}

/// Scans a single column definition's type/constraint tail, reporting
/// whether `NOT NULL` was declared at the top level (inside a type's own
/// parens, like `VARCHAR(255)`, doesn't count).
fn scan_column_tail(tokens: &[Token], mut i: usize) -> (bool, usize) {
    let mut nullable = true;
    let mut depth = 0i32;
    loop {
        match tokens.get(i) {
            None => break,
            Some(Token::LParen) => {
                depth += 1;
                i += 1;
            }
            Some(Token::RParen) => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
                i += 1;
            }
            Some(Token::Comma) if depth == 0 => break,
            Some(Token::Word(w)) if depth == 0 && w.value.eq_ignore_ascii_case("NOT") => {
                let next = skip_ws(tokens, i + 1);
                if is_word_ci(tokens, next, "NULL") {
                    nullable = false;
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    (nullable, i)
}

fn table_symbol(path: &Path, table: &str) -> Symbol {
    let mut symbol = Symbol::new(
        path.to_path_buf(),
        table.to_string(),
        table.to_string(),
        SymbolType::Table,
        "sql".to_string(),
        1,
        1,
    );
    symbol.domains = derive_domains_from_path(path);
    symbol
}

fn column_symbol(path: &Path, table: &str, column: &str, nullable: bool) -> Symbol {
    let mut symbol = Symbol::new(
        path.to_path_buf(),
        column.to_string(),
        format!("{table}::{column}"),
        SymbolType::Column,
        "sql".to_string(),
        1,
        1,
    );
    symbol.metadata = Some(serde_json::json!({ "nullable": nullable }));
    symbol
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn extracts_table_and_columns_with_nullability() {
        let ddl = "CREATE TABLE users (id INT PRIMARY KEY, email VARCHAR(255) NOT NULL, bio TEXT);";
        let symbols = extract_schema(Path::new("schema.sql"), ddl);

        let table = symbols.iter().find(|s| s.symbol_type == SymbolType::Table).unwrap();
        assert_eq!(table.name, "users");

        let email = symbols
            .iter()
            .find(|s| s.symbol_type == SymbolType::Column && s.name == "email")
            .unwrap();
        assert_eq!(email.qualified_name, "users::email");
        assert_eq!(email.metadata.as_ref().unwrap().get("nullable").unwrap(), false);

        let bio = symbols
            .iter()
            .find(|s| s.symbol_type == SymbolType::Column && s.name == "bio")
            .unwrap();
        assert_eq!(bio.metadata.as_ref().unwrap().get("nullable").unwrap(), true);

        assert!(!symbols.iter().any(|s| s.name == "PRIMARY"));
    }

    #[test]
    fn ignores_non_create_table_statements() {
        let sql = "SELECT * FROM users;";
        let symbols = extract_schema(Path::new("query.sql"), sql);
        assert!(symbols.is_empty());
    }

    #[test]
    fn handles_if_not_exists_and_schema_qualified_name() {
        let ddl = "CREATE TABLE IF NOT EXISTS public.accounts (name TEXT);";
        let symbols = extract_schema(Path::new("schema.sql"), ddl);
        let table = symbols.iter().find(|s| s.symbol_type == SymbolType::Table).unwrap();
        assert_eq!(table.name, "accounts");
    }
}
