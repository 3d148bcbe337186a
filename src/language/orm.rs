//! Shared normalization helpers for ORM-aware adapters (§4.3).
//!
//! Every ORM family (JPA/Hibernate, EF Core, SQLAlchemy, Django ORM,
//! ActiveRecord, Eloquent, TypeORM, Sequelize) defaults field→column and
//! table→entity names the same way absent an explicit annotation, so the
//! conversion lives here once instead of being reimplemented per adapter.

/// Convert a `camelCase` or `PascalCase` identifier to `snake_case`, the
/// conventional default column name for an entity field.
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower_or_digit = false;
    for c in name.chars() {
        if c.is_uppercase() {
            if prev_lower_or_digit {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower_or_digit = false;
        } else {
            out.push(c);
            prev_lower_or_digit = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

/// Conventional English pluralization used for the entity→table default
/// (`Person` → `people` is intentionally not special-cased; adapters
/// should rely on an explicit `table_name` annotation for irregular
/// nouns, matching every mainstream ORM's own default-inflection limits).
pub fn pluralize_table_name(entity_name: &str) -> String {
    let snake = to_snake_case(entity_name);
    if snake.ends_with('y') && !snake.ends_with("ay") && !snake.ends_with("ey") && !snake.ends_with("oy") {
        format!("{}ies", &snake[..snake.len() - 1])
    } else if snake.ends_with('s') || snake.ends_with("sh") || snake.ends_with("ch") || snake.ends_with('x') {
        format!("{snake}es")
    } else {
        format!("{snake}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_snake_case_handles_camel_and_pascal() {
        assert_eq!(to_snake_case("firstName"), "first_name");
        assert_eq!(to_snake_case("UserAccount"), "user_account");
        assert_eq!(to_snake_case("id"), "id");
    }

    #[test]
    fn pluralize_table_name_applies_conventional_rules() {
        assert_eq!(pluralize_table_name("User"), "users");
        assert_eq!(pluralize_table_name("Category"), "categories");
        assert_eq!(pluralize_table_name("Address"), "addresses");
        assert_eq!(pluralize_table_name("Box"), "boxes");
    }
}
