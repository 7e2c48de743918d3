//! DDL detection
//!
//! Recognizes statements that change schema structure so an executed query
//! can trigger a diagram refresh.

use once_cell::sync::Lazy;
use regex::Regex;

static SCHEMA_CHANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(ALTER|CREATE|DROP)\b\s+\b(TABLE|VIEW|INDEX|SCHEMA)\b")
        .expect("schema change pattern is valid")
});

static AFFECTED_OBJECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:ALTER|CREATE|DROP)\b\s+\b(?:TABLE|VIEW)\b\s+(?:IF\s+(?:NOT\s+)?EXISTS\s+)?((?:\w+\.)?\w+)")
        .expect("affected object pattern is valid")
});

/// Object named by a TABLE/VIEW statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffectedObject {
    pub schema: Option<String>,
    pub table: String,
}

pub fn is_schema_change(sql: &str) -> bool {
    SCHEMA_CHANGE.is_match(sql)
}

/// Tables and views named by ALTER/CREATE/DROP statements, lowercased
pub fn affected_objects(sql: &str) -> Vec<AffectedObject> {
    AFFECTED_OBJECT
        .captures_iter(sql)
        .filter_map(|caps| caps.get(1))
        .map(|name| {
            let name = name.as_str().to_lowercase();
            match name.split_once('.') {
                Some((schema, table)) => AffectedObject {
                    schema: Some(schema.to_string()),
                    table: table.to_string(),
                },
                None => AffectedObject { schema: None, table: name },
            }
        })
        .collect()
}

/// Whether `sql` may have changed the structure of `schema`.
///
/// Unqualified names, and DDL naming no table (indexes, schemas), are
/// assumed to touch it.
pub fn touches_schema(sql: &str, schema: &str) -> bool {
    if !is_schema_change(sql) {
        return false;
    }

    let affected = affected_objects(sql);
    affected.is_empty()
        || affected
            .iter()
            .any(|o| o.schema.as_deref().map_or(true, |s| s.eq_ignore_ascii_case(schema)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_detects_schema_change() {
        assert!(is_schema_change("alter table users add column email text"));
        assert!(is_schema_change("CREATE INDEX idx ON users(email)"));
        assert!(!is_schema_change("SELECT * FROM altered_tables"));
        assert!(!is_schema_change("INSERT INTO users VALUES (1)"));
    }

    #[test]
    fn test_affected_objects() {
        let objects = affected_objects(
            "CREATE TABLE IF NOT EXISTS Public.Orders (id int); DROP VIEW report",
        );

        assert_eq!(
            objects,
            vec![
                AffectedObject {
                    schema: Some("public".to_string()),
                    table: "orders".to_string(),
                },
                AffectedObject {
                    schema: None,
                    table: "report".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_touches_schema() {
        assert!(touches_schema("ALTER TABLE public.users ADD x int", "public"));
        assert!(!touches_schema("ALTER TABLE billing.users ADD x int", "public"));
        assert!(touches_schema("ALTER TABLE users ADD x int", "public"));
        assert!(touches_schema("DROP INDEX idx_users_email", "public"));
        assert!(!touches_schema("SELECT 1", "public"));
    }
}
