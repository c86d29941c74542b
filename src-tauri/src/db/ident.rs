//! Identifier quoting and column-type allow-listing.
//!
//! Table and column names come from free-text form fields, so they are never
//! spliced into SQL raw: names are bracket-quoted and type strings must match
//! a fixed grammar.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{DbError, DbResult};

const MAX_IDENT_LEN: usize = 128;

/// Quote a SQL Server identifier as `[name]`, doubling any `]`.
pub fn quote_ident(name: &str) -> DbResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DbError::Validation("identifier must not be empty".to_string()));
    }
    if name.chars().count() > MAX_IDENT_LEN {
        return Err(DbError::Validation(format!(
            "identifier '{}' is longer than {} characters",
            name, MAX_IDENT_LEN
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(DbError::Validation(format!(
            "identifier '{}' contains control characters",
            name.escape_debug()
        )));
    }
    Ok(format!("[{}]", name.replace(']', "]]")))
}

fn type_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)^[a-z][a-z0-9_]*(\s*\(\s*(\d+|max)\s*(,\s*\d+\s*)?\))?(\s+identity(\s*\(\s*\d+\s*,\s*\d+\s*\))?)?(\s+primary\s+key)?$",
        )
        .expect("column type pattern is valid")
    })
}

/// Accept `int`, `varchar(50)`, `decimal(10,2)`, `nvarchar(max)`, optionally
/// followed by `IDENTITY[(seed,step)]` and/or `PRIMARY KEY`.
pub fn check_column_type(sql_type: &str) -> DbResult<String> {
    let sql_type = sql_type.trim();
    if type_pattern().is_match(sql_type) {
        Ok(sql_type.to_string())
    } else {
        Err(DbError::Validation(format!("unsupported column type '{}'", sql_type)))
    }
}
