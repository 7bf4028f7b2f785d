//! Allow-listed SQL identifiers for generated DDL and DML.
//!
//! Every table, index, and column name that reaches a generated statement
//! goes through [`Ident::new`]: ASCII letter or underscore first, then
//! letters, digits, or underscores, at most [`MAX_IDENT_LEN`] characters.

use std::collections::HashSet;

use grognon_core::CronId;

use crate::error::{CronError, Result};
use crate::types::OutputColumn;

pub const MAX_IDENT_LEN: usize = 63;

/// Name of the mandatory first column of every cron table.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// A validated identifier. Only [`Ident::new`] can build one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident(String);

impl Ident {
    pub fn new(name: &str) -> Result<Self> {
        let mut chars = name.chars();
        let valid_head = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

        if !valid_head || !valid_tail || name.len() > MAX_IDENT_LEN {
            return Err(CronError::InvalidIdentifier(format!(
                "{name:?} must match [A-Za-z_][A-Za-z0-9_]* and be at most {MAX_IDENT_LEN} characters"
            )));
        }
        Ok(Self(name.to_string()))
    }

    /// Result table of a cron: `cron_<id>`.
    pub fn cron_table(id: CronId) -> Result<Self> {
        Self::new(&format!("cron_{id}"))
    }

    /// Timestamp index of a cron table: `cron_<id>_timestamp`.
    pub fn cron_index(id: CronId) -> Result<Self> {
        Self::new(&format!("cron_{id}_{TIMESTAMP_COLUMN}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form for use inside SQL text.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate the inferred columns of a cron before anything is persisted.
///
/// Each name must be a valid identifier, must not collide with the
/// `timestamp` column, and must be unique (SQLite names are
/// case-insensitive).
pub fn validate_columns(columns: &[OutputColumn]) -> Result<Vec<Ident>> {
    let mut seen = HashSet::with_capacity(columns.len() + 1);
    seen.insert(TIMESTAMP_COLUMN.to_string());

    columns
        .iter()
        .map(|col| {
            let ident = Ident::new(&col.name)?;
            if !seen.insert(col.name.to_ascii_lowercase()) {
                return Err(CronError::InvalidIdentifier(format!(
                    "duplicate or reserved column name {:?}",
                    col.name
                )));
            }
            Ok(ident)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnType;

    #[test]
    fn accepts_plain_names() {
        for name in ["n", "user_count", "_x", "Total2", &"a".repeat(MAX_IDENT_LEN)] {
            assert!(Ident::new(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_anything_that_needs_escaping() {
        for name in [
            "",
            "1abc",
            "count(*)",
            "a b",
            "x\"; DROP TABLE crons; --",
            "naïve",
            "a-b",
            &"a".repeat(MAX_IDENT_LEN + 1),
        ] {
            assert!(
                matches!(Ident::new(name), Err(CronError::InvalidIdentifier(_))),
                "{name}"
            );
        }
    }

    #[test]
    fn cron_table_names_derive_from_id() {
        assert_eq!(Ident::cron_table(42).unwrap().as_str(), "cron_42");
        assert_eq!(Ident::cron_index(42).unwrap().as_str(), "cron_42_timestamp");
        assert_eq!(Ident::cron_table(7).unwrap().quoted(), "\"cron_7\"");
        assert!(Ident::cron_table(-1).is_err());
    }

    #[test]
    fn columns_must_be_unique_and_not_timestamp() {
        let ok = [
            OutputColumn::new("n", ColumnType::Integer),
            OutputColumn::new("label", ColumnType::Text),
        ];
        assert_eq!(validate_columns(&ok).unwrap().len(), 2);

        let dup = [
            OutputColumn::new("n", ColumnType::Integer),
            OutputColumn::new("N", ColumnType::Real),
        ];
        assert!(validate_columns(&dup).is_err());

        let reserved = [OutputColumn::new("Timestamp", ColumnType::Text)];
        assert!(validate_columns(&reserved).is_err());
    }
}
