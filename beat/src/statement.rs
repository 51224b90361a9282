//! Introspection statements and the poll request

use crate::error::{BeatError, Result};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// How a statement's result set is turned into events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatementKind {
    /// First row only, every column becomes a field
    SingleRow,
    /// Every row is a `(name, value)` pair, e.g. `SHOW GLOBAL STATUS`
    #[default]
    TwoColumns,
    /// Every row becomes its own event
    MultipleRows,
    /// First row of `SHOW SLAVE STATUS`, keeping `Seconds_Behind_Master`
    #[serde(rename = "show-slave-delay")]
    SlaveDelay,
}

impl StatementKind {
    /// Config spelling of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::SingleRow => "single-row",
            StatementKind::TwoColumns => "two-columns",
            StatementKind::MultipleRows => "multiple-rows",
            StatementKind::SlaveDelay => "show-slave-delay",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatementKind {
    type Err = BeatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "single-row" => Ok(StatementKind::SingleRow),
            "two-columns" => Ok(StatementKind::TwoColumns),
            "multiple-rows" => Ok(StatementKind::MultipleRows),
            "show-slave-delay" => Ok(StatementKind::SlaveDelay),
            other => Err(BeatError::config(format!("unknown query type '{other}'"))),
        }
    }
}

/// Leading keywords of statements that only read server state
const READ_ONLY_KEYWORDS: &[&str] = &["SHOW", "SELECT", "DESCRIBE", "DESC", "EXPLAIN"];

/// One configured introspection statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    tag: String,
    sql: String,
    kind: StatementKind,
}

impl Statement {
    /// Create a statement, refusing anything that is not a read-only query
    pub fn new(tag: impl Into<String>, sql: impl Into<String>, kind: StatementKind) -> Result<Self> {
        let tag = tag.into();
        let sql = sql.into().trim().to_string();

        if tag.trim().is_empty() {
            return Err(BeatError::config("statement tag must not be empty"));
        }
        if sql.is_empty() {
            return Err(BeatError::config(format!("statement '{tag}' has no SQL")));
        }

        let keyword = sql
            .split(|c: char| c.is_whitespace() || c == '(')
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        if !READ_ONLY_KEYWORDS.contains(&keyword.as_str()) {
            return Err(BeatError::config(format!(
                "statement '{tag}' is not a read-only introspection query: {sql}"
            )));
        }

        Ok(Self { tag, sql, kind })
    }

    /// Source tag stamped on events produced by this statement
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// SQL text sent to the server
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Result shaping mode
    pub fn kind(&self) -> StatementKind {
        self.kind
    }
}

/// Ordered, immutable set of statements run every cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRequest {
    statements: Arc<[Statement]>,
}

impl PollRequest {
    /// Build a poll request; at least one statement and unique tags are required
    pub fn new(statements: Vec<Statement>) -> Result<Self> {
        if statements.is_empty() {
            return Err(BeatError::config("there are no queries to execute"));
        }

        let mut seen = std::collections::HashSet::new();
        for statement in &statements {
            if !seen.insert(statement.tag()) {
                return Err(BeatError::config(format!(
                    "duplicate statement tag '{}'",
                    statement.tag()
                )));
            }
        }

        Ok(Self {
            statements: statements.into(),
        })
    }

    /// Statements in execution order
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Number of statements
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Always false for a constructed request
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_read_only_statements_accepted() {
        for sql in [
            "SHOW GLOBAL STATUS",
            "select 1",
            "  SELECT VARIABLE_NAME, VARIABLE_VALUE FROM performance_schema.global_status",
            "DESC mysql.user",
            "SELECT(1)",
        ] {
            assert!(Statement::new("q", sql, StatementKind::TwoColumns).is_ok(), "{sql}");
        }
    }

    #[test]
    fn test_writes_rejected() {
        for sql in ["DELETE FROM t", "UPDATE t SET a = 1", "SET GLOBAL x = 1", "SHOWX"] {
            let err = Statement::new("q", sql, StatementKind::SingleRow).unwrap_err();
            assert!(err.is_fatal(), "{sql}");
        }
    }

    #[test]
    fn test_empty_request_rejected() {
        let err = PollRequest::new(vec![]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration error: there are no queries to execute"
        );
    }

    #[test]
    fn test_duplicate_tags_rejected() {
        let a = Statement::new("status", "SHOW STATUS", StatementKind::TwoColumns).unwrap();
        let b = Statement::new("status", "SHOW VARIABLES", StatementKind::TwoColumns).unwrap();
        assert!(PollRequest::new(vec![a, b]).is_err());
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!(
            "show-slave-delay".parse::<StatementKind>().unwrap(),
            StatementKind::SlaveDelay
        );
        assert_eq!(
            "multiple-rows".parse::<StatementKind>().unwrap(),
            StatementKind::MultipleRows
        );
        assert!("rows".parse::<StatementKind>().is_err());
    }

    #[test]
    fn test_kind_deserializes_from_config_spelling() {
        let kind: StatementKind = serde_yaml::from_str("show-slave-delay").unwrap();
        assert_eq!(kind, StatementKind::SlaveDelay);
        let kind: StatementKind = serde_yaml::from_str("single-row").unwrap();
        assert_eq!(kind, StatementKind::SingleRow);
    }
}
