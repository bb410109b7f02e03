use core_types::{RowSet, SqlValue};
use std::fmt;

/// What a statement does, declared by the caller rather than sniffed from the SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    /// Schema changes (`CREATE`, `ALTER`, `DROP`, ...).
    Ddl,
}

impl StatementKind {
    /// Data-changing statements. These commit and are mirrored to backups.
    pub fn is_write(&self) -> bool {
        matches!(self, StatementKind::Insert | StatementKind::Update | StatementKind::Delete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::Select => "SELECT",
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
            StatementKind::Ddl => "DDL",
        }
    }

    /// Classifies raw SQL by its leading keyword, for callers that only have text.
    ///
    /// Leading whitespace is skipped and the match is case-insensitive. Anything
    /// that is not a recognised write or schema change is treated as a read.
    pub fn infer(sql: &str) -> Self {
        let keyword: String = sql
            .trim_start()
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_uppercase();
        match keyword.as_str() {
            "INSERT" | "REPLACE" => StatementKind::Insert,
            "UPDATE" => StatementKind::Update,
            "DELETE" => StatementKind::Delete,
            "CREATE" | "ALTER" | "DROP" | "TRUNCATE" | "RENAME" => StatementKind::Ddl,
            _ => StatementKind::Select,
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parameterised statement bound for one logical database.
///
/// Placeholders are positional `?` markers, filled from `params` in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    kind: StatementKind,
    sql: String,
    params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(kind: StatementKind, sql: impl Into<String>) -> Self {
        Self {
            kind,
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn select(sql: impl Into<String>) -> Self {
        Self::new(StatementKind::Select, sql)
    }

    pub fn insert(sql: impl Into<String>) -> Self {
        Self::new(StatementKind::Insert, sql)
    }

    pub fn update(sql: impl Into<String>) -> Self {
        Self::new(StatementKind::Update, sql)
    }

    pub fn delete(sql: impl Into<String>) -> Self {
        Self::new(StatementKind::Delete, sql)
    }

    pub fn ddl(sql: impl Into<String>) -> Self {
        Self::new(StatementKind::Ddl, sql)
    }

    /// Builds a statement from raw text, classifying it with [`StatementKind::infer`].
    pub fn infer(sql: impl Into<String>) -> Self {
        let sql = sql.into();
        Self::new(StatementKind::infer(&sql), sql)
    }

    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn bind_all<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.params.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }
}

/// The uniform result of a successful statement.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// The full result set of a read. May be empty.
    Rows(RowSet),
    /// The engine-assigned id of the inserted row (0 when the table has none).
    Inserted { id: i64 },
    /// Rows touched by an UPDATE or DELETE. Zero is a valid result.
    Affected { rows: u64 },
    /// A schema change went through.
    Applied,
}

impl QueryOutcome {
    pub fn rows(self) -> Option<RowSet> {
        match self {
            QueryOutcome::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn inserted_id(&self) -> Option<i64> {
        match self {
            QueryOutcome::Inserted { id } if *id > 0 => Some(*id),
            _ => None,
        }
    }

    pub fn affected_rows(&self) -> Option<u64> {
        match self {
            QueryOutcome::Affected { rows } => Some(*rows),
            _ => None,
        }
    }
}
