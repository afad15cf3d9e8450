//! Statement builder that tracks bound parameters next to SQL fragments
//!
//! Every placeholder is emitted by the same call that records its value, so a
//! statement's bind list can never drift from its text. Two statements built
//! by the same sequence of calls bind the same values in the same order.

use crate::dialect::DialectAdapter;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};

/// A value bound to a placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Int(i64),
    Text(String),
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Finished SQL text plus its ordered bind values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub binds: Vec<SqlValue>,
}

impl Statement {
    /// Prepare an sqlx query with every value bound in order
    pub fn query(&self) -> Query<'_, Sqlite, SqliteArguments<'_>> {
        let mut query = sqlx::query(&self.sql);
        for value in &self.binds {
            query = match value {
                SqlValue::Int(v) => query.bind(*v),
                SqlValue::Text(v) => query.bind(v.as_str()),
            };
        }
        query
    }
}

pub struct SqlBuilder<'d> {
    dialect: &'d dyn DialectAdapter,
    sql: String,
    binds: Vec<SqlValue>,
}

impl<'d> SqlBuilder<'d> {
    pub fn new(dialect: &'d dyn DialectAdapter) -> Self {
        Self {
            dialect,
            sql: String::new(),
            binds: Vec::new(),
        }
    }

    pub fn dialect(&self) -> &'d dyn DialectAdapter {
        self.dialect
    }

    /// Append raw SQL text
    pub fn push(&mut self, fragment: &str) -> &mut Self {
        self.sql.push_str(fragment);
        self
    }

    /// Append a placeholder and record its value
    pub fn push_bind(&mut self, value: impl Into<SqlValue>) -> &mut Self {
        self.binds.push(value.into());
        let placeholder = self.dialect.placeholder(self.binds.len());
        self.sql.push_str(&placeholder);
        self
    }

    /// Append a comma separated placeholder list, one per value
    pub fn push_bind_list<I, V>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.push_bind(value);
        }
        self
    }

    pub fn bind_count(&self) -> usize {
        self.binds.len()
    }

    pub fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            binds: self.binds,
        }
    }
}

/// Turn user input into an upper-cased `LIKE` substring pattern.
///
/// Only ASCII letters are folded, matching `UPPER()` on SQLite. Every
/// character in `metacharacters` and the escape character itself are
/// escaped, so `50%_off` matches literally.
pub fn like_pattern(input: &str, escape: char, metacharacters: &str) -> String {
    let mut pattern = String::with_capacity(input.len() + 2);
    pattern.push('%');
    for c in input.to_ascii_uppercase().chars() {
        if c == escape || metacharacters.contains(c) {
            pattern.push(escape);
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
