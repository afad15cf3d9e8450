//! Per-backend SQL differences
//!
//! A dialect is selected once at startup (from `database.dialect` or the URL
//! scheme) and shared behind `Arc<dyn DialectAdapter>`. It answers two
//! questions the statement builders cannot answer portably:
//!
//! - how a new row obtains its id (sequence fetch vs. identity column)
//! - how "order by X, skip N, take M" is spelled
//!
//! Paging values are typed integers rendered inline, so they never shift the
//! indices of bound parameters.

use crate::error::{EventError, Result};
use crate::model::PageControl;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialectKind {
    Sqlite,
    Postgres,
    Oracle,
    H2,
    SqlServer,
}

impl DialectKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::Oracle => "oracle",
            Self::H2 => "h2",
            Self::SqlServer => "sqlserver",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "oracle" => Ok(Self::Oracle),
            "h2" => Ok(Self::H2),
            "sqlserver" | "mssql" => Ok(Self::SqlServer),
            other => Err(EventError::Config(format!(
                "Unknown database dialect '{}'",
                other
            ))),
        }
    }

    /// Infer the dialect from a connection URL scheme (`sqlite:`, `postgres://`, ...)
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url.split(':').next().unwrap_or_default();
        Self::from_name(scheme).map_err(|_| {
            EventError::Config(format!(
                "Cannot infer database dialect from URL '{}'",
                url
            ))
        })
    }

    /// Whether the engine assigns ids through identity columns
    pub fn uses_identity_columns(&self) -> bool {
        matches!(self, Self::Sqlite | Self::SqlServer)
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Strategy for dialect-specific SQL fragments.
pub trait DialectAdapter: Send + Sync + fmt::Debug {
    fn kind(&self) -> DialectKind;

    /// Expression producing the next id of `table`.
    ///
    /// `None` means the engine assigns the id itself and the id column must be
    /// left out of the insert.
    fn next_id_expression(&self, table: &str) -> Option<String>;

    /// Placeholder for the 1-based bind `index`
    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    /// Escape character used in `LIKE ... ESCAPE` clauses
    fn escape_char(&self) -> char {
        '\\'
    }

    /// Characters with wildcard meaning inside a `LIKE` pattern
    fn like_metacharacters(&self) -> &'static str {
        "%_"
    }

    fn escape_clause(&self) -> String {
        format!(" ESCAPE '{}'", self.escape_char())
    }

    /// Append ordering and paging to `query`.
    ///
    /// `order_by` is an already validated `ORDER BY` body such as
    /// `ev.timestamp DESC`.
    fn apply_paging(&self, query: &str, order_by: &str, page: &PageControl) -> String;
}

#[derive(Debug, Default)]
pub struct SqliteDialect;

impl DialectAdapter for SqliteDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn next_id_expression(&self, _table: &str) -> Option<String> {
        None
    }

    fn apply_paging(&self, query: &str, order_by: &str, page: &PageControl) -> String {
        let mut sql = format!("{} ORDER BY {}", query, order_by);
        match page.limit {
            Some(limit) => sql.push_str(&format!(" LIMIT {}", limit)),
            // SQLite has no OFFSET without LIMIT
            None if page.offset > 0 => sql.push_str(" LIMIT -1"),
            None => {}
        }
        if page.offset > 0 {
            sql.push_str(&format!(" OFFSET {}", page.offset));
        }
        sql
    }
}

#[derive(Debug, Default)]
pub struct PostgresDialect;

impl DialectAdapter for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn next_id_expression(&self, table: &str) -> Option<String> {
        Some(format!("nextval('{}_id_seq')", table))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    // A backslash literal depends on standard_conforming_strings
    fn escape_char(&self) -> char {
        '!'
    }

    fn apply_paging(&self, query: &str, order_by: &str, page: &PageControl) -> String {
        limit_offset_paging(query, order_by, page)
    }
}

#[derive(Debug, Default)]
pub struct H2Dialect;

impl DialectAdapter for H2Dialect {
    fn kind(&self) -> DialectKind {
        DialectKind::H2
    }

    fn next_id_expression(&self, table: &str) -> Option<String> {
        Some(format!("NEXT VALUE FOR {}_id_seq", table))
    }

    fn apply_paging(&self, query: &str, order_by: &str, page: &PageControl) -> String {
        limit_offset_paging(query, order_by, page)
    }
}

#[derive(Debug, Default)]
pub struct OracleDialect;

impl DialectAdapter for OracleDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Oracle
    }

    fn next_id_expression(&self, table: &str) -> Option<String> {
        Some(format!("{}_ID_SEQ.NEXTVAL", table.to_ascii_uppercase()))
    }

    fn apply_paging(&self, query: &str, order_by: &str, page: &PageControl) -> String {
        let ordered = format!("{} ORDER BY {}", query, order_by);
        if !page.is_paged() {
            return ordered;
        }

        let upper_bound = page
            .limit
            .map(|limit| format!(" WHERE ROWNUM <= {}", page.offset + limit))
            .unwrap_or_default();

        format!(
            "SELECT * FROM ( SELECT inner_q.*, ROWNUM AS rnum FROM ( {} ) inner_q{} ) WHERE rnum > {}",
            ordered, upper_bound, page.offset
        )
    }
}

#[derive(Debug, Default)]
pub struct SqlServerDialect;

impl DialectAdapter for SqlServerDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::SqlServer
    }

    fn next_id_expression(&self, _table: &str) -> Option<String> {
        None
    }

    // `[...]` is a character class in T-SQL patterns
    fn like_metacharacters(&self) -> &'static str {
        "%_["
    }

    fn apply_paging(&self, query: &str, order_by: &str, page: &PageControl) -> String {
        let mut sql = format!("{} ORDER BY {}", query, order_by);
        if page.is_paged() {
            sql.push_str(&format!(" OFFSET {} ROWS", page.offset));
            if let Some(limit) = page.limit {
                sql.push_str(&format!(" FETCH NEXT {} ROWS ONLY", limit));
            }
        }
        sql
    }
}

fn limit_offset_paging(query: &str, order_by: &str, page: &PageControl) -> String {
    let mut sql = format!("{} ORDER BY {}", query, order_by);
    if let Some(limit) = page.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    if page.offset > 0 {
        sql.push_str(&format!(" OFFSET {}", page.offset));
    }
    sql
}

/// Adapter instance for a dialect kind
pub fn adapter_for(kind: DialectKind) -> Arc<dyn DialectAdapter> {
    match kind {
        DialectKind::Sqlite => Arc::new(SqliteDialect),
        DialectKind::Postgres => Arc::new(PostgresDialect),
        DialectKind::Oracle => Arc::new(OracleDialect),
        DialectKind::H2 => Arc::new(H2Dialect),
        DialectKind::SqlServer => Arc::new(SqlServerDialect),
    }
}

/// Resolve the dialect from an explicit name, falling back to the URL scheme.
///
/// Called once at startup; an unknown dialect is a fatal configuration error.
pub fn resolve(explicit: Option<&str>, url: &str) -> Result<Arc<dyn DialectAdapter>> {
    let kind = match explicit {
        Some(name) if !name.trim().is_empty() => DialectKind::from_name(name)?,
        _ => DialectKind::from_url(url)?,
    };
    Ok(adapter_for(kind))
}
