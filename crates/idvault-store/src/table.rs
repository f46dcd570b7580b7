use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::BoxStream;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// Pseudo-field naming a row's partition key in filters.
pub const PARTITION_KEY: &str = "PartitionKey";
/// Pseudo-field naming a row's row key in filters.
pub const ROW_KEY: &str = "RowKey";

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// A typed table cell.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum FieldValue {
    String(String),
    DateTime(DateTime<Utc>),
    Int(i64),
    Bool(bool),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Self::DateTime(dt) => write!(
                f,
                "datetime'{}'",
                dt.to_rfc3339_opts(SecondsFormat::Millis, true)
            ),
            Self::Int(i) => write!(f, "{i}L"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::DateTime(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A row addressed by `(partition_key, row_key)` with named fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    pub partition_key: String,
    pub row_key: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl TableRow {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Set a field only when a value is present.
    pub fn with_opt<V: Into<FieldValue>>(self, field: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(v) => self.with(field, v),
            None => self,
        }
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        match field {
            PARTITION_KEY => Some(&self.partition_key),
            ROW_KEY => Some(&self.row_key),
            _ => self.fields.get(field).and_then(FieldValue::as_str),
        }
    }

    pub fn get_datetime(&self, field: &str) -> Option<DateTime<Utc>> {
        self.fields.get(field).and_then(FieldValue::as_datetime)
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// One predicate of a [`TableFilter`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterClause {
    /// `field == value`. `PartitionKey` and `RowKey` address the row keys.
    Eq { field: String, value: FieldValue },
    /// `field < at`. Rows without a date in `field` do not match.
    Before { field: String, at: DateTime<Utc> },
}

impl FilterClause {
    fn matches(&self, row: &TableRow) -> bool {
        match self {
            Self::Eq { field, value } => match field.as_str() {
                PARTITION_KEY | ROW_KEY => {
                    value.as_str().is_some_and(|v| row.get_str(field) == Some(v))
                }
                _ => row.fields.get(field) == Some(value),
            },
            Self::Before { field, at } => row.get_datetime(field).is_some_and(|dt| dt < *at),
        }
    }
}

impl fmt::Display for FilterClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq { field, value } => write!(f, "{field} eq {value}"),
            Self::Before { field, at } => {
                write!(f, "{field} lt {}", FieldValue::DateTime(*at))
            }
        }
    }
}

/// A conjunction of [`FilterClause`]s. The empty filter matches every row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableFilter {
    clauses: Vec<FilterClause>,
}

impl TableFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter pinned to a single partition.
    pub fn partition(partition_key: impl Into<String>) -> Self {
        Self::new().and_eq(PARTITION_KEY, partition_key.into())
    }

    pub fn and_eq(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.clauses.push(FilterClause::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn and_before(mut self, field: impl Into<String>, at: DateTime<Utc>) -> Self {
        self.clauses.push(FilterClause::Before {
            field: field.into(),
            at,
        });
        self
    }

    pub fn clauses(&self) -> &[FilterClause] {
        &self.clauses
    }

    /// The partition this filter is restricted to, if it has a
    /// `PartitionKey eq` clause. Backends use it to avoid scanning.
    pub fn pinned_partition(&self) -> Option<&str> {
        self.clauses.iter().find_map(|clause| match clause {
            FilterClause::Eq { field, value } if field == PARTITION_KEY => value.as_str(),
            _ => None,
        })
    }

    pub fn matches(&self, row: &TableRow) -> bool {
        self.clauses.iter().all(|clause| clause.matches(row))
    }
}

impl fmt::Display for TableFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                f.write_str(" and ")?;
            }
            write!(f, "{clause}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TableStore
// ---------------------------------------------------------------------------

/// Lazy sequence of query results.
pub type RowStream = BoxStream<'static, StoreResult<TableRow>>;

/// Partitioned table store.
///
/// Implementations must satisfy these invariants:
/// - `get` of an absent row returns `Ok(None)`.
/// - `upsert` replaces the whole row.
/// - `delete` is idempotent; deleting an absent row is `Ok(false)`.
/// - `query` yields rows in no guaranteed order, at most `max_results` of
///   them when a cap is given.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Create a table. Creating an existing table is a no-op.
    async fn create_table(&self, table: &str) -> StoreResult<()>;

    /// Insert or replace a row.
    async fn upsert(&self, table: &str, row: TableRow) -> StoreResult<()>;

    /// Read a row by its keys.
    async fn get(&self, table: &str, partition_key: &str, row_key: &str)
        -> StoreResult<Option<TableRow>>;

    /// Delete a row. Returns `true` if it existed.
    async fn delete(&self, table: &str, partition_key: &str, row_key: &str) -> StoreResult<bool>;

    /// Stream the rows matching `filter`.
    async fn query(
        &self,
        table: &str,
        filter: &TableFilter,
        max_results: Option<usize>,
    ) -> StoreResult<RowStream>;

    /// Run [`query`](Self::query) and collect every row.
    async fn query_all(
        &self,
        table: &str,
        filter: &TableFilter,
        max_results: Option<usize>,
    ) -> StoreResult<Vec<TableRow>> {
        self.query(table, filter, max_results)
            .await?
            .try_collect()
            .await
    }
}
