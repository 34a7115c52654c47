//! Abstract interface onto the embedded relational engine.
//!
//! The statement adapter (`crate::statement`) is written entirely against
//! these two traits; nothing above this module assumes a particular
//! engine. [`sqlite`] supplies the one concrete implementation used by
//! this crate's own test suite.

use crate::error::Result;
use crate::types::StorageType;

#[cfg(feature = "sqlite")]
pub mod sqlite;

/// Outcome of advancing a prepared statement by one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Row,
    Done,
}

/// A value read back from a column after a successful step.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl ColumnValue {
    pub fn storage_type(&self) -> StorageType {
        match self {
            ColumnValue::Null => StorageType::Null,
            ColumnValue::Integer(_) => StorageType::Integer,
            ColumnValue::Float(_) => StorageType::Float,
            ColumnValue::Text(_) => StorageType::Text,
            ColumnValue::Blob(_) => StorageType::Blob,
        }
    }
}

/// An open handle onto the embedded engine, capable of preparing
/// statements from SQL text.
pub trait Engine {
    type Statement: PreparedStatement;

    /// Prepare a statement from SQL text, returning the prepared
    /// statement and the unconsumed tail of `sql` (empty when the text
    /// held exactly one statement).
    fn prepare<'a>(&self, sql: &'a str) -> Result<(Self::Statement, &'a str)>;
}

/// A prepared statement bound against one open engine handle. Owned
/// exclusively by its caller — never shared across threads.
pub trait PreparedStatement {
    fn bind_null(&mut self, index: usize) -> Result<()>;
    fn bind_int64(&mut self, index: usize, value: i64) -> Result<()>;
    fn bind_float64(&mut self, index: usize, value: f64) -> Result<()>;
    fn bind_text(&mut self, index: usize, value: &str) -> Result<()>;
    fn bind_blob(&mut self, index: usize, value: &[u8]) -> Result<()>;

    /// Advance the statement by one row.
    fn step(&mut self) -> Result<StepOutcome>;

    fn column_count(&self) -> usize;
    fn column_name(&self, index: usize) -> &str;

    /// The engine-reported declared type name for a column (e.g.
    /// `DATETIME`), if any. `None` for columns with no declared type,
    /// such as bare expressions.
    fn column_decltype(&self, index: usize) -> Option<&str>;

    /// The value of a column after a successful `step` that returned
    /// `StepOutcome::Row`.
    fn column_value(&self, index: usize) -> ColumnValue;
}
