//! # chopin-sqlwire
//!
//! Wire-protocol codec and statement adapter tunneling SQL operations
//! between a byte-oriented transport and an embedded relational engine.
//!
//! ## Layout
//! - [`byteutil`]: host/big-endian flip and word-alignment helpers.
//! - [`message`]: the dual static/overflow body buffer with word-aligned
//!   read/write cursors.
//! - [`types`]: the eight-tag wire value vocabulary and the
//!   declared-column-type classification rule.
//! - [`engine`]: the abstract `Engine`/`PreparedStatement` interface the
//!   rest of the crate is written against, plus a SQLite-backed
//!   implementation behind the `sqlite` feature.
//! - [`statement`]: `bind`/`query`, the statement adapter itself.
//! - [`schema`]: declarative record types and a tagged-union dispatcher.
//! - [`error`]: the bounded, chainable error object threaded through
//!   every layer above.

pub mod byteutil;
pub mod engine;
pub mod error;
pub mod message;
pub mod schema;
pub mod statement;
pub mod types;

pub use engine::{ColumnValue, Engine, PreparedStatement, StepOutcome};
pub use error::{Error, ErrorKind, Result};
pub use message::Message;
pub use schema::{Handler, Record};
pub use statement::{bind, query, AdapterConfig, QueryOutcome};
pub use types::{classify_column, ParamTag, StorageType};
