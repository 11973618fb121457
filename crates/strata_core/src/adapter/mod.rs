//! Adapter contract and data-source implementations.
//!
//! # Responsibility
//! - Define the uniform execution contract every data source implements.
//! - Keep source-specific statement details behind that contract.
//!
//! # Invariants
//! - An adapter executes one immutable [`QuerySpec`] per call and holds no
//!   builder state between calls.
//! - Execution failures surface as errors; adapters never return a silent
//!   `false` for a failed source call.

use crate::entity::{Collection, RecordShape};
use crate::query::{Operation, QueryError, QuerySpec};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub mod descriptor;
pub mod dummy;
pub mod sql;
pub mod xml;

pub use descriptor::ConnectionDescriptor;
pub use dummy::DummyAdapter;
pub use sql::{InlineSqlAdapter, PreparedSqlAdapter};
pub use xml::XmlAdapter;

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Adapter-level error covering configuration mistakes and source failures.
#[derive(Debug)]
pub enum AdapterError {
    /// The data source cannot perform the requested operation.
    Unsupported {
        adapter: &'static str,
        operation: Operation,
    },
    /// Bad adapter configuration (descriptor file, container path).
    Config(String),
    /// Invalid query description (bad operator or value type).
    Query(QueryError),
    /// Underlying driver failure, propagated unchanged.
    Source(rusqlite::Error),
    /// The source returned data the shape cannot represent.
    InvalidData(String),
}

impl Display for AdapterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsupported { adapter, operation } => {
                write!(f, "{adapter} adapter does not support {}", operation.name())
            }
            Self::Config(message) => write!(f, "adapter configuration error: {message}"),
            Self::Query(err) => write!(f, "{err}"),
            Self::Source(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid source data: {message}"),
        }
    }
}

impl Error for AdapterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Query(err) => Some(err),
            Self::Source(err) => Some(err),
            _ => None,
        }
    }
}

impl From<QueryError> for AdapterError {
    fn from(value: QueryError) -> Self {
        Self::Query(value)
    }
}

impl From<rusqlite::Error> for AdapterError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Source(value)
    }
}

/// Result of executing one operation against a data source.
#[derive(Debug)]
pub enum ExecuteOutcome {
    /// Matched row count (count operation).
    Count(u64),
    /// Hydrated records (select/tables/describe).
    Records(Collection),
    /// Identifier assigned by the source (insert).
    InsertedId(i64),
    /// Success flag (update/delete).
    Done(bool),
}

/// One data source behind the storage layer.
///
/// `shape` supplies the record factory used for hydration; `container` is the
/// source-side namespace (table name, XML element path).
pub trait Adapter {
    fn execute(
        &mut self,
        container: &str,
        shape: &Arc<RecordShape>,
        spec: &QuerySpec,
    ) -> AdapterResult<ExecuteOutcome>;
}
