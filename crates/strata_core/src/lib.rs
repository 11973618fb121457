//! Storage abstraction core for Strata.
//! One storage API over heterogeneous data sources, with batched relation
//! resolution between containers.

pub mod adapter;
pub mod entity;
pub mod logging;
pub mod query;
pub mod storage;
pub mod value;

pub use adapter::{
    Adapter, AdapterError, AdapterResult, ConnectionDescriptor, DummyAdapter, ExecuteOutcome,
    InlineSqlAdapter, PreparedSqlAdapter, XmlAdapter,
};
pub use entity::{Collection, Nested, Record, RecordShape};
pub use logging::{default_log_level, init_logging, logging_status};
pub use query::{
    Comparison, Condition, ConditionValue, Direction, Logical, Operation, QueryBuilder, QueryError,
    QueryResult, QuerySpec,
};
pub use storage::{
    FieldDescriptor, Relation, RelationKind, Storage, StorageError, StorageOutcome, StorageResult,
};
pub use value::{Value, ValueType};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
