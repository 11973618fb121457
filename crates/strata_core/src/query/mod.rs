//! Abstract query description shared by storage and adapters.
//!
//! # Responsibility
//! - Define the immutable [`QuerySpec`] value an adapter executes.
//! - Provide the fluent [`QueryBuilder`] that assembles one spec and is
//!   discarded afterwards.
//!
//! # Invariants
//! - Operator and value-type symbols are validated at the call that supplies
//!   them, never deferred to execute time.
//! - A built spec is a plain value; executing it cannot leak state into the
//!   next operation.

use crate::value::{Value, ValueType};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type QueryResult<T> = Result<T, QueryError>;

/// Configuration error raised while describing a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    UnknownComparison(String),
    UnknownLogical(String),
    UnknownDirection(String),
    UnknownValueType(char),
    MissingOperation,
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownComparison(symbol) => write!(f, "invalid comparison operator `{symbol}`"),
            Self::UnknownLogical(symbol) => write!(f, "invalid logical operator `{symbol}`"),
            Self::UnknownDirection(symbol) => write!(f, "invalid order direction `{symbol}`"),
            Self::UnknownValueType(tag) => write!(f, "invalid value type `{tag}`, expected one of i|s|d|b"),
            Self::MissingOperation => write!(f, "no operation defined for query"),
        }
    }
}

impl Error for QueryError {}

/// Operation kind an adapter is asked to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Count,
    Select,
    Insert,
    Update,
    Delete,
    Tables,
    Describe,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Tables => "tables",
            Self::Describe => "describe",
        }
    }
}

/// Comparison operator in a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Comparison {
    pub fn from_symbol(symbol: &str) -> QueryResult<Self> {
        match symbol {
            "==" => Ok(Self::Eq),
            "!=" | "<>" => Ok(Self::Ne),
            "<" => Ok(Self::Lt),
            ">" => Ok(Self::Gt),
            "<=" => Ok(Self::Le),
            ">=" => Ok(Self::Ge),
            other => Err(QueryError::UnknownComparison(other.to_string())),
        }
    }
}

/// Logical operator joining a condition to the preceding one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Logical {
    And,
    Or,
    Xor,
}

impl Logical {
    pub fn from_symbol(symbol: &str) -> QueryResult<Self> {
        match symbol.to_ascii_uppercase().as_str() {
            "&&" => Ok(Self::And),
            "||" => Ok(Self::Or),
            "XOR" => Ok(Self::Xor),
            _ => Err(QueryError::UnknownLogical(symbol.to_string())),
        }
    }
}

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn from_symbol(symbol: &str) -> QueryResult<Self> {
        match symbol.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(QueryError::UnknownDirection(symbol.to_string())),
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Condition value: a scalar, or a set joined with OR for one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Single(Value),
    AnyOf(Vec<Value>),
}

impl From<Value> for ConditionValue {
    fn from(value: Value) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<Value>> for ConditionValue {
    fn from(values: Vec<Value>) -> Self {
        Self::AnyOf(values)
    }
}

/// One predicate against a container field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub value: ConditionValue,
    pub comparison: Comparison,
    pub logical: Logical,
    pub value_type: ValueType,
}

/// One field = value assignment for insert/update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub field: String,
    pub value: Value,
    pub value_type: ValueType,
}

/// One order clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Selected field with its optional source-side name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRef {
    /// Property name on the hydrated record.
    pub field: String,
    /// Column/node name in the container, when it differs from `field`.
    pub mapping: Option<String>,
}

impl FieldRef {
    /// Name of the field inside the data source.
    pub fn source_name(&self) -> &str {
        self.mapping.as_deref().unwrap_or(&self.field)
    }
}

/// Fully assembled, immutable description of one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub operation: Operation,
    pub fields: Vec<FieldRef>,
    pub values: Vec<Assignment>,
    pub conditions: Vec<Condition>,
    pub order: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub key_field: Option<String>,
}

/// Fluent builder producing one [`QuerySpec`].
///
/// Each operation method overwrites the previously pending one; only one
/// operation is active per builder. The builder is consumed by
/// [`QueryBuilder::build`] and never reused.
#[derive(Debug, Default, Clone)]
pub struct QueryBuilder {
    operation: Option<Operation>,
    fields: Vec<FieldRef>,
    values: Vec<Assignment>,
    conditions: Vec<Condition>,
    order: Vec<OrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
    key_field: Option<String>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operation(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn count(self) -> Self {
        self.operation(Operation::Count)
    }

    pub fn select(self) -> Self {
        self.operation(Operation::Select)
    }

    pub fn insert(self) -> Self {
        self.operation(Operation::Insert)
    }

    pub fn update(self) -> Self {
        self.operation(Operation::Update)
    }

    pub fn delete(self) -> Self {
        self.operation(Operation::Delete)
    }

    pub fn tables(self) -> Self {
        self.operation(Operation::Tables)
    }

    pub fn describe(self) -> Self {
        self.operation(Operation::Describe)
    }

    /// Registers a field to retrieve; `mapping` renames it in the source.
    pub fn field(mut self, field: impl Into<String>, mapping: Option<String>) -> Self {
        self.fields.push(FieldRef {
            field: field.into(),
            mapping,
        });
        self
    }

    /// Registers a field = value write assignment.
    pub fn value(
        mut self,
        field: impl Into<String>,
        value: Value,
        type_tag: char,
    ) -> QueryResult<Self> {
        let value_type =
            ValueType::from_tag(type_tag).ok_or(QueryError::UnknownValueType(type_tag))?;
        self.values.push(Assignment {
            field: field.into(),
            value,
            value_type,
        });
        Ok(self)
    }

    /// Registers a predicate. An `AnyOf` value means "OR across these values
    /// for this field", joined into the predicate list with `logical`.
    pub fn condition(
        mut self,
        field: impl Into<String>,
        value: impl Into<ConditionValue>,
        comparison: &str,
        logical: &str,
        type_tag: char,
    ) -> QueryResult<Self> {
        let comparison = Comparison::from_symbol(comparison)?;
        let logical = Logical::from_symbol(logical)?;
        let value_type =
            ValueType::from_tag(type_tag).ok_or(QueryError::UnknownValueType(type_tag))?;
        self.conditions.push(Condition {
            field: field.into(),
            value: value.into(),
            comparison,
            logical,
            value_type,
        });
        Ok(self)
    }

    pub fn order(mut self, field: impl Into<String>, direction: &str) -> QueryResult<Self> {
        self.order.push(OrderBy {
            field: field.into(),
            direction: Direction::from_symbol(direction)?,
        });
        Ok(self)
    }

    pub fn limit(mut self, limit: u64, offset: Option<u64>) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }

    pub fn key_field(mut self, field: Option<String>) -> Self {
        self.key_field = field;
        self
    }

    /// Finalizes the spec. Building without an operation is a configuration
    /// error.
    pub fn build(self) -> QueryResult<QuerySpec> {
        let operation = self.operation.ok_or(QueryError::MissingOperation)?;
        Ok(QuerySpec {
            operation,
            fields: self.fields,
            values: self.values,
            conditions: self.conditions,
            order: self.order,
            limit: self.limit,
            offset: self.offset,
            key_field: self.key_field,
        })
    }
}
