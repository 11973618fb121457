//! Source-agnostic storage orchestration.
//!
//! # Responsibility
//! - Map domain field names to adapter field names.
//! - Track the pending operation and its parameters, then drive exactly one
//!   adapter plus any attached relations.
//! - Decide insert vs update for `write`.
//!
//! # Invariants
//! - Referencing an unregistered field anywhere is a configuration error
//!   raised at the call site, never at execute time.
//! - Operation-scoped state is cleared after every `execute`, success or
//!   failure; relation attachments persist until `reset(true)`.
//! - One storage instance serves one logical operation at a time; it is a
//!   mutable builder, not a value.

use crate::adapter::{Adapter, AdapterError, ExecuteOutcome};
use crate::entity::{Collection, Record, RecordShape};
use crate::query::{
    Assignment, Comparison, Condition, ConditionValue, Direction, FieldRef, Logical, Operation,
    OrderBy, QueryError, QuerySpec,
};
use crate::value::{Value, ValueType};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

pub mod relation;

pub use relation::{Relation, RelationKind};

/// Upper bound on relation recursion depth. A relation graph deeper than
/// this is treated as misconfigured (most likely cyclic).
pub const MAX_RELATION_DEPTH: usize = 8;

pub type StorageResult<T> = Result<T, StorageError>;

/// Storage-level error taxonomy.
#[derive(Debug)]
pub enum StorageError {
    /// A condition, order, value or key-field referenced a field with no
    /// registered descriptor.
    UnknownField(String),
    /// Invalid operator or value-type symbol.
    Query(QueryError),
    /// `write` matched more than one primary-key candidate.
    NonUnique { container: String, matches: u64 },
    /// `read_one` on an empty result set.
    OutOfRange,
    /// Insert/update/delete dispatched without an entity.
    MissingEntity,
    /// Relation recursion exceeded [`MAX_RELATION_DEPTH`].
    RelationDepth { depth: usize },
    /// The adapter returned a result kind the operation cannot accept.
    InvalidResult(&'static str),
    /// Underlying adapter failure, propagated unchanged.
    Adapter(AdapterError),
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownField(field) => write!(f, "field `{field}` not found"),
            Self::Query(err) => write!(f, "{err}"),
            Self::NonUnique { container, matches } => write!(
                f,
                "entity can not be written to `{container}` - not unique ({matches} matches)"
            ),
            Self::OutOfRange => write!(f, "result out of range or does not exist"),
            Self::MissingEntity => write!(f, "expected entity for operation not found"),
            Self::RelationDepth { depth } => write!(
                f,
                "relation resolution depth {depth} exceeds {MAX_RELATION_DEPTH}; relation graph is likely cyclic"
            ),
            Self::InvalidResult(expected) => write!(f, "invalid result type, expected {expected}"),
            Self::Adapter(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Query(err) => Some(err),
            Self::Adapter(err) => Some(err),
            _ => None,
        }
    }
}

impl From<QueryError> for StorageError {
    fn from(value: QueryError) -> Self {
        Self::Query(value)
    }
}

impl From<AdapterError> for StorageError {
    fn from(value: AdapterError) -> Self {
        Self::Adapter(value)
    }
}

/// Registered storage field: domain name, requirements and source mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub required: bool,
    pub value_type: ValueType,
    pub index: bool,
    pub primary: bool,
    pub mapping: Option<String>,
}

impl FieldDescriptor {
    /// Field name inside the data source.
    pub fn storage_name(&self) -> &str {
        self.mapping.as_deref().unwrap_or(&self.name)
    }
}

/// Result of one executed storage operation.
#[derive(Debug)]
pub enum StorageOutcome {
    Count(u64),
    Records(Collection),
    Record(Record),
    Written(Record),
    Deleted(bool),
}

impl StorageOutcome {
    pub fn count(self) -> StorageResult<u64> {
        match self {
            Self::Count(count) => Ok(count),
            _ => Err(StorageError::InvalidResult("count")),
        }
    }

    pub fn records(self) -> StorageResult<Collection> {
        match self {
            Self::Records(collection) => Ok(collection),
            _ => Err(StorageError::InvalidResult("collection")),
        }
    }

    pub fn record(self) -> StorageResult<Record> {
        match self {
            Self::Record(record) | Self::Written(record) => Ok(record),
            _ => Err(StorageError::InvalidResult("record")),
        }
    }

    pub fn deleted(self) -> StorageResult<bool> {
        match self {
            Self::Deleted(done) => Ok(done),
            _ => Err(StorageError::InvalidResult("delete flag")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingOp {
    Count,
    Read,
    ReadOne,
    Insert,
    Update,
    Delete,
    Tables,
    Describe,
}

impl PendingOp {
    fn name(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Read => "read",
            Self::ReadOne => "readOne",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Tables => "tables",
            Self::Describe => "describe",
        }
    }

    fn operation(self) -> Operation {
        match self {
            Self::Count => Operation::Count,
            Self::Read | Self::ReadOne => Operation::Select,
            Self::Insert => Operation::Insert,
            Self::Update => Operation::Update,
            Self::Delete => Operation::Delete,
            Self::Tables => Operation::Tables,
            Self::Describe => Operation::Describe,
        }
    }
}

/// Single point of interaction with one data-source container.
pub struct Storage {
    adapter: Box<dyn Adapter>,
    container: String,
    shape: Arc<RecordShape>,
    fields: Vec<FieldDescriptor>,
    relations: Vec<Relation>,

    // operation-scoped state, cleared by every execute/reset
    op: Option<PendingOp>,
    projection: Vec<String>,
    values: Vec<Assignment>,
    conditions: Vec<Condition>,
    order: Vec<OrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
    key_field: Option<String>,
    entity: Option<Record>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("container", &self.container)
            .field("fields", &self.fields)
            .field("op", &self.op)
            .finish_non_exhaustive()
    }
}

impl Storage {
    pub fn new(adapter: Box<dyn Adapter>, container: impl Into<String>) -> Self {
        Self {
            adapter,
            container: container.into(),
            shape: Arc::new(RecordShape::new(Vec::<String>::new())),
            fields: Vec::new(),
            relations: Vec::new(),
            op: None,
            projection: Vec::new(),
            values: Vec::new(),
            conditions: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            key_field: None,
            entity: None,
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Registers a storage field. Unregistered fields are never written and
    /// may not appear in conditions, ordering or values.
    ///
    /// `type_tag` is one of `i`/`s`/`d`/`b`; any other tag is rejected here.
    pub fn field(
        &mut self,
        name: impl Into<String>,
        required: bool,
        type_tag: char,
        index: bool,
        primary: bool,
        mapping: Option<&str>,
    ) -> StorageResult<&mut Self> {
        let value_type =
            ValueType::from_tag(type_tag).ok_or(QueryError::UnknownValueType(type_tag))?;
        let descriptor = FieldDescriptor {
            name: name.into(),
            required,
            value_type,
            index,
            primary,
            mapping: mapping.map(str::to_string),
        };

        self.fields.retain(|existing| existing.name != descriptor.name);
        self.fields.push(descriptor);
        self.shape = Arc::new(RecordShape::new(
            self.fields.iter().map(|d| d.name.clone()),
        ));
        Ok(self)
    }

    /// The record factory for this storage's configured field set.
    pub fn shape(&self) -> &Arc<RecordShape> {
        &self.shape
    }

    /// Creates an empty record of this storage's shape.
    pub fn create_record(&self) -> Record {
        self.shape.create([])
    }

    pub fn create_collection(&self) -> Collection {
        Collection::new()
    }

    /// Attaches a relation; a relation with the same container replaces the
    /// previous one.
    pub fn relation(&mut self, relation: Relation) -> &mut Self {
        self.relations
            .retain(|existing| existing.identify() != relation.identify());
        self.relations.push(relation);
        self
    }

    /// Whether a relation for `container` (or any relation, when `None`) is
    /// attached.
    pub fn has_relation(&self, container: Option<&str>) -> bool {
        match container {
            Some(name) => self.relations.iter().any(|r| r.identify() == name),
            None => !self.relations.is_empty(),
        }
    }

    fn descriptor(&self, field: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|d| d.name == field)
    }

    fn require(&self, field: &str) -> StorageResult<&FieldDescriptor> {
        self.descriptor(field)
            .ok_or_else(|| StorageError::UnknownField(field.to_string()))
    }

    // ---- operation selection -------------------------------------------

    pub fn count(&mut self) -> &mut Self {
        self.op = Some(PendingOp::Count);
        self
    }

    pub fn read(&mut self) -> &mut Self {
        self.op = Some(PendingOp::Read);
        self
    }

    /// `read` limited to one row; execution takes the first record and
    /// raises [`StorageError::OutOfRange`] when the result is empty.
    pub fn read_one(&mut self) -> &mut Self {
        self.op = Some(PendingOp::ReadOne);
        self.limit = Some(1);
        self.offset = None;
        self
    }

    /// Lists the containers available in the data source. Records carry a
    /// `name` property.
    pub fn tables(&mut self) -> &mut Self {
        self.op = Some(PendingOp::Tables);
        self
    }

    /// Describes this storage's container as the source reports it, one
    /// record per column.
    pub fn describe(&mut self) -> &mut Self {
        self.op = Some(PendingOp::Describe);
        self
    }

    /// Prepares an insert of every non-empty registered property.
    pub fn insert(&mut self, record: Record) -> StorageResult<&mut Self> {
        self.op = Some(PendingOp::Insert);
        for (field, value) in record.retrieve() {
            if value.is_empty() {
                continue;
            }
            let Some(descriptor) = self.descriptor(&field) else {
                continue;
            };
            let assignment = Assignment {
                field: descriptor.storage_name().to_string(),
                value_type: descriptor.value_type,
                value,
            };
            self.values.push(assignment);
        }
        self.entity = Some(record);
        Ok(self)
    }

    /// Prepares an update keyed on the record's primary-index values.
    ///
    /// Primary fields are excluded from the value set unless every registered
    /// field is an index (the partial-key update heuristic).
    pub fn update(&mut self, record: Record) -> StorageResult<&mut Self> {
        self.op = Some(PendingOp::Update);
        self.limit = Some(1);

        let index_count = self.fields.iter().filter(|d| d.index).count();
        let skip_primary = index_count != self.fields.len();

        for (field, value) in record.retrieve() {
            let Some(descriptor) = self.descriptor(&field) else {
                continue;
            };
            if skip_primary && descriptor.primary {
                continue;
            }
            let assignment = Assignment {
                field: descriptor.storage_name().to_string(),
                value_type: descriptor.value_type,
                value,
            };
            self.values.push(assignment);
        }

        for (field, value) in record.retrieve() {
            if value.is_empty() {
                continue;
            }
            let is_primary = self.descriptor(&field).map_or(false, |d| d.primary);
            if is_primary {
                self.push_condition(&field, value.into(), "==", "&&")?;
            }
        }

        self.entity = Some(record);
        Ok(self)
    }

    /// Prepares a delete conditioned on every non-empty registered property.
    pub fn delete(&mut self, record: Record) -> StorageResult<&mut Self> {
        self.op = Some(PendingOp::Delete);
        self.limit = Some(1);

        for (field, value) in record.retrieve() {
            if value.is_empty() || self.descriptor(&field).is_none() {
                continue;
            }
            self.push_condition(&field, value.into(), "==", "&&")?;
        }

        self.entity = Some(record);
        Ok(self)
    }

    /// Write-or-update disambiguation: counts rows matching the record's
    /// primary-index fields, then delegates to insert (zero matches or no
    /// primary key), update (exactly one) or fails as non-unique.
    pub fn write(&mut self, record: Record) -> StorageResult<&mut Self> {
        let mut index_counter = 0usize;
        for (field, value) in record.retrieve() {
            let is_primary = self.descriptor(&field).map_or(false, |d| d.primary);
            if is_primary {
                self.push_condition(&field, value.into(), "==", "&&")?;
                index_counter += 1;
            }
        }

        self.op = Some(PendingOp::Count);
        let matches = self.execute_depth(0)?.count()?;

        if index_counter == 0 || matches == 0 {
            self.insert(record)?;
        } else if matches == 1 {
            self.update(record)?;
        } else {
            return Err(StorageError::NonUnique {
                container: self.container.clone(),
                matches,
            });
        }

        Ok(self)
    }

    // ---- operation parameters ------------------------------------------

    /// Restricts read operations to a subset of registered fields.
    pub fn fields(&mut self, names: &[&str]) -> StorageResult<&mut Self> {
        for name in names {
            self.require(name)?;
            if !self.projection.iter().any(|existing| existing == name) {
                self.projection.push((*name).to_string());
            }
        }
        Ok(self)
    }

    /// Adds an equality condition joined with AND.
    pub fn condition(
        &mut self,
        field: &str,
        value: impl Into<ConditionValue>,
    ) -> StorageResult<&mut Self> {
        self.condition_with(field, value, "==", "&&")
    }

    /// Adds a condition with explicit comparison and logical operators.
    /// Unknown operator symbols fail here, before any query executes.
    pub fn condition_with(
        &mut self,
        field: &str,
        value: impl Into<ConditionValue>,
        comparison: &str,
        logical: &str,
    ) -> StorageResult<&mut Self> {
        self.push_condition(field, value.into(), comparison, logical)?;
        Ok(self)
    }

    pub fn order(&mut self, field: &str, direction: &str) -> StorageResult<&mut Self> {
        let storage_name = self.require(field)?.storage_name().to_string();
        self.order.push(OrderBy {
            field: storage_name,
            direction: Direction::from_symbol(direction)?,
        });
        Ok(self)
    }

    pub fn limit(&mut self, limit: u64, offset: Option<u64>) -> &mut Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }

    /// Keys the result collection by this field's value per record.
    pub fn key_field(&mut self, field: &str) -> StorageResult<&mut Self> {
        self.require(field)?;
        self.key_field = Some(field.to_string());
        Ok(self)
    }

    pub fn key_field_name(&self) -> Option<&str> {
        self.key_field.as_deref()
    }

    /// Primary-index values of a record, in declaration order; the record's
    /// identity within this storage's container.
    pub(crate) fn primary_values(&self, record: &Record) -> Vec<Value> {
        self.fields
            .iter()
            .filter(|d| d.primary)
            .map(|d| record.get(&d.name))
            .collect()
    }

    fn push_condition(
        &mut self,
        field: &str,
        value: ConditionValue,
        comparison: &str,
        logical: &str,
    ) -> StorageResult<()> {
        let (storage_name, value_type) = {
            let descriptor = self.require(field)?;
            (descriptor.storage_name().to_string(), descriptor.value_type)
        };
        self.conditions.push(Condition {
            field: storage_name,
            value,
            comparison: Comparison::from_symbol(comparison)?,
            logical: Logical::from_symbol(logical)?,
            value_type,
        });
        Ok(())
    }

    // ---- execution ------------------------------------------------------

    /// Executes the pending operation, resolves attached relations and
    /// clears operation-scoped state regardless of outcome.
    pub fn execute(&mut self) -> StorageResult<StorageOutcome> {
        self.execute_depth(0)
    }

    pub(crate) fn execute_depth(&mut self, depth: usize) -> StorageResult<StorageOutcome> {
        let started_at = Instant::now();
        let op = self.op.ok_or(QueryError::MissingOperation);
        let op_name = op.as_ref().map_or("none", |op| op.name());

        let result = match op {
            Ok(_) if depth > MAX_RELATION_DEPTH => Err(StorageError::RelationDepth { depth }),
            Ok(op) => self.dispatch(op, depth),
            Err(err) => Err(err.into()),
        };
        self.reset_ops();

        match &result {
            Ok(_) => info!(
                "event=storage_execute module=storage status=ok container={} op={} duration_ms={}",
                self.container,
                op_name,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=storage_execute module=storage status=error container={} op={} duration_ms={} error={}",
                self.container,
                op_name,
                started_at.elapsed().as_millis(),
                err
            ),
        }

        result
    }

    fn dispatch(&mut self, op: PendingOp, depth: usize) -> StorageResult<StorageOutcome> {
        let spec = self.assemble_spec(op);
        match op {
            PendingOp::Count => {
                match self.adapter.execute(&self.container, &self.shape, &spec)? {
                    ExecuteOutcome::Count(count) => Ok(StorageOutcome::Count(count)),
                    _ => Err(StorageError::InvalidResult("count")),
                }
            }
            PendingOp::Read => {
                let mut collection = self.run_select(&spec)?;
                for relation in &mut self.relations {
                    relation.read(&mut collection, depth)?;
                }
                Ok(StorageOutcome::Records(collection))
            }
            PendingOp::ReadOne => {
                let mut collection = self.run_select(&spec)?;
                if collection.is_empty() {
                    return Err(StorageError::OutOfRange);
                }
                for relation in &mut self.relations {
                    relation.read(&mut collection, depth)?;
                }
                let record = collection.take_first().ok_or(StorageError::OutOfRange)?;
                Ok(StorageOutcome::Record(record))
            }
            PendingOp::Insert => {
                let mut record = self.entity.take().ok_or(StorageError::MissingEntity)?;
                let id = match self.adapter.execute(&self.container, &self.shape, &spec)? {
                    ExecuteOutcome::InsertedId(id) => id,
                    _ => return Err(StorageError::InvalidResult("inserted identifier")),
                };
                self.assign_identity(&mut record, id);
                for relation in &mut self.relations {
                    relation.write(&mut record, depth)?;
                }
                Ok(StorageOutcome::Written(record))
            }
            PendingOp::Update => {
                let mut record = self.entity.take().ok_or(StorageError::MissingEntity)?;
                match self.adapter.execute(&self.container, &self.shape, &spec)? {
                    ExecuteOutcome::Done(_) => {}
                    _ => return Err(StorageError::InvalidResult("update flag")),
                }
                for relation in &mut self.relations {
                    relation.write(&mut record, depth)?;
                }
                Ok(StorageOutcome::Written(record))
            }
            PendingOp::Delete => {
                let mut record = self.entity.take().ok_or(StorageError::MissingEntity)?;
                for relation in &mut self.relations {
                    relation.delete(&mut record, depth)?;
                }
                match self.adapter.execute(&self.container, &self.shape, &spec)? {
                    ExecuteOutcome::Done(done) => Ok(StorageOutcome::Deleted(done)),
                    _ => Err(StorageError::InvalidResult("delete flag")),
                }
            }
            PendingOp::Tables => {
                let shape = Arc::new(RecordShape::new(["name"]));
                match self.adapter.execute(&self.container, &shape, &spec)? {
                    ExecuteOutcome::Records(collection) => Ok(StorageOutcome::Records(collection)),
                    _ => Err(StorageError::InvalidResult("collection")),
                }
            }
            PendingOp::Describe => {
                let shape = Arc::new(RecordShape::new([
                    "cid",
                    "name",
                    "type",
                    "notnull",
                    "dflt_value",
                    "pk",
                ]));
                match self.adapter.execute(&self.container, &shape, &spec)? {
                    ExecuteOutcome::Records(collection) => Ok(StorageOutcome::Records(collection)),
                    _ => Err(StorageError::InvalidResult("collection")),
                }
            }
        }
    }

    fn run_select(&mut self, spec: &QuerySpec) -> StorageResult<Collection> {
        match self.adapter.execute(&self.container, &self.shape, spec)? {
            ExecuteOutcome::Records(collection) => Ok(collection),
            _ => Err(StorageError::InvalidResult("collection")),
        }
    }

    fn assemble_spec(&self, op: PendingOp) -> QuerySpec {
        // Introspection rows are shaped by the source, not the field set.
        let selected: Vec<&FieldDescriptor> = if matches!(op, PendingOp::Tables | PendingOp::Describe)
        {
            Vec::new()
        } else if self.projection.is_empty() {
            self.fields.iter().collect()
        } else {
            self.projection
                .iter()
                .filter_map(|name| self.descriptor(name))
                .collect()
        };

        let fields = selected
            .into_iter()
            .map(|descriptor| FieldRef {
                field: descriptor.name.clone(),
                mapping: descriptor.mapping.clone(),
            })
            .collect();

        QuerySpec {
            operation: op.operation(),
            fields,
            values: self.values.clone(),
            conditions: self.conditions.clone(),
            order: self.order.clone(),
            limit: self.limit,
            offset: self.offset,
            key_field: self
                .key_field
                .as_ref()
                .map(|name| {
                    self.descriptor(name)
                        .map_or_else(|| name.clone(), |d| d.name.clone())
                }),
        }
    }

    /// Fills empty primary-index fields with the identifier assigned by the
    /// data source after an insert.
    fn assign_identity(&self, record: &mut Record, id: i64) {
        for descriptor in self.fields.iter().filter(|d| d.primary) {
            if record.get(&descriptor.name).is_empty() {
                record.set(descriptor.name.clone(), Value::Integer(id));
            }
        }
    }

    /// Clears operation-scoped state; with `relations` set, detaches all
    /// relations as well.
    pub fn reset(&mut self, relations: bool) -> &mut Self {
        self.reset_ops();
        if relations {
            self.relations.clear();
        }
        self
    }

    fn reset_ops(&mut self) {
        self.op = None;
        self.projection.clear();
        self.values.clear();
        self.conditions.clear();
        self.order.clear();
        self.limit = None;
        self.offset = None;
        self.key_field = None;
        self.entity = None;
    }
}
