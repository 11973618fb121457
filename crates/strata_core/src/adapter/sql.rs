//! SQL statement compiler and the two SQLite-backed adapters.
//!
//! # Responsibility
//! - Compile a [`QuerySpec`] into one SQL statement through a per-source
//!   dialect, instead of duplicating query assembly per adapter.
//! - Execute statements and hydrate rows into records.
//!
//! # Invariants
//! - [`PreparedSqlAdapter`] and [`InlineSqlAdapter`] compile the same spec to
//!   semantically equivalent statements; they differ only in parameter
//!   binding (placeholders bound at execute time vs. inline-escaped
//!   literals).
//! - Absent clauses collapse: no conditions removes the whole `WHERE`
//!   fragment, not just its content.

use super::{Adapter, AdapterError, AdapterResult, ConnectionDescriptor, ExecuteOutcome};
use crate::entity::{Collection, Record, RecordShape};
use crate::query::{Comparison, Condition, ConditionValue, Logical, Operation, QuerySpec};
use crate::value::{prepare_typed, Value};
use log::debug;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;

/// Source-specific SQL rules consumed by the shared compiler.
pub trait SqlDialect {
    fn quote_ident(&self, ident: &str) -> String;
    fn comparison(&self, comparison: Comparison) -> &'static str;
    fn logical(&self, logical: Logical) -> &'static str;
    fn supports(&self, operation: Operation) -> bool;
}

/// SQLite dialect.
///
/// Write operations carry no `LIMIT` clause (not available in stock SQLite)
/// and `XOR` compiles to boolean inequality, which SQLite lacks as a keyword.
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn comparison(&self, comparison: Comparison) -> &'static str {
        match comparison {
            Comparison::Eq => "=",
            Comparison::Ne => "!=",
            Comparison::Lt => "<",
            Comparison::Gt => ">",
            Comparison::Le => "<=",
            Comparison::Ge => ">=",
        }
    }

    fn logical(&self, logical: Logical) -> &'static str {
        match logical {
            Logical::And => "AND",
            Logical::Or => "OR",
            Logical::Xor => "<>",
        }
    }

    fn supports(&self, _operation: Operation) -> bool {
        true
    }
}

/// How compiled values reach the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    /// `?` placeholders with values bound at execute time.
    Prepared,
    /// Escaped literals inlined into the statement text.
    Inline,
}

/// One compiled statement plus its bind values (empty in inline mode).
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub sql: String,
    pub binds: Vec<Value>,
}

/// Compiles a spec into one statement for the given dialect and bind mode.
pub fn compile(
    dialect: &dyn SqlDialect,
    container: &str,
    spec: &QuerySpec,
    mode: BindMode,
) -> AdapterResult<CompiledStatement> {
    if !dialect.supports(spec.operation) {
        return Err(AdapterError::Unsupported {
            adapter: "sql",
            operation: spec.operation,
        });
    }

    let mut binds = Vec::new();
    let sql = match spec.operation {
        Operation::Count => {
            let mut sql = format!("SELECT {} FROM {}", field_list(dialect, spec), dialect.quote_ident(container));
            append_where(dialect, spec, mode, &mut sql, &mut binds);
            sql
        }
        Operation::Select => {
            let mut sql = format!("SELECT {} FROM {}", field_list(dialect, spec), dialect.quote_ident(container));
            append_where(dialect, spec, mode, &mut sql, &mut binds);
            append_order(dialect, spec, &mut sql);
            append_limit(spec, &mut sql);
            sql
        }
        Operation::Tables => "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name".to_string(),
        Operation::Describe => format!("PRAGMA table_info({})", dialect.quote_ident(container)),
        Operation::Insert => {
            if spec.values.is_empty() {
                format!("INSERT INTO {} DEFAULT VALUES", dialect.quote_ident(container))
            } else {
                let columns: Vec<String> = spec
                    .values
                    .iter()
                    .map(|assignment| dialect.quote_ident(&assignment.field))
                    .collect();
                let rendered: Vec<String> = spec
                    .values
                    .iter()
                    .map(|assignment| {
                        render_value(
                            &prepare_typed(&assignment.value, assignment.value_type),
                            mode,
                            &mut binds,
                        )
                    })
                    .collect();
                format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    dialect.quote_ident(container),
                    columns.join(", "),
                    rendered.join(", ")
                )
            }
        }
        Operation::Update => {
            let assignments: Vec<String> = spec
                .values
                .iter()
                .map(|assignment| {
                    let rendered = render_value(
                        &prepare_typed(&assignment.value, assignment.value_type),
                        mode,
                        &mut binds,
                    );
                    format!("{} = {}", dialect.quote_ident(&assignment.field), rendered)
                })
                .collect();
            let mut sql = format!(
                "UPDATE {} SET {}",
                dialect.quote_ident(container),
                assignments.join(", ")
            );
            append_where(dialect, spec, mode, &mut sql, &mut binds);
            sql
        }
        Operation::Delete => {
            let mut sql = format!("DELETE FROM {}", dialect.quote_ident(container));
            append_where(dialect, spec, mode, &mut sql, &mut binds);
            sql
        }
    };

    Ok(CompiledStatement { sql, binds })
}

fn field_list(dialect: &dyn SqlDialect, spec: &QuerySpec) -> String {
    if spec.fields.is_empty() {
        return "*".to_string();
    }

    spec.fields
        .iter()
        .map(|field_ref| {
            let source = field_ref.source_name();
            if source == field_ref.field {
                dialect.quote_ident(source)
            } else {
                format!(
                    "{} as {}",
                    dialect.quote_ident(source),
                    dialect.quote_ident(&field_ref.field)
                )
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn append_where(
    dialect: &dyn SqlDialect,
    spec: &QuerySpec,
    mode: BindMode,
    sql: &mut String,
    binds: &mut Vec<Value>,
) {
    if let Some(clause) = conditions_clause(dialect, &spec.conditions, mode, binds) {
        sql.push_str(" WHERE ");
        sql.push_str(&clause);
    }
}

fn append_order(dialect: &dyn SqlDialect, spec: &QuerySpec, sql: &mut String) {
    if spec.order.is_empty() {
        return;
    }
    let order: Vec<String> = spec
        .order
        .iter()
        .map(|order_by| format!("{} {}", dialect.quote_ident(&order_by.field), order_by.direction.keyword()))
        .collect();
    sql.push_str(" ORDER BY ");
    sql.push_str(&order.join(", "));
}

fn append_limit(spec: &QuerySpec, sql: &mut String) {
    if let Some(limit) = spec.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
        if let Some(offset) = spec.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
    }
}

/// Joins condition fragments strictly in declaration order, each condition's
/// logical operator attaching it to what came before.
fn conditions_clause(
    dialect: &dyn SqlDialect,
    conditions: &[Condition],
    mode: BindMode,
    binds: &mut Vec<Value>,
) -> Option<String> {
    if conditions.is_empty() {
        return None;
    }

    let mut clause = String::new();
    for condition in conditions {
        let fragment = condition_fragment(dialect, condition, mode, binds);
        if clause.is_empty() {
            clause = fragment;
        } else {
            clause = format!("{clause} {} {fragment}", dialect.logical(condition.logical));
        }
    }
    Some(clause)
}

fn condition_fragment(
    dialect: &dyn SqlDialect,
    condition: &Condition,
    mode: BindMode,
    binds: &mut Vec<Value>,
) -> String {
    let field = dialect.quote_ident(&condition.field);
    let operator = dialect.comparison(condition.comparison);

    let single = |value: &Value, binds: &mut Vec<Value>| -> String {
        let prepared = prepare_typed(value, condition.value_type);
        if prepared == Value::Null {
            // SQL three-valued logic: only equality tests translate to the
            // IS forms; ordering against NULL stays a never-true predicate.
            match condition.comparison {
                Comparison::Eq => format!("{field} IS NULL"),
                Comparison::Ne => format!("{field} IS NOT NULL"),
                _ => format!("{field} {operator} NULL"),
            }
        } else {
            format!("{field} {operator} {}", render_value(&prepared, mode, binds))
        }
    };

    match &condition.value {
        ConditionValue::Single(value) => format!("({})", single(value, binds)),
        // An empty value set can match nothing.
        ConditionValue::AnyOf(values) if values.is_empty() => "(1 = 0)".to_string(),
        ConditionValue::AnyOf(values) => {
            let parts: Vec<String> = values.iter().map(|value| single(value, binds)).collect();
            format!("({})", parts.join(" OR "))
        }
    }
}

fn render_value(prepared: &Value, mode: BindMode, binds: &mut Vec<Value>) -> String {
    match mode {
        BindMode::Prepared => {
            if *prepared == Value::Null {
                "NULL".to_string()
            } else {
                binds.push(prepared.clone());
                "?".to_string()
            }
        }
        BindMode::Inline => inline_literal(prepared),
    }
}

fn inline_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(n) => n.to_string(),
        Value::Real(r) => r.to_string(),
        Value::Text(text) => format!("'{}'", text.replace('\'', "''")),
        Value::Bytes(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
            format!("X'{hex}'")
        }
    }
}

fn to_sql_value(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Integer(n) => rusqlite::types::Value::Integer(*n),
        Value::Real(r) => rusqlite::types::Value::Real(*r),
        Value::Text(text) => rusqlite::types::Value::Text(text.clone()),
        Value::Bytes(bytes) => rusqlite::types::Value::Blob(bytes.clone()),
    }
}

fn from_sql_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Integer(n),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Text(text) => Value::Text(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}

fn open_database(descriptor: &ConnectionDescriptor) -> AdapterResult<Connection> {
    if descriptor.driver != "sqlite" {
        return Err(AdapterError::Config(format!(
            "unsupported driver `{}`, expected `sqlite`",
            descriptor.driver
        )));
    }

    let conn = if descriptor.database == ":memory:" {
        Connection::open_in_memory()?
    } else {
        Connection::open(&descriptor.database)?
    };
    Ok(conn)
}

fn run_statement(
    conn: &Connection,
    container: &str,
    shape: &Arc<RecordShape>,
    spec: &QuerySpec,
    mode: BindMode,
) -> AdapterResult<ExecuteOutcome> {
    let compiled = compile(&SqliteDialect, container, spec, mode)?;
    debug!(
        "event=sql_execute module=adapter op={} container={} sql={}",
        spec.operation.name(),
        container,
        compiled.sql
    );

    let params: Vec<rusqlite::types::Value> = compiled.binds.iter().map(to_sql_value).collect();

    match spec.operation {
        Operation::Count => {
            let mut stmt = conn.prepare(&compiled.sql)?;
            let mut rows = stmt.query(rusqlite::params_from_iter(params))?;
            let mut count = 0u64;
            while rows.next()?.is_some() {
                count += 1;
            }
            Ok(ExecuteOutcome::Count(count))
        }
        Operation::Select | Operation::Tables | Operation::Describe => {
            let mut stmt = conn.prepare(&compiled.sql)?;
            let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
            let mut rows = stmt.query(rusqlite::params_from_iter(params))?;
            let mut collection = Collection::new();

            while let Some(row) = rows.next()? {
                let mut initial = Vec::with_capacity(columns.len());
                for (idx, column) in columns.iter().enumerate() {
                    let property = spec
                        .fields
                        .iter()
                        .find(|field_ref| field_ref.source_name() == column)
                        .map_or_else(|| column.clone(), |field_ref| field_ref.field.clone());
                    initial.push((property, from_sql_value(row.get_ref(idx)?)));
                }

                let record = shape.create(initial);
                insert_hydrated(&mut collection, spec, record);
            }

            Ok(ExecuteOutcome::Records(collection))
        }
        Operation::Insert => {
            conn.execute(&compiled.sql, rusqlite::params_from_iter(params))?;
            Ok(ExecuteOutcome::InsertedId(conn.last_insert_rowid()))
        }
        Operation::Update | Operation::Delete => {
            conn.execute(&compiled.sql, rusqlite::params_from_iter(params))?;
            Ok(ExecuteOutcome::Done(true))
        }
    }
}

fn insert_hydrated(collection: &mut Collection, spec: &QuerySpec, record: Record) {
    match spec.key_field.as_deref() {
        Some(key_field) => {
            let key = record.get(key_field);
            collection.insert_keyed(&key, record);
        }
        None => collection.push(record),
    }
}

/// Relational adapter binding values through placeholders at execute time.
pub struct PreparedSqlAdapter {
    conn: Connection,
    prefix: Option<String>,
}

impl PreparedSqlAdapter {
    /// Opens the database named by a connection-descriptor file.
    pub fn open(descriptor_path: impl AsRef<Path>) -> AdapterResult<Self> {
        let descriptor = ConnectionDescriptor::from_path(descriptor_path)?;
        Self::from_descriptor(&descriptor)
    }

    pub fn from_descriptor(descriptor: &ConnectionDescriptor) -> AdapterResult<Self> {
        Ok(Self {
            conn: open_database(descriptor)?,
            prefix: descriptor.prefix.clone(),
        })
    }

    /// Wraps an already-open connection; used by callers managing their own
    /// database lifecycle.
    pub fn from_connection(conn: Connection, prefix: Option<String>) -> Self {
        Self { conn, prefix }
    }
}

impl Adapter for PreparedSqlAdapter {
    fn execute(
        &mut self,
        container: &str,
        shape: &Arc<RecordShape>,
        spec: &QuerySpec,
    ) -> AdapterResult<ExecuteOutcome> {
        let container = resolve_prefix(container, self.prefix.as_deref());
        run_statement(&self.conn, &container, shape, spec, BindMode::Prepared)
    }
}

/// Relational adapter inlining escaped literals into statement text.
///
/// Externally indistinguishable from [`PreparedSqlAdapter`]; exists for
/// sources whose client offers no parameter binding.
pub struct InlineSqlAdapter {
    conn: Connection,
    prefix: Option<String>,
}

impl InlineSqlAdapter {
    pub fn open(descriptor_path: impl AsRef<Path>) -> AdapterResult<Self> {
        let descriptor = ConnectionDescriptor::from_path(descriptor_path)?;
        Self::from_descriptor(&descriptor)
    }

    pub fn from_descriptor(descriptor: &ConnectionDescriptor) -> AdapterResult<Self> {
        Ok(Self {
            conn: open_database(descriptor)?,
            prefix: descriptor.prefix.clone(),
        })
    }

    pub fn from_connection(conn: Connection, prefix: Option<String>) -> Self {
        Self { conn, prefix }
    }
}

impl Adapter for InlineSqlAdapter {
    fn execute(
        &mut self,
        container: &str,
        shape: &Arc<RecordShape>,
        spec: &QuerySpec,
    ) -> AdapterResult<ExecuteOutcome> {
        let container = resolve_prefix(container, self.prefix.as_deref());
        run_statement(&self.conn, &container, shape, spec, BindMode::Inline)
    }
}

fn resolve_prefix(container: &str, prefix: Option<&str>) -> String {
    let prefix = prefix.map(|p| format!("{p}_")).unwrap_or_default();
    container.replace("{prefix}", &prefix)
}
