//! Record shape and single-record property bag.
//!
//! # Responsibility
//! - `RecordShape` is the caller-supplied factory describing which properties
//!   a record carries; it replaces runtime class-name instantiation.
//! - `Record` is one mutable data row plus nested relation slots.
//!
//! # Invariants
//! - `retrieve()` always covers exactly the shape's properties, absent ones
//!   as `Value::Null`.
//! - Nested relation data lives beside scalar properties and never leaks into
//!   `retrieve()`.

use crate::value::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Fixed property set for one record type.
///
/// A storage is configured with a shape once and uses it to hydrate every
/// record it returns, so all rows from one container share a type.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordShape {
    properties: Vec<String>,
}

impl RecordShape {
    pub fn new<I, S>(properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            properties: properties.into_iter().map(Into::into).collect(),
        }
    }

    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    pub fn has(&self, property: &str) -> bool {
        self.properties.iter().any(|p| p == property)
    }

    /// Creates a record, accepting only known properties from `initial`.
    /// Unknown names are dropped silently, mirroring construction from raw
    /// source rows that may carry extra columns.
    pub fn create(self: &Arc<Self>, initial: impl IntoIterator<Item = (String, Value)>) -> Record {
        let mut record = Record {
            shape: Arc::clone(self),
            values: BTreeMap::new(),
            nested: BTreeMap::new(),
        };
        for (property, value) in initial {
            if record.shape.has(&property) {
                record.values.insert(property, value);
            }
        }
        record
    }
}

/// Nested relation payload attached to a record's container property.
#[derive(Debug, Clone, PartialEq)]
pub enum Nested {
    One(Box<Record>),
    Many(super::Collection),
}

/// One mutable data record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    shape: Arc<RecordShape>,
    values: BTreeMap<String, Value>,
    nested: BTreeMap<String, Nested>,
}

impl Record {
    pub fn shape(&self) -> &Arc<RecordShape> {
        &self.shape
    }

    /// Reads a property. Unknown or unset properties yield `Value::Null`.
    pub fn get(&self, property: &str) -> Value {
        self.values.get(property).cloned().unwrap_or(Value::Null)
    }

    /// Writes a property value. Properties outside the shape are stored and
    /// readable via [`Record::get`], but excluded from [`Record::retrieve`].
    pub fn set(&mut self, property: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(property.into(), value.into());
        self
    }

    /// Serializes the record to a plain property → value map covering the
    /// full shape.
    pub fn retrieve(&self) -> BTreeMap<String, Value> {
        self.shape
            .properties
            .iter()
            .map(|property| (property.clone(), self.get(property)))
            .collect()
    }

    pub fn nested(&self, container: &str) -> Option<&Nested> {
        self.nested.get(container)
    }

    pub fn has_nested(&self, container: &str) -> bool {
        self.nested.contains_key(container)
    }

    /// Attaches a single nested record, replacing any previous value.
    pub fn set_one(&mut self, container: impl Into<String>, record: Record) -> &mut Self {
        self.nested.insert(container.into(), Nested::One(Box::new(record)));
        self
    }

    /// Attaches a nested collection, replacing any previous value.
    pub fn set_many(&mut self, container: impl Into<String>, collection: super::Collection) -> &mut Self {
        self.nested.insert(container.into(), Nested::Many(collection));
        self
    }

    pub fn take_nested(&mut self, container: &str) -> Option<Nested> {
        self.nested.remove(container)
    }
}

#[cfg(test)]
mod tests {
    use super::{Record, RecordShape};
    use crate::value::Value;
    use std::sync::Arc;

    fn shape() -> Arc<RecordShape> {
        Arc::new(RecordShape::new(["id", "title"]))
    }

    #[test]
    fn unknown_property_reads_null() {
        let record = shape().create([]);
        assert_eq!(record.get("missing"), Value::Null);
        assert_eq!(record.get("title"), Value::Null);
    }

    #[test]
    fn construction_drops_unknown_initial_properties() {
        let record = shape().create([
            ("title".to_string(), Value::Text("a".into())),
            ("rogue".to_string(), Value::Integer(1)),
        ]);
        assert_eq!(record.get("title"), Value::Text("a".into()));
        assert_eq!(record.get("rogue"), Value::Null);
    }

    #[test]
    fn retrieve_covers_full_shape() {
        let mut record = shape().create([]);
        record.set("id", 7i64);
        let map = record.retrieve();
        assert_eq!(map.len(), 2);
        assert_eq!(map["id"], Value::Integer(7));
        assert_eq!(map["title"], Value::Null);
    }

    #[test]
    fn nested_slots_do_not_leak_into_retrieve() {
        let mut record = shape().create([]);
        let child: Record = shape().create([]);
        record.set_one("children", child);
        assert!(record.has_nested("children"));
        assert!(!record.retrieve().contains_key("children"));
    }
}
