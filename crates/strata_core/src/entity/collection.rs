//! Ordered, optionally keyed record collection.
//!
//! # Responsibility
//! - Hold the hydrated result of a read operation in source order.
//! - Support key-field keyed insertion for keyed lookups and relation merges.
//!
//! # Invariants
//! - Entries are either all appended (sequential keys) or keyed by a
//!   configured key field's value; a keyed insert replaces an entry with the
//!   same key.

use super::record::Record;
use crate::value::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Collection {
    entries: Vec<(Option<String>, Record)>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends a record with a sequential key.
    pub fn push(&mut self, record: Record) {
        self.entries.push((None, record));
    }

    /// Inserts a record under an explicit key, replacing an existing entry
    /// with the same key.
    pub fn insert_keyed(&mut self, key: &Value, record: Record) {
        let key = key.group_key();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| k.as_deref() == Some(&key)) {
            entry.1 = record;
        } else {
            self.entries.push((Some(key), record));
        }
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.entries.get(index).map(|(_, record)| record)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Record> {
        self.entries.get_mut(index).map(|(_, record)| record)
    }

    pub fn get_by_key(&self, key: &Value) -> Option<&Record> {
        let key = key.group_key();
        self.entries
            .iter()
            .find(|(k, _)| k.as_deref() == Some(&key))
            .map(|(_, record)| record)
    }

    pub fn first(&self) -> Option<&Record> {
        self.get(0)
    }

    /// Removes and returns the first record.
    pub fn take_first(&mut self) -> Option<Record> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0).1)
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.entries.iter().map(|(_, record)| record)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Record> {
        self.entries.iter_mut().map(|(_, record)| record)
    }

    /// Sorts entries by key in reverse order, keeping key to record
    /// correlations.
    pub fn sort_keys_desc(&mut self) {
        let mut indexed: Vec<(usize, _)> = self.entries.drain(..).enumerate().collect();
        indexed.sort_by(|(ia, (ka, _)), (ib, (kb, _))| {
            let ka = ka.clone().unwrap_or_else(|| ia.to_string());
            let kb = kb.clone().unwrap_or_else(|| ib.to_string());
            kb.cmp(&ka)
        });
        self.entries = indexed.into_iter().map(|(_, entry)| entry).collect();
    }

    /// Serializes every record to a plain map, in collection order.
    pub fn retrieve(&self) -> Vec<BTreeMap<String, Value>> {
        self.iter().map(Record::retrieve).collect()
    }
}

impl IntoIterator for Collection {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries
            .into_iter()
            .map(|(_, record)| record)
            .collect::<Vec<_>>()
            .into_iter()
    }
}
