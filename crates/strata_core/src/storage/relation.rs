//! Relation resolution between two storages.
//!
//! # Responsibility
//! - Enrich read results with related records in one batched query per
//!   relation.
//! - Propagate writes and deletes from a record to its nested relation
//!   payload.
//!
//! # Invariants
//! - Reads place one batched condition per declared key pair; grouping onto
//!   parents uses the first pair only.
//! - A relation never mutates parent scalar properties, only nested slots.
//! - Every relation hop executes one level deeper than its parent, so cyclic
//!   relation graphs terminate at [`super::MAX_RELATION_DEPTH`].

use super::{Storage, StorageError, StorageResult};
use crate::entity::{Collection, Nested, Record};
use crate::value::Value;

/// Relation cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// At most one related record, attached as a single nested record.
    One,
    /// Any number of related records, attached as a nested collection.
    Many,
}

/// One configured relation: the related storage, joined key pairs and
/// optional constant constraints.
pub struct Relation {
    storage: Storage,
    kind: RelationKind,
    /// `(local field, foreign field)` pairs; the first pair drives batching.
    keys: Vec<(String, String)>,
    /// Constant field values stamped onto written related records and
    /// required when reading them, e.g. a type discriminator.
    local_values: Vec<(String, Value)>,
    /// Field keying nested collections attached by reads.
    key_field: Option<String>,
}

impl Relation {
    pub fn one(storage: Storage, keys: &[(&str, &str)]) -> Self {
        Self::new(RelationKind::One, storage, keys)
    }

    pub fn many(storage: Storage, keys: &[(&str, &str)]) -> Self {
        Self::new(RelationKind::Many, storage, keys)
    }

    fn new(kind: RelationKind, storage: Storage, keys: &[(&str, &str)]) -> Self {
        Self {
            storage,
            kind,
            keys: keys
                .iter()
                .map(|(local, foreign)| ((*local).to_string(), (*foreign).to_string()))
                .collect(),
            local_values: Vec::new(),
            key_field: None,
        }
    }

    /// Adds a constant constraint on the related container.
    pub fn local_value(mut self, field: impl Into<String>, value: Value) -> Self {
        self.local_values.push((field.into(), value));
        self
    }

    /// Keys nested collections attached by reads by this related field's
    /// value per record. The field must belong to the related storage's
    /// shape.
    pub fn key_field(mut self, field: impl Into<String>) -> StorageResult<Self> {
        let field = field.into();
        if !self.storage.shape().has(&field) {
            return Err(StorageError::UnknownField(field));
        }
        self.key_field = Some(field);
        Ok(self)
    }

    /// Relation identity: the related storage's container name, which is also
    /// the nested slot name on parent records.
    pub fn identify(&self) -> &str {
        self.storage.container()
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    /// Fetches related records for the whole collection in one query and
    /// attaches them to their parents. Every declared key pair contributes
    /// one batched condition; parents without a match keep the nested slot
    /// unset.
    pub fn read(&mut self, collection: &mut Collection, depth: usize) -> StorageResult<()> {
        let Some((first_local, first_foreign)) = self.keys.first().cloned() else {
            return Ok(());
        };

        let mut batches: Vec<(String, Vec<Value>)> = Vec::new();
        for (local, foreign) in &self.keys {
            let mut values: Vec<Value> = Vec::new();
            for record in collection.iter() {
                let value = record.get(local);
                if !value.is_empty() && !values.contains(&value) {
                    values.push(value);
                }
            }
            batches.push((foreign.clone(), values));
        }
        if batches.first().map_or(true, |(_, values)| values.is_empty()) {
            return Ok(());
        }

        self.storage.read();
        for (foreign, values) in batches {
            // A key pair no parent carries cannot constrain the batch.
            if values.is_empty() {
                continue;
            }
            self.storage.condition(&foreign, values)?;
        }
        for (field, value) in self.local_values.clone() {
            self.storage.condition(&field, value)?;
        }
        let related = self.storage.execute_depth(depth + 1)?.records()?;

        let container = self.storage.container().to_string();
        for record in collection.iter_mut() {
            let key = record.get(&first_local);
            if key.is_empty() {
                continue;
            }
            let key = key.group_key();
            match self.kind {
                RelationKind::One => {
                    if let Some(matched) = related
                        .iter()
                        .find(|candidate| candidate.get(&first_foreign).group_key() == key)
                    {
                        record.set_one(container.clone(), matched.clone());
                    }
                }
                RelationKind::Many => {
                    let mut bucket = Collection::new();
                    for candidate in related.iter() {
                        if candidate.get(&first_foreign).group_key() != key {
                            continue;
                        }
                        match &self.key_field {
                            Some(field) => {
                                bucket.insert_keyed(&candidate.get(field), candidate.clone());
                            }
                            None => bucket.push(candidate.clone()),
                        }
                    }
                    if !bucket.is_empty() {
                        record.set_many(container.clone(), bucket);
                    }
                }
            }
        }

        Ok(())
    }

    /// Writes the record's nested payload for this relation, removing
    /// previously related records that are no longer present.
    ///
    /// A record without a nested slot for this container is a no-op; an empty
    /// nested collection deletes all previously related records.
    pub fn write(&mut self, record: &mut Record, depth: usize) -> StorageResult<()> {
        let container = self.storage.container().to_string();
        let Some(nested) = record.take_nested(&container) else {
            return Ok(());
        };

        match (self.kind, nested) {
            (RelationKind::One, Nested::One(sub)) => {
                let existing = self.read_existing(record, depth)?;
                let mut sub = *sub;
                self.stamp(record, &mut sub);
                self.storage.reset(false);
                self.storage.write(sub)?;
                let written = self.storage.execute_depth(depth + 1)?.record()?;
                let kept = vec![self.storage.primary_values(&written)];
                self.delete_stale(existing, &kept, depth)?;
                record.set_one(container, written);
            }
            (RelationKind::Many, Nested::Many(subs)) => {
                let existing = self.read_existing(record, depth)?;
                let mut written_all = Collection::new();
                for mut sub in subs {
                    self.stamp(record, &mut sub);
                    self.storage.reset(false);
                    self.storage.write(sub)?;
                    written_all.push(self.storage.execute_depth(depth + 1)?.record()?);
                }
                let kept: Vec<Vec<Value>> = written_all
                    .iter()
                    .map(|new| self.storage.primary_values(new))
                    .collect();
                self.delete_stale(existing, &kept, depth)?;
                record.set_many(container, written_all);
            }
            // Cardinality mismatch: leave the payload untouched.
            (RelationKind::One, nested @ Nested::Many(_))
            | (RelationKind::Many, nested @ Nested::One(_)) => match nested {
                Nested::One(sub) => {
                    record.set_one(container, *sub);
                }
                Nested::Many(subs) => {
                    record.set_many(container, subs);
                }
            },
        }

        Ok(())
    }

    /// Deletes the record's nested payload for this relation. A record
    /// without a nested slot for this container is a no-op.
    pub fn delete(&mut self, record: &mut Record, depth: usize) -> StorageResult<()> {
        let container = self.storage.container().to_string();
        let Some(nested) = record.take_nested(&container) else {
            return Ok(());
        };

        match nested {
            Nested::One(sub) => self.delete_related(*sub, depth)?,
            Nested::Many(subs) => {
                for sub in subs {
                    self.delete_related(sub, depth)?;
                }
            }
        }

        Ok(())
    }

    /// Copies key values and constant constraints from the parent onto a
    /// related record before it is written.
    fn stamp(&self, parent: &Record, sub: &mut Record) {
        for (local, foreign) in &self.keys {
            sub.set(foreign.clone(), parent.get(local));
        }
        for (field, value) in &self.local_values {
            sub.set(field.clone(), value.clone());
        }
    }

    /// Reads the records currently related to `parent`, keyed on every
    /// non-empty key pair.
    fn read_existing(&mut self, parent: &Record, depth: usize) -> StorageResult<Collection> {
        let mut conditioned = false;
        self.storage.reset(false);
        self.storage.read();
        for (local, foreign) in self.keys.clone() {
            let value = parent.get(&local);
            if value.is_empty() {
                continue;
            }
            self.storage.condition(&foreign, value)?;
            conditioned = true;
        }
        if !conditioned {
            // Nothing to key on, e.g. a parent that was just assembled;
            // an unconstrained read would claim the whole container.
            self.storage.reset(false);
            return Ok(Collection::new());
        }
        for (field, value) in self.local_values.clone() {
            self.storage.condition(&field, value)?;
        }
        self.storage.execute_depth(depth + 1)?.records()
    }

    /// Deletes previously related records whose primary identity is not in
    /// the kept set. Diffing by identity rather than full record state keeps
    /// an updated record alive while still dropping removed ones.
    fn delete_stale(
        &mut self,
        existing: Collection,
        kept: &[Vec<Value>],
        depth: usize,
    ) -> StorageResult<()> {
        let stale: Vec<Record> = existing
            .into_iter()
            .filter(|old| !kept.contains(&self.storage.primary_values(old)))
            .collect();
        for old in stale {
            self.delete_related(old, depth)?;
        }
        Ok(())
    }

    fn delete_related(&mut self, sub: Record, depth: usize) -> StorageResult<()> {
        self.storage.reset(false);
        self.storage.delete(sub)?;
        self.storage.execute_depth(depth + 1)?.deleted()?;
        Ok(())
    }
}
