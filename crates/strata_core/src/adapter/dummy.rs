//! Deterministic test-double adapter.
//!
//! # Responsibility
//! - Synthesize plausible results without touching any real storage, for
//!   offline development and contract tests.
//!
//! # Invariants
//! - Output is a pure function of the query arguments, except for the two
//!   explicitly randomized cases: a count without a limit and an insert
//!   identifier.
//! - `count` with a limit returns exactly `limit * 2`.

use super::{Adapter, AdapterResult, ExecuteOutcome};
use crate::entity::{Collection, RecordShape};
use crate::query::{Operation, QuerySpec};
use crate::value::Value;
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub struct DummyAdapter {
    rng: ChaCha8Rng,
}

impl DummyAdapter {
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.subsec_nanos() as u64);
        Self::with_seed(seed)
    }

    /// Fixed-seed constructor for tests that pin the randomized outputs.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    fn random_1_to_100(&mut self) -> i64 {
        i64::from(1 + self.rng.next_u32() % 100)
    }

    fn stub_records(&self, shape: &Arc<RecordShape>, spec: &QuerySpec) -> Collection {
        let properties: Vec<String> = if spec.fields.is_empty() {
            shape.properties().to_vec()
        } else {
            spec.fields.iter().map(|f| f.field.clone()).collect()
        };

        let rows = spec.limit.unwrap_or(3);
        let mut collection = Collection::new();

        for row in 0..rows {
            let initial = properties
                .iter()
                .map(|property| (property.clone(), stub_value(property, row as i64 + 1)));
            let record = shape.create(initial);
            match spec.key_field.as_deref() {
                Some(key_field) => {
                    let key = record.get(key_field);
                    collection.insert_keyed(&key, record);
                }
                None => collection.push(record),
            }
        }

        collection
    }
}

impl Default for DummyAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for DummyAdapter {
    fn execute(
        &mut self,
        _container: &str,
        shape: &Arc<RecordShape>,
        spec: &QuerySpec,
    ) -> AdapterResult<ExecuteOutcome> {
        Ok(match spec.operation {
            Operation::Count => ExecuteOutcome::Count(match spec.limit {
                Some(limit) => limit * 2,
                None => self.random_1_to_100() as u64,
            }),
            Operation::Select | Operation::Tables | Operation::Describe => {
                ExecuteOutcome::Records(self.stub_records(shape, spec))
            }
            Operation::Insert => ExecuteOutcome::InsertedId(self.random_1_to_100()),
            Operation::Update | Operation::Delete => ExecuteOutcome::Done(true),
        })
    }
}

fn stub_value(property: &str, row: i64) -> Value {
    if property == "id" || property.contains("_id") {
        Value::Integer(row)
    } else if property == "cover" || property == "file" {
        Value::Null
    } else if property == "language" {
        Value::Text("pl".to_string())
    } else {
        Value::Text(property.to_string())
    }
}
