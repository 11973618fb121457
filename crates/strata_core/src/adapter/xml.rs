//! Read-only XML data source adapter.
//!
//! # Responsibility
//! - Fetch the full node set for a container path and filter it in memory.
//! - Compile the condition list into one per-record predicate.
//!
//! # Invariants
//! - Logical joining is strictly left-to-right in declaration order; there is
//!   no operator precedence beyond that.
//! - Offset/limit apply while iterating matches, after predicate filtering.
//! - Write operations fail fast as unsupported.

use super::{Adapter, AdapterError, AdapterResult, ExecuteOutcome};
use crate::entity::{Collection, RecordShape};
use crate::query::{Comparison, Condition, ConditionValue, Logical, Operation, QuerySpec};
use crate::value::{prepare_typed, Value};
use log::debug;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Adapter reading records from an XML data file.
///
/// The container name maps to a nested element path, `_` separating levels:
/// container `catalog_item` selects `<item>` children of `<catalog>` under
/// the document element.
pub struct XmlAdapter {
    path: PathBuf,
}

impl XmlAdapter {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn read_nodes(&self, container: &str) -> AdapterResult<Vec<BTreeMap<String, String>>> {
        let text = std::fs::read_to_string(&self.path).map_err(|err| {
            AdapterError::Config(format!(
                "cannot read XML source `{}`: {err}",
                self.path.display()
            ))
        })?;
        let doc = roxmltree::Document::parse(&text)
            .map_err(|err| AdapterError::InvalidData(format!("malformed XML source: {err}")))?;

        let mut nodes = vec![doc.root_element()];
        for segment in container.split('_') {
            nodes = nodes
                .iter()
                .flat_map(|node| {
                    node.children()
                        .filter(|child| child.is_element() && child.tag_name().name() == segment)
                })
                .collect();
        }

        Ok(nodes
            .into_iter()
            .map(|node| {
                node.children()
                    .filter(|child| child.is_element())
                    .map(|child| {
                        (
                            child.tag_name().name().to_string(),
                            child.text().unwrap_or_default().trim().to_string(),
                        )
                    })
                    .collect()
            })
            .collect())
    }

    fn matching_records<'a>(
        &self,
        records: &'a [BTreeMap<String, String>],
        spec: &QuerySpec,
    ) -> Vec<&'a BTreeMap<String, String>> {
        let matches = records
            .iter()
            .filter(|record| evaluate_conditions(&spec.conditions, record));

        let offset = spec.offset.unwrap_or(0) as usize;
        let limit = spec.limit.map_or(usize::MAX, |l| l as usize);
        matches.skip(offset).take(limit).collect()
    }
}

impl Adapter for XmlAdapter {
    fn execute(
        &mut self,
        container: &str,
        shape: &Arc<RecordShape>,
        spec: &QuerySpec,
    ) -> AdapterResult<ExecuteOutcome> {
        match spec.operation {
            Operation::Count | Operation::Select => {}
            operation => {
                return Err(AdapterError::Unsupported {
                    adapter: "xml",
                    operation,
                })
            }
        }

        let records = self.read_nodes(container)?;
        debug!(
            "event=xml_execute module=adapter op={} container={} nodes={}",
            spec.operation.name(),
            container,
            records.len()
        );
        let matched = self.matching_records(&records, spec);

        if spec.operation == Operation::Count {
            return Ok(ExecuteOutcome::Count(matched.len() as u64));
        }

        let mut collection = Collection::new();
        for node in matched {
            let initial: Vec<(String, Value)> = if spec.fields.is_empty() {
                node.iter()
                    .map(|(name, text)| (name.clone(), Value::Text(text.clone())))
                    .collect()
            } else {
                spec.fields
                    .iter()
                    .filter_map(|field_ref| {
                        node.get(field_ref.source_name()).map(|text| {
                            (field_ref.field.clone(), Value::Text(text.clone()))
                        })
                    })
                    .collect()
            };

            let record = shape.create(initial);
            match spec.key_field.as_deref() {
                Some(key_field) => {
                    let key = record.get(key_field);
                    collection.insert_keyed(&key, record);
                }
                None => collection.push(record),
            }
        }

        Ok(ExecuteOutcome::Records(collection))
    }
}

/// Folds the condition list into one boolean, strictly left-to-right.
fn evaluate_conditions(conditions: &[Condition], record: &BTreeMap<String, String>) -> bool {
    let mut iter = conditions.iter();
    let Some(first) = iter.next() else {
        return true;
    };

    let mut outcome = evaluate_condition(first, record);
    for condition in iter {
        let current = evaluate_condition(condition, record);
        outcome = match condition.logical {
            Logical::And => outcome && current,
            Logical::Or => outcome || current,
            Logical::Xor => outcome ^ current,
        };
    }
    outcome
}

fn evaluate_condition(condition: &Condition, record: &BTreeMap<String, String>) -> bool {
    let raw = record
        .get(&condition.field)
        .map_or(Value::Null, |text| Value::Text(text.clone()));
    let left = prepare_typed(&raw, condition.value_type);

    let check = |expected: &Value| {
        let right = prepare_typed(expected, condition.value_type);
        compare_values(&left, &right, condition.comparison)
    };

    match &condition.value {
        ConditionValue::Single(value) => check(value),
        // An array value means "OR across these values for this field".
        ConditionValue::AnyOf(values) => values.iter().any(check),
    }
}

fn compare_values(left: &Value, right: &Value, comparison: Comparison) -> bool {
    let ordering = match (left, right) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) | (_, Value::Null) => None,
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => Some(left.group_key().cmp(&right.group_key())),
        },
    };

    match comparison {
        Comparison::Eq => ordering == Some(Ordering::Equal),
        Comparison::Ne => match ordering {
            Some(ordering) => ordering != Ordering::Equal,
            // Exactly one side absent: values differ.
            None => true,
        },
        Comparison::Lt => ordering == Some(Ordering::Less),
        Comparison::Gt => ordering == Some(Ordering::Greater),
        Comparison::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        Comparison::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
    }
}
