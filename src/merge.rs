//! Compose-style merging of configuration documents.
//!
//! Later documents win on scalars, lists concatenate, and maps merge down
//! to a bounded depth. The `x-network` and `mininet-cfg` subtrees always
//! merge one level deep regardless of where they appear.

use serde_yaml::{Mapping, Value};

use crate::error::ConfigError;

/// Depth used when folding compose files.
pub const COMPOSE_MERGE_DEPTH: usize = 3;
/// Depth used when folding network documents.
pub const NETWORK_MERGE_DEPTH: usize = 1;

/// Subtrees that are always merged with depth reset to 1.
const SHALLOW_KEYS: [&str; 2] = ["x-network", "mininet-cfg"];

fn is_shallow_key(key: &Value) -> bool {
    key.as_str().is_some_and(|k| SHALLOW_KEYS.contains(&k))
}

/// Merge `b` into `a`, returning the combined map.
pub fn merge(mut a: Mapping, b: Mapping, depth: usize) -> Mapping {
    for (key, b_val) in b {
        let Some(slot) = a.get_mut(&key) else {
            a.insert(key, b_val);
            continue;
        };
        let a_val = std::mem::replace(slot, Value::Null);
        *slot = combine(is_shallow_key(&key), a_val, b_val, depth);
    }
    a
}

fn combine(shallow: bool, a_val: Value, b_val: Value, depth: usize) -> Value {
    match (a_val, b_val) {
        (Value::Mapping(a_map), Value::Mapping(b_map)) if shallow => {
            Value::Mapping(merge(a_map, b_map, 1))
        }
        (Value::Sequence(mut a_seq), Value::Sequence(b_seq)) => {
            a_seq.extend(b_seq);
            Value::Sequence(a_seq)
        }
        (Value::Mapping(a_map), Value::Mapping(b_map)) if depth > 0 => {
            Value::Mapping(merge(a_map, b_map, depth - 1))
        }
        (_, b_val) => b_val,
    }
}

/// Fold documents left to right with [`merge`].
///
/// Empty documents count as empty maps; anything else that is not a map is
/// rejected with the index of the offending document.
pub fn merge_documents<I>(docs: I, depth: usize) -> Result<Mapping, ConfigError>
where
    I: IntoIterator<Item = Value>,
{
    docs.into_iter()
        .enumerate()
        .try_fold(Mapping::new(), |acc, (idx, doc)| match doc {
            Value::Mapping(map) => Ok(merge(acc, map, depth)),
            Value::Null => Ok(acc),
            other => Err(ConfigError::Syntax {
                path: format!("document {idx}"),
                message: format!("expected a mapping, found {}", value_kind(&other)),
            }),
        })
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
