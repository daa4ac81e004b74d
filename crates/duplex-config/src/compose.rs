//! Configuration composition.
//!
//! Pipeline configurations are derived from one shared base plus one override
//! per pipeline. Composition walks the union of keys of both sides:
//!
//! - a key present on one side only is carried through unchanged
//! - two sequences concatenate, base items first (no deduplication)
//! - two mappings are composed recursively with the same rules
//! - anything else (scalars, type mismatches) is replaced by the override
//!
//! Inputs are borrowed and never mutated, so the same base can be composed
//! with any number of overrides without one leaking into the next.

use serde_json::{Map, Value};

/// Compose `base` with `update`, returning a new value.
///
/// # Example
///
/// ```
/// use duplex_config::compose;
/// use serde_json::json;
///
/// let base = json!({ "plugins": ["a"], "output": { "path": "build", "hash": false } });
/// let update = json!({ "plugins": ["b"], "output": { "hash": true } });
///
/// assert_eq!(
///     compose(&base, &update),
///     json!({ "plugins": ["a", "b"], "output": { "path": "build", "hash": true } })
/// );
/// ```
pub fn compose(base: &Value, update: &Value) -> Value {
    match (base, update) {
        (Value::Object(base_map), Value::Object(update_map)) => {
            Value::Object(compose_maps(base_map, update_map))
        }
        (Value::Array(base_items), Value::Array(update_items)) => Value::Array(
            base_items
                .iter()
                .chain(update_items.iter())
                .cloned()
                .collect(),
        ),
        (_, update) => update.clone(),
    }
}

/// Compose a base with a sequence of overrides, left to right.
pub fn compose_all<'a, I>(base: &Value, updates: I) -> Value
where
    I: IntoIterator<Item = &'a Value>,
{
    updates
        .into_iter()
        .fold(base.clone(), |acc, update| compose(&acc, update))
}

fn compose_maps(base: &Map<String, Value>, update: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, value) in update {
        let next = match base.get(key) {
            Some(existing) => compose(existing, value),
            None => value.clone(),
        };
        merged.insert(key.clone(), next);
    }
    merged
}
