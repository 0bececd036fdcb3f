//! Field-level merge for record updates
//!
//! The patch wins on every key it names. When both sides hold an object
//! under the same key the objects are merged recursively instead of the
//! patch replacing the whole subtree, so a patch of `{"compliance": {"score": 90}}`
//! keeps the other compliance fields. Any non-object patch value, including
//! null and arrays, replaces what was there.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;

/// Merge `patch` into `base` in place.
pub fn merge_value(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => merge_map(base, patch),
        (base, patch) => *base = patch,
    }
}

/// Merge a patch map into a base map in place.
pub fn merge_map(base: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        match base.get_mut(&key) {
            Some(existing) if existing.is_object() && value.is_object() => {
                merge_value(existing, value);
            }
            _ => {
                base.insert(key, value);
            }
        }
    }
}

/// Apply `patch` to a typed record and return the merged copy.
///
/// Keys listed in `protected` are dropped from the patch. If the merged JSON
/// no longer fits the record type the original is left untouched and a
/// validation error is returned.
pub fn merge_record<T>(
    record: &T,
    mut patch: Map<String, Value>,
    protected: &[&str],
) -> Result<T, StoreError>
where
    T: Serialize + DeserializeOwned,
{
    for key in protected {
        patch.remove(*key);
    }

    let mut merged = serde_json::to_value(record)?;
    merge_value(&mut merged, Value::Object(patch));

    serde_json::from_value(merged).map_err(|e| StoreError::validation(e.to_string()))
}
