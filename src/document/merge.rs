//! Deep merge of defaults under a sparse document.
//!
//! Objects merge key by key with the overlay winning. Arrays and scalars are
//! replaced entirely, not concatenated.

use super::{Document, document_from_value};
use serde_json::Value;

/// Deep merge two JSON values, with `overlay` taking precedence over `base`.
///
/// - Objects are merged recursively: keys in overlay override keys in base
/// - Arrays, strings, numbers, booleans are replaced entirely
/// - A `null` overlay is a value like any other and replaces the base
///
/// # Example
/// ```
/// use serde_json::json;
/// use settings_sync::document::deep_merge;
///
/// let defaults = json!({"foo": 1, "bar": {"derp": 2}});
/// let stored = json!({"bar": {"derp": 5}});
/// let merged = deep_merge(defaults, stored);
/// assert_eq!(merged, json!({"foo": 1, "bar": {"derp": 5}}));
/// ```
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged_value = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged_value);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Build the full merged view of a live document over its defaults.
pub fn merged_document(defaults: &Document, live: &Document) -> Document {
    let merged = deep_merge(
        Value::Object(defaults.clone()),
        Value::Object(live.clone()),
    );
    document_from_value(merged)
}
