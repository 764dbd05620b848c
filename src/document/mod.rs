//! Settings documents and dot-path access.
//!
//! A document is a JSON object: string keys mapping to scalars or nested
//! objects. Arrays are treated as scalars and never traversed by a path.
//!
//! ## Lookup rules
//! - A present value is returned as stored, including `null`, `0`, `false`
//!   and `""`. Only a missing key counts as absent.
//! - Walking through a scalar (e.g. `"a.b"` where `a` is a number) is absent,
//!   never an error.

mod merge;
mod path;

pub use merge::{deep_merge, merged_document};
pub use path::{Lookup, get_path, lookup, resolve_fallback, set_path};

use serde_json::{Map, Value};

/// A settings document.
pub type Document = Map<String, Value>;

/// Convert a JSON value into a document, treating non-objects as empty.
pub fn document_from_value(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}
