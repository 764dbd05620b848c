//! Dot-delimited path traversal over documents.

use super::Document;
use serde_json::{Map, Value};

/// Outcome of walking a path through a document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<'a> {
    /// Every segment resolved.
    Found(&'a Value),
    /// The walk stopped at segment `failed_at` (zero-based).
    Missing { failed_at: usize },
}

impl<'a> Lookup<'a> {
    pub fn found(self) -> Option<&'a Value> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::Missing { .. } => None,
        }
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('.').collect()
}

fn walk<'a>(doc: &'a Document, segments: &[&str]) -> Lookup<'a> {
    let Some((first, rest)) = segments.split_first() else {
        return Lookup::Missing { failed_at: 0 };
    };
    let Some(mut current) = doc.get(*first) else {
        return Lookup::Missing { failed_at: 0 };
    };

    for (offset, segment) in rest.iter().enumerate() {
        let next = match current {
            Value::Object(map) => map.get(*segment),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return Lookup::Missing { failed_at: offset + 1 },
        }
    }
    Lookup::Found(current)
}

/// Walk `path` through `doc`, reporting where the walk stopped on a miss.
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Lookup<'a> {
    walk(doc, &segments(path))
}

/// Get the value at `path`, or `None` if any segment is missing.
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    lookup(doc, path).found()
}

/// Set `value` at `path`, creating intermediate objects as needed.
///
/// Whatever sits at an intermediate segment that is not an object is
/// replaced by an empty object. The final segment is overwritten without any
/// type check.
pub fn set_path(doc: &mut Document, path: &str, value: Value) {
    let parts = segments(path);
    let Some((last, parents)) = parts.split_last() else {
        return;
    };

    let mut current = doc;
    for segment in parents {
        let slot = current
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        current = match slot {
            Value::Object(map) => map,
            _ => unreachable!("slot was just made an object"),
        };
    }
    current.insert((*last).to_string(), value);
}

/// Resolve an inline fallback for a path that was not found.
///
/// A non-object fallback is the answer for the whole path. An object fallback
/// is walked with the full path first; if that misses, it is walked with the
/// segments that follow `failed_at`, the segment where the primary lookup
/// stopped. An empty remainder resolves to nothing.
pub fn resolve_fallback(path: &str, failed_at: usize, fallback: &Value) -> Option<Value> {
    let Value::Object(tree) = fallback else {
        return Some(fallback.clone());
    };

    let parts = segments(path);
    if let Lookup::Found(value) = walk(tree, &parts) {
        return Some(value.clone());
    }

    let remainder = parts.get(failed_at + 1..).unwrap_or_default();
    if remainder.is_empty() {
        return None;
    }
    walk(tree, remainder).found().cloned()
}
