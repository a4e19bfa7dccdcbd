//! Run-wide scratch store.
//!
//! Every context in a run publishes into one store keyed by hierarchical
//! paths (`/extracter/questions`). A lookup tries the exact key first and
//! otherwise descends into the longest published ancestor, so a value
//! published whole at `/extracter` is also reachable as
//! `/extracter/questions` or `/extracter/questions/0`.

use std::collections::HashMap;

/// Path-keyed values published during a single run.
#[derive(Debug, Default)]
pub struct ScratchStore {
  values: HashMap<String, serde_json::Value>,
}

impl ScratchStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Publish a value at `path`, replacing any previous value at that key.
  pub fn insert(&mut self, path: impl Into<String>, value: serde_json::Value) {
    self.values.insert(path.into(), value);
  }

  /// Resolve a path against the store.
  pub fn get(&self, path: &str) -> Option<&serde_json::Value> {
    if let Some(value) = self.values.get(path) {
      return Some(value);
    }

    let mut end = path.len();
    while let Some(pos) = path[..end].rfind('/') {
      if let Some(value) = self.values.get(&path[..pos]) {
        if let Some(found) = descend(value, &path[pos + 1..]) {
          return Some(found);
        }
      }
      end = pos;
    }

    None
  }

  /// Drop every key starting with `prefix`.
  pub fn remove_prefix(&mut self, prefix: &str) {
    self.values.retain(|key, _| !key.starts_with(prefix));
  }

  pub fn contains(&self, path: &str) -> bool {
    self.get(path).is_some()
  }

  /// Number of published keys.
  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }
}

fn descend<'a>(value: &'a serde_json::Value, rest: &str) -> Option<&'a serde_json::Value> {
  rest
    .split('/')
    .try_fold(value, |current, segment| match current {
      serde_json::Value::Object(map) => map.get(segment),
      serde_json::Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
      _ => None,
    })
}
