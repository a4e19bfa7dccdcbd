//! Task descriptor for a single run.

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// The `(task_type, task_dict)` pair that a root context is built from.
///
/// Created once per task popped from a message and never mutated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmTask {
  pub task_type: String,
  pub task_dict: serde_json::Map<String, serde_json::Value>,
}

impl LlmTask {
  pub fn new(
    task_type: impl Into<String>,
    task_dict: serde_json::Map<String, serde_json::Value>,
  ) -> Self {
    Self {
      task_type: task_type.into(),
      task_dict,
    }
  }

  /// Build a task from a value removed from a message's task queue.
  pub fn from_value(task: serde_json::Value) -> Result<Self, LlmError> {
    let task_type = task
      .get("task_type")
      .and_then(|t| t.as_str())
      .ok_or_else(|| LlmError::InvalidTask {
        message: format!("missing string 'task_type' in {}", task),
      })?
      .to_string();

    let task_dict = match task.get("task_dict") {
      Some(serde_json::Value::Object(dict)) => dict.clone(),
      Some(other) => {
        return Err(LlmError::InvalidTask {
          message: format!("'task_dict' must be an object, got {}", other),
        });
      }
      None => {
        return Err(LlmError::InvalidTask {
          message: format!("missing 'task_dict' in {}", task),
        });
      }
    };

    Ok(Self {
      task_type,
      task_dict,
    })
  }

  /// Look up a single task parameter.
  pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
    self.task_dict.get(key)
  }
}
