//! The control message work unit.

use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MessageError;

/// Opaque host object carried alongside the payload.
pub type Attachment = Arc<dyn Any + Send + Sync>;

/// The kind of work a message is committed to.
///
/// Only `inference` and `training` tasks commit a message; every other task
/// type leaves the kind untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMessageType {
  #[default]
  None,
  Inference,
  Training,
}

impl ControlMessageType {
  /// Map a task type name to the kind it commits a message to.
  pub fn from_task_type(task_type: &str) -> Self {
    match task_type {
      "inference" => Self::Inference,
      "training" => Self::Training,
      _ => Self::None,
    }
  }
}

#[derive(Default)]
struct MessageInner {
  kind: ControlMessageType,
  tasks: BTreeMap<String, VecDeque<serde_json::Value>>,
  metadata: serde_json::Map<String, serde_json::Value>,
  payload: serde_json::Value,
  attachment: Option<Attachment>,
}

/// A unit of work: task queues, metadata, payload, and an attachment.
pub struct ControlMessage {
  inner: Mutex<MessageInner>,
}

impl ControlMessage {
  /// Create an empty message.
  pub fn new() -> Self {
    Self {
      inner: Mutex::new(MessageInner {
        payload: serde_json::Value::Object(serde_json::Map::new()),
        ..MessageInner::default()
      }),
    }
  }

  /// Create a message from a JSON config (`type`, `tasks`, `metadata`).
  pub fn from_config(config: &serde_json::Value) -> Result<Self, MessageError> {
    let message = Self::new();
    message.config(config)?;
    Ok(message)
  }

  /// Apply a JSON config on top of the current state.
  pub fn config(&self, config: &serde_json::Value) -> Result<(), MessageError> {
    let config = config
      .as_object()
      .ok_or_else(|| MessageError::InvalidConfig {
        message: "config must be a JSON object".to_string(),
      })?;

    if let Some(kind) = config.get("type") {
      let kind = kind.as_str().ok_or_else(|| MessageError::InvalidConfig {
        message: "'type' must be a string".to_string(),
      })?;
      let mut inner = self.lock();
      if inner.kind == ControlMessageType::None {
        inner.kind = ControlMessageType::from_task_type(kind);
      }
    }

    if let Some(tasks) = config.get("tasks") {
      let tasks = tasks.as_array().ok_or_else(|| MessageError::InvalidConfig {
        message: "'tasks' must be an array".to_string(),
      })?;
      for task in tasks {
        let task_type = task
          .get("type")
          .and_then(|t| t.as_str())
          .ok_or_else(|| MessageError::InvalidConfig {
            message: format!("task is missing a string 'type': {}", task),
          })?;
        let properties = task
          .get("properties")
          .ok_or_else(|| MessageError::InvalidConfig {
            message: format!("task '{}' is missing 'properties'", task_type),
          })?;
        self.add_task(task_type, properties.clone())?;
      }
    }

    if let Some(metadata) = config.get("metadata") {
      let metadata = metadata
        .as_object()
        .ok_or_else(|| MessageError::InvalidConfig {
          message: "'metadata' must be an object".to_string(),
        })?;
      for (key, value) in metadata {
        self.set_metadata(key, value.clone());
      }
    }

    Ok(())
  }

  /// Render the message back into its config form.
  pub fn to_config(&self) -> serde_json::Value {
    let inner = self.lock();
    let tasks: Vec<serde_json::Value> = inner
      .tasks
      .iter()
      .flat_map(|(task_type, queue)| {
        queue.iter().map(move |properties| {
          serde_json::json!({ "type": task_type, "properties": properties })
        })
      })
      .collect();

    serde_json::json!({
      "type": inner.kind,
      "tasks": tasks,
      "metadata": inner.metadata,
    })
  }

  /// Queue a task of the given type.
  pub fn add_task(&self, task_type: &str, task: serde_json::Value) -> Result<(), MessageError> {
    debug!(task_type = %task_type, task = %task, "adding task to control message");

    let mut inner = self.lock();
    let kind = ControlMessageType::from_task_type(task_type);

    if inner.kind == ControlMessageType::None {
      inner.kind = kind;
    }

    if kind != ControlMessageType::None && inner.kind != kind {
      return Err(MessageError::ConflictingTaskKind {
        task_type: task_type.to_string(),
        committed: inner.kind,
      });
    }

    inner
      .tasks
      .entry(task_type.to_string())
      .or_default()
      .push_back(task);
    Ok(())
  }

  /// Whether at least one task of this type is queued.
  pub fn has_task(&self, task_type: &str) -> bool {
    self
      .lock()
      .tasks
      .get(task_type)
      .is_some_and(|queue| !queue.is_empty())
  }

  /// Remove and return the earliest queued task of this type.
  pub fn remove_task(&self, task_type: &str) -> Result<serde_json::Value, MessageError> {
    self
      .lock()
      .tasks
      .get_mut(task_type)
      .and_then(|queue| queue.pop_front())
      .ok_or_else(|| MessageError::NoTask {
        task_type: task_type.to_string(),
      })
  }

  /// All queued tasks as a JSON object of arrays, keyed by task type.
  pub fn get_tasks(&self) -> serde_json::Value {
    let inner = self.lock();
    serde_json::Value::Object(
      inner
        .tasks
        .iter()
        .map(|(task_type, queue)| {
          (
            task_type.clone(),
            serde_json::Value::Array(queue.iter().cloned().collect()),
          )
        })
        .collect(),
    )
  }

  /// Set a metadata value, overwriting any existing one.
  pub fn set_metadata(&self, key: &str, value: serde_json::Value) {
    let mut inner = self.lock();
    if inner.metadata.contains_key(key) {
      debug!(key = %key, value = %value, "overwriting metadata key");
    }
    inner.metadata.insert(key.to_string(), value);
  }

  pub fn has_metadata(&self, key: &str) -> bool {
    self.lock().metadata.contains_key(key)
  }

  /// Get a single metadata value.
  pub fn get_metadata(&self, key: &str) -> Result<serde_json::Value, MessageError> {
    self
      .lock()
      .metadata
      .get(key)
      .cloned()
      .ok_or_else(|| MessageError::MetadataNotFound {
        key: key.to_string(),
      })
  }

  /// The whole metadata map as a JSON object.
  pub fn all_metadata(&self) -> serde_json::Value {
    serde_json::Value::Object(self.lock().metadata.clone())
  }

  /// Metadata keys.
  pub fn list_metadata(&self) -> Vec<String> {
    self.lock().metadata.keys().cloned().collect()
  }

  /// The message payload.
  pub fn payload(&self) -> serde_json::Value {
    self.lock().payload.clone()
  }

  pub fn set_payload(&self, payload: serde_json::Value) {
    self.lock().payload = payload;
  }

  /// Mutate the payload in place.
  pub fn update_payload<R>(&self, f: impl FnOnce(&mut serde_json::Value) -> R) -> R {
    f(&mut self.lock().payload)
  }

  pub fn attach_object(&self, object: Attachment) {
    self.lock().attachment = Some(object);
  }

  pub fn get_object(&self) -> Option<Attachment> {
    self.lock().attachment.clone()
  }

  pub fn task_type(&self) -> ControlMessageType {
    self.lock().kind
  }

  pub fn set_task_type(&self, kind: ControlMessageType) {
    self.lock().kind = kind;
  }

  /// Copy tasks, metadata, and kind into a fresh message.
  ///
  /// The payload and attachment are not carried over.
  pub fn duplicate(&self) -> Self {
    let inner = self.lock();
    Self {
      inner: Mutex::new(MessageInner {
        kind: inner.kind,
        tasks: inner.tasks.clone(),
        metadata: inner.metadata.clone(),
        payload: serde_json::Value::Object(serde_json::Map::new()),
        attachment: None,
      }),
    }
  }

  fn lock(&self) -> MutexGuard<'_, MessageInner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl Default for ControlMessage {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for ControlMessage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let inner = self.lock();
    f.debug_struct("ControlMessage")
      .field("kind", &inner.kind)
      .field("tasks", &inner.tasks)
      .field("metadata", &inner.metadata)
      .field("has_attachment", &inner.attachment.is_some())
      .finish()
  }
}
