//! Control message errors.

/// Errors that can occur while building or mutating a control message.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
  /// No queued task of the requested type.
  #[error("no tasks of type '{task_type}' found")]
  NoTask { task_type: String },

  /// The message is already committed to a different task kind.
  #[error("cannot add '{task_type}' task to a message committed to {committed:?} tasks")]
  ConflictingTaskKind {
    task_type: String,
    committed: crate::ControlMessageType,
  },

  /// Metadata key is not present.
  #[error("metadata key '{key}' not found")]
  MetadataNotFound { key: String },

  /// The message config could not be interpreted.
  #[error("invalid message config: {message}")]
  InvalidConfig { message: String },
}
