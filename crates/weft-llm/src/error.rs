//! Engine and context errors.

use weft_message::MessageError;

/// Errors that can occur while executing a run.
///
/// None of these are recoverable inside the engine; they abort the run and
/// are returned to whoever called [`LlmEngine::run`](crate::LlmEngine::run).
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
  /// The message has no queued task of the triggering type.
  #[error("message does not have a '{task_type}' task")]
  MissingTask { task_type: String },

  /// A popped task is not a `{task_type, task_dict}` object.
  #[error("invalid task: {message}")]
  InvalidTask { message: String },

  /// The requested input name is not part of the context's input map.
  #[error("could not find input '{input}' in the inputs of '{context}'")]
  UnresolvedInput { context: String, input: String },

  /// `get_input()` was called without a name on a context that does not
  /// have exactly one input.
  #[error("context '{context}' has {count} inputs, expected exactly one")]
  AmbiguousInput { context: String, count: usize },

  /// A resolved path has not been published.
  #[error("no value published at '{path}' (requested by '{context}')")]
  MissingValue { context: String, path: String },

  /// `outputs_complete` was called more than once.
  #[error("outputs of '{context}' were already completed")]
  DuplicateCompletion { context: String },

  /// An output was published after `outputs_complete`.
  #[error("outputs of '{context}' are sealed, cannot publish '{output}'")]
  OutputsSealed { context: String, output: String },

  /// A single field was published on outputs that are not an object.
  #[error("outputs of '{context}' are not an object, cannot set field '{output}'")]
  OutputsNotObject { context: String, output: String },

  /// A child with this name is still in scope.
  #[error("context '{context}' already has an active child named '{child}'")]
  DuplicateChild { context: String, child: String },

  /// The context was dropped before its outputs completed.
  #[error("context '{context}' was dropped before its outputs completed")]
  Cancelled { context: String },

  /// User input mappings could not be reconciled with declared input names.
  #[error("invalid input mapping: {message}")]
  InputMapping { message: String },

  /// No registered task handler claimed the outputs.
  #[error("no task handler was able to handle the '{task_type}' outputs")]
  UnhandledResult { task_type: String },

  /// A node failed.
  #[error("node '{node}' failed: {message}")]
  Node { node: String, message: String },

  /// A task handler failed.
  #[error("task handler failed: {message}")]
  Handler { message: String },

  /// The work unit rejected an operation.
  #[error(transparent)]
  Message(#[from] MessageError),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
}
