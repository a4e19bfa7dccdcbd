//! Hierarchical execution context.
//!
//! A run builds one root [`LlmContext`] per task. Nodes push a child context
//! for every node they delegate to and pop it when that node returns, so the
//! context tree mirrors the call tree:
//!
//! ```text
//! ""                      root, built by the engine
//! ├── /extracter          push("extracter", ...)
//! ├── /prompts            push("prompts", [("/extracter/questions", "questions")])
//! └── /TaskHandler        pushed by each task handler runner
//! ```
//!
//! All contexts of a run share one [`LlmContextState`]: the task, the message,
//! and a [`ScratchStore`]. Publishing an output mirrors it into the store under
//! the context's `full_name`, which is how siblings read each other's results
//! without holding references to one another.
//!
//! Each context also carries a single-assignment completion signal.
//! `outputs_complete` fires it once; any number of waiters observe the same
//! value through `view_outputs` or a detached [`OutputsHandle`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, warn};
use weft_message::ControlMessage;

use crate::error::LlmError;
use crate::input_map::{InputMap, InputMappings};
use crate::scratch::ScratchStore;
use crate::task::LlmTask;

/// State shared by every context of one run.
#[derive(Debug)]
pub struct LlmContextState {
  pub task: LlmTask,
  pub message: Arc<ControlMessage>,
  values: Mutex<ScratchStore>,
}

impl LlmContextState {
  fn new(task: LlmTask, message: Arc<ControlMessage>) -> Self {
    Self {
      task,
      message,
      values: Mutex::new(ScratchStore::new()),
    }
  }

  /// Lock the run's scratch store.
  pub fn values(&self) -> MutexGuard<'_, ScratchStore> {
    self.values.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

#[derive(Debug)]
struct ContextInner {
  outputs: serde_json::Value,
  // Empty means every published field.
  output_names: Vec<String>,
  active_children: HashSet<String>,
  completed: bool,
}

impl ContextInner {
  fn view(&self) -> serde_json::Value {
    match &self.outputs {
      serde_json::Value::Object(outputs) if !self.output_names.is_empty() => {
        let projected = self
          .output_names
          .iter()
          .filter_map(|name| outputs.get(name).map(|v| (name.clone(), v.clone())))
          .collect();
        serde_json::Value::Object(projected)
      }
      other => other.clone(),
    }
  }
}

/// One scope in the execution hierarchy.
#[derive(Debug)]
pub struct LlmContext {
  parent: Option<Arc<LlmContext>>,
  name: String,
  full_name: String,
  inputs: InputMappings,
  state: Arc<LlmContextState>,
  inner: Mutex<ContextInner>,
  outputs_tx: watch::Sender<Option<serde_json::Value>>,
}

impl LlmContext {
  /// Create the root context of a run.
  ///
  /// The root is unnamed, so every descendant path starts with `/`.
  pub fn new(task: LlmTask, message: Arc<ControlMessage>) -> Arc<Self> {
    Arc::new(Self::build(
      None,
      String::new(),
      Vec::new(),
      Arc::new(LlmContextState::new(task, message)),
    ))
  }

  fn build(
    parent: Option<Arc<LlmContext>>,
    name: String,
    inputs: InputMappings,
    state: Arc<LlmContextState>,
  ) -> Self {
    let full_name = match &parent {
      Some(parent) => format!("{}/{}", parent.full_name, name),
      None => name.clone(),
    };
    let (outputs_tx, _) = watch::channel(None);

    Self {
      parent,
      name,
      full_name,
      inputs,
      state,
      inner: Mutex::new(ContextInner {
        outputs: serde_json::Value::Object(serde_json::Map::new()),
        output_names: Vec::new(),
        active_children: HashSet::new(),
        completed: false,
      }),
      outputs_tx,
    }
  }

  /// Create a child scope.
  ///
  /// The child must be popped before another child with the same name is
  /// pushed onto this context.
  pub fn push(self: &Arc<Self>, name: &str, inputs: InputMappings) -> Result<Arc<Self>, LlmError> {
    {
      let mut inner = self.lock();
      if !inner.active_children.insert(name.to_string()) {
        return Err(LlmError::DuplicateChild {
          context: self.full_name.clone(),
          child: name.to_string(),
        });
      }
    }

    let child = Self::build(Some(self.clone()), name.to_string(), inputs, self.state.clone());
    debug!(context = %child.full_name, "pushed context");
    Ok(Arc::new(child))
  }

  /// Leave this scope.
  ///
  /// Outputs are not copied anywhere; they already live in the scratch store
  /// under this context's `full_name`.
  ///
  /// Popping the root, or popping a child that is no longer in scope, is not
  /// an error: it logs a warning and leaves the tree unchanged.
  pub fn pop(&self) {
    let Some(parent) = &self.parent else {
      warn!(context = %self.full_name, "pop called on the root context");
      return;
    };

    if !parent.lock().active_children.remove(&self.name) {
      warn!(context = %self.full_name, "pop called on a context that is not in scope");
      return;
    }
    debug!(context = %self.full_name, "popped context");
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Path of this context: `parent.full_name + "/" + name`, or `name` at the root.
  pub fn full_name(&self) -> &str {
    &self.full_name
  }

  pub fn parent(&self) -> Option<&Arc<LlmContext>> {
    self.parent.as_ref()
  }

  pub fn input_map(&self) -> &[InputMap] {
    &self.inputs
  }

  pub fn task(&self) -> &LlmTask {
    &self.state.task
  }

  pub fn message(&self) -> &Arc<ControlMessage> {
    &self.state.message
  }

  pub fn state(&self) -> &Arc<LlmContextState> {
    &self.state
  }

  /// Resolve the single wired input.
  pub fn get_input(&self) -> Result<serde_json::Value, LlmError> {
    match self.inputs.as_slice() {
      [only] => self.get_input_named(&only.internal_name),
      inputs => Err(LlmError::AmbiguousInput {
        context: self.full_name.clone(),
        count: inputs.len(),
      }),
    }
  }

  /// Resolve one wired input by its local name.
  ///
  /// A name starting with `/` is read straight from the scratch store.
  pub fn get_input_named(&self, name: &str) -> Result<serde_json::Value, LlmError> {
    if name.starts_with('/') {
      return self.lookup(name);
    }

    let mapping = self
      .inputs
      .iter()
      .find(|m| m.internal_name == name)
      .ok_or_else(|| LlmError::UnresolvedInput {
        context: self.full_name.clone(),
        input: name.to_string(),
      })?;

    if mapping.is_parent() {
      return match &self.parent {
        Some(parent) => parent.get_input_named(name),
        None => Err(LlmError::UnresolvedInput {
          context: self.full_name.clone(),
          input: name.to_string(),
        }),
      };
    }

    let path = self.source_path(&mapping.external_name);
    self.lookup(&path)
  }

  /// Resolve every wired input into one object keyed by local name.
  pub fn get_inputs(&self) -> Result<serde_json::Value, LlmError> {
    let mut resolved = serde_json::Map::with_capacity(self.inputs.len());
    for mapping in &self.inputs {
      let value = self.get_input_named(&mapping.internal_name)?;
      resolved.insert(mapping.internal_name.clone(), value);
    }
    Ok(serde_json::Value::Object(resolved))
  }

  /// Replace all local outputs.
  ///
  /// Store keys below `full_name` from earlier publications are dropped, so
  /// reads under this path only see the new value.
  pub fn set_output(&self, outputs: serde_json::Value) -> Result<(), LlmError> {
    let mut inner = self.lock();
    self.ensure_open(&inner, "*")?;

    let mut values = self.state.values();
    values.remove_prefix(&format!("{}/", self.full_name));
    values.insert(self.full_name.clone(), outputs.clone());
    inner.outputs = outputs;

    debug!(context = %self.full_name, "published outputs");
    Ok(())
  }

  /// Set a single output field.
  ///
  /// Fails if the current outputs are not an object. Store keys below the
  /// field's path are dropped before it is published.
  pub fn set_output_named(&self, name: &str, output: serde_json::Value) -> Result<(), LlmError> {
    let mut inner = self.lock();
    self.ensure_open(&inner, name)?;

    let serde_json::Value::Object(outputs) = &mut inner.outputs else {
      return Err(LlmError::OutputsNotObject {
        context: self.full_name.clone(),
        output: name.to_string(),
      });
    };
    outputs.insert(name.to_string(), output.clone());

    let path = format!("{}/{}", self.full_name, name);
    let mut values = self.state.values();
    values.remove_prefix(&format!("{}/", path));
    values.insert(path, output);
    values.insert(self.full_name.clone(), inner.outputs.clone());

    debug!(context = %self.full_name, output = %name, "published output");
    Ok(())
  }

  /// Select which fields make up this context's result.
  pub fn set_output_names(&self, output_names: Vec<String>) {
    self.lock().output_names = output_names;
  }

  /// Fire the completion signal with the selected output view.
  ///
  /// Fails if the signal already fired. Later publications are rejected.
  pub fn outputs_complete(&self) -> Result<(), LlmError> {
    let view = {
      let mut inner = self.lock();
      if inner.completed {
        return Err(LlmError::DuplicateCompletion {
          context: self.full_name.clone(),
        });
      }
      inner.completed = true;
      inner.view()
    };

    self.outputs_tx.send_replace(Some(view));
    debug!(context = %self.full_name, "outputs complete");
    Ok(())
  }

  pub fn is_complete(&self) -> bool {
    self.lock().completed
  }

  /// A waiter that does not keep this context alive.
  pub fn subscribe_outputs(&self) -> OutputsHandle {
    OutputsHandle {
      context: self.full_name.clone(),
      receiver: self.outputs_tx.subscribe(),
    }
  }

  /// Wait for completion, then return the selected output view.
  pub async fn view_outputs(&self) -> Result<serde_json::Value, LlmError> {
    self.subscribe_outputs().wait().await
  }

  /// Wait for completion, then return every published field.
  pub async fn all_outputs(&self) -> Result<serde_json::Value, LlmError> {
    self.subscribe_outputs().wait().await?;
    Ok(self.lock().outputs.clone())
  }

  fn ensure_open(&self, inner: &ContextInner, output: &str) -> Result<(), LlmError> {
    if inner.completed {
      return Err(LlmError::OutputsSealed {
        context: self.full_name.clone(),
        output: output.to_string(),
      });
    }
    Ok(())
  }

  /// Absolute sources are used as-is; relative ones address siblings.
  fn source_path(&self, external_name: &str) -> String {
    if external_name.starts_with('/') {
      return external_name.to_string();
    }
    let base = self
      .parent
      .as_ref()
      .map(|p| p.full_name.as_str())
      .unwrap_or(self.full_name.as_str());
    format!("{}/{}", base, external_name)
  }

  fn lookup(&self, path: &str) -> Result<serde_json::Value, LlmError> {
    self
      .state
      .values()
      .get(path)
      .cloned()
      .ok_or_else(|| LlmError::MissingValue {
        context: self.full_name.clone(),
        path: path.to_string(),
      })
  }

  fn lock(&self) -> MutexGuard<'_, ContextInner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Detached waiter on a context's completion signal.
///
/// Resolves to the completed view, or to [`LlmError::Cancelled`] if the
/// context is dropped before it completes.
#[derive(Debug)]
pub struct OutputsHandle {
  context: String,
  receiver: watch::Receiver<Option<serde_json::Value>>,
}

impl OutputsHandle {
  pub async fn wait(mut self) -> Result<serde_json::Value, LlmError> {
    match self.receiver.wait_for(Option::is_some).await {
      Ok(view) => Ok(view.clone().unwrap_or_default()),
      Err(_) => Err(LlmError::Cancelled {
        context: self.context,
      }),
    }
  }
}
