//! The engine loop.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use weft_message::ControlMessage;

use crate::context::LlmContext;
use crate::error::LlmError;
use crate::input_map::{UserInputMapping, process_input_names};
use crate::node::LlmNodeBase;
use crate::task::LlmTask;
use crate::task_handler::{LlmTaskHandler, LlmTaskHandlerRunner};

/// Task type the engine drains when none is configured.
pub const DEFAULT_TASK_TYPE: &str = "llm_engine";

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Message task queue the engine drains.
  pub task_type: String,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      task_type: DEFAULT_TASK_TYPE.to_string(),
    }
  }
}

/// Drains a message's tasks through a root node and a chain of task handlers.
///
/// ```ignore
/// let mut engine = LlmEngine::new(Arc::new(pipeline));
/// engine.add_task_handler(vec![("/prompts", "prompt").into()], Arc::new(handler))?;
///
/// let produced = engine.run(message).await?;
/// ```
pub struct LlmEngine {
  config: EngineConfig,
  node: Arc<dyn LlmNodeBase>,
  task_handlers: Vec<LlmTaskHandlerRunner>,
}

impl LlmEngine {
  pub fn new(node: Arc<dyn LlmNodeBase>) -> Self {
    Self::with_config(EngineConfig::default(), node)
  }

  pub fn with_config(config: EngineConfig, node: Arc<dyn LlmNodeBase>) -> Self {
    Self {
      config,
      node,
      task_handlers: Vec::new(),
    }
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Register a handler at the end of the chain.
  pub fn add_task_handler(
    &mut self,
    user_inputs: Vec<UserInputMapping>,
    handler: Arc<dyn LlmTaskHandler>,
  ) -> Result<(), LlmError> {
    let inputs = process_input_names(&user_inputs, &handler.input_names())?;
    self
      .task_handlers
      .push(LlmTaskHandlerRunner::new(inputs, handler));
    Ok(())
  }

  /// Run every queued task of the configured type, in FIFO order.
  ///
  /// Returns the follow-on messages of all tasks, in order. The first failure
  /// aborts the run; tasks not yet popped stay queued on `message`.
  #[instrument(name = "llm_engine_run", skip(self, message), fields(task_type = %self.config.task_type))]
  pub async fn run(
    &self,
    message: Arc<ControlMessage>,
  ) -> Result<Vec<Arc<ControlMessage>>, LlmError> {
    let task_type = self.config.task_type.as_str();

    if !message.has_task(task_type) {
      return Err(LlmError::MissingTask {
        task_type: task_type.to_string(),
      });
    }

    let mut produced = Vec::new();

    while message.has_task(task_type) {
      let task = LlmTask::from_value(message.remove_task(task_type)?)?;
      let run_id = uuid::Uuid::new_v4().to_string();

      match self.run_task(&run_id, task, message.clone()).await {
        Ok(messages) => produced.extend(messages),
        Err(e) => {
          error!(run_id = %run_id, error = %e, "task_failed");
          return Err(e);
        }
      }
    }

    Ok(produced)
  }

  #[instrument(name = "llm_task", skip(self, task, message), fields(run_id = %run_id, task = %task.task_type))]
  async fn run_task(
    &self,
    run_id: &str,
    task: LlmTask,
    message: Arc<ControlMessage>,
  ) -> Result<Vec<Arc<ControlMessage>>, LlmError> {
    info!(run_id = %run_id, "task_started");

    let context = LlmContext::new(task, message);

    self.node.execute(context.clone()).await?;
    if !context.is_complete() {
      context.outputs_complete()?;
    }

    let messages = self.handle_tasks(&context).await?;

    info!(run_id = %run_id, produced = messages.len(), "task_completed");
    Ok(messages)
  }

  /// Offer the outputs to each handler in registration order.
  async fn handle_tasks(
    &self,
    context: &Arc<LlmContext>,
  ) -> Result<Vec<Arc<ControlMessage>>, LlmError> {
    for runner in &self.task_handlers {
      if let Some(messages) = runner.try_handle(context).await? {
        return Ok(messages);
      }
    }

    warn!(
      handlers = self.task_handlers.len(),
      "no task handler claimed the outputs"
    );
    Err(LlmError::UnhandledResult {
      task_type: context.task().task_type.clone(),
    })
  }
}
