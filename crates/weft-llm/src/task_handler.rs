//! Task handlers and their runners.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};
use weft_message::ControlMessage;

use crate::context::LlmContext;
use crate::error::LlmError;
use crate::input_map::InputMappings;

/// Name of the scope a runner pushes while its handler runs.
pub const HANDLER_CONTEXT_NAME: &str = "TaskHandler";

/// Turns the outputs of a run into follow-on messages.
#[async_trait]
pub trait LlmTaskHandler: Send + Sync {
  /// Local input names the handler reads.
  fn input_names(&self) -> Vec<String>;

  /// Try to claim the outputs.
  ///
  /// `None` or an empty list means "not mine"; the engine then tries the next
  /// handler. An error aborts the run.
  async fn try_handle(
    &self,
    inputs: serde_json::Value,
    context: Arc<LlmContext>,
  ) -> Result<Option<Vec<Arc<ControlMessage>>>, LlmError>;
}

/// A registered handler with the wiring computed at registration time.
pub struct LlmTaskHandlerRunner {
  inputs: InputMappings,
  handler: Arc<dyn LlmTaskHandler>,
}

impl LlmTaskHandlerRunner {
  pub fn new(inputs: InputMappings, handler: Arc<dyn LlmTaskHandler>) -> Self {
    Self { inputs, handler }
  }

  /// Local input names, in wiring order.
  pub fn input_names(&self) -> Vec<String> {
    self
      .inputs
      .iter()
      .map(|m| m.internal_name.clone())
      .collect()
  }

  /// Resolve the handler's inputs under a `TaskHandler` scope and invoke it.
  ///
  /// Returns `None` when the handler did not claim the outputs.
  #[instrument(name = "task_handler", skip(self, context), fields(context = %context.full_name()))]
  pub async fn try_handle(
    &self,
    context: &Arc<LlmContext>,
  ) -> Result<Option<Vec<Arc<ControlMessage>>>, LlmError> {
    let scope = context.push(HANDLER_CONTEXT_NAME, self.inputs.clone())?;
    let result = self.handle_in_scope(&scope).await;
    scope.pop();

    let claimed = result?.filter(|messages| !messages.is_empty());
    debug!(claimed = claimed.is_some(), "task handler finished");
    Ok(claimed)
  }

  async fn handle_in_scope(
    &self,
    scope: &Arc<LlmContext>,
  ) -> Result<Option<Vec<Arc<ControlMessage>>>, LlmError> {
    let inputs = scope.get_inputs()?;
    self.handler.try_handle(inputs, scope.clone()).await
  }
}
