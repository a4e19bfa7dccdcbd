use std::sync::Arc;

use async_trait::async_trait;

use crate::context::LlmContext;
use crate::error::LlmError;
use crate::node::LlmNodeBase;

/// Task parameter listing the payload columns to extract.
pub const INPUT_KEYS: &str = "input_keys";

/// Publishes payload columns named by the task's `input_keys`.
///
/// Each column becomes one output field, so `/extracter/questions` resolves to
/// `payload["questions"]`.
#[derive(Debug, Default)]
pub struct ExtracterNode;

impl ExtracterNode {
  pub fn new() -> Self {
    Self
  }

  fn input_keys(context: &LlmContext) -> Result<Vec<String>, LlmError> {
    let keys = context
      .task()
      .get(INPUT_KEYS)
      .and_then(|k| k.as_array())
      .ok_or_else(|| LlmError::Node {
        node: context.full_name().to_string(),
        message: format!("task parameter '{}' must be an array", INPUT_KEYS),
      })?;

    keys
      .iter()
      .map(|k| {
        k.as_str().map(str::to_string).ok_or_else(|| LlmError::Node {
          node: context.full_name().to_string(),
          message: format!("'{}' entries must be strings, got {}", INPUT_KEYS, k),
        })
      })
      .collect()
  }
}

#[async_trait]
impl LlmNodeBase for ExtracterNode {
  fn input_names(&self) -> Vec<String> {
    vec![]
  }

  async fn execute(&self, context: Arc<LlmContext>) -> Result<(), LlmError> {
    let keys = Self::input_keys(&context)?;
    let payload = context.message().payload();

    for key in keys {
      let column = payload
        .get(&key)
        .cloned()
        .ok_or_else(|| LlmError::MissingValue {
          context: context.full_name().to_string(),
          path: key.clone(),
        })?;
      context.set_output_named(&key, column)?;
    }

    context.outputs_complete()
  }
}
