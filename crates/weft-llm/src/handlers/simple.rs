use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use weft_message::ControlMessage;

use crate::context::LlmContext;
use crate::error::LlmError;
use crate::task_handler::LlmTaskHandler;

/// Writes its inputs back into the message payload and returns the message.
///
/// Each input is stored in the payload column of the same name. Always claims.
#[derive(Debug, Clone)]
pub struct SimpleTaskHandler {
  output_columns: Vec<String>,
}

impl SimpleTaskHandler {
  pub fn new(output_columns: Vec<String>) -> Self {
    Self { output_columns }
  }
}

#[async_trait]
impl LlmTaskHandler for SimpleTaskHandler {
  fn input_names(&self) -> Vec<String> {
    self.output_columns.clone()
  }

  async fn try_handle(
    &self,
    inputs: serde_json::Value,
    context: Arc<LlmContext>,
  ) -> Result<Option<Vec<Arc<ControlMessage>>>, LlmError> {
    let message = context.message().clone();

    message.update_payload(|payload| {
      if !payload.is_object() {
        *payload = serde_json::Value::Object(serde_json::Map::new());
      }
      if let serde_json::Value::Object(columns) = payload {
        for column in &self.output_columns {
          let value = inputs.get(column).cloned().unwrap_or_default();
          columns.insert(column.clone(), value);
        }
      }
    });

    debug!(columns = ?self.output_columns, "wrote outputs to payload");
    Ok(Some(vec![message]))
  }
}
