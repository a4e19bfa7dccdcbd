use std::sync::Arc;

use async_trait::async_trait;
use minijinja::Environment;

use crate::context::LlmContext;
use crate::error::LlmError;
use crate::node::LlmNodeBase;

/// Renders a minijinja template once per row of its inputs.
///
/// Array inputs are zipped row-wise and must share a length; scalar inputs are
/// repeated on every row. The whole output is the array of rendered strings.
///
/// ```text
/// template:  "Q: {{ question }} ({{ lang }})"
/// inputs:    { "question": ["a?", "b?"], "lang": "en" }
/// output:    ["Q: a? (en)", "Q: b? (en)"]
/// ```
#[derive(Debug, Clone)]
pub struct PromptTemplateNode {
  template: String,
  input_names: Vec<String>,
}

impl PromptTemplateNode {
  pub fn new(template: impl Into<String>, input_names: Vec<String>) -> Self {
    Self {
      template: template.into(),
      input_names,
    }
  }

  pub fn template(&self) -> &str {
    &self.template
  }

  fn rows(
    &self,
    node: &str,
    inputs: &serde_json::Map<String, serde_json::Value>,
  ) -> Result<Vec<serde_json::Value>, LlmError> {
    let mut row_count: Option<usize> = None;
    for (name, value) in inputs {
      if let serde_json::Value::Array(items) = value {
        match row_count {
          Some(n) if n != items.len() => {
            return Err(LlmError::Node {
              node: node.to_string(),
              message: format!(
                "input '{}' has {} rows, expected {}",
                name,
                items.len(),
                n
              ),
            });
          }
          _ => row_count = Some(items.len()),
        }
      }
    }

    let rows = (0..row_count.unwrap_or(1))
      .map(|i| {
        let row = inputs
          .iter()
          .map(|(name, value)| {
            let cell = match value {
              serde_json::Value::Array(items) => items[i].clone(),
              scalar => scalar.clone(),
            };
            (name.clone(), cell)
          })
          .collect();
        serde_json::Value::Object(row)
      })
      .collect();

    Ok(rows)
  }
}

#[async_trait]
impl LlmNodeBase for PromptTemplateNode {
  fn input_names(&self) -> Vec<String> {
    self.input_names.clone()
  }

  async fn execute(&self, context: Arc<LlmContext>) -> Result<(), LlmError> {
    let node = context.full_name().to_string();
    let inputs = match context.get_inputs()? {
      serde_json::Value::Object(inputs) => inputs,
      _ => serde_json::Map::new(),
    };

    let env = Environment::new();
    let rendered = self
      .rows(&node, &inputs)?
      .into_iter()
      .map(|row| {
        env
          .render_str(&self.template, row)
          .map(serde_json::Value::String)
          .map_err(|e| LlmError::Node {
            node: node.clone(),
            message: format!("failed to render template: {}", e),
          })
      })
      .collect::<Result<Vec<_>, _>>()?;

    context.set_output(serde_json::Value::Array(rendered))?;
    context.outputs_complete()
  }
}
