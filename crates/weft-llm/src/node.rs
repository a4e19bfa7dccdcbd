//! Node abstraction and the sequential composite node.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::context::LlmContext;
use crate::error::LlmError;
use crate::input_map::{InputMappings, UserInputMapping, process_input_names};

/// A unit of computation executed against a context.
///
/// Implementations read their inputs with `get_input`/`get_inputs`, publish
/// with `set_output`/`set_output_named`, and may call `outputs_complete`.
/// Resolution failures should be returned unchanged.
#[async_trait]
pub trait LlmNodeBase: Send + Sync {
  /// Local input names this node reads.
  fn input_names(&self) -> Vec<String>;

  async fn execute(&self, context: Arc<LlmContext>) -> Result<(), LlmError>;
}

/// A named child node together with its resolved input wiring.
pub struct LlmNodeRunner {
  name: String,
  inputs: InputMappings,
  node: Arc<dyn LlmNodeBase>,
}

impl LlmNodeRunner {
  pub fn new(name: impl Into<String>, inputs: InputMappings, node: Arc<dyn LlmNodeBase>) -> Self {
    Self {
      name: name.into(),
      inputs,
      node,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn inputs(&self) -> &InputMappings {
    &self.inputs
  }

  /// Run the node in a child scope of `parent` and publish its view on
  /// `parent` under this runner's name.
  ///
  /// The child is completed here if the node did not complete it itself. The
  /// child scope is popped whether or not the node succeeded.
  #[instrument(name = "node_execute", skip(self, parent), fields(node = %self.name))]
  pub async fn execute(&self, parent: &Arc<LlmContext>) -> Result<(), LlmError> {
    let child = parent.push(&self.name, self.inputs.clone())?;
    let result = self.execute_child(parent, &child).await;
    child.pop();
    result
  }

  async fn execute_child(
    &self,
    parent: &Arc<LlmContext>,
    child: &Arc<LlmContext>,
  ) -> Result<(), LlmError> {
    self.node.execute(child.clone()).await?;

    if !child.is_complete() {
      child.outputs_complete()?;
    }

    let view = child.view_outputs().await?;
    parent.set_output_named(&self.name, view)?;

    debug!(context = %child.full_name(), "node finished");
    Ok(())
  }
}

/// Runs its children in insertion order.
///
/// Children flagged as outputs make up the composite's result view; with none
/// flagged, the view is every child's result.
#[derive(Default)]
pub struct LlmNode {
  input_names: Vec<String>,
  children: Vec<LlmNodeRunner>,
  output_names: Vec<String>,
}

impl LlmNode {
  pub fn new() -> Self {
    Self::default()
  }

  /// Declare the inputs this composite itself receives from its parent.
  pub fn with_input_names(input_names: Vec<String>) -> Self {
    Self {
      input_names,
      ..Self::default()
    }
  }

  /// Append a child node.
  ///
  /// `user_inputs` is reconciled with the child's declared input names; an
  /// empty list wires every input through this composite.
  pub fn add_node(
    &mut self,
    name: &str,
    user_inputs: Vec<UserInputMapping>,
    node: Arc<dyn LlmNodeBase>,
    is_output: bool,
  ) -> Result<(), LlmError> {
    if self.children.iter().any(|c| c.name == name) {
      return Err(LlmError::Node {
        node: name.to_string(),
        message: "a child with this name was already added".to_string(),
      });
    }

    let inputs = process_input_names(&user_inputs, &node.input_names())?;
    self.children.push(LlmNodeRunner::new(name, inputs, node));
    if is_output {
      self.output_names.push(name.to_string());
    }
    Ok(())
  }

  pub fn children(&self) -> &[LlmNodeRunner] {
    &self.children
  }
}

#[async_trait]
impl LlmNodeBase for LlmNode {
  fn input_names(&self) -> Vec<String> {
    self.input_names.clone()
  }

  async fn execute(&self, context: Arc<LlmContext>) -> Result<(), LlmError> {
    for child in &self.children {
      child.execute(&context).await?;
    }

    context.set_output_names(self.output_names.clone());
    context.outputs_complete()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::task::LlmTask;
  use serde_json::json;
  use weft_message::ControlMessage;

  struct Constant(serde_json::Value);

  #[async_trait]
  impl LlmNodeBase for Constant {
    fn input_names(&self) -> Vec<String> {
      vec![]
    }

    async fn execute(&self, context: Arc<LlmContext>) -> Result<(), LlmError> {
      context.set_output(self.0.clone())
    }
  }

  struct Echo;

  #[async_trait]
  impl LlmNodeBase for Echo {
    fn input_names(&self) -> Vec<String> {
      vec!["value".to_string()]
    }

    async fn execute(&self, context: Arc<LlmContext>) -> Result<(), LlmError> {
      let value = context.get_input()?;
      context.set_output_named("echo", value)?;
      context.outputs_complete()
    }
  }

  /// Publishes two fields but selects only `keep`.
  struct Selective;

  #[async_trait]
  impl LlmNodeBase for Selective {
    fn input_names(&self) -> Vec<String> {
      vec![]
    }

    async fn execute(&self, context: Arc<LlmContext>) -> Result<(), LlmError> {
      context.set_output_names(vec!["keep".to_string()]);
      context.set_output_named("keep", json!(1))?;
      context.set_output_named("hidden", json!(2))
    }
  }

  fn root() -> Arc<LlmContext> {
    LlmContext::new(LlmTask::default(), Arc::new(ControlMessage::new()))
  }

  #[tokio::test]
  async fn test_runner_publishes_child_view_on_parent() {
    let root = root();
    let runner = LlmNodeRunner::new("const", vec![], Arc::new(Constant(json!({ "a": 1 }))));

    runner.execute(&root).await.unwrap();

    root.outputs_complete().unwrap();
    assert_eq!(root.view_outputs().await.unwrap(), json!({ "const": { "a": 1 } }));
    // The child scope was popped, so the name can be pushed again.
    assert!(root.push("const", vec![]).is_ok());
  }

  #[tokio::test]
  async fn test_unselected_child_fields_are_not_readable() {
    let root = root();
    LlmNodeRunner::new("p", vec![], Arc::new(Selective))
      .execute(&root)
      .await
      .unwrap();

    let reader = root
      .push(
        "reader",
        vec![
          crate::InputMap::new("/p", "view"),
          crate::InputMap::new("/p/hidden", "hidden"),
        ],
      )
      .unwrap();
    assert_eq!(reader.get_input_named("view").unwrap(), json!({ "keep": 1 }));
    assert!(matches!(
      reader.get_input_named("hidden"),
      Err(LlmError::MissingValue { .. })
    ));
  }

  #[tokio::test]
  async fn test_composite_runs_children_in_order() {
    let mut node = LlmNode::new();
    node
      .add_node("source", vec![], Arc::new(Constant(json!("hi"))), false)
      .unwrap();
    node
      .add_node("echo", vec![("/source", "value").into()], Arc::new(Echo), true)
      .unwrap();

    let root = root();
    node.execute(root.clone()).await.unwrap();

    assert_eq!(root.view_outputs().await.unwrap(), json!({ "echo": { "echo": "hi" } }));
    assert_eq!(
      root.all_outputs().await.unwrap(),
      json!({ "source": "hi", "echo": { "echo": "hi" } })
    );
  }

  #[tokio::test]
  async fn test_child_failure_pops_scope() {
    let root = root();
    let runner = LlmNodeRunner::new(
      "echo",
      vec![crate::InputMap::new("/nowhere", "value")],
      Arc::new(Echo),
    );

    let err = runner.execute(&root).await.unwrap_err();
    assert!(matches!(err, LlmError::MissingValue { .. }));
    assert!(root.push("echo", vec![]).is_ok());
  }

  #[test]
  fn test_add_node_rejects_duplicate_names() {
    let mut node = LlmNode::new();
    node.add_node("a", vec![], Arc::new(Echo), false).unwrap();
    let err = node.add_node("a", vec![], Arc::new(Echo), false).unwrap_err();
    assert!(matches!(err, LlmError::Node { .. }));
  }
}
