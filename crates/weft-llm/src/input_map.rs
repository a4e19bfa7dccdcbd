//! Input wiring between contexts.
//!
//! An [`InputMap`] binds a node's local input name (`internal_name`) to a
//! source (`external_name`). The source is either a literal scratch-store
//! path such as `/extracter/questions`, or the [`PARENT_SENTINEL`] `-`,
//! meaning "resolve the same name through the parent context".
//!
//! Callers describe wiring loosely with [`UserInputMapping`]s; at
//! registration time [`process_input_names`] reconciles them with the names
//! a node or handler declares:
//!
//! ```text
//! "/extracter/questions"          -> ("/extracter/questions", "questions")
//! ("/extracter/questions", "q")   -> ("/extracter/questions", "q")
//! "/extracter/*"                  -> ("/extracter/<name>", <name>) for each unmapped name
//! ("/templates/out", "-")         -> ("/templates/out", <next unmapped name>)
//! []                              -> ("-", <name>) for each declared name
//! ```

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Source marker meaning "use the parent's resolution of this name".
pub const PARENT_SENTINEL: &str = "-";

/// Internal-name marker expanding to every declared name not mapped otherwise.
pub const WILDCARD: &str = "*";

/// One resolved `(source, local name)` binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputMap {
  pub external_name: String,
  pub internal_name: String,
}

/// Ordered input wiring of a context.
pub type InputMappings = Vec<InputMap>;

impl InputMap {
  pub fn new(external_name: impl Into<String>, internal_name: impl Into<String>) -> Self {
    Self {
      external_name: external_name.into(),
      internal_name: internal_name.into(),
    }
  }

  /// Bind `internal_name` to the parent's input of the same name.
  pub fn from_parent(internal_name: impl Into<String>) -> Self {
    Self::new(PARENT_SENTINEL, internal_name)
  }

  pub fn is_parent(&self) -> bool {
    self.external_name == PARENT_SENTINEL
  }
}

/// Caller-supplied wiring, before it is reconciled with declared names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInputMapping {
  pub external_name: String,
  pub internal_name: String,
}

impl UserInputMapping {
  pub fn new(external_name: impl Into<String>, internal_name: impl Into<String>) -> Self {
    Self {
      external_name: external_name.into(),
      internal_name: internal_name.into(),
    }
  }

  /// Derive the local name from the last path segment of `external_name`.
  ///
  /// A trailing `/*` produces a wildcard mapping.
  pub fn from_external(external_name: impl Into<String>) -> Self {
    let external_name = external_name.into();
    let internal_name = external_name
      .rsplit('/')
      .next()
      .unwrap_or(&external_name)
      .to_string();
    Self {
      external_name,
      internal_name,
    }
  }
}

impl From<&str> for UserInputMapping {
  fn from(external_name: &str) -> Self {
    Self::from_external(external_name)
  }
}

impl From<(&str, &str)> for UserInputMapping {
  fn from((external_name, internal_name): (&str, &str)) -> Self {
    Self::new(external_name, internal_name)
  }
}

/// Reconcile user wiring with the input names a node declares.
///
/// The result is ordered like `input_names`.
pub fn process_input_names(
  user_inputs: &[UserInputMapping],
  input_names: &[String],
) -> Result<InputMappings, LlmError> {
  if user_inputs.is_empty() {
    return Ok(input_names.iter().map(InputMap::from_parent).collect());
  }

  let mut mapped: Vec<InputMap> = Vec::with_capacity(input_names.len());
  let mut wildcard_prefix: Option<&str> = None;
  let mut placeholders: Vec<&str> = Vec::new();

  for user_input in user_inputs {
    match user_input.internal_name.as_str() {
      WILDCARD => {
        let prefix = user_input
          .external_name
          .strip_suffix("/*")
          .ok_or_else(|| mapping_error(format!(
            "wildcard source '{}' must end with '/*'",
            user_input.external_name
          )))?;
        if wildcard_prefix.replace(prefix).is_some() {
          return Err(mapping_error("only one wildcard mapping is allowed".to_string()));
        }
      }
      PARENT_SENTINEL => placeholders.push(&user_input.external_name),
      name => {
        if !input_names.iter().any(|n| n == name) {
          return Err(mapping_error(format!(
            "'{}' is not one of the declared inputs {:?}",
            name, input_names
          )));
        }
        if mapped.iter().any(|m| m.internal_name == name) {
          return Err(mapping_error(format!("input '{}' is mapped more than once", name)));
        }
        mapped.push(InputMap::new(user_input.external_name.clone(), name));
      }
    }
  }

  for external_name in placeholders {
    let name = next_unmapped(input_names, &mapped).ok_or_else(|| {
      mapping_error(format!(
        "placeholder for '{}' has no remaining input to bind",
        external_name
      ))
    })?;
    mapped.push(InputMap::new(external_name, name));
  }

  if let Some(prefix) = wildcard_prefix {
    while let Some(name) = next_unmapped(input_names, &mapped) {
      mapped.push(InputMap::new(format!("{}/{}", prefix, name), name));
    }
  }

  if let Some(missing) = next_unmapped(input_names, &mapped) {
    return Err(mapping_error(format!("input '{}' is not mapped", missing)));
  }

  mapped.sort_by_key(|m| input_names.iter().position(|n| *n == m.internal_name));
  Ok(mapped)
}

fn next_unmapped(input_names: &[String], mapped: &[InputMap]) -> Option<String> {
  input_names
    .iter()
    .find(|name| !mapped.iter().any(|m| &m.internal_name == *name))
    .cloned()
}

fn mapping_error(message: String) -> LlmError {
  LlmError::InputMapping { message }
}
