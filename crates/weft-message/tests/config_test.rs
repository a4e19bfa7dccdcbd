//! Tests for building control messages from JSON config.

use weft_message::{ControlMessage, ControlMessageType, MessageError};
use serde_json::json;

#[test]
fn test_from_config() {
  let config = json!({
    "type": "inference",
    "tasks": [
      { "type": "llm_engine", "properties": { "task_type": "template", "task_dict": { "input_keys": ["q"] } } },
      { "type": "llm_engine", "properties": { "task_type": "template", "task_dict": { "input_keys": ["r"] } } }
    ],
    "metadata": { "source": "batch-7", "attempt": 1 }
  });

  let message = ControlMessage::from_config(&config).expect("config should parse");

  assert_eq!(message.task_type(), ControlMessageType::Inference);
  assert_eq!(message.get_tasks()["llm_engine"].as_array().unwrap().len(), 2);
  assert_eq!(message.get_metadata("source").unwrap(), json!("batch-7"));

  let first = message.remove_task("llm_engine").unwrap();
  assert_eq!(first["task_dict"]["input_keys"], json!(["q"]));
}

#[test]
fn test_config_round_trips_tasks_and_metadata() {
  let config = json!({
    "tasks": [{ "type": "llm_engine", "properties": { "task_type": "t", "task_dict": {} } }],
    "metadata": { "k": "v" }
  });
  let message = ControlMessage::from_config(&config).unwrap();

  let rendered = message.to_config();
  assert_eq!(rendered["type"], "none");
  assert_eq!(rendered["tasks"][0]["type"], "llm_engine");
  assert_eq!(rendered["metadata"]["k"], "v");

  let rebuilt = ControlMessage::from_config(&rendered).unwrap();
  assert!(rebuilt.has_task("llm_engine"));
}

#[test]
fn test_config_rejects_task_without_properties() {
  let config = json!({ "tasks": [{ "type": "llm_engine" }] });
  let err = ControlMessage::from_config(&config).unwrap_err();
  assert!(matches!(err, MessageError::InvalidConfig { .. }));
}

#[test]
fn test_config_rejects_conflicting_kinds() {
  let config = json!({
    "type": "training",
    "tasks": [{ "type": "inference", "properties": {} }]
  });
  let err = ControlMessage::from_config(&config).unwrap_err();
  assert!(matches!(
    err,
    MessageError::ConflictingTaskKind {
      committed: ControlMessageType::Training,
      ..
    }
  ));
}

#[test]
fn test_config_rejects_non_object() {
  let err = ControlMessage::from_config(&json!([1, 2, 3])).unwrap_err();
  assert!(err.to_string().contains("JSON object"));
}
