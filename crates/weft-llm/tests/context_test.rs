//! Integration tests for the execution context's completion signal and input
//! resolution.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use weft_llm::{ControlMessage, InputMap, LlmContext, LlmError, LlmTask};

fn root() -> Arc<LlmContext> {
  let task = LlmTask::new(
    "template",
    json!({ "input_keys": ["q"] })
      .as_object()
      .cloned()
      .expect("object"),
  );
  LlmContext::new(task, Arc::new(ControlMessage::new()))
}

#[tokio::test]
async fn test_many_waiters_observe_the_same_view() {
  let ctx = root().push("producer", vec![]).expect("push");

  let waiters: Vec<_> = (0..16)
    .map(|_| {
      let handle = ctx.subscribe_outputs();
      tokio::spawn(handle.wait())
    })
    .collect();

  ctx.set_output_names(vec!["answer".to_string()]);
  ctx.set_output_named("answer", json!("forty-two")).expect("publish");
  ctx.set_output_named("scratch", json!(0)).expect("publish");
  ctx.outputs_complete().expect("complete");

  let views = futures::future::join_all(waiters).await;
  assert_eq!(views.len(), 16);
  for view in views {
    let view = view.expect("join").expect("view");
    assert_eq!(view, json!({ "answer": "forty-two" }));
  }
}

#[tokio::test]
async fn test_waiter_does_not_resolve_before_completion() {
  let ctx = root();
  ctx.set_output(json!({ "a": 1 })).expect("publish");

  let pending = tokio::time::timeout(Duration::from_millis(50), ctx.view_outputs()).await;
  assert!(pending.is_err(), "view resolved before outputs_complete");

  ctx.outputs_complete().expect("complete");
  let view = tokio::time::timeout(Duration::from_millis(50), ctx.view_outputs())
    .await
    .expect("view should resolve after completion")
    .expect("view");
  assert_eq!(view, json!({ "a": 1 }));
}

#[tokio::test]
async fn test_completion_from_another_task() {
  let ctx = root().push("async", vec![]).expect("push");

  let producer = ctx.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(10)).await;
    producer.set_output(json!(["late"])).expect("publish");
    producer.outputs_complete().expect("complete");
  });

  assert_eq!(ctx.view_outputs().await.expect("view"), json!(["late"]));
  assert_eq!(ctx.all_outputs().await.expect("all"), json!(["late"]));
}

#[test]
fn test_paths_are_deterministic() {
  let root = root();
  let a = root.push("a", vec![]).expect("push");
  let b = a.push("b", vec![]).expect("push");
  let c = b.push("c", vec![]).expect("push");

  assert_eq!(c.full_name(), "/a/b/c");
  assert_eq!(c.parent().map(|p| p.full_name()), Some("/a/b"));

  c.pop();
  let again = b.push("c", vec![]).expect("push");
  assert_eq!(again.full_name(), c.full_name());
}

#[test]
fn test_nested_resolution() {
  let root = root();

  let extracter = root.push("extracter", vec![]).expect("push");
  extracter
    .set_output(json!({ "questions": ["a?", "b?"] }))
    .expect("publish");
  extracter.pop();

  let group = root
    .push("group", vec![InputMap::new("/extracter/questions", "questions")])
    .expect("push");
  let inner = group
    .push("inner", vec![InputMap::from_parent("questions")])
    .expect("push");
  let deepest = inner
    .push(
      "deepest",
      vec![
        InputMap::from_parent("questions"),
        InputMap::new("/extracter/questions/1", "second"),
      ],
    )
    .expect("push");

  assert_eq!(
    deepest.get_inputs().expect("inputs"),
    json!({ "questions": ["a?", "b?"], "second": "b?" })
  );
  assert_eq!(
    deepest.get_input_named("/extracter").expect("absolute"),
    json!({ "questions": ["a?", "b?"] })
  );
  assert_eq!(deepest.task().get("input_keys"), Some(&json!(["q"])));
}

#[test]
fn test_unpublished_path_fails_without_blocking() {
  let root = root();
  let reader = root
    .push("reader", vec![InputMap::new("/never/published", "x")])
    .expect("push");

  match reader.get_input() {
    Err(LlmError::MissingValue { context, path }) => {
      assert_eq!(context, "/reader");
      assert_eq!(path, "/never/published");
    }
    other => panic!("expected MissingValue, got {:?}", other),
  }
}
