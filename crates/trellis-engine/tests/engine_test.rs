use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use trellis_definition::{ActionType, DomainEvent, WorkflowDefinition};
use trellis_engine::{
  ActionError, ActionHandler, Dispatcher, Engine, EngineError, ResolvedConfig, RetryPolicy,
};
use trellis_store::{ActionStatus, Error as StoreError, MemoryStore, RunStatus, Store};

/// Records every resolved config it is called with, in call order.
#[derive(Default)]
struct Recorder {
  calls: Mutex<Vec<ResolvedConfig>>,
}

impl Recorder {
  fn messages(&self) -> Vec<String> {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter_map(|c| c.get("message").and_then(Value::as_str).map(String::from))
      .collect()
  }
}

#[async_trait]
impl ActionHandler for Recorder {
  async fn execute(&self, config: &ResolvedConfig) -> Result<Value, ActionError> {
    self.calls.lock().unwrap().push(config.clone());
    Ok(json!({"ok": true}))
  }
}

/// Fails transiently a fixed number of times, then succeeds.
struct Flaky {
  remaining_failures: Mutex<u32>,
  attempts: Mutex<u32>,
}

impl Flaky {
  fn new(failures: u32) -> Self {
    Self {
      remaining_failures: Mutex::new(failures),
      attempts: Mutex::new(0),
    }
  }
}

#[async_trait]
impl ActionHandler for Flaky {
  async fn execute(&self, _config: &ResolvedConfig) -> Result<Value, ActionError> {
    *self.attempts.lock().unwrap() += 1;
    let mut left = self.remaining_failures.lock().unwrap();
    if *left > 0 {
      *left -= 1;
      return Err(ActionError::Transient("upstream flapped".to_string()));
    }
    Ok(json!({"ok": true}))
  }
}

struct AlwaysFails;

#[async_trait]
impl ActionHandler for AlwaysFails {
  async fn execute(&self, _config: &ResolvedConfig) -> Result<Value, ActionError> {
    Err(ActionError::Permanent("rejected".to_string()))
  }
}

/// Blocks inside `execute` until released, so a test can cancel mid-run.
#[derive(Default)]
struct Gate {
  started: tokio::sync::Notify,
  release: tokio::sync::Notify,
}

#[async_trait]
impl ActionHandler for Gate {
  async fn execute(&self, _config: &ResolvedConfig) -> Result<Value, ActionError> {
    self.started.notify_one();
    self.release.notified().await;
    Ok(json!({"ok": true}))
  }
}

fn engine_with(
  store: Arc<MemoryStore>,
  handlers: Vec<(ActionType, Arc<dyn ActionHandler>)>,
) -> Arc<Engine<MemoryStore>> {
  let mut dispatcher = Dispatcher::with_retry(RetryPolicy {
    max_attempts: 3,
    initial_delay_ms: 1,
  });
  for (action_type, handler) in handlers {
    dispatcher.register(action_type, handler);
  }
  Arc::new(Engine::new(store, Arc::new(dispatcher)))
}

fn def(value: Value) -> WorkflowDefinition {
  serde_json::from_value(value).unwrap()
}

fn created_event(record: Value) -> DomainEvent {
  serde_json::from_value(json!({
    "eventType": "RECORD_CREATED",
    "objectType": "deal",
    "recordId": "r1",
    "after": record
  }))
  .unwrap()
}

fn notify_workflow(nodes_and_edges: (Value, Value)) -> WorkflowDefinition {
  def(json!({
    "id": "wf", "name": "wf", "objectId": "deal",
    "trigger": { "type": "RECORD_CREATED" },
    "nodes": nodes_and_edges.0,
    "edges": nodes_and_edges.1
  }))
}

#[tokio::test]
async fn linear_run_resolves_templates_and_completes() {
  let store = Arc::new(MemoryStore::new());
  let recorder = Arc::new(Recorder::default());
  let engine = engine_with(
    store.clone(),
    vec![(ActionType::CreateNotification, recorder.clone())],
  );

  let mut workflow = notify_workflow((
    json!([
      { "id": "t", "type": "trigger",
        "data": { "triggerType": "RECORD_CREATED", "objectName": "deal" } },
      { "id": "a1", "type": "action",
        "data": { "actionType": "CREATE_NOTIFICATION",
                  "config": { "message": "{{greeting}}, {{record.name}}" } } }
    ]),
    json!([{ "source": "t", "target": "a1" }]),
  ));
  workflow.variables = serde_json::from_value(json!([
    { "name": "greeting", "default": "Hello" }
  ]))
  .unwrap();

  engine.save_definition(&workflow).await.unwrap();
  let run_id = engine
    .start(&workflow, &created_event(json!({"name": "Acme"})))
    .await
    .unwrap();

  assert_eq!(recorder.messages(), vec!["Hello, Acme"]);
  let run = store.get_run(&run_id).await.unwrap();
  assert_eq!(run.status, RunStatus::Completed);
  assert!(run.completed_at.is_some());
}

#[tokio::test]
async fn condition_routes_by_port() {
  let store = Arc::new(MemoryStore::new());
  let recorder = Arc::new(Recorder::default());
  let engine = engine_with(
    store.clone(),
    vec![(ActionType::CreateNotification, recorder.clone())],
  );

  let workflow = notify_workflow((
    json!([
      { "id": "t", "type": "trigger",
        "data": { "triggerType": "RECORD_CREATED", "objectName": "deal" } },
      { "id": "c", "type": "condition",
        "data": { "field": "record.stage", "operator": "equals", "value": "won" } },
      { "id": "win", "type": "action",
        "data": { "actionType": "CREATE_NOTIFICATION", "config": { "message": "won" } } },
      { "id": "lose", "type": "action",
        "data": { "actionType": "CREATE_NOTIFICATION", "config": { "message": "lost" } } }
    ]),
    json!([
      { "source": "t", "target": "c" },
      { "source": "c", "sourcePort": "true", "target": "win" },
      { "source": "c", "sourcePort": "false", "target": "lose" }
    ]),
  ));
  engine.save_definition(&workflow).await.unwrap();

  engine
    .start(&workflow, &created_event(json!({"stage": "won"})))
    .await
    .unwrap();
  engine
    .start(&workflow, &created_event(json!({"stage": "qualified"})))
    .await
    .unwrap();

  assert_eq!(recorder.messages(), vec!["won", "lost"]);
}

#[tokio::test]
async fn loop_iterates_in_element_order_then_exits() {
  let store = Arc::new(MemoryStore::new());
  let recorder = Arc::new(Recorder::default());
  let engine = engine_with(
    store.clone(),
    vec![
      (ActionType::CreateNotification, recorder.clone()),
      (ActionType::CreateTask, recorder.clone()),
    ],
  );

  let workflow = notify_workflow((
    json!([
      { "id": "t", "type": "trigger",
        "data": { "triggerType": "RECORD_CREATED", "objectName": "deal" } },
      { "id": "l", "type": "loop",
        "data": { "collection": "record.contacts", "itemVariable": "contact" } },
      { "id": "body", "type": "action",
        "data": { "actionType": "CREATE_NOTIFICATION", "config": { "message": "{{contact}}" } } },
      { "id": "after", "type": "action",
        "data": { "actionType": "CREATE_TASK",
                  "config": { "title": "done", "message": "done" } } }
    ]),
    json!([
      { "source": "t", "target": "l" },
      { "source": "l", "sourcePort": "body", "target": "body" },
      { "source": "l", "sourcePort": "exit", "target": "after" }
    ]),
  ));
  engine.save_definition(&workflow).await.unwrap();

  let run_id = engine
    .start(&workflow, &created_event(json!({"contacts": ["a", "b", "c"]})))
    .await
    .unwrap();

  assert_eq!(recorder.messages(), vec!["a", "b", "c", "done"]);
  let results = store.list_results(&run_id).await.unwrap();
  assert_eq!(results.len(), 4);
  assert!(results.iter().all(|r| r.status == ActionStatus::Succeeded));
}

#[tokio::test]
async fn empty_collection_takes_exit_immediately() {
  let store = Arc::new(MemoryStore::new());
  let recorder = Arc::new(Recorder::default());
  let engine = engine_with(
    store.clone(),
    vec![(ActionType::CreateNotification, recorder.clone())],
  );

  let workflow = notify_workflow((
    json!([
      { "id": "t", "type": "trigger",
        "data": { "triggerType": "RECORD_CREATED", "objectName": "deal" } },
      { "id": "l", "type": "loop",
        "data": { "collection": "record.contacts", "itemVariable": "contact" } },
      { "id": "body", "type": "action",
        "data": { "actionType": "CREATE_NOTIFICATION", "config": { "message": "{{contact}}" } } },
      { "id": "after", "type": "action",
        "data": { "actionType": "CREATE_NOTIFICATION", "config": { "message": "exit" } } }
    ]),
    json!([
      { "source": "t", "target": "l" },
      { "source": "l", "sourcePort": "body", "target": "body" },
      { "source": "l", "sourcePort": "exit", "target": "after" }
    ]),
  ));
  engine.save_definition(&workflow).await.unwrap();

  engine
    .start(&workflow, &created_event(json!({"contacts": []})))
    .await
    .unwrap();

  assert_eq!(recorder.messages(), vec!["exit"]);
}

#[tokio::test]
async fn nested_loops_bind_innermost_item() {
  let store = Arc::new(MemoryStore::new());
  let recorder = Arc::new(Recorder::default());
  let engine = engine_with(
    store.clone(),
    vec![(ActionType::CreateNotification, recorder.clone())],
  );

  let workflow = notify_workflow((
    json!([
      { "id": "t", "type": "trigger",
        "data": { "triggerType": "RECORD_CREATED", "objectName": "deal" } },
      { "id": "outer", "type": "loop",
        "data": { "collection": "record.teams", "itemVariable": "team" } },
      { "id": "inner", "type": "loop",
        "data": { "collection": "record.sizes", "itemVariable": "size" } },
      { "id": "body", "type": "action",
        "data": { "actionType": "CREATE_NOTIFICATION",
                  "config": { "message": "{{team}}-{{size}}" } } },
      { "id": "after", "type": "action",
        "data": { "actionType": "CREATE_NOTIFICATION", "config": { "message": "done" } } }
    ]),
    json!([
      { "source": "t", "target": "outer" },
      { "source": "outer", "sourcePort": "body", "target": "inner" },
      { "source": "outer", "sourcePort": "exit", "target": "after" },
      { "source": "inner", "sourcePort": "body", "target": "body" },
      { "source": "inner", "sourcePort": "exit", "target": "after" }
    ]),
  ));
  engine.save_definition(&workflow).await.unwrap();

  // "after" has two incoming edges; it runs once per outer-exit plus once at
  // inner-exit per outer element.
  engine
    .start(
      &workflow,
      &created_event(json!({"teams": ["x", "y"], "sizes": [1, 2]})),
    )
    .await
    .unwrap();

  assert_eq!(
    recorder.messages(),
    vec!["x-1", "x-2", "done", "y-1", "y-2", "done", "done"]
  );
}

#[tokio::test]
async fn delay_suspends_and_resume_due_continues() {
  let store = Arc::new(MemoryStore::new());
  let recorder = Arc::new(Recorder::default());
  let engine = engine_with(
    store.clone(),
    vec![(ActionType::CreateNotification, recorder.clone())],
  );

  let workflow = notify_workflow((
    json!([
      { "id": "t", "type": "trigger",
        "data": { "triggerType": "RECORD_CREATED", "objectName": "deal" } },
      { "id": "d", "type": "action",
        "data": { "actionType": "DELAY", "config": { "duration": 5, "unit": "minutes" } } },
      { "id": "a", "type": "action",
        "data": { "actionType": "CREATE_NOTIFICATION", "config": { "message": "after" } } }
    ]),
    json!([
      { "source": "t", "target": "d" },
      { "source": "d", "target": "a" }
    ]),
  ));
  engine.save_definition(&workflow).await.unwrap();

  let run_id = engine
    .start(&workflow, &created_event(json!({})))
    .await
    .unwrap();

  let run = store.get_run(&run_id).await.unwrap();
  assert_eq!(run.status, RunStatus::Suspended);
  assert!(run.wake_at.is_some());
  assert!(recorder.messages().is_empty());

  // Not due yet.
  assert!(engine.resume_due(Utc::now()).await.unwrap().is_empty());

  let later = Utc::now() + chrono::Duration::minutes(10);
  let resumed = engine.resume_due(later).await.unwrap();
  assert_eq!(resumed, vec![run_id.clone()]);
  assert_eq!(recorder.messages(), vec!["after"]);

  let run = store.get_run(&run_id).await.unwrap();
  assert_eq!(run.status, RunStatus::Completed);
  assert!(run.cursor.is_none());
}

#[tokio::test]
async fn delay_inside_loop_resumes_mid_iteration() {
  let store = Arc::new(MemoryStore::new());
  let recorder = Arc::new(Recorder::default());
  let engine = engine_with(
    store.clone(),
    vec![(ActionType::CreateNotification, recorder.clone())],
  );

  let workflow = notify_workflow((
    json!([
      { "id": "t", "type": "trigger",
        "data": { "triggerType": "RECORD_CREATED", "objectName": "deal" } },
      { "id": "l", "type": "loop",
        "data": { "collection": "record.contacts", "itemVariable": "contact" } },
      { "id": "d", "type": "action",
        "data": { "actionType": "DELAY", "config": { "duration": 1, "unit": "seconds" } } },
      { "id": "notify", "type": "action",
        "data": { "actionType": "CREATE_NOTIFICATION", "config": { "message": "{{contact}}" } } },
      { "id": "after", "type": "action",
        "data": { "actionType": "CREATE_NOTIFICATION", "config": { "message": "done" } } }
    ]),
    json!([
      { "source": "t", "target": "l" },
      { "source": "l", "sourcePort": "body", "target": "d" },
      { "source": "d", "target": "notify" },
      { "source": "l", "sourcePort": "exit", "target": "after" }
    ]),
  ));
  engine.save_definition(&workflow).await.unwrap();

  let run_id = engine
    .start(&workflow, &created_event(json!({"contacts": ["a", "b"]})))
    .await
    .unwrap();
  assert_eq!(
    store.get_run(&run_id).await.unwrap().status,
    RunStatus::Suspended
  );

  // First resume finishes iteration "a" and suspends again on "b".
  let later = Utc::now() + chrono::Duration::seconds(30);
  assert_eq!(engine.resume_due(later).await.unwrap().len(), 1);
  assert_eq!(recorder.messages(), vec!["a"]);
  assert_eq!(
    store.get_run(&run_id).await.unwrap().status,
    RunStatus::Suspended
  );

  assert_eq!(engine.resume_due(later).await.unwrap().len(), 1);
  assert_eq!(recorder.messages(), vec!["a", "b", "done"]);
  assert_eq!(
    store.get_run(&run_id).await.unwrap().status,
    RunStatus::Completed
  );
}

#[tokio::test]
async fn zero_delay_continues_without_suspending() {
  let store = Arc::new(MemoryStore::new());
  let recorder = Arc::new(Recorder::default());
  let engine = engine_with(
    store.clone(),
    vec![(ActionType::CreateNotification, recorder.clone())],
  );

  let workflow = notify_workflow((
    json!([
      { "id": "t", "type": "trigger",
        "data": { "triggerType": "RECORD_CREATED", "objectName": "deal" } },
      { "id": "d", "type": "action",
        "data": { "actionType": "DELAY", "config": { "duration": 0, "unit": "hours" } } },
      { "id": "a", "type": "action",
        "data": { "actionType": "CREATE_NOTIFICATION", "config": { "message": "after" } } }
    ]),
    json!([
      { "source": "t", "target": "d" },
      { "source": "d", "target": "a" }
    ]),
  ));
  engine.save_definition(&workflow).await.unwrap();

  let run_id = engine
    .start(&workflow, &created_event(json!({})))
    .await
    .unwrap();
  assert_eq!(recorder.messages(), vec!["after"]);
  assert_eq!(
    store.get_run(&run_id).await.unwrap().status,
    RunStatus::Completed
  );
}

#[tokio::test]
async fn permanent_failure_halts_the_run() {
  let store = Arc::new(MemoryStore::new());
  let recorder = Arc::new(Recorder::default());
  let engine = engine_with(
    store.clone(),
    vec![
      (ActionType::UpdateField, Arc::new(AlwaysFails)),
      (ActionType::CreateNotification, recorder.clone()),
    ],
  );

  let workflow = notify_workflow((
    json!([
      { "id": "t", "type": "trigger",
        "data": { "triggerType": "RECORD_CREATED", "objectName": "deal" } },
      { "id": "a1", "type": "action",
        "data": { "actionType": "UPDATE_FIELD", "config": { "field": "stage" } } },
      { "id": "a2", "type": "action",
        "data": { "actionType": "CREATE_NOTIFICATION", "config": { "message": "never" } } }
    ]),
    json!([
      { "source": "t", "target": "a1" },
      { "source": "a1", "target": "a2" }
    ]),
  ));
  engine.save_definition(&workflow).await.unwrap();

  let run_id = engine
    .start(&workflow, &created_event(json!({})))
    .await
    .unwrap();

  assert!(recorder.messages().is_empty());
  let run = store.get_run(&run_id).await.unwrap();
  assert_eq!(run.status, RunStatus::Failed);

  let results = store.list_results(&run_id).await.unwrap();
  assert_eq!(results.len(), 1);
  assert_eq!(results[0].status, ActionStatus::Failed);
  assert_eq!(results[0].error.as_deref(), Some("rejected"));
}

#[tokio::test]
async fn transient_failures_are_retried() {
  let store = Arc::new(MemoryStore::new());
  let flaky = Arc::new(Flaky::new(2));
  let engine = engine_with(
    store.clone(),
    vec![(ActionType::CreateNotification, flaky.clone())],
  );

  let workflow = notify_workflow((
    json!([
      { "id": "t", "type": "trigger",
        "data": { "triggerType": "RECORD_CREATED", "objectName": "deal" } },
      { "id": "a", "type": "action",
        "data": { "actionType": "CREATE_NOTIFICATION", "config": { "message": "hi" } } }
    ]),
    json!([{ "source": "t", "target": "a" }]),
  ));
  engine.save_definition(&workflow).await.unwrap();

  let run_id = engine
    .start(&workflow, &created_event(json!({})))
    .await
    .unwrap();

  assert_eq!(*flaky.attempts.lock().unwrap(), 3);
  let results = store.list_results(&run_id).await.unwrap();
  assert_eq!(results.len(), 1);
  assert_eq!(results[0].status, ActionStatus::Succeeded);
  assert_eq!(
    store.get_run(&run_id).await.unwrap().status,
    RunStatus::Completed
  );
}

#[tokio::test]
async fn transient_failures_exhaust_attempts_and_fail() {
  let store = Arc::new(MemoryStore::new());
  let flaky = Arc::new(Flaky::new(10));
  let engine = engine_with(
    store.clone(),
    vec![(ActionType::CreateNotification, flaky.clone())],
  );

  let workflow = notify_workflow((
    json!([
      { "id": "t", "type": "trigger",
        "data": { "triggerType": "RECORD_CREATED", "objectName": "deal" } },
      { "id": "a", "type": "action",
        "data": { "actionType": "CREATE_NOTIFICATION", "config": { "message": "hi" } } }
    ]),
    json!([{ "source": "t", "target": "a" }]),
  ));
  engine.save_definition(&workflow).await.unwrap();

  let run_id = engine
    .start(&workflow, &created_event(json!({})))
    .await
    .unwrap();

  assert_eq!(*flaky.attempts.lock().unwrap(), 3);
  assert_eq!(
    store.get_run(&run_id).await.unwrap().status,
    RunStatus::Failed
  );
}

#[tokio::test]
async fn cancelling_a_live_run_skips_remaining_nodes() {
  let store = Arc::new(MemoryStore::new());
  let gate = Arc::new(Gate::default());
  let recorder = Arc::new(Recorder::default());
  let engine = engine_with(
    store.clone(),
    vec![
      (ActionType::SendEmail, gate.clone()),
      (ActionType::CreateNotification, recorder.clone()),
    ],
  );

  let workflow = notify_workflow((
    json!([
      { "id": "t", "type": "trigger",
        "data": { "triggerType": "RECORD_CREATED", "objectName": "deal" } },
      { "id": "a1", "type": "action",
        "data": { "actionType": "SEND_EMAIL", "config": { "to": "kim@acme.io" } } },
      { "id": "a2", "type": "action",
        "data": { "actionType": "CREATE_NOTIFICATION", "config": { "message": "never" } } }
    ]),
    json!([
      { "source": "t", "target": "a1" },
      { "source": "a1", "target": "a2" }
    ]),
  ));
  engine.save_definition(&workflow).await.unwrap();

  let task = {
    let engine = engine.clone();
    let workflow = workflow.clone();
    tokio::spawn(async move { engine.start(&workflow, &created_event(json!({}))).await })
  };

  gate.started.notified().await;
  let runs = store.list_runs("wf").await.unwrap();
  assert_eq!(runs.len(), 1);
  engine.cancel(&runs[0].run_id).await.unwrap();
  gate.release.notify_one();

  let run_id = task.await.unwrap().unwrap();
  assert!(recorder.messages().is_empty());
  assert_eq!(
    store.get_run(&run_id).await.unwrap().status,
    RunStatus::Cancelled
  );

  // The completed email is on the trail; the unreached node is skipped.
  let results = store.list_results(&run_id).await.unwrap();
  assert_eq!(results.len(), 2);
  assert_eq!(results[0].status, ActionStatus::Succeeded);
  assert_eq!(results[1].status, ActionStatus::Skipped);
  assert_eq!(results[1].node_id, "a2");
}

#[tokio::test]
async fn cancelling_a_suspended_run_prevents_resume() {
  let store = Arc::new(MemoryStore::new());
  let recorder = Arc::new(Recorder::default());
  let engine = engine_with(
    store.clone(),
    vec![(ActionType::CreateNotification, recorder.clone())],
  );

  let workflow = notify_workflow((
    json!([
      { "id": "t", "type": "trigger",
        "data": { "triggerType": "RECORD_CREATED", "objectName": "deal" } },
      { "id": "d", "type": "action",
        "data": { "actionType": "DELAY", "config": { "duration": 1, "unit": "days" } } },
      { "id": "a", "type": "action",
        "data": { "actionType": "CREATE_NOTIFICATION", "config": { "message": "after" } } }
    ]),
    json!([
      { "source": "t", "target": "d" },
      { "source": "d", "target": "a" }
    ]),
  ));
  engine.save_definition(&workflow).await.unwrap();

  let run_id = engine
    .start(&workflow, &created_event(json!({})))
    .await
    .unwrap();
  engine.cancel(&run_id).await.unwrap();
  assert_eq!(
    store.get_run(&run_id).await.unwrap().status,
    RunStatus::Cancelled
  );

  let later = Utc::now() + chrono::Duration::days(2);
  assert!(engine.resume_due(later).await.unwrap().is_empty());
  assert!(recorder.messages().is_empty());
}

#[tokio::test]
async fn start_refuses_an_unsaved_definition() {
  let store = Arc::new(MemoryStore::new());
  let recorder = Arc::new(Recorder::default());
  let engine = engine_with(
    store.clone(),
    vec![(ActionType::CreateNotification, recorder.clone())],
  );

  let workflow = notify_workflow((
    json!([
      { "id": "t", "type": "trigger",
        "data": { "triggerType": "RECORD_CREATED", "objectName": "deal" } },
      { "id": "a", "type": "action",
        "data": { "actionType": "CREATE_NOTIFICATION", "config": { "message": "hi" } } }
    ]),
    json!([{ "source": "t", "target": "a" }]),
  ));

  // Runs pin the stored (id, version) pair; an unsaved definition could
  // never be reloaded on resume, so no run may be created from it.
  let err = engine
    .start(&workflow, &created_event(json!({})))
    .await
    .unwrap_err();
  assert!(matches!(err, EngineError::Store(StoreError::NotFound(_))));
  assert!(recorder.messages().is_empty());
  assert!(store.list_runs("wf").await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_resume_leaves_the_run_terminal() {
  let store = Arc::new(MemoryStore::new());
  let recorder = Arc::new(Recorder::default());
  let engine = engine_with(
    store.clone(),
    vec![(ActionType::CreateNotification, recorder.clone())],
  );

  let workflow = notify_workflow((
    json!([
      { "id": "t", "type": "trigger",
        "data": { "triggerType": "RECORD_CREATED", "objectName": "deal" } },
      { "id": "d", "type": "action",
        "data": { "actionType": "DELAY", "config": { "duration": 1, "unit": "minutes" } } },
      { "id": "a", "type": "action",
        "data": { "actionType": "CREATE_NOTIFICATION", "config": { "message": "after" } } }
    ]),
    json!([
      { "source": "t", "target": "d" },
      { "source": "d", "target": "a" }
    ]),
  ));
  engine.save_definition(&workflow).await.unwrap();

  let run_id = engine
    .start(&workflow, &created_event(json!({})))
    .await
    .unwrap();
  assert_eq!(
    store.get_run(&run_id).await.unwrap().status,
    RunStatus::Suspended
  );

  // Clobber the cursor so the resume claim succeeds but replay cannot.
  store
    .suspend_run(&run_id, &json!(42), Utc::now() - chrono::Duration::seconds(1))
    .await
    .unwrap();
  let err = engine.resume(&run_id).await.unwrap_err();
  assert!(matches!(err, EngineError::InvalidCursor { .. }));

  // The run must not be stranded in `running`.
  let run = store.get_run(&run_id).await.unwrap();
  assert_eq!(run.status, RunStatus::Failed);
  assert!(run.completed_at.is_some());
  assert!(recorder.messages().is_empty());
}

#[tokio::test]
async fn inactive_definitions_never_run() {
  let store = Arc::new(MemoryStore::new());
  let recorder = Arc::new(Recorder::default());
  let engine = engine_with(
    store.clone(),
    vec![(ActionType::CreateNotification, recorder.clone())],
  );

  let mut workflow = notify_workflow((
    json!([
      { "id": "t", "type": "trigger",
        "data": { "triggerType": "RECORD_CREATED", "objectName": "deal" } },
      { "id": "a", "type": "action",
        "data": { "actionType": "CREATE_NOTIFICATION", "config": { "message": "hi" } } }
    ]),
    json!([{ "source": "t", "target": "a" }]),
  ));
  workflow.is_active = false;
  engine.save_definition(&workflow).await.unwrap();

  let err = engine
    .start(&workflow, &created_event(json!({})))
    .await
    .unwrap_err();
  assert!(matches!(err, EngineError::Inactive { .. }));

  let started = engine
    .handle_event(&created_event(json!({})))
    .await
    .unwrap();
  assert!(started.is_empty());
  assert!(store.list_runs("wf").await.unwrap().is_empty());
}

#[tokio::test]
async fn handle_event_starts_one_run_per_matching_definition() {
  let store = Arc::new(MemoryStore::new());
  let recorder = Arc::new(Recorder::default());
  let engine = engine_with(
    store.clone(),
    vec![(ActionType::CreateNotification, recorder.clone())],
  );

  let deal_wf = def(json!({
    "id": "wf-deal", "name": "deal", "objectId": "deal",
    "trigger": { "type": "RECORD_CREATED" },
    "nodes": [
      { "id": "t", "type": "trigger",
        "data": { "triggerType": "RECORD_CREATED", "objectName": "deal" } },
      { "id": "a", "type": "action",
        "data": { "actionType": "CREATE_NOTIFICATION", "config": { "message": "deal" } } }
    ],
    "edges": [{ "source": "t", "target": "a" }]
  }));
  let contact_wf = def(json!({
    "id": "wf-contact", "name": "contact", "objectId": "contact",
    "trigger": { "type": "RECORD_CREATED" },
    "nodes": [
      { "id": "t", "type": "trigger",
        "data": { "triggerType": "RECORD_CREATED", "objectName": "contact" } },
      { "id": "a", "type": "action",
        "data": { "actionType": "CREATE_NOTIFICATION", "config": { "message": "contact" } } }
    ],
    "edges": [{ "source": "t", "target": "a" }]
  }));
  engine.save_definition(&deal_wf).await.unwrap();
  engine.save_definition(&contact_wf).await.unwrap();

  let started = engine
    .handle_event(&created_event(json!({})))
    .await
    .unwrap();
  assert_eq!(started.len(), 1);
  assert_eq!(recorder.messages(), vec!["deal"]);
  assert_eq!(store.list_runs("wf-deal").await.unwrap().len(), 1);
  assert!(store.list_runs("wf-contact").await.unwrap().is_empty());
}

#[tokio::test]
async fn save_rejects_invalid_graphs_and_unregistered_handlers() {
  let store = Arc::new(MemoryStore::new());
  let engine = engine_with(store.clone(), vec![]);

  let dangling = def(json!({
    "id": "wf", "name": "wf", "objectId": "deal",
    "trigger": { "type": "RECORD_CREATED" },
    "nodes": [
      { "id": "t", "type": "trigger",
        "data": { "triggerType": "RECORD_CREATED", "objectName": "deal" } }
    ],
    "edges": [{ "source": "t", "target": "ghost" }]
  }));
  assert!(matches!(
    engine.save_definition(&dangling).await.unwrap_err(),
    EngineError::Validation(_)
  ));

  let unroutable = def(json!({
    "id": "wf", "name": "wf", "objectId": "deal",
    "trigger": { "type": "RECORD_CREATED" },
    "nodes": [
      { "id": "t", "type": "trigger",
        "data": { "triggerType": "RECORD_CREATED", "objectName": "deal" } },
      { "id": "a", "type": "action",
        "data": { "actionType": "WEBHOOK", "config": { "url": "https://example.com" } } }
    ],
    "edges": [{ "source": "t", "target": "a" }]
  }));
  assert!(matches!(
    engine.save_definition(&unroutable).await.unwrap_err(),
    EngineError::UnregisteredHandler(ActionType::Webhook)
  ));
}

#[tokio::test]
async fn save_assigns_increasing_versions() {
  let store = Arc::new(MemoryStore::new());
  let recorder = Arc::new(Recorder::default());
  let engine = engine_with(
    store.clone(),
    vec![(ActionType::CreateNotification, recorder)],
  );

  let workflow = notify_workflow((
    json!([
      { "id": "t", "type": "trigger",
        "data": { "triggerType": "RECORD_CREATED", "objectName": "deal" } },
      { "id": "a", "type": "action",
        "data": { "actionType": "CREATE_NOTIFICATION", "config": { "message": "hi" } } }
    ]),
    json!([{ "source": "t", "target": "a" }]),
  ));

  assert_eq!(engine.save_definition(&workflow).await.unwrap(), 1);
  assert_eq!(engine.save_definition(&workflow).await.unwrap(), 2);
  assert_eq!(store.latest_definition("wf").await.unwrap().version, 2);
}
