//! Run scheduling and graph traversal.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use trellis_definition::{ActionType, DelayUnit, DomainEvent, NodeData, Port, WorkflowDefinition};
use trellis_store::{ActionResult, ActionStatus, ExecutionRun, Json, RunStatus, Store};
use trellis_template::{Context, evaluate_chain, resolve_config};
use trellis_workflow::Workflow;

use crate::cursor::{Cursor, LoopFrame};
use crate::dispatch::Dispatcher;
use crate::error::EngineError;
use crate::matcher::matches;

/// How a traversal ended. `Suspended` runs come back through
/// [`Engine::resume`] when their delay elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
  Completed,
  Suspended,
  Failed,
  Cancelled,
}

/// The workflow engine: matches events to definitions, starts runs, walks
/// the graph, and persists every outcome through the [`Store`].
pub struct Engine<S: Store> {
  store: Arc<S>,
  dispatcher: Arc<Dispatcher>,
  /// Cancellation tokens for runs currently traversing in this process.
  live: Mutex<HashMap<String, CancellationToken>>,
}

impl<S: Store> Engine<S> {
  pub fn new(store: Arc<S>, dispatcher: Arc<Dispatcher>) -> Self {
    Self {
      store,
      dispatcher,
      live: Mutex::new(HashMap::new()),
    }
  }

  pub fn store(&self) -> &Arc<S> {
    &self.store
  }

  /// Validate a definition and persist it as a new immutable version.
  ///
  /// Rejects graphs that fail structural validation and definitions using an
  /// action type with no registered handler, so a saved definition is always
  /// runnable.
  pub async fn save_definition(&self, def: &WorkflowDefinition) -> Result<i64, EngineError> {
    let workflow = Workflow::compile(def.clone()).map_err(EngineError::Validation)?;
    for node in &workflow.definition().nodes {
      if let NodeData::Action(data) = &node.data {
        // The scheduler itself handles delays.
        if data.action_type != ActionType::Delay && !self.dispatcher.has_handler(data.action_type) {
          return Err(EngineError::UnregisteredHandler(data.action_type));
        }
      }
    }
    Ok(self.store.save_definition(def).await?)
  }

  /// Match an event against all active definitions for its object type and
  /// start a run per match. Returns the IDs of the runs started; one run
  /// failing to start does not affect the others.
  #[instrument(skip(self, event), fields(event_type = ?event.event_type, object_type = %event.object_type))]
  pub async fn handle_event(&self, event: &DomainEvent) -> Result<Vec<String>, EngineError> {
    let definitions = self.store.active_definitions(&event.object_type).await?;
    let matched: Vec<_> = definitions
      .into_iter()
      .filter(|def| matches(def, event))
      .collect();

    let starts = matched.iter().map(|def| self.start(def, event));
    let results = futures::future::join_all(starts).await;

    let mut run_ids = Vec::new();
    for (def, result) in matched.iter().zip(results) {
      match result {
        Ok(run_id) => run_ids.push(run_id),
        Err(err) => {
          error!(definition_id = %def.id, error = %err, "run failed to start");
        }
      }
    }
    Ok(run_ids)
  }

  /// Start one run of a definition against a triggering event.
  ///
  /// The run pins `(definition_id, version)` and `resume` reloads the
  /// definition from the store by that pair, so the exact version must
  /// already be saved; starting an unsaved definition is refused before any
  /// run is created.
  #[instrument(skip(self, def, event), fields(definition_id = %def.id, version = def.version))]
  pub async fn start(
    &self,
    def: &WorkflowDefinition,
    event: &DomainEvent,
  ) -> Result<String, EngineError> {
    let stored = self.store.get_definition(&def.id, def.version).await?;
    if !stored.is_active {
      return Err(EngineError::Inactive {
        definition_id: stored.id.clone(),
      });
    }
    let workflow = Workflow::compile(stored).map_err(EngineError::Validation)?;
    let def = workflow.definition();

    let run_id = uuid::Uuid::new_v4().to_string();
    let run = ExecutionRun {
      run_id: run_id.clone(),
      definition_id: def.id.clone(),
      definition_version: def.version,
      status: RunStatus::Pending,
      event: Json(event.clone()),
      cursor: None,
      wake_at: None,
      started_at: Utc::now(),
      completed_at: None,
    };
    self.store.create_run(&run).await?;
    self
      .store
      .update_run_status(&run_id, RunStatus::Running, None)
      .await?;
    info!(run_id = %run_id, definition_id = %def.id, "run_started");

    let mut ctx = Context::from_event(event);
    for var in &def.variables {
      ctx.set_var(&var.name, var.default.clone())?;
    }

    let next = workflow.entry().map(String::from);
    self
      .drive(&workflow, &run_id, &mut ctx, next, Vec::new())
      .await?;
    Ok(run_id)
  }

  /// Resume a suspended run whose delay has elapsed.
  ///
  /// The `suspended -> running` claim is atomic in the store, so concurrent
  /// resumes of one run collapse to a single traversal; losers get
  /// [`trellis_store::Error::Conflict`].
  #[instrument(skip(self))]
  pub async fn resume(&self, run_id: &str) -> Result<(), EngineError> {
    let run = self.store.claim_resume(run_id).await?;

    // The claim has already moved the run to `running`; any failure from
    // here on must leave it terminal, not stranded.
    let (workflow, mut ctx, cursor) = match self.prepare_resume(run_id, run).await {
      Ok(prepared) => prepared,
      Err(err) => {
        error!(run_id, error = %err, "run_failed");
        let _ = self
          .store
          .update_run_status(run_id, RunStatus::Failed, Some(Utc::now()))
          .await;
        return Err(err);
      }
    };
    info!(run_id, next = ?cursor.next, "run_resumed");

    self
      .drive(&workflow, run_id, &mut ctx, cursor.next, cursor.frames)
      .await?;
    Ok(())
  }

  async fn prepare_resume(
    &self,
    run_id: &str,
    run: ExecutionRun,
  ) -> Result<(Workflow, Context, Cursor), EngineError> {
    let def = self
      .store
      .get_definition(&run.definition_id, run.definition_version)
      .await?;
    let workflow = Workflow::compile(def).map_err(EngineError::Validation)?;

    let cursor: Cursor = match run.cursor {
      Some(Json(value)) => serde_json::from_value(value).map_err(|_| EngineError::InvalidCursor {
        run_id: run_id.to_string(),
      })?,
      None => {
        return Err(EngineError::InvalidCursor {
          run_id: run_id.to_string(),
        });
      }
    };

    let mut ctx = Context::from_event(&run.event.0);
    for (name, value) in cursor.vars.clone() {
      ctx.bind_item(&name, value);
    }
    Ok((workflow, ctx, cursor))
  }

  /// Resume every suspended run whose wake time has passed. The external
  /// timer calls this on its tick; runs claimed by another process in the
  /// meantime are skipped silently.
  pub async fn resume_due(&self, now: DateTime<Utc>) -> Result<Vec<String>, EngineError> {
    let due = self.store.due_runs(now).await?;
    let mut resumed = Vec::new();
    for run in due {
      match self.resume(&run.run_id).await {
        Ok(()) => resumed.push(run.run_id),
        Err(EngineError::Store(trellis_store::Error::Conflict(_))) => continue,
        Err(err) => {
          error!(run_id = %run.run_id, error = %err, "resume failed");
        }
      }
    }
    Ok(resumed)
  }

  /// Cancel a run. A live traversal stops at its next node boundary; a
  /// suspended or pending run is marked cancelled directly.
  pub async fn cancel(&self, run_id: &str) -> Result<(), EngineError> {
    let token = self.lock_live().get(run_id).cloned();
    if let Some(token) = token {
      token.cancel();
      return Ok(());
    }
    let run = self.store.get_run(run_id).await?;
    if !run.status.is_terminal() {
      self
        .store
        .update_run_status(run_id, RunStatus::Cancelled, Some(Utc::now()))
        .await?;
      info!(run_id, "run_cancelled");
    }
    Ok(())
  }

  /// Run a traversal with a registered cancellation token and record the
  /// terminal status. A store failure mid-run marks the run failed.
  async fn drive(
    &self,
    workflow: &Workflow,
    run_id: &str,
    ctx: &mut Context,
    next: Option<String>,
    frames: Vec<LoopFrame>,
  ) -> Result<Outcome, EngineError> {
    let cancel = CancellationToken::new();
    self
      .lock_live()
      .insert(run_id.to_string(), cancel.clone());
    let result = self
      .traverse(workflow, run_id, ctx, next, frames, &cancel)
      .await;
    self.lock_live().remove(run_id);

    match result {
      Ok(outcome) => Ok(outcome),
      Err(err) => {
        error!(run_id, error = %err, "run_failed");
        let _ = self
          .store
          .update_run_status(run_id, RunStatus::Failed, Some(Utc::now()))
          .await;
        Err(err)
      }
    }
  }

  /// Walk the graph from `next` until the path ends, an action fails, a
  /// delay suspends the run, or cancellation is observed at a node boundary.
  async fn traverse(
    &self,
    workflow: &Workflow,
    run_id: &str,
    ctx: &mut Context,
    next: Option<String>,
    mut frames: Vec<LoopFrame>,
    cancel: &CancellationToken,
  ) -> Result<Outcome, EngineError> {
    let mut current = next;
    loop {
      let Some(node_id) = current.take() else {
        // Natural end of the active path: advance the innermost loop or,
        // with no frames left, the run is complete.
        match self.advance_frames(workflow, ctx, &mut frames) {
          Some(node_id) => {
            current = Some(node_id);
            continue;
          }
          None => {
            if frames.is_empty() {
              return self.finish(run_id, RunStatus::Completed).await;
            }
            // A frame advanced onto a missing successor; keep unwinding.
            continue;
          }
        }
      };

      if cancel.is_cancelled() {
        self
          .store
          .append_result(&skipped(run_id, &node_id))
          .await?;
        warn!(run_id, node_id, "run cancelled at node boundary");
        return self.finish(run_id, RunStatus::Cancelled).await;
      }

      let node = workflow
        .node(&node_id)
        .ok_or_else(|| EngineError::CursorNode {
          node_id: node_id.clone(),
        })?;

      match &node.data {
        NodeData::Trigger(_) => {
          current = workflow.successor(&node_id, None).map(String::from);
        }
        NodeData::Condition(data) => {
          let port = if evaluate_chain(data, ctx) {
            Port::True
          } else {
            Port::False
          };
          current = workflow.successor(&node_id, Some(port)).map(String::from);
        }
        NodeData::Loop(data) => {
          let mut items = resolve_collection(&data.collection, ctx);
          if items.is_empty() {
            current = workflow
              .successor(&node_id, Some(Port::Exit))
              .map(String::from);
          } else {
            let first = items.remove(0);
            ctx.bind_item(&data.item_variable, first.clone());
            frames.push(LoopFrame {
              loop_id: node_id.clone(),
              item_variable: data.item_variable.clone(),
              current: first,
              remaining: items,
            });
            current = workflow
              .successor(&node_id, Some(Port::Body))
              .map(String::from);
          }
        }
        NodeData::Action(data) if data.action_type == ActionType::Delay => {
          let resolved = resolve_config(&data.config, ctx);
          let seconds = delay_seconds(&resolved);
          let successor = workflow.successor(&node_id, None).map(String::from);

          if seconds <= 0 {
            warn!(run_id, node_id, seconds, "non-positive delay, continuing");
            self
              .store
              .append_result(&delay_result(run_id, &node_id, seconds, None))
              .await?;
            current = successor;
            continue;
          }

          let wake_at = Utc::now() + chrono::Duration::seconds(seconds);
          self
            .store
            .append_result(&delay_result(run_id, &node_id, seconds, Some(wake_at)))
            .await?;
          let cursor = Cursor {
            next: successor,
            frames,
            vars: ctx.variables(),
          };
          let cursor = serde_json::to_value(&cursor).map_err(trellis_store::Error::from)?;
          self.store.suspend_run(run_id, &cursor, wake_at).await?;
          info!(run_id, node_id, wake_at = %wake_at, "run_suspended");
          return Ok(Outcome::Suspended);
        }
        NodeData::Action(data) => {
          let resolved = resolve_config(&data.config, ctx);
          let result = self
            .dispatcher
            .dispatch(run_id, &node_id, data.action_type, &resolved)
            .await;
          let failed = result.status == ActionStatus::Failed;
          self.store.append_result(&result).await?;
          if failed {
            return self.finish(run_id, RunStatus::Failed).await;
          }
          current = workflow.successor(&node_id, None).map(String::from);
        }
      }
    }
  }

  /// Advance the innermost loop frame: bind the next element and re-enter
  /// the body, or pop the exhausted frame and leave through `exit`.
  fn advance_frames(
    &self,
    workflow: &Workflow,
    ctx: &mut Context,
    frames: &mut Vec<LoopFrame>,
  ) -> Option<String> {
    let frame = frames.last_mut()?;
    if frame.remaining.is_empty() {
      let frame = frames.pop()?;
      ctx.unbind(&frame.item_variable);
      // An outer loop may use the same variable name; restore its binding.
      if let Some(outer) = frames
        .iter()
        .rev()
        .find(|f| f.item_variable == frame.item_variable)
      {
        ctx.bind_item(&outer.item_variable, outer.current.clone());
      }
      workflow
        .successor(&frame.loop_id, Some(Port::Exit))
        .map(String::from)
    } else {
      frame.current = frame.remaining.remove(0);
      ctx.bind_item(&frame.item_variable, frame.current.clone());
      workflow
        .successor(&frame.loop_id, Some(Port::Body))
        .map(String::from)
    }
  }

  async fn finish(&self, run_id: &str, status: RunStatus) -> Result<Outcome, EngineError> {
    self
      .store
      .update_run_status(run_id, status, Some(Utc::now()))
      .await?;
    let outcome = match status {
      RunStatus::Completed => {
        info!(run_id, "run_completed");
        Outcome::Completed
      }
      RunStatus::Cancelled => {
        info!(run_id, "run_cancelled");
        Outcome::Cancelled
      }
      _ => {
        error!(run_id, "run_failed");
        Outcome::Failed
      }
    };
    Ok(outcome)
  }

  fn lock_live(&self) -> std::sync::MutexGuard<'_, HashMap<String, CancellationToken>> {
    self.live.lock().unwrap_or_else(|e| e.into_inner())
  }
}

/// Resolve a loop's collection expression to its elements. The expression is
/// a dotted context path, with or without `{{ }}` wrapping; anything that is
/// not an array iterates zero times.
fn resolve_collection(expr: &str, ctx: &Context) -> Vec<Value> {
  let path = expr.trim();
  let path = path
    .strip_prefix("{{")
    .and_then(|p| p.strip_suffix("}}"))
    .map(str::trim)
    .unwrap_or(path);
  match ctx.lookup(path) {
    Some(Value::Array(items)) => items.clone(),
    _ => Vec::new(),
  }
}

/// Total delay in whole seconds. `duration` may be a number or a (possibly
/// templated) numeric string; anything unparseable counts as zero.
fn delay_seconds(config: &serde_json::Map<String, Value>) -> i64 {
  let duration = match config.get("duration") {
    Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
    Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
    _ => 0.0,
  };
  let unit = config
    .get("unit")
    .and_then(|v| serde_json::from_value::<DelayUnit>(v.clone()).ok())
    .unwrap_or(DelayUnit::Seconds);
  (duration * unit.seconds() as f64).round() as i64
}

fn skipped(run_id: &str, node_id: &str) -> ActionResult {
  ActionResult {
    result_id: uuid::Uuid::new_v4().to_string(),
    run_id: run_id.to_string(),
    node_id: node_id.to_string(),
    status: ActionStatus::Skipped,
    output: None,
    error: Some("run cancelled".to_string()),
    created_at: Utc::now(),
  }
}

fn delay_result(
  run_id: &str,
  node_id: &str,
  seconds: i64,
  wake_at: Option<DateTime<Utc>>,
) -> ActionResult {
  let output = match wake_at {
    Some(at) => json!({ "durationSeconds": seconds, "wakeAt": at.to_rfc3339() }),
    None => json!({ "durationSeconds": seconds }),
  };
  ActionResult {
    result_id: uuid::Uuid::new_v4().to_string(),
    run_id: run_id.to_string(),
    node_id: node_id.to_string(),
    status: ActionStatus::Succeeded,
    output: Some(Json(output)),
    error: None,
    created_at: Utc::now(),
  }
}
