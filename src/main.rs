use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use trellis_definition::{ActionType, DomainEvent, WorkflowDefinition};
use trellis_engine::{AuditLogHandler, Dispatcher, Engine, WebhookHandler};
use trellis_store::{SqliteStore, Store};
use trellis_workflow::Workflow;

/// Trellis - a workflow automation engine for CRM records
#[derive(Parser)]
#[command(name = "trellis")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.trellis)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Validate a workflow definition file without saving it
  Validate {
    /// Path to the definition file (JSON)
    workflow_file: PathBuf,
  },

  /// Validate and save a definition as a new version
  Save {
    /// Path to the definition file (JSON)
    workflow_file: PathBuf,
  },

  /// Feed a domain event (JSON on stdin) to all matching workflows
  Event,

  /// Resume suspended runs whose delay has elapsed
  ResumeDue,

  /// Cancel a run
  Cancel {
    run_id: String,
  },

  /// List runs for a definition
  Runs {
    definition_id: String,
  },

  /// List the per-node results of a run
  Results {
    run_id: String,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".trellis"),
  };

  let Some(command) = cli.command else {
    println!("trellis - use --help to see available commands");
    return Ok(());
  };

  // Validation needs no store.
  if let Commands::Validate { workflow_file } = &command {
    let def = load_definition(workflow_file).await?;
    match Workflow::compile(def) {
      Ok(workflow) => {
        println!(
          "ok: {} ({} nodes)",
          workflow.definition().name,
          workflow.definition().nodes.len()
        );
        return Ok(());
      }
      Err(violations) => {
        for violation in &violations {
          eprintln!("{}", violation);
        }
        bail!("definition has {} violation(s)", violations.len());
      }
    }
  }

  tokio::fs::create_dir_all(&data_dir)
    .await
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;
  let store = SqliteStore::open(&data_dir.join("trellis.db"))
    .await
    .context("failed to open store")?;
  let engine = Engine::new(Arc::new(store), Arc::new(dispatcher()));

  match command {
    Commands::Validate { .. } => unreachable!("handled above"),
    Commands::Save { workflow_file } => {
      let def = load_definition(&workflow_file).await?;
      let version = engine
        .save_definition(&def)
        .await
        .context("failed to save definition")?;
      println!("saved {} as version {}", def.id, version);
    }
    Commands::Event => {
      let payload = read_stdin()?;
      let event: DomainEvent =
        serde_json::from_str(&payload).context("failed to parse event JSON from stdin")?;
      let run_ids = engine.handle_event(&event).await?;
      eprintln!("started {} run(s)", run_ids.len());
      for run_id in run_ids {
        println!("{}", run_id);
      }
    }
    Commands::ResumeDue => {
      let resumed = engine.resume_due(chrono::Utc::now()).await?;
      eprintln!("resumed {} run(s)", resumed.len());
      for run_id in resumed {
        println!("{}", run_id);
      }
    }
    Commands::Cancel { run_id } => {
      engine.cancel(&run_id).await?;
      println!("cancelled {}", run_id);
    }
    Commands::Runs { definition_id } => {
      let runs = engine.store().list_runs(&definition_id).await?;
      println!("{}", serde_json::to_string_pretty(&runs)?);
    }
    Commands::Results { run_id } => {
      let results = engine.store().list_results(&run_id).await?;
      println!("{}", serde_json::to_string_pretty(&results)?);
    }
  }

  Ok(())
}

/// CRM-side actions log their resolved config until the surrounding system
/// registers real handlers; webhooks deliver for real.
fn dispatcher() -> Dispatcher {
  let mut dispatcher = Dispatcher::new();
  dispatcher.register(ActionType::Webhook, Arc::new(WebhookHandler::new()));
  for (action_type, name) in [
    (ActionType::SendEmail, "send_email"),
    (ActionType::SendTelegram, "send_telegram"),
    (ActionType::CreateTask, "create_task"),
    (ActionType::CreateNotification, "create_notification"),
    (ActionType::UpdateField, "update_field"),
  ] {
    dispatcher.register(action_type, Arc::new(AuditLogHandler::new(name)));
  }
  dispatcher
}

async fn load_definition(path: &Path) -> Result<WorkflowDefinition> {
  let content = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read definition file: {}", path.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse definition file: {}", path.display()))
}

fn read_stdin() -> Result<String> {
  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read from stdin")?;
  if input.trim().is_empty() {
    bail!("expected JSON on stdin");
  }
  Ok(input)
}
