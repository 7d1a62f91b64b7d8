use thiserror::Error;
use trellis_definition::ActionType;
use trellis_workflow::ValidationError;

#[derive(Debug, Error)]
pub enum EngineError {
  /// Inactive definitions never produce runs.
  #[error("definition '{definition_id}' is not active")]
  Inactive { definition_id: String },

  #[error("definition failed validation: {0:?}")]
  Validation(Vec<ValidationError>),

  #[error("no handler registered for action type {0}")]
  UnregisteredHandler(ActionType),

  #[error("run '{run_id}' has no usable suspension cursor")]
  InvalidCursor { run_id: String },

  #[error("run cursor references unknown node '{node_id}'")]
  CursorNode { node_id: String },

  #[error(transparent)]
  Store(#[from] trellis_store::Error),

  #[error(transparent)]
  Template(#[from] trellis_template::TemplateError),
}
