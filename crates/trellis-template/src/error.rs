use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
  #[error("variable name '{0}' is reserved")]
  ReservedName(String),

  #[error("invalid variable name '{0}' (alphanumeric and underscore only)")]
  InvalidName(String),
}
