//! Trellis Template
//!
//! Run-scoped data context, `{{dotted.path}}` template resolution, and
//! condition evaluation.
//!
//! Templates are rendered with minijinja against an explicit [`Context`]
//! value; there is no ambient state, so resolution is deterministic and
//! testable in isolation. Resolution is best-effort: missing paths render to
//! the empty string and malformed templates pass through unchanged, because
//! user data is often sparse and a broken token must never fail a run.

mod condition;
mod context;
mod error;
mod resolve;

pub use condition::{evaluate, evaluate_chain};
pub use context::Context;
pub use error::TemplateError;
pub use resolve::{resolve, resolve_config};
