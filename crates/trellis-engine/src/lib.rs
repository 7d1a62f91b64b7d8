//! Trellis Engine
//!
//! The execution half of the workflow automation system: deciding which
//! definitions an incoming domain event activates, walking the workflow
//! graph node by node, dispatching actions to registered handlers, and
//! recording every outcome on the run's audit trail.
//!
//! Runs execute independently and share nothing but the store. Within a run
//! traversal is strictly sequential along the active path; loop bodies
//! iterate in element order. A delay action is the only suspension point;
//! an external timer drives [`Engine::resume_due`].

mod cursor;
mod dispatch;
mod engine;
mod error;
mod handlers;
mod matcher;

pub use dispatch::{ActionError, ActionHandler, Dispatcher, ResolvedConfig, RetryPolicy};
pub use engine::Engine;
pub use error::EngineError;
pub use handlers::{AuditLogHandler, WebhookHandler};
pub use matcher::matches;
