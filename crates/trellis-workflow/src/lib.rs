//! Trellis Workflow
//!
//! This crate provides the compiled workflow representation for Trellis.
//! A compiled workflow is a validated definition with its edges indexed by
//! `(node, port)`, ready for traversal by the scheduler.
//!
//! Key differences from `trellis-definition`:
//! - Graph structure is validated (single trigger, reachability, complete
//!   branch ports, required config keys, no action-free cycles)
//! - Successor lookup is O(1) per step
//! - Validation reports *every* violation, not just the first

mod error;
mod graph;
mod validate;
mod workflow;

pub use error::ValidationError;
pub use graph::Graph;
pub use validate::validate;
pub use workflow::Workflow;
