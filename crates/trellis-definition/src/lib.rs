//! Trellis Definition
//!
//! This crate contains the serializable workflow definition types for Trellis.
//! These types represent automation workflows exactly as the authoring UI
//! produces them: a trigger spec, a graph of nodes and edges, and run-scoped
//! variable declarations.
//!
//! Definitions can be loaded from:
//! - JSON files (via CLI with `trellis validate workflow.json`)
//! - Database storage (as JSON blobs, one row per version)
//!
//! The engine takes these definition types, validates them structurally, and
//! compiles them into an indexed workflow for execution.

mod definition;
mod edge;
mod enums;
mod event;
mod node;
mod trigger;

pub use definition::{RESERVED_ROOTS, VariableDef, WorkflowDefinition, valid_variable_name};
pub use edge::Edge;
pub use enums::{ActionType, ComparisonOperator, DelayUnit, EventType, LogicOp, Port};
pub use event::DomainEvent;
pub use node::{ActionData, ConditionData, ConditionTerm, LoopData, NodeData, NodeDef, TriggerData};
pub use trigger::TriggerSpec;
