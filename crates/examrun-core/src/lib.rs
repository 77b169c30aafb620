//! examrun-core — Timed exam sessions, deadlines, and review reconciliation.
//!
//! This crate defines the data model, collaborator traits, the execution
//! session state machine, and the scoring logic that the rest of examrun
//! builds on.

pub mod clock;
pub mod deadline;
pub mod engine;
pub mod error;
pub mod model;
pub mod parser;
pub mod presentation;
pub mod reconcile;
pub mod report;
pub mod session;
pub mod traits;
