//! Workflow Execution Module
//!
//! Runs loaded workflows: jobs in parallel, steps in sequence, repeats in
//! timed sequence, with each run threading its own execution context.
//!
//! # Architecture
//!
//! - [`engine`]: Scheduler fanning jobs out and joining them
//! - [`job`]: Sequential step runs and timed repetitions
//! - [`step`]: Individual step execution logic
//! - [`expression`]: Template parsing and resolution
//! - [`context`]: Environment snapshot, step log and step results

pub mod context;
pub mod engine;
pub mod expression;
pub mod job;
pub mod step;

pub use context::{Environment, ErrorInfo, ErrorKind, ExecutionContext, StepResult};
pub use engine::{Engine, EngineError, RunSummary};
pub use expression::{evaluate, ExpressionError, Reference, Template};
pub use job::{JobRunReport, JobRunner};
pub use step::StepRunner;
