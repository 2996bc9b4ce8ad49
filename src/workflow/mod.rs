//! Workflow Definition Module
//!
//! Provides data structures and utilities for defining, loading, and
//! validating scenario workflows.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (Workflow, Job, Step, Repeat)
//! - [`parser`]: YAML loading and the `--init` template
//! - [`validator`]: Structural rules checked before scheduling

pub mod model;
pub mod parser;
pub mod validator;

pub use model::{Job, Mapping, Repeat, Step, Workflow};
pub use parser::{load_workflow, parse_workflow, LoadError};
pub use validator::{validate_workflow, ValidationError};
