//! Probe - Scenario Testing Engine
//!
//! Runs declared workflows of jobs and steps, where each step invokes a
//! named action (a greeting test, an HTTP call, an SMTP probe...) and later
//! steps can read the results of earlier ones through templated input.
//!
//! # Architecture
//!
//! The library is organized into four main modules:
//!
//! - [`workflow`]: Definition types, YAML loading and validation
//! - [`execution`]: Scheduler, job and step runners, expression evaluation
//! - [`actions`]: Dispatcher seam with in-process and process plugin backends
//! - [`monitoring`]: Step reports, run summary and execution timeline
//!
//! # Example
//!
//! ```rust,no_run
//! use probe::execution::Engine;
//! use probe::load_workflow;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load and validate a workflow from YAML
//!     let workflow = load_workflow("probe.yaml")?;
//!
//!     // Builtin actions plus plugins from the default directory
//!     let engine = Engine::with_builtins();
//!
//!     // Jobs run concurrently; step errors land in the summary
//!     let summary = engine.run(&workflow)?;
//!     println!("{} failed steps", summary.failed_steps());
//!     Ok(())
//! }
//! ```

pub mod actions;
pub mod execution;
pub mod monitoring;
pub mod workflow;

// Re-export commonly used types
pub use actions::{ActionsConfig, Dispatcher};
pub use execution::engine::{Engine, RunSummary};
pub use workflow::model::{Job, Step, Workflow};
pub use workflow::parser::load_workflow;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "Probe";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "Probe");
    }

    #[test]
    fn test_module_exports_step() {
        let step = Step::new("greet", "hello");
        assert_eq!(step.name, "greet");
        assert_eq!(step.uses, "hello");
    }

    #[test]
    fn test_module_exports_workflow() {
        let workflow = Workflow::new("smoke").with_job(Job::new("J1"));
        assert_eq!(workflow.len(), 1);
        assert!(!workflow.is_empty());
    }

    #[test]
    fn test_version_format() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert!(parts.len() >= 2, "Version should have at least major.minor");
        for part in parts {
            assert!(part.parse::<u32>().is_ok(), "Version components should be numeric");
        }
    }
}
