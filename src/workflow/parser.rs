//! Workflow Parser
//!
//! Handles loading workflow definitions from YAML files, and writing
//! the starter template used by `probe --init`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};
use thiserror::Error;

use super::model::Workflow;
use super::validator::{validate_workflow, ValidationError};

/// Template written by `probe --init`.
const INIT_TEMPLATE: &str = r#"name: Example scenario
jobs:
  - name: Greetings
    defaults:
      name: probe
    steps:
      - name: Say hello
        uses: hello
      - name: Reply with the previous greeting
        uses: hello
        with:
          name: "{{ steps.0.response.bodyjson.message }}"
  - name: Repeated greeting
    repeat:
      count: 3
      interval: 1
    steps:
      - name: Greet the current user
        uses: hello
        with:
          name: "{{ env.USER }}"
"#;

/// Errors raised while loading or writing workflow files.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read workflow file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse workflow YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid workflow:\n{}", format_validation_errors(.0))]
    Invalid(Vec<ValidationError>),

    #[error("Refusing to overwrite existing file '{}'", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses and validates a workflow from YAML text.
pub fn parse_workflow(yaml: &str) -> Result<Workflow, LoadError> {
    let workflow: Workflow = serde_yaml::from_str(yaml)?;

    info!(
        "Parsed workflow '{}': {} jobs, {} steps",
        workflow.name,
        workflow.jobs.len(),
        workflow.step_count()
    );

    validate_workflow(&workflow).map_err(LoadError::Invalid)?;
    Ok(workflow)
}

/// Loads a workflow from a YAML file.
///
/// Definition errors are fatal: any read, parse, or validation failure is
/// returned before anything is scheduled.
///
/// # Example
///
/// ```rust,no_run
/// use probe::workflow::load_workflow;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let workflow = load_workflow("probe.yaml")?;
///     println!("Loaded {} jobs", workflow.jobs.len());
///     Ok(())
/// }
/// ```
pub fn load_workflow(path: impl AsRef<Path>) -> Result<Workflow, LoadError> {
    let path = path.as_ref();
    info!("Loading workflow from: {}", path.display());

    let yaml_content = fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    debug!("YAML content loaded ({} bytes)", yaml_content.len());

    parse_workflow(&yaml_content)
}

/// Returns the starter workflow template.
pub fn init_template() -> &'static str {
    INIT_TEMPLATE
}

/// Writes the starter template to `path`, never overwriting a file.
pub fn write_template(path: impl AsRef<Path>) -> Result<(), LoadError> {
    let path = path.as_ref();
    if path.exists() {
        return Err(LoadError::AlreadyExists(path.to_path_buf()));
    }

    fs::write(path, INIT_TEMPLATE).map_err(|source| LoadError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Template written to: {}", path.display());
    Ok(())
}
