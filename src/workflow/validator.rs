//! Workflow Validation
//!
//! Structural checks run on a loaded workflow before any scheduling:
//! - Required names and action identifiers
//! - Non-empty job and step lists
//! - Repeat bounds

use std::collections::HashSet;

use log::{debug, info, warn};
use thiserror::Error;

use super::model::{Job, Step, Workflow};

/// Upper bound (exclusive) for `repeat.count`.
pub const MAX_REPEAT_COUNT: u32 = 100;

/// Upper bound (exclusive) for `repeat.interval`, in seconds.
pub const MAX_REPEAT_INTERVAL: u64 = 600;

/// Validation error types for user-friendly error messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Workflow has no name")]
    EmptyWorkflowName,

    #[error("Workflow has no jobs")]
    NoJobs,

    #[error("Job #{0} has no name")]
    EmptyJobName(usize),

    #[error("Job '{0}' has no steps")]
    NoSteps(String),

    #[error("Step '{step}' in job '{job}' has no action (uses)")]
    EmptyUses { job: String, step: String },

    #[error("Job '{job}': repeat count {count} must be below {max}", max = MAX_REPEAT_COUNT)]
    RepeatCountOutOfRange { job: String, count: u32 },

    #[error("Job '{job}': repeat interval {interval}s must be below {max}s", max = MAX_REPEAT_INTERVAL)]
    RepeatIntervalOutOfRange { job: String, interval: u64 },
}

/// Label for a step in error messages: its name, or its position.
fn step_label(step: &Step, index: usize) -> String {
    if step.name.is_empty() {
        format!("#{}", index)
    } else {
        step.name.clone()
    }
}

/// Validates a single job's fields.
fn validate_job(job: &Job, index: usize) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if job.name.trim().is_empty() {
        errors.push(ValidationError::EmptyJobName(index));
    }

    let job_label = if job.name.is_empty() {
        format!("#{}", index)
    } else {
        job.name.clone()
    };

    if job.steps.is_empty() {
        errors.push(ValidationError::NoSteps(job_label.clone()));
    }

    for (step_index, step) in job.steps.iter().enumerate() {
        if step.uses.trim().is_empty() {
            errors.push(ValidationError::EmptyUses {
                job: job_label.clone(),
                step: step_label(step, step_index),
            });
        }
    }

    if let Some(repeat) = job.repeat {
        if repeat.count >= MAX_REPEAT_COUNT {
            errors.push(ValidationError::RepeatCountOutOfRange {
                job: job_label.clone(),
                count: repeat.count,
            });
        }
        if repeat.interval >= MAX_REPEAT_INTERVAL {
            errors.push(ValidationError::RepeatIntervalOutOfRange {
                job: job_label.clone(),
                interval: repeat.interval,
            });
        }
        debug!(
            "Job '{}' repeats {} times every {}s",
            job_label,
            repeat.runs(),
            repeat.interval
        );
    }

    errors
}

/// Validates the entire workflow structure.
///
/// All rule violations are collected so a single lint pass reports
/// everything at once. Duplicate job names are allowed but warned about.
pub fn validate_workflow(workflow: &Workflow) -> Result<(), Vec<ValidationError>> {
    info!("Validating workflow with {} jobs", workflow.jobs.len());

    let mut errors = Vec::new();

    if workflow.name.trim().is_empty() {
        errors.push(ValidationError::EmptyWorkflowName);
    }

    if workflow.jobs.is_empty() {
        errors.push(ValidationError::NoJobs);
    }

    let mut seen_names: HashSet<&str> = HashSet::new();
    for (index, job) in workflow.jobs.iter().enumerate() {
        errors.extend(validate_job(job, index));

        if !job.name.is_empty() && !seen_names.insert(job.name.as_str()) {
            warn!("Duplicate job name '{}': reports will be ambiguous", job.name);
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    info!(
        "Workflow validated: {} jobs, {} steps",
        workflow.jobs.len(),
        workflow.step_count()
    );
    Ok(())
}
