//! Individual Step Execution
//!
//! Handles the execution of a single workflow step including:
//! - Template evaluation against the job's context
//! - Dispatch to the action, bounded by the optional step deadline
//! - Folding the result (and `bodyjson`) into the step log
//! - Reporting

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use serde_json::Value;

use crate::actions::{DispatchError, Dispatcher};
use crate::monitoring::report::{format_step_line, format_step_report};
use crate::workflow::{Mapping, Step};

use super::context::{ErrorInfo, ExecutionContext, StepResult};
use super::expression::evaluate;

/// Executes steps against a dispatcher.
///
/// Failures never escape a step: evaluation and dispatch errors are
/// recorded in the appended [`StepResult`] and the caller moves on.
#[derive(Clone)]
pub struct StepRunner {
    dispatcher: Arc<dyn Dispatcher>,
    step_timeout: Option<Duration>,
    verbose: bool,
}

impl StepRunner {
    pub fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            dispatcher,
            step_timeout: None,
            verbose: false,
        }
    }

    /// Sets the per-step deadline applied to every dispatch.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Enables the full per-field report instead of one status line.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Executes `step` as the `index`-th step of the run owning `ctx`.
    pub async fn run<'c>(
        &self,
        step: &Step,
        ctx: &'c mut ExecutionContext,
        index: usize,
    ) -> &'c StepResult {
        self.run_with_defaults(step, &Value::Null, ctx, index).await
    }

    /// Like [`StepRunner::run`], filling missing input keys from job defaults.
    pub async fn run_with_defaults<'c>(
        &self,
        step: &Step,
        defaults: &Value,
        ctx: &'c mut ExecutionContext,
        index: usize,
    ) -> &'c StepResult {
        let started_at = Utc::now();
        let template = step.input_with_defaults(defaults);

        let result = match evaluate(&template, ctx) {
            Err(e) => {
                warn!(
                    "[{}] Step {} '{}' not dispatched: {}",
                    ctx.label,
                    index,
                    step.display_name(),
                    e
                );
                StepResult::failed(step, Mapping::new(), ErrorInfo::from(&e), started_at)
            }
            Ok(input) => {
                debug!(
                    "[{}] Dispatching step {} '{}' to '{}'",
                    ctx.label,
                    index,
                    step.display_name(),
                    step.uses
                );

                match self.dispatch(&step.uses, input.clone()).await {
                    Ok(output) => StepResult::completed(step, input, output, started_at),
                    Err(e) => {
                        warn!(
                            "[{}] Step {} '{}' failed: {}",
                            ctx.label,
                            index,
                            step.display_name(),
                            e
                        );
                        StepResult::failed(step, input, ErrorInfo::from(&e), started_at)
                    }
                }
            }
        };

        self.report(&ctx.label, index, &result);
        ctx.push(result)
    }

    /// Single dispatch attempt, abandoned when the deadline expires.
    ///
    /// Process plugins are killed on timeout; in-process actions keep
    /// running on their blocking thread but their result is discarded.
    async fn dispatch(&self, action_id: &str, input: Mapping) -> Result<Mapping, DispatchError> {
        let call = self.dispatcher.dispatch(action_id, input);

        match self.step_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| DispatchError::Timeout {
                    action: action_id.to_string(),
                    after: limit,
                })?,
            None => call.await,
        }
    }

    fn report(&self, label: &str, index: usize, result: &StepResult) {
        if self.verbose {
            print!("{}", format_step_report(label, index, result));
        } else {
            info!("{}", format_step_line(label, index, result));
        }
    }
}
