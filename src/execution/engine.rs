//! Workflow Execution Engine
//!
//! The scheduler at the top of a run:
//! - Snapshots the environment once into the root execution context
//! - Fans every job out onto its own task with a forked context
//! - Joins all jobs (and their repetitions) before returning
//! - Hands back per-run reports and timing for the summary and timeline

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, info};
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};

use crate::actions::{ActionsConfig, Dispatcher, Router};
use crate::monitoring::ExecutionTimeline;
use crate::workflow::Workflow;

use super::context::{Environment, ExecutionContext};
use super::job::{JobRunReport, JobRunner};
use super::step::StepRunner;

/// Process-level failures; step failures never surface here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to start async runtime: {0}")]
    Runtime(#[from] io::Error),

    #[error("Job task failed: {0}")]
    TaskFailed(String),
}

impl From<JoinError> for EngineError {
    fn from(error: JoinError) -> Self {
        Self::TaskFailed(error.to_string())
    }
}

/// Workflow execution engine.
///
/// # Example
///
/// ```rust,no_run
/// use probe::execution::Engine;
/// use probe::load_workflow;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let workflow = load_workflow("probe.yaml")?;
///     let mut engine = Engine::with_builtins();
///     engine.set_step_timeout(Some(std::time::Duration::from_secs(30)));
///
///     let summary = engine.run(&workflow)?;
///     println!("{} steps, {} failed", summary.total_steps(), summary.failed_steps());
///     Ok(())
/// }
/// ```
pub struct Engine {
    dispatcher: Arc<dyn Dispatcher>,
    environment: Option<Environment>,
    step_timeout: Option<Duration>,
    verbose: bool,
}

impl Engine {
    /// Creates an engine dispatching every action through `dispatcher`.
    pub fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            dispatcher,
            environment: None,
            step_timeout: None,
            verbose: false,
        }
    }

    /// Creates an engine routing actions as described by `config`.
    pub fn from_config(config: &ActionsConfig) -> Self {
        Self::new(Arc::new(Router::from_config(config)))
    }

    /// Engine with the builtin actions and the default plugin lookup.
    pub fn with_builtins() -> Self {
        Self::from_config(&ActionsConfig::default())
    }

    /// Pins the environment instead of snapshotting the process one at start.
    pub fn set_environment(&mut self, environment: Environment) {
        self.environment = Some(environment);
    }

    /// Sets the deadline applied to each dispatch.
    pub fn set_step_timeout(&mut self, timeout: Option<Duration>) {
        self.step_timeout = timeout;
    }

    /// Enables full per-step reports.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Runs every job of `workflow` concurrently and waits for all of them.
    ///
    /// Reports come back grouped by job in declaration order, repetitions
    /// in launch order. Only a dead job task produces an error, and only
    /// after every other job has finished.
    pub async fn start(&self, workflow: &Workflow) -> Result<RunSummary, EngineError> {
        let started = Instant::now();
        let environment = self
            .environment
            .clone()
            .unwrap_or_else(Environment::capture);
        let root = ExecutionContext::new(environment);

        let steps = StepRunner::new(Arc::clone(&self.dispatcher))
            .with_timeout(self.step_timeout)
            .with_verbose(self.verbose);
        let runner = JobRunner::new(Arc::new(steps));

        info!(
            "Starting workflow '{}' ({} jobs, step timeout: {:?})",
            workflow.name,
            workflow.jobs.len(),
            self.step_timeout
        );

        let mut tasks = JoinSet::new();
        for (position, job) in workflow.jobs.iter().enumerate() {
            let runner = runner.clone();
            let job = Arc::new(job.clone());
            let ctx = root.fork(&job.name);
            tasks.spawn(async move { (position, runner.run(job, ctx).await) });
        }

        let mut collected = Vec::with_capacity(workflow.jobs.len());
        let mut failure = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, Ok(reports))) => collected.push((position, reports)),
                Ok((position, Err(e))) => {
                    error!("Job '{}' failed: {}", workflow.jobs[position].name, e);
                    failure.get_or_insert(e);
                }
                Err(e) => {
                    error!("Job task aborted: {}", e);
                    failure.get_or_insert(EngineError::from(e));
                }
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }

        collected.sort_by_key(|(position, _)| *position);
        let summary = RunSummary {
            workflow: workflow.name.clone(),
            reports: collected.into_iter().flat_map(|(_, reports)| reports).collect(),
            started,
            elapsed: started.elapsed(),
        };

        info!(
            "Workflow '{}' finished in {:.2?}: {} steps, {} failed",
            summary.workflow,
            summary.elapsed,
            summary.total_steps(),
            summary.failed_steps()
        );
        Ok(summary)
    }

    /// Blocking entry point: runs [`Engine::start`] on a fresh runtime.
    ///
    /// In-process actions abandoned by a step deadline are left running
    /// on their blocking threads; the call returns without waiting for them.
    pub fn run(&self, workflow: &Workflow) -> Result<RunSummary, EngineError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        let summary = runtime.block_on(self.start(workflow));
        runtime.shutdown_background();
        summary
    }
}

/// Everything a finished workflow run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub workflow: String,
    pub reports: Vec<JobRunReport>,
    pub started: Instant,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn total_steps(&self) -> usize {
        self.reports.iter().map(|r| r.step_log.len()).sum()
    }

    pub fn failed_steps(&self) -> usize {
        self.reports.iter().map(JobRunReport::failed_steps).sum()
    }

    /// True when no step recorded an error.
    pub fn is_success(&self) -> bool {
        self.failed_steps() == 0
    }

    /// Reports of one job, repetitions included.
    pub fn job_reports<'a>(&'a self, job: &'a str) -> impl Iterator<Item = &'a JobRunReport> + 'a {
        self.reports.iter().filter(move |r| r.job == job)
    }

    /// Job runs laid out on a timeline starting at the run start.
    pub fn timeline(&self) -> ExecutionTimeline {
        let mut timeline = ExecutionTimeline::starting_at(self.started);
        for report in &self.reports {
            timeline.record(
                report.label(),
                report.started,
                report.finished,
                report.failed_steps() > 0,
            );
        }
        timeline
    }
}
