//! Job Execution
//!
//! Runs a job's steps in declaration order, once or as a series of timed,
//! possibly overlapping repetitions.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, info};
use tokio::task::JoinSet;

use crate::workflow::Job;

use super::context::{ExecutionContext, StepResult};
use super::engine::EngineError;
use super::step::StepRunner;

/// Outcome of one run of a job (the job itself, or one repetition).
#[derive(Debug, Clone)]
pub struct JobRunReport {
    pub job: String,
    /// 1-based repetition number; `None` for a job without repeat
    pub repetition: Option<u32>,
    pub started: Instant,
    pub finished: Instant,
    pub step_log: Vec<StepResult>,
}

impl JobRunReport {
    /// Label used in logs, reports, and the timeline.
    pub fn label(&self) -> String {
        run_label(&self.job, self.repetition)
    }

    pub fn duration(&self) -> Duration {
        self.finished.duration_since(self.started)
    }

    pub fn failed_steps(&self) -> usize {
        self.step_log.iter().filter(|r| !r.is_success()).count()
    }
}

fn run_label(job: &str, repetition: Option<u32>) -> String {
    match repetition {
        Some(n) => format!("{}#{}", job, n),
        None => job.to_string(),
    }
}

/// Executes jobs, fanning repetitions out onto their own tasks.
#[derive(Clone)]
pub struct JobRunner {
    steps: Arc<StepRunner>,
}

impl JobRunner {
    pub fn new(steps: Arc<StepRunner>) -> Self {
        Self { steps }
    }

    /// Runs `job` to completion with its own copy of `ctx`.
    ///
    /// Step failures stay inside the returned reports. With a repeat, the
    /// `i`-th repetition is launched, then the runner waits the interval
    /// before launching the next one; all launched repetitions are joined
    /// before returning. An error is returned only when a repetition task
    /// itself died, and only after every other repetition finished.
    pub async fn run(
        &self,
        job: Arc<Job>,
        ctx: ExecutionContext,
    ) -> Result<Vec<JobRunReport>, EngineError> {
        let Some(repeat) = job.repeat else {
            return Ok(vec![self.run_once(&job, ctx, None).await]);
        };

        let runs = repeat.runs();
        let interval = repeat.interval();
        let mut tasks = JoinSet::new();

        for n in 1..=runs {
            if n > 1 && !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }

            info!("Launching job '{}' repetition {}/{}", job.name, n, runs);

            let runner = self.clone();
            let job = Arc::clone(&job);
            let ctx = ctx.clone();
            tasks.spawn(async move { runner.run_once(&job, ctx, Some(n)).await });
        }

        let mut reports = Vec::with_capacity(runs as usize);
        let mut failure = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!("Repetition of job '{}' aborted: {}", job.name, e);
                    failure.get_or_insert(EngineError::from(e));
                }
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }

        reports.sort_by_key(|report| report.repetition);
        Ok(reports)
    }

    /// One sequential pass over the job's steps.
    async fn run_once(
        &self,
        job: &Job,
        ctx: ExecutionContext,
        repetition: Option<u32>,
    ) -> JobRunReport {
        let label = run_label(&job.name, repetition);
        let mut ctx = ctx.fork(label.clone());
        let started = Instant::now();

        info!("[{}] Starting {} steps", label, job.steps.len());

        for (index, step) in job.steps.iter().enumerate() {
            self.steps
                .run_with_defaults(step, &job.defaults, &mut ctx, index)
                .await;
        }

        let report = JobRunReport {
            job: job.name.clone(),
            repetition,
            started,
            finished: Instant::now(),
            step_log: ctx.step_log,
        };

        info!(
            "[{}] Finished in {:.2?} ({} failed steps)",
            label,
            report.duration(),
            report.failed_steps()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionError, ActionRegistry};
    use crate::execution::context::Environment;
    use crate::workflow::{Mapping, Step};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> ActionRegistry {
        let mut registry = ActionRegistry::new();
        registry.register(
            "ok",
            Arc::new(|input: &Mapping| {
                let mut result = Mapping::new();
                result.insert("request".to_string(), json!(input));
                result.insert("response".to_string(), json!({"code": 0}));
                Ok::<_, ActionError>(result)
            }),
        );
        registry.register(
            "fail",
            Arc::new(|_: &Mapping| {
                Err::<Mapping, _>(ActionError::Failed("unreachable".to_string()))
            }),
        );
        registry
    }

    fn job_runner(registry: ActionRegistry) -> JobRunner {
        JobRunner::new(Arc::new(StepRunner::new(Arc::new(registry))))
    }

    fn context() -> ExecutionContext {
        ExecutionContext::new(Environment::default())
    }

    #[tokio::test]
    async fn test_steps_run_in_declared_order() {
        let job = Job::new("ordered")
            .with_step(Step::new("a", "ok"))
            .with_step(Step::new("b", "ok"))
            .with_step(Step::new("c", "ok"));

        let reports = job_runner(registry())
            .run(Arc::new(job), context())
            .await
            .unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].repetition, None);
        let names: Vec<&str> = reports[0].step_log.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failed_step_does_not_stop_job() {
        let job = Job::new("partial")
            .with_step(Step::new("one", "ok"))
            .with_step(Step::new("two", "fail"))
            .with_step(Step::new("three", "ok"));

        let reports = job_runner(registry())
            .run(Arc::new(job), context())
            .await
            .unwrap();

        let log = &reports[0].step_log;
        assert_eq!(log.len(), 3);
        assert!(log[0].is_success());
        assert!(log[1].error.is_some());
        assert!(log[2].is_success());
        assert_eq!(reports[0].failed_steps(), 1);
    }

    #[tokio::test]
    async fn test_repeat_launches_independent_runs() {
        let launches = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&launches);

        let mut registry = registry();
        registry.register(
            "count",
            Arc::new(move |_: &Mapping| {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(200));
                Ok::<_, ActionError>(Mapping::new())
            }),
        );

        let job = Job::new("repeated")
            .with_repeat(3, 0)
            .with_step(Step::new("count", "count"))
            .with_step(Step::new("ok", "ok"));

        let started = Instant::now();
        let reports = job_runner(registry)
            .run(Arc::new(job), context())
            .await
            .unwrap();

        assert_eq!(launches.load(Ordering::SeqCst), 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(450));

        let repetitions: Vec<Option<u32>> = reports.iter().map(|r| r.repetition).collect();
        assert_eq!(repetitions, vec![Some(1), Some(2), Some(3)]);

        for report in &reports {
            assert_eq!(report.step_log.len(), 2);
            assert!(report.finished <= Instant::now());
        }
    }

    #[tokio::test]
    async fn test_repeat_waits_interval_between_launches() {
        let job = Job::new("spaced")
            .with_repeat(2, 1)
            .with_step(Step::new("ok", "ok"));

        let reports = job_runner(registry())
            .run(Arc::new(job), context())
            .await
            .unwrap();

        assert_eq!(reports.len(), 2);
        let gap = reports[1].started.duration_since(reports[0].started);
        assert!(gap >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_repetitions_overlap_when_run_outlasts_interval() {
        let mut registry = registry();
        registry.register(
            "slow",
            Arc::new(|_: &Mapping| {
                std::thread::sleep(Duration::from_millis(1500));
                Ok::<_, ActionError>(Mapping::new())
            }),
        );

        let job = Job::new("overlap")
            .with_repeat(2, 1)
            .with_step(Step::new("slow", "slow"));

        let reports = job_runner(registry)
            .run(Arc::new(job), context())
            .await
            .unwrap();

        assert_eq!(reports.len(), 2);
        assert!(reports[1].started < reports[0].finished);
        assert!(reports[1].started >= reports[0].started + Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_zero_count_repeat_runs_once() {
        let job = Job::new("zero")
            .with_repeat(0, 0)
            .with_step(Step::new("ok", "ok"));

        let reports = job_runner(registry())
            .run(Arc::new(job), context())
            .await
            .unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].label(), "zero#1");
    }
}
