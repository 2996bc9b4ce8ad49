//! Workflow Data Model
//!
//! Core data structures describing a scenario: a workflow made of jobs,
//! each job an ordered list of steps that invoke actions.
//!
//! # Example YAML Format
//!
//! ```yaml
//! name: Greeting scenario
//! jobs:
//!   - name: Greet twice
//!     repeat:
//!       count: 2
//!       interval: 5
//!     defaults:
//!       name: probe
//!     steps:
//!       - name: Say hello
//!         uses: hello
//!       - name: Say hello back
//!         uses: hello
//!         with:
//!           name: "{{ steps.0.response.bodyjson.message }}"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// String-keyed map of structured values used for step input and action output.
pub type Mapping = Map<String, Value>;

/// Repetition settings for a job.
///
/// `count` is the number of runs launched and `interval` the delay in
/// seconds between two successive launches.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Repeat {
    #[serde(default)]
    pub count: u32,

    #[serde(default)]
    pub interval: u64,
}

impl Repeat {
    /// Creates repetition settings.
    pub fn new(count: u32, interval: u64) -> Self {
        Self { count, interval }
    }

    /// Number of runs to launch. A zero count still runs the job once.
    pub fn runs(&self) -> u32 {
        self.count.max(1)
    }

    /// Delay between two successive launches.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }
}

/// A single action invocation with its templated input.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Step {
    /// Display name (optional in YAML)
    #[serde(default)]
    pub name: String,

    /// Identifier of the action to dispatch (e.g. "hello", "http")
    #[serde(default)]
    pub uses: String,

    /// Templated input passed to the action after evaluation
    #[serde(default, rename = "with", skip_serializing_if = "Map::is_empty")]
    pub input: Mapping,
}

impl Step {
    /// Creates a new step invoking `uses`.
    ///
    /// # Example
    ///
    /// ```
    /// use probe::workflow::Step;
    ///
    /// let step = Step::new("greet", "hello").with("name", "{{ env.USER }}");
    /// assert_eq!(step.uses, "hello");
    /// ```
    pub fn new(name: impl Into<String>, uses: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_string(),
            uses: uses.into().trim().to_string(),
            input: Mapping::new(),
        }
    }

    /// Adds one input entry.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.input.insert(key.into(), value.into());
        self
    }

    /// Name used in logs and reports, falling back to the action id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.uses
        } else {
            &self.name
        }
    }

    /// Returns the step input with job defaults filled in underneath.
    ///
    /// Only mapping defaults are applied; keys set by the step win.
    pub fn input_with_defaults(&self, defaults: &Value) -> Mapping {
        let Value::Object(defaults) = defaults else {
            return self.input.clone();
        };

        let mut merged = defaults.clone();
        for (key, value) in &self.input {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }
}

/// An ordered sequence of steps, optionally repeated.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Job {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub steps: Vec<Step>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<Repeat>,

    /// Opaque defaults; a mapping here fills missing step input keys
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub defaults: Value,
}

impl Job {
    /// Creates an empty job.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_string(),
            steps: Vec::new(),
            repeat: None,
            defaults: Value::Null,
        }
    }

    /// Appends a step.
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Sets the repetition settings.
    pub fn with_repeat(mut self, count: u32, interval: u64) -> Self {
        self.repeat = Some(Repeat::new(count, interval));
        self
    }

    /// Sets the job defaults.
    pub fn with_defaults(mut self, defaults: Value) -> Self {
        self.defaults = defaults;
        self
    }

    /// Number of runs this job launches.
    pub fn runs(&self) -> u32 {
        self.repeat.map_or(1, |repeat| repeat.runs())
    }
}

/// A named collection of jobs describing one scenario.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Workflow {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub jobs: Vec<Job>,
}

impl Workflow {
    /// Creates a new workflow with no jobs.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_string(),
            jobs: Vec::new(),
        }
    }

    /// Appends a job.
    pub fn with_job(mut self, job: Job) -> Self {
        self.jobs.push(job);
        self
    }

    /// Total number of declared steps across all jobs.
    pub fn step_count(&self) -> usize {
        self.jobs.iter().map(|job| job.steps.len()).sum()
    }

    /// Returns the number of jobs in the workflow.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns true if the workflow has no jobs.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_creation() {
        let step = Step::new(" greet ", "hello").with("name", "probe");

        assert_eq!(step.name, "greet");
        assert_eq!(step.uses, "hello");
        assert_eq!(step.input.get("name"), Some(&json!("probe")));
    }

    #[test]
    fn test_step_display_name_falls_back_to_action() {
        let step = Step::new("", "hello");
        assert_eq!(step.display_name(), "hello");

        let named = Step::new("greet", "hello");
        assert_eq!(named.display_name(), "greet");
    }

    #[test]
    fn test_input_with_defaults_step_wins() {
        let step = Step::new("s", "http").with("url", "http://step");
        let defaults = json!({"url": "http://default", "method": "GET"});

        let input = step.input_with_defaults(&defaults);
        assert_eq!(input.get("url"), Some(&json!("http://step")));
        assert_eq!(input.get("method"), Some(&json!("GET")));
    }

    #[test]
    fn test_input_with_non_mapping_defaults() {
        let step = Step::new("s", "http").with("url", "http://step");

        assert_eq!(step.input_with_defaults(&Value::Null), step.input);
        assert_eq!(step.input_with_defaults(&json!("opaque")), step.input);
    }

    #[test]
    fn test_repeat_zero_count_runs_once() {
        assert_eq!(Repeat::new(0, 3).runs(), 1);
        assert_eq!(Repeat::new(5, 3).runs(), 5);
        assert_eq!(Repeat::new(5, 3).interval(), Duration::from_secs(3));
    }

    #[test]
    fn test_job_runs() {
        let plain = Job::new("plain");
        assert_eq!(plain.runs(), 1);

        let repeated = Job::new("repeated").with_repeat(4, 0);
        assert_eq!(repeated.runs(), 4);
    }

    #[test]
    fn test_workflow_counts() {
        let workflow = Workflow::new("wf")
            .with_job(
                Job::new("a")
                    .with_step(Step::new("1", "hello"))
                    .with_step(Step::new("2", "hello")),
            )
            .with_job(Job::new("b").with_step(Step::new("1", "hello")));

        assert_eq!(workflow.len(), 2);
        assert_eq!(workflow.step_count(), 3);
    }

    #[test]
    fn test_workflow_default() {
        let workflow = Workflow::default();
        assert!(workflow.is_empty());
    }

    #[test]
    fn test_step_deserializes_with_key() {
        let step: Step = serde_yaml::from_str(
            r#"
name: greet
uses: hello
with:
  name: probe
  nested:
    depth: 2
"#,
        )
        .unwrap();

        assert_eq!(step.input.get("name"), Some(&json!("probe")));
        assert_eq!(step.input.get("nested"), Some(&json!({"depth": 2})));
    }
}
