//! Execution Context
//!
//! Per-run state threaded through a job: the read-only environment
//! snapshot and the growing log of step results.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actions::DispatchError;
use crate::workflow::{Mapping, Step};

use super::expression::ExpressionError;

/// Key holding the raw response body.
pub const BODY_KEY: &str = "body";

/// Key holding the parsed form of a JSON response body.
pub const BODY_JSON_KEY: &str = "bodyjson";

/// Snapshot of environment variables, shared read-only by every job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment(Arc<HashMap<String, String>>);

impl Environment {
    /// Captures the current process environment.
    ///
    /// Call once per run; nested components only ever see the snapshot.
    pub fn capture() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Builds an environment from explicit key/value pairs.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(Arc::new(
            vars.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        ))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Category of a step failure.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// A template reference could not be resolved; nothing was dispatched
    Expression,
    /// The dispatcher or the action reported a failure
    Dispatch,
    /// The step deadline expired before the action answered
    Timeout,
}

/// Error recorded in a step result.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ExpressionError> for ErrorInfo {
    fn from(error: &ExpressionError) -> Self {
        Self {
            kind: ErrorKind::Expression,
            message: error.to_string(),
        }
    }
}

impl From<&DispatchError> for ErrorInfo {
    fn from(error: &DispatchError) -> Self {
        let kind = if error.is_timeout() {
            ErrorKind::Timeout
        } else {
            ErrorKind::Dispatch
        };
        Self {
            kind,
            message: error.to_string(),
        }
    }
}

/// Outcome of one step execution.
///
/// Request/response style actions fill `request` and `response`; any
/// other top-level keys of the action result are kept under `output`, so
/// they never shadow the step's own fields.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StepResult {
    pub name: String,
    pub uses: String,

    /// Input after template evaluation, as sent to the action
    pub input: Mapping,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Mapping>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Mapping>,

    #[serde(default, skip_serializing_if = "Mapping::is_empty")]
    pub output: Mapping,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl StepResult {
    /// Folds a successful action result into a step result.
    ///
    /// The short keys `req`/`res` are accepted for `request`/`response`.
    /// A JSON response body gains a parsed `bodyjson` sibling.
    pub fn completed(
        step: &Step,
        input: Mapping,
        mut result: Mapping,
        started_at: DateTime<Utc>,
    ) -> Self {
        let request = take_map(&mut result, &["request", "req"]);
        let mut response = take_map(&mut result, &["response", "res"]);

        if let Some(response) = response.as_mut() {
            attach_body_json(response);
        }

        Self {
            name: step.display_name().to_string(),
            uses: step.uses.clone(),
            input,
            request,
            response,
            output: result,
            error: None,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Records a step that produced no action result.
    pub fn failed(
        step: &Step,
        input: Mapping,
        error: ErrorInfo,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name: step.display_name().to_string(),
            uses: step.uses.clone(),
            input,
            request: None,
            response: None,
            output: Mapping::new(),
            error: Some(error),
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// True when the action answered with both a request and a response map.
    pub fn is_exchange(&self) -> bool {
        self.request.is_some() && self.response.is_some()
    }

    /// Wall-clock duration in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// Structured view used by expressions and raw reports.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Removes the first key in `keys` that holds a map.
fn take_map(result: &mut Mapping, keys: &[&str]) -> Option<Mapping> {
    for key in keys {
        if matches!(result.get(*key), Some(Value::Object(_))) {
            if let Some(Value::Object(map)) = result.remove(*key) {
                return Some(map);
            }
        }
    }
    None
}

/// Stores the parsed form of a JSON `body` under `bodyjson`.
///
/// Only objects and arrays count as structured payloads; the raw string is
/// kept in place.
pub fn attach_body_json(response: &mut Mapping) {
    let parsed = match response.get(BODY_KEY) {
        Some(Value::String(body)) => serde_json::from_str::<Value>(body).ok(),
        _ => None,
    };

    if let Some(parsed @ (Value::Object(_) | Value::Array(_))) = parsed {
        response.insert(BODY_JSON_KEY.to_string(), parsed);
    }
}

/// State carried through one job run.
///
/// Cloning is cheap for the environment (shared) and copies the log, so a
/// fork never observes results appended to another fork.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Label of the job run owning this context (empty at workflow level)
    pub label: String,
    pub environment: Environment,
    pub step_log: Vec<StepResult>,
}

impl ExecutionContext {
    /// Creates a workflow-level context with an empty step log.
    pub fn new(environment: Environment) -> Self {
        Self {
            label: String::new(),
            environment,
            step_log: Vec::new(),
        }
    }

    /// Independent copy for a job run.
    pub fn fork(&self, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            environment: self.environment.clone(),
            step_log: self.step_log.clone(),
        }
    }

    /// Appends a result and returns a reference to it.
    pub fn push(&mut self, result: StepResult) -> &StepResult {
        let position = self.step_log.len();
        self.step_log.push(result);
        &self.step_log[position]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapping(value: Value) -> Mapping {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_body_json_roundtrip() {
        let mut response = mapping(json!({"body": r#"{"a":1}"#}));
        attach_body_json(&mut response);

        assert_eq!(response["body"], json!(r#"{"a":1}"#));
        assert_eq!(response["bodyjson"], json!({"a": 1}));
    }

    #[test]
    fn test_body_json_ignores_plain_text() {
        let mut response = mapping(json!({"body": "hello"}));
        attach_body_json(&mut response);
        assert!(!response.contains_key("bodyjson"));

        let mut scalar = mapping(json!({"body": "42"}));
        attach_body_json(&mut scalar);
        assert!(!scalar.contains_key("bodyjson"));
    }

    #[test]
    fn test_body_json_array() {
        let mut response = mapping(json!({"body": "[1, 2]"}));
        attach_body_json(&mut response);
        assert_eq!(response["bodyjson"], json!([1, 2]));
    }

    #[test]
    fn test_completed_folds_request_response() {
        let step = Step::new("greet", "hello");
        let result = mapping(json!({
            "request": {"name": "x"},
            "response": {"body": r#"{"ok":true}"#},
            "extra": 1
        }));

        let step_result = StepResult::completed(&step, Mapping::new(), result, Utc::now());

        assert!(step_result.is_exchange());
        assert!(step_result.is_success());
        assert_eq!(step_result.response.as_ref().unwrap()["bodyjson"], json!({"ok": true}));
        assert_eq!(step_result.output["extra"], json!(1));
    }

    #[test]
    fn test_completed_accepts_short_keys() {
        let step = Step::new("", "http");
        let result = mapping(json!({"req": {"url": "u"}, "res": {"code": 200}}));

        let step_result = StepResult::completed(&step, Mapping::new(), result, Utc::now());

        assert_eq!(step_result.name, "http");
        assert_eq!(step_result.request.unwrap()["url"], json!("u"));
        assert_eq!(step_result.response.unwrap()["code"], json!(200));
    }

    #[test]
    fn test_completed_non_exchange_result() {
        let step = Step::new("raw", "custom");
        let result = mapping(json!({"response": "not a map", "count": 3}));

        let step_result = StepResult::completed(&step, Mapping::new(), result, Utc::now());

        assert!(!step_result.is_exchange());
        assert_eq!(step_result.output["response"], json!("not a map"));
    }

    #[test]
    fn test_action_keys_do_not_shadow_step_fields() {
        let step = Step::new("greet", "hello");
        let result = mapping(json!({"name": "spoofed", "input": 1, "uses": "other"}));

        let value = StepResult::completed(&step, Mapping::new(), result, Utc::now()).to_value();

        assert_eq!(value["name"], json!("greet"));
        assert_eq!(value["uses"], json!("hello"));
        assert_eq!(value["input"], json!({}));
        assert_eq!(value["output"]["name"], json!("spoofed"));
        assert_eq!(value["output"]["input"], json!(1));
    }

    #[test]
    fn test_failed_result_serializes_error() {
        let step = Step::new("s", "smtp");
        let error = ErrorInfo::from(&DispatchError::UnknownAction("smtp".to_string()));

        let value = StepResult::failed(&step, Mapping::new(), error, Utc::now()).to_value();
        assert_eq!(value["error"]["kind"], json!("dispatch"));
        assert_eq!(value["error"]["message"], json!("Unknown action 'smtp'"));
    }

    #[test]
    fn test_fork_isolation() {
        let root = ExecutionContext::new(Environment::from_vars([("HOME", "/root")]));
        let mut a = root.fork("a");
        let b = root.fork("b");

        let step = Step::new("s", "hello");
        a.push(StepResult::completed(&step, Mapping::new(), Mapping::new(), Utc::now()));

        assert_eq!(a.step_log.len(), 1);
        assert!(b.step_log.is_empty());
        assert!(root.step_log.is_empty());
        assert_eq!(b.environment.get("HOME"), Some("/root"));
    }

    #[test]
    fn test_environment_lookup() {
        let env = Environment::from_vars([("A", "1")]);
        assert_eq!(env.get("A"), Some("1"));
        assert_eq!(env.get("B"), None);
        assert_eq!(env.len(), 1);
    }
}
