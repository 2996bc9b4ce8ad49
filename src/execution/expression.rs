//! Expression Evaluation
//!
//! Resolves `{{ ... }}` references inside step input against an
//! [`ExecutionContext`]. Two reference forms exist:
//!
//! - `{{ env.NAME }}`: a variable from the environment snapshot
//! - `{{ steps.N.path.to.field }}` (or `steps[N].path`): a field of the
//!   N-th recorded step result
//!
//! Text is parsed into a [`Template`] of literal and reference segments
//! before anything is looked up. A string that is exactly one reference
//! resolves to the referenced value with its type preserved; otherwise
//! references are rendered into the surrounding text.
//!
//! Unresolvable references are errors. The step runner turns them into a
//! failed step instead of dispatching with a blank value.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use thiserror::Error;

use crate::workflow::Mapping;

use super::context::ExecutionContext;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Template parsing and resolution errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    #[error("Unterminated reference in '{0}'")]
    Unterminated(String),

    #[error("Empty reference in template")]
    EmptyReference,

    #[error("Invalid reference '{0}'")]
    InvalidReference(String),

    #[error("Unknown reference root in '{0}' (expected env or steps)")]
    UnknownRoot(String),

    #[error("Environment variable '{0}' is not set")]
    UnknownEnv(String),

    #[error("Step index {index} out of range ({available} steps recorded)")]
    StepOutOfRange { index: usize, available: usize },

    #[error("Reference '{0}' does not resolve to a value")]
    MissingField(String),
}

/// A parsed `{{ ... }}` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Env(String),
    Step { index: usize, path: Vec<String> },
}

impl Reference {
    /// Parses the text between the braces.
    pub fn parse(expr: &str) -> Result<Self, ExpressionError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(ExpressionError::EmptyReference);
        }

        let invalid = || ExpressionError::InvalidReference(expr.to_string());
        let normalized = expr.replace('[', ".").replace(']', "");

        if let Some(name) = normalized.strip_prefix("env.") {
            if name.is_empty() {
                return Err(invalid());
            }
            return Ok(Self::Env(name.to_string()));
        }

        let mut parts = normalized.split('.');
        if parts.next() != Some("steps") {
            return Err(ExpressionError::UnknownRoot(expr.to_string()));
        }

        let index = parts
            .next()
            .and_then(|part| part.trim().parse::<usize>().ok())
            .ok_or_else(invalid)?;

        let path: Vec<String> = parts.map(|part| part.trim().to_string()).collect();
        if path.iter().any(String::is_empty) {
            return Err(invalid());
        }

        Ok(Self::Step { index, path })
    }

    /// Looks the reference up in `ctx`.
    pub fn resolve(&self, ctx: &ExecutionContext) -> Result<Value, ExpressionError> {
        match self {
            Self::Env(name) => ctx
                .environment
                .get(name)
                .map(|value| Value::String(value.to_string()))
                .ok_or_else(|| ExpressionError::UnknownEnv(name.clone())),
            Self::Step { index, path } => {
                let result = ctx.step_log.get(*index).ok_or(ExpressionError::StepOutOfRange {
                    index: *index,
                    available: ctx.step_log.len(),
                })?;

                let root = result.to_value();
                let mut current = &root;
                for segment in path {
                    current = child(current, segment)
                        .ok_or_else(|| ExpressionError::MissingField(self.to_string()))?;
                }
                Ok(current.clone())
            }
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Env(name) => write!(f, "env.{}", name),
            Self::Step { index, path } => {
                write!(f, "steps.{}", index)?;
                for segment in path {
                    write!(f, ".{}", segment)?;
                }
                Ok(())
            }
        }
    }
}

fn child<'v>(value: &'v Value, segment: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => None,
    }
}

/// One piece of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Reference(Reference),
}

/// Parsed form of a templated string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Splits `text` into literal and reference segments.
    pub fn parse(text: &str) -> Result<Self, ExpressionError> {
        let mut segments = Vec::new();
        let mut rest = text;

        while let Some(start) = rest.find(OPEN) {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }

            let inner = &rest[start + OPEN.len()..];
            let end = inner
                .find(CLOSE)
                .ok_or_else(|| ExpressionError::Unterminated(text.to_string()))?;

            segments.push(Segment::Reference(Reference::parse(&inner[..end])?));
            rest = &inner[end + CLOSE.len()..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// True when the template holds no references.
    pub fn is_literal(&self) -> bool {
        self.segments
            .iter()
            .all(|segment| matches!(segment, Segment::Literal(_)))
    }

    /// Resolves the template against `ctx`.
    pub fn render(&self, ctx: &ExecutionContext) -> Result<Value, ExpressionError> {
        if let [Segment::Reference(reference)] = self.segments.as_slice() {
            return reference.resolve(ctx);
        }

        let mut text = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => text.push_str(literal),
                Segment::Reference(reference) => {
                    text.push_str(&render_text(&reference.resolve(ctx)?));
                }
            }
        }
        Ok(Value::String(text))
    }
}

impl FromStr for Template {
    type Err = ExpressionError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::parse(text)
    }
}

/// Text form of a value embedded in a larger string.
fn render_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Resolves every templated string in `input`, recursing into maps and
/// sequences. Keys are left untouched and `ctx` is never modified.
pub fn evaluate(input: &Mapping, ctx: &ExecutionContext) -> Result<Mapping, ExpressionError> {
    input
        .iter()
        .map(|(key, value)| Ok((key.clone(), evaluate_value(value, ctx)?)))
        .collect()
}

fn evaluate_value(value: &Value, ctx: &ExecutionContext) -> Result<Value, ExpressionError> {
    match value {
        Value::String(text) => {
            let template = Template::parse(text)?;
            if template.is_literal() {
                Ok(value.clone())
            } else {
                template.render(ctx)
            }
        }
        Value::Array(items) => items
            .iter()
            .map(|item| evaluate_value(item, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => evaluate(map, ctx).map(Value::Object),
        Value::Null | Value::Bool(_) | Value::Number(_) => Ok(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::context::{Environment, StepResult};
    use crate::workflow::Step;
    use chrono::Utc;
    use serde_json::json;

    fn mapping(value: Value) -> Mapping {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn context() -> ExecutionContext {
        let mut ctx = ExecutionContext::new(Environment::from_vars([
            ("HOST", "example.com"),
            ("PORT", "8080"),
        ]));

        let step = Step::new("first", "http");
        let result = mapping(json!({
            "request": {"url": "http://example.com"},
            "response": {"code": 200, "body": r#"{"token":"abc","items":[{"id":7}]}"#}
        }));
        ctx.push(StepResult::completed(&step, Mapping::new(), result, Utc::now()));
        ctx
    }

    #[test]
    fn test_parse_segments() {
        let template = Template::parse("http://{{ env.HOST }}:{{env.PORT}}/x").unwrap();

        assert_eq!(
            template.segments(),
            &[
                Segment::Literal("http://".to_string()),
                Segment::Reference(Reference::Env("HOST".to_string())),
                Segment::Literal(":".to_string()),
                Segment::Reference(Reference::Env("PORT".to_string())),
                Segment::Literal("/x".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_step_reference_forms() {
        let dotted = Reference::parse("steps.0.response.code").unwrap();
        let bracketed = Reference::parse(" steps[0].response.code ").unwrap();

        assert_eq!(dotted, bracketed);
        assert_eq!(dotted.to_string(), "steps.0.response.code");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            Template::parse("{{ env.HOST").unwrap_err(),
            ExpressionError::Unterminated("{{ env.HOST".to_string())
        );
        assert_eq!(Template::parse("{{ }}").unwrap_err(), ExpressionError::EmptyReference);
        assert!(matches!(
            Template::parse("{{ vars.x }}"),
            Err(ExpressionError::UnknownRoot(_))
        ));
        assert!(matches!(
            Template::parse("{{ steps.x.y }}"),
            Err(ExpressionError::InvalidReference(_))
        ));
        assert!(matches!(
            Template::parse("{{ env. }}"),
            Err(ExpressionError::InvalidReference(_))
        ));
    }

    #[test]
    fn test_literal_text_untouched() {
        let ctx = context();
        let input = mapping(json!({"plain": "no references here", "n": 5, "flag": true}));

        assert_eq!(evaluate(&input, &ctx).unwrap(), input);
    }

    #[test]
    fn test_env_substitution() {
        let ctx = context();
        let input = mapping(json!({"url": "http://{{ env.HOST }}:{{ env.PORT }}/"}));

        let resolved = evaluate(&input, &ctx).unwrap();
        assert_eq!(resolved["url"], json!("http://example.com:8080/"));
    }

    #[test]
    fn test_single_reference_keeps_type() {
        let ctx = context();
        let input = mapping(json!({
            "code": "{{ steps.0.response.code }}",
            "token": "{{ steps.0.response.bodyjson.token }}",
            "item": "{{ steps[0].response.bodyjson.items[0].id }}"
        }));

        let resolved = evaluate(&input, &ctx).unwrap();
        assert_eq!(resolved["code"], json!(200));
        assert_eq!(resolved["token"], json!("abc"));
        assert_eq!(resolved["item"], json!(7));
    }

    #[test]
    fn test_mixed_text_renders_values() {
        let ctx = context();
        let input = mapping(json!({"summary": "status={{ steps.0.response.code }}"}));

        let resolved = evaluate(&input, &ctx).unwrap();
        assert_eq!(resolved["summary"], json!("status=200"));
    }

    #[test]
    fn test_nested_values() {
        let ctx = context();
        let input = mapping(json!({
            "headers": {"Host": "{{ env.HOST }}"},
            "list": ["{{ env.PORT }}", 1, null]
        }));

        let resolved = evaluate(&input, &ctx).unwrap();
        assert_eq!(resolved["headers"]["Host"], json!("example.com"));
        assert_eq!(resolved["list"], json!(["8080", 1, null]));
    }

    #[test]
    fn test_unknown_env_fails() {
        let ctx = context();
        let input = mapping(json!({"x": "{{ env.MISSING }}"}));

        assert_eq!(
            evaluate(&input, &ctx).unwrap_err(),
            ExpressionError::UnknownEnv("MISSING".to_string())
        );
    }

    #[test]
    fn test_step_out_of_range_fails() {
        let ctx = context();
        let input = mapping(json!({"x": "{{ steps.3.response.code }}"}));

        assert_eq!(
            evaluate(&input, &ctx).unwrap_err(),
            ExpressionError::StepOutOfRange {
                index: 3,
                available: 1
            }
        );
    }

    #[test]
    fn test_missing_field_fails() {
        let ctx = context();
        let input = mapping(json!({"x": "{{ steps.0.response.nope }}"}));

        assert_eq!(
            evaluate(&input, &ctx).unwrap_err(),
            ExpressionError::MissingField("steps.0.response.nope".to_string())
        );
    }

    #[test]
    fn test_evaluation_is_idempotent_and_pure() {
        let ctx = context();
        let before = ctx.step_log.clone();
        let input = mapping(json!({
            "url": "http://{{ env.HOST }}",
            "code": "{{ steps.0.response.code }}"
        }));

        let first = evaluate(&input, &ctx).unwrap();
        let second = evaluate(&input, &ctx).unwrap();

        assert_eq!(first, second);
        assert_eq!(ctx.step_log, before);
    }

    #[test]
    fn test_template_from_str() {
        let template: Template = "plain".parse().unwrap();
        assert!(template.is_literal());

        let empty: Template = "".parse().unwrap();
        assert!(empty.segments().is_empty());
    }
}
