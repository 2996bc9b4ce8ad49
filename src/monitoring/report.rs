//! Step and Run Reports
//!
//! Console rendering of step results and of the final run summary.

use std::fmt::Write;

use colored::Colorize;
use serde_json::Value;

use crate::execution::{RunSummary, StepResult};
use crate::workflow::Mapping;

/// Full report for one step.
///
/// Request/response results get one line per top-level key and one
/// indented line per nested key; anything else is dumped raw.
pub fn format_step_report(label: &str, index: usize, result: &StepResult) -> String {
    let mut out = String::new();

    let status = if result.is_success() {
        "ok".green()
    } else {
        "failed".red()
    };
    let _ = writeln!(
        out,
        "{} {} ({}) {} {} ms",
        format!("[{}] step {}:", label, index).bold(),
        result.name,
        result.uses,
        status,
        result.duration_ms()
    );

    match (&result.request, &result.response) {
        (Some(request), Some(response)) => {
            write_section(&mut out, "Request", request);
            write_section(&mut out, "Response", response);
            if !result.output.is_empty() {
                write_section(&mut out, "Output", &result.output);
            }
        }
        _ if result.is_success() => {
            let raw = serde_json::to_string_pretty(&result.to_value())
                .unwrap_or_else(|_| String::from("<unprintable>"));
            let _ = writeln!(out, "{}", "Result:".cyan());
            for line in raw.lines() {
                let _ = writeln!(out, "  {}", line);
            }
        }
        _ => {}
    }

    if let Some(error) = &result.error {
        let _ = writeln!(
            out,
            "{}",
            format!("Error ({:?}): {}", error.kind, error.message).red()
        );
    }

    out
}

fn write_section(out: &mut String, title: &str, fields: &Mapping) {
    let _ = writeln!(out, "{}", format!("{}:", title).cyan());
    for (key, value) in fields {
        match value {
            Value::Object(nested) => {
                let _ = writeln!(out, "  {}:", key);
                for (nested_key, nested_value) in nested {
                    let _ = writeln!(out, "    {}: {}", nested_key, scalar(nested_value));
                }
            }
            other => {
                let _ = writeln!(out, "  {}: {}", key, scalar(other));
            }
        }
    }
}

/// Strings are quoted; everything else prints as compact JSON.
fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{:?}", s),
        other => other.to_string(),
    }
}

/// One status line for a step.
pub fn format_step_line(label: &str, index: usize, result: &StepResult) -> String {
    match &result.error {
        None => format!(
            "[{}] step {} '{}' ({}) ok in {} ms",
            label,
            index,
            result.name,
            result.uses,
            result.duration_ms()
        ),
        Some(error) => format!(
            "[{}] step {} '{}' ({}) failed: {}",
            label, index, result.name, result.uses, error.message
        ),
    }
}

/// End-of-run summary: one line per job run, then totals.
pub fn format_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{}",
        format!("Workflow '{}' summary", summary.workflow).bold()
    );

    for report in &summary.reports {
        let failed = report.failed_steps();
        let marker = if failed == 0 { "✓".green() } else { "✗".red() };
        let _ = writeln!(
            out,
            "  {} {:20} {} steps, {} failed, {:.2?}",
            marker,
            report.label(),
            report.step_log.len(),
            failed,
            report.duration()
        );
    }

    let totals = format!(
        "{} steps, {} failed, {:.2?} total",
        summary.total_steps(),
        summary.failed_steps(),
        summary.elapsed
    );
    let _ = writeln!(out);
    if summary.is_success() {
        let _ = writeln!(out, "{}", totals.green());
    } else {
        let _ = writeln!(out, "{}", totals.yellow());
    }
    out
}
