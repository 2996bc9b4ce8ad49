//! Execution Timeline
//!
//! Lays finished job runs out against the start of the workflow run for
//! Gantt charts and timing reports.

use std::time::{Duration, Instant};

/// One job run on the timeline.
#[derive(Debug, Clone)]
pub struct TimelineSpan {
    /// Run label (`job` or `job#n`)
    pub label: String,
    pub started: Instant,
    pub finished: Instant,
    /// At least one step of the run recorded an error
    pub failed: bool,
}

impl TimelineSpan {
    pub fn duration(&self) -> Duration {
        self.finished.saturating_duration_since(self.started)
    }
}

/// Timing of all runs in one workflow execution.
#[derive(Debug, Clone)]
pub struct ExecutionTimeline {
    spans: Vec<TimelineSpan>,
    start_time: Instant,
}

impl ExecutionTimeline {
    /// Creates a timeline starting now.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Creates a timeline anchored at `start_time`.
    pub fn starting_at(start_time: Instant) -> Self {
        Self {
            spans: Vec::new(),
            start_time,
        }
    }

    /// Records a finished run.
    pub fn record(
        &mut self,
        label: impl Into<String>,
        started: Instant,
        finished: Instant,
        failed: bool,
    ) {
        self.spans.push(TimelineSpan {
            label: label.into(),
            started,
            finished,
            failed,
        });
    }

    pub fn spans(&self) -> &[TimelineSpan] {
        &self.spans
    }

    /// Time from the anchor to the end of the last recorded run.
    pub fn elapsed(&self) -> Duration {
        self.spans
            .iter()
            .map(|span| span.finished.saturating_duration_since(self.start_time))
            .max()
            .unwrap_or_default()
    }

    /// Generates an ASCII Gantt chart representation.
    ///
    /// Each run is a bar placed relative to the total run time; failed
    /// runs are drawn with `x`.
    pub fn gantt_chart(&self) -> String {
        let mut output = String::from("\nExecution Timeline:\n\n");

        let total_time = self.elapsed().as_millis();
        if total_time == 0 {
            return output;
        }

        // Scale to 50 characters width
        let scale = 50.0 / total_time as f64;

        let mut sorted: Vec<&TimelineSpan> = self.spans.iter().collect();
        sorted.sort_by_key(|span| span.started);

        for span in sorted {
            let start = span.started.saturating_duration_since(self.start_time).as_millis();
            let duration_ms = span.duration().as_millis();

            let start_pos = (start as f64 * scale) as usize;
            let width = (duration_ms as f64 * scale).max(1.0) as usize;

            let mut bar = " ".repeat(start_pos);
            bar.push_str(&(if span.failed { "x" } else { "#" }).repeat(width));

            output.push_str(&format!(
                "{:12} |{:50}| ({} ms)\n",
                truncate(&span.label, 12),
                bar,
                duration_ms
            ));
        }

        output.push_str(&format!("\nTotal: {} ms\n", total_time));
        output
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Pads or truncates a label to exactly `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        format!("{:width$}", s, width = max_len)
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}
