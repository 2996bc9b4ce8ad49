//! Monitoring Module
//!
//! Console reports and execution timing for workflow runs.
//!
//! # Components
//!
//! - [`report`]: Per-step reports and the end-of-run summary
//! - [`ExecutionTimeline`]: Job run start/end timing for Gantt charts

pub mod report;
pub mod timeline;

pub use report::{format_step_line, format_step_report, format_summary};
pub use timeline::{ExecutionTimeline, TimelineSpan};
