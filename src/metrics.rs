//! Derived metrics the backend does not compute itself: throughput deltas
//! between polls, per-task timing breakdowns, worker utilization series.

use chrono::NaiveDateTime;

use crate::models::{Task, WorkerStat};

/// Non-negative difference between two successive cumulative counter
/// readings. `previous` is `None` on the first poll, which yields 0 and
/// seeds the baseline; a counter that moves backwards (backend restart)
/// clamps to 0 instead of reporting negative throughput.
pub fn completed_delta(previous: Option<u64>, current: u64) -> u64 {
  match previous {
    Some(prev) => current.saturating_sub(prev),
    None => 0,
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskTimings {
  pub wait: Option<f64>,
  pub exec: Option<f64>,
  pub turnaround: Option<f64>,
}

/// Timing breakdown for the detail view. Each component needs both of its
/// endpoints; a task that never started or never finished reports `None`
/// for the components it cannot support.
pub fn task_timings(task: &Task) -> TaskTimings {
  TaskTimings {
    wait: secs_between(task.creation_time, task.start_time),
    exec: secs_between(task.start_time, task.end_time),
    turnaround: secs_between(task.creation_time, task.end_time),
  }
}

fn secs_between(from: Option<NaiveDateTime>, to: Option<NaiveDateTime>) -> Option<f64> {
  match (from, to) {
    (Some(from), Some(to)) => Some(to.signed_duration_since(from).num_milliseconds() as f64 / 1000.0),
    _ => None,
  }
}

pub fn format_secs(value: Option<f64>) -> String {
  match value {
    Some(secs) => format!("{:.1}s", secs),
    None => "-".into(),
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtilizationSeries {
  pub ids: Vec<i64>,
  pub running: Vec<u64>,
  pub completed: Vec<u64>,
}

/// Two stacked series aligned by worker index, rebuilt wholesale each poll.
pub fn utilization_series(stats: &[WorkerStat]) -> UtilizationSeries {
  UtilizationSeries {
    ids: stats.iter().map(|w| w.id).collect(),
    running: stats.iter().map(|w| w.running).collect(),
    completed: stats.iter().map(|w| w.completed).collect(),
  }
}
