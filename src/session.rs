//! Per-session context threaded through the poll loop: current filters, the
//! previous poll's snapshot, the throughput baseline and window, and the
//! last unfiltered fetch so filter changes re-reconcile without a network
//! round trip.

use crate::metrics::{completed_delta, utilization_series};
use crate::models::{Priority, StatusAggregate, Task, TaskStatus, WorkerRoster, WorkerStat};
use crate::reconcile::{reconcile, Filters, SnapshotStore, TaskRow};
use crate::render::ChartData;
use crate::series::SeriesBuffer;

/// The four joined GET responses of one poll cycle.
#[derive(Debug, Clone)]
pub struct PollData {
  pub status: StatusAggregate,
  pub tasks: Vec<Task>,
  pub workers: WorkerRoster,
  pub worker_stats: Vec<WorkerStat>,
}

#[derive(Debug, Clone)]
pub struct PollView {
  pub rows: Vec<TaskRow>,
  pub status: StatusAggregate,
  pub workers: WorkerRoster,
  pub charts: ChartData,
}

#[derive(Debug, Default)]
pub struct Session {
  filters: Filters,
  snapshot: SnapshotStore,
  last_completed: Option<u64>,
  throughput: SeriesBuffer,
  last_tasks: Vec<Task>,
}

impl Session {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn filters(&self) -> Filters {
    self.filters
  }

  pub fn set_status_filter(&mut self, status: Option<TaskStatus>) {
    self.filters.status = status;
  }

  pub fn set_priority_filter(&mut self, priority: Option<Priority>) {
    self.filters.priority = priority;
  }

  /// Folds one completed poll cycle into the session and produces the full
  /// render view. The snapshot is replaced from the unfiltered list only
  /// after the view is computed, so "is-new" reflects the previous poll.
  pub fn apply_poll(&mut self, data: PollData, time_label: &str) -> PollView {
    let rows = reconcile(&data.tasks, &self.filters, &self.snapshot);
    self.snapshot.replace(&data.tasks);

    let delta = completed_delta(self.last_completed, data.status.completed_tasks);
    self.last_completed = Some(data.status.completed_tasks);
    self.throughput.push(time_label, delta);

    let charts = ChartData {
      throughput: self.throughput.iter().cloned().collect(),
      status_breakdown: [
        data.status.pending_tasks,
        data.status.running_tasks,
        data.status.completed_tasks,
        data.status.failed_tasks,
      ],
      utilization: utilization_series(&data.worker_stats),
    };

    self.last_tasks = data.tasks;
    PollView {
      rows,
      status: data.status,
      workers: data.workers,
      charts,
    }
  }

  /// Re-runs reconciliation against the cached unfiltered list after a
  /// filter change. No fetch, no snapshot replacement, no chart update.
  pub fn refilter(&self) -> Vec<TaskRow> {
    reconcile(&self.last_tasks, &self.filters, &self.snapshot)
  }
}
