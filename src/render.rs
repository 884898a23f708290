use crate::metrics::UtilizationSeries;
use crate::models::{StatusAggregate, WorkerRoster};
use crate::reconcile::TaskRow;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartData {
  pub throughput: Vec<(String, u64)>,
  /// Pending, running, completed, failed, in the distribution chart's order.
  pub status_breakdown: [u64; 4],
  pub utilization: UtilizationSeries,
}

/// Capability handed to the poller; owns all presentation. Implementations
/// must not block: the TUI sink forwards over a channel into its draw loop.
pub trait RenderSink: Send + 'static {
  fn render_tasks(&mut self, rows: &[TaskRow]);
  fn render_stats(&mut self, status: &StatusAggregate, workers: &WorkerRoster);
  fn render_charts(&mut self, charts: &ChartData);
  fn render_error(&mut self, message: &str);
}
