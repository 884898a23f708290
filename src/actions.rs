//! Action gateway for the mutating endpoints. Each action issues exactly one
//! request; a structurally successful reply schedules a single follow-up
//! refresh after a short settle delay, failures are returned to the caller
//! and never retried.

use std::path::Path;
use std::time::Duration;

use regex::Regex;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::api::{ApiError, Backend, ExportFormat};
use crate::models::{AddTaskRequest, CancelRequest, Priority, SimulateRequest};
use crate::poller::Command;

/// Lets the backend settle before the follow-up poll picks up the change.
pub const FOLLOWUP_DELAY: Duration = Duration::from_millis(500);

fn valid_name(input: &str) -> bool {
  let re = Regex::new(r"^[\w\s.,@!?\-]+$").unwrap();
  re.is_match(input)
}

fn reply_error(error: Option<String>, message: Option<String>) -> String {
  error.or(message).unwrap_or_else(|| "request failed".into())
}

pub struct ActionGateway<B> {
  backend: B,
  refresh: mpsc::Sender<Command>,
}

impl<B: Backend> ActionGateway<B> {
  pub fn new(backend: B, refresh: mpsc::Sender<Command>) -> Self {
    Self { backend, refresh }
  }

  pub async fn add_task(&self, name: &str, priority: Priority, duration_ms: u64) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() || !valid_name(name) {
      return Err(ApiError::Backend("task name is empty or contains unsupported characters".into()));
    }
    if duration_ms == 0 {
      return Err(ApiError::Backend("duration must be a positive number of milliseconds".into()));
    }

    let reply = self
      .backend
      .add_task(AddTaskRequest {
        name: name.to_string(),
        priority,
        duration: duration_ms,
      })
      .await?;
    if !reply.success {
      let msg = reply_error(reply.error, reply.message);
      error!("add_task rejected: {}", msg);
      return Err(ApiError::Backend(msg));
    }

    info!("task submitted: {:?}", reply.task_id);
    self.schedule_refresh();
    Ok(match (reply.message, reply.task_id) {
      (Some(message), _) => message,
      (None, Some(id)) => format!("task {} submitted", id),
      (None, None) => "task submitted".into(),
    })
  }

  /// No client-side state check: the request always goes out and the
  /// backend's own validation decides, with its error surfaced verbatim.
  pub async fn cancel_task(&self, task_id: i64) -> Result<String, ApiError> {
    let reply = self.backend.cancel_task(CancelRequest { task_id }).await?;
    if !reply.success {
      let msg = reply_error(reply.error, reply.message);
      error!("cancel_task {} rejected: {}", task_id, msg);
      return Err(ApiError::Backend(msg));
    }
    info!("task {} cancelled", task_id);
    self.schedule_refresh();
    Ok(format!("task {} cancelled", task_id))
  }

  pub async fn run_simulation(&self, scenario: &str, count: u32, interval_ms: u64) -> Result<String, ApiError> {
    let reply = self
      .backend
      .simulate(SimulateRequest {
        scenario: scenario.to_string(),
        count,
        interval: interval_ms,
      })
      .await?;
    if !reply.success {
      return Err(ApiError::Backend(reply_error(reply.error, reply.message)));
    }
    self.schedule_refresh();
    Ok(match (reply.message, reply.total) {
      (Some(message), _) => message,
      (None, Some(total)) => format!("simulation started, {} tasks created", total),
      (None, None) => "simulation started".into(),
    })
  }

  /// Fetches the pre-rendered export and writes it verbatim to a
  /// timestamped file under `dir`; returns the path written. Read-only on
  /// the backend, so no follow-up poll.
  pub async fn export_snapshot(&self, format: ExportFormat, dir: &Path) -> Result<String, ApiError> {
    let body = self.backend.export(format).await?;
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("tasks_export_{}.{}", stamp, format.as_str()));
    tokio::fs::write(&path, body)
      .await
      .map_err(|e| ApiError::Backend(format!("failed to write {}: {}", path.display(), e)))?;
    info!("exported snapshot to {}", path.display());
    Ok(format!("exported to {}", path.display()))
  }

  fn schedule_refresh(&self) {
    let refresh = self.refresh.clone();
    tokio::spawn(async move {
      tokio::time::sleep(FOLLOWUP_DELAY).await;
      let _ = refresh.send(Command::Refresh).await;
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testutil::MockBackend;

  fn gateway(backend: MockBackend) -> (ActionGateway<MockBackend>, mpsc::Receiver<Command>) {
    let (tx, rx) = mpsc::channel(8);
    (ActionGateway::new(backend, tx), rx)
  }

  #[tokio::test(start_paused = true)]
  async fn success_schedules_exactly_one_followup_refresh() {
    let backend = MockBackend::healthy();
    let (gateway, mut rx) = gateway(backend);
    gateway.add_task("encode video", Priority::High, 5000).await.unwrap();

    // Nothing before the settle delay elapses.
    tokio::time::sleep(Duration::from_millis(499)).await;
    assert!(rx.try_recv().is_err());

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(rx.try_recv().unwrap(), Command::Refresh);

    // One refresh, not a burst.
    tokio::time::sleep(Duration::from_millis(5_000)).await;
    assert!(rx.try_recv().is_err());
  }

  #[tokio::test(start_paused = true)]
  async fn rejected_action_surfaces_error_and_skips_refresh() {
    let backend = MockBackend::rejecting("queue is full");
    let (gateway, mut rx) = gateway(backend);
    let err = gateway.add_task("encode video", Priority::Low, 1000).await.unwrap_err();
    assert_eq!(err.to_string(), "queue is full");

    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert!(rx.try_recv().is_err());
  }

  #[tokio::test]
  async fn invalid_input_is_rejected_before_any_request() {
    let backend = MockBackend::healthy();
    let (gateway, _rx) = gateway(backend.clone());

    assert!(gateway.add_task("", Priority::Low, 1000).await.is_err());
    assert!(gateway.add_task("rm -rf /", Priority::Low, 1000).await.is_err());
    assert!(gateway.add_task("fine name", Priority::Low, 0).await.is_err());
    assert!(backend.calls().is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn cancel_always_issues_the_request() {
    // The displayed status never gates the call; the backend decides.
    let backend = MockBackend::rejecting("only PENDING tasks can be cancelled");
    let (gateway, mut rx) = gateway(backend.clone());
    let err = gateway.cancel_task(9).await.unwrap_err();
    assert_eq!(err.to_string(), "only PENDING tasks can be cancelled");
    assert_eq!(backend.calls(), vec!["cancel:9".to_string()]);

    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert!(rx.try_recv().is_err());
  }

  #[tokio::test(start_paused = true)]
  async fn simulation_reports_the_backend_total() {
    let backend = MockBackend::healthy();
    let (gateway, mut rx) = gateway(backend);
    let msg = gateway.run_simulation("burst", 5, 200).await.unwrap();
    assert!(msg.contains('5'));

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(rx.try_recv().unwrap(), Command::Refresh);
  }

  #[tokio::test]
  async fn export_writes_the_payload_untouched() {
    let backend = MockBackend::healthy();
    let (gateway, mut rx) = gateway(backend);
    let dir = std::env::temp_dir();
    let msg = gateway.export_snapshot(ExportFormat::Csv, &dir).await.unwrap();

    let path = msg.strip_prefix("exported to ").unwrap();
    let written = std::fs::read_to_string(path).unwrap();
    assert_eq!(written, "id,name,status\n1,task-1,RUNNING\n");
    std::fs::remove_file(path).unwrap();

    // Export is read-only and schedules no follow-up poll.
    assert!(rx.try_recv().is_err());
  }
}
