//! Canned backend and recording sink shared by the scheduler and gateway
//! tests.

use std::sync::{Arc, Mutex};

use crate::api::{ApiError, Backend, ExportFormat};
use crate::models::{
  ActionReply, AddTaskRequest, CancelRequest, Priority, SimulateRequest, StatusAggregate, Task,
  TaskStatus, WorkerRoster, WorkerStat,
};
use crate::reconcile::TaskRow;
use crate::render::{ChartData, RenderSink};
use crate::session::PollData;

pub fn sample_task(id: i64) -> Task {
  Task {
    id,
    name: format!("task-{}", id),
    priority: Priority::Medium,
    status: TaskStatus::Pending,
    progress: 0.0,
    worker_id: -1,
    creation_time: None,
    start_time: None,
    end_time: None,
    execution_time_ms: 1000,
  }
}

pub fn sample_poll() -> PollData {
  let mut running = sample_task(1);
  running.status = TaskStatus::Running;
  running.worker_id = 0;
  PollData {
    status: StatusAggregate {
      total_tasks: 2,
      running_tasks: 1,
      pending_tasks: 1,
      completed_tasks: 5,
      failed_tasks: 0,
      active_workers: 1,
    },
    tasks: vec![running, sample_task(2)],
    workers: WorkerRoster { active_workers: 1, total_workers: 3 },
    worker_stats: vec![WorkerStat { id: 0, running: 1, completed: 5 }],
  }
}

#[derive(Clone)]
pub struct MockBackend {
  fail: bool,
  reply: ActionReply,
  calls: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
  pub fn healthy() -> Self {
    Self {
      fail: false,
      reply: ActionReply {
        success: true,
        task_id: Some(42),
        total: Some(5),
        message: None,
        error: None,
      },
      calls: Arc::new(Mutex::new(Vec::new())),
    }
  }

  pub fn failing() -> Self {
    Self { fail: true, ..Self::healthy() }
  }

  pub fn rejecting(error: &str) -> Self {
    let mut mock = Self::healthy();
    mock.reply = ActionReply {
      success: false,
      error: Some(error.into()),
      ..ActionReply::default()
    };
    mock
  }

  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

  pub fn count(&self, name: &str) -> usize {
    self.calls.lock().unwrap().iter().filter(|c| c.starts_with(name)).count()
  }

  fn record(&self, call: String) {
    self.calls.lock().unwrap().push(call);
  }

  fn reply_or_fail(&self) -> Result<ActionReply, ApiError> {
    if self.fail {
      return Err(ApiError::Backend("backend down".into()));
    }
    Ok(self.reply.clone())
  }
}

impl Backend for MockBackend {
  async fn fetch_status(&self) -> Result<StatusAggregate, ApiError> {
    self.record("status".into());
    if self.fail {
      return Err(ApiError::Backend("backend down".into()));
    }
    Ok(sample_poll().status)
  }

  async fn fetch_tasks(&self) -> Result<Vec<Task>, ApiError> {
    self.record("tasks".into());
    if self.fail {
      return Err(ApiError::Backend("backend down".into()));
    }
    Ok(sample_poll().tasks)
  }

  async fn fetch_workers(&self) -> Result<WorkerRoster, ApiError> {
    self.record("workers".into());
    if self.fail {
      return Err(ApiError::Backend("backend down".into()));
    }
    Ok(sample_poll().workers)
  }

  async fn fetch_worker_stats(&self) -> Result<Vec<WorkerStat>, ApiError> {
    self.record("worker_stats".into());
    if self.fail {
      return Err(ApiError::Backend("backend down".into()));
    }
    Ok(sample_poll().worker_stats)
  }

  async fn add_task(&self, req: AddTaskRequest) -> Result<ActionReply, ApiError> {
    self.record(format!("add:{}", req.name));
    self.reply_or_fail()
  }

  async fn cancel_task(&self, req: CancelRequest) -> Result<ActionReply, ApiError> {
    self.record(format!("cancel:{}", req.task_id));
    self.reply_or_fail()
  }

  async fn simulate(&self, req: SimulateRequest) -> Result<ActionReply, ApiError> {
    self.record(format!("simulate:{}:{}", req.scenario, req.count));
    self.reply_or_fail()
  }

  async fn export(&self, format: ExportFormat) -> Result<String, ApiError> {
    self.record(format!("export:{}", format.as_str()));
    if self.fail {
      return Err(ApiError::Backend("backend down".into()));
    }
    Ok("id,name,status\n1,task-1,RUNNING\n".into())
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
  Tasks(Vec<TaskRow>),
  Stats(StatusAggregate, WorkerRoster),
  Charts(ChartData),
  Error(String),
}

pub struct RecordingSink {
  events: Arc<Mutex<Vec<SinkEvent>>>,
}

impl RecordingSink {
  pub fn new() -> (Self, Arc<Mutex<Vec<SinkEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    (Self { events: events.clone() }, events)
  }
}

impl RenderSink for RecordingSink {
  fn render_tasks(&mut self, rows: &[TaskRow]) {
    self.events.lock().unwrap().push(SinkEvent::Tasks(rows.to_vec()));
  }

  fn render_stats(&mut self, status: &StatusAggregate, workers: &WorkerRoster) {
    self.events.lock().unwrap().push(SinkEvent::Stats(status.clone(), workers.clone()));
  }

  fn render_charts(&mut self, charts: &ChartData) {
    self.events.lock().unwrap().push(SinkEvent::Charts(charts.clone()));
  }

  fn render_error(&mut self, message: &str) {
    self.events.lock().unwrap().push(SinkEvent::Error(message.into()));
  }
}
