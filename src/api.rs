//! HTTP client for the scheduler's API. The `Backend` trait is the seam the
//! poller and the action gateway are written against, so both run headless
//! in tests.

use std::future::Future;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::models::{
  ActionReply, AddTaskRequest, CancelRequest, SimulateRequest, StatusAggregate, Task, TaskList,
  WorkerRoster, WorkerStat, WorkerStatList,
};

/// Transport failures (network, timeout, non-2xx) are distinct from
/// application failures (`success: false` with a backend-reported error).
/// Polling reports both passively; actions surface both to the user.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
  #[error("transport error: {0}")]
  Transport(#[from] reqwest::Error),
  #[error("{0}")]
  Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
  Csv,
  Json,
}

impl ExportFormat {
  pub fn as_str(self) -> &'static str {
    match self {
      ExportFormat::Csv => "csv",
      ExportFormat::Json => "json",
    }
  }
}

pub trait Backend: Clone + Send + Sync + 'static {
  fn fetch_status(&self) -> impl Future<Output = Result<StatusAggregate, ApiError>> + Send;
  fn fetch_tasks(&self) -> impl Future<Output = Result<Vec<Task>, ApiError>> + Send;
  fn fetch_workers(&self) -> impl Future<Output = Result<WorkerRoster, ApiError>> + Send;
  fn fetch_worker_stats(&self) -> impl Future<Output = Result<Vec<WorkerStat>, ApiError>> + Send;
  fn add_task(&self, req: AddTaskRequest) -> impl Future<Output = Result<ActionReply, ApiError>> + Send;
  fn cancel_task(&self, req: CancelRequest) -> impl Future<Output = Result<ActionReply, ApiError>> + Send;
  fn simulate(&self, req: SimulateRequest) -> impl Future<Output = Result<ActionReply, ApiError>> + Send;
  fn export(&self, format: ExportFormat) -> impl Future<Output = Result<String, ApiError>> + Send;
}

#[derive(Clone)]
pub struct HttpBackend {
  client: reqwest::Client,
  base_url: String,
}

impl HttpBackend {
  pub fn new(config: &Config) -> Self {
    Self {
      client: reqwest::Client::new(),
      base_url: config.api_base_url.trim_end_matches('/').to_string(),
    }
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.base_url, path)
  }

  async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
    let response = self.client.get(self.url(path)).send().await?.error_for_status()?;
    Ok(response.json().await?)
  }

  async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<ActionReply, ApiError> {
    let response = self.client.post(self.url(path)).json(body).send().await?.error_for_status()?;
    Ok(response.json().await?)
  }
}

impl Backend for HttpBackend {
  async fn fetch_status(&self) -> Result<StatusAggregate, ApiError> {
    self.get_json("/api/status").await
  }

  async fn fetch_tasks(&self) -> Result<Vec<Task>, ApiError> {
    let list: TaskList = self.get_json("/api/tasks").await?;
    Ok(list.tasks)
  }

  async fn fetch_workers(&self) -> Result<WorkerRoster, ApiError> {
    self.get_json("/api/workers").await
  }

  async fn fetch_worker_stats(&self) -> Result<Vec<WorkerStat>, ApiError> {
    let list: WorkerStatList = self.get_json("/api/worker_stats").await?;
    Ok(list.workers)
  }

  async fn add_task(&self, req: AddTaskRequest) -> Result<ActionReply, ApiError> {
    self.post_json("/api/add_task", &req).await
  }

  async fn cancel_task(&self, req: CancelRequest) -> Result<ActionReply, ApiError> {
    self.post_json("/api/cancel_task", &req).await
  }

  async fn simulate(&self, req: SimulateRequest) -> Result<ActionReply, ApiError> {
    self.post_json("/api/simulate", &req).await
  }

  async fn export(&self, format: ExportFormat) -> Result<String, ApiError> {
    let path = format!("/api/export/{}", format.as_str());
    let response = self.client.get(self.url(&path)).send().await?.error_for_status()?;
    Ok(response.text().await?)
  }
}
