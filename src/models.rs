use serde::{Serialize, Deserialize, Deserializer, Serializer};
use chrono::NaiveDateTime;

/// Wire format for the scheduler's timestamp fields.
/// The backend sends local-time strings, with the empty string standing in
/// for a timestamp that has not been populated yet.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
  Low,
  Medium,
  High,
  Critical,
}

impl Priority {
  pub const ALL: [Priority; 4] = [Priority::Low, Priority::Medium, Priority::High, Priority::Critical];

  pub fn as_str(self) -> &'static str {
    match self {
      Priority::Low => "LOW",
      Priority::Medium => "MEDIUM",
      Priority::High => "HIGH",
      Priority::Critical => "CRITICAL",
    }
  }
}

impl std::str::FromStr for Priority {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_uppercase().as_str() {
      "LOW" => Ok(Priority::Low),
      "MEDIUM" => Ok(Priority::Medium),
      "HIGH" => Ok(Priority::High),
      "CRITICAL" => Ok(Priority::Critical),
      other => Err(format!("unknown priority: {}", other)),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
  Pending,
  Running,
  Completed,
  Failed,
}

impl TaskStatus {
  pub const ALL: [TaskStatus; 4] = [TaskStatus::Pending, TaskStatus::Running, TaskStatus::Completed, TaskStatus::Failed];

  pub fn as_str(self) -> &'static str {
    match self {
      TaskStatus::Pending => "PENDING",
      TaskStatus::Running => "RUNNING",
      TaskStatus::Completed => "COMPLETED",
      TaskStatus::Failed => "FAILED",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
  pub id: i64,
  pub name: String,
  pub priority: Priority,
  pub status: TaskStatus,
  #[serde(default)]
  pub progress: f64,
  #[serde(default = "unassigned")]
  pub worker_id: i64,
  #[serde(default, deserialize_with = "de_timestamp", serialize_with = "ser_timestamp")]
  pub creation_time: Option<NaiveDateTime>,
  #[serde(default, deserialize_with = "de_timestamp", serialize_with = "ser_timestamp")]
  pub start_time: Option<NaiveDateTime>,
  #[serde(default, deserialize_with = "de_timestamp", serialize_with = "ser_timestamp")]
  pub end_time: Option<NaiveDateTime>,
  #[serde(default)]
  pub execution_time_ms: u64,
}

fn unassigned() -> i64 {
  -1
}

fn de_timestamp<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
  D: Deserializer<'de>,
{
  let raw = Option::<String>::deserialize(deserializer)?;
  match raw.as_deref() {
    None | Some("") => Ok(None),
    Some(s) => NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
      .map(Some)
      .map_err(serde::de::Error::custom),
  }
}

fn ser_timestamp<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
where
  S: Serializer,
{
  match value {
    Some(t) => serializer.serialize_str(&t.format(TIMESTAMP_FORMAT).to_string()),
    None => serializer.serialize_str(""),
  }
}

#[derive(Debug, Deserialize)]
pub struct TaskList {
  #[serde(default)]
  pub tasks: Vec<Task>,
}

/// Aggregate counters reported by `/api/status`. The backend may also send
/// fields this client does not use (`timeout_tasks`, `queue_size`, ...) and
/// the counts are not guaranteed to be mutually consistent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusAggregate {
  pub total_tasks: u64,
  pub running_tasks: u64,
  pub pending_tasks: u64,
  pub completed_tasks: u64,
  pub failed_tasks: u64,
  pub active_workers: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerRoster {
  pub active_workers: u64,
  pub total_workers: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStat {
  pub id: i64,
  #[serde(default)]
  pub running: u64,
  #[serde(default)]
  pub completed: u64,
}

#[derive(Debug, Deserialize)]
pub struct WorkerStatList {
  #[serde(default)]
  pub workers: Vec<WorkerStat>,
}

#[derive(Debug, Serialize)]
pub struct AddTaskRequest {
  pub name: String,
  pub priority: Priority,
  pub duration: u64,
}

#[derive(Debug, Serialize)]
pub struct CancelRequest {
  pub task_id: i64,
}

#[derive(Debug, Serialize)]
pub struct SimulateRequest {
  pub scenario: String,
  pub count: u32,
  pub interval: u64,
}

/// One reply shape covers all mutating endpoints; absent fields stay `None`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ActionReply {
  pub success: bool,
  pub task_id: Option<i64>,
  pub total: Option<u64>,
  pub message: Option<String>,
  pub error: Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_task_in_wire_format() {
    let json = r#"{
      "id": 7,
      "name": "encode video",
      "priority": "HIGH",
      "status": "RUNNING",
      "progress": 42.5,
      "worker_id": 1,
      "creation_time": "2026-08-06 10:00:00",
      "start_time": "2026-08-06 10:00:02",
      "end_time": "",
      "execution_time_ms": 5000
    }"#;
    let task: Task = serde_json::from_str(json).unwrap();
    assert_eq!(task.id, 7);
    assert_eq!(task.priority, Priority::High);
    assert_eq!(task.status, TaskStatus::Running);
    assert!(task.start_time.is_some());
    assert_eq!(task.end_time, None);
    assert_eq!(task.execution_time_ms, 5000);
  }

  #[test]
  fn absent_progress_and_timestamps_default() {
    let json = r#"{"id": 1, "name": "t", "priority": "LOW", "status": "PENDING"}"#;
    let task: Task = serde_json::from_str(json).unwrap();
    assert_eq!(task.progress, 0.0);
    assert_eq!(task.worker_id, -1);
    assert_eq!(task.creation_time, None);
  }

  #[test]
  fn status_aggregate_tolerates_extra_and_missing_fields() {
    let json = r#"{"total_tasks": 9, "completed_tasks": 4, "timeout_tasks": 1, "queue_size": 3}"#;
    let status: StatusAggregate = serde_json::from_str(json).unwrap();
    assert_eq!(status.total_tasks, 9);
    assert_eq!(status.completed_tasks, 4);
    assert_eq!(status.failed_tasks, 0);
  }

  #[test]
  fn task_list_defaults_to_empty() {
    let list: TaskList = serde_json::from_str("{}").unwrap();
    assert!(list.tasks.is_empty());
  }

  #[test]
  fn priority_parses_case_insensitively() {
    assert_eq!("critical".parse::<Priority>().unwrap(), Priority::Critical);
    assert_eq!("Low".parse::<Priority>().unwrap(), Priority::Low);
    assert!("urgent".parse::<Priority>().is_err());
  }
}
