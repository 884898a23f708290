//! Turns a raw fetched task list plus the previous poll's snapshot into a
//! render-ready view: filtered, newest-first, annotated with "is-new".

use std::collections::HashMap;

use crate::models::{Priority, Task, TaskStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Filters {
  pub status: Option<TaskStatus>,
  pub priority: Option<Priority>,
}

impl Filters {
  pub fn matches(&self, task: &Task) -> bool {
    self.status.map_or(true, |s| task.status == s)
      && self.priority.map_or(true, |p| task.priority == p)
  }
}

/// Task map retained from the previous poll. Replaced wholesale each cycle;
/// there is no history beyond one poll back. Until the first replacement the
/// store is unseeded and nothing counts as new, so a cold start does not
/// highlight the entire table.
#[derive(Debug, Default)]
pub struct SnapshotStore {
  tasks: HashMap<i64, Task>,
  seeded: bool,
}

impl SnapshotStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn contains(&self, id: i64) -> bool {
    self.tasks.contains_key(&id)
  }

  pub fn get(&self, id: i64) -> Option<&Task> {
    self.tasks.get(&id)
  }

  pub fn is_seeded(&self) -> bool {
    self.seeded
  }

  /// Rebuilds the store from an unfiltered task list. Filtered views must
  /// never feed this, or hidden tasks would flash "new" when a filter lifts.
  pub fn replace(&mut self, tasks: &[Task]) {
    self.tasks = tasks.iter().map(|t| (t.id, t.clone())).collect();
    self.seeded = true;
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskRow {
  pub task: Task,
  pub is_new: bool,
}

/// Pure view computation against the pre-update snapshot. The caller is
/// responsible for calling `store.replace` afterwards on poll cycles, and
/// for skipping the replacement on filter-only re-runs.
pub fn reconcile(tasks: &[Task], filters: &Filters, store: &SnapshotStore) -> Vec<TaskRow> {
  let mut rows: Vec<TaskRow> = tasks
    .iter()
    .filter(|t| filters.matches(t))
    .map(|t| TaskRow {
      task: t.clone(),
      is_new: store.is_seeded() && !store.contains(t.id),
    })
    .collect();
  rows.sort_by(|a, b| b.task.id.cmp(&a.task.id));
  rows
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testutil::sample_task;

  #[test]
  fn sorts_by_id_descending() {
    let tasks: Vec<Task> = [3, 1, 4, 1, 5].iter().map(|&id| sample_task(id)).collect();
    let rows = reconcile(&tasks, &Filters::default(), &SnapshotStore::new());
    let ids: Vec<i64> = rows.iter().map(|r| r.task.id).collect();
    assert_eq!(ids, vec![5, 4, 3, 1, 1]);
  }

  #[test]
  fn filters_are_conjunctive() {
    let mut running_high = sample_task(1);
    running_high.status = TaskStatus::Running;
    running_high.priority = Priority::High;
    let mut running_low = sample_task(2);
    running_low.status = TaskStatus::Running;
    running_low.priority = Priority::Low;
    let mut pending_high = sample_task(3);
    pending_high.status = TaskStatus::Pending;
    pending_high.priority = Priority::High;

    let filters = Filters {
      status: Some(TaskStatus::Running),
      priority: Some(Priority::High),
    };
    let tasks = vec![running_high, running_low, pending_high];
    let rows = reconcile(&tasks, &filters, &SnapshotStore::new());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].task.id, 1);
  }

  #[test]
  fn empty_filter_result_is_empty_not_an_error() {
    let tasks = vec![sample_task(1)];
    let filters = Filters {
      status: Some(TaskStatus::Failed),
      priority: None,
    };
    assert!(reconcile(&tasks, &filters, &SnapshotStore::new()).is_empty());
  }

  #[test]
  fn nothing_is_new_on_the_seeding_poll() {
    let tasks = vec![sample_task(1), sample_task(2)];
    let store = SnapshotStore::new();
    let rows = reconcile(&tasks, &Filters::default(), &store);
    assert!(rows.iter().all(|r| !r.is_new));
  }

  #[test]
  fn new_task_is_flagged_exactly_once() {
    let mut store = SnapshotStore::new();
    let first = vec![sample_task(1)];
    reconcile(&first, &Filters::default(), &store);
    store.replace(&first);

    let second = vec![sample_task(1), sample_task(2)];
    let rows = reconcile(&second, &Filters::default(), &store);
    assert!(!rows.iter().find(|r| r.task.id == 1).unwrap().is_new);
    assert!(rows.iter().find(|r| r.task.id == 2).unwrap().is_new);
    store.replace(&second);

    let rows = reconcile(&second, &Filters::default(), &store);
    assert!(rows.iter().all(|r| !r.is_new));
  }

  #[test]
  fn store_replacement_uses_the_unfiltered_list() {
    let mut store = SnapshotStore::new();
    let tasks = vec![sample_task(1), sample_task(2)];
    let filters = Filters {
      status: Some(TaskStatus::Failed),
      priority: None,
    };
    // The filtered view is empty, but both ids still land in the store.
    assert!(reconcile(&tasks, &filters, &store).is_empty());
    store.replace(&tasks);
    assert!(store.contains(1) && store.contains(2));
  }
}
