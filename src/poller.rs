//! Poll scheduler: one control loop owns the session and the render sink.
//! Interval ticks and manual refreshes spawn fetch cycles; completed cycles
//! re-enter the loop over a channel and are applied under a generation
//! check, so nothing stale lands after a stop.

use std::time::Duration;

use chrono::Local;
use futures::try_join;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error};

use crate::api::{ApiError, Backend};
use crate::models::{Priority, TaskStatus};
use crate::render::RenderSink;
use crate::session::{PollData, Session};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
  Refresh,
  SetAutoRefresh(bool),
  SetVisible(bool),
  SetStatusFilter(Option<TaskStatus>),
  SetPriorityFilter(Option<Priority>),
  Shutdown,
}

struct CycleOutcome {
  generation: u64,
  result: Result<PollData, ApiError>,
}

pub struct Poller<B, S> {
  backend: B,
  sink: S,
  session: Session,
  interval: Duration,
  auto_refresh: bool,
  visible: bool,
  armed: bool,
  generation: u64,
}

impl<B: Backend, S: RenderSink> Poller<B, S> {
  pub fn new(backend: B, sink: S, interval: Duration) -> Self {
    Self {
      backend,
      sink,
      session: Session::new(),
      interval,
      auto_refresh: true,
      visible: true,
      armed: false,
      generation: 0,
    }
  }

  pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
    let (cycle_tx, mut cycle_rx) = mpsc::channel::<CycleOutcome>(8);
    let mut ticker = tokio::time::interval(self.interval);
    // A cycle outlasting the interval overlaps the next tick and renders
    // last-writer-wins; a saturated loop skips missed ticks, never bursts.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    self.armed = self.auto_refresh && self.visible;

    loop {
      tokio::select! {
        _ = ticker.tick(), if self.armed => self.spawn_cycle(&cycle_tx),
        Some(outcome) = cycle_rx.recv() => self.apply_cycle(outcome),
        cmd = commands.recv() => match cmd {
          None | Some(Command::Shutdown) => break,
          Some(cmd) => self.handle_command(cmd, &cycle_tx, &mut ticker),
        },
      }
    }
  }

  fn handle_command(&mut self, cmd: Command, cycle_tx: &mpsc::Sender<CycleOutcome>, ticker: &mut Interval) {
    match cmd {
      // One off-cadence cycle; the ticker phase is left untouched.
      Command::Refresh => self.spawn_cycle(cycle_tx),
      Command::SetAutoRefresh(enabled) => {
        self.auto_refresh = enabled;
        if enabled && self.visible {
          self.start(ticker);
          self.spawn_cycle(cycle_tx);
        } else {
          self.stop();
        }
      }
      Command::SetVisible(visible) => {
        self.visible = visible;
        if !visible {
          self.stop();
        } else if self.auto_refresh {
          self.start(ticker);
          self.spawn_cycle(cycle_tx);
        }
      }
      Command::SetStatusFilter(filter) => {
        self.session.set_status_filter(filter);
        let rows = self.session.refilter();
        self.sink.render_tasks(&rows);
      }
      Command::SetPriorityFilter(filter) => {
        self.session.set_priority_filter(filter);
        let rows = self.session.refilter();
        self.sink.render_tasks(&rows);
      }
      // Terminates the run loop before reaching here.
      Command::Shutdown => {}
    }
  }

  fn start(&mut self, ticker: &mut Interval) {
    // Re-arming resets the cadence; a tick missed while disarmed must not
    // fire on top of the explicit immediate cycle.
    ticker.reset();
    self.armed = true;
  }

  fn stop(&mut self) {
    if !self.armed {
      return;
    }
    self.armed = false;
    // Cycles spawned before this point resolve stale and are discarded.
    self.generation += 1;
  }

  fn spawn_cycle(&self, cycle_tx: &mpsc::Sender<CycleOutcome>) {
    let backend = self.backend.clone();
    let cycle_tx = cycle_tx.clone();
    let generation = self.generation;
    tokio::spawn(async move {
      let result = fetch_all(&backend).await;
      let _ = cycle_tx.send(CycleOutcome { generation, result }).await;
    });
  }

  fn apply_cycle(&mut self, outcome: CycleOutcome) {
    if outcome.generation != self.generation {
      debug!("discarding poll result from generation {}", outcome.generation);
      return;
    }
    match outcome.result {
      Ok(data) => {
        let label = Local::now().format("%H:%M:%S").to_string();
        let view = self.session.apply_poll(data, &label);
        self.sink.render_tasks(&view.rows);
        self.sink.render_stats(&view.status, &view.workers);
        self.sink.render_charts(&view.charts);
      }
      Err(e) => {
        // Reported and forgotten; the ticker stays armed for the next cycle.
        error!("poll cycle failed: {}", e);
        self.sink.render_error(&e.to_string());
      }
    }
  }
}

/// All four resources are fetched concurrently and joined; one failure
/// aborts the whole cycle so partial data is never rendered.
async fn fetch_all<B: Backend>(backend: &B) -> Result<PollData, ApiError> {
  let (status, tasks, workers, worker_stats) = try_join!(
    backend.fetch_status(),
    backend.fetch_tasks(),
    backend.fetch_workers(),
    backend.fetch_worker_stats(),
  )?;
  Ok(PollData {
    status,
    tasks,
    workers,
    worker_stats,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::{Arc, Mutex};

  use crate::testutil::{sample_poll, MockBackend, RecordingSink, SinkEvent};

  fn task_renders(events: &Arc<Mutex<Vec<SinkEvent>>>) -> usize {
    events.lock().unwrap().iter().filter(|e| matches!(e, SinkEvent::Tasks(_))).count()
  }

  fn error_renders(events: &Arc<Mutex<Vec<SinkEvent>>>) -> usize {
    events.lock().unwrap().iter().filter(|e| matches!(e, SinkEvent::Error(_))).count()
  }

  #[test]
  fn stale_generations_are_dropped_after_stop() {
    let (sink, events) = RecordingSink::new();
    let mut poller = Poller::new(MockBackend::healthy(), sink, DEFAULT_POLL_INTERVAL);
    poller.armed = true;
    let stale = poller.generation;
    poller.stop();

    poller.apply_cycle(CycleOutcome { generation: stale, result: Ok(sample_poll()) });
    assert_eq!(task_renders(&events), 0);

    // A cycle from the current generation (e.g. a manual refresh spawned
    // after the stop) still applies.
    poller.apply_cycle(CycleOutcome { generation: poller.generation, result: Ok(sample_poll()) });
    assert_eq!(task_renders(&events), 1);
  }

  #[test]
  fn failed_cycle_reports_error_and_stays_armed() {
    let (sink, events) = RecordingSink::new();
    let mut poller = Poller::new(MockBackend::healthy(), sink, DEFAULT_POLL_INTERVAL);
    poller.armed = true;
    poller.apply_cycle(CycleOutcome {
      generation: 0,
      result: Err(ApiError::Backend("backend down".into())),
    });
    assert!(poller.armed);
    assert_eq!(error_renders(&events), 1);
    assert_eq!(task_renders(&events), 0);
  }

  #[test]
  fn stop_is_a_no_op_when_disarmed() {
    let (sink, _events) = RecordingSink::new();
    let mut poller = Poller::new(MockBackend::healthy(), sink, DEFAULT_POLL_INTERVAL);
    let generation = poller.generation;
    poller.stop();
    assert_eq!(poller.generation, generation);
  }

  #[tokio::test(start_paused = true)]
  async fn auto_polling_toggle_and_manual_refresh() {
    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let (sink, events) = RecordingSink::new();
    let poller = Poller::new(MockBackend::healthy(), sink, Duration::from_millis(2000));
    let handle = tokio::spawn(poller.run(cmd_rx));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(task_renders(&events) >= 1);

    cmd_tx.send(Command::SetAutoRefresh(false)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let settled = task_renders(&events);
    tokio::time::sleep(Duration::from_millis(10_000)).await;
    assert_eq!(task_renders(&events), settled);

    // Manual refresh works while disarmed.
    cmd_tx.send(Command::Refresh).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(task_renders(&events), settled + 1);

    cmd_tx.send(Command::Shutdown).await.unwrap();
    handle.await.unwrap();
  }

  #[tokio::test(start_paused = true)]
  async fn failing_backend_keeps_the_cadence() {
    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let (sink, events) = RecordingSink::new();
    let poller = Poller::new(MockBackend::failing(), sink, Duration::from_millis(2000));
    let handle = tokio::spawn(poller.run(cmd_rx));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(error_renders(&events) >= 1);

    // Two more ticks fire despite the failures; nothing partial renders.
    tokio::time::sleep(Duration::from_millis(4_100)).await;
    assert!(error_renders(&events) >= 3);
    assert_eq!(task_renders(&events), 0);

    cmd_tx.send(Command::Shutdown).await.unwrap();
    handle.await.unwrap();
  }

  #[tokio::test(start_paused = true)]
  async fn hidden_terminal_pauses_polling_until_visible() {
    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let (sink, events) = RecordingSink::new();
    let poller = Poller::new(MockBackend::healthy(), sink, Duration::from_millis(2000));
    let handle = tokio::spawn(poller.run(cmd_rx));

    tokio::time::sleep(Duration::from_millis(100)).await;
    cmd_tx.send(Command::SetVisible(false)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let hidden = task_renders(&events);
    tokio::time::sleep(Duration::from_millis(10_000)).await;
    assert_eq!(task_renders(&events), hidden);

    // Visible again with auto-refresh still on: immediate cycle + cadence.
    cmd_tx.send(Command::SetVisible(true)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(task_renders(&events), hidden + 1);
    tokio::time::sleep(Duration::from_millis(2_100)).await;
    assert!(task_renders(&events) > hidden + 1);

    cmd_tx.send(Command::Shutdown).await.unwrap();
    handle.await.unwrap();
  }

  #[tokio::test(start_paused = true)]
  async fn filter_change_rerenders_without_a_fetch() {
    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let backend = MockBackend::healthy();
    let (sink, events) = RecordingSink::new();
    let poller = Poller::new(backend.clone(), sink, Duration::from_millis(2000));
    let handle = tokio::spawn(poller.run(cmd_rx));

    tokio::time::sleep(Duration::from_millis(100)).await;
    cmd_tx.send(Command::SetAutoRefresh(false)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let fetches = backend.count("status");
    let renders = task_renders(&events);

    cmd_tx.send(Command::SetStatusFilter(Some(TaskStatus::Running))).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(backend.count("status"), fetches);
    assert_eq!(task_renders(&events), renders + 1);

    let guard = events.lock().unwrap();
    let rows = guard
      .iter()
      .rev()
      .find_map(|e| match e {
        SinkEvent::Tasks(rows) => Some(rows.clone()),
        _ => None,
      })
      .unwrap();
    drop(guard);
    assert!(rows.iter().all(|r| r.task.status == TaskStatus::Running));

    cmd_tx.send(Command::Shutdown).await.unwrap();
    handle.await.unwrap();
  }
}
