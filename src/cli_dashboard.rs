//! Terminal dashboard for a remote task scheduler
//! Stats bar (aggregate counters), task table with filters and detail view,
//! worker roster with per-worker stats, throughput sparkline

use std::{
  error::Error,
  io,
  path::Path,
  sync::{mpsc as std_mpsc, Arc},
  time::{Duration, Instant},
};

use crossterm::{
  event::{self, DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture, Event as CEvent, KeyCode},
  execute,
  terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use tui::{
  backend::{Backend, CrosstermBackend},
  layout::{Constraint, Direction, Layout, Rect},
  style::{Color, Modifier, Style},
  text::{Span, Spans},
  widgets::{Block, Borders, Cell, Clear, List, ListItem, Paragraph, Row, Sparkline, Table, TableState},
  Terminal,
};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

use taskmon::actions::ActionGateway;
use taskmon::api::{ApiError, ExportFormat, HttpBackend};
use taskmon::config::Config;
use taskmon::metrics::{format_secs, task_timings};
use taskmon::models::{Priority, StatusAggregate, TaskStatus, WorkerRoster};
use taskmon::poller::{Command, Poller};
use taskmon::reconcile::TaskRow;
use taskmon::render::{ChartData, RenderSink};

enum Update {
  Tasks(Vec<TaskRow>),
  Stats(StatusAggregate, WorkerRoster),
  Charts(ChartData),
  PollError(String),
  Message(String),
}

struct ChannelSink {
  tx: std_mpsc::Sender<Update>,
}

impl RenderSink for ChannelSink {
  fn render_tasks(&mut self, rows: &[TaskRow]) {
    let _ = self.tx.send(Update::Tasks(rows.to_vec()));
  }

  fn render_stats(&mut self, status: &StatusAggregate, workers: &WorkerRoster) {
    let _ = self.tx.send(Update::Stats(status.clone(), workers.clone()));
  }

  fn render_charts(&mut self, charts: &ChartData) {
    let _ = self.tx.send(Update::Charts(charts.clone()));
  }

  fn render_error(&mut self, message: &str) {
    let _ = self.tx.send(Update::PollError(message.into()));
  }
}

enum InputMode {
  Normal,
  AddTask(String),
  Simulate(String),
}

struct App {
  rows: Vec<TaskRow>,
  status: StatusAggregate,
  workers: WorkerRoster,
  charts: ChartData,
  selected: usize,
  show_detail: bool,
  auto_refresh: bool,
  status_filter: Option<TaskStatus>,
  priority_filter: Option<Priority>,
  stale: bool,
  last_update: Option<String>,
  message: Option<String>,
  input: InputMode,
}

impl App {
  fn new() -> Self {
    Self {
      rows: vec![],
      status: StatusAggregate::default(),
      workers: WorkerRoster::default(),
      charts: ChartData::default(),
      selected: 0,
      show_detail: false,
      auto_refresh: true,
      status_filter: None,
      priority_filter: None,
      stale: false,
      last_update: None,
      message: None,
      input: InputMode::Normal,
    }
  }

  fn apply(&mut self, update: Update) {
    match update {
      Update::Tasks(rows) => {
        self.rows = rows;
        if self.selected >= self.rows.len() {
          self.selected = self.rows.len().saturating_sub(1);
        }
        self.stale = false;
        self.last_update = Some(chrono::Local::now().format("%H:%M:%S").to_string());
      }
      Update::Stats(status, workers) => {
        self.status = status;
        self.workers = workers;
      }
      Update::Charts(charts) => self.charts = charts,
      Update::PollError(message) => {
        self.stale = true;
        self.message = Some(message);
      }
      Update::Message(message) => self.message = Some(message),
    }
  }

  fn select_previous(&mut self) {
    self.selected = self.selected.saturating_sub(1);
  }

  fn select_next(&mut self) {
    if self.selected + 1 < self.rows.len() {
      self.selected += 1;
    }
  }

  fn selected_task_id(&self) -> Option<i64> {
    self.rows.get(self.selected).map(|r| r.task.id)
  }

  fn cycle_status_filter(&mut self) -> Option<TaskStatus> {
    self.status_filter = match self.status_filter {
      None => Some(TaskStatus::ALL[0]),
      Some(current) => TaskStatus::ALL
        .iter()
        .position(|s| *s == current)
        .and_then(|i| TaskStatus::ALL.get(i + 1))
        .copied(),
    };
    self.status_filter
  }

  fn cycle_priority_filter(&mut self) -> Option<Priority> {
    self.priority_filter = match self.priority_filter {
      None => Some(Priority::ALL[0]),
      Some(current) => Priority::ALL
        .iter()
        .position(|p| *p == current)
        .and_then(|i| Priority::ALL.get(i + 1))
        .copied(),
    };
    self.priority_filter
  }
}

fn parse_add_task(input: &str) -> Result<(String, Priority, u64), String> {
  let tokens: Vec<&str> = input.split_whitespace().collect();
  if tokens.len() < 3 {
    return Err("expected: <name> <priority> <duration_ms>".into());
  }
  let duration: u64 = tokens[tokens.len() - 1]
    .parse()
    .map_err(|_| "duration must be an integer".to_string())?;
  let priority: Priority = tokens[tokens.len() - 2].parse()?;
  let name = tokens[..tokens.len() - 2].join(" ");
  Ok((name, priority, duration))
}

fn parse_simulation(input: &str) -> Result<(String, u32, u64), String> {
  let tokens: Vec<&str> = input.split_whitespace().collect();
  if tokens.len() != 3 {
    return Err("expected: <scenario> <count> <interval_ms>".into());
  }
  let count: u32 = tokens[1].parse().map_err(|_| "count must be an integer".to_string())?;
  let interval: u64 = tokens[2].parse().map_err(|_| "interval must be an integer".to_string())?;
  Ok((tokens[0].to_string(), count, interval))
}

fn main() -> Result<(), Box<dyn Error>> {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_writer(io::stderr)
    .init();

  enable_raw_mode()?;
  let mut stdout = io::stdout();
  execute!(stdout, EnterAlternateScreen, EnableMouseCapture, EnableFocusChange)?;
  let backend = CrosstermBackend::new(stdout);
  let mut terminal = Terminal::new(backend)?;

  let config = Config::from_env();
  let rt = Runtime::new()?;
  let api = HttpBackend::new(&config);

  let (update_tx, update_rx) = std_mpsc::channel::<Update>();
  let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(32);

  let sink = ChannelSink { tx: update_tx.clone() };
  let poller = Poller::new(api.clone(), sink, Duration::from_millis(config.poll_interval_ms));
  rt.spawn(poller.run(cmd_rx));

  let gateway = Arc::new(ActionGateway::new(api, cmd_tx.clone()));

  let result = run_app(&mut terminal, &rt, &gateway, &cmd_tx, &update_tx, update_rx);

  disable_raw_mode()?;
  execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture, DisableFocusChange)?;
  terminal.show_cursor()?;
  result
}

fn run_app<B: Backend>(
  terminal: &mut Terminal<B>,
  rt: &Runtime,
  gateway: &Arc<ActionGateway<HttpBackend>>,
  cmd_tx: &mpsc::Sender<Command>,
  update_tx: &std_mpsc::Sender<Update>,
  update_rx: std_mpsc::Receiver<Update>,
) -> Result<(), Box<dyn Error>> {
  let mut app = App::new();
  let tick_rate = Duration::from_millis(250);
  let mut last_tick = Instant::now();

  loop {
    while let Ok(update) = update_rx.try_recv() {
      app.apply(update);
    }
    terminal.draw(|f| ui(f, &app))?;

    let timeout = tick_rate
      .checked_sub(last_tick.elapsed())
      .unwrap_or_else(|| Duration::from_secs(0));
    if event::poll(timeout)? {
      match event::read()? {
        CEvent::Key(key) => {
          if handle_key(key.code, &mut app, rt, gateway, cmd_tx, update_tx) {
            break;
          }
        }
        CEvent::FocusLost => {
          let _ = cmd_tx.try_send(Command::SetVisible(false));
        }
        CEvent::FocusGained => {
          let _ = cmd_tx.try_send(Command::SetVisible(true));
        }
        _ => {}
      }
    }
    if last_tick.elapsed() >= tick_rate {
      last_tick = Instant::now();
    }
  }

  let _ = cmd_tx.try_send(Command::Shutdown);
  Ok(())
}

fn handle_key(
  code: KeyCode,
  app: &mut App,
  rt: &Runtime,
  gateway: &Arc<ActionGateway<HttpBackend>>,
  cmd_tx: &mpsc::Sender<Command>,
  update_tx: &std_mpsc::Sender<Update>,
) -> bool {
  if !matches!(app.input, InputMode::Normal) {
    handle_input_key(code, app, rt, gateway, update_tx);
    return false;
  }

  match code {
    KeyCode::Char('q') => return true,
    KeyCode::Char('r') => {
      let _ = cmd_tx.try_send(Command::Refresh);
    }
    KeyCode::Char('a') => {
      app.auto_refresh = !app.auto_refresh;
      let _ = cmd_tx.try_send(Command::SetAutoRefresh(app.auto_refresh));
    }
    KeyCode::Char('s') => {
      let filter = app.cycle_status_filter();
      let _ = cmd_tx.try_send(Command::SetStatusFilter(filter));
    }
    KeyCode::Char('p') => {
      let filter = app.cycle_priority_filter();
      let _ = cmd_tx.try_send(Command::SetPriorityFilter(filter));
    }
    KeyCode::Up => app.select_previous(),
    KeyCode::Down => app.select_next(),
    KeyCode::Enter => app.show_detail = !app.show_detail,
    KeyCode::Esc => app.show_detail = false,
    KeyCode::Char('c') => {
      if let Some(id) = app.selected_task_id() {
        let gw = gateway.clone();
        dispatch(rt, update_tx, async move { gw.cancel_task(id).await });
      }
    }
    KeyCode::Char('n') => app.input = InputMode::AddTask(String::new()),
    KeyCode::Char('m') => app.input = InputMode::Simulate(String::new()),
    KeyCode::Char('e') => {
      let gw = gateway.clone();
      dispatch(rt, update_tx, async move { gw.export_snapshot(ExportFormat::Csv, Path::new(".")).await });
    }
    KeyCode::Char('j') => {
      let gw = gateway.clone();
      dispatch(rt, update_tx, async move { gw.export_snapshot(ExportFormat::Json, Path::new(".")).await });
    }
    _ => {}
  }
  false
}

fn handle_input_key(
  code: KeyCode,
  app: &mut App,
  rt: &Runtime,
  gateway: &Arc<ActionGateway<HttpBackend>>,
  update_tx: &std_mpsc::Sender<Update>,
) {
  match code {
    KeyCode::Esc => app.input = InputMode::Normal,
    KeyCode::Backspace => {
      if let InputMode::AddTask(buffer) | InputMode::Simulate(buffer) = &mut app.input {
        buffer.pop();
      }
    }
    KeyCode::Char(c) => {
      if let InputMode::AddTask(buffer) | InputMode::Simulate(buffer) = &mut app.input {
        buffer.push(c);
      }
    }
    KeyCode::Enter => {
      let mode = std::mem::replace(&mut app.input, InputMode::Normal);
      match mode {
        InputMode::AddTask(buffer) => match parse_add_task(&buffer) {
          Ok((name, priority, duration)) => {
            let gw = gateway.clone();
            dispatch(rt, update_tx, async move { gw.add_task(&name, priority, duration).await });
          }
          Err(e) => app.message = Some(e),
        },
        InputMode::Simulate(buffer) => match parse_simulation(&buffer) {
          Ok((scenario, count, interval)) => {
            let gw = gateway.clone();
            dispatch(rt, update_tx, async move { gw.run_simulation(&scenario, count, interval).await });
          }
          Err(e) => app.message = Some(e),
        },
        InputMode::Normal => {}
      }
    }
    _ => {}
  }
}

fn dispatch<F>(rt: &Runtime, update_tx: &std_mpsc::Sender<Update>, action: F)
where
  F: std::future::Future<Output = Result<String, ApiError>> + Send + 'static,
{
  let update_tx = update_tx.clone();
  rt.spawn(async move {
    let update = match action.await {
      Ok(message) => Update::Message(message),
      Err(e) => Update::Message(format!("action failed: {}", e)),
    };
    let _ = update_tx.send(update);
  });
}

fn status_color(status: TaskStatus) -> Color {
  match status {
    TaskStatus::Pending => Color::Blue,
    TaskStatus::Running => Color::Yellow,
    TaskStatus::Completed => Color::Green,
    TaskStatus::Failed => Color::Red,
  }
}

fn priority_color(priority: Priority) -> Color {
  match priority {
    Priority::Low => Color::DarkGray,
    Priority::Medium => Color::Cyan,
    Priority::High => Color::Magenta,
    Priority::Critical => Color::Red,
  }
}

fn ui<B: Backend>(f: &mut tui::Frame<B>, app: &App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .margin(1)
    .constraints([
      Constraint::Length(3),
      Constraint::Min(0),
      Constraint::Length(3),
    ].as_ref())
    .split(f.size());

  render_stats_bar(f, app, chunks[0]);

  let main = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Percentage(62), Constraint::Percentage(38)].as_ref())
    .split(chunks[1]);
  render_task_table(f, app, main[0]);

  let side = Layout::default()
    .direction(Direction::Vertical)
    .constraints([Constraint::Percentage(55), Constraint::Percentage(45)].as_ref())
    .split(main[1]);
  render_workers(f, app, side[0]);
  render_throughput(f, app, side[1]);

  render_footer(f, app, chunks[2]);

  if app.show_detail {
    render_detail(f, app);
  }
}

fn render_stats_bar<B: Backend>(f: &mut tui::Frame<B>, app: &App, area: Rect) {
  let s = &app.status;
  let indicator = if app.stale {
    Span::styled("stale", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD))
  } else {
    Span::styled("live", Style::default().fg(Color::Green))
  };
  let line = Spans::from(vec![
    Span::styled(format!("Total: {}", s.total_tasks), Style::default().add_modifier(Modifier::BOLD)),
    Span::raw(" | "),
    Span::styled(format!("Pending: {}", s.pending_tasks), Style::default().fg(status_color(TaskStatus::Pending))),
    Span::raw(" | "),
    Span::styled(format!("Running: {}", s.running_tasks), Style::default().fg(status_color(TaskStatus::Running))),
    Span::raw(" | "),
    Span::styled(format!("Completed: {}", s.completed_tasks), Style::default().fg(status_color(TaskStatus::Completed))),
    Span::raw(" | "),
    Span::styled(format!("Failed: {}", s.failed_tasks), Style::default().fg(status_color(TaskStatus::Failed))),
    Span::raw(format!(
      " | Workers: {}/{} | ",
      app.workers.active_workers, app.workers.total_workers
    )),
    indicator,
    Span::raw(format!(
      " | auto: {} | updated {}",
      if app.auto_refresh { "on" } else { "off" },
      app.last_update.as_deref().unwrap_or("never")
    )),
  ]);
  let stats = Paragraph::new(line)
    .block(Block::default().borders(Borders::ALL).title("Scheduler"));
  f.render_widget(stats, area);
}

fn render_task_table<B: Backend>(f: &mut tui::Frame<B>, app: &App, area: Rect) {
  let title = format!(
    "Tasks [status: {} | priority: {}]",
    app.status_filter.map(|s| s.as_str()).unwrap_or("all"),
    app.priority_filter.map(|p| p.as_str()).unwrap_or("all"),
  );
  let header = Row::new(vec!["ID", "Name", "Priority", "Status", "Progress", "Worker", "Created"])
    .style(Style::default().add_modifier(Modifier::BOLD));

  let rows: Vec<Row> = if app.rows.is_empty() {
    vec![Row::new(vec![Cell::from("No tasks found")])]
  } else {
    app.rows.iter().map(|row| {
      let t = &row.task;
      let worker = if t.worker_id >= 0 { format!("W{}", t.worker_id) } else { "-".into() };
      let created = t.creation_time
        .map(|c| c.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "-".into());
      let base = if row.is_new {
        Style::default().fg(Color::LightGreen).add_modifier(Modifier::BOLD)
      } else {
        Style::default()
      };
      Row::new(vec![
        Cell::from(t.id.to_string()),
        Cell::from(t.name.clone()),
        Cell::from(Span::styled(t.priority.as_str(), Style::default().fg(priority_color(t.priority)))),
        Cell::from(Span::styled(t.status.as_str(), Style::default().fg(status_color(t.status)))),
        Cell::from(format!("{:>3.0}%", t.progress)),
        Cell::from(worker),
        Cell::from(created),
      ]).style(base)
    }).collect()
  };

  let widths = [
    Constraint::Length(5),
    Constraint::Min(16),
    Constraint::Length(9),
    Constraint::Length(10),
    Constraint::Length(8),
    Constraint::Length(7),
    Constraint::Length(9),
  ];
  let table = Table::new(rows)
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(title))
    .widths(&widths)
    .highlight_style(Style::default().bg(Color::Blue));

  let mut state = TableState::default();
  if !app.rows.is_empty() {
    state.select(Some(app.selected));
  }
  f.render_stateful_widget(table, area, &mut state);
}

fn render_workers<B: Backend>(f: &mut tui::Frame<B>, app: &App, area: Rect) {
  let util = &app.charts.utilization;
  let total = app.workers.total_workers as usize;
  let items: Vec<ListItem> = if total == 0 {
    vec![ListItem::new(Spans::from(Span::raw("No workers")))]
  } else {
    (0..total).map(|i| {
      let active = (i as u64) < app.workers.active_workers;
      let state = if active {
        Span::styled("active", Style::default().fg(Color::Green))
      } else {
        Span::styled("idle", Style::default().fg(Color::Red))
      };
      let slot = util.ids.iter().position(|id| *id == i as i64);
      let running = slot.map(|s| util.running[s]).unwrap_or(0);
      let completed = slot.map(|s| util.completed[s]).unwrap_or(0);
      ListItem::new(Spans::from(vec![
        Span::styled(format!("Worker {} ", i), Style::default().add_modifier(Modifier::BOLD)),
        state,
        Span::raw(format!("  running {} | completed {}", running, completed)),
      ]))
    }).collect()
  };
  let list = List::new(items)
    .block(Block::default().borders(Borders::ALL).title("Workers"));
  f.render_widget(list, area);
}

fn render_throughput<B: Backend>(f: &mut tui::Frame<B>, app: &App, area: Rect) {
  let values: Vec<u64> = app.charts.throughput.iter().map(|(_, v)| *v).collect();
  let title = match (app.charts.throughput.first(), app.charts.throughput.last()) {
    (Some((from, _)), Some((to, _))) => format!("Throughput {} - {}", from, to),
    _ => "Throughput".into(),
  };
  let sparkline = Sparkline::default()
    .block(Block::default().borders(Borders::ALL).title(title))
    .data(&values)
    .style(Style::default().fg(Color::Cyan));
  f.render_widget(sparkline, area);
}

fn render_footer<B: Backend>(f: &mut tui::Frame<B>, app: &App, area: Rect) {
  let line = match &app.input {
    InputMode::AddTask(buffer) => Spans::from(vec![
      Span::styled("add task> ", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
      Span::raw(buffer.clone()),
      Span::styled("  (name priority duration_ms | Esc cancels)", Style::default().fg(Color::DarkGray)),
    ]),
    InputMode::Simulate(buffer) => Spans::from(vec![
      Span::styled("simulate> ", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
      Span::raw(buffer.clone()),
      Span::styled("  (scenario count interval_ms | Esc cancels)", Style::default().fg(Color::DarkGray)),
    ]),
    InputMode::Normal => match &app.message {
      Some(message) => Spans::from(Span::styled(message.clone(), Style::default().fg(Color::Yellow))),
      None => Spans::from(Span::raw(
        "r: refresh | a: auto | s/p: filters | Up/Down: select | Enter: detail | c: cancel | n: add | m: simulate | e/j: export | q: quit",
      )),
    },
  };
  let footer = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
  f.render_widget(footer, area);
}

fn render_detail<B: Backend>(f: &mut tui::Frame<B>, app: &App) {
  let Some(row) = app.rows.get(app.selected) else {
    return;
  };
  let t = &row.task;
  let timings = task_timings(t);
  let worker = if t.worker_id >= 0 { t.worker_id.to_string() } else { "unassigned".into() };
  let lines = vec![
    Spans::from(Span::styled(format!("#{} {}", t.id, t.name), Style::default().add_modifier(Modifier::BOLD))),
    Spans::from(Span::raw(format!(
      "priority {} | status {} | progress {:.0}%",
      t.priority.as_str(), t.status.as_str(), t.progress
    ))),
    Spans::from(Span::raw(format!("worker: {}", worker))),
    Spans::from(Span::raw(format!("planned duration: {} ms", t.execution_time_ms))),
    Spans::from(Span::raw(format!("wait: {}", format_secs(timings.wait)))),
    Spans::from(Span::raw(format!("exec: {}", format_secs(timings.exec)))),
    Spans::from(Span::raw(format!("turnaround: {}", format_secs(timings.turnaround)))),
  ];
  let area = centered_rect(50, 45, f.size());
  f.render_widget(Clear, area);
  let detail = Paragraph::new(lines)
    .block(Block::default().borders(Borders::ALL).title("Task detail"));
  f.render_widget(detail, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
  let vertical = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Percentage((100 - percent_y) / 2),
      Constraint::Percentage(percent_y),
      Constraint::Percentage((100 - percent_y) / 2),
    ].as_ref())
    .split(r);
  Layout::default()
    .direction(Direction::Horizontal)
    .constraints([
      Constraint::Percentage((100 - percent_x) / 2),
      Constraint::Percentage(percent_x),
      Constraint::Percentage((100 - percent_x) / 2),
    ].as_ref())
    .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn add_task_input_parses_name_with_spaces() {
    let (name, priority, duration) = parse_add_task("encode big video high 5000").unwrap();
    assert_eq!(name, "encode big video");
    assert_eq!(priority, Priority::High);
    assert_eq!(duration, 5000);
  }

  #[test]
  fn add_task_input_rejects_short_and_malformed_lines() {
    assert!(parse_add_task("only two").is_err());
    assert!(parse_add_task("name urgent 100").is_err());
    assert!(parse_add_task("name high ten").is_err());
  }

  #[test]
  fn simulation_input_parses_exactly_three_tokens() {
    let (scenario, count, interval) = parse_simulation("burst 10 200").unwrap();
    assert_eq!(scenario, "burst");
    assert_eq!(count, 10);
    assert_eq!(interval, 200);
    assert!(parse_simulation("burst 10").is_err());
  }

  #[test]
  fn filter_cycles_return_to_all() {
    let mut app = App::new();
    for expected in TaskStatus::ALL {
      assert_eq!(app.cycle_status_filter(), Some(expected));
    }
    assert_eq!(app.cycle_status_filter(), None);
  }
}
