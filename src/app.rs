use crate::commands::{Command, CommandAction};
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::ui::renderfns::header::extract_domain;
use crate::ui::renderfns::HeaderInfo;
use crate::ui::view::{View, ViewAction};
use crate::ui::views::{AccountListView, MovementListView, TransactionListView};
use crate::ui::{self, Chrome, CommandEvent, CommandInput, KeyResult};
use color_eyre::{eyre::eyre, Result};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use ledgerq::transport::HttpTransport;
use ledgerq::{ledger, QueryClient, QueryError};
use ratatui::prelude::*;
use std::io::{stdout, Stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const TICK_RATE: Duration = Duration::from_millis(100);
const GC_EVERY_TICKS: u64 = 10;
const STATUS_TTL: Duration = Duration::from_secs(5);

/// Main application state
pub struct App {
  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,
  command: CommandInput,
  client: QueryClient,
  config: Config,
  status: Option<(String, Instant)>,
  ticks: u64,
  should_quit: bool,
}

impl App {
  pub fn new(config: Config, start: &str) -> Result<Self> {
    let token = Config::api_token();
    let transport = HttpTransport::new(&config.api.url, config.timeout(), token.as_deref())
      .map_err(|e| eyre!("Failed to set up API client: {}", e))?;
    let client = QueryClient::new(ledger::registry(), Arc::new(transport), config.client_options());
    info!(api = %config.api.url, authenticated = token.is_some(), "App starting");

    let mut app = Self {
      view_stack: Vec::new(),
      command: CommandInput::new(),
      client,
      config,
      status: None,
      ticks: 0,
      should_quit: false,
    };
    let root = crate::commands::find_command(start).ok_or_else(|| eyre!("Unknown view: {}", start))?;
    app.run_command(root);
    if app.view_stack.is_empty() {
      return Err(eyre!("Could not open the {} view", start));
    }
    Ok(app)
  }

  pub async fn run(&mut self) -> Result<()> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = self.event_loop(&mut terminal).await;

    // Restore the terminal even when the loop failed
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    self.shutdown();
    result
  }

  async fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    let mut events = EventHandler::new(TICK_RATE);

    while !self.should_quit {
      terminal.draw(|frame| self.draw(frame))?;

      match events.next().await {
        Some(Event::Key(key)) => self.handle_key(key),
        Some(Event::Resize) => {}
        Some(Event::Tick) => self.tick(),
        None => break,
      }
    }
    Ok(())
  }

  fn draw(&mut self, frame: &mut Frame) {
    let title = self
      .config
      .title
      .as_deref()
      .unwrap_or_else(|| extract_domain(&self.config.api.url));
    let chrome = Chrome {
      header: HeaderInfo {
        title,
        cached: self.client.store().len(),
        in_flight: self.client.outstanding(),
      },
      breadcrumb: self.view_stack.iter().map(|v| v.breadcrumb_label()).collect(),
      status: self.status.as_ref().map(|(message, _)| message.as_str()),
    };
    if let Some(view) = self.view_stack.last_mut() {
      ui::draw(frame, view.as_mut(), &self.client, &self.command, &chrome);
    }
  }

  fn tick(&mut self) {
    self.ticks += 1;
    self.client.poll();

    if let Some(view) = self.view_stack.last_mut() {
      view.tick(&mut self.client);
      if let Some(message) = view.take_status() {
        self.status = Some((message, Instant::now()));
      }
    }

    if self.ticks % GC_EVERY_TICKS == 0 {
      self.client.collect_garbage();
    }
    if self.status.as_ref().is_some_and(|(_, at)| at.elapsed() > STATUS_TTL) {
      self.status = None;
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    let capturing = self.view_stack.last().is_some_and(|v| v.is_capturing_input());
    if self.command.is_active() || !capturing {
      match self.command.handle_key(key) {
        KeyResult::Event(CommandEvent::Run(cmd)) => return self.run_command(cmd),
        KeyResult::Event(CommandEvent::Unknown(text)) => {
          return self.set_status(format!("Unknown command: {}", text));
        }
        KeyResult::Event(CommandEvent::Cancelled) | KeyResult::Handled => return,
        KeyResult::NotHandled => {}
      }
    }

    let Some(view) = self.view_stack.last_mut() else {
      return;
    };
    let action = view.handle_key(key, &mut self.client);
    if let Some(message) = view.take_status() {
      self.set_status(message);
    }

    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => self.view_stack.push(view),
      ViewAction::Pop => {
        if self.view_stack.len() > 1 {
          if let Some(view) = self.view_stack.pop() {
            view.unmount(&mut self.client);
          }
        } else {
          self.should_quit = true;
        }
      }
      ViewAction::Status(message) => self.set_status(message),
    }
  }

  fn set_status(&mut self, message: String) {
    self.status = Some((message, Instant::now()));
  }

  /// Replace the whole stack with the command's view.
  fn run_command(&mut self, cmd: &Command) {
    let page_size = self.config.pagination.page_size;
    let opened: Result<Box<dyn View>, QueryError> = match cmd.action {
      CommandAction::Quit => {
        self.should_quit = true;
        return;
      }
      CommandAction::Movements => MovementListView::open(&mut self.client, page_size).map(|v| Box::new(v) as Box<dyn View>),
      CommandAction::Transactions => {
        TransactionListView::open(&mut self.client, page_size).map(|v| Box::new(v) as Box<dyn View>)
      }
      CommandAction::Accounts => AccountListView::open(&mut self.client, page_size).map(|v| Box::new(v) as Box<dyn View>),
    };

    match opened {
      Ok(view) => {
        self.unmount_all();
        self.view_stack.push(view);
      }
      Err(e) => {
        warn!(command = cmd.name, error = %e, "Could not open view");
        self.set_status(format!("Could not open {}: {}", cmd.name, e));
      }
    }
  }

  fn unmount_all(&mut self) {
    while let Some(view) = self.view_stack.pop() {
      view.unmount(&mut self.client);
    }
  }

  fn shutdown(&mut self) {
    self.unmount_all();
    self.client.poll();
    info!(
      cached = self.client.store().len(),
      network_calls = self.client.network_calls(),
      "App stopped"
    );
  }
}
