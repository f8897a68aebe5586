use crossterm::event::KeyEvent;
use ledgerq::QueryClient;
use ratatui::prelude::*;

/// A keyboard shortcut hint for display in the header
#[derive(Debug, Clone)]
pub struct ShortcutInfo {
  pub key: &'static str,
  pub label: &'static str,
  pub priority: u8, // Lower = shown first
}

impl ShortcutInfo {
  pub const fn new(key: &'static str, label: &'static str) -> Self {
    Self {
      key,
      label,
      priority: 100,
    }
  }

  pub const fn with_priority(mut self, priority: u8) -> Self {
    self.priority = priority;
    self
  }
}

/// Actions that a view can request in response to user input
pub enum ViewAction {
  None,
  /// Push a new view onto the stack
  Push(Box<dyn View>),
  /// Pop current view from stack (go back)
  Pop,
  /// Show a message in the footer
  Status(String),
}

/// Trait for view behavior
///
/// Views own their query subscriptions. The App lends them the one
/// [`QueryClient`] for every call, applies request outcomes before each
/// `tick`, and calls `unmount` when a view leaves the stack so its
/// subscriptions are released.
pub trait View {
  /// Handle a key event, returning an action for App to execute
  fn handle_key(&mut self, key: KeyEvent, client: &mut QueryClient) -> ViewAction;

  fn render(&mut self, frame: &mut Frame, area: Rect, client: &QueryClient);

  fn breadcrumb_label(&self) -> String;

  /// Called after each client poll; pull new results and react to scrolling
  fn tick(&mut self, _client: &mut QueryClient) {}

  /// Latest message worth showing in the footer, taken once
  fn take_status(&mut self) -> Option<String> {
    None
  }

  /// Release subscriptions and viewport bindings
  fn unmount(self: Box<Self>, client: &mut QueryClient);

  /// Whether a text input inside the view currently owns the keyboard
  fn is_capturing_input(&self) -> bool {
    false
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("r", "refresh").with_priority(30),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
