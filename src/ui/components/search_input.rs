use super::input::{InputResult, TextInput};
use super::KeyResult;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

/// Events emitted by search input that parent needs to handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchEvent {
  /// Search text changed (each keystroke; empty string when cleared)
  Changed(String),
  /// Overlay closed with Enter, the search stays applied
  Submitted,
}

/// `/` search box. Reopening it keeps the current text so the search can
/// be refined; Esc clears it.
#[derive(Debug, Clone, Default)]
pub struct SearchInput {
  input: TextInput,
  active: bool,
}

impl SearchInput {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_active(&self) -> bool {
    self.active
  }

  pub fn query(&self) -> String {
    self.input.value()
  }

  /// Call this regardless of active state; it handles activation too.
  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<SearchEvent> {
    if !self.active {
      if key.code == KeyCode::Char('/') {
        self.active = true;
        return KeyResult::Handled;
      }
      return KeyResult::NotHandled;
    }

    let before = self.input.value();
    match self.input.handle_key(key) {
      InputResult::Submitted(_) => {
        self.active = false;
        KeyResult::Event(SearchEvent::Submitted)
      }
      InputResult::Cancelled => {
        self.active = false;
        let had_text = !self.input.is_empty();
        self.input.clear();
        if had_text {
          KeyResult::Event(SearchEvent::Changed(String::new()))
        } else {
          KeyResult::Handled
        }
      }
      InputResult::Consumed => {
        let after = self.input.value();
        if after == before {
          // cursor movement only
          KeyResult::Handled
        } else {
          KeyResult::Event(SearchEvent::Changed(after))
        }
      }
      // Swallow everything else while typing
      InputResult::NotHandled => KeyResult::Handled,
    }
  }

  /// Render the search box over the bottom of `area` if active
  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    if !self.active || area.height < 3 {
      return;
    }

    let width = (area.width / 5 * 3).clamp(30.min(area.width), 60.min(area.width));
    let overlay_area = Rect::new(area.x + 1, area.bottom().saturating_sub(3), width, 3).intersection(area);
    frame.render_widget(Clear, overlay_area);

    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Cyan))
      .title(" Search ");
    let inner = block.inner(overlay_area);
    frame.render_widget(block, overlay_area);

    let (before, after) = self.input.split_at_cursor();
    let line = Line::from(vec![
      Span::styled("/", Style::default().fg(Color::Cyan)),
      Span::raw(before),
      Span::styled("_", Style::default().fg(Color::Cyan)),
      Span::raw(after),
    ]);
    frame.render_widget(Paragraph::new(line), inner);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crossterm::event::KeyModifiers;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  #[test]
  fn test_inactive_ignores_keys() {
    let mut search = SearchInput::new();
    assert_eq!(search.handle_key(key(KeyCode::Char('x'))), KeyResult::NotHandled);
    assert_eq!(search.handle_key(key(KeyCode::Char('/'))), KeyResult::Handled);
    assert!(search.is_active());
  }

  #[test]
  fn test_each_keystroke_reports_change() {
    let mut search = SearchInput::new();
    search.handle_key(key(KeyCode::Char('/')));
    assert_eq!(
      search.handle_key(key(KeyCode::Char('r'))),
      KeyResult::Event(SearchEvent::Changed("r".to_string()))
    );
    assert_eq!(
      search.handle_key(key(KeyCode::Char('e'))),
      KeyResult::Event(SearchEvent::Changed("re".to_string()))
    );
    assert_eq!(search.handle_key(key(KeyCode::Left)), KeyResult::Handled);
    assert_eq!(search.handle_key(key(KeyCode::Enter)), KeyResult::Event(SearchEvent::Submitted));
    assert!(!search.is_active());
    assert_eq!(search.query(), "re");
  }

  #[test]
  fn test_escape_clears_search() {
    let mut search = SearchInput::new();
    search.handle_key(key(KeyCode::Char('/')));
    search.handle_key(key(KeyCode::Char('a')));
    assert_eq!(
      search.handle_key(key(KeyCode::Esc)),
      KeyResult::Event(SearchEvent::Changed(String::new()))
    );
    assert_eq!(search.query(), "");

    search.handle_key(key(KeyCode::Char('/')));
    assert_eq!(search.handle_key(key(KeyCode::Esc)), KeyResult::Handled);
  }
}
