use crossterm::event::{KeyCode, KeyEvent};
use ledgerq::pagination::Phase;
use ledgerq::{PaginatedQuery, QueryClient, QueryError, ScrollMetrics, ViewportId};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::ui::components::{KeyResult, SearchEvent, SearchInput};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::{ensure_valid_selection, list_metrics};

/// A record type that can be shown in an infinite-scroll list.
pub trait PagedRow: DeserializeOwned + 'static {
  type Filter: Serialize + Clone;

  const TITLE: &'static str;
  const ENDPOINT: &'static str;

  /// `base` with the search text applied
  fn with_search(base: &Self::Filter, search: Option<String>) -> Self::Filter;

  fn line(&self) -> Line<'static>;
}

/// Infinite-scroll list over one paginated endpoint, searchable with `/`.
///
/// The list's rendered offset, height and row count are its scroll
/// metrics. They are fed to the paginated query whenever they change or
/// the user scrolls, and the query decides whether to fetch the next page.
pub struct PagedListView<R: PagedRow> {
  query: PaginatedQuery<R>,
  base: R::Filter,
  scope: Option<String>,
  viewport: ViewportId,
  list_state: ListState,
  search: SearchInput,
  metrics: Option<ScrollMetrics>,
  observed: Option<ScrollMetrics>,
  scrolled: bool,
  status: Option<String>,
}

impl<R: PagedRow> PagedListView<R> {
  /// Mount the listing and bind this view's viewport to it.
  ///
  /// `scope` names a narrowed listing (e.g. one account) in the breadcrumb.
  pub fn mount(
    client: &mut QueryClient,
    page_size: usize,
    base: R::Filter,
    scope: Option<String>,
  ) -> Result<Self, QueryError> {
    let mut query = client.use_paginated_query::<R, _>(R::ENDPOINT, &R::with_search(&base, None), page_size)?;
    let viewport = ViewportId::next();
    query.bind_viewport(viewport);

    Ok(Self {
      query,
      base,
      scope,
      viewport,
      list_state: ListState::default(),
      search: SearchInput::new(),
      metrics: None,
      observed: None,
      scrolled: false,
      status: None,
    })
  }

  fn apply_search(&mut self, client: &mut QueryClient, text: &str) {
    let text = text.trim();
    let search = (!text.is_empty()).then(|| text.to_string());
    match self.query.set_filter(client, &R::with_search(&self.base, search)) {
      Ok(true) => {
        self.list_state = ListState::default();
        self.metrics = None;
        self.observed = None;
      }
      Ok(false) => {}
      Err(e) => self.status = Some(e.to_string()),
    }
  }

  /// `r`: retry a failed page, otherwise reload from the first page.
  fn refresh(&mut self, client: &mut QueryClient) {
    let outcome = if matches!(self.query.phase(), Phase::Failed { .. }) {
      self.query.load_next(client).map(|_| "Retrying")
    } else {
      self.list_state = ListState::default();
      self.query.reset(client).map(|_| "Reloading")
    };
    self.status = Some(match outcome {
      Ok(message) => message.to_string(),
      Err(e) => e.to_string(),
    });
  }

  fn title(&self) -> String {
    let count = self.query.items().len();
    let progress = match self.query.phase() {
      Phase::Fetching { page } => format!("{} loading page {}...", count, page + 1),
      Phase::HasMore { .. } => format!("{}+", count),
      Phase::Failed { error, .. } => format!("{} error: {}", count, error),
      Phase::Idle | Phase::Exhausted => count.to_string(),
    };
    let search = self.search.query();
    if search.is_empty() {
      format!(" {} ({}) ", self.breadcrumb_label(), progress)
    } else {
      format!(" {} /{} ({}) ", self.breadcrumb_label(), search, progress)
    }
  }
}

impl<R: PagedRow> View for PagedListView<R> {
  fn handle_key(&mut self, key: KeyEvent, client: &mut QueryClient) -> ViewAction {
    match self.search.handle_key(key) {
      KeyResult::Event(SearchEvent::Changed(text)) => {
        self.apply_search(client, &text);
        return ViewAction::None;
      }
      KeyResult::Event(SearchEvent::Submitted) | KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('g') | KeyCode::Home => self.list_state.select_first(),
      KeyCode::Char('G') | KeyCode::End => self.list_state.select_last(),
      KeyCode::PageDown => {
        let step = self.metrics.map_or(10, |m| m.client_height.max(1)) as u16;
        self.list_state.scroll_down_by(step);
      }
      KeyCode::PageUp => {
        let step = self.metrics.map_or(10, |m| m.client_height.max(1)) as u16;
        self.list_state.scroll_up_by(step);
      }
      KeyCode::Char('r') => {
        self.refresh(client);
        return ViewAction::None;
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => return ViewAction::None,
    }
    self.scrolled = true;
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect, _client: &QueryClient) {
    let block = Block::default()
      .title(self.title())
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));
    let inner = block.inner(area);

    // A failed page keeps its row so the geometry matches the fetch before it
    let items = self.query.items();
    if items.is_empty() && matches!(self.query.phase(), Phase::Idle | Phase::Exhausted) {
      let paragraph = Paragraph::new("Nothing here.")
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      self.metrics = Some(ScrollMetrics::new(0, u32::from(inner.height), 0));
      return;
    }

    let mut rows: Vec<ListItem> = items.iter().map(|item| ListItem::new(item.line())).collect();
    match self.query.phase() {
      Phase::Fetching { .. } => rows.push(ListItem::new(Span::styled(
        "  loading...",
        Style::default().fg(Color::DarkGray),
      ))),
      Phase::Failed { error, .. } => rows.push(ListItem::new(Span::styled(
        format!("  {} (r to retry)", error),
        Style::default().fg(Color::Red),
      ))),
      _ => {}
    }
    let row_count = rows.len();
    ensure_valid_selection(&mut self.list_state, items.len());

    let list = List::new(rows)
      .block(block)
      .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
      .highlight_symbol("> ");
    frame.render_stateful_widget(list, area, &mut self.list_state);

    self.metrics = Some(list_metrics(&self.list_state, row_count, inner.height));
    self.search.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    match &self.scope {
      Some(scope) => format!("{} [{}]", R::TITLE, scope),
      None => R::TITLE.to_string(),
    }
  }

  fn tick(&mut self, client: &mut QueryClient) {
    self.query.sync(client);

    let Some(metrics) = self.metrics else {
      return;
    };
    // Only layout changes and user scrolling count as scroll events, and a
    // failed page is only retried by the user
    let failed = matches!(self.query.phase(), Phase::Failed { .. });
    if !self.scrolled && (failed || self.observed == Some(metrics)) {
      self.observed = Some(metrics);
      return;
    }
    self.scrolled = false;
    self.observed = Some(metrics);
    if let Err(e) = self.query.on_scroll(client, self.viewport, metrics) {
      self.status = Some(e.to_string());
    }
  }

  fn take_status(&mut self) -> Option<String> {
    self.status.take()
  }

  fn unmount(self: Box<Self>, client: &mut QueryClient) {
    let mut this = *self;
    this.query.unbind_viewport(this.viewport);
    this.query.unmount(client);
  }

  fn is_capturing_input(&self) -> bool {
    self.search.is_active()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("/", "search").with_priority(20),
      ShortcutInfo::new("r", "reload").with_priority(30),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ui::views::MovementListView;
  use crossterm::event::KeyModifiers;
  use futures::future::BoxFuture;
  use futures::FutureExt;
  use ledgerq::endpoint::Endpoint;
  use ledgerq::transport::Transport;
  use ledgerq::{ledger, ClientOptions};
  use ratatui::backend::TestBackend;
  use serde_json::Value;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;

  /// Every request fails as if the API were down.
  #[derive(Default)]
  struct DownTransport {
    calls: AtomicUsize,
  }

  impl Transport for DownTransport {
    fn send(&self, _endpoint: &Endpoint, _args: &Value) -> BoxFuture<'static, Result<Value, QueryError>> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      futures::future::ready(Err(QueryError::transport("connection refused"))).boxed()
    }
  }

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  async fn frame_cycle(terminal: &mut Terminal<TestBackend>, view: &mut MovementListView, client: &mut QueryClient) {
    terminal
      .draw(|frame| {
        let area = frame.area();
        view.render(frame, area, client);
      })
      .unwrap();
    client.settle().await;
    view.tick(client);
  }

  #[tokio::test]
  async fn test_failed_first_page_is_not_retried_while_idle() {
    let transport = Arc::new(DownTransport::default());
    let mut client = QueryClient::new(ledger::registry(), transport.clone(), ClientOptions::default());
    let mut view = MovementListView::open(&mut client, 20).unwrap();
    let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();

    for _ in 0..20 {
      frame_cycle(&mut terminal, &mut view, &mut client).await;
    }
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    assert!(matches!(view.query.phase(), Phase::Failed { page: 0, .. }));

    // Scrolling is a user action, so it retries exactly once
    view.handle_key(key(KeyCode::Char('j')), &mut client);
    for _ in 0..5 {
      frame_cycle(&mut terminal, &mut view, &mut client).await;
    }
    assert_eq!(transport.calls.load(Ordering::SeqCst), 2);

    view.handle_key(key(KeyCode::Char('r')), &mut client);
    assert_eq!(view.take_status().as_deref(), Some("Retrying"));
    for _ in 0..5 {
      frame_cycle(&mut terminal, &mut view, &mut client).await;
    }
    assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    Box::new(view).unmount(&mut client);
  }

  #[tokio::test]
  async fn test_failed_page_keeps_its_row() {
    let transport = Arc::new(DownTransport::default());
    let mut client = QueryClient::new(ledger::registry(), transport.clone(), ClientOptions::default());
    let mut view = MovementListView::open(&mut client, 20).unwrap();
    let mut terminal = Terminal::new(TestBackend::new(80, 10)).unwrap();

    frame_cycle(&mut terminal, &mut view, &mut client).await;
    frame_cycle(&mut terminal, &mut view, &mut client).await;
    // The error row takes the place of the loading row
    assert_eq!(view.metrics.map(|m| m.scroll_height), Some(1));
    Box::new(view).unmount(&mut client);
  }
}
