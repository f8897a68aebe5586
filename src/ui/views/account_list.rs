use crossterm::event::{KeyCode, KeyEvent};
use ledgerq::cache::EntryStatus;
use ledgerq::ledger::{Account, ACCOUNTS_DELETE, ACCOUNTS_LIST};
use ledgerq::query::{MutationTicket, QuerySubscription};
use ledgerq::{MutationTrigger, QueryClient, QueryError};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use serde_json::json;

use super::TransactionListView;
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{amount_color, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};

/// Accounts with balances. `d` deletes the selected one, which also
/// invalidates every cached movement and transaction listing.
pub struct AccountListView {
  accounts: QuerySubscription,
  delete: MutationTrigger,
  page_size: usize,
  list_state: ListState,
  /// Account awaiting a y/n answer
  confirm: Option<Account>,
  deleting: Option<(String, MutationTicket)>,
  status: Option<String>,
}

impl AccountListView {
  pub fn open(client: &mut QueryClient, page_size: usize) -> Result<Self, QueryError> {
    Ok(Self {
      accounts: client.use_query(ACCOUNTS_LIST, &json!({}))?,
      delete: client.use_mutation(ACCOUNTS_DELETE)?,
      page_size,
      list_state: ListState::default(),
      confirm: None,
      deleting: None,
      status: None,
    })
  }

  fn accounts(&self, client: &QueryClient) -> Vec<Account> {
    client.read::<Vec<Account>>(&self.accounts).data.unwrap_or_default()
  }

  fn selected(&self, client: &QueryClient) -> Option<Account> {
    let index = self.list_state.selected()?;
    self.accounts(client).into_iter().nth(index)
  }

  fn start_delete(&mut self, client: &mut QueryClient, account: Account) {
    match self.delete.trigger(client, &json!({ "id": account.id })) {
      Ok(ticket) => {
        self.status = Some(format!("Deleting {}...", account.name));
        self.deleting = Some((account.name, ticket));
      }
      Err(e) => self.status = Some(e.to_string()),
    }
  }

  fn render_confirm(&self, frame: &mut Frame, area: Rect) {
    let Some(account) = &self.confirm else {
      return;
    };
    let line = Line::from(vec![
      Span::styled(" Delete ", Style::default().fg(Color::Red).bold()),
      Span::raw(format!("{} and all its transactions? ", account.name)),
      Span::styled("(y/n)", Style::default().fg(Color::Yellow)),
    ]);
    let bar = Rect::new(area.x + 1, area.bottom().saturating_sub(2), area.width.saturating_sub(2), 1);
    frame.render_widget(Paragraph::new(line).style(Style::default().bg(Color::Black)), bar);
  }
}

impl View for AccountListView {
  fn handle_key(&mut self, key: KeyEvent, client: &mut QueryClient) -> ViewAction {
    if let Some(account) = self.confirm.take() {
      if key.code == KeyCode::Char('y') {
        self.start_delete(client, account);
      }
      return ViewAction::None;
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('r') => {
        if client.refetch(&self.accounts) {
          self.status = Some("Refreshing accounts".to_string());
        }
      }
      KeyCode::Char('d') => {
        if self.deleting.is_some() {
          return ViewAction::Status("A delete is already running".to_string());
        }
        self.confirm = self.selected(client);
      }
      KeyCode::Enter => {
        if let Some(account) = self.selected(client) {
          return match TransactionListView::for_account(client, self.page_size, account.id, &account.name) {
            Ok(view) => ViewAction::Push(Box::new(view)),
            Err(e) => ViewAction::Status(e.to_string()),
          };
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect, client: &QueryClient) {
    let state = client.read::<Vec<Account>>(&self.accounts);
    let accounts = state.data.as_deref().unwrap_or_default();
    ensure_valid_selection(&mut self.list_state, accounts.len());

    // Stale data stays on screen while a refetch runs
    let title = match (&state.status, &state.error) {
      (EntryStatus::Loading, _) if accounts.is_empty() => " Accounts (loading...) ".to_string(),
      (EntryStatus::Loading, _) => format!(" Accounts ({}) refreshing... ", accounts.len()),
      (EntryStatus::Error, Some(e)) => format!(" Accounts (error: {}) ", e),
      _ => format!(" Accounts ({}) ", accounts.len()),
    };
    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if accounts.is_empty() {
      let content = match state.status {
        EntryStatus::Loading | EntryStatus::Uninitialized => "",
        EntryStatus::Error => "Failed to load accounts. Press 'r' to retry.",
        EntryStatus::Success => "No accounts.",
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let items: Vec<ListItem> = accounts
      .iter()
      .map(|account| {
        let currency = account.currency_code.as_deref().unwrap_or("");
        ListItem::new(Line::from(vec![
          Span::styled(format!("{:<6}", account.id), Style::default().fg(Color::DarkGray)),
          Span::raw(format!("{:<36}", truncate(&account.name, 36))),
          Span::styled(
            format!("{:>14} {:<3}", account.balance, currency),
            Style::default().fg(amount_color(&account.balance)),
          ),
          Span::styled(
            if account.is_synced { "  synced" } else { "" },
            Style::default().fg(Color::Cyan),
          ),
        ]))
      })
      .collect();

    let list = List::new(items)
      .block(block)
      .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
      .highlight_symbol("> ");
    frame.render_stateful_widget(list, area, &mut self.list_state);
    self.render_confirm(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Accounts".to_string()
  }

  fn tick(&mut self, _client: &mut QueryClient) {
    let Some((name, ticket)) = self.deleting.as_mut() else {
      return;
    };
    let Some(outcome) = ticket.try_result() else {
      return;
    };
    self.status = Some(match outcome {
      Ok(_) => format!("Deleted {}", name),
      Err(e) => format!("Could not delete {}: {}", name, e),
    });
    self.deleting = None;
  }

  fn take_status(&mut self) -> Option<String> {
    self.status.take()
  }

  fn unmount(self: Box<Self>, client: &mut QueryClient) {
    client.release(self.accounts);
  }

  fn is_capturing_input(&self) -> bool {
    self.confirm.is_some()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("enter", "transactions").with_priority(20),
      ShortcutInfo::new("d", "delete").with_priority(25),
      ShortcutInfo::new("r", "refresh").with_priority(30),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
