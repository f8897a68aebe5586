use ledgerq::ledger::{Transaction, TransactionFilter, TRANSACTIONS_LIST};
use ledgerq::{QueryClient, QueryError};
use ratatui::prelude::*;

use super::paged_list::{PagedListView, PagedRow};
use crate::ui::renderfns::{amount_color, format_date, truncate};

/// Transactions, newest first, optionally narrowed to one account
pub type TransactionListView = PagedListView<Transaction>;

impl TransactionListView {
  pub fn open(client: &mut QueryClient, page_size: usize) -> Result<Self, QueryError> {
    let base = TransactionFilter {
      is_descending: true,
      ..Default::default()
    };
    Self::mount(client, page_size, base, None)
  }

  pub fn for_account(
    client: &mut QueryClient,
    page_size: usize,
    account_id: i64,
    account_name: &str,
  ) -> Result<Self, QueryError> {
    let base = TransactionFilter {
      account_id: Some(account_id),
      is_descending: true,
      ..Default::default()
    };
    Self::mount(client, page_size, base, Some(account_name.to_string()))
  }
}

impl PagedRow for Transaction {
  type Filter = TransactionFilter;

  const TITLE: &'static str = "Transactions";
  const ENDPOINT: &'static str = TRANSACTIONS_LIST;

  fn with_search(base: &TransactionFilter, search: Option<String>) -> TransactionFilter {
    TransactionFilter {
      search,
      ..base.clone()
    }
  }

  fn line(&self) -> Line<'static> {
    let synced = if self.is_synced { "●" } else { " " };
    let balance = self
      .account_balance
      .as_ref()
      .map(|b| b.to_string())
      .unwrap_or_default();
    Line::from(vec![
      Span::styled(format_date(Some(self.timestamp)), Style::default().fg(Color::DarkGray)),
      Span::styled(format!(" {} ", synced), Style::default().fg(Color::Cyan)),
      Span::raw(format!("{:<40}", truncate(&self.name, 40))),
      Span::styled(format!("{:>12}", self.amount), Style::default().fg(amount_color(&self.amount))),
      Span::styled(format!("{:>14}", balance), Style::default().fg(Color::DarkGray)),
    ])
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_search_keeps_account_scope() {
    let base = TransactionFilter {
      account_id: Some(3),
      is_descending: true,
      ..Default::default()
    };
    let filter = Transaction::with_search(&base, Some("coffee".to_string()));
    assert_eq!(
      serde_json::to_value(&filter).unwrap(),
      json!({ "search": "coffee", "account_id": 3, "is_descending": true })
    );
  }
}
