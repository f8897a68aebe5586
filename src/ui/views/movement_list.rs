use ledgerq::ledger::{Movement, MovementFilter, MOVEMENTS_LIST};
use ledgerq::{QueryClient, QueryError};
use ratatui::prelude::*;

use super::paged_list::{PagedListView, PagedRow};
use crate::ui::renderfns::{amount_color, format_date, truncate};

/// Movements, newest first
pub type MovementListView = PagedListView<Movement>;

impl MovementListView {
  pub fn open(client: &mut QueryClient, page_size: usize) -> Result<Self, QueryError> {
    let base = MovementFilter {
      is_descending: true,
      ..Default::default()
    };
    Self::mount(client, page_size, base, None)
  }
}

impl PagedRow for Movement {
  type Filter = MovementFilter;

  const TITLE: &'static str = "Movements";
  const ENDPOINT: &'static str = MOVEMENTS_LIST;

  fn with_search(base: &MovementFilter, search: Option<String>) -> MovementFilter {
    MovementFilter {
      search,
      ..base.clone()
    }
  }

  fn line(&self) -> Line<'static> {
    let amount = &self.amount_default_currency;
    Line::from(vec![
      Span::styled(format_date(self.timestamp), Style::default().fg(Color::DarkGray)),
      Span::raw("  "),
      Span::raw(format!("{:<40}", truncate(&self.name, 40))),
      Span::styled(
        format!("{:>4} tx", self.transactions_count),
        Style::default().fg(Color::DarkGray),
      ),
      Span::raw("  "),
      Span::styled(format!("{:>12}", amount), Style::default().fg(amount_color(amount))),
    ])
  }
}
