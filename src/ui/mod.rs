mod components;
pub mod renderfns;
pub mod view;
pub mod views;

pub use components::{CommandEvent, CommandInput, KeyResult};

use ledgerq::{QueryClient, ScrollMetrics};
use ratatui::prelude::*;
use ratatui::widgets::ListState;

use renderfns::HeaderInfo;
use view::View;

/// Everything around the active view that gets drawn each frame.
pub struct Chrome<'a> {
  pub header: HeaderInfo<'a>,
  pub breadcrumb: Vec<String>,
  pub status: Option<&'a str>,
}

/// Main draw function
pub fn draw(
  frame: &mut Frame,
  view: &mut dyn View,
  client: &QueryClient,
  command: &CommandInput,
  chrome: &Chrome,
) {
  let [header_area, content_area, footer_area] = Layout::vertical([
    Constraint::Length(1),
    Constraint::Min(1),
    Constraint::Length(1),
  ])
  .areas(frame.area());

  renderfns::draw_header(frame, header_area, &chrome.header, &view.shortcuts());
  view.render(frame, content_area, client);
  renderfns::draw_footer(frame, footer_area, &chrome.breadcrumb, chrome.status);

  command.render_overlay(frame, content_area);
}

/// Keep the list selection inside `len` rows.
pub fn ensure_valid_selection(state: &mut ListState, len: usize) {
  match state.selected() {
    _ if len == 0 => state.select(None),
    None => state.select(Some(0)),
    Some(i) if i >= len => state.select(Some(len - 1)),
    Some(_) => {}
  }
}

/// Scroll geometry of a rendered list, one unit per row.
pub fn list_metrics(state: &ListState, rows: usize, visible_rows: u16) -> ScrollMetrics {
  ScrollMetrics::new(
    u32::try_from(rows).unwrap_or(u32::MAX),
    u32::from(visible_rows),
    u32::try_from(state.offset()).unwrap_or(u32::MAX),
  )
}
