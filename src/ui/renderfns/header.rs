use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

use crate::ui::view::ShortcutInfo;

/// What the header shows besides the view's shortcuts.
#[derive(Debug, Clone, Default)]
pub struct HeaderInfo<'a> {
  /// Config title or the API host
  pub title: &'a str,
  pub cached: usize,
  pub in_flight: usize,
}

/// Draw the header bar with logo, API host, cache activity and shortcuts
pub fn draw_header(frame: &mut Frame, area: Rect, info: &HeaderInfo, shortcuts: &[ShortcutInfo]) {
  let sep = || Span::styled("│", Style::default().fg(Color::DarkGray));

  let activity = if info.in_flight > 0 {
    Span::styled(
      format!(" {} cached, {} loading ", info.cached, info.in_flight),
      Style::default().fg(Color::Yellow),
    )
  } else {
    Span::styled(format!(" {} cached ", info.cached), Style::default().fg(Color::DarkGray))
  };

  let mut spans = vec![
    Span::styled(" ledgerq ", Style::default().fg(Color::Cyan).bold()),
    sep(),
    Span::styled(format!(" {} ", info.title), Style::default().fg(Color::White)),
    sep(),
    activity,
    Span::raw(" "),
  ];

  let mut sorted: Vec<&ShortcutInfo> = shortcuts.iter().collect();
  sorted.sort_by_key(|s| s.priority);
  for shortcut in sorted {
    spans.push(Span::styled(format!(" <{}>", shortcut.key), Style::default().fg(Color::Cyan)));
    spans.push(Span::styled(format!(" {} ", shortcut.label), Style::default().fg(Color::DarkGray)));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(paragraph, area);
}

/// Host part of the API URL, for the header when no title is configured
pub fn extract_domain(url: &str) -> &str {
  let rest = url
    .strip_prefix("https://")
    .or_else(|| url.strip_prefix("http://"))
    .unwrap_or(url);
  rest.split('/').next().unwrap_or(rest)
}
