use chrono::NaiveDate;
use ledgerq::ledger::Amount;
use ratatui::prelude::Color;

/// Truncate to at most `max_len` characters, ending in "..." if cut
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Red for money out, green for money in
pub fn amount_color(amount: &Amount) -> Color {
  if amount.is_negative() {
    Color::Red
  } else if amount.as_str().trim_start_matches(['0', '.', '+']).is_empty() {
    Color::DarkGray
  } else {
    Color::Green
  }
}

pub fn format_date(date: Option<NaiveDate>) -> String {
  date
    .map(|d| d.format("%Y-%m-%d").to_string())
    .unwrap_or_else(|| "----------".to_string())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_truncate_short_string() {
    assert_eq!(truncate("rent", 10), "rent");
    assert_eq!(truncate("rent", 4), "rent");
  }

  #[test]
  fn test_truncate_long_string() {
    assert_eq!(truncate("supermarket run", 8), "super...");
  }

  #[test]
  fn test_truncate_counts_chars() {
    assert_eq!(truncate("crème brûlée", 8), "crème...");
  }

  #[test]
  fn test_amount_color() {
    assert_eq!(amount_color(&Amount::new("-12.50")), Color::Red);
    assert_eq!(amount_color(&Amount::new("1200.00")), Color::Green);
    assert_eq!(amount_color(&Amount::new("0.00")), Color::DarkGray);
  }

  #[test]
  fn test_format_date() {
    assert_eq!(format_date(NaiveDate::from_ymd_opt(2024, 3, 9)), "2024-03-09");
    assert_eq!(format_date(None), "----------");
  }
}
