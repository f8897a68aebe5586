use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A decimal amount kept exactly as the server sent it.
///
/// The API serializes decimals as strings, but older endpoints and test
/// fixtures use plain numbers; both are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Amount(String);

impl Amount {
  pub fn new(text: impl Into<String>) -> Self {
    Self(text.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn is_negative(&self) -> bool {
    self.0.trim_start().starts_with('-')
  }
}

impl fmt::Display for Amount {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.pad(&self.0)
  }
}

impl<'de> Deserialize<'de> for Amount {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
      Text(String),
      Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
      Raw::Text(text) => Amount(text),
      Raw::Number(number) => Amount(number.to_string()),
    })
  }
}

/// A group of transactions the user thinks of as one event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Movement {
  pub id: i64,
  pub name: String,
  #[serde(default)]
  pub category_id: Option<i64>,
  #[serde(default)]
  pub timestamp: Option<NaiveDate>,
  #[serde(default)]
  pub transactions_count: u32,
  pub amount_default_currency: Amount,
}

/// One line on an account statement.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Transaction {
  pub id: i64,
  pub name: String,
  pub amount: Amount,
  pub timestamp: NaiveDate,
  pub account_id: i64,
  #[serde(default)]
  pub movement_id: Option<i64>,
  #[serde(default)]
  pub category_id: Option<i64>,
  #[serde(default)]
  pub account_balance: Option<Amount>,
  #[serde(default)]
  pub is_synced: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Account {
  pub id: i64,
  pub name: String,
  pub balance: Amount,
  #[serde(default)]
  pub currency_code: Option<String>,
  #[serde(default)]
  pub is_synced: bool,
}
