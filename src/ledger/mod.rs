//! Endpoint catalog for the personal ledger API.

mod types;

pub use types::{Account, Amount, Movement, Transaction};

use serde::Serialize;
use serde_json::Value;

use crate::cache::Tag;
use crate::endpoint::{ArgSchema, Endpoint, EndpointRegistry, FieldKind, Method, Route};

pub const USERS: Tag = Tag::from_static("users");
pub const MOVEMENTS: Tag = Tag::from_static("movements");
pub const TRANSACTIONS: Tag = Tag::from_static("transactions");
pub const ACCOUNTS: Tag = Tag::from_static("accounts");

pub const MOVEMENTS_LIST: &str = "movements.list";
pub const MOVEMENTS_GET: &str = "movements.get";
pub const MOVEMENTS_UPDATE: &str = "movements.update";
pub const MOVEMENTS_DELETE: &str = "movements.delete";
pub const TRANSACTIONS_LIST: &str = "transactions.list";
pub const ACCOUNTS_LIST: &str = "accounts.list";
pub const ACCOUNTS_DELETE: &str = "accounts.delete";

/// Filter for the movement listing. Page fields are added per request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MovementFilter {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub search: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub start_date: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub end_date: Option<String>,
  pub is_descending: bool,
}

/// Filter for the transaction listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransactionFilter {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub search: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub account_id: Option<i64>,
  pub is_descending: bool,
}

fn paged() -> ArgSchema {
  ArgSchema::empty()
    .required("page", FieldKind::Integer)
    .required("per_page", FieldKind::Integer)
    .optional("search", FieldKind::String)
    .optional("is_descending", FieldKind::Bool)
}

/// One `accounts:<id>` tag per returned account.
fn account_tags(result: &Value) -> Vec<Tag> {
  result
    .as_array()
    .map(|accounts| {
      accounts
        .iter()
        .filter_map(|account| account.get("id"))
        .map(|id| Tag::item("accounts", id))
        .collect()
    })
    .unwrap_or_default()
}

/// Every endpoint the ledger front-end uses.
pub fn registry() -> EndpointRegistry {
  EndpointRegistry::new()
    .with(
      Endpoint::query(MOVEMENTS_LIST, Route::new(Method::Get, "users/me/movements/"))
        .args(
          paged()
            .optional("start_date", FieldKind::String)
            .optional("end_date", FieldKind::String),
        )
        .provides([USERS, MOVEMENTS]),
    )
    .with(
      Endpoint::query(MOVEMENTS_GET, Route::new(Method::Get, "users/me/movements/{id}"))
        .args(ArgSchema::empty().required("id", FieldKind::Integer))
        .provides([USERS, MOVEMENTS]),
    )
    .with(
      Endpoint::mutation(MOVEMENTS_UPDATE, Route::new(Method::Put, "users/me/movements/{id}"))
        .args(
          ArgSchema::empty()
            .required("id", FieldKind::Integer)
            .required("name", FieldKind::String)
            .optional("category_id", FieldKind::Integer),
        )
        .invalidates([USERS, MOVEMENTS]),
    )
    .with(
      Endpoint::mutation(MOVEMENTS_DELETE, Route::new(Method::Delete, "users/me/movements/{id}"))
        .args(ArgSchema::empty().required("id", FieldKind::Integer))
        .invalidates([USERS, MOVEMENTS]),
    )
    .with(
      Endpoint::query(TRANSACTIONS_LIST, Route::new(Method::Get, "users/me/transactions/"))
        .args(paged().optional("account_id", FieldKind::Integer))
        .provides([USERS, TRANSACTIONS]),
    )
    .with(
      Endpoint::query(ACCOUNTS_LIST, Route::new(Method::Get, "users/me/accounts/"))
        .provides_from_result([USERS, ACCOUNTS], account_tags),
    )
    .with(
      Endpoint::mutation(ACCOUNTS_DELETE, Route::new(Method::Delete, "users/me/accounts/{id}"))
        .args(ArgSchema::empty().required("id", FieldKind::Integer))
        // Deleting an account takes its transactions and movements with it
        .invalidates([USERS, ACCOUNTS, MOVEMENTS, TRANSACTIONS]),
    )
}
