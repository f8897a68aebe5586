use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, info, warn};

use crate::cache::{canonicalize, EntryStatus};
use crate::client::QueryClient;
use crate::error::QueryError;
use crate::query::QuerySubscription;

/// Argument carrying the zero-based page index.
pub const PAGE_FIELD: &str = "page";
/// Argument carrying the requested page size.
pub const PER_PAGE_FIELD: &str = "per_page";

/// Where a listing is in its fetch sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
  /// Nothing requested since the last reset
  Idle,
  /// Waiting for `page`
  Fetching { page: usize },
  /// `next_page` is the next one to request
  HasMore { next_page: usize },
  /// A short page arrived; nothing more to fetch until a reset
  Exhausted,
  /// Fetching `page` failed; the next trigger retries it
  Failed { page: usize, error: QueryError },
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Phase::Idle => write!(f, "idle"),
      Phase::Fetching { page } => write!(f, "fetching page {}", page),
      Phase::HasMore { next_page } => write!(f, "more from page {}", next_page),
      Phase::Exhausted => write!(f, "exhausted"),
      Phase::Failed { page, .. } => write!(f, "page {} failed", page),
    }
  }
}

/// A page that has been merged into the item list.
struct PageSlot {
  subscription: QuerySubscription,
  len: usize,
  revision: u64,
}

struct PendingPage {
  page: usize,
  generation: u64,
  subscription: QuerySubscription,
}

/// Accumulates the pages of one listing in request order.
///
/// Pages stay subscribed after they are merged, so when a mutation
/// invalidates their tags they are refetched and spliced back in place.
/// The controller is the only writer of its item list.
pub struct PaginationController<T> {
  endpoint: String,
  filter: Map<String, Value>,
  filter_key: String,
  page_size: usize,
  phase: Phase,
  generation: u64,
  pages: Vec<PageSlot>,
  pending: Option<PendingPage>,
  items: Vec<T>,
  refresh_error: Option<QueryError>,
}

impl<T: DeserializeOwned> PaginationController<T> {
  /// `filter` must be a JSON object (or null for no filter).
  pub fn new(endpoint: impl Into<String>, filter: Value, page_size: usize) -> Result<Self, QueryError> {
    let endpoint = endpoint.into();
    if page_size == 0 {
      return Err(QueryError::validation(endpoint, "page size must be positive"));
    }
    let filter = filter_map(&endpoint, filter)?;
    let filter_key = canonicalize(&Value::Object(filter.clone()));

    Ok(Self {
      endpoint,
      filter,
      filter_key,
      page_size,
      phase: Phase::Idle,
      generation: 0,
      pages: Vec::new(),
      pending: None,
      items: Vec::new(),
      refresh_error: None,
    })
  }

  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }

  pub fn filter(&self) -> &Map<String, Value> {
    &self.filter
  }

  pub fn page_size(&self) -> usize {
    self.page_size
  }

  pub fn phase(&self) -> &Phase {
    &self.phase
  }

  pub fn generation(&self) -> u64 {
    self.generation
  }

  pub fn items(&self) -> &[T] {
    &self.items
  }

  /// Pages merged since the last reset.
  pub fn pages_fetched(&self) -> usize {
    self.pages.len()
  }

  /// The page the listing is on: the one being fetched, the next one to
  /// fetch, or the one to retry.
  pub fn page_index(&self) -> usize {
    match &self.phase {
      Phase::Idle => 0,
      Phase::Fetching { page } | Phase::Failed { page, .. } => *page,
      Phase::HasMore { next_page } => *next_page,
      Phase::Exhausted => self.pages.len(),
    }
  }

  pub fn is_fetching(&self) -> bool {
    matches!(self.phase, Phase::Fetching { .. })
  }

  pub fn is_exhausted(&self) -> bool {
    self.phase == Phase::Exhausted
  }

  /// The fetch failure, or the failure of the latest in-place refresh.
  pub fn error(&self) -> Option<&QueryError> {
    match &self.phase {
      Phase::Failed { error, .. } => Some(error),
      _ => self.refresh_error.as_ref(),
    }
  }

  /// Arguments for `page`: the filter plus the page fields.
  pub fn page_args(&self, page: usize) -> Value {
    let mut args = self.filter.clone();
    args.insert(PAGE_FIELD.to_string(), Value::from(page));
    args.insert(PER_PAGE_FIELD.to_string(), Value::from(self.page_size));
    Value::Object(args)
  }

  /// "Load next": request the next page if the listing can advance.
  ///
  /// Returns `Ok(false)` while a fetch is in flight or once exhausted.
  /// A cached page is merged before this returns.
  pub fn request_next(&mut self, client: &mut QueryClient) -> Result<bool, QueryError> {
    let page = match &self.phase {
      Phase::Idle => 0,
      Phase::HasMore { next_page } => *next_page,
      Phase::Failed { page, .. } => *page,
      Phase::Fetching { .. } | Phase::Exhausted => return Ok(false),
    };

    let subscription = client.subscribe_value(&self.endpoint, self.page_args(page))?;
    debug!(
      endpoint = %self.endpoint,
      page,
      generation = self.generation,
      key = %subscription.key().digest(),
      "Requesting page"
    );
    self.pending = Some(PendingPage {
      page,
      generation: self.generation,
      subscription,
    });
    self.phase = Phase::Fetching { page };
    self.sync(client);
    Ok(true)
  }

  /// Replace the filter. An equal filter (after canonicalization) changes
  /// nothing; a different one resets the listing.
  pub fn set_filter(&mut self, filter: Value) -> Result<bool, QueryError> {
    let filter = filter_map(&self.endpoint, filter)?;
    let filter_key = canonicalize(&Value::Object(filter.clone()));
    if filter_key == self.filter_key {
      return Ok(false);
    }
    self.filter = filter;
    self.filter_key = filter_key;
    self.reset();
    Ok(true)
  }

  /// Drop every page and start over from page 0 on the next request.
  ///
  /// A fetch still in flight is abandoned: its result will not be merged.
  pub fn reset(&mut self) {
    self.generation += 1;
    // Dropped handles are released on the client's next poll
    self.pages.clear();
    self.pending = None;
    self.items.clear();
    self.refresh_error = None;
    self.phase = Phase::Idle;
    info!(endpoint = %self.endpoint, generation = self.generation, "Pagination reset");
  }

  /// Pull new results out of the cache. Returns `true` if the items or the
  /// phase changed.
  pub fn sync(&mut self, client: &QueryClient) -> bool {
    let refreshed = self.refresh_pages(client);
    let advanced = self.absorb_pending(client);
    refreshed || advanced
  }

  /// Release every page subscription now.
  pub fn release(mut self, client: &mut QueryClient) {
    if let Some(pending) = self.pending.take() {
      client.release(pending.subscription);
    }
    for slot in self.pages.drain(..) {
      client.release(slot.subscription);
    }
  }

  fn absorb_pending(&mut self, client: &QueryClient) -> bool {
    let Some(pending) = self.pending.take() else {
      return false;
    };
    if pending.generation != self.generation {
      debug!(endpoint = %self.endpoint, page = pending.page, "Discarding page from earlier generation");
      return false;
    }

    let state = client.state(&pending.subscription);
    let revision = client
      .entry(pending.subscription.key())
      .map(|entry| entry.revision())
      .unwrap_or_default();

    match state.status {
      EntryStatus::Success => {
        let decoded = state.decode::<Vec<T>>();
        match decoded.data {
          Some(page_items) => {
            let len = page_items.len();
            self.items.extend(page_items);
            self.pages.push(PageSlot {
              subscription: pending.subscription,
              len,
              revision,
            });
            self.phase = if len < self.page_size {
              info!(endpoint = %self.endpoint, pages = self.pages.len(), items = self.items.len(), "Listing exhausted");
              Phase::Exhausted
            } else {
              Phase::HasMore {
                next_page: pending.page + 1,
              }
            };
          }
          None => {
            let error = decoded
              .error
              .unwrap_or_else(|| QueryError::decode("page is not a list"));
            self.fail(pending.page, error);
          }
        }
        true
      }
      EntryStatus::Error => {
        let error = state
          .error
          .unwrap_or_else(|| QueryError::transport("page failed without an error"));
        self.fail(pending.page, error);
        true
      }
      EntryStatus::Loading | EntryStatus::Uninitialized => {
        self.pending = Some(pending);
        false
      }
    }
  }

  fn fail(&mut self, page: usize, error: QueryError) {
    warn!(endpoint = %self.endpoint, page, %error, "Page fetch failed");
    self.phase = Phase::Failed { page, error };
  }

  /// Splice refetched pages into the item list.
  fn refresh_pages(&mut self, client: &QueryClient) -> bool {
    let mut changed = false;
    let mut start = 0;

    for index in 0..self.pages.len() {
      let slot = &self.pages[index];
      let Some(entry) = client.entry(slot.subscription.key()) else {
        start += slot.len;
        continue;
      };
      if entry.revision() == slot.revision {
        start += slot.len;
        continue;
      }

      let revision = entry.revision();
      let old_len = slot.len;
      match entry.status() {
        EntryStatus::Success => match client.read::<Vec<T>>(&slot.subscription).data {
          Some(page_items) => {
            let len = page_items.len();
            self.items.splice(start..start + old_len, page_items);
            let slot = &mut self.pages[index];
            slot.len = len;
            slot.revision = revision;
            self.refresh_error = None;
            debug!(endpoint = %self.endpoint, page = index, old_len, len, "Page refreshed");

            if len < self.page_size && !self.is_exhausted() {
              info!(endpoint = %self.endpoint, page = index, "Refreshed page came back short");
              // Pages past a short one are stale by definition
              self.pending = None;
              self.phase = Phase::Exhausted;
            }
            start += len;
            changed = true;
            continue;
          }
          None => {
            self.refresh_error = Some(QueryError::decode("page is not a list"));
          }
        },
        EntryStatus::Error => {
          self.refresh_error = entry.error().cloned();
        }
        EntryStatus::Loading | EntryStatus::Uninitialized => {
          start += old_len;
          continue;
        }
      }

      self.pages[index].revision = revision;
      start += old_len;
      changed = true;
    }
    changed
  }
}

impl<T> fmt::Debug for PaginationController<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PaginationController")
      .field("endpoint", &self.endpoint)
      .field("filter", &self.filter_key)
      .field("phase", &self.phase)
      .field("generation", &self.generation)
      .field("pages", &self.pages.len())
      .field("items", &self.items.len())
      .finish()
  }
}

fn filter_map(endpoint: &str, filter: Value) -> Result<Map<String, Value>, QueryError> {
  match filter {
    Value::Object(mut map) => {
      map.retain(|_, v| !v.is_null());
      if map.contains_key(PAGE_FIELD) || map.contains_key(PER_PAGE_FIELD) {
        return Err(QueryError::validation(
          endpoint,
          "filter must not set the page fields",
        ));
      }
      Ok(map)
    }
    Value::Null => Ok(Map::new()),
    _ => Err(QueryError::validation(endpoint, "filter must be an object")),
  }
}
