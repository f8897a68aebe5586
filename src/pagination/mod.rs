//! Infinite-scroll pagination on top of the query cache.
//!
//! A [`PaginationController`] walks the pages of one listing and keeps the
//! concatenation of their items; a [`ScrollObserver`] decides when a
//! viewport is close enough to its end to ask for more; a
//! [`PaginatedQuery`] wires the two together for a view.

mod controller;
mod paginated;
mod scroll;

pub use controller::{PaginationController, Phase, PAGE_FIELD, PER_PAGE_FIELD};
pub use paginated::PaginatedQuery;
pub use scroll::{ScrollMetrics, ScrollObserver, ViewportId};
