//! Client-side data layer for a personal ledger API.
//!
//! Reads go through a tag-invalidated query cache that coalesces identical
//! requests; writes are mutations that invalidate the tags they touch, so
//! every dependent read refetches on its own. Long listings are paginated
//! with an infinite-scroll controller that accumulates pages in order.
//!
//! One [`QueryClient`] owns all of it and is driven by the caller's event
//! loop through [`QueryClient::poll`].

pub mod cache;
pub mod client;
pub mod endpoint;
pub mod error;
pub mod ledger;
pub mod pagination;
pub mod query;
pub mod transport;

#[cfg(test)]
mod testing;

pub use client::{ClientOptions, MutationTrigger, QueryClient};
pub use error::QueryError;
pub use pagination::{PaginatedQuery, ScrollMetrics, ViewportId};
