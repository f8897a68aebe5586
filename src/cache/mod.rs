//! Tag-invalidated query cache.
//!
//! This module holds pure data and invalidation logic:
//! - One entry per (endpoint, canonical arguments) key
//! - Reference-counted readers that drive eviction
//! - Tags provided by entries and invalidated by mutations
//! - Synchronous change notification per key

mod entry;
mod key;
mod store;

pub use entry::{CacheEntry, EntryStatus, LoadId};
pub use key::{canonicalize, tag_set, CacheKey, Tag, TagSet};
pub use store::{
  BeginLoad, CacheStore, Invalidation, Listener, ListenerId, Settled, StoreEvent, StoreEventKind,
};
