//!
//! # Observable cache
//!
//! A keyed store of query results that subscribers can watch. Each entry knows how to refetch
//! itself and which object types it depends on, so a mutation of one type can revalidate exactly
//! the entries that may have gone stale.
//!
//! Concurrent requests for the same key share one in flight fetch, and revalidations issued
//! within the configured dedupe window of the previous fetch return the current result instead
//! of hitting the backend again.

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod cache;
mod config;
mod entry;
mod error;

pub use cache::{Fetcher, Listener, ObservableCache, Subscription};
pub use config::CacheConfig;
pub use entry::{CacheEntry, CacheStatus, CacheValue, OptimisticId};
pub use error::CacheError;
