//!
//! # OSDK Core
//!
//! Typed, lazily executed object set queries over an ontology backend, with a shared
//! observable cache.
//!
//! A [`Client`] hands out [`ObjectSet`]s. Builder calls compose a wire tree without touching the
//! backend; `fetch_page`, `async_iter`, `aggregate` and `fetch_one` execute it. Page results are
//! cached under a canonical key together with the object types they depend on, as computed by
//! the [invalidation analyzer](analyze), so edits posted through the client revalidate exactly
//! the entries they may have made stale.

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

mod aggregate;
pub mod canonical;
mod client;
mod config;
mod derived;
mod edits;
mod error;
mod invalidation;
mod object_set;
mod page;
mod subscription;
mod typing;
mod validate;

pub use aggregate::{
	AggregateOptions, AggregateResult, AggregateRow, AggregationFunction, GroupBy, Metric,
};
pub use client::{Client, ClientBuilder};
pub use config::{ClientConfig, SubscriptionConfig, DEFAULT_SUBSCRIPTION_BUFFER};
pub use derived::{
	DerivedAggregation, DerivedProperty, DerivedPropertyBuilder, Operand, DEFAULT_COLLECT_LIMIT,
	DEFAULT_PERCENTILE,
};
pub use error::{Error, Result};
pub use invalidation::{analyze, InvalidationSet};
pub use object_set::ObjectSet;
pub use page::{FetchPageArgs, OsdkObject, OsdkResult, Page};
pub use subscription::{ObjectSetSubscription, ObjectUpdate, ObjectUpdates, SubscribeOptions};

pub use osdk_cache as cache;
pub use osdk_ontology as ontology;
pub use osdk_wire as wire;
