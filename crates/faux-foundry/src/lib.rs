//!
//! # Faux Foundry
//!
//! An in-memory implementation of the ontology backend for tests: a data store of objects and
//! links, an evaluator for every object set variant (derived properties included), pagination,
//! ordering, aggregation, edit application and a broadcast change feed.

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
mod evaluate;
mod foundry;
mod store;

pub mod fixtures;

pub use aggregate::aggregate;
pub use evaluate::{derived_value, evaluate, matches, sort_objects};
pub use foundry::FauxFoundry;
pub use store::{pk_key, rid_for, FauxDataStore};
