//!
//! # OSDK Wire Model
//!
//! Data types exchanged between the object set engine and the remote ontology backend.
//!
//! The central type is [`WireObjectSet`], a closed tagged union describing a composable query:
//! base sets, filters, pivots along links, set algebra and derived properties. Everything here is
//! pure data with `serde` representations matching the backend's JSON, plus the two capability
//! traits the engine consumes: [`Backend`] for executing requests and [`ChangeFeed`] for
//! receiving object change notifications.

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
mod backend;
mod derived;
mod edits;
mod object_set;
mod request;
mod where_clause;

pub use aggregate::{
	AggregateObjectSetRequest, AggregateResponse, Aggregation, AggregationAccuracy,
	AggregationGroup, AggregationMetric, GroupBy,
};
pub use backend::{Backend, BackendError, ChangeFeed};
pub use derived::{DatePart, DerivedPropertyDefinition, SelectionOperation};
pub use edits::TransactionEdit;
pub use object_set::{NearestNeighborsQuery, WireObjectSet};
pub use request::{
	LoadObjectSetRequest, LoadObjectSetResponse, ObjectChange, ObjectState, OrderBy,
	OrderByField, SortDirection, WireObject,
};
pub use where_clause::WhereClause;

/// API name of an object type, e.g. `"Employee"`.
pub type ObjectTypeApiName = String;

/// API name of an interface type, e.g. `"FooInterface"`.
pub type InterfaceTypeApiName = String;
