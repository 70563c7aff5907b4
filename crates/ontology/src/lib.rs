//!
//! # Ontology metadata
//!
//! Object type and interface definitions consumed by the object set engine, and the
//! [`OntologyProvider`] trait it resolves names through. [`Ontology`] is an in-memory provider
//! which validates cross references at build time.

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

mod definition;
mod error;
mod ontology;

pub use definition::{
	InterfaceDefinition, InterfaceLinkDefinition, InterfaceLinkTarget, LinkCardinality,
	LinkDefinition, ObjectOrInterface, ObjectTypeDefinition, PropertyDefinition, PropertyType,
};
pub use error::Error;
pub use ontology::{Ontology, OntologyBuilder, OntologyProvider};
