//! Deterministic cache keys.
//!
//! Two requests that must return the same objects map to the same key: where clauses are
//! canonicalized, union and intersect operands are sorted, and selected properties are sorted
//! and deduplicated. Subtract keeps its first operand in place and sorts the ones removed
//! from it.

use osdk_wire::{DerivedPropertyDefinition, WireObjectSet};

use std::{iter, sync::Arc};

use itertools::Itertools;
use serde_json::{json, Value};

use super::page::FetchPageArgs;

/// Prefix shared by every list key, usable with
/// [`ObservableCache::invalidate_by_pattern`](osdk_cache::ObservableCache::invalidate_by_pattern).
pub const LIST_KEY_PREFIX: &str = "[\"list\",";

/// Prefix shared by every single object key.
pub const OBJECT_KEY_PREFIX: &str = "[\"object\",";

#[must_use]
pub fn canonicalize(object_set: &WireObjectSet) -> WireObjectSet {
	match object_set {
		WireObjectSet::Filter {
			object_set,
			where_clause,
		} => WireObjectSet::Filter {
			object_set: canonical_child(object_set),
			where_clause: where_clause.clone().canonicalize(),
		},
		WireObjectSet::SearchAround { object_set, link } => WireObjectSet::SearchAround {
			object_set: canonical_child(object_set),
			link: link.clone(),
		},
		WireObjectSet::InterfaceLinkSearchAround {
			object_set,
			interface_link,
		} => WireObjectSet::InterfaceLinkSearchAround {
			object_set: canonical_child(object_set),
			interface_link: interface_link.clone(),
		},
		WireObjectSet::Union { object_sets } => WireObjectSet::Union {
			object_sets: sorted_operands(object_sets),
		},
		WireObjectSet::Intersect { object_sets } => WireObjectSet::Intersect {
			object_sets: sorted_operands(object_sets),
		},
		WireObjectSet::Subtract { object_sets } => WireObjectSet::Subtract {
			object_sets: match object_sets.split_first() {
				Some((minuend, subtrahends)) => iter::once(canonical_child(minuend))
					.chain(sorted_operands(subtrahends))
					.collect(),
				None => Vec::new(),
			},
		},
		WireObjectSet::WithProperties {
			object_set,
			derived_properties,
		} => WireObjectSet::WithProperties {
			object_set: canonical_child(object_set),
			derived_properties: derived_properties
				.iter()
				.map(|(name, definition)| (name.clone(), canonical_derived(definition)))
				.collect(),
		},
		WireObjectSet::AsType {
			object_set,
			entity_type,
		} => WireObjectSet::AsType {
			object_set: canonical_child(object_set),
			entity_type: entity_type.clone(),
		},
		WireObjectSet::AsBaseObjectTypes { object_set } => WireObjectSet::AsBaseObjectTypes {
			object_set: canonical_child(object_set),
		},
		WireObjectSet::NearestNeighbors {
			object_set,
			query,
			num_neighbors,
			property_identifier,
		} => WireObjectSet::NearestNeighbors {
			object_set: canonical_child(object_set),
			query: query.clone(),
			num_neighbors: *num_neighbors,
			property_identifier: property_identifier.clone(),
		},
		WireObjectSet::Static { objects } => WireObjectSet::Static {
			objects: objects.iter().sorted().dedup().cloned().collect(),
		},
		WireObjectSet::Base { .. }
		| WireObjectSet::InterfaceBase { .. }
		| WireObjectSet::Reference { .. }
		| WireObjectSet::MethodInput => object_set.clone(),
	}
}

fn canonical_child(object_set: &Arc<WireObjectSet>) -> Arc<WireObjectSet> {
	Arc::new(canonicalize(object_set))
}

fn sorted_operands(object_sets: &[Arc<WireObjectSet>]) -> Vec<Arc<WireObjectSet>> {
	object_sets
		.iter()
		.map(canonical_child)
		.sorted_by_cached_key(|operand| to_json(&**operand).to_string())
		.collect()
}

fn canonical_derived(definition: &DerivedPropertyDefinition) -> DerivedPropertyDefinition {
	let map = |properties: &[DerivedPropertyDefinition]| {
		properties.iter().map(canonical_derived).collect::<Vec<_>>()
	};
	let boxed = |property: &DerivedPropertyDefinition| Box::new(canonical_derived(property));

	match definition {
		DerivedPropertyDefinition::Selection {
			object_set,
			operation,
		} => DerivedPropertyDefinition::Selection {
			object_set: canonical_child(object_set),
			operation: operation.clone(),
		},
		DerivedPropertyDefinition::Property { .. } | DerivedPropertyDefinition::Literal { .. } => {
			definition.clone()
		}
		DerivedPropertyDefinition::Add { properties } => DerivedPropertyDefinition::Add {
			properties: map(properties),
		},
		DerivedPropertyDefinition::Multiply { properties } => DerivedPropertyDefinition::Multiply {
			properties: map(properties),
		},
		DerivedPropertyDefinition::Least { properties } => DerivedPropertyDefinition::Least {
			properties: map(properties),
		},
		DerivedPropertyDefinition::Greatest { properties } => DerivedPropertyDefinition::Greatest {
			properties: map(properties),
		},
		DerivedPropertyDefinition::Subtract { left, right } => DerivedPropertyDefinition::Subtract {
			left: boxed(left),
			right: boxed(right),
		},
		DerivedPropertyDefinition::Divide { left, right } => DerivedPropertyDefinition::Divide {
			left: boxed(left),
			right: boxed(right),
		},
		DerivedPropertyDefinition::Negate { property } => DerivedPropertyDefinition::Negate {
			property: boxed(property),
		},
		DerivedPropertyDefinition::AbsoluteValue { property } => {
			DerivedPropertyDefinition::AbsoluteValue {
				property: boxed(property),
			}
		}
		DerivedPropertyDefinition::Extract { part, property } => DerivedPropertyDefinition::Extract {
			part: *part,
			property: boxed(property),
		},
	}
}

fn to_json(value: &impl serde::Serialize) -> Value {
	// Wire types only contain maps with string keys, which always serialize.
	serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Key for one page of `object_set`.
#[must_use]
pub fn list_key(object_set: &WireObjectSet, args: &FetchPageArgs) -> String {
	let select = args.select.iter().sorted().dedup().collect::<Vec<_>>();

	json!([
		"list",
		{
			"objectSet": to_json(&canonicalize(object_set)),
			"select": select,
			"orderBy": to_json(&args.order_by),
			"pageSize": args.page_size,
			"pageToken": args.next_page_token,
			"excludeRid": args.exclude_rid,
		}
	])
	.to_string()
}

/// Key for a single object.
#[must_use]
pub fn object_key(object_type: &str, primary_key: &Value) -> String {
	json!(["object", object_type, primary_key]).to_string()
}
