use osdk_ontology::OntologyProvider;
use osdk_wire::{
	BackendError, DatePart, DerivedPropertyDefinition, NearestNeighborsQuery, OrderBy,
	SelectionOperation, SortDirection, WhereClause, WireObject, WireObjectSet,
};

use std::cmp::Ordering;

use chrono::{DateTime, Datelike, NaiveDate};
use itertools::Itertools;
use serde_json::{json, Value};

use super::store::{pk_key, FauxDataStore};

fn identity(object: &WireObject) -> (String, String) {
	(object.api_name.clone(), pk_key(&object.primary_key))
}

fn bad_request(error_name: &str, message: impl Into<String>) -> BackendError {
	BackendError::new(400, error_name, message)
}

/// Resolves an object set against the store. `method_input` is the object a derived property
/// is being computed for.
pub fn evaluate(
	store: &FauxDataStore,
	object_set: &WireObjectSet,
	method_input: Option<&WireObject>,
) -> Result<Vec<WireObject>, BackendError> {
	match object_set {
		WireObjectSet::Base { object_type } => {
			if store.ontology().object_type(object_type).is_none() {
				return Err(BackendError::new(
					404,
					"ObjectTypeNotFound",
					format!("unknown object type '{object_type}'"),
				));
			}
			Ok(store.objects_of_type(object_type).cloned().collect())
		}

		WireObjectSet::InterfaceBase { interface_type } => Ok(store
			.ontology()
			.implementers(interface_type)
			.iter()
			.flat_map(|object_type| store.objects_of_type(object_type).cloned())
			.collect()),

		WireObjectSet::Reference { object_type, id } => Ok(store
			.get_object(object_type, &Value::String(id.clone()))
			.cloned()
			.into_iter()
			.collect()),

		WireObjectSet::Static { objects } => Ok(objects
			.iter()
			.filter_map(|rid| store.get_object_by_rid(rid).cloned())
			.collect()),

		WireObjectSet::Filter {
			object_set,
			where_clause,
		} => Ok(evaluate(store, object_set, method_input)?
			.into_iter()
			.filter(|object| matches(object, where_clause))
			.collect()),

		WireObjectSet::SearchAround { object_set, link }
		| WireObjectSet::InterfaceLinkSearchAround {
			object_set,
			interface_link: link,
		} => {
			let mut linked = Vec::new();
			for object in evaluate(store, object_set, method_input)? {
				linked.extend(
					store
						.linked_objects(&object.api_name, &object.primary_key, link)?
						.into_iter()
						.cloned(),
				);
			}
			Ok(linked.into_iter().unique_by(identity).collect())
		}

		WireObjectSet::Union { object_sets } => {
			let mut all = Vec::new();
			for object_set in object_sets {
				all.extend(evaluate(store, object_set, method_input)?);
			}
			Ok(all.into_iter().unique_by(identity).collect())
		}

		WireObjectSet::Intersect { object_sets } => {
			let Some((first, rest)) = object_sets.split_first() else {
				return Err(bad_request("InvalidObjectSet", "intersect without operands"));
			};

			let mut result = evaluate(store, first, method_input)?;
			for object_set in rest {
				let other = evaluate(store, object_set, method_input)?;
				result.retain_mut(|object| {
					other
						.iter()
						.find(|candidate| identity(candidate) == identity(object))
						.map(|matched| {
							for (name, value) in &matched.properties {
								object
									.properties
									.entry(name.clone())
									.or_insert_with(|| value.clone());
							}
						})
						.is_some()
				});
			}
			Ok(result)
		}

		WireObjectSet::Subtract { object_sets } => {
			let Some((first, rest)) = object_sets.split_first() else {
				return Err(bad_request("InvalidObjectSet", "subtract without operands"));
			};

			let mut result = evaluate(store, first, method_input)?;
			for object_set in rest {
				let removed = evaluate(store, object_set, method_input)?
					.iter()
					.map(identity)
					.collect::<Vec<_>>();
				result.retain(|object| !removed.contains(&identity(object)));
			}
			Ok(result)
		}

		WireObjectSet::WithProperties {
			object_set,
			derived_properties,
		} => evaluate(store, object_set, method_input)?
			.into_iter()
			.map(|mut object| -> Result<WireObject, BackendError> {
				for (name, definition) in derived_properties {
					let value = derived_value(store, &object, definition)?;
					object.properties.insert(name.clone(), value);
				}
				Ok(object)
			})
			.collect(),

		WireObjectSet::AsType {
			object_set,
			entity_type,
		} => Ok(evaluate(store, object_set, method_input)?
			.into_iter()
			.filter(|object| {
				&object.api_name == entity_type
					|| store
						.ontology()
						.object_type(&object.api_name)
						.is_some_and(|def| def.implements.contains(entity_type))
			})
			.collect()),

		WireObjectSet::AsBaseObjectTypes { object_set } => {
			evaluate(store, object_set, method_input)
		}

		WireObjectSet::NearestNeighbors {
			object_set,
			query,
			num_neighbors,
			property_identifier,
		} => {
			let limit = usize::try_from(*num_neighbors).unwrap_or(usize::MAX);
			let objects = evaluate(store, object_set, method_input)?;

			match query {
				NearestNeighborsQuery::Vector { value } => Ok(objects
					.into_iter()
					.filter_map(|object| {
						let score = object
							.property(property_identifier)
							.and_then(as_vector)
							.and_then(|vector| cosine_similarity(value, &vector))?;
						Some((score, object))
					})
					.sorted_by(|(a, _), (b, _)| b.partial_cmp(a).unwrap_or(Ordering::Equal))
					.take(limit)
					.map(|(_, object)| object)
					.collect()),
				// No embedding model here; text queries return the first neighbors.
				NearestNeighborsQuery::Text { .. } => Ok(objects.into_iter().take(limit).collect()),
			}
		}

		WireObjectSet::MethodInput => method_input
			.cloned()
			.map(|object| vec![object])
			.ok_or_else(|| bad_request("InvalidObjectSet", "methodInput outside of a derived property")),
	}
}

fn as_vector(value: &Value) -> Option<Vec<f64>> {
	value.as_array()?.iter().map(Value::as_f64).collect()
}

fn cosine_similarity(a: &[f64], b: &[f64]) -> Option<f64> {
	if a.len() != b.len() || a.is_empty() {
		return None;
	}

	let dot = a.iter().zip(b).map(|(x, y)| x * y).sum::<f64>();
	let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
	let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();

	(norm_a > 0.0 && norm_b > 0.0).then(|| dot / (norm_a * norm_b))
}

/// Evaluates a derived property for one object.
pub fn derived_value(
	store: &FauxDataStore,
	object: &WireObject,
	definition: &DerivedPropertyDefinition,
) -> Result<Value, BackendError> {
	let value = match definition {
		DerivedPropertyDefinition::Selection {
			object_set,
			operation,
		} => {
			let selected = evaluate(store, object_set, Some(object))?;
			selection_value(&selected, operation)?
		}

		DerivedPropertyDefinition::Property { api_name } => {
			object.property(api_name).cloned().unwrap_or(Value::Null)
		}

		DerivedPropertyDefinition::Literal { value } => value.clone(),

		DerivedPropertyDefinition::Add { properties } => {
			fold_numbers(&operand_values(store, object, properties)?, 0.0, |a, b| a + b)
		}

		DerivedPropertyDefinition::Multiply { properties } => {
			fold_numbers(&operand_values(store, object, properties)?, 1.0, |a, b| a * b)
		}

		DerivedPropertyDefinition::Least { properties } => {
			pick_number(&operand_values(store, object, properties)?, Ordering::Less)
		}

		DerivedPropertyDefinition::Greatest { properties } => {
			pick_number(&operand_values(store, object, properties)?, Ordering::Greater)
		}

		DerivedPropertyDefinition::Subtract { left, right } => {
			let left = derived_value(store, object, left)?;
			let right = derived_value(store, object, right)?;
			match (left.as_f64(), right.as_f64()) {
				(Some(l), Some(r)) => number(l - r, is_integral(&left) && is_integral(&right)),
				_ => Value::Null,
			}
		}

		DerivedPropertyDefinition::Divide { left, right } => {
			let left = derived_value(store, object, left)?;
			let right = derived_value(store, object, right)?;
			match (left.as_f64(), right.as_f64()) {
				(Some(l), Some(r)) if r != 0.0 => json!(l / r),
				_ => Value::Null,
			}
		}

		DerivedPropertyDefinition::Negate { property } => {
			let value = derived_value(store, object, property)?;
			value
				.as_f64()
				.map_or(Value::Null, |v| number(-v, is_integral(&value)))
		}

		DerivedPropertyDefinition::AbsoluteValue { property } => {
			let value = derived_value(store, object, property)?;
			value
				.as_f64()
				.map_or(Value::Null, |v| number(v.abs(), is_integral(&value)))
		}

		DerivedPropertyDefinition::Extract { part, property } => {
			let value = derived_value(store, object, property)?;
			value
				.as_str()
				.and_then(|raw| extract(raw, *part))
				.map_or(Value::Null, |part| json!(part))
		}
	};

	Ok(value)
}

fn operand_values(
	store: &FauxDataStore,
	object: &WireObject,
	operands: &[DerivedPropertyDefinition],
) -> Result<Vec<Value>, BackendError> {
	operands
		.iter()
		.map(|operand| derived_value(store, object, operand))
		.collect()
}

fn selection_value(
	selected: &[WireObject],
	operation: &SelectionOperation,
) -> Result<Value, BackendError> {
	let values = || {
		operation
			.selected_property()
			.map(|property| {
				selected
					.iter()
					.filter_map(|object| object.property(property))
					.filter(|value| !value.is_null())
					.cloned()
					.collect::<Vec<_>>()
			})
			.unwrap_or_default()
	};

	let value = match operation {
		SelectionOperation::Get { .. } => {
			if selected.len() > 1 {
				return Err(bad_request(
					"InvalidDerivedProperty",
					"cannot get a property from more than one object",
				));
			}
			values().into_iter().next().unwrap_or(Value::Null)
		}
		SelectionOperation::Count => json!(selected.len()),
		SelectionOperation::Min { .. } => pick_number(&values(), Ordering::Less),
		SelectionOperation::Max { .. } => pick_number(&values(), Ordering::Greater),
		SelectionOperation::Sum { .. } => fold_numbers(&values(), 0.0, |a, b| a + b),
		SelectionOperation::Avg { .. } => {
			let numbers = values().iter().filter_map(Value::as_f64).collect::<Vec<_>>();
			if numbers.is_empty() {
				Value::Null
			} else {
				#[allow(clippy::cast_precision_loss)]
				let count = numbers.len() as f64;
				json!(numbers.iter().sum::<f64>() / count)
			}
		}
		SelectionOperation::ExactDistinct { .. } | SelectionOperation::ApproximateDistinct { .. } => {
			json!(values().iter().unique_by(|value| value.to_string()).count())
		}
		SelectionOperation::CollectList { limit, .. } => Value::Array(
			values()
				.into_iter()
				.take(usize::try_from(*limit).unwrap_or(usize::MAX))
				.collect(),
		),
		SelectionOperation::CollectSet { limit, .. } => Value::Array(
			values()
				.into_iter()
				.unique_by(ToString::to_string)
				.take(usize::try_from(*limit).unwrap_or(usize::MAX))
				.collect(),
		),
		SelectionOperation::ApproximatePercentile {
			approximate_percentile,
			..
		} => {
			let numbers = values()
				.iter()
				.filter_map(Value::as_f64)
				.sorted_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
				.collect::<Vec<_>>();
			percentile(&numbers, *approximate_percentile).map_or(Value::Null, |p| json!(p))
		}
	};

	Ok(value)
}

#[allow(
	clippy::cast_possible_truncation,
	clippy::cast_sign_loss,
	clippy::cast_precision_loss
)]
fn percentile(sorted: &[f64], fraction: f64) -> Option<f64> {
	if sorted.is_empty() {
		return None;
	}
	let rank = (fraction.clamp(0.0, 1.0) * sorted.len() as f64).ceil() as usize;
	sorted.get(rank.saturating_sub(1)).copied()
}

fn is_integral(value: &Value) -> bool {
	matches!(value, Value::Number(n) if !n.is_f64())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn number(value: f64, integral: bool) -> Value {
	if integral && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
		json!(value as i64)
	} else {
		json!(value)
	}
}

fn fold_numbers(values: &[Value], init: f64, op: impl Fn(f64, f64) -> f64) -> Value {
	let mut acc = init;
	for value in values {
		let Some(n) = value.as_f64() else {
			return Value::Null;
		};
		acc = op(acc, n);
	}

	number(acc, values.iter().all(is_integral))
}

fn pick_number(values: &[Value], wanted: Ordering) -> Value {
	values
		.iter()
		.filter(|value| value.is_number())
		.reduce(|best, value| {
			if compare(value, best) == Some(wanted) {
				value
			} else {
				best
			}
		})
		.cloned()
		.unwrap_or(Value::Null)
}

fn extract(raw: &str, part: DatePart) -> Option<i64> {
	let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
		.ok()
		.or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|ts| ts.date_naive()))?;

	Some(match part {
		DatePart::Days => i64::from(date.day()),
		DatePart::Months => i64::from(date.month()),
		DatePart::Quarters => i64::from((date.month() - 1) / 3 + 1),
		DatePart::Years => i64::from(date.year()),
	})
}

/// Ordering between two property values of the same kind, `None` across kinds.
#[must_use]
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
	match (a, b) {
		(Value::Number(_), Value::Number(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
		(Value::String(a), Value::String(b)) => Some(a.cmp(b)),
		(Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
		_ => None,
	}
}

fn equals(a: &Value, b: &Value) -> bool {
	compare(a, b).map_or(a == b, Ordering::is_eq)
}

fn field_is(object: &WireObject, field: &str, value: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
	object
		.property(field)
		.and_then(|actual| compare(actual, value))
		.is_some_and(accept)
}

#[must_use]
pub fn matches(object: &WireObject, clause: &WhereClause) -> bool {
	match clause {
		WhereClause::Eq { field, value } => object
			.property(field)
			.is_some_and(|actual| equals(actual, value)),
		WhereClause::Gt { field, value } => field_is(object, field, value, Ordering::is_gt),
		WhereClause::Gte { field, value } => field_is(object, field, value, Ordering::is_ge),
		WhereClause::Lt { field, value } => field_is(object, field, value, Ordering::is_lt),
		WhereClause::Lte { field, value } => field_is(object, field, value, Ordering::is_le),
		WhereClause::IsNull { field, value } => {
			object.property(field).map_or(true, Value::is_null) == *value
		}
		WhereClause::In { field, value } => object
			.property(field)
			.is_some_and(|actual| value.iter().any(|candidate| equals(actual, candidate))),
		WhereClause::StartsWith { field, value } => object
			.property(field)
			.and_then(Value::as_str)
			.is_some_and(|actual| actual.to_lowercase().starts_with(&value.to_lowercase())),
		WhereClause::ContainsAllTerms { field, value } => object
			.property(field)
			.and_then(Value::as_str)
			.is_some_and(|actual| {
				let actual = actual.to_lowercase();
				value
					.to_lowercase()
					.split_whitespace()
					.all(|term| actual.contains(term))
			}),
		WhereClause::And { value } => value.iter().all(|clause| matches(object, clause)),
		WhereClause::Or { value } => value.iter().any(|clause| matches(object, clause)),
		WhereClause::Not { value } => !matches(object, value),
	}
}

/// Sorts by each field in turn; missing and null values sort last in either direction.
pub fn sort_objects(objects: &mut [WireObject], order_by: &OrderBy) {
	objects.sort_by(|a, b| {
		order_by
			.fields
			.iter()
			.map(|field| {
				let a = a.property(&field.field).filter(|v| !v.is_null());
				let b = b.property(&field.field).filter(|v| !v.is_null());
				match (a, b) {
					(None, None) => Ordering::Equal,
					(None, Some(_)) => Ordering::Greater,
					(Some(_), None) => Ordering::Less,
					(Some(a), Some(b)) => {
						let ordering = compare(a, b).unwrap_or(Ordering::Equal);
						match field.direction {
							SortDirection::Asc => ordering,
							SortDirection::Desc => ordering.reverse(),
						}
					}
				}
			})
			.find(|ordering| ordering.is_ne())
			.unwrap_or(Ordering::Equal)
	});
}

#[cfg(test)]
mod tests {
	use std::{collections::BTreeMap, sync::Arc};

	use osdk_wire::OrderByField;

	use crate::fixtures::{self, EMPLOYEE, OFFICE};

	use super::*;

	fn employees() -> Arc<WireObjectSet> {
		Arc::new(WireObjectSet::base(EMPLOYEE))
	}

	fn pks(objects: &[WireObject]) -> Vec<Value> {
		objects.iter().map(|o| o.primary_key.clone()).collect()
	}

	#[test]
	fn filters_and_pivots() {
		let store = fixtures::seeded_store();

		let offices = evaluate(
			&store,
			&WireObjectSet::SearchAround {
				object_set: Arc::new(WireObjectSet::Filter {
					object_set: employees(),
					where_clause: WhereClause::eq("class", "Red"),
				}),
				link: "officeLink".to_string(),
			},
			None,
		)
		.unwrap();

		assert!(offices.iter().all(|o| o.api_name == OFFICE));
		assert_eq!(pks(&offices), [json!("NYC")]);
	}

	#[test]
	fn set_algebra() {
		let store = fixtures::seeded_store();
		let low = Arc::new(WireObjectSet::Filter {
			object_set: employees(),
			where_clause: WhereClause::lte("employeeId", 50031),
		});
		let high = Arc::new(WireObjectSet::Filter {
			object_set: employees(),
			where_clause: WhereClause::gte("employeeId", 50031),
		});

		let union = evaluate(
			&store,
			&WireObjectSet::Union {
				object_sets: vec![low.clone(), high.clone()],
			},
			None,
		)
		.unwrap();
		assert_eq!(union.len(), store.objects_of_type(EMPLOYEE).count());

		let intersect = evaluate(
			&store,
			&WireObjectSet::Intersect {
				object_sets: vec![low.clone(), high.clone()],
			},
			None,
		)
		.unwrap();
		assert_eq!(pks(&intersect), [json!(50031)]);

		let subtract = evaluate(
			&store,
			&WireObjectSet::Subtract {
				object_sets: vec![low, high],
			},
			None,
		)
		.unwrap();
		assert_eq!(pks(&subtract), [json!(50030)]);
	}

	#[test]
	fn derived_selection_and_arithmetic() {
		let store = fixtures::seeded_store();
		let lead_name = DerivedPropertyDefinition::Selection {
			object_set: Arc::new(WireObjectSet::SearchAround {
				object_set: Arc::new(WireObjectSet::MethodInput),
				link: "lead".to_string(),
			}),
			operation: SelectionOperation::Get {
				selected_property_api_name: "fullName".to_string(),
			},
		};
		let peeps = DerivedPropertyDefinition::Selection {
			object_set: Arc::new(WireObjectSet::SearchAround {
				object_set: Arc::new(WireObjectSet::MethodInput),
				link: "peeps".to_string(),
			}),
			operation: SelectionOperation::Count,
		};
		let doubled = DerivedPropertyDefinition::Multiply {
			properties: vec![
				DerivedPropertyDefinition::Property {
					api_name: "employeeId".to_string(),
				},
				DerivedPropertyDefinition::Literal { value: json!(2) },
			],
		};
		let year = DerivedPropertyDefinition::Extract {
			part: DatePart::Years,
			property: Box::new(DerivedPropertyDefinition::Property {
				api_name: "startDate".to_string(),
			}),
		};

		let objects = evaluate(
			&store,
			&WireObjectSet::WithProperties {
				object_set: Arc::new(WireObjectSet::Filter {
					object_set: employees(),
					where_clause: WhereClause::eq("employeeId", 50031),
				}),
				derived_properties: BTreeMap::from([
					("leadName".to_string(), lead_name),
					("peepCount".to_string(), peeps),
					("doubled".to_string(), doubled),
					("startYear".to_string(), year),
				]),
			},
			None,
		)
		.unwrap();

		let jane = &objects[0];
		assert_eq!(jane.property("leadName"), Some(&json!("John Doe")));
		assert_eq!(jane.property("peepCount"), Some(&json!(1)));
		assert_eq!(jane.property("doubled"), Some(&json!(100_062)));
		assert_eq!(jane.property("startYear"), Some(&json!(2020)));
	}

	#[test]
	fn nearest_neighbors_rank_by_cosine() {
		let store = fixtures::seeded_store();

		let objects = evaluate(
			&store,
			&WireObjectSet::NearestNeighbors {
				object_set: employees(),
				query: NearestNeighborsQuery::Vector {
					value: vec![0.0, 1.0],
				},
				num_neighbors: 1,
				property_identifier: "embedding".to_string(),
			},
			None,
		)
		.unwrap();

		assert_eq!(pks(&objects), [json!(50031)]);
	}

	#[test]
	fn method_input_outside_derived_property_fails() {
		let store = fixtures::seeded_store();

		assert!(evaluate(&store, &WireObjectSet::MethodInput, None).is_err());
	}

	#[test]
	fn where_matching() {
		let store = fixtures::seeded_store();
		let john = store.get_object(EMPLOYEE, &json!(50030)).unwrap();

		assert!(matches(john, &WhereClause::starts_with("fullName", "john")));
		assert!(matches(
			john,
			&WhereClause::ContainsAllTerms {
				field: "fullName".to_string(),
				value: "doe JOHN".to_string(),
			}
		));
		assert!(matches(john, &WhereClause::is_in("employeeId", [1, 50030])));
		assert!(matches(john, &WhereClause::is_null("missing")));
		assert!(!matches(john, &WhereClause::is_null("fullName")));
		assert!(matches(john, &WhereClause::gt("salary", 1.5)));
		assert!(matches(john, &WhereClause::eq("class", "Red").negate().negate()));
	}

	#[test]
	fn sorts_nulls_last() {
		let store = fixtures::seeded_store();
		let mut objects = store.objects_of_type(EMPLOYEE).cloned().collect::<Vec<_>>();

		sort_objects(
			&mut objects,
			&OrderBy {
				fields: vec![OrderByField {
					field: "salary".to_string(),
					direction: SortDirection::Desc,
				}],
			},
		);

		let salaries = objects
			.iter()
			.map(|o| o.property("salary").cloned().unwrap_or(Value::Null))
			.collect::<Vec<_>>();
		assert_eq!(salaries.last(), Some(&Value::Null));
		assert!(salaries[0].as_f64() >= salaries[1].as_f64());
	}
}
