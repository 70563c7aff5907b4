use osdk_wire::{
	AggregateResponse, Aggregation, AggregationAccuracy, AggregationGroup, AggregationMetric,
	BackendError, GroupBy, WireObject,
};

use std::collections::BTreeMap;

use itertools::Itertools;
use serde_json::{json, Value};

use super::evaluate::compare;

fn group_value(object: &WireObject, group_by: &GroupBy) -> Value {
	let value = object
		.property(group_by.field())
		.cloned()
		.unwrap_or(Value::Null);

	match group_by {
		GroupBy::Exact { .. } => value,
		GroupBy::FixedWidth { fixed_width, .. } => value
			.as_f64()
			.filter(|_| *fixed_width > 0.0)
			.map_or(Value::Null, |n| json!((n / fixed_width).floor() * fixed_width)),
	}
}

fn metric(objects: &[&WireObject], aggregation: &Aggregation) -> Value {
	let values = || {
		aggregation
			.field()
			.map(|field| {
				objects
					.iter()
					.filter_map(|object| object.property(field))
					.filter(|value| !value.is_null())
					.collect::<Vec<_>>()
			})
			.unwrap_or_default()
	};

	match aggregation {
		Aggregation::Count { .. } => json!(objects.len()),
		Aggregation::Min { .. } => values()
			.into_iter()
			.min_by(|a, b| compare(a, b).unwrap_or(std::cmp::Ordering::Equal))
			.cloned()
			.unwrap_or(Value::Null),
		Aggregation::Max { .. } => values()
			.into_iter()
			.max_by(|a, b| compare(a, b).unwrap_or(std::cmp::Ordering::Equal))
			.cloned()
			.unwrap_or(Value::Null),
		Aggregation::Sum { .. } => json!(values().iter().filter_map(|v| v.as_f64()).sum::<f64>()),
		Aggregation::Avg { .. } => {
			let numbers = values()
				.iter()
				.filter_map(|v| v.as_f64())
				.collect::<Vec<_>>();
			if numbers.is_empty() {
				Value::Null
			} else {
				#[allow(clippy::cast_precision_loss)]
				let count = numbers.len() as f64;
				json!(numbers.iter().sum::<f64>() / count)
			}
		}
		Aggregation::ExactDistinct { .. } | Aggregation::ApproximateDistinct { .. } => {
			json!(values().iter().unique_by(|value| value.to_string()).count())
		}
	}
}

/// Groups `objects` by every `group_by` key and computes each metric per group.
///
/// Groups come out in order of first appearance. Without group keys a single row is returned,
/// even for an empty input.
pub fn aggregate(
	objects: &[WireObject],
	aggregation: &[Aggregation],
	group_by: &[GroupBy],
) -> Result<AggregateResponse, BackendError> {
	if aggregation.is_empty() {
		return Err(BackendError::new(
			400,
			"InvalidAggregation",
			"at least one metric is required",
		));
	}

	let mut groups: Vec<(Vec<Value>, Vec<&WireObject>)> = Vec::new();
	for object in objects {
		let key = group_by
			.iter()
			.map(|group_by| group_value(object, group_by))
			.collect::<Vec<_>>();

		match groups.iter_mut().find(|(existing, _)| *existing == key) {
			Some((_, members)) => members.push(object),
			None => groups.push((key, vec![object])),
		}
	}

	if group_by.is_empty() && groups.is_empty() {
		groups.push((vec![], vec![]));
	}

	let max_groups = group_by
		.iter()
		.filter_map(|group_by| match group_by {
			GroupBy::Exact {
				max_group_count, ..
			} => *max_group_count,
			GroupBy::FixedWidth { .. } => None,
		})
		.min()
		.map_or(usize::MAX, |max| usize::try_from(max).unwrap_or(usize::MAX));

	let accuracy = if groups.len() > max_groups {
		AggregationAccuracy::Approximate
	} else {
		AggregationAccuracy::Accurate
	};

	let data = groups
		.into_iter()
		.take(max_groups)
		.map(|(key, members)| AggregationGroup {
			group: group_by
				.iter()
				.map(|group_by| group_by.field().to_string())
				.zip(key)
				.collect::<BTreeMap<_, _>>(),
			metrics: aggregation
				.iter()
				.map(|aggregation| AggregationMetric {
					name: aggregation.name().to_string(),
					value: metric(&members, aggregation),
				})
				.collect(),
		})
		.collect();

	Ok(AggregateResponse { data, accuracy })
}
