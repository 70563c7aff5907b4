use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::object_set::WireObjectSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateObjectSetRequest {
	pub object_set: Arc<WireObjectSet>,
	pub aggregation: Vec<Aggregation>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub group_by: Vec<GroupBy>,
}

/// A single metric to compute. `name` is the key the metric is returned under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Aggregation {
	Count { name: String },
	Min { field: String, name: String },
	Max { field: String, name: String },
	Avg { field: String, name: String },
	Sum { field: String, name: String },
	ExactDistinct { field: String, name: String },
	ApproximateDistinct { field: String, name: String },
}

impl Aggregation {
	#[must_use]
	pub fn name(&self) -> &str {
		match self {
			Self::Count { name }
			| Self::Min { name, .. }
			| Self::Max { name, .. }
			| Self::Avg { name, .. }
			| Self::Sum { name, .. }
			| Self::ExactDistinct { name, .. }
			| Self::ApproximateDistinct { name, .. } => name,
		}
	}

	#[must_use]
	pub fn field(&self) -> Option<&str> {
		match self {
			Self::Count { .. } => None,
			Self::Min { field, .. }
			| Self::Max { field, .. }
			| Self::Avg { field, .. }
			| Self::Sum { field, .. }
			| Self::ExactDistinct { field, .. }
			| Self::ApproximateDistinct { field, .. } => Some(field),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum GroupBy {
	Exact {
		field: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		max_group_count: Option<u32>,
	},
	FixedWidth { field: String, fixed_width: f64 },
}

impl GroupBy {
	#[must_use]
	pub fn field(&self) -> &str {
		match self {
			Self::Exact { field, .. } | Self::FixedWidth { field, .. } => field,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResponse {
	pub data: Vec<AggregationGroup>,
	#[serde(default)]
	pub accuracy: AggregationAccuracy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationGroup {
	#[serde(default)]
	pub group: BTreeMap<String, Value>,
	pub metrics: Vec<AggregationMetric>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationMetric {
	pub name: String,
	pub value: Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregationAccuracy {
	#[default]
	Accurate,
	Approximate,
}
