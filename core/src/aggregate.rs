use osdk_ontology::PropertyType;
use osdk_wire::{
	AggregateResponse, Aggregation, AggregationAccuracy, GroupBy as WireGroupBy,
};

use std::{collections::BTreeMap, str::FromStr};

use serde_json::Value;

use super::error::{Error, Result};

/// Aggregation functions, named as in `"property:function"` metric strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "camelCase")]
pub enum AggregationFunction {
	Min,
	Max,
	Avg,
	Sum,
	ExactDistinct,
	ApproximateDistinct,
	CollectList,
	CollectSet,
	ApproximatePercentile,
}

impl AggregationFunction {
	/// Whether the function is only defined over numeric properties.
	#[must_use]
	pub const fn is_numeric_only(self) -> bool {
		matches!(
			self,
			Self::Min | Self::Max | Self::Avg | Self::Sum | Self::ApproximatePercentile
		)
	}
}

/// Splits `"salary:avg"` into its property and function.
pub(crate) fn parse_metric(metric: &str) -> Result<(String, AggregationFunction)> {
	let (property, function) = metric
		.rsplit_once(':')
		.ok_or_else(|| Error::InvalidAggregation(format!("expected 'property:function', got '{metric}'")))?;

	let function = AggregationFunction::from_str(function)
		.map_err(|_| Error::InvalidAggregation(format!("unknown aggregation function '{function}'")))?;

	if property.is_empty() {
		return Err(Error::InvalidAggregation(format!("missing property in '{metric}'")));
	}

	Ok((property.to_string(), function))
}

/// One requested metric of an object set aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Metric {
	Count,
	Field {
		property: String,
		function: AggregationFunction,
	},
}

impl Metric {
	#[must_use]
	pub fn field(property: impl Into<String>, function: AggregationFunction) -> Self {
		Self::Field {
			property: property.into(),
			function,
		}
	}

	/// `$count` or `property:function`, used as the metric's key in result rows.
	#[must_use]
	pub fn name(&self) -> String {
		match self {
			Self::Count => "$count".to_string(),
			Self::Field { property, function } => format!("{property}:{function}"),
		}
	}

	pub(crate) fn to_wire(&self) -> Result<Aggregation> {
		let name = self.name();
		let Self::Field { property, function } = self else {
			return Ok(Aggregation::Count { name });
		};
		let field = property.clone();

		Ok(match function {
			AggregationFunction::Min => Aggregation::Min { field, name },
			AggregationFunction::Max => Aggregation::Max { field, name },
			AggregationFunction::Avg => Aggregation::Avg { field, name },
			AggregationFunction::Sum => Aggregation::Sum { field, name },
			AggregationFunction::ExactDistinct => Aggregation::ExactDistinct { field, name },
			AggregationFunction::ApproximateDistinct => {
				Aggregation::ApproximateDistinct { field, name }
			}
			AggregationFunction::CollectList
			| AggregationFunction::CollectSet
			| AggregationFunction::ApproximatePercentile => {
				return Err(Error::InvalidAggregation(format!(
					"'{function}' is only available in derived properties"
				)));
			}
		})
	}

	pub(crate) fn check_type(&self, data_type: PropertyType) -> Result<()> {
		match self {
			Self::Field { property, function } if function.is_numeric_only() && !data_type.is_numeric() => {
				Err(Error::InvalidAggregation(format!(
					"'{function}' needs a numeric property, '{property}' is {data_type}"
				)))
			}
			_ => Ok(()),
		}
	}
}

impl FromStr for Metric {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		if s == "$count" {
			return Ok(Self::Count);
		}

		let (property, function) = parse_metric(s)?;
		Ok(Self::Field { property, function })
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupBy {
	Exact {
		property: String,
		max_group_count: Option<u32>,
	},
	FixedWidth {
		property: String,
		width: f64,
	},
}

impl GroupBy {
	#[must_use]
	pub fn property(&self) -> &str {
		match self {
			Self::Exact { property, .. } | Self::FixedWidth { property, .. } => property,
		}
	}

	pub(crate) fn to_wire(&self) -> Result<WireGroupBy> {
		Ok(match self {
			Self::Exact {
				property,
				max_group_count,
			} => WireGroupBy::Exact {
				field: property.clone(),
				max_group_count: *max_group_count,
			},
			Self::FixedWidth { property, width } => {
				if !(width.is_finite() && *width > 0.0) {
					return Err(Error::InvalidAggregation(format!(
						"fixed width for '{property}' must be positive, got {width}"
					)));
				}
				WireGroupBy::FixedWidth {
					field: property.clone(),
					fixed_width: *width,
				}
			}
		})
	}
}

/// What [`ObjectSet::aggregate`](crate::ObjectSet::aggregate) computes.
///
/// ```ignore
/// let options = AggregateOptions::new()
/// 	.select("$count")?
/// 	.select("salary:avg")?
/// 	.group_by_exact("class", None);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateOptions {
	pub metrics: Vec<Metric>,
	pub group_by: Vec<GroupBy>,
}

impl AggregateOptions {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn metric(mut self, metric: Metric) -> Self {
		self.metrics.push(metric);
		self
	}

	pub fn select(self, metric: &str) -> Result<Self> {
		Ok(self.metric(metric.parse()?))
	}

	#[must_use]
	pub fn group_by_exact(mut self, property: impl Into<String>, max_group_count: Option<u32>) -> Self {
		self.group_by.push(GroupBy::Exact {
			property: property.into(),
			max_group_count,
		});
		self
	}

	#[must_use]
	pub fn group_by_fixed_width(mut self, property: impl Into<String>, width: f64) -> Self {
		self.group_by.push(GroupBy::FixedWidth {
			property: property.into(),
			width,
		});
		self
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
	pub group: BTreeMap<String, Value>,
	pub metrics: BTreeMap<String, Value>,
}

impl AggregateRow {
	#[must_use]
	pub fn metric(&self, name: &str) -> Option<&Value> {
		self.metrics.get(name)
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult {
	/// In backend order.
	pub rows: Vec<AggregateRow>,
	pub accuracy: AggregationAccuracy,
}

impl AggregateResult {
	/// Shapes a backend response so every row carries every group key and metric, `null` when
	/// the backend left one out.
	pub(crate) fn from_response(response: AggregateResponse, options: &AggregateOptions) -> Self {
		let metric_names = options.metrics.iter().map(Metric::name).collect::<Vec<_>>();

		let rows = response
			.data
			.into_iter()
			.map(|row| {
				let mut group = row.group;
				for group_by in &options.group_by {
					group
						.entry(group_by.property().to_string())
						.or_insert(Value::Null);
				}

				let mut metrics = row
					.metrics
					.into_iter()
					.map(|metric| (metric.name, metric.value))
					.collect::<BTreeMap<_, _>>();
				for name in &metric_names {
					metrics.entry(name.clone()).or_insert(Value::Null);
				}

				AggregateRow { group, metrics }
			})
			.collect();

		Self {
			rows,
			accuracy: response.accuracy,
		}
	}

	/// The metric of the first row, for ungrouped aggregations.
	#[must_use]
	pub fn metric(&self, name: &str) -> Option<&Value> {
		self.rows.first().and_then(|row| row.metric(name))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_metric_strings() {
		assert_eq!("$count".parse::<Metric>().unwrap(), Metric::Count);
		assert_eq!(
			"salary:approximateDistinct".parse::<Metric>().unwrap(),
			Metric::field("salary", AggregationFunction::ApproximateDistinct)
		);
		assert_eq!(
			Metric::field("salary", AggregationFunction::Avg).name(),
			"salary:avg"
		);
		assert!(matches!(
			"salary:median".parse::<Metric>(),
			Err(Error::InvalidAggregation(_))
		));
		assert!(matches!("salary".parse::<Metric>(), Err(Error::InvalidAggregation(_))));
	}

	#[test]
	fn numeric_functions_reject_other_types() {
		let avg = Metric::field("fullName", AggregationFunction::Avg);
		assert!(avg.check_type(PropertyType::String).is_err());
		assert!(avg.check_type(PropertyType::Double).is_ok());

		let distinct = Metric::field("fullName", AggregationFunction::ExactDistinct);
		assert!(distinct.check_type(PropertyType::String).is_ok());
	}

	#[test]
	fn collect_functions_are_derived_only() {
		assert!(Metric::field("fullName", AggregationFunction::CollectList)
			.to_wire()
			.is_err());
	}
}
