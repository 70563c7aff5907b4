//! Builders for derived property expressions.
//!
//! A [`DerivedPropertyBuilder`] starts at the object a property is computed for and can pivot
//! along links before selecting a property or aggregating. The resulting [`DerivedProperty`]
//! carries its data type, so arithmetic and date extraction are checked as they are built.

use osdk_ontology::{LinkCardinality, ObjectOrInterface, OntologyProvider, PropertyType};
use osdk_wire::{DatePart, DerivedPropertyDefinition, SelectionOperation, WireObjectSet};

use std::{str::FromStr, sync::Arc};

use serde_json::Value;

use super::{
	aggregate::{parse_metric, AggregationFunction},
	error::{Error, Result},
	typing::resolve_link,
};

pub const DEFAULT_COLLECT_LIMIT: u32 = 100;
pub const DEFAULT_PERCENTILE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedProperty {
	definition: DerivedPropertyDefinition,
	data_type: PropertyType,
}

/// Right hand side of an arithmetic expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
	Property(DerivedProperty),
	Constant(Value, PropertyType),
}

impl From<DerivedProperty> for Operand {
	fn from(property: DerivedProperty) -> Self {
		Self::Property(property)
	}
}

impl From<i32> for Operand {
	fn from(n: i32) -> Self {
		Self::Constant(n.into(), PropertyType::Integer)
	}
}

impl From<i64> for Operand {
	fn from(n: i64) -> Self {
		Self::Constant(n.into(), PropertyType::Long)
	}
}

impl From<f64> for Operand {
	fn from(n: f64) -> Self {
		Self::Constant(n.into(), PropertyType::Double)
	}
}

impl Operand {
	fn into_property(self) -> DerivedProperty {
		match self {
			Self::Property(property) => property,
			Self::Constant(value, data_type) => DerivedProperty {
				definition: DerivedPropertyDefinition::Literal { value },
				data_type,
			},
		}
	}
}

impl DerivedProperty {
	#[must_use]
	pub const fn definition(&self) -> &DerivedPropertyDefinition {
		&self.definition
	}

	#[must_use]
	pub const fn data_type(&self) -> PropertyType {
		self.data_type
	}

	#[must_use]
	pub fn into_definition(self) -> DerivedPropertyDefinition {
		self.definition
	}

	fn numeric(&self, operation: &str) -> Result<PropertyType> {
		if self.data_type.is_numeric() {
			Ok(self.data_type)
		} else {
			Err(Error::InvalidDerivedProperty(format!(
				"{operation} needs numeric operands, got {}",
				self.data_type
			)))
		}
	}

	fn binary(
		self,
		other: Operand,
		operation: &str,
		build: impl FnOnce(DerivedPropertyDefinition, DerivedPropertyDefinition) -> DerivedPropertyDefinition,
	) -> Result<Self> {
		let other = other.into_property();
		let data_type = self.numeric(operation)?.widen(other.numeric(operation)?);

		Ok(Self {
			definition: build(self.definition, other.definition),
			data_type,
		})
	}

	pub fn add(self, other: impl Into<Operand>) -> Result<Self> {
		self.binary(other.into(), "add", |left, right| DerivedPropertyDefinition::Add {
			properties: vec![left, right],
		})
	}

	pub fn subtract(self, other: impl Into<Operand>) -> Result<Self> {
		self.binary(other.into(), "subtract", |left, right| {
			DerivedPropertyDefinition::Subtract {
				left: Box::new(left),
				right: Box::new(right),
			}
		})
	}

	pub fn multiply(self, other: impl Into<Operand>) -> Result<Self> {
		self.binary(other.into(), "multiply", |left, right| {
			DerivedPropertyDefinition::Multiply {
				properties: vec![left, right],
			}
		})
	}

	/// Always produces a `double`.
	pub fn divide(self, other: impl Into<Operand>) -> Result<Self> {
		let mut quotient = self.binary(other.into(), "divide", |left, right| {
			DerivedPropertyDefinition::Divide {
				left: Box::new(left),
				right: Box::new(right),
			}
		})?;
		quotient.data_type = PropertyType::Double;
		Ok(quotient)
	}

	/// The smaller of the two operands.
	pub fn min(self, other: impl Into<Operand>) -> Result<Self> {
		self.binary(other.into(), "min", |left, right| DerivedPropertyDefinition::Least {
			properties: vec![left, right],
		})
	}

	/// The larger of the two operands.
	pub fn max(self, other: impl Into<Operand>) -> Result<Self> {
		self.binary(other.into(), "max", |left, right| {
			DerivedPropertyDefinition::Greatest {
				properties: vec![left, right],
			}
		})
	}

	pub fn negate(self) -> Result<Self> {
		let data_type = self.numeric("negate")?;
		Ok(Self {
			definition: DerivedPropertyDefinition::Negate {
				property: Box::new(self.definition),
			},
			data_type,
		})
	}

	pub fn abs(self) -> Result<Self> {
		let data_type = self.numeric("abs")?;
		Ok(Self {
			definition: DerivedPropertyDefinition::AbsoluteValue {
				property: Box::new(self.definition),
			},
			data_type,
		})
	}

	/// Extracts a calendar part of a date or timestamp as an integer.
	pub fn extract_part(self, part: DatePart) -> Result<Self> {
		if !self.data_type.is_temporal() {
			return Err(Error::InvalidDerivedProperty(format!(
				"extract_part needs a date or timestamp, got {}",
				self.data_type
			)));
		}

		Ok(Self {
			definition: DerivedPropertyDefinition::Extract {
				part,
				property: Box::new(self.definition),
			},
			data_type: PropertyType::Integer,
		})
	}
}

/// An aggregation over the objects a [`DerivedPropertyBuilder`] has pivoted to.
#[derive(Debug, Clone, PartialEq)]
pub enum DerivedAggregation {
	Count,
	Field {
		property: String,
		function: AggregationFunction,
		/// Maximum collected values for `collectList` and `collectSet`.
		limit: u32,
		/// Percentile for `approximatePercentile`, in `0.0..=1.0`.
		percentile: f64,
	},
}

impl DerivedAggregation {
	#[must_use]
	pub fn field(property: impl Into<String>, function: AggregationFunction) -> Self {
		Self::Field {
			property: property.into(),
			function,
			limit: DEFAULT_COLLECT_LIMIT,
			percentile: DEFAULT_PERCENTILE,
		}
	}

	#[must_use]
	pub fn with_limit(mut self, new_limit: u32) -> Self {
		if let Self::Field { limit, .. } = &mut self {
			*limit = new_limit;
		}
		self
	}

	#[must_use]
	pub fn with_percentile(mut self, new_percentile: f64) -> Self {
		if let Self::Field { percentile, .. } = &mut self {
			*percentile = new_percentile;
		}
		self
	}
}

impl FromStr for DerivedAggregation {
	type Err = Error;

	/// `"$count"` or `"property:function"`.
	fn from_str(s: &str) -> Result<Self> {
		if s == "$count" {
			return Ok(Self::Count);
		}

		let (property, function) = parse_metric(s)?;
		Ok(Self::field(property, function))
	}
}

/// Expression builder scoped to the object a derived property is computed for.
#[derive(Clone)]
pub struct DerivedPropertyBuilder {
	ontology: Arc<dyn OntologyProvider>,
	scope: ObjectOrInterface,
	object_set: Arc<WireObjectSet>,
	pivoted: bool,
	through_many: bool,
}

impl std::fmt::Debug for DerivedPropertyBuilder {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DerivedPropertyBuilder")
			.field("scope", &self.scope.api_name())
			.field("object_set", &self.object_set)
			.finish_non_exhaustive()
	}
}

impl DerivedPropertyBuilder {
	pub(crate) fn new(ontology: Arc<dyn OntologyProvider>, scope: ObjectOrInterface) -> Self {
		Self {
			ontology,
			scope,
			object_set: Arc::new(WireObjectSet::MethodInput),
			pivoted: false,
			through_many: false,
		}
	}

	#[must_use]
	pub const fn scope(&self) -> &ObjectOrInterface {
		&self.scope
	}

	/// A builder for the objects reached through `link`. `self` is left untouched.
	pub fn pivot_to(&self, link: &str) -> Result<Self> {
		let resolved = resolve_link(self.ontology.as_ref(), &self.scope, link)?;

		let object_set = if resolved.via_interface {
			WireObjectSet::InterfaceLinkSearchAround {
				object_set: Arc::clone(&self.object_set),
				interface_link: link.to_string(),
			}
		} else {
			WireObjectSet::SearchAround {
				object_set: Arc::clone(&self.object_set),
				link: link.to_string(),
			}
		};

		Ok(Self {
			ontology: Arc::clone(&self.ontology),
			scope: resolved.target,
			object_set: Arc::new(object_set),
			pivoted: true,
			through_many: self.through_many || resolved.cardinality == LinkCardinality::Many,
		})
	}

	fn property_type(&self, property: &str) -> Result<PropertyType> {
		self.scope
			.property(property)
			.map(|definition| definition.data_type)
			.ok_or_else(|| Error::PropertyNotFound {
				object_type: self.scope.api_name().to_string(),
				property: property.to_string(),
			})
	}

	/// The value of `property` on the current object, or on the single object a chain of
	/// one-cardinality pivots leads to.
	pub fn select_property(&self, property: &str) -> Result<DerivedProperty> {
		let data_type = self.property_type(property)?;

		if !self.pivoted {
			return Ok(DerivedProperty {
				definition: DerivedPropertyDefinition::Property {
					api_name: property.to_string(),
				},
				data_type,
			});
		}

		if self.through_many {
			return Err(Error::InvalidDerivedProperty(format!(
				"cannot select '{property}' after pivoting through a many link, aggregate instead"
			)));
		}

		Ok(self.selection(
			SelectionOperation::Get {
				selected_property_api_name: property.to_string(),
			},
			data_type,
		))
	}

	pub fn aggregate(&self, aggregation: DerivedAggregation) -> Result<DerivedProperty> {
		let DerivedAggregation::Field {
			property,
			function,
			limit,
			percentile,
		} = aggregation
		else {
			return Ok(self.selection(SelectionOperation::Count, PropertyType::Integer));
		};

		let property_type = self.property_type(&property)?;
		if function.is_numeric_only() && !property_type.is_numeric() {
			return Err(Error::InvalidAggregation(format!(
				"'{function}' needs a numeric property, '{property}' is {property_type}"
			)));
		}

		let selected_property_api_name = property;
		let (operation, data_type) = match function {
			AggregationFunction::Min => (
				SelectionOperation::Min {
					selected_property_api_name,
				},
				property_type,
			),
			AggregationFunction::Max => (
				SelectionOperation::Max {
					selected_property_api_name,
				},
				property_type,
			),
			AggregationFunction::Sum => (
				SelectionOperation::Sum {
					selected_property_api_name,
				},
				property_type,
			),
			AggregationFunction::Avg => (
				SelectionOperation::Avg {
					selected_property_api_name,
				},
				PropertyType::Double,
			),
			AggregationFunction::ExactDistinct => (
				SelectionOperation::ExactDistinct {
					selected_property_api_name,
				},
				PropertyType::Integer,
			),
			AggregationFunction::ApproximateDistinct => (
				SelectionOperation::ApproximateDistinct {
					selected_property_api_name,
				},
				PropertyType::Integer,
			),
			AggregationFunction::CollectList => (
				SelectionOperation::CollectList {
					selected_property_api_name,
					limit,
				},
				property_type,
			),
			AggregationFunction::CollectSet => (
				SelectionOperation::CollectSet {
					selected_property_api_name,
					limit,
				},
				property_type,
			),
			AggregationFunction::ApproximatePercentile => {
				if !(0.0..=1.0).contains(&percentile) {
					return Err(Error::InvalidAggregation(format!(
						"percentile must be within 0 and 1, got {percentile}"
					)));
				}
				(
					SelectionOperation::ApproximatePercentile {
						selected_property_api_name,
						approximate_percentile: percentile,
					},
					PropertyType::Double,
				)
			}
		};

		Ok(self.selection(operation, data_type))
	}

	/// A constant value.
	#[must_use]
	pub fn constant(&self, value: impl Into<Operand>) -> DerivedProperty {
		value.into().into_property()
	}

	fn selection(&self, operation: SelectionOperation, data_type: PropertyType) -> DerivedProperty {
		DerivedProperty {
			definition: DerivedPropertyDefinition::Selection {
				object_set: Arc::clone(&self.object_set),
				operation,
			},
			data_type,
		}
	}
}
