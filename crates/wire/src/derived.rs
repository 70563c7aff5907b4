use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::object_set::WireObjectSet;

/// Expression tree computing a derived property for each member of an object set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, strum::IntoStaticStr)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum DerivedPropertyDefinition {
	/// Applies `operation` to the object set reached from the current object. `object_set` is
	/// rooted at [`WireObjectSet::MethodInput`].
	Selection {
		object_set: Arc<WireObjectSet>,
		operation: SelectionOperation,
	},
	/// A property of the current object.
	Property { api_name: String },
	Literal { value: Value },
	Add { properties: Vec<DerivedPropertyDefinition> },
	Multiply { properties: Vec<DerivedPropertyDefinition> },
	Least { properties: Vec<DerivedPropertyDefinition> },
	Greatest { properties: Vec<DerivedPropertyDefinition> },
	Subtract {
		left: Box<DerivedPropertyDefinition>,
		right: Box<DerivedPropertyDefinition>,
	},
	Divide {
		left: Box<DerivedPropertyDefinition>,
		right: Box<DerivedPropertyDefinition>,
	},
	Negate { property: Box<DerivedPropertyDefinition> },
	AbsoluteValue { property: Box<DerivedPropertyDefinition> },
	Extract {
		part: DatePart,
		property: Box<DerivedPropertyDefinition>,
	},
}

impl DerivedPropertyDefinition {
	#[must_use]
	pub fn kind(&self) -> &'static str {
		self.into()
	}

	/// Direct sub-expressions, in declaration order.
	#[must_use]
	pub fn operands(&self) -> Vec<&Self> {
		match self {
			Self::Selection { .. } | Self::Property { .. } | Self::Literal { .. } => vec![],
			Self::Add { properties }
			| Self::Multiply { properties }
			| Self::Least { properties }
			| Self::Greatest { properties } => properties.iter().collect(),
			Self::Subtract { left, right } | Self::Divide { left, right } => {
				vec![&**left, &**right]
			}
			Self::Negate { property }
			| Self::AbsoluteValue { property }
			| Self::Extract { property, .. } => vec![&**property],
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SelectionOperation {
	Get {
		selected_property_api_name: String,
	},
	Count,
	Min {
		selected_property_api_name: String,
	},
	Max {
		selected_property_api_name: String,
	},
	Avg {
		selected_property_api_name: String,
	},
	Sum {
		selected_property_api_name: String,
	},
	ExactDistinct {
		selected_property_api_name: String,
	},
	ApproximateDistinct {
		selected_property_api_name: String,
	},
	CollectList {
		selected_property_api_name: String,
		limit: u32,
	},
	CollectSet {
		selected_property_api_name: String,
		limit: u32,
	},
	ApproximatePercentile {
		selected_property_api_name: String,
		approximate_percentile: f64,
	},
}

impl SelectionOperation {
	/// The property the operation reads, `None` for [`SelectionOperation::Count`].
	#[must_use]
	pub fn selected_property(&self) -> Option<&str> {
		match self {
			Self::Count => None,
			Self::Get {
				selected_property_api_name,
			}
			| Self::Min {
				selected_property_api_name,
			}
			| Self::Max {
				selected_property_api_name,
			}
			| Self::Avg {
				selected_property_api_name,
			}
			| Self::Sum {
				selected_property_api_name,
			}
			| Self::ExactDistinct {
				selected_property_api_name,
			}
			| Self::ApproximateDistinct {
				selected_property_api_name,
			}
			| Self::CollectList {
				selected_property_api_name,
				..
			}
			| Self::CollectSet {
				selected_property_api_name,
				..
			}
			| Self::ApproximatePercentile {
				selected_property_api_name,
				..
			} => Some(selected_property_api_name),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DatePart {
	Days,
	Months,
	Quarters,
	Years,
}
