use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};

use super::{derived::DerivedPropertyDefinition, where_clause::WhereClause};

/// The query description sent to the backend.
///
/// Children are reference counted so that building a new set on top of an existing one never
/// copies or mutates the existing tree, and so a single sub-expression can be shared by several
/// parents (`a.union(a.pivot_to(..))`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, strum::IntoStaticStr)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum WireObjectSet {
	/// All instances of an object type.
	Base { object_type: String },
	/// All instances of every object type implementing an interface.
	InterfaceBase { interface_type: String },
	/// A single object pointer.
	Reference { object_type: String, id: String },
	/// An explicitly enumerated set of object RIDs.
	Static { objects: Vec<String> },
	Filter {
		object_set: Arc<WireObjectSet>,
		#[serde(rename = "where")]
		where_clause: WhereClause,
	},
	/// Pivot along a named link of an object type.
	SearchAround {
		object_set: Arc<WireObjectSet>,
		link: String,
	},
	/// Pivot along a named link declared on an interface.
	InterfaceLinkSearchAround {
		object_set: Arc<WireObjectSet>,
		interface_link: String,
	},
	Union { object_sets: Vec<Arc<WireObjectSet>> },
	Intersect { object_sets: Vec<Arc<WireObjectSet>> },
	Subtract { object_sets: Vec<Arc<WireObjectSet>> },
	WithProperties {
		object_set: Arc<WireObjectSet>,
		derived_properties: BTreeMap<String, DerivedPropertyDefinition>,
	},
	/// Narrows a set to one object type or interface.
	AsType {
		object_set: Arc<WireObjectSet>,
		entity_type: String,
	},
	AsBaseObjectTypes { object_set: Arc<WireObjectSet> },
	NearestNeighbors {
		object_set: Arc<WireObjectSet>,
		query: NearestNeighborsQuery,
		num_neighbors: u32,
		property_identifier: String,
	},
	/// The object a derived property is being evaluated for. Only valid inside a
	/// [`DerivedPropertyDefinition::Selection`].
	MethodInput,
}

impl WireObjectSet {
	#[must_use]
	pub fn base(object_type: impl Into<String>) -> Self {
		Self::Base {
			object_type: object_type.into(),
		}
	}

	#[must_use]
	pub fn interface_base(interface_type: impl Into<String>) -> Self {
		Self::InterfaceBase {
			interface_type: interface_type.into(),
		}
	}

	/// The `type` discriminant as it appears on the wire.
	#[must_use]
	pub fn kind(&self) -> &'static str {
		self.into()
	}

	/// Direct child object sets, in declaration order.
	///
	/// Object sets nested inside derived property definitions are not included.
	#[must_use]
	pub fn children(&self) -> Vec<&Arc<Self>> {
		match self {
			Self::Base { .. }
			| Self::InterfaceBase { .. }
			| Self::Reference { .. }
			| Self::Static { .. }
			| Self::MethodInput => vec![],

			Self::Filter { object_set, .. }
			| Self::SearchAround { object_set, .. }
			| Self::InterfaceLinkSearchAround { object_set, .. }
			| Self::WithProperties { object_set, .. }
			| Self::AsType { object_set, .. }
			| Self::AsBaseObjectTypes { object_set }
			| Self::NearestNeighbors { object_set, .. } => vec![object_set],

			Self::Union { object_sets }
			| Self::Intersect { object_sets }
			| Self::Subtract { object_sets } => object_sets.iter().collect(),
		}
	}

	#[must_use]
	pub const fn is_leaf(&self) -> bool {
		matches!(
			self,
			Self::Base { .. }
				| Self::InterfaceBase { .. }
				| Self::Reference { .. }
				| Self::Static { .. }
				| Self::MethodInput
		)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum NearestNeighborsQuery {
	Vector { value: Vec<f64> },
	Text { value: String },
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn serializes_with_type_discriminant() {
		let os = WireObjectSet::SearchAround {
			object_set: Arc::new(WireObjectSet::Filter {
				object_set: Arc::new(WireObjectSet::base("Employee")),
				where_clause: WhereClause::eq("employeeId", 5),
			}),
			link: "officeLink".to_string(),
		};

		assert_eq!(
			serde_json::to_value(&os).unwrap(),
			json!({
				"type": "searchAround",
				"link": "officeLink",
				"objectSet": {
					"type": "filter",
					"where": { "type": "eq", "field": "employeeId", "value": 5 },
					"objectSet": { "type": "base", "objectType": "Employee" }
				}
			})
		);
	}

	#[test]
	fn kind_matches_wire_name() {
		assert_eq!(WireObjectSet::MethodInput.kind(), "methodInput");
		assert_eq!(
			WireObjectSet::AsBaseObjectTypes {
				object_set: Arc::new(WireObjectSet::base("Employee"))
			}
			.kind(),
			"asBaseObjectTypes"
		);
	}

	#[test]
	fn deserializes_set_algebra() {
		let os: WireObjectSet = serde_json::from_value(json!({
			"type": "union",
			"objectSets": [
				{ "type": "base", "objectType": "Employee" },
				{ "type": "interfaceBase", "interfaceType": "FooInterface" }
			]
		}))
		.unwrap();

		assert_eq!(os.children().len(), 2);
		assert!(!os.is_leaf());
	}
}
