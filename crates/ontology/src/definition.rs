use std::{
	collections::{BTreeMap, BTreeSet},
	sync::Arc,
};

use serde::{Deserialize, Serialize};

#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum PropertyType {
	String,
	Boolean,
	Byte,
	Short,
	Integer,
	Long,
	Float,
	Double,
	Decimal,
	Date,
	Timestamp,
	Vector,
}

impl PropertyType {
	#[must_use]
	pub const fn is_numeric(self) -> bool {
		matches!(
			self,
			Self::Byte
				| Self::Short | Self::Integer
				| Self::Long | Self::Float
				| Self::Double | Self::Decimal
		)
	}

	#[must_use]
	pub const fn is_temporal(self) -> bool {
		matches!(self, Self::Date | Self::Timestamp)
	}

	/// Result type of an arithmetic combination of the two types, widening to the larger one.
	#[must_use]
	pub const fn widen(self, other: Self) -> Self {
		const fn rank(ty: PropertyType) -> u8 {
			match ty {
				PropertyType::Byte => 0,
				PropertyType::Short => 1,
				PropertyType::Integer => 2,
				PropertyType::Long => 3,
				PropertyType::Float => 4,
				PropertyType::Decimal => 6,
				_ => 5,
			}
		}

		if rank(self) >= rank(other) {
			self
		} else {
			other
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDefinition {
	pub data_type: PropertyType,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
}

impl From<PropertyType> for PropertyDefinition {
	fn from(data_type: PropertyType) -> Self {
		Self {
			data_type,
			description: None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LinkCardinality {
	One,
	Many,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkDefinition {
	pub target_type: String,
	pub cardinality: LinkCardinality,
	/// Name of the link on `target_type` that points back here.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reverse_link: Option<String>,
}

impl LinkDefinition {
	pub fn one(target_type: impl Into<String>) -> Self {
		Self {
			target_type: target_type.into(),
			cardinality: LinkCardinality::One,
			reverse_link: None,
		}
	}

	pub fn many(target_type: impl Into<String>) -> Self {
		Self {
			target_type: target_type.into(),
			cardinality: LinkCardinality::Many,
			reverse_link: None,
		}
	}

	#[must_use]
	pub fn reverse(mut self, reverse_link: impl Into<String>) -> Self {
		self.reverse_link = Some(reverse_link.into());
		self
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "apiName", rename_all = "camelCase")]
pub enum InterfaceLinkTarget {
	Object(String),
	Interface(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceLinkDefinition {
	pub target: InterfaceLinkTarget,
	pub cardinality: LinkCardinality,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectTypeDefinition {
	pub api_name: String,
	pub primary_key: String,
	#[serde(default)]
	pub properties: BTreeMap<String, PropertyDefinition>,
	#[serde(default)]
	pub links: BTreeMap<String, LinkDefinition>,
	/// Interfaces this type implements.
	#[serde(default)]
	pub implements: BTreeSet<String>,
}

impl ObjectTypeDefinition {
	/// Starts a definition whose primary key property has type `primary_key_type`.
	pub fn new(
		api_name: impl Into<String>,
		primary_key: impl Into<String>,
		primary_key_type: PropertyType,
	) -> Self {
		let primary_key = primary_key.into();
		Self {
			api_name: api_name.into(),
			properties: BTreeMap::from([(primary_key.clone(), primary_key_type.into())]),
			primary_key,
			links: BTreeMap::new(),
			implements: BTreeSet::new(),
		}
	}

	#[must_use]
	pub fn property(mut self, name: impl Into<String>, data_type: PropertyType) -> Self {
		self.properties.insert(name.into(), data_type.into());
		self
	}

	#[must_use]
	pub fn link(mut self, name: impl Into<String>, link: LinkDefinition) -> Self {
		self.links.insert(name.into(), link);
		self
	}

	#[must_use]
	pub fn implements(mut self, interface: impl Into<String>) -> Self {
		self.implements.insert(interface.into());
		self
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceDefinition {
	pub api_name: String,
	#[serde(default)]
	pub properties: BTreeMap<String, PropertyDefinition>,
	#[serde(default)]
	pub links: BTreeMap<String, InterfaceLinkDefinition>,
	/// Filled in by [`OntologyBuilder::build`](crate::OntologyBuilder::build) from the
	/// implementing object types.
	#[serde(default, skip_deserializing)]
	pub implemented_by: BTreeSet<String>,
}

impl InterfaceDefinition {
	pub fn new(api_name: impl Into<String>) -> Self {
		Self {
			api_name: api_name.into(),
			properties: BTreeMap::new(),
			links: BTreeMap::new(),
			implemented_by: BTreeSet::new(),
		}
	}

	#[must_use]
	pub fn property(mut self, name: impl Into<String>, data_type: PropertyType) -> Self {
		self.properties.insert(name.into(), data_type.into());
		self
	}

	#[must_use]
	pub fn link(mut self, name: impl Into<String>, link: InterfaceLinkDefinition) -> Self {
		self.links.insert(name.into(), link);
		self
	}
}

/// The definition an object set is typed by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectOrInterface {
	Object(Arc<ObjectTypeDefinition>),
	Interface(Arc<InterfaceDefinition>),
}

impl ObjectOrInterface {
	#[must_use]
	pub fn api_name(&self) -> &str {
		match self {
			Self::Object(def) => &def.api_name,
			Self::Interface(def) => &def.api_name,
		}
	}

	#[must_use]
	pub fn properties(&self) -> &BTreeMap<String, PropertyDefinition> {
		match self {
			Self::Object(def) => &def.properties,
			Self::Interface(def) => &def.properties,
		}
	}

	#[must_use]
	pub fn property(&self, name: &str) -> Option<&PropertyDefinition> {
		self.properties().get(name)
	}

	#[must_use]
	pub const fn is_interface(&self) -> bool {
		matches!(self, Self::Interface(_))
	}

	/// Concrete object types an instance of this definition can be.
	#[must_use]
	pub fn concrete_types(&self) -> BTreeSet<String> {
		match self {
			Self::Object(def) => BTreeSet::from([def.api_name.clone()]),
			Self::Interface(def) => def.implemented_by.clone(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn numeric_widening() {
		assert_eq!(PropertyType::Integer.widen(PropertyType::Long), PropertyType::Long);
		assert_eq!(PropertyType::Double.widen(PropertyType::Integer), PropertyType::Double);
		assert!(PropertyType::Decimal.is_numeric());
		assert!(!PropertyType::Timestamp.is_numeric());
		assert!(PropertyType::Date.is_temporal());
	}

	#[test]
	fn object_type_builder_includes_primary_key() {
		let employee = ObjectTypeDefinition::new("Employee", "employeeId", PropertyType::Integer)
			.property("fullName", PropertyType::String)
			.link("officeLink", LinkDefinition::one("Office").reverse("occupants"));

		assert_eq!(
			employee.properties["employeeId"].data_type,
			PropertyType::Integer
		);
		assert_eq!(employee.properties.len(), 2);
		assert_eq!(
			employee.links["officeLink"].reverse_link.as_deref(),
			Some("occupants")
		);
	}

	#[test]
	fn property_type_parses_from_name() {
		assert_eq!("timestamp".parse::<PropertyType>().ok(), Some(PropertyType::Timestamp));
		assert_eq!(PropertyType::Integer.to_string(), "integer");
	}
}
