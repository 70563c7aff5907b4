use std::{
	collections::{BTreeSet, HashMap},
	sync::Arc,
};

use serde::Deserialize;
use tracing::debug;

use super::{
	definition::{InterfaceDefinition, ObjectOrInterface, ObjectTypeDefinition},
	error::Error,
};

/// Resolves API names to type metadata.
///
/// Lookups are synchronous: providers backed by a remote service are expected to have loaded
/// the metadata they serve before the engine starts building object sets.
pub trait OntologyProvider: Send + Sync + 'static {
	fn object_type(&self, api_name: &str) -> Option<Arc<ObjectTypeDefinition>>;

	fn interface(&self, api_name: &str) -> Option<Arc<InterfaceDefinition>>;

	/// Object types take precedence over interfaces sharing the same name.
	fn definition(&self, api_name: &str) -> Option<ObjectOrInterface> {
		self.object_type(api_name)
			.map(ObjectOrInterface::Object)
			.or_else(|| self.interface(api_name).map(ObjectOrInterface::Interface))
	}

	fn implementers(&self, interface: &str) -> BTreeSet<String> {
		self.interface(interface)
			.map(|def| def.implemented_by.clone())
			.unwrap_or_default()
	}
}

/// In-memory ontology.
#[derive(Debug, Default, Clone)]
pub struct Ontology {
	object_types: HashMap<String, Arc<ObjectTypeDefinition>>,
	interfaces: HashMap<String, Arc<InterfaceDefinition>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OntologyDocument {
	#[serde(default)]
	object_types: Vec<ObjectTypeDefinition>,
	#[serde(default)]
	interfaces: Vec<InterfaceDefinition>,
}

impl Ontology {
	#[must_use]
	pub fn builder() -> OntologyBuilder {
		OntologyBuilder::default()
	}

	/// Parses a `{"objectTypes": [..], "interfaces": [..]}` document.
	pub fn from_json(json: &str) -> Result<Self, Error> {
		let document = serde_json::from_str::<OntologyDocument>(json)?;

		document
			.object_types
			.into_iter()
			.fold(Self::builder(), OntologyBuilder::object_type)
			.interfaces(document.interfaces)
			.build()
	}

	pub fn object_types(&self) -> impl Iterator<Item = &Arc<ObjectTypeDefinition>> {
		self.object_types.values()
	}

	pub fn interfaces(&self) -> impl Iterator<Item = &Arc<InterfaceDefinition>> {
		self.interfaces.values()
	}
}

impl OntologyProvider for Ontology {
	fn object_type(&self, api_name: &str) -> Option<Arc<ObjectTypeDefinition>> {
		self.object_types.get(api_name).cloned()
	}

	fn interface(&self, api_name: &str) -> Option<Arc<InterfaceDefinition>> {
		self.interfaces.get(api_name).cloned()
	}
}

#[derive(Debug, Default)]
pub struct OntologyBuilder {
	object_types: Vec<ObjectTypeDefinition>,
	interfaces: Vec<InterfaceDefinition>,
}

impl OntologyBuilder {
	#[must_use]
	pub fn object_type(mut self, definition: ObjectTypeDefinition) -> Self {
		self.object_types.push(definition);
		self
	}

	#[must_use]
	pub fn interface(mut self, definition: InterfaceDefinition) -> Self {
		self.interfaces.push(definition);
		self
	}

	#[must_use]
	pub fn interfaces(mut self, definitions: impl IntoIterator<Item = InterfaceDefinition>) -> Self {
		self.interfaces.extend(definitions);
		self
	}

	/// Validates cross references and computes `implemented_by` on every interface.
	pub fn build(self) -> Result<Ontology, Error> {
		let mut interfaces = HashMap::with_capacity(self.interfaces.len());
		for mut interface in self.interfaces {
			interface.implemented_by.clear();
			if interfaces.contains_key(&interface.api_name) {
				return Err(Error::Duplicate(interface.api_name));
			}
			interfaces.insert(interface.api_name.clone(), interface);
		}

		let mut object_types = HashMap::with_capacity(self.object_types.len());
		for object_type in self.object_types {
			if object_types.contains_key(&object_type.api_name) {
				return Err(Error::Duplicate(object_type.api_name));
			}

			if !object_type.properties.contains_key(&object_type.primary_key) {
				return Err(Error::MissingPrimaryKey {
					object_type: object_type.api_name,
					primary_key: object_type.primary_key,
				});
			}

			for interface_name in &object_type.implements {
				let Some(interface) = interfaces.get_mut(interface_name) else {
					return Err(Error::UnknownInterface {
						object_type: object_type.api_name.clone(),
						interface: interface_name.clone(),
					});
				};
				interface
					.implemented_by
					.insert(object_type.api_name.clone());
			}

			object_types.insert(object_type.api_name.clone(), object_type);
		}

		for object_type in object_types.values() {
			for (link_name, link) in &object_type.links {
				let Some(target) = object_types.get(&link.target_type) else {
					return Err(Error::UnknownLinkTarget {
						object_type: object_type.api_name.clone(),
						link: link_name.clone(),
						target: link.target_type.clone(),
					});
				};

				if let Some(reverse) = &link.reverse_link {
					if !target.links.contains_key(reverse) {
						return Err(Error::UnknownReverseLink {
							object_type: object_type.api_name.clone(),
							link: link_name.clone(),
							reverse: reverse.clone(),
						});
					}
				}
			}
		}

		debug!(
			object_types = object_types.len(),
			interfaces = interfaces.len(),
			"built ontology"
		);

		Ok(Ontology {
			object_types: object_types
				.into_iter()
				.map(|(name, def)| (name, Arc::new(def)))
				.collect(),
			interfaces: interfaces
				.into_iter()
				.map(|(name, def)| (name, Arc::new(def)))
				.collect(),
		})
	}
}

#[cfg(test)]
mod tests {
	use crate::{LinkDefinition, PropertyType};

	use super::*;

	fn employee() -> ObjectTypeDefinition {
		ObjectTypeDefinition::new("Employee", "employeeId", PropertyType::Integer)
			.property("fullName", PropertyType::String)
			.link("lead", LinkDefinition::one("Employee").reverse("peeps"))
			.link("peeps", LinkDefinition::many("Employee").reverse("lead"))
			.implements("FooInterface")
	}

	#[test]
	fn computes_implementers() {
		let ontology = Ontology::builder()
			.object_type(employee())
			.interface(InterfaceDefinition::new("FooInterface").property("fullName", PropertyType::String))
			.build()
			.unwrap();

		assert_eq!(
			ontology.implementers("FooInterface").into_iter().collect::<Vec<_>>(),
			["Employee"]
		);
		assert!(ontology.definition("FooInterface").unwrap().is_interface());
		assert!(ontology.definition("Nope").is_none());
	}

	#[test]
	fn rejects_unknown_link_target() {
		let result = Ontology::builder()
			.object_type(
				ObjectTypeDefinition::new("Employee", "employeeId", PropertyType::Integer)
					.link("officeLink", LinkDefinition::one("Office")),
			)
			.build();

		assert!(matches!(result, Err(Error::UnknownLinkTarget { target, .. }) if target == "Office"));
	}

	#[test]
	fn rejects_unknown_interface() {
		let result = Ontology::builder().object_type(employee()).build();

		assert!(matches!(result, Err(Error::UnknownInterface { .. })));
	}

	#[test]
	fn parses_json_document() {
		let ontology = Ontology::from_json(
			r#"{
				"objectTypes": [{
					"apiName": "Office",
					"primaryKey": "officeId",
					"properties": {
						"officeId": { "dataType": "string" },
						"capacity": { "dataType": "integer" }
					}
				}]
			}"#,
		)
		.unwrap();

		let office = ontology.object_type("Office").unwrap();
		assert_eq!(office.properties["capacity"].data_type, PropertyType::Integer);
		assert_eq!(ontology.interfaces().count(), 0);
	}
}
