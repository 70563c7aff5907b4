use osdk_ontology::{LinkCardinality, Ontology, OntologyProvider};
use osdk_wire::{BackendError, ObjectChange, ObjectState, TransactionEdit, WireObject};

use std::{
	collections::{BTreeMap, BTreeSet, HashMap},
	sync::Arc,
};

use serde_json::Value;
use tracing::trace;

/// String form of a primary key used for indexing. Strings are used verbatim so that
/// `Reference` ids and string keys agree.
#[must_use]
pub fn pk_key(primary_key: &Value) -> String {
	match primary_key {
		Value::String(s) => s.clone(),
		other => other.to_string(),
	}
}

#[must_use]
pub fn rid_for(object_type: &str, primary_key: &Value) -> String {
	format!("ri.faux.main.object.{object_type}.{}", pk_key(primary_key))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LinkKey {
	object_type: String,
	primary_key: String,
	link: String,
}

/// Objects and links held by the faux backend.
#[derive(Debug, Clone)]
pub struct FauxDataStore {
	ontology: Arc<Ontology>,
	objects: BTreeMap<String, BTreeMap<String, WireObject>>,
	links: HashMap<LinkKey, BTreeSet<String>>,
}

impl FauxDataStore {
	#[must_use]
	pub fn new(ontology: Arc<Ontology>) -> Self {
		Self {
			ontology,
			objects: BTreeMap::new(),
			links: HashMap::new(),
		}
	}

	#[must_use]
	pub fn ontology(&self) -> &Arc<Ontology> {
		&self.ontology
	}

	/// Inserts or replaces an object. The primary key is read from the type's primary key
	/// property.
	pub fn register_object(
		&mut self,
		object_type: &str,
		properties: BTreeMap<String, Value>,
	) -> Result<WireObject, BackendError> {
		let definition = self.ontology.object_type(object_type).ok_or_else(|| {
			BackendError::new(
				404,
				"ObjectTypeNotFound",
				format!("unknown object type '{object_type}'"),
			)
		})?;

		let primary_key = properties
			.get(&definition.primary_key)
			.filter(|value| !value.is_null())
			.cloned()
			.ok_or_else(|| {
				BackendError::new(
					400,
					"MissingPrimaryKey",
					format!(
						"object of type '{object_type}' is missing primary key '{}'",
						definition.primary_key
					),
				)
			})?;

		let object = WireObject {
			api_name: object_type.to_string(),
			rid: Some(rid_for(object_type, &primary_key)),
			primary_key: primary_key.clone(),
			properties,
		};

		self.objects
			.entry(object_type.to_string())
			.or_default()
			.insert(pk_key(&primary_key), object.clone());

		Ok(object)
	}

	#[must_use]
	pub fn get_object(&self, object_type: &str, primary_key: &Value) -> Option<&WireObject> {
		self.get_object_by_key(object_type, &pk_key(primary_key))
	}

	fn get_object_by_key(&self, object_type: &str, key: &str) -> Option<&WireObject> {
		self.objects.get(object_type)?.get(key)
	}

	#[must_use]
	pub fn get_object_by_rid(&self, rid: &str) -> Option<&WireObject> {
		self.objects
			.values()
			.flat_map(BTreeMap::values)
			.find(|object| object.rid.as_deref() == Some(rid))
	}

	/// Objects of one type in primary key order.
	pub fn objects_of_type(&self, object_type: &str) -> impl Iterator<Item = &WireObject> {
		self.objects
			.get(object_type)
			.into_iter()
			.flat_map(BTreeMap::values)
	}

	/// Objects reached from `(object_type, primary_key)` through `link`.
	pub fn linked_objects(
		&self,
		object_type: &str,
		primary_key: &Value,
		link: &str,
	) -> Result<Vec<&WireObject>, BackendError> {
		let definition = self
			.ontology
			.object_type(object_type)
			.and_then(|def| def.links.get(link).cloned())
			.ok_or_else(|| link_not_found(object_type, link))?;

		let key = LinkKey {
			object_type: object_type.to_string(),
			primary_key: pk_key(primary_key),
			link: link.to_string(),
		};

		Ok(self
			.links
			.get(&key)
			.into_iter()
			.flatten()
			.filter_map(|target| self.get_object_by_key(&definition.target_type, target))
			.collect())
	}

	/// Links two objects and, if the link declares one, its reverse side. Single cardinality
	/// sides replace their previous target.
	pub fn link(
		&mut self,
		object_type: &str,
		primary_key: &Value,
		link: &str,
		target_primary_key: &Value,
	) -> Result<(), BackendError> {
		let definition = self
			.ontology
			.object_type(object_type)
			.and_then(|def| def.links.get(link).cloned())
			.ok_or_else(|| link_not_found(object_type, link))?;

		if self
			.get_object(&definition.target_type, target_primary_key)
			.is_none()
		{
			return Err(object_not_found(&definition.target_type, target_primary_key));
		}

		if definition.cardinality == LinkCardinality::One {
			let previous = self.targets(object_type, primary_key, link);
			for old in previous {
				self.unlink(object_type, primary_key, link, &Value::String(old))?;
			}
		}

		self.insert_one_side(object_type, primary_key, link, target_primary_key);

		if let Some(reverse) = &definition.reverse_link {
			let reverse_definition = self
				.ontology
				.object_type(&definition.target_type)
				.and_then(|def| def.links.get(reverse).cloned())
				.ok_or_else(|| link_not_found(&definition.target_type, reverse))?;

			if reverse_definition.cardinality == LinkCardinality::One {
				for old in self.targets(&definition.target_type, target_primary_key, reverse) {
					self.remove_one_side(object_type, &Value::String(old.clone()), link, target_primary_key);
					self.remove_one_side(
						&definition.target_type,
						target_primary_key,
						reverse,
						&Value::String(old),
					);
				}
			}

			self.insert_one_side(&definition.target_type, target_primary_key, reverse, primary_key);
		}

		trace!(object_type, link, "linked objects");

		Ok(())
	}

	pub fn unlink(
		&mut self,
		object_type: &str,
		primary_key: &Value,
		link: &str,
		target_primary_key: &Value,
	) -> Result<(), BackendError> {
		let definition = self
			.ontology
			.object_type(object_type)
			.and_then(|def| def.links.get(link).cloned())
			.ok_or_else(|| link_not_found(object_type, link))?;

		self.remove_one_side(object_type, primary_key, link, target_primary_key);
		if let Some(reverse) = &definition.reverse_link {
			self.remove_one_side(&definition.target_type, target_primary_key, reverse, primary_key);
		}

		Ok(())
	}

	fn targets(&self, object_type: &str, primary_key: &Value, link: &str) -> Vec<String> {
		self.links
			.get(&LinkKey {
				object_type: object_type.to_string(),
				primary_key: pk_key(primary_key),
				link: link.to_string(),
			})
			.map(|targets| targets.iter().cloned().collect())
			.unwrap_or_default()
	}

	fn insert_one_side(&mut self, object_type: &str, primary_key: &Value, link: &str, target: &Value) {
		self.links
			.entry(LinkKey {
				object_type: object_type.to_string(),
				primary_key: pk_key(primary_key),
				link: link.to_string(),
			})
			.or_default()
			.insert(pk_key(target));
	}

	fn remove_one_side(&mut self, object_type: &str, primary_key: &Value, link: &str, target: &Value) {
		let key = LinkKey {
			object_type: object_type.to_string(),
			primary_key: pk_key(primary_key),
			link: link.to_string(),
		};

		if let Some(targets) = self.links.get_mut(&key) {
			targets.remove(&pk_key(target));
			if targets.is_empty() {
				self.links.remove(&key);
			}
		}
	}

	/// Removes an object together with every link touching it.
	pub fn delete_object(
		&mut self,
		object_type: &str,
		primary_key: &Value,
	) -> Result<WireObject, BackendError> {
		let key = pk_key(primary_key);
		let removed = self
			.objects
			.get_mut(object_type)
			.and_then(|objects| objects.remove(&key))
			.ok_or_else(|| object_not_found(object_type, primary_key))?;

		let links = self
			.ontology
			.object_type(object_type)
			.map(|def| def.links.clone())
			.unwrap_or_default();

		for link in links.keys() {
			for target in self.targets(object_type, primary_key, link) {
				self.unlink(object_type, primary_key, link, &Value::String(target))?;
			}
		}

		// Incoming links without a declared reverse side.
		let ontology = Arc::clone(&self.ontology);
		self.links.retain(|link_key, targets| {
			let points_here = ontology
				.object_type(&link_key.object_type)
				.and_then(|def| {
					def.links
						.get(&link_key.link)
						.map(|link| link.target_type == object_type)
				})
				.unwrap_or(false);

			if points_here {
				targets.remove(&key);
			}
			!targets.is_empty()
		});

		Ok(removed)
	}

	/// Applies one edit and returns the resulting change notification.
	pub fn apply_edit(&mut self, edit: &TransactionEdit) -> Result<ObjectChange, BackendError> {
		match edit {
			TransactionEdit::AddObject {
				object_type,
				properties,
			} => {
				let object = self.register_object(object_type, properties.clone())?;
				Ok(ObjectChange {
					object_type: object_type.clone(),
					primary_key: object.primary_key.clone(),
					state: ObjectState::Added,
					object: Some(object),
				})
			}

			TransactionEdit::ModifyObject {
				object_type,
				primary_key,
				properties,
			} => {
				let mut merged = self
					.get_object(object_type, primary_key)
					.ok_or_else(|| object_not_found(object_type, primary_key))?
					.properties
					.clone();
				merged.extend(properties.clone());

				let object = self.register_object(object_type, merged)?;
				Ok(ObjectChange {
					object_type: object_type.clone(),
					primary_key: primary_key.clone(),
					state: ObjectState::Updated,
					object: Some(object),
				})
			}

			TransactionEdit::DeleteObject {
				object_type,
				primary_key,
			} => {
				self.delete_object(object_type, primary_key)?;
				Ok(ObjectChange {
					object_type: object_type.clone(),
					primary_key: primary_key.clone(),
					state: ObjectState::Removed,
					object: None,
				})
			}

			TransactionEdit::AddLink {
				object_type,
				primary_key,
				link_type,
				linked_object_primary_key,
			} => {
				self.link(object_type, primary_key, link_type, linked_object_primary_key)?;
				self.updated(object_type, primary_key)
			}

			TransactionEdit::RemoveLink {
				object_type,
				primary_key,
				link_type,
				linked_object_primary_key,
			} => {
				self.unlink(object_type, primary_key, link_type, linked_object_primary_key)?;
				self.updated(object_type, primary_key)
			}
		}
	}

	fn updated(&self, object_type: &str, primary_key: &Value) -> Result<ObjectChange, BackendError> {
		let object = self
			.get_object(object_type, primary_key)
			.ok_or_else(|| object_not_found(object_type, primary_key))?;

		Ok(ObjectChange {
			object_type: object_type.to_string(),
			primary_key: primary_key.clone(),
			state: ObjectState::Updated,
			object: Some(object.clone()),
		})
	}
}

fn link_not_found(object_type: &str, link: &str) -> BackendError {
	BackendError::new(
		404,
		"LinkTypeNotFound",
		format!("object type '{object_type}' has no link '{link}'"),
	)
}

fn object_not_found(object_type: &str, primary_key: &Value) -> BackendError {
	BackendError::new(
		404,
		"ObjectNotFound",
		format!("no object <type='{object_type}', primary_key='{primary_key}'>"),
	)
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use crate::fixtures::{self, EMPLOYEE, OFFICE};

	use super::*;

	#[test]
	fn single_cardinality_link_replaces_previous_target() {
		let mut store = fixtures::seeded_store();

		store
			.link(EMPLOYEE, &json!(50030), "officeLink", &json!("SEA"))
			.unwrap();

		let offices = store
			.linked_objects(EMPLOYEE, &json!(50030), "officeLink")
			.unwrap();
		assert_eq!(offices.len(), 1);
		assert_eq!(offices[0].primary_key, json!("SEA"));

		let nyc = store
			.linked_objects(OFFICE, &json!("NYC"), "occupants")
			.unwrap();
		assert!(nyc.iter().all(|employee| employee.primary_key != json!(50030)));

		let sea = store
			.linked_objects(OFFICE, &json!("SEA"), "occupants")
			.unwrap();
		assert!(sea.iter().any(|employee| employee.primary_key == json!(50030)));
	}

	#[test]
	fn delete_removes_links_on_both_sides() {
		let mut store = fixtures::seeded_store();

		store.delete_object(EMPLOYEE, &json!(50030)).unwrap();

		let occupants = store
			.linked_objects(OFFICE, &json!("NYC"), "occupants")
			.unwrap();
		assert!(occupants.iter().all(|employee| employee.primary_key != json!(50030)));
		assert!(store.get_object(EMPLOYEE, &json!(50030)).is_none());
	}

	#[test]
	fn modify_merges_properties() {
		let mut store = fixtures::seeded_store();

		let change = store
			.apply_edit(&TransactionEdit::ModifyObject {
				object_type: EMPLOYEE.to_string(),
				primary_key: json!(50030),
				properties: BTreeMap::from([("class".to_string(), json!("Blue"))]),
			})
			.unwrap();

		assert_eq!(change.state, ObjectState::Updated);
		let object = store.get_object(EMPLOYEE, &json!(50030)).unwrap();
		assert_eq!(object.property("class"), Some(&json!("Blue")));
		assert_eq!(object.property("fullName"), Some(&json!("John Doe")));
	}

	#[test]
	fn unknown_link_is_an_error() {
		let store = fixtures::seeded_store();

		let error = store
			.linked_objects(EMPLOYEE, &json!(50030), "nope")
			.unwrap_err();
		assert_eq!(error.error_name, "LinkTypeNotFound");
	}
}
