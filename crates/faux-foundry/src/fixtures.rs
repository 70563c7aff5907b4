//! A small employee directory used across the test suites.
//!
//! | employeeId | fullName   | class | office | lead  |
//! |------------|------------|-------|--------|-------|
//! | 50030      | John Doe   | Red   | NYC    |       |
//! | 50031      | Jane Doe   | Blue  | NYC    | 50030 |
//! | 50032      | Jack Smith | Red   | NYC    | 50031 |
//! | 50033      | Jill Brown | Blue  | SEA    | 50030 |

use osdk_ontology::{
	InterfaceDefinition, InterfaceLinkDefinition, InterfaceLinkTarget, LinkCardinality,
	LinkDefinition, ObjectTypeDefinition, Ontology, PropertyType,
};

use std::{collections::BTreeMap, sync::Arc};

use serde_json::{json, Value};

use super::{foundry::FauxFoundry, store::FauxDataStore};

pub const EMPLOYEE: &str = "Employee";
pub const OFFICE: &str = "Office";
pub const FOO_INTERFACE: &str = "FooInterface";

/// `Employee` and `Office` with their links, plus `FooInterface` implemented by `Employee`.
#[must_use]
#[allow(clippy::missing_panics_doc)]
pub fn employee_ontology() -> Arc<Ontology> {
	let employee = ObjectTypeDefinition::new(EMPLOYEE, "employeeId", PropertyType::Integer)
		.property("fullName", PropertyType::String)
		.property("class", PropertyType::String)
		.property("startDate", PropertyType::Date)
		.property("salary", PropertyType::Double)
		.property("embedding", PropertyType::Vector)
		.link("officeLink", LinkDefinition::one(OFFICE).reverse("occupants"))
		.link("lead", LinkDefinition::one(EMPLOYEE).reverse("peeps"))
		.link("peeps", LinkDefinition::many(EMPLOYEE).reverse("lead"))
		.implements(FOO_INTERFACE);

	let office = ObjectTypeDefinition::new(OFFICE, "officeId", PropertyType::String)
		.property("name", PropertyType::String)
		.property("capacity", PropertyType::Integer)
		.link("occupants", LinkDefinition::many(EMPLOYEE).reverse("officeLink"));

	let foo = InterfaceDefinition::new(FOO_INTERFACE)
		.property("fullName", PropertyType::String)
		.link(
			"officeLink",
			InterfaceLinkDefinition {
				target: InterfaceLinkTarget::Object(OFFICE.to_string()),
				cardinality: LinkCardinality::One,
			},
		);

	#[allow(clippy::expect_used)]
	let ontology = Ontology::builder()
		.object_type(employee)
		.object_type(office)
		.interface(foo)
		.build()
		.expect("fixture ontology is consistent");

	Arc::new(ontology)
}

fn properties(pairs: impl IntoIterator<Item = (&'static str, Value)>) -> BTreeMap<String, Value> {
	pairs
		.into_iter()
		.map(|(name, value)| (name.to_string(), value))
		.collect()
}

/// The directory above on top of [`employee_ontology`].
#[must_use]
#[allow(clippy::missing_panics_doc, clippy::expect_used)]
pub fn seeded_store() -> FauxDataStore {
	let mut store = FauxDataStore::new(employee_ontology());

	for (id, name, capacity) in [("NYC", "New York", 100), ("SEA", "Seattle", 40)] {
		store
			.register_object(
				OFFICE,
				properties([
					("officeId", json!(id)),
					("name", json!(name)),
					("capacity", json!(capacity)),
				]),
			)
			.expect("seed office");
	}

	let employees = [
		(50030, "John Doe", "Red", "2019-01-01", Some(100_000), [1.0, 0.0], "NYC", None),
		(50031, "Jane Doe", "Blue", "2020-05-17", Some(120_000), [0.0, 1.0], "NYC", Some(50030)),
		(50032, "Jack Smith", "Red", "2021-03-01", Some(90_000), [0.7, 0.7], "NYC", Some(50031)),
		(50033, "Jill Brown", "Blue", "2022-11-30", None, [0.9, 0.2], "SEA", Some(50030)),
	];

	for (id, name, class, start, salary, embedding, _, _) in &employees {
		let mut props = properties([
			("employeeId", json!(id)),
			("fullName", json!(name)),
			("class", json!(class)),
			("startDate", json!(start)),
			("embedding", json!(embedding)),
		]);
		if let Some(salary) = salary {
			props.insert("salary".to_string(), json!(salary));
		}
		store.register_object(EMPLOYEE, props).expect("seed employee");
	}

	for (id, .., office, lead) in &employees {
		store
			.link(EMPLOYEE, &json!(id), "officeLink", &json!(office))
			.expect("seed office link");
		if let Some(lead) = lead {
			store
				.link(EMPLOYEE, &json!(id), "lead", &json!(lead))
				.expect("seed lead link");
		}
	}

	store
}

/// A [`FauxFoundry`] serving [`seeded_store`].
#[must_use]
pub fn faux_foundry() -> Arc<FauxFoundry> {
	Arc::new(FauxFoundry::from_store(seeded_store()))
}
