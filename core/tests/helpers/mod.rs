//! Shared setup for the client integration tests

#![allow(dead_code)]

use osdk_core::{
	wire::{TransactionEdit, WireObject},
	Client, ClientConfig,
};
use osdk_faux_foundry::{fixtures, FauxFoundry};

use std::{collections::BTreeMap, sync::Arc};

use serde_json::{json, Value};

/// A client over the seeded employee directory, with the change feed wired in.
pub fn client() -> (Client, Arc<FauxFoundry>) {
	client_with_config(ClientConfig::default())
}

pub fn client_with_config(config: ClientConfig) -> (Client, Arc<FauxFoundry>) {
	let foundry = fixtures::faux_foundry();
	let client = Client::builder(fixtures::employee_ontology(), foundry.clone())
		.change_feed(foundry.clone())
		.config(config)
		.build();

	(client, foundry)
}

/// A client without a change feed.
pub fn client_without_feed() -> (Client, Arc<FauxFoundry>) {
	let foundry = fixtures::faux_foundry();
	let client = Client::builder(fixtures::employee_ontology(), foundry.clone()).build();

	(client, foundry)
}

pub fn rename_employee(primary_key: i64, full_name: &str) -> TransactionEdit {
	TransactionEdit::ModifyObject {
		object_type: fixtures::EMPLOYEE.to_string(),
		primary_key: json!(primary_key),
		properties: BTreeMap::from([("fullName".to_string(), json!(full_name))]),
	}
}

pub fn full_names(objects: &[WireObject]) -> Vec<&str> {
	objects
		.iter()
		.filter_map(|object| object.property("fullName").and_then(Value::as_str))
		.collect()
}

pub fn primary_keys(objects: &[WireObject]) -> Vec<Value> {
	objects
		.iter()
		.map(|object| object.primary_key.clone())
		.collect()
}
