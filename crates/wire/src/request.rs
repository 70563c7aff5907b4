use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::object_set::WireObjectSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadObjectSetRequest {
	pub object_set: Arc<WireObjectSet>,
	/// Properties to return; empty means all properties.
	#[serde(default)]
	pub select: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub order_by: Option<OrderBy>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub page_size: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub page_token: Option<String>,
	#[serde(default)]
	pub exclude_rid: bool,
}

impl LoadObjectSetRequest {
	#[must_use]
	pub fn new(object_set: Arc<WireObjectSet>) -> Self {
		Self {
			object_set,
			select: vec![],
			order_by: None,
			page_size: None,
			page_token: None,
			exclude_rid: false,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBy {
	pub fields: Vec<OrderByField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderByField {
	pub field: String,
	pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
	#[default]
	Asc,
	Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadObjectSetResponse {
	pub data: Vec<WireObject>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub next_page_token: Option<String>,
	#[serde(default)]
	pub total_count: u64,
}

/// An object as returned by the backend: identity fields plus a flat property map, derived
/// properties included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireObject {
	#[serde(rename = "__apiName")]
	pub api_name: String,
	#[serde(rename = "__primaryKey")]
	pub primary_key: Value,
	#[serde(rename = "__rid", default, skip_serializing_if = "Option::is_none")]
	pub rid: Option<String>,
	#[serde(flatten)]
	pub properties: BTreeMap<String, Value>,
}

impl WireObject {
	#[must_use]
	pub fn property(&self, name: &str) -> Option<&Value> {
		self.properties.get(name)
	}
}

/// Notification that an object of some type was added, changed or removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectChange {
	pub object_type: String,
	pub primary_key: Value,
	pub state: ObjectState,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub object: Option<WireObject>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectState {
	Added,
	Updated,
	Removed,
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn wire_object_flattens_properties() {
		let object: WireObject = serde_json::from_value(json!({
			"__apiName": "Employee",
			"__primaryKey": 50030,
			"fullName": "John Doe",
			"employeeId": 50030
		}))
		.unwrap();

		assert_eq!(object.api_name, "Employee");
		assert_eq!(object.primary_key, json!(50030));
		assert_eq!(object.rid, None);
		assert_eq!(object.property("fullName"), Some(&json!("John Doe")));
		assert_eq!(object.properties.len(), 2);
	}
}
