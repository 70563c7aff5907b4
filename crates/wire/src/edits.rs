use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single mutation submitted as part of an edit batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TransactionEdit {
	AddObject {
		object_type: String,
		properties: BTreeMap<String, Value>,
	},
	ModifyObject {
		object_type: String,
		primary_key: Value,
		properties: BTreeMap<String, Value>,
	},
	DeleteObject {
		object_type: String,
		primary_key: Value,
	},
	AddLink {
		object_type: String,
		primary_key: Value,
		link_type: String,
		linked_object_primary_key: Value,
	},
	RemoveLink {
		object_type: String,
		primary_key: Value,
		link_type: String,
		linked_object_primary_key: Value,
	},
}

impl TransactionEdit {
	/// The object type this edit touches.
	#[must_use]
	pub fn object_type(&self) -> &str {
		match self {
			Self::AddObject { object_type, .. }
			| Self::ModifyObject { object_type, .. }
			| Self::DeleteObject { object_type, .. }
			| Self::AddLink { object_type, .. }
			| Self::RemoveLink { object_type, .. } => object_type,
		}
	}
}
