use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("duplicate definition: {0}")]
	Duplicate(String),
	#[error("primary key '{primary_key}' is not a property of object type '{object_type}'")]
	MissingPrimaryKey {
		object_type: String,
		primary_key: String,
	},
	#[error("link <type='{object_type}', link='{link}'> targets unknown type '{target}'")]
	UnknownLinkTarget {
		object_type: String,
		link: String,
		target: String,
	},
	#[error("link <type='{object_type}', link='{link}'> declares missing reverse link '{reverse}'")]
	UnknownReverseLink {
		object_type: String,
		link: String,
		reverse: String,
	},
	#[error("object type '{object_type}' implements unknown interface '{interface}'")]
	UnknownInterface {
		object_type: String,
		interface: String,
	},

	#[error("failed to parse ontology document: {0}")]
	Json(#[from] serde_json::Error),
}
