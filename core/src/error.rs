use osdk_cache::CacheError;
use osdk_wire::BackendError;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the object set engine.
///
/// Cloneable so a single failed fetch can be handed to every caller that coalesced onto it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
	// Validation
	#[error("object type or interface not found: {0}")]
	ObjectTypeNotFound(String),
	#[error("'{0}' is an interface; this operation needs an object type")]
	NotAnObjectType(String),
	#[error("link not found <type='{source_type}', link='{link}'>")]
	LinkNotFound { source_type: String, link: String },
	#[error("property not found <type='{object_type}', property='{property}'>")]
	PropertyNotFound {
		object_type: String,
		property: String,
	},
	#[error("object sets of '{left}' and '{right}' share no common type")]
	IncompatibleSetTypes { left: String, right: String },
	#[error("{0} needs at least one object set")]
	EmptySetOperation(&'static str),
	#[error("invalid derived property: {0}")]
	InvalidDerivedProperty(String),
	#[error("invalid aggregation: {0}")]
	InvalidAggregation(String),

	// Invalidation analysis
	#[error("object set node '{0}' is not supported by invalidation analysis")]
	UnsupportedObjectSet(&'static str),
	#[error("methodInput used outside of a derived property")]
	MissingMethodInput,

	// Execution
	#[error(transparent)]
	Backend(#[from] BackendError),
	#[error("object not found <type='{object_type}', primary_key='{primary_key}'>")]
	ObjectNotFound {
		object_type: String,
		primary_key: String,
	},
	#[error("client was built without a change feed")]
	SubscriptionsUnavailable,
	#[error("edit batch was dropped before it completed")]
	EditBatchDropped,
	#[error("no fetcher registered for cache key '{0}'")]
	CacheKeyNotRegistered(String),

	// Configuration
	#[error("invalid client configuration: {0}")]
	Config(String),
}

impl From<CacheError<Self>> for Error {
	fn from(e: CacheError<Self>) -> Self {
		match e {
			CacheError::NotRegistered(key) => Self::CacheKeyNotRegistered(key),
			CacheError::Fetch(e) => e,
		}
	}
}
