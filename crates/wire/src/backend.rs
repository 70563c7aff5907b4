use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::{
	aggregate::{AggregateObjectSetRequest, AggregateResponse},
	edits::TransactionEdit,
	request::{LoadObjectSetRequest, LoadObjectSetResponse, ObjectChange},
};

/// Error returned by a [`Backend`]. Mirrors the structured error body the ontology service
/// sends back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("backend request failed <status={status}, error_name='{error_name}'>: {message}")]
pub struct BackendError {
	pub status: u16,
	pub error_name: String,
	pub message: String,
}

impl BackendError {
	pub fn new(status: u16, error_name: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			status,
			error_name: error_name.into(),
			message: message.into(),
		}
	}

	#[must_use]
	pub const fn is_not_found(&self) -> bool {
		self.status == 404
	}
}

/// The remote ontology service. Implementations perform the HTTP (or in-memory) round trip.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
	async fn load_objects(
		&self,
		request: LoadObjectSetRequest,
	) -> Result<LoadObjectSetResponse, BackendError>;

	async fn aggregate(
		&self,
		request: AggregateObjectSetRequest,
	) -> Result<AggregateResponse, BackendError>;

	/// Applies every edit of the batch atomically.
	async fn post_edits(&self, edits: Vec<TransactionEdit>) -> Result<(), BackendError>;
}

/// Source of object change notifications.
pub trait ChangeFeed: Send + Sync + 'static {
	fn changes(&self) -> broadcast::Receiver<ObjectChange>;
}
