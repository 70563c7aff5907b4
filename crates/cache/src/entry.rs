use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Values stored in an [`ObservableCache`](crate::ObservableCache).
pub trait CacheValue: Clone + Send + Sync + 'static {
	/// Approximate weight of the value, reported on [`CacheEntry::size`].
	fn size(&self) -> usize {
		1
	}
}

impl<T: Clone + Send + Sync + 'static> CacheValue for Vec<T> {
	fn size(&self) -> usize {
		self.len()
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CacheStatus {
	#[default]
	Init,
	Loading,
	Loaded,
	Error,
}

/// A snapshot of one key, as handed to subscribers and returned by
/// [`ObservableCache::get`](crate::ObservableCache::get).
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T, E> {
	pub key: String,
	pub data: Option<T>,
	pub error: Option<E>,
	pub status: CacheStatus,
	/// `data` comes from an optimistic layer rather than the backend.
	pub is_optimistic: bool,
	pub size: usize,
	pub hit_count: u64,
	pub last_updated: DateTime<Utc>,
}

impl<T: CacheValue, E> CacheEntry<T, E> {
	pub(crate) fn new(key: String) -> Self {
		Self {
			key,
			data: None,
			error: None,
			status: CacheStatus::Init,
			is_optimistic: false,
			size: 0,
			hit_count: 0,
			last_updated: Utc::now(),
		}
	}

	pub(crate) fn load(&mut self, data: T) {
		self.size = data.size();
		self.data = Some(data);
		self.error = None;
		self.status = CacheStatus::Loaded;
		self.last_updated = Utc::now();
	}

	pub(crate) fn fail(&mut self, error: E) {
		self.error = Some(error);
		self.status = CacheStatus::Error;
		self.last_updated = Utc::now();
	}
}

/// Identifies an optimistic layer so it can be rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OptimisticId(Uuid);

impl OptimisticId {
	#[must_use]
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for OptimisticId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for OptimisticId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}
