use osdk_cache::CacheValue;
use osdk_wire::{LoadObjectSetResponse, OrderBy, OrderByField, SortDirection, WireObject};

use super::error::{Error, Result};

/// Objects are handed out in their wire representation.
pub type OsdkObject = WireObject;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchPageArgs {
	/// Properties to return. Empty selects every property.
	pub select: Vec<String>,
	pub order_by: Option<OrderBy>,
	pub page_size: Option<u32>,
	pub next_page_token: Option<String>,
	pub exclude_rid: bool,
}

impl FetchPageArgs {
	#[must_use]
	pub fn select(mut self, properties: impl IntoIterator<Item = impl Into<String>>) -> Self {
		self.select = properties.into_iter().map(Into::into).collect();
		self
	}

	/// Appends a sort key after any existing ones.
	#[must_use]
	pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
		self.order_by
			.get_or_insert_with(|| OrderBy { fields: vec![] })
			.fields
			.push(OrderByField {
				field: field.into(),
				direction,
			});
		self
	}

	#[must_use]
	pub const fn page_size(mut self, page_size: u32) -> Self {
		self.page_size = Some(page_size);
		self
	}

	#[must_use]
	pub fn page_token(mut self, token: impl Into<String>) -> Self {
		self.next_page_token = Some(token.into());
		self
	}

	#[must_use]
	pub const fn exclude_rid(mut self, exclude_rid: bool) -> Self {
		self.exclude_rid = exclude_rid;
		self
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
	pub data: Vec<OsdkObject>,
	pub next_page_token: Option<String>,
	pub total_count: u64,
}

impl From<LoadObjectSetResponse> for Page {
	fn from(response: LoadObjectSetResponse) -> Self {
		Self {
			data: response.data,
			next_page_token: response.next_page_token,
			total_count: response.total_count,
		}
	}
}

impl CacheValue for Page {
	fn size(&self) -> usize {
		self.data.len()
	}
}

/// Outcome of a `*_with_errors` call: the error is returned as a value instead of propagating.
#[derive(Debug, Clone, PartialEq)]
pub enum OsdkResult<T> {
	Ok { value: T },
	Error { error: Error },
}

impl<T> OsdkResult<T> {
	#[must_use]
	pub const fn is_ok(&self) -> bool {
		matches!(self, Self::Ok { .. })
	}

	#[must_use]
	pub const fn value(&self) -> Option<&T> {
		match self {
			Self::Ok { value } => Some(value),
			Self::Error { .. } => None,
		}
	}

	#[must_use]
	pub const fn error(&self) -> Option<&Error> {
		match self {
			Self::Ok { .. } => None,
			Self::Error { error } => Some(error),
		}
	}

	pub fn into_result(self) -> Result<T> {
		match self {
			Self::Ok { value } => Ok(value),
			Self::Error { error } => Err(error),
		}
	}
}

impl<T> From<Result<T>> for OsdkResult<T> {
	fn from(result: Result<T>) -> Self {
		match result {
			Ok(value) => Self::Ok { value },
			Err(error) => Self::Error { error },
		}
	}
}
