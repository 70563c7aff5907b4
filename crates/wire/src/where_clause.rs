use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Filter predicate carried by a [`WireObjectSet::Filter`](crate::WireObjectSet::Filter) node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WhereClause {
	Eq { field: String, value: Value },
	Gt { field: String, value: Value },
	Gte { field: String, value: Value },
	Lt { field: String, value: Value },
	Lte { field: String, value: Value },
	IsNull { field: String, value: bool },
	In { field: String, value: Vec<Value> },
	StartsWith { field: String, value: String },
	ContainsAllTerms { field: String, value: String },
	And { value: Vec<WhereClause> },
	Or { value: Vec<WhereClause> },
	Not { value: Box<WhereClause> },
}

impl WhereClause {
	pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
		Self::Eq {
			field: field.into(),
			value: value.into(),
		}
	}

	pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
		Self::Gt {
			field: field.into(),
			value: value.into(),
		}
	}

	pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
		Self::Gte {
			field: field.into(),
			value: value.into(),
		}
	}

	pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
		Self::Lt {
			field: field.into(),
			value: value.into(),
		}
	}

	pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
		Self::Lte {
			field: field.into(),
			value: value.into(),
		}
	}

	pub fn is_null(field: impl Into<String>) -> Self {
		Self::IsNull {
			field: field.into(),
			value: true,
		}
	}

	pub fn is_in(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
		Self::In {
			field: field.into(),
			value: values.into_iter().map(Into::into).collect(),
		}
	}

	pub fn starts_with(field: impl Into<String>, value: impl Into<String>) -> Self {
		Self::StartsWith {
			field: field.into(),
			value: value.into(),
		}
	}

	#[must_use]
	pub fn and(self, other: Self) -> Self {
		Self::And {
			value: vec![self, other],
		}
	}

	#[must_use]
	pub fn or(self, other: Self) -> Self {
		Self::Or {
			value: vec![self, other],
		}
	}

	#[must_use]
	pub fn negate(self) -> Self {
		Self::Not {
			value: Box::new(self),
		}
	}

	/// Every property name referenced anywhere in the clause.
	#[must_use]
	pub fn fields(&self) -> BTreeSet<&str> {
		let mut fields = BTreeSet::new();
		self.collect_fields(&mut fields);
		fields
	}

	fn collect_fields<'a>(&'a self, fields: &mut BTreeSet<&'a str>) {
		match self {
			Self::Eq { field, .. }
			| Self::Gt { field, .. }
			| Self::Gte { field, .. }
			| Self::Lt { field, .. }
			| Self::Lte { field, .. }
			| Self::IsNull { field, .. }
			| Self::In { field, .. }
			| Self::StartsWith { field, .. }
			| Self::ContainsAllTerms { field, .. } => {
				fields.insert(field);
			}
			Self::And { value } | Self::Or { value } => {
				for clause in value {
					clause.collect_fields(fields);
				}
			}
			Self::Not { value } => value.collect_fields(fields),
		}
	}

	/// Rewrites the clause into a normal form so that logically identical clauses built in
	/// different shapes produce the same cache key.
	///
	/// Nested `and`/`or` of the same operator are flattened, single element `and`/`or` collapse
	/// into their only member and double negation is removed. Operand order is preserved.
	#[must_use]
	pub fn canonicalize(self) -> Self {
		match self {
			Self::And { value } => Self::flatten(value, true),
			Self::Or { value } => Self::flatten(value, false),
			Self::Not { value } => match value.canonicalize() {
				Self::Not { value } => *value,
				other => Self::Not {
					value: Box::new(other),
				},
			},
			leaf => leaf,
		}
	}

	fn flatten(clauses: Vec<Self>, is_and: bool) -> Self {
		let mut flat = Vec::with_capacity(clauses.len());

		for clause in clauses.into_iter().map(Self::canonicalize) {
			match clause {
				Self::And { value } if is_and => flat.extend(value),
				Self::Or { value } if !is_and => flat.extend(value),
				other => flat.push(other),
			}
		}

		if flat.len() == 1 {
			if let Some(only) = flat.pop() {
				return only;
			}
		}

		if is_and {
			Self::And { value: flat }
		} else {
			Self::Or { value: flat }
		}
	}
}
