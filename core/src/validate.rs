//! Execution time checks that every property an object set refers to exists where it is used.

use osdk_ontology::{ObjectOrInterface, OntologyProvider};
use osdk_wire::{DerivedPropertyDefinition, WhereClause, WireObjectSet};

use std::{
	collections::{BTreeSet, HashMap},
	ptr,
};

use super::{
	error::{Error, Result},
	typing::{combine_types, object_or_interface, resolve_link},
};

/// Properties visible at one node. `definition` is `None` when the type cannot be known
/// statically, as for `static` sets, and checks are skipped.
#[derive(Debug, Clone, Default)]
struct Scope {
	definition: Option<ObjectOrInterface>,
	derived: BTreeSet<String>,
}

impl Scope {
	fn of(definition: ObjectOrInterface) -> Self {
		Self {
			definition: Some(definition),
			derived: BTreeSet::new(),
		}
	}

	fn check(&self, property: &str) -> Result<()> {
		let Some(definition) = &self.definition else {
			return Ok(());
		};

		if definition.property(property).is_some() || self.derived.contains(property) {
			Ok(())
		} else {
			Err(Error::PropertyNotFound {
				object_type: definition.api_name().to_string(),
				property: property.to_string(),
			})
		}
	}

	fn check_where(&self, clause: &WhereClause) -> Result<()> {
		clause.fields().into_iter().try_for_each(|field| self.check(field))
	}
}

pub(crate) fn validate_object_set(
	ontology: &dyn OntologyProvider,
	object_set: &WireObjectSet,
) -> Result<()> {
	Validator {
		ontology,
		scopes: HashMap::new(),
	}
	.scope(object_set, None)
	.map(drop)
}

struct Validator<'a> {
	ontology: &'a dyn OntologyProvider,
	scopes: HashMap<(*const WireObjectSet, Option<String>), Scope>,
}

impl Validator<'_> {
	fn scope(&mut self, node: &WireObjectSet, input: Option<&Scope>) -> Result<Scope> {
		let key = (
			ptr::from_ref(node),
			input
				.and_then(|input| input.definition.as_ref())
				.map(|definition| definition.api_name().to_string()),
		);
		if let Some(scope) = self.scopes.get(&key) {
			return Ok(scope.clone());
		}

		let scope = match node {
			WireObjectSet::Base { object_type } | WireObjectSet::Reference { object_type, .. } => {
				Scope::of(
					self.ontology
						.object_type(object_type)
						.map(ObjectOrInterface::Object)
						.ok_or_else(|| Error::ObjectTypeNotFound(object_type.clone()))?,
				)
			}
			WireObjectSet::InterfaceBase { interface_type } => Scope::of(
				self.ontology
					.interface(interface_type)
					.map(ObjectOrInterface::Interface)
					.ok_or_else(|| Error::ObjectTypeNotFound(interface_type.clone()))?,
			),
			WireObjectSet::Static { .. } => Scope::default(),
			WireObjectSet::Filter {
				object_set,
				where_clause,
			} => {
				let scope = self.scope(object_set, input)?;
				scope.check_where(where_clause)?;
				scope
			}
			WireObjectSet::SearchAround { object_set, link }
			| WireObjectSet::InterfaceLinkSearchAround {
				object_set,
				interface_link: link,
			} => match self.scope(object_set, input)?.definition {
				Some(source) => Scope::of(resolve_link(self.ontology, &source, link)?.target),
				None => Scope::default(),
			},
			WireObjectSet::Union { object_sets }
			| WireObjectSet::Intersect { object_sets }
			| WireObjectSet::Subtract { object_sets } => {
				let scopes = object_sets
					.iter()
					.map(|operand| self.scope(operand, input))
					.collect::<Result<Vec<_>>>()?;
				self.combine(node.kind(), scopes)?
			}
			WireObjectSet::WithProperties {
				object_set,
				derived_properties,
			} => {
				let mut scope = self.scope(object_set, input)?;
				for definition in derived_properties.values() {
					self.check_derived(definition, &scope)?;
				}
				scope.derived.extend(derived_properties.keys().cloned());
				scope
			}
			WireObjectSet::AsType {
				object_set,
				entity_type,
			} => {
				self.scope(object_set, input)?;
				Scope::of(object_or_interface(self.ontology, entity_type)?)
			}
			WireObjectSet::AsBaseObjectTypes { object_set } => self.scope(object_set, input)?,
			WireObjectSet::NearestNeighbors {
				object_set,
				property_identifier,
				..
			} => {
				let scope = self.scope(object_set, input)?;
				scope.check(property_identifier)?;
				scope
			}
			WireObjectSet::MethodInput => input.cloned().ok_or(Error::MissingMethodInput)?,
		};

		self.scopes.insert(key, scope.clone());
		Ok(scope)
	}

	fn combine(&self, operation: &'static str, scopes: Vec<Scope>) -> Result<Scope> {
		if scopes.is_empty() {
			return Err(Error::EmptySetOperation(operation));
		}

		let derived = scopes
			.iter()
			.map(|scope| scope.derived.clone())
			.reduce(|common, derived| common.intersection(&derived).cloned().collect())
			.unwrap_or_default();

		let definitions = scopes
			.into_iter()
			.map(|scope| scope.definition)
			.collect::<Option<Vec<_>>>();

		Ok(Scope {
			definition: definitions
				.map(|definitions| combine_types(self.ontology, operation, &definitions))
				.transpose()?,
			derived,
		})
	}

	fn check_derived(&mut self, definition: &DerivedPropertyDefinition, scope: &Scope) -> Result<()> {
		match definition {
			DerivedPropertyDefinition::Selection {
				object_set,
				operation,
			} => {
				let target = self.scope(object_set, Some(scope))?;
				operation
					.selected_property()
					.map_or(Ok(()), |property| target.check(property))
			}
			DerivedPropertyDefinition::Property { api_name } => scope.check(api_name),
			_ => definition
				.operands()
				.into_iter()
				.try_for_each(|operand| self.check_derived(operand, scope)),
		}
	}
}

#[cfg(test)]
mod tests {
	use osdk_faux_foundry::fixtures::{employee_ontology, EMPLOYEE, OFFICE};
	use osdk_wire::SelectionOperation;

	use std::{collections::BTreeMap, sync::Arc};

	use super::*;

	fn filter(object_set: WireObjectSet, clause: WhereClause) -> WireObjectSet {
		WireObjectSet::Filter {
			object_set: Arc::new(object_set),
			where_clause: clause,
		}
	}

	#[test]
	fn where_fields_are_checked_against_the_scope_they_filter() {
		let ontology = employee_ontology();

		let offices = WireObjectSet::SearchAround {
			object_set: Arc::new(WireObjectSet::base(EMPLOYEE)),
			link: "officeLink".to_string(),
		};

		assert!(
			validate_object_set(ontology.as_ref(), &filter(offices.clone(), WhereClause::eq("name", "New York")))
				.is_ok()
		);
		assert_eq!(
			validate_object_set(ontology.as_ref(), &filter(offices, WhereClause::eq("fullName", "x"))),
			Err(Error::PropertyNotFound {
				object_type: OFFICE.to_string(),
				property: "fullName".to_string(),
			})
		);
	}

	#[test]
	fn derived_properties_are_in_scope_after_with_properties() {
		let ontology = employee_ontology();

		let with_count = WireObjectSet::WithProperties {
			object_set: Arc::new(WireObjectSet::base(EMPLOYEE)),
			derived_properties: BTreeMap::from([(
				"peepCount".to_string(),
				DerivedPropertyDefinition::Selection {
					object_set: Arc::new(WireObjectSet::SearchAround {
						object_set: Arc::new(WireObjectSet::MethodInput),
						link: "peeps".to_string(),
					}),
					operation: SelectionOperation::Count,
				},
			)]),
		};

		assert!(validate_object_set(
			ontology.as_ref(),
			&filter(with_count.clone(), WhereClause::gt("peepCount", 0))
		)
		.is_ok());

		let bad_selection = WireObjectSet::WithProperties {
			object_set: Arc::new(WireObjectSet::base(EMPLOYEE)),
			derived_properties: BTreeMap::from([(
				"officeSize".to_string(),
				DerivedPropertyDefinition::Selection {
					object_set: Arc::new(WireObjectSet::SearchAround {
						object_set: Arc::new(WireObjectSet::MethodInput),
						link: "officeLink".to_string(),
					}),
					operation: SelectionOperation::Get {
						selected_property_api_name: "size".to_string(),
					},
				},
			)]),
		};

		assert!(matches!(
			validate_object_set(ontology.as_ref(), &bad_selection),
			Err(Error::PropertyNotFound { property, .. }) if property == "size"
		));
	}

	#[test]
	fn static_sets_skip_checks() {
		let ontology = employee_ontology();
		let set = filter(
			WireObjectSet::Static {
				objects: vec!["ri.faux.main.object.Employee.50030".to_string()],
			},
			WhereClause::eq("anything", 1),
		);

		assert!(validate_object_set(ontology.as_ref(), &set).is_ok());
	}
}
