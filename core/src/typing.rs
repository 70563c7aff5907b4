//! Type resolution shared by the builder, the validator and the invalidation analyzer.

use osdk_ontology::{InterfaceLinkTarget, LinkCardinality, ObjectOrInterface, OntologyProvider};

use std::collections::BTreeSet;

use super::error::{Error, Result};

#[derive(Debug, Clone)]
pub(crate) struct ResolvedLink {
	pub target: ObjectOrInterface,
	pub cardinality: LinkCardinality,
	/// The link is declared on an interface, so it goes on the wire as
	/// `interfaceLinkSearchAround`.
	pub via_interface: bool,
}

pub(crate) fn object_or_interface(
	ontology: &dyn OntologyProvider,
	api_name: &str,
) -> Result<ObjectOrInterface> {
	ontology
		.definition(api_name)
		.ok_or_else(|| Error::ObjectTypeNotFound(api_name.to_string()))
}

fn interface_link_target(
	ontology: &dyn OntologyProvider,
	target: &InterfaceLinkTarget,
) -> Result<ObjectOrInterface> {
	match target {
		InterfaceLinkTarget::Object(api_name) => ontology
			.object_type(api_name)
			.map(ObjectOrInterface::Object)
			.ok_or_else(|| Error::ObjectTypeNotFound(api_name.clone())),
		InterfaceLinkTarget::Interface(api_name) => ontology
			.interface(api_name)
			.map(ObjectOrInterface::Interface)
			.ok_or_else(|| Error::ObjectTypeNotFound(api_name.clone())),
	}
}

/// Looks `link` up on `source`. Object types fall back to links declared on the interfaces
/// they implement.
pub(crate) fn resolve_link(
	ontology: &dyn OntologyProvider,
	source: &ObjectOrInterface,
	link: &str,
) -> Result<ResolvedLink> {
	let not_found = || Error::LinkNotFound {
		source_type: source.api_name().to_string(),
		link: link.to_string(),
	};

	let interface_link = match source {
		ObjectOrInterface::Object(def) => {
			if let Some(definition) = def.links.get(link) {
				let target = ontology
					.object_type(&definition.target_type)
					.map(ObjectOrInterface::Object)
					.ok_or_else(|| Error::ObjectTypeNotFound(definition.target_type.clone()))?;

				return Ok(ResolvedLink {
					target,
					cardinality: definition.cardinality,
					via_interface: false,
				});
			}

			def.implements
				.iter()
				.filter_map(|interface| ontology.interface(interface))
				.find_map(|interface| interface.links.get(link).cloned())
		}
		ObjectOrInterface::Interface(def) => def.links.get(link).cloned(),
	}
	.ok_or_else(not_found)?;

	Ok(ResolvedLink {
		target: interface_link_target(ontology, &interface_link.target)?,
		cardinality: interface_link.cardinality,
		via_interface: true,
	})
}

fn interfaces_of(definition: &ObjectOrInterface) -> BTreeSet<String> {
	match definition {
		ObjectOrInterface::Object(def) => def.implements.clone(),
		ObjectOrInterface::Interface(def) => BTreeSet::from([def.api_name.clone()]),
	}
}

/// The type a set operation over `operands` produces: their shared type when they all agree,
/// otherwise an interface every operand implements.
pub(crate) fn combine_types(
	ontology: &dyn OntologyProvider,
	operation: &'static str,
	operands: &[ObjectOrInterface],
) -> Result<ObjectOrInterface> {
	let Some((first, rest)) = operands.split_first() else {
		return Err(Error::EmptySetOperation(operation));
	};

	if rest.iter().all(|operand| operand.api_name() == first.api_name()) {
		return Ok(first.clone());
	}

	let incompatible = |other: &ObjectOrInterface| Error::IncompatibleSetTypes {
		left: first.api_name().to_string(),
		right: other.api_name().to_string(),
	};

	let mut common = interfaces_of(first);
	for operand in rest {
		common = common
			.intersection(&interfaces_of(operand))
			.cloned()
			.collect();

		if common.is_empty() {
			return Err(incompatible(operand));
		}
	}

	common
		.iter()
		.find_map(|interface| ontology.interface(interface))
		.map(ObjectOrInterface::Interface)
		.ok_or_else(|| incompatible(&rest[0]))
}

#[cfg(test)]
mod tests {
	use osdk_faux_foundry::fixtures::{employee_ontology, EMPLOYEE, FOO_INTERFACE, OFFICE};

	use super::*;

	#[test]
	fn object_links_and_interface_fallback() {
		let ontology = employee_ontology();
		let employee = object_or_interface(ontology.as_ref(), EMPLOYEE).unwrap();

		let office = resolve_link(ontology.as_ref(), &employee, "officeLink").unwrap();
		assert_eq!(office.target.api_name(), OFFICE);
		assert_eq!(office.cardinality, LinkCardinality::One);
		assert!(!office.via_interface);

		let foo = object_or_interface(ontology.as_ref(), FOO_INTERFACE).unwrap();
		let office = resolve_link(ontology.as_ref(), &foo, "officeLink").unwrap();
		assert_eq!(office.target.api_name(), OFFICE);
		assert!(office.via_interface);

		assert_eq!(
			resolve_link(ontology.as_ref(), &employee, "desk").unwrap_err(),
			Error::LinkNotFound {
				source_type: EMPLOYEE.to_string(),
				link: "desk".to_string(),
			}
		);
	}

	#[test]
	fn set_operations_widen_to_shared_interfaces() {
		let ontology = employee_ontology();
		let employee = object_or_interface(ontology.as_ref(), EMPLOYEE).unwrap();
		let office = object_or_interface(ontology.as_ref(), OFFICE).unwrap();
		let foo = object_or_interface(ontology.as_ref(), FOO_INTERFACE).unwrap();

		let same = combine_types(ontology.as_ref(), "union", &[employee.clone(), employee.clone()]);
		assert_eq!(same.unwrap().api_name(), EMPLOYEE);

		let widened = combine_types(ontology.as_ref(), "union", &[employee.clone(), foo]);
		assert_eq!(widened.unwrap().api_name(), FOO_INTERFACE);

		assert!(matches!(
			combine_types(ontology.as_ref(), "union", &[employee, office]),
			Err(Error::IncompatibleSetTypes { .. })
		));
		assert_eq!(
			combine_types(ontology.as_ref(), "intersect", &[]).unwrap_err(),
			Error::EmptySetOperation("intersect")
		);
	}
}
