//! Computes which object types a query result depends on.
//!
//! A cached result must be refetched when objects of any type it was derived from change. The
//! analyzer walks a [`WireObjectSet`] and collects those types, except for the result type on
//! its own spine: a result of `Employee` built only from `Employee` sets is invalidated through
//! the root type itself. Once a path leaves the root type through a pivot, every type reached is
//! a genuine dependency, including the root type when the path comes back to it.
//!
//! `filter` nodes are opaque. Where clauses are not searched for embedded object sets.

use osdk_ontology::{ObjectOrInterface, OntologyProvider};
use osdk_wire::{DerivedPropertyDefinition, WireObjectSet};

use std::{
	collections::{BTreeMap, BTreeSet, HashMap, HashSet},
	ptr,
};

use tracing::trace;

use super::{
	error::{Error, Result},
	typing::{combine_types, resolve_link},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationSet {
	pub result_type: String,
	/// Object types whose mutations may change the result.
	pub invalidation_set: BTreeSet<String>,
	/// How often each concrete type was visited, as a base set or as a pivot source.
	pub counts: BTreeMap<String, usize>,
}

type NodeId = *const WireObjectSet;

#[derive(Debug, Clone, Default)]
struct Contribution {
	set: BTreeSet<String>,
	counts: BTreeMap<String, usize>,
}

impl Contribution {
	fn visit(&mut self, object_type: &str) {
		*self.counts.entry(object_type.to_string()).or_default() += 1;
	}

	fn add(&mut self, object_type: String, spine: Option<&str>) {
		if spine != Some(object_type.as_str()) {
			self.set.insert(object_type);
		}
	}

	/// Used for derived selection chains, whose visits add to those of the set they extend.
	fn merge_sum(&mut self, other: Self) {
		self.set.extend(other.set);
		for (object_type, count) in other.counts {
			*self.counts.entry(object_type).or_default() += count;
		}
	}

	fn merge_max(&mut self, other: Self) {
		self.set.extend(other.set);
		for (object_type, count) in other.counts {
			let entry = self.counts.entry(object_type).or_default();
			*entry = (*entry).max(count);
		}
	}
}

pub fn analyze(
	ontology: &dyn OntologyProvider,
	object_set: &WireObjectSet,
) -> Result<InvalidationSet> {
	ensure_supported(object_set, false, &mut HashSet::new())?;

	let mut analyzer = Analyzer {
		ontology,
		types: HashMap::new(),
		contributions: HashMap::new(),
	};

	let result_type = analyzer.resolve(object_set, None)?.api_name().to_string();
	let Contribution { set, counts } = analyzer.collect(object_set, None, Some(&result_type))?;

	trace!(%result_type, invalidation_set = ?set, "analyzed object set");

	Ok(InvalidationSet {
		result_type,
		invalidation_set: set,
		counts,
	})
}

fn ensure_supported(
	node: &WireObjectSet,
	in_derived: bool,
	visited: &mut HashSet<(NodeId, bool)>,
) -> Result<()> {
	if !visited.insert((ptr::from_ref(node), in_derived)) {
		return Ok(());
	}

	match node {
		WireObjectSet::Reference { .. }
		| WireObjectSet::Static { .. }
		| WireObjectSet::AsType { .. }
		| WireObjectSet::AsBaseObjectTypes { .. }
		| WireObjectSet::NearestNeighbors { .. } => {
			return Err(Error::UnsupportedObjectSet(node.kind()));
		}
		WireObjectSet::MethodInput if !in_derived => return Err(Error::MissingMethodInput),
		WireObjectSet::WithProperties {
			derived_properties, ..
		} => {
			for definition in derived_properties.values() {
				ensure_supported_derived(definition, visited)?;
			}
		}
		_ => {}
	}

	node.children()
		.into_iter()
		.try_for_each(|child| ensure_supported(child, in_derived, visited))
}

fn ensure_supported_derived(
	definition: &DerivedPropertyDefinition,
	visited: &mut HashSet<(NodeId, bool)>,
) -> Result<()> {
	if let DerivedPropertyDefinition::Selection { object_set, .. } = definition {
		return ensure_supported(object_set, true, visited);
	}

	definition
		.operands()
		.into_iter()
		.try_for_each(|operand| ensure_supported_derived(operand, visited))
}

struct Analyzer<'a> {
	ontology: &'a dyn OntologyProvider,
	types: HashMap<(NodeId, Option<String>), ObjectOrInterface>,
	contributions: HashMap<(NodeId, Option<String>, Option<String>), Contribution>,
}

impl Analyzer<'_> {
	fn resolve(
		&mut self,
		node: &WireObjectSet,
		input: Option<&ObjectOrInterface>,
	) -> Result<ObjectOrInterface> {
		let key = (
			ptr::from_ref(node),
			input.map(|input| input.api_name().to_string()),
		);
		if let Some(resolved) = self.types.get(&key) {
			return Ok(resolved.clone());
		}

		let resolved = match node {
			WireObjectSet::Base { object_type } => self
				.ontology
				.object_type(object_type)
				.map(ObjectOrInterface::Object)
				.ok_or_else(|| Error::ObjectTypeNotFound(object_type.clone()))?,
			WireObjectSet::InterfaceBase { interface_type } => self
				.ontology
				.interface(interface_type)
				.map(ObjectOrInterface::Interface)
				.ok_or_else(|| Error::ObjectTypeNotFound(interface_type.clone()))?,
			WireObjectSet::Filter { object_set, .. }
			| WireObjectSet::WithProperties { object_set, .. } => self.resolve(object_set, input)?,
			WireObjectSet::SearchAround { object_set, link }
			| WireObjectSet::InterfaceLinkSearchAround {
				object_set,
				interface_link: link,
			} => {
				let source = self.resolve(object_set, input)?;
				resolve_link(self.ontology, &source, link)?.target
			}
			WireObjectSet::Union { object_sets }
			| WireObjectSet::Intersect { object_sets }
			| WireObjectSet::Subtract { object_sets } => {
				let operands = object_sets
					.iter()
					.map(|operand| self.resolve(operand, input))
					.collect::<Result<Vec<_>>>()?;
				combine_types(self.ontology, node.kind(), &operands)?
			}
			WireObjectSet::MethodInput => input.cloned().ok_or(Error::MissingMethodInput)?,
			WireObjectSet::Reference { .. }
			| WireObjectSet::Static { .. }
			| WireObjectSet::AsType { .. }
			| WireObjectSet::AsBaseObjectTypes { .. }
			| WireObjectSet::NearestNeighbors { .. } => {
				return Err(Error::UnsupportedObjectSet(node.kind()));
			}
		};

		self.types.insert(key, resolved.clone());
		Ok(resolved)
	}

	/// Dependencies of `node`. `spine` names the root result type while `node` is still on the
	/// root's own type spine and is `None` once a pivot has left it.
	fn collect(
		&mut self,
		node: &WireObjectSet,
		input: Option<&ObjectOrInterface>,
		spine: Option<&str>,
	) -> Result<Contribution> {
		let key = (
			ptr::from_ref(node),
			input.map(|input| input.api_name().to_string()),
			spine.map(str::to_string),
		);
		if let Some(contribution) = self.contributions.get(&key) {
			return Ok(contribution.clone());
		}

		let contribution = match node {
			WireObjectSet::Base { .. } | WireObjectSet::InterfaceBase { .. } => {
				let mut contribution = Contribution::default();
				for object_type in self.resolve(node, input)?.concrete_types() {
					contribution.visit(&object_type);
				}
				contribution
			}
			WireObjectSet::MethodInput => Contribution::default(),
			WireObjectSet::Filter { object_set, .. } => self.collect(object_set, input, spine)?,
			WireObjectSet::SearchAround { object_set, .. }
			| WireObjectSet::InterfaceLinkSearchAround { object_set, .. } => {
				let source = self.resolve(object_set, input)?;
				let source_spine = spine.filter(|spine| *spine == source.api_name());

				let mut contribution = self.collect(object_set, input, source_spine)?;
				for object_type in source.concrete_types() {
					contribution.visit(&object_type);
					contribution.add(object_type, spine);
				}
				contribution
			}
			WireObjectSet::Union { object_sets }
			| WireObjectSet::Intersect { object_sets }
			| WireObjectSet::Subtract { object_sets } => {
				let combined = self.resolve(node, input)?;

				let mut contribution = Contribution::default();
				for operand in object_sets {
					let operand_type = self.resolve(operand, input)?;
					let operand_spine = spine.filter(|spine| *spine == operand_type.api_name());
					contribution.merge_max(self.collect(operand, input, operand_spine)?);

					if operand_type.api_name() != combined.api_name() {
						for object_type in operand_type.concrete_types() {
							contribution.add(object_type, spine);
						}
					}
				}
				contribution
			}
			WireObjectSet::WithProperties {
				object_set,
				derived_properties,
			} => {
				let scope = self.resolve(object_set, input)?;

				let mut contribution = self.collect(object_set, input, spine)?;
				for definition in derived_properties.values() {
					self.collect_derived(definition, &scope, spine, &mut contribution)?;
				}
				contribution
			}
			WireObjectSet::Reference { .. }
			| WireObjectSet::Static { .. }
			| WireObjectSet::AsType { .. }
			| WireObjectSet::AsBaseObjectTypes { .. }
			| WireObjectSet::NearestNeighbors { .. } => {
				return Err(Error::UnsupportedObjectSet(node.kind()));
			}
		};

		self.contributions.insert(key, contribution.clone());
		Ok(contribution)
	}

	fn collect_derived(
		&mut self,
		definition: &DerivedPropertyDefinition,
		scope: &ObjectOrInterface,
		spine: Option<&str>,
		contribution: &mut Contribution,
	) -> Result<()> {
		if let DerivedPropertyDefinition::Selection { object_set, .. } = definition {
			let (reached, _) = self.collect_chain(object_set, scope, spine)?;
			contribution.merge_sum(reached);
			return Ok(());
		}

		definition
			.operands()
			.into_iter()
			.try_for_each(|operand| self.collect_derived(operand, scope, spine, contribution))
	}

	/// Walks a selection chain rooted at `methodInput`, adding every type a pivot reaches.
	///
	/// The returned flag tells whether the chain is still on the root spine: `spine` is set, the
	/// chain starts at the root type and every pivot so far started from the root type.
	fn collect_chain(
		&mut self,
		node: &WireObjectSet,
		scope: &ObjectOrInterface,
		spine: Option<&str>,
	) -> Result<(Contribution, bool)> {
		match node {
			WireObjectSet::MethodInput => Ok((
				Contribution::default(),
				spine == Some(scope.api_name()),
			)),
			WireObjectSet::Filter { object_set, .. } => self.collect_chain(object_set, scope, spine),
			WireObjectSet::SearchAround {
				object_set: source, ..
			}
			| WireObjectSet::InterfaceLinkSearchAround {
				object_set: source, ..
			} => {
				let (mut contribution, on_spine) = self.collect_chain(source, scope, spine)?;
				let source_type = self.resolve(source, Some(scope))?;
				let on_spine = on_spine && spine == Some(source_type.api_name());

				for object_type in self.resolve(node, Some(scope))?.concrete_types() {
					contribution.visit(&object_type);
					contribution.add(object_type, spine.filter(|_| on_spine));
				}
				Ok((contribution, on_spine))
			}
			WireObjectSet::WithProperties {
				object_set,
				derived_properties,
			} => {
				let (mut contribution, on_spine) = self.collect_chain(object_set, scope, spine)?;
				let inner_scope = self.resolve(object_set, Some(scope))?;
				let inner_spine = spine.filter(|_| on_spine);
				for definition in derived_properties.values() {
					self.collect_derived(definition, &inner_scope, inner_spine, &mut contribution)?;
				}
				Ok((contribution, on_spine))
			}
			_ => {
				let mut contribution = self.collect(node, Some(scope), None)?;
				let resolved = self.resolve(node, Some(scope))?;
				let on_spine = spine == Some(resolved.api_name());
				for object_type in resolved.concrete_types() {
					contribution.add(object_type, spine);
				}
				Ok((contribution, on_spine))
			}
		}
	}
}
