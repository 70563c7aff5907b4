use osdk_ontology::{ObjectOrInterface, PropertyType};
use osdk_wire::{
	AggregateObjectSetRequest, LoadObjectSetRequest, NearestNeighborsQuery, WhereClause,
	WireObjectSet,
};

use std::{
	collections::{BTreeMap, BTreeSet},
	fmt, iter,
	sync::Arc,
};

use futures::{
	stream::{self, BoxStream},
	StreamExt, TryStreamExt,
};
use serde_json::Value;
use tracing::debug;

use super::{
	aggregate::{AggregateOptions, AggregateResult, Metric},
	canonical,
	client::Client,
	derived::{DerivedProperty, DerivedPropertyBuilder},
	error::{Error, Result},
	invalidation::{analyze, InvalidationSet},
	page::{FetchPageArgs, OsdkObject, OsdkResult, Page},
	subscription::{ObjectSetSubscription, ObjectUpdate, ObjectUpdates, SubscribeOptions},
	typing::{combine_types, object_or_interface, resolve_link},
	validate::validate_object_set,
};

/// How a page request reaches the backend.
pub(crate) enum ExecutionPlan {
	Cached {
		key: String,
		request: LoadObjectSetRequest,
		dependencies: BTreeSet<String>,
	},
	/// The invalidation analyzer cannot describe the set, so results are not cached.
	Uncached(LoadObjectSetRequest),
}

/// An immutable, lazily executed query over ontology objects.
///
/// Builder methods return new sets and never touch the receiver; the wire tree is shared
/// between a set and everything built on top of it.
#[derive(Clone)]
pub struct ObjectSet {
	client: Client,
	definition: ObjectOrInterface,
	wire: Arc<WireObjectSet>,
	derived: BTreeMap<String, PropertyType>,
}

impl fmt::Debug for ObjectSet {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ObjectSet")
			.field("type", &self.definition.api_name())
			.field("wire", &self.wire)
			.field("derived", &self.derived)
			.finish_non_exhaustive()
	}
}

impl ObjectSet {
	pub(crate) fn new(client: Client, definition: ObjectOrInterface, wire: WireObjectSet) -> Self {
		Self {
			client,
			definition,
			wire: Arc::new(wire),
			derived: BTreeMap::new(),
		}
	}

	/// Same type and derived properties, new tree.
	fn derive(&self, wire: WireObjectSet) -> Self {
		Self {
			wire: Arc::new(wire),
			..self.clone()
		}
	}

	#[must_use]
	pub const fn definition(&self) -> &ObjectOrInterface {
		&self.definition
	}

	#[must_use]
	pub fn api_name(&self) -> &str {
		self.definition.api_name()
	}

	#[must_use]
	pub const fn wire_object_set(&self) -> &Arc<WireObjectSet> {
		&self.wire
	}

	/// Derived properties in scope, with their data types.
	#[must_use]
	pub const fn derived_properties(&self) -> &BTreeMap<String, PropertyType> {
		&self.derived
	}

	fn property_type(&self, property: &str) -> Result<PropertyType> {
		self.definition
			.property(property)
			.map(|definition| definition.data_type)
			.or_else(|| self.derived.get(property).copied())
			.ok_or_else(|| Error::PropertyNotFound {
				object_type: self.api_name().to_string(),
				property: property.to_string(),
			})
	}

	/// Keeps the objects matching `clause`. Fields are checked when the set is executed.
	#[must_use]
	pub fn where_(&self, clause: WhereClause) -> Self {
		self.derive(WireObjectSet::Filter {
			object_set: Arc::clone(&self.wire),
			where_clause: clause,
		})
	}

	/// The objects linked to members of this set through `link`.
	pub fn pivot_to(&self, link: &str) -> Result<Self> {
		let resolved = resolve_link(self.client.ontology().as_ref(), &self.definition, link)?;

		let wire = if resolved.via_interface {
			WireObjectSet::InterfaceLinkSearchAround {
				object_set: Arc::clone(&self.wire),
				interface_link: link.to_string(),
			}
		} else {
			WireObjectSet::SearchAround {
				object_set: Arc::clone(&self.wire),
				link: link.to_string(),
			}
		};

		Ok(Self {
			client: self.client.clone(),
			definition: resolved.target,
			wire: Arc::new(wire),
			derived: BTreeMap::new(),
		})
	}

	pub fn union(&self, others: &[Self]) -> Result<Self> {
		self.set_operation("union", others, |object_sets| WireObjectSet::Union { object_sets })
	}

	pub fn intersect(&self, others: &[Self]) -> Result<Self> {
		self.set_operation("intersect", others, |object_sets| {
			WireObjectSet::Intersect { object_sets }
		})
	}

	/// Members of this set that are in none of `others`.
	pub fn subtract(&self, others: &[Self]) -> Result<Self> {
		self.set_operation("subtract", others, |object_sets| {
			WireObjectSet::Subtract { object_sets }
		})
	}

	fn set_operation(
		&self,
		operation: &'static str,
		others: &[Self],
		build: impl FnOnce(Vec<Arc<WireObjectSet>>) -> WireObjectSet,
	) -> Result<Self> {
		let operands = iter::once(self).chain(others).collect::<Vec<_>>();

		let definitions = operands
			.iter()
			.map(|operand| operand.definition.clone())
			.collect::<Vec<_>>();
		let definition = combine_types(self.client.ontology().as_ref(), operation, &definitions)?;

		let derived = self
			.derived
			.iter()
			.filter(|(name, _)| others.iter().all(|other| other.derived.contains_key(*name)))
			.map(|(name, data_type)| (name.clone(), *data_type))
			.collect();

		Ok(Self {
			client: self.client.clone(),
			definition,
			wire: Arc::new(build(
				operands
					.iter()
					.map(|operand| Arc::clone(&operand.wire))
					.collect(),
			)),
			derived,
		})
	}

	/// A builder rooted at the members of this set, for [`with_properties`](Self::with_properties).
	#[must_use]
	pub fn derived_property_builder(&self) -> DerivedPropertyBuilder {
		DerivedPropertyBuilder::new(Arc::clone(self.client.ontology()), self.definition.clone())
	}

	/// Adds one derived property built from this set's members.
	///
	/// ```ignore
	/// let with_lead = employees.with_property("leadName", |b| {
	/// 	b.pivot_to("lead")?.select_property("fullName")
	/// })?;
	/// ```
	pub fn with_property(
		&self,
		name: impl Into<String>,
		build: impl FnOnce(&DerivedPropertyBuilder) -> Result<DerivedProperty>,
	) -> Result<Self> {
		let property = build(&self.derived_property_builder())?;
		Ok(self.with_properties([(name.into(), property)]))
	}

	/// Adds derived properties. Names already in scope are overwritten.
	#[must_use]
	pub fn with_properties(
		&self,
		properties: impl IntoIterator<Item = (String, DerivedProperty)>,
	) -> Self {
		let (object_set, mut definitions) = match &*self.wire {
			WireObjectSet::WithProperties {
				object_set,
				derived_properties,
			} => (Arc::clone(object_set), derived_properties.clone()),
			_ => (Arc::clone(&self.wire), BTreeMap::new()),
		};

		let mut derived = self.derived.clone();
		for (name, property) in properties {
			derived.insert(name.clone(), property.data_type());
			definitions.insert(name, property.into_definition());
		}

		Self {
			wire: Arc::new(WireObjectSet::WithProperties {
				object_set,
				derived_properties: definitions,
			}),
			derived,
			..self.clone()
		}
	}

	/// Narrows the set to members of `entity_type`, an object type or interface.
	pub fn narrow_to_type(&self, entity_type: &str) -> Result<Self> {
		let definition = object_or_interface(self.client.ontology().as_ref(), entity_type)?;

		Ok(Self {
			definition,
			..self.derive(WireObjectSet::AsType {
				object_set: Arc::clone(&self.wire),
				entity_type: entity_type.to_string(),
			})
		})
	}

	#[must_use]
	pub fn as_base_object_types(&self) -> Self {
		self.derive(WireObjectSet::AsBaseObjectTypes {
			object_set: Arc::clone(&self.wire),
		})
	}

	/// The `num_neighbors` members whose `property` is closest to `query`.
	pub fn nearest_neighbors(
		&self,
		query: NearestNeighborsQuery,
		num_neighbors: u32,
		property: &str,
	) -> Result<Self> {
		self.property_type(property)?;

		Ok(self.derive(WireObjectSet::NearestNeighbors {
			object_set: Arc::clone(&self.wire),
			query,
			num_neighbors,
			property_identifier: property.to_string(),
		}))
	}

	/// Runs the invalidation analyzer over this set.
	pub fn invalidation_set(&self) -> Result<InvalidationSet> {
		analyze(self.client.ontology().as_ref(), &self.wire)
	}

	fn effective_args(&self, args: FetchPageArgs) -> FetchPageArgs {
		FetchPageArgs {
			page_size: args.page_size.or(self.client.config().default_page_size),
			..args
		}
	}

	/// The cache key a page request with `args` is stored under.
	#[must_use]
	pub fn cache_key(&self, args: &FetchPageArgs) -> String {
		canonical::list_key(&self.wire, &self.effective_args(args.clone()))
	}

	pub(crate) fn plan(&self, args: FetchPageArgs) -> Result<ExecutionPlan> {
		validate_object_set(self.client.ontology().as_ref(), &self.wire)?;

		let args = self.effective_args(args);
		for property in args
			.select
			.iter()
			.chain(args.order_by.iter().flat_map(|order_by| order_by.fields.iter().map(|field| &field.field)))
		{
			self.property_type(property)?;
		}

		let request = LoadObjectSetRequest {
			object_set: Arc::clone(&self.wire),
			select: args.select.clone(),
			order_by: args.order_by.clone(),
			page_size: args.page_size,
			page_token: args.next_page_token.clone(),
			exclude_rid: args.exclude_rid,
		};

		match self.invalidation_set() {
			Ok(analysis) => Ok(ExecutionPlan::Cached {
				key: canonical::list_key(&self.wire, &args),
				request,
				dependencies: analysis
					.invalidation_set
					.into_iter()
					.chain(self.definition.concrete_types())
					.collect(),
			}),
			Err(e @ Error::UnsupportedObjectSet(_)) => {
				debug!(object_type = self.api_name(), %e, "object set bypasses the cache");
				Ok(ExecutionPlan::Uncached(request))
			}
			Err(e) => Err(e),
		}
	}

	/// One page of results, served from the cache when an identical request was loaded before.
	pub async fn fetch_page(&self, args: FetchPageArgs) -> Result<Page> {
		match self.plan(args)? {
			ExecutionPlan::Cached {
				key,
				request,
				dependencies,
			} => self.client.load_cached(&key, request, dependencies).await,
			ExecutionPlan::Uncached(request) => self.client.load_uncached(request).await,
		}
	}

	pub async fn fetch_page_with_errors(&self, args: FetchPageArgs) -> OsdkResult<Page> {
		self.fetch_page(args).await.into()
	}

	/// Every member, page by page. A page is requested only once the previous one has been
	/// consumed, and dropping the stream stops the iteration.
	#[must_use]
	pub fn async_iter(&self, args: FetchPageArgs) -> BoxStream<'static, Result<OsdkObject>> {
		let set = self.clone();
		let first = Some(args.next_page_token.clone());

		stream::try_unfold(first, move |token| next_page(set.clone(), args.clone(), token))
			.map_ok(|objects| stream::iter(objects.into_iter().map(Ok::<_, Error>)))
			.try_flatten()
			.boxed()
	}

	pub async fn aggregate(&self, options: AggregateOptions) -> Result<AggregateResult> {
		validate_object_set(self.client.ontology().as_ref(), &self.wire)?;

		if options.metrics.is_empty() {
			return Err(Error::InvalidAggregation(
				"at least one metric is required".to_string(),
			));
		}

		let aggregation = options
			.metrics
			.iter()
			.map(|metric| {
				if let Metric::Field { property, .. } = metric {
					metric.check_type(self.property_type(property)?)?;
				}
				metric.to_wire()
			})
			.collect::<Result<Vec<_>>>()?;

		let group_by = options
			.group_by
			.iter()
			.map(|group_by| {
				self.property_type(group_by.property())?;
				group_by.to_wire()
			})
			.collect::<Result<Vec<_>>>()?;

		let response = self
			.client
			.aggregate(AggregateObjectSetRequest {
				object_set: Arc::clone(&self.wire),
				aggregation,
				group_by,
			})
			.await?;

		Ok(AggregateResult::from_response(response, &options))
	}

	pub async fn aggregate_with_errors(&self, options: AggregateOptions) -> OsdkResult<AggregateResult> {
		self.aggregate(options).await.into()
	}

	/// The member with `primary_key`. Only available on object type sets.
	pub async fn fetch_one(&self, primary_key: impl Into<Value> + Send) -> Result<OsdkObject> {
		let ObjectOrInterface::Object(definition) = &self.definition else {
			return Err(Error::NotAnObjectType(self.api_name().to_string()));
		};
		let primary_key = primary_key.into();

		let page = if matches!(*self.wire, WireObjectSet::Base { .. }) {
			self.client.load_object(definition, &primary_key).await?
		} else {
			self.where_(WhereClause::eq(&definition.primary_key, primary_key.clone()))
				.fetch_page(FetchPageArgs::default().page_size(1))
				.await?
		};

		page.data
			.into_iter()
			.next()
			.ok_or_else(|| Error::ObjectNotFound {
				object_type: definition.api_name.clone(),
				primary_key: primary_key
					.as_str()
					.map_or_else(|| primary_key.to_string(), str::to_string),
			})
	}

	pub async fn fetch_one_with_errors(&self, primary_key: impl Into<Value> + Send) -> OsdkResult<OsdkObject> {
		self.fetch_one(primary_key).await.into()
	}

	/// Prefetches a page into the cache in the background.
	pub fn prefetch(&self, args: FetchPageArgs) {
		self.client.prefetch_list(self, args);
	}

	/// Changes to objects of this set's type, as a stream.
	pub fn updates(&self, options: SubscribeOptions) -> Result<ObjectUpdates> {
		let feed = self
			.client
			.change_feed()
			.ok_or(Error::SubscriptionsUnavailable)?;
		let buffer = options
			.buffer
			.unwrap_or(self.client.config().subscription.buffer);

		Ok(ObjectUpdates::spawn(
			feed,
			self.definition.concrete_types(),
			options,
			buffer,
		))
	}

	/// Calls `listener` for every added, updated or removed object of this set's type. For
	/// interface sets that is every implementing type.
	pub fn subscribe(
		&self,
		listener: impl FnMut(ObjectUpdate) + Send + 'static,
		options: SubscribeOptions,
	) -> Result<ObjectSetSubscription> {
		Ok(ObjectSetSubscription::spawn(self.updates(options)?, listener))
	}
}

type PageToken = Option<String>;

/// `token` is `None` once the last page has been returned.
async fn next_page(
	set: ObjectSet,
	args: FetchPageArgs,
	token: Option<PageToken>,
) -> Result<Option<(Vec<OsdkObject>, Option<PageToken>)>> {
	let Some(next_page_token) = token else {
		return Ok(None);
	};

	let page = set
		.fetch_page(FetchPageArgs {
			next_page_token,
			..args
		})
		.await?;
	let next = page.next_page_token.map(Some);

	Ok(Some((page.data, next)))
}
