use osdk_cache::{Fetcher, ObservableCache};
use osdk_ontology::{ObjectOrInterface, ObjectTypeDefinition, OntologyProvider};
use osdk_wire::{
	AggregateObjectSetRequest, AggregateResponse, Backend, ChangeFeed, LoadObjectSetRequest,
	TransactionEdit, WhereClause, WireObjectSet,
};

use std::{fmt, future::Future, sync::Arc};

use futures::FutureExt;
use serde_json::Value;
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};
use tracing::{debug, trace, warn};

use super::{
	canonical,
	config::ClientConfig,
	edits::EditBatcher,
	error::{Error, Result},
	object_set::{ExecutionPlan, ObjectSet},
	page::{FetchPageArgs, Page},
	typing::object_or_interface,
};

struct Inner {
	ontology: Arc<dyn OntologyProvider>,
	backend: Arc<dyn Backend>,
	change_feed: Option<Arc<dyn ChangeFeed>>,
	cache: ObservableCache<Page, Error>,
	edits: EditBatcher,
	config: ClientConfig,
}

/// Entry point of the engine: builds object sets and owns the cache and edit queue they share.
///
/// Cheap to clone, all clones share the same state.
#[derive(Clone)]
pub struct Client {
	inner: Arc<Inner>,
}

impl fmt::Debug for Client {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Client")
			.field("cache", &self.inner.cache)
			.field("config", &self.inner.config)
			.field("has_change_feed", &self.inner.change_feed.is_some())
			.finish_non_exhaustive()
	}
}

pub struct ClientBuilder {
	ontology: Arc<dyn OntologyProvider>,
	backend: Arc<dyn Backend>,
	change_feed: Option<Arc<dyn ChangeFeed>>,
	cache: Option<ObservableCache<Page, Error>>,
	config: ClientConfig,
}

impl ClientBuilder {
	#[must_use]
	pub fn change_feed(mut self, change_feed: Arc<dyn ChangeFeed>) -> Self {
		self.change_feed = Some(change_feed);
		self
	}

	#[must_use]
	pub fn config(mut self, config: ClientConfig) -> Self {
		self.config = config;
		self
	}

	/// Uses an existing cache instead of creating one from the configuration.
	#[must_use]
	pub fn cache(mut self, cache: ObservableCache<Page, Error>) -> Self {
		self.cache = Some(cache);
		self
	}

	#[must_use]
	pub fn build(self) -> Client {
		let cache = self
			.cache
			.unwrap_or_else(|| ObservableCache::new(self.config.cache));
		let edits = EditBatcher::new(Arc::clone(&self.backend), cache.clone());

		debug!(config = ?self.config, "client built");

		Client {
			inner: Arc::new(Inner {
				ontology: self.ontology,
				backend: self.backend,
				change_feed: self.change_feed,
				cache,
				edits,
				config: self.config,
			}),
		}
	}
}

fn object_request(definition: &ObjectTypeDefinition, primary_key: &Value) -> (String, LoadObjectSetRequest) {
	let object_set = WireObjectSet::Filter {
		object_set: Arc::new(WireObjectSet::base(&definition.api_name)),
		where_clause: WhereClause::eq(&definition.primary_key, primary_key.clone()),
	};

	let request = LoadObjectSetRequest {
		page_size: Some(1),
		..LoadObjectSetRequest::new(Arc::new(object_set))
	};

	(canonical::object_key(&definition.api_name, primary_key), request)
}

impl Client {
	pub fn builder(ontology: Arc<dyn OntologyProvider>, backend: Arc<dyn Backend>) -> ClientBuilder {
		ClientBuilder {
			ontology,
			backend,
			change_feed: None,
			cache: None,
			config: ClientConfig::default(),
		}
	}

	#[must_use]
	pub fn ontology(&self) -> &Arc<dyn OntologyProvider> {
		&self.inner.ontology
	}

	#[must_use]
	pub fn config(&self) -> &ClientConfig {
		&self.inner.config
	}

	#[must_use]
	pub fn cache(&self) -> &ObservableCache<Page, Error> {
		&self.inner.cache
	}

	pub(crate) fn change_feed(&self) -> Option<&Arc<dyn ChangeFeed>> {
		self.inner.change_feed.as_ref()
	}

	/// Every object of `object_type`.
	pub fn object_set(&self, object_type: &str) -> Result<ObjectSet> {
		let definition = self
			.inner
			.ontology
			.object_type(object_type)
			.ok_or_else(|| Error::ObjectTypeNotFound(object_type.to_string()))?;

		Ok(ObjectSet::new(
			self.clone(),
			ObjectOrInterface::Object(definition),
			WireObjectSet::base(object_type),
		))
	}

	/// Every object implementing `interface`.
	pub fn interface_set(&self, interface: &str) -> Result<ObjectSet> {
		let definition = self
			.inner
			.ontology
			.interface(interface)
			.ok_or_else(|| Error::ObjectTypeNotFound(interface.to_string()))?;

		Ok(ObjectSet::new(
			self.clone(),
			ObjectOrInterface::Interface(definition),
			WireObjectSet::interface_base(interface),
		))
	}

	pub fn reference_set(&self, object_type: &str, id: impl Into<String>) -> Result<ObjectSet> {
		let definition = object_or_interface(self.inner.ontology.as_ref(), object_type)?;

		Ok(ObjectSet::new(
			self.clone(),
			definition,
			WireObjectSet::Reference {
				object_type: object_type.to_string(),
				id: id.into(),
			},
		))
	}

	/// A set of explicitly listed object RIDs, typed as `object_type`.
	pub fn static_set(
		&self,
		object_type: &str,
		rids: impl IntoIterator<Item = impl Into<String>>,
	) -> Result<ObjectSet> {
		let definition = object_or_interface(self.inner.ontology.as_ref(), object_type)?;

		Ok(ObjectSet::new(
			self.clone(),
			definition,
			WireObjectSet::Static {
				objects: rids.into_iter().map(Into::into).collect(),
			},
		))
	}

	/// Queues `edit` right away. Edits posted within one scheduling tick share a backend batch,
	/// and edits posted while a batch is in flight form the next one.
	///
	/// Tick grouping is exact on a current-thread runtime. A multi-thread runtime may split edits
	/// posted back to back into several batches.
	pub fn post_edit(&self, edit: TransactionEdit) -> impl Future<Output = Result<()>> + Send + 'static {
		self.inner.edits.post_edit(edit)
	}

	/// Resolves once the batch in flight and every queued edit have been sent.
	pub async fn flush_pending_edits(&self) -> Result<()> {
		self.inner.edits.flush().await
	}

	#[must_use]
	pub fn pending_edits(&self) -> usize {
		self.inner.edits.pending_len()
	}

	/// Revalidates every cached result that depends on `object_type`.
	///
	/// Refetches run on the current Tokio runtime. Outside one they are deferred until the result
	/// is next read.
	pub fn invalidate_object_type(&self, object_type: &str) -> usize {
		self.inner.cache.invalidate_object_type(object_type)
	}

	/// Loads a page of `object_set` into the cache in the background.
	pub fn prefetch_list(&self, object_set: &ObjectSet, args: FetchPageArgs) {
		match object_set.plan(args) {
			Ok(ExecutionPlan::Cached {
				key,
				request,
				dependencies,
			}) => {
				self.inner
					.cache
					.prefetch(&key, self.fetcher(request), dependencies);
			}
			Ok(ExecutionPlan::Uncached(_)) => {
				debug!(object_type = object_set.api_name(), "skipping prefetch of uncacheable object set");
			}
			Err(e) => warn!(object_type = object_set.api_name(), %e, "prefetch failed"),
		}
	}

	/// Loads one object into the cache in the background, for a later
	/// [`ObjectSet::fetch_one`].
	pub fn prefetch_object(&self, object_type: &str, primary_key: impl Into<Value>) -> Result<()> {
		let definition = self
			.inner
			.ontology
			.object_type(object_type)
			.ok_or_else(|| Error::ObjectTypeNotFound(object_type.to_string()))?;

		let (key, request) = object_request(&definition, &primary_key.into());
		self.inner
			.cache
			.prefetch(&key, self.fetcher(request), [definition.api_name.clone()]);

		Ok(())
	}

	/// Revalidates cached results as changes arrive on the change feed. The task ends when the
	/// feed closes.
	pub fn spawn_change_watcher(&self) -> Result<JoinHandle<()>> {
		let mut changes = self
			.inner
			.change_feed
			.as_ref()
			.ok_or(Error::SubscriptionsUnavailable)?
			.changes();
		let cache = self.inner.cache.clone();

		Ok(tokio::spawn(async move {
			loop {
				match changes.recv().await {
					Ok(change) => {
						trace!(object_type = %change.object_type, state = ?change.state, "object changed");
						cache.invalidate_object_type(&change.object_type);
					}
					Err(RecvError::Lagged(missed)) => {
						warn!(missed, "change watcher lagged, invalidating every entry");
						cache.invalidate_all();
					}
					Err(RecvError::Closed) => break,
				}
			}
		}))
	}

	fn fetcher(&self, request: LoadObjectSetRequest) -> Fetcher<Page, Error> {
		let backend = Arc::clone(&self.inner.backend);

		Arc::new(move || {
			let backend = Arc::clone(&backend);
			let request = request.clone();
			async move {
				backend
					.load_objects(request)
					.await
					.map(Page::from)
					.map_err(Error::from)
			}
			.boxed()
		})
	}

	pub(crate) async fn load_cached(
		&self,
		key: &str,
		request: LoadObjectSetRequest,
		dependencies: impl IntoIterator<Item = String> + Send,
	) -> Result<Page> {
		let fetcher = self.fetcher(request);
		Ok(self.inner.cache.fetch(key, fetcher, dependencies).await?)
	}

	pub(crate) async fn load_uncached(&self, request: LoadObjectSetRequest) -> Result<Page> {
		Ok(self.inner.backend.load_objects(request).await?.into())
	}

	pub(crate) async fn load_object(
		&self,
		definition: &ObjectTypeDefinition,
		primary_key: &Value,
	) -> Result<Page> {
		let (key, request) = object_request(definition, primary_key);
		self.load_cached(&key, request, [definition.api_name.clone()])
			.await
	}

	pub(crate) async fn aggregate(&self, request: AggregateObjectSetRequest) -> Result<AggregateResponse> {
		Ok(self.inner.backend.aggregate(request).await?)
	}
}
