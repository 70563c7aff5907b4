use osdk_ontology::Ontology;
use osdk_wire::{
	AggregateObjectSetRequest, AggregateResponse, Backend, BackendError, ChangeFeed,
	LoadObjectSetRequest, LoadObjectSetResponse, ObjectChange, TransactionEdit,
};

use std::{
	collections::VecDeque,
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tracing::{debug, trace};

use super::{
	aggregate::aggregate,
	evaluate::{evaluate, sort_objects},
	store::FauxDataStore,
};

const DEFAULT_PAGE_SIZE: usize = 1000;
const CHANGE_FEED_CAPACITY: usize = 256;

/// An in-memory stand-in for the ontology service.
///
/// Besides serving requests it records what it was asked so tests can assert on call counts,
/// and it can hold edit batches open to exercise in-flight behavior.
#[derive(Debug)]
pub struct FauxFoundry {
	store: Mutex<FauxDataStore>,
	changes: broadcast::Sender<ObjectChange>,
	load_requests: Mutex<Vec<LoadObjectSetRequest>>,
	aggregate_calls: AtomicUsize,
	edit_batches: Mutex<Vec<Vec<TransactionEdit>>>,
	started_batches: watch::Sender<usize>,
	edits_open: watch::Sender<bool>,
	load_failures: Mutex<VecDeque<BackendError>>,
}

impl FauxFoundry {
	#[must_use]
	pub fn new(ontology: Arc<Ontology>) -> Self {
		Self::from_store(FauxDataStore::new(ontology))
	}

	#[must_use]
	pub fn from_store(store: FauxDataStore) -> Self {
		let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
		Self {
			store: Mutex::new(store),
			changes,
			load_requests: Mutex::new(Vec::new()),
			aggregate_calls: AtomicUsize::new(0),
			edit_batches: Mutex::new(Vec::new()),
			started_batches: watch::Sender::new(0),
			edits_open: watch::Sender::new(true),
			load_failures: Mutex::new(VecDeque::new()),
		}
	}

	/// Runs `f` against the data store without notifying change feed subscribers.
	pub fn with_store<R>(&self, f: impl FnOnce(&mut FauxDataStore) -> R) -> R {
		f(&mut self.store.lock())
	}

	/// Applies edits all or nothing and broadcasts the resulting changes, as a successful batch
	/// would.
	pub fn apply(&self, edits: &[TransactionEdit]) -> Result<(), BackendError> {
		let changes = {
			let mut store = self.store.lock();
			let mut staged = store.clone();
			let changes = edits
				.iter()
				.map(|edit| staged.apply_edit(edit))
				.collect::<Result<Vec<_>, _>>()?;
			*store = staged;
			changes
		};

		for change in changes {
			self.emit(change);
		}

		Ok(())
	}

	pub fn emit(&self, change: ObjectChange) {
		// No receivers is fine.
		let _ = self.changes.send(change);
	}

	#[must_use]
	pub fn load_calls(&self) -> usize {
		self.load_requests.lock().len()
	}

	#[must_use]
	pub fn load_requests(&self) -> Vec<LoadObjectSetRequest> {
		self.load_requests.lock().clone()
	}

	#[must_use]
	pub fn aggregate_calls(&self) -> usize {
		self.aggregate_calls.load(Ordering::SeqCst)
	}

	/// Edit batches in the order they reached the backend.
	#[must_use]
	pub fn edit_batches(&self) -> Vec<Vec<TransactionEdit>> {
		self.edit_batches.lock().clone()
	}

	/// The next `load_objects` call fails with `error`.
	pub fn fail_next_load(&self, error: BackendError) {
		self.load_failures.lock().push_back(error);
	}

	/// Edit batches received from now on wait in flight until [`resume_edits`](Self::resume_edits).
	pub fn pause_edits(&self) {
		self.edits_open.send_replace(false);
	}

	pub fn resume_edits(&self) {
		self.edits_open.send_replace(true);
	}

	/// Waits until at least `count` edit batches have reached the backend.
	pub async fn wait_for_edit_batches(&self, count: usize) {
		let mut started = self.started_batches.subscribe();
		// The sender lives as long as `self`.
		let _ = started.wait_for(|started| *started >= count).await;
	}
}

#[async_trait]
impl Backend for FauxFoundry {
	async fn load_objects(
		&self,
		request: LoadObjectSetRequest,
	) -> Result<LoadObjectSetResponse, BackendError> {
		self.load_requests.lock().push(request.clone());

		if let Some(error) = self.load_failures.lock().pop_front() {
			debug!(error_name = %error.error_name, "failing load_objects on request");
			return Err(error);
		}

		let mut objects = evaluate(&self.store.lock(), &request.object_set, None)?;
		if let Some(order_by) = &request.order_by {
			sort_objects(&mut objects, order_by);
		}

		let offset = request
			.page_token
			.as_deref()
			.map(str::parse::<usize>)
			.transpose()
			.map_err(|_| BackendError::new(400, "InvalidPageToken", "page token is not an offset"))?
			.unwrap_or(0);
		let page_size = request
			.page_size
			.and_then(|size| usize::try_from(size).ok())
			.filter(|size| *size > 0)
			.unwrap_or(DEFAULT_PAGE_SIZE);

		let total_count = objects.len() as u64;
		let end = offset.saturating_add(page_size).min(objects.len());
		let next_page_token = (end < objects.len()).then(|| end.to_string());

		let data = objects
			.into_iter()
			.skip(offset)
			.take(page_size)
			.map(|mut object| {
				if !request.select.is_empty() {
					object.properties.retain(|name, _| request.select.contains(name));
				}
				if request.exclude_rid {
					object.rid = None;
				}
				object
			})
			.collect::<Vec<_>>();

		trace!(
			returned = data.len(),
			total_count,
			has_next = next_page_token.is_some(),
			"served load_objects"
		);

		Ok(LoadObjectSetResponse {
			data,
			next_page_token,
			total_count,
		})
	}

	async fn aggregate(
		&self,
		request: AggregateObjectSetRequest,
	) -> Result<AggregateResponse, BackendError> {
		self.aggregate_calls.fetch_add(1, Ordering::SeqCst);

		let objects = evaluate(&self.store.lock(), &request.object_set, None)?;
		aggregate(&objects, &request.aggregation, &request.group_by)
	}

	async fn post_edits(&self, edits: Vec<TransactionEdit>) -> Result<(), BackendError> {
		self.edit_batches.lock().push(edits.clone());
		self.started_batches.send_modify(|started| *started += 1);
		debug!(batch_size = edits.len(), "received edit batch");

		let mut open = self.edits_open.subscribe();
		// The sender lives as long as `self`.
		let _ = open.wait_for(|open| *open).await;

		self.apply(&edits)
	}
}

impl ChangeFeed for FauxFoundry {
	fn changes(&self) -> broadcast::Receiver<ObjectChange> {
		self.changes.subscribe()
	}
}
