//! Batches edits issued close together into single backend calls.
//!
//! Edits posted within one scheduling tick go out as one batch in submission order. While a
//! batch is in flight, new edits queue up and form the next batch, which is dispatched once the
//! in-flight one resolves.

use osdk_cache::ObservableCache;
use osdk_wire::{Backend, TransactionEdit};

use std::{collections::BTreeSet, future::Future, mem, sync::Arc};

use parking_lot::Mutex;
use tokio::{
	sync::{oneshot, Mutex as AsyncMutex},
	task,
	time::Instant,
};
use tracing::{debug, warn, Instrument};

use super::{
	error::{Error, Result},
	page::Page,
};

type Waiter = oneshot::Sender<Result<()>>;

#[derive(Default)]
struct Pending {
	edits: Vec<(TransactionEdit, Waiter)>,
	/// A drain task has been spawned and has not taken the queue yet.
	scheduled: bool,
}

struct Inner {
	backend: Arc<dyn Backend>,
	cache: ObservableCache<Page, Error>,
	pending: Mutex<Pending>,
	/// Held for the duration of a backend call, so at most one batch is in flight.
	in_flight: AsyncMutex<()>,
}

#[derive(Clone)]
pub(crate) struct EditBatcher {
	inner: Arc<Inner>,
}

impl EditBatcher {
	pub fn new(backend: Arc<dyn Backend>, cache: ObservableCache<Page, Error>) -> Self {
		Self {
			inner: Arc::new(Inner {
				backend,
				cache,
				pending: Mutex::new(Pending::default()),
				in_flight: AsyncMutex::new(()),
			}),
		}
	}

	/// Queues `edit` immediately. The returned future resolves with the outcome of the batch it
	/// ends up in and does not need to be polled for the edit to be sent.
	///
	/// The batch is cut after the drain task yields once. On a current-thread runtime that holds
	/// every edit the calling task posts before its next await. On a multi-thread runtime the
	/// drain task may run on another worker and cut the batch early, so edits posted back to back
	/// can be split across batches, still in submission order.
	pub fn post_edit(&self, edit: TransactionEdit) -> impl Future<Output = Result<()>> + Send + 'static {
		let (tx, rx) = oneshot::channel();

		let schedule = {
			let mut pending = self.inner.pending.lock();
			pending.edits.push((edit, tx));
			!mem::replace(&mut pending.scheduled, true)
		};

		if schedule {
			let inner = Arc::clone(&self.inner);
			tokio::spawn(async move {
				// Let the rest of the current tick enqueue before the batch is cut.
				task::yield_now().await;
				// Waiters receive the outcome.
				let _ = inner.dispatch().await;
			}
			.in_current_span());
		}

		async move { rx.await.map_err(|_| Error::EditBatchDropped)? }
	}

	/// Waits for the batch in flight, then sends everything still queued.
	pub async fn flush(&self) -> Result<()> {
		self.inner.dispatch().await
	}

	pub fn pending_len(&self) -> usize {
		self.inner.pending.lock().edits.len()
	}
}

impl Inner {
	async fn dispatch(&self) -> Result<()> {
		let _in_flight = self.in_flight.lock().await;

		let batch = {
			let mut pending = self.pending.lock();
			pending.scheduled = false;
			mem::take(&mut pending.edits)
		};

		if batch.is_empty() {
			return Ok(());
		}

		let (edits, waiters): (Vec<_>, Vec<_>) = batch.into_iter().unzip();
		let edited_types = edits
			.iter()
			.map(|edit| edit.object_type().to_string())
			.collect::<BTreeSet<_>>();

		let batch_size = edits.len();
		let started = Instant::now();
		debug!(batch_size, "dispatching edit batch");

		let result = self.backend.post_edits(edits).await.map_err(Error::from);

		let duration_ms = started.elapsed().as_millis();
		match &result {
			Ok(()) => {
				debug!(batch_size, duration_ms, "edit batch applied");
				for object_type in &edited_types {
					self.cache.invalidate_object_type(object_type);
				}
			}
			Err(e) => warn!(batch_size, duration_ms, %e, "edit batch rejected"),
		}

		for waiter in waiters {
			// The caller may have dropped the future.
			let _ = waiter.send(result.clone());
		}

		result
	}
}
