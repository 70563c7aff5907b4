use std::{
	collections::{BTreeSet, HashMap},
	fmt,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc, Weak,
	},
};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::{runtime::Handle, time::Instant};
use tracing::{debug, trace, warn, Instrument};

use super::{
	config::CacheConfig,
	entry::{CacheEntry, CacheStatus, CacheValue, OptimisticId},
	error::CacheError,
};

/// Produces a fresh request for one key. Called once per backend fetch.
pub type Fetcher<T, E> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// Invoked with the new snapshot every time a key's entry changes.
pub type Listener<T, E> = Arc<dyn Fn(&CacheEntry<T, E>) + Send + Sync>;

type SharedFetch<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

struct InFlight<T, E> {
	generation: u64,
	fetch: SharedFetch<T, E>,
}

struct Slot<T, E> {
	truth: CacheEntry<T, E>,
	optimistic: Vec<(OptimisticId, T)>,
	listeners: HashMap<u64, Listener<T, E>>,
	fetcher: Option<Fetcher<T, E>>,
	dependencies: BTreeSet<String>,
	in_flight: Option<InFlight<T, E>>,
	last_fetch_started: Option<Instant>,
	// Bumped on every invalidation; fetches started under an older generation are discarded.
	generation: u64,
}

impl<T: CacheValue, E: Clone> Slot<T, E> {
	fn new(key: &str) -> Self {
		Self {
			truth: CacheEntry::new(key.to_string()),
			optimistic: Vec::new(),
			listeners: HashMap::new(),
			fetcher: None,
			dependencies: BTreeSet::new(),
			in_flight: None,
			last_fetch_started: None,
			generation: 0,
		}
	}

	fn snapshot(&self) -> CacheEntry<T, E> {
		let mut entry = self.truth.clone();
		if let Some((_, value)) = self.optimistic.last() {
			entry.size = value.size();
			entry.data = Some(value.clone());
			entry.is_optimistic = true;
		}
		entry
	}

	fn current_result(&self) -> Option<Result<T, E>> {
		match (&self.truth.status, &self.truth.data, &self.truth.error) {
			(CacheStatus::Error, _, Some(error)) => Some(Err(error.clone())),
			(_, Some(data), _) => Some(Ok(data.clone())),
			_ => None,
		}
	}

	fn notification(&self) -> Option<Notification<T, E>> {
		(!self.listeners.is_empty()).then(|| Notification {
			listeners: self.listeners.values().cloned().collect(),
			entry: self.snapshot(),
		})
	}
}

/// Listeners collected under the lock, invoked after it is released.
struct Notification<T, E> {
	listeners: Vec<Listener<T, E>>,
	entry: CacheEntry<T, E>,
}

impl<T, E> Notification<T, E> {
	fn send(self) {
		for listener in &self.listeners {
			listener(&self.entry);
		}
	}
}

fn send_all<T, E>(notifications: Vec<Notification<T, E>>) {
	notifications.into_iter().for_each(Notification::send);
}

/// Runs started fetches to completion on the current runtime. Without one they stay in flight
/// unpolled and the next reader of each key drives its fetch.
fn drive<T, E>(fetches: Vec<SharedFetch<T, E>>)
where
	T: Clone + Send + Sync + 'static,
	E: Clone + Send + Sync + 'static,
{
	if fetches.is_empty() {
		return;
	}

	match Handle::try_current() {
		Ok(handle) => {
			for fetch in fetches {
				handle.spawn(fetch);
			}
		}
		Err(_) => debug!(count = fetches.len(), "no runtime, refetches left to the next reader"),
	}
}

struct Inner<T, E> {
	config: CacheConfig,
	slots: Mutex<HashMap<String, Slot<T, E>>>,
	next_listener_id: AtomicU64,
}

impl<T: CacheValue, E: Clone + Send + Sync + 'static> Inner<T, E> {
	fn complete(&self, key: &str, generation: u64, result: &Result<T, E>, started: Instant) {
		let notification = {
			let mut slots = self.slots.lock();
			let Some(slot) = slots.get_mut(key) else {
				return;
			};

			if slot
				.in_flight
				.as_ref()
				.is_some_and(|in_flight| in_flight.generation == generation)
			{
				slot.in_flight = None;
			}

			if slot.generation != generation {
				debug!(
					cache_key = key,
					generation,
					current_generation = slot.generation,
					"discarding result of superseded fetch"
				);
				return;
			}

			match result {
				Ok(data) => {
					slot.truth.load(data.clone());
					slot.optimistic.clear();
				}
				Err(error) => slot.truth.fail(error.clone()),
			}

			debug!(
				cache_key = key,
				duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
				status = ?slot.truth.status,
				"fetch completed"
			);

			slot.notification()
		};

		if let Some(notification) = notification {
			notification.send();
		}
	}
}

enum Revalidation<T, E> {
	Ready(Result<T, CacheError<E>>),
	Joined(SharedFetch<T, E>),
	Started(SharedFetch<T, E>),
}

/// Shared handle to the cache. Cloning is cheap and every clone sees the same entries.
///
/// Operations that may start a fetch spawn it on the ambient tokio runtime, so fetches complete
/// and populate the cache even when nobody awaits them.
pub struct ObservableCache<T, E> {
	inner: Arc<Inner<T, E>>,
}

impl<T, E> Clone for ObservableCache<T, E> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T, E> fmt::Debug for ObservableCache<T, E> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ObservableCache")
			.field("config", &self.inner.config)
			.field("len", &self.inner.slots.lock().len())
			.finish()
	}
}

impl<T: CacheValue, E: Clone + Send + Sync + 'static> ObservableCache<T, E> {
	#[must_use]
	pub fn new(config: CacheConfig) -> Self {
		Self {
			inner: Arc::new(Inner {
				config,
				slots: Mutex::new(HashMap::new()),
				next_listener_id: AtomicU64::new(0),
			}),
		}
	}

	#[must_use]
	pub fn config(&self) -> CacheConfig {
		self.inner.config
	}

	/// Current snapshot of `key`, counting as a hit.
	pub fn get(&self, key: &str) -> Option<CacheEntry<T, E>> {
		let mut slots = self.inner.slots.lock();
		let slot = slots.get_mut(key)?;
		slot.truth.hit_count += 1;
		Some(slot.snapshot())
	}

	/// Like [`get`](Self::get) without touching the hit counter.
	pub fn peek(&self, key: &str) -> Option<CacheEntry<T, E>> {
		self.inner.slots.lock().get(key).map(Slot::snapshot)
	}

	/// Replaces the stored value and notifies subscribers before returning.
	pub fn set(&self, key: &str, value: T) {
		let notification = {
			let mut slots = self.inner.slots.lock();
			let slot = slots
				.entry(key.to_string())
				.or_insert_with(|| Slot::new(key));
			slot.truth.load(value);
			slot.optimistic.clear();
			slot.notification()
		};

		if let Some(notification) = notification {
			notification.send();
		}
	}

	pub fn subscribe(
		&self,
		key: &str,
		listener: impl Fn(&CacheEntry<T, E>) + Send + Sync + 'static,
	) -> Subscription {
		let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);

		self.inner
			.slots
			.lock()
			.entry(key.to_string())
			.or_insert_with(|| Slot::new(key))
			.listeners
			.insert(id, Arc::new(listener));

		let inner = Arc::downgrade(&self.inner);
		let owned_key = key.to_string();

		Subscription {
			key: key.to_string(),
			cancel: Some(Box::new(move || unsubscribe(&inner, &owned_key, id))),
		}
	}

	/// Sets the fetcher and dependency set used by later revalidations of `key`.
	pub fn register(
		&self,
		key: &str,
		fetcher: Fetcher<T, E>,
		dependencies: impl IntoIterator<Item = String>,
	) {
		let mut slots = self.inner.slots.lock();
		let slot = slots
			.entry(key.to_string())
			.or_insert_with(|| Slot::new(key));
		slot.fetcher = Some(fetcher);
		slot.dependencies = dependencies.into_iter().collect();
	}

	/// Returns the loaded value of `key` or fetches it.
	pub async fn fetch(
		&self,
		key: &str,
		fetcher: Fetcher<T, E>,
		dependencies: impl IntoIterator<Item = String> + Send,
	) -> Result<T, CacheError<E>> {
		self.register(key, fetcher, dependencies);
		self.load(key).await
	}

	async fn load(&self, key: &str) -> Result<T, CacheError<E>> {
		if let Some(data) = self.loaded(key) {
			trace!(cache_key = key, "cache hit");
			return Ok(data);
		}

		debug!(cache_key = key, "cache miss");
		self.revalidate(key, false).await
	}

	fn loaded(&self, key: &str) -> Option<T> {
		let mut slots = self.inner.slots.lock();
		let slot = slots.get_mut(key)?;
		if slot.truth.status != CacheStatus::Loaded || slot.in_flight.is_some() {
			return None;
		}
		slot.truth.hit_count += 1;
		slot.snapshot().data
	}

	/// Refetches `key`.
	///
	/// Joins a fetch already in flight for the current generation. Unless `force` is set, a
	/// call within the dedupe window of the previous fetch start returns the current result.
	pub async fn revalidate(&self, key: &str, force: bool) -> Result<T, CacheError<E>> {
		let (revalidation, notification) = self.begin_revalidation(key, force);

		if let Some(notification) = notification {
			notification.send();
		}

		let fetch = match revalidation {
			Revalidation::Ready(result) => return result,
			Revalidation::Joined(fetch) => fetch,
			Revalidation::Started(fetch) => {
				drive(vec![fetch.clone()]);
				fetch
			}
		};
		fetch.await.map_err(CacheError::Fetch)
	}

	fn begin_revalidation(
		&self,
		key: &str,
		force: bool,
	) -> (Revalidation<T, E>, Option<Notification<T, E>>) {
		let mut slots = self.inner.slots.lock();
		let Some((slot, fetcher)) = slots
			.get_mut(key)
			.and_then(|slot| slot.fetcher.clone().map(|fetcher| (slot, fetcher)))
		else {
			return (
				Revalidation::Ready(Err(CacheError::NotRegistered(key.to_string()))),
				None,
			);
		};

		if let Some(in_flight) = &slot.in_flight {
			if in_flight.generation == slot.generation {
				trace!(cache_key = key, "joining in flight fetch");
				return (Revalidation::Joined(in_flight.fetch.clone()), None);
			}
		} else if !force {
			let within_window = slot.last_fetch_started.is_some_and(|started| {
				started.elapsed() < self.inner.config.dedupe_interval()
			});

			if within_window {
				if let Some(result) = slot.current_result() {
					trace!(cache_key = key, "revalidation deduped");
					return (
						Revalidation::Ready(result.map_err(CacheError::Fetch)),
						None,
					);
				}
			}
		}

		let fetch = self.start_fetch(key, slot, fetcher);
		(Revalidation::Started(fetch), slot.notification())
	}

	/// Records a new fetch for `key` as in flight. The caller spawns it once the slot lock is
	/// released.
	fn start_fetch(
		&self,
		key: &str,
		slot: &mut Slot<T, E>,
		fetcher: Fetcher<T, E>,
	) -> SharedFetch<T, E> {
		let generation = slot.generation;
		let started = Instant::now();
		let inner = Arc::downgrade(&self.inner);
		let owned_key = key.to_string();

		let fetch = async move {
			let result = fetcher().await;
			if let Some(inner) = inner.upgrade() {
				inner.complete(&owned_key, generation, &result, started);
			}
			result
		}
		.boxed()
		.shared();

		slot.in_flight = Some(InFlight {
			generation,
			fetch: fetch.clone(),
		});
		slot.last_fetch_started = Some(started);
		slot.truth.status = CacheStatus::Loading;

		debug!(cache_key = key, generation, "starting fetch");

		fetch
	}

	/// Marks `key` stale and starts a refetch if it has a fetcher. Returns `false` for unknown
	/// keys.
	///
	/// Refetches run on the current Tokio runtime. Called outside one, the refetch is left in
	/// flight and runs when `key` is next read.
	pub fn invalidate(&self, key: &str) -> bool {
		self.invalidate_where(|slot_key, _| slot_key == key) > 0
	}

	pub fn invalidate_all(&self) -> usize {
		self.invalidate_where(|_, _| true)
	}

	pub fn invalidate_by_pattern(&self, predicate: impl Fn(&str) -> bool) -> usize {
		self.invalidate_where(|key, _| predicate(key))
	}

	/// Invalidates every entry whose dependency set contains `object_type`.
	pub fn invalidate_object_type(&self, object_type: &str) -> usize {
		let count =
			self.invalidate_where(|_, dependencies| dependencies.contains(object_type));
		debug!(object_type, count, "invalidated entries for object type");
		count
	}

	fn invalidate_where(&self, predicate: impl Fn(&str, &BTreeSet<String>) -> bool) -> usize {
		let mut notifications = Vec::new();
		let mut fetches = Vec::new();
		let mut count = 0;

		{
			let mut slots = self.inner.slots.lock();
			for (key, slot) in slots.iter_mut() {
				if !predicate(key, &slot.dependencies) {
					continue;
				}

				count += 1;
				slot.generation += 1;

				let Some(fetcher) = slot.fetcher.clone() else {
					trace!(cache_key = %key, "invalidated entry without fetcher");
					continue;
				};

				fetches.push(self.start_fetch(key, slot, fetcher));
				notifications.extend(slot.notification());
			}
		}

		drive(fetches);
		send_all(notifications);
		count
	}

	/// Layers `value` over the stored data of `key` until the next successful load or until
	/// [`remove_optimistic`](Self::remove_optimistic) is called with the same id.
	pub fn set_optimistic(&self, key: &str, id: OptimisticId, value: T) {
		let notification = {
			let mut slots = self.inner.slots.lock();
			let slot = slots
				.entry(key.to_string())
				.or_insert_with(|| Slot::new(key));

			slot.optimistic.retain(|(layer, _)| *layer != id);
			slot.optimistic.push((id, value));
			slot.notification()
		};

		if let Some(notification) = notification {
			notification.send();
		}
	}

	pub fn remove_optimistic(&self, id: OptimisticId) {
		let mut notifications = Vec::new();

		{
			let mut slots = self.inner.slots.lock();
			for slot in slots.values_mut() {
				let before = slot.optimistic.len();
				slot.optimistic.retain(|(layer, _)| *layer != id);
				if slot.optimistic.len() != before {
					notifications.extend(slot.notification());
				}
			}
		}

		send_all(notifications);
	}

	/// Loads `key` in the background. Failures are logged and dropped.
	///
	/// Must be called within a Tokio runtime.
	pub fn prefetch(
		&self,
		key: &str,
		fetcher: Fetcher<T, E>,
		dependencies: impl IntoIterator<Item = String>,
	) where
		E: fmt::Display,
	{
		self.register(key, fetcher, dependencies);

		let cache = self.clone();
		let key = key.to_string();
		tokio::spawn(async move {
			if let Err(e) = cache.load(&key).await {
				warn!(cache_key = %key, %e, "prefetch failed");
			}
		}
		.in_current_span());
	}

	pub fn evict(&self, key: &str) -> bool {
		self.inner.slots.lock().remove(key).is_some()
	}

	/// Drops every entry with no subscribers and no fetch in flight.
	pub fn evict_unsubscribed(&self) -> usize {
		let mut slots = self.inner.slots.lock();
		let before = slots.len();
		slots.retain(|_, slot| !slot.listeners.is_empty() || slot.in_flight.is_some());
		before - slots.len()
	}

	#[must_use]
	pub fn dependencies(&self, key: &str) -> Option<BTreeSet<String>> {
		self.inner
			.slots
			.lock()
			.get(key)
			.map(|slot| slot.dependencies.clone())
	}

	#[must_use]
	pub fn subscriber_count(&self, key: &str) -> usize {
		self.inner
			.slots
			.lock()
			.get(key)
			.map_or(0, |slot| slot.listeners.len())
	}

	#[must_use]
	pub fn keys(&self) -> Vec<String> {
		self.inner.slots.lock().keys().cloned().collect()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.inner.slots.lock().len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

fn unsubscribe<T, E>(inner: &Weak<Inner<T, E>>, key: &str, id: u64) {
	if let Some(inner) = inner.upgrade() {
		if let Some(slot) = inner.slots.lock().get_mut(key) {
			slot.listeners.remove(&id);
		}
	}
}

/// Keeps a listener registered. Dropping it unsubscribes.
pub struct Subscription {
	key: String,
	cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
	#[must_use]
	pub fn key(&self) -> &str {
		&self.key
	}

	pub fn unsubscribe(mut self) {
		if let Some(cancel) = self.cancel.take() {
			cancel();
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(cancel) = self.cancel.take() {
			cancel();
		}
	}
}

impl fmt::Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription")
			.field("key", &self.key)
			.finish_non_exhaustive()
	}
}
