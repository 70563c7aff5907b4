use osdk_cache::{
	CacheConfig, CacheError, CacheStatus, CacheValue, Fetcher, ObservableCache, OptimisticId,
};

use std::{
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	},
	time::Duration,
};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::time::sleep;
use tracing_test::traced_test;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Count(usize);

impl CacheValue for Count {}

type TestCache = ObservableCache<Count, String>;

fn cache() -> TestCache {
	ObservableCache::new(CacheConfig::default())
}

fn counting(calls: &Arc<AtomicUsize>, delay: Duration) -> Fetcher<Count, String> {
	slow_counting(calls, delay, &[])
}

/// Returns the call number after sleeping; calls listed in `slow` sleep ten times longer.
fn slow_counting(
	calls: &Arc<AtomicUsize>,
	delay: Duration,
	slow: &'static [usize],
) -> Fetcher<Count, String> {
	let calls = Arc::clone(calls);
	Arc::new(move || {
		let calls = Arc::clone(&calls);
		async move {
			let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
			let delay = if slow.contains(&n) { delay * 10 } else { delay };
			sleep(delay).await;
			Ok(Count(n))
		}
		.boxed()
	})
}

fn failing(calls: &Arc<AtomicUsize>) -> Fetcher<Count, String> {
	let calls = Arc::clone(calls);
	Arc::new(move || {
		calls.fetch_add(1, Ordering::SeqCst);
		async { Err("boom".to_string()) }.boxed()
	})
}

#[tokio::test(start_paused = true)]
async fn coalesces_concurrent_revalidations() {
	let cache = cache();
	let calls = Arc::new(AtomicUsize::new(0));
	cache.register("k", counting(&calls, Duration::from_millis(10)), []);

	let (a, b) = tokio::join!(cache.revalidate("k", false), cache.revalidate("k", false));

	assert_eq!(a, Ok(Count(1)));
	assert_eq!(b, Ok(Count(1)));
	assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn dedupes_within_window_only() {
	let cache = cache();
	let calls = Arc::new(AtomicUsize::new(0));
	cache.register("k", counting(&calls, Duration::from_millis(10)), []);

	assert_eq!(cache.revalidate("k", false).await, Ok(Count(1)));
	assert_eq!(cache.revalidate("k", false).await, Ok(Count(1)));
	assert_eq!(calls.load(Ordering::SeqCst), 1);

	tokio::time::advance(Duration::from_millis(2000)).await;

	assert_eq!(cache.revalidate("k", false).await, Ok(Count(2)));
	assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn force_bypasses_window() {
	let cache = cache();
	let calls = Arc::new(AtomicUsize::new(0));
	cache.register("k", counting(&calls, Duration::from_millis(10)), []);

	cache.revalidate("k", false).await.unwrap();
	assert_eq!(cache.revalidate("k", true).await, Ok(Count(2)));
}

#[tokio::test(start_paused = true)]
async fn fetch_hits_after_load() {
	let cache = cache();
	let calls = Arc::new(AtomicUsize::new(0));

	let first = cache
		.fetch("k", counting(&calls, Duration::from_millis(10)), ["Employee".to_string()])
		.await;
	let second = cache
		.fetch("k", counting(&calls, Duration::from_millis(10)), ["Employee".to_string()])
		.await;

	assert_eq!(first, Ok(Count(1)));
	assert_eq!(second, Ok(Count(1)));
	assert_eq!(calls.load(Ordering::SeqCst), 1);

	let entry = cache.peek("k").unwrap();
	assert_eq!(entry.status, CacheStatus::Loaded);
	assert_eq!(entry.hit_count, 1);
	assert_eq!(
		cache.dependencies("k").unwrap().into_iter().collect::<Vec<_>>(),
		["Employee"]
	);
}

#[tokio::test(start_paused = true)]
async fn invalidation_discards_superseded_fetch() {
	let cache = cache();
	let calls = Arc::new(AtomicUsize::new(0));
	// The first fetch takes 100ms, the one started by the invalidation only 10ms.
	cache.register("k", slow_counting(&calls, Duration::from_millis(10), &[1]), []);

	let first = tokio::spawn({
		let cache = cache.clone();
		async move { cache.revalidate("k", false).await }
	});
	sleep(Duration::from_millis(1)).await;

	assert!(cache.invalidate("k"));
	assert_eq!(cache.revalidate("k", false).await, Ok(Count(2)));

	// The older fetch still resolves for whoever awaited it, but must not overwrite the entry.
	assert_eq!(first.await.unwrap(), Ok(Count(1)));
	assert_eq!(cache.peek("k").unwrap().data, Some(Count(2)));
	assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn invalidate_object_type_only_touches_dependents() {
	let cache = cache();
	let calls = Arc::new(AtomicUsize::new(0));

	cache
		.fetch("employees", counting(&calls, Duration::from_millis(1)), ["Employee".to_string()])
		.await
		.unwrap();
	cache
		.fetch("offices", counting(&calls, Duration::from_millis(1)), ["Office".to_string()])
		.await
		.unwrap();
	assert_eq!(calls.load(Ordering::SeqCst), 2);

	assert_eq!(cache.invalidate_object_type("Office"), 1);
	sleep(Duration::from_millis(5)).await;

	assert_eq!(calls.load(Ordering::SeqCst), 3);
	assert_eq!(cache.peek("offices").unwrap().data, Some(Count(3)));
	assert_eq!(cache.peek("employees").unwrap().data, Some(Count(1)));
}

#[tokio::test(start_paused = true)]
async fn invalidate_by_pattern_and_all() {
	let cache = cache();
	let calls = Arc::new(AtomicUsize::new(0));

	for key in ["list:a", "list:b", "object:a"] {
		cache
			.fetch(key, counting(&calls, Duration::from_millis(1)), [])
			.await
			.unwrap();
	}

	assert_eq!(cache.invalidate_by_pattern(|key| key.starts_with("list:")), 2);
	assert_eq!(cache.invalidate_all(), 3);
	assert!(!cache.invalidate("missing"));
}

#[test]
fn set_notifies_subscribers_synchronously() {
	let cache = cache();
	let seen = Arc::new(Mutex::new(Vec::new()));

	let subscription = cache.subscribe("k", {
		let seen = Arc::clone(&seen);
		move |entry| seen.lock().push(entry.data.clone())
	});
	assert_eq!(cache.subscriber_count("k"), 1);

	cache.set("k", Count(7));
	assert_eq!(*seen.lock(), [Some(Count(7))]);

	subscription.unsubscribe();
	cache.set("k", Count(8));
	assert_eq!(seen.lock().len(), 1);
	assert_eq!(cache.subscriber_count("k"), 0);
}

#[test]
fn dropping_subscription_unsubscribes() {
	let cache = cache();
	{
		let _subscription = cache.subscribe("k", |_| {});
		assert_eq!(cache.subscriber_count("k"), 1);
	}
	assert_eq!(cache.subscriber_count("k"), 0);
}

#[tokio::test(start_paused = true)]
async fn subscribers_see_loading_then_loaded() {
	let cache = cache();
	let calls = Arc::new(AtomicUsize::new(0));
	let statuses = Arc::new(Mutex::new(Vec::new()));

	let _subscription = cache.subscribe("k", {
		let statuses = Arc::clone(&statuses);
		move |entry| statuses.lock().push(entry.status)
	});
	cache.register("k", counting(&calls, Duration::from_millis(1)), []);
	cache.revalidate("k", false).await.unwrap();

	assert_eq!(*statuses.lock(), [CacheStatus::Loading, CacheStatus::Loaded]);
}

#[tokio::test(start_paused = true)]
async fn optimistic_layers_until_next_load() {
	let cache = cache();
	let calls = Arc::new(AtomicUsize::new(0));
	cache.register("k", counting(&calls, Duration::from_millis(1)), []);
	cache.revalidate("k", false).await.unwrap();

	let id = OptimisticId::new();
	cache.set_optimistic("k", id, Count(42));
	let entry = cache.peek("k").unwrap();
	assert_eq!(entry.data, Some(Count(42)));
	assert!(entry.is_optimistic);

	cache.remove_optimistic(id);
	let entry = cache.peek("k").unwrap();
	assert_eq!(entry.data, Some(Count(1)));
	assert!(!entry.is_optimistic);

	cache.set_optimistic("k", OptimisticId::new(), Count(42));
	cache.revalidate("k", true).await.unwrap();
	let entry = cache.peek("k").unwrap();
	assert_eq!(entry.data, Some(Count(2)));
	assert!(!entry.is_optimistic);
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn prefetch_swallows_errors() {
	let cache = cache();
	let calls = Arc::new(AtomicUsize::new(0));

	cache.prefetch("k", failing(&calls), []);
	sleep(Duration::from_millis(1)).await;

	assert_eq!(calls.load(Ordering::SeqCst), 1);
	let entry = cache.peek("k").unwrap();
	assert_eq!(entry.status, CacheStatus::Error);
	assert_eq!(entry.error.as_deref(), Some("boom"));
	assert!(logs_contain("prefetch failed"));
}

#[tokio::test(start_paused = true)]
async fn prefetch_populates_without_consumer() {
	let cache = cache();
	let calls = Arc::new(AtomicUsize::new(0));

	cache.prefetch("k", counting(&calls, Duration::from_millis(10)), []);
	sleep(Duration::from_millis(20)).await;

	assert_eq!(cache.peek("k").unwrap().data, Some(Count(1)));
}

#[tokio::test]
async fn unregistered_key_errors() {
	let cache = cache();

	assert_eq!(
		cache.revalidate("nope", false).await,
		Err(CacheError::NotRegistered("nope".to_string()))
	);
}

#[tokio::test(start_paused = true)]
async fn evicts_unsubscribed_entries() {
	let cache = cache();
	let calls = Arc::new(AtomicUsize::new(0));

	cache
		.fetch("a", counting(&calls, Duration::from_millis(1)), [])
		.await
		.unwrap();
	let _subscription = cache.subscribe("b", |_| {});

	assert_eq!(cache.evict_unsubscribed(), 1);
	assert_eq!(cache.keys(), ["b"]);
	assert!(cache.evict("b"));
	assert!(cache.is_empty());
}

#[test]
fn get_counts_hits() {
	let cache = cache();
	cache.set("k", Count(1));

	cache.get("k");
	cache.get("k");
	assert_eq!(cache.peek("k").unwrap().hit_count, 2);
}

#[test]
fn invalidation_outside_a_runtime_defers_the_refetch() {
	let cache = cache();
	let calls = Arc::new(AtomicUsize::new(0));
	cache.register(
		"k",
		counting(&calls, Duration::from_millis(1)),
		["Employee".to_string()],
	);
	cache.set("k", Count(0));

	assert_eq!(cache.invalidate_object_type("Employee"), 1);
	assert!(cache.invalidate("k"));
	assert_eq!(cache.peek("k").unwrap().status, CacheStatus::Loading);
	assert_eq!(calls.load(Ordering::SeqCst), 0);

	let runtime = tokio::runtime::Builder::new_current_thread()
		.enable_all()
		.build()
		.unwrap();
	assert_eq!(runtime.block_on(cache.revalidate("k", false)), Ok(Count(1)));
	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert_eq!(cache.peek("k").unwrap().status, CacheStatus::Loaded);
}
