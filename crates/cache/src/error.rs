use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError<E> {
	#[error("no fetcher registered for cache key '{0}'")]
	NotRegistered(String),
	#[error(transparent)]
	Fetch(E),
}
