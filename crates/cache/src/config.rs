use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_DEDUPE_INTERVAL_MS: u64 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
	/// Revalidations of a key within this many milliseconds of its previous fetch start return
	/// the current result instead of fetching again.
	pub dedupe_interval_ms: u64,
}

impl CacheConfig {
	#[must_use]
	pub const fn dedupe_interval(&self) -> Duration {
		Duration::from_millis(self.dedupe_interval_ms)
	}

	#[must_use]
	pub const fn with_dedupe_interval(self, interval: Duration) -> Self {
		#[allow(clippy::cast_possible_truncation)]
		Self {
			dedupe_interval_ms: interval.as_millis() as u64,
		}
	}
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			dedupe_interval_ms: DEFAULT_DEDUPE_INTERVAL_MS,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_when_missing() {
		let config = toml::from_str::<CacheConfig>("").unwrap();
		assert_eq!(config.dedupe_interval(), Duration::from_secs(2));

		let config = toml::from_str::<CacheConfig>("dedupe_interval_ms = 50").unwrap();
		assert_eq!(config.dedupe_interval(), Duration::from_millis(50));
	}
}
