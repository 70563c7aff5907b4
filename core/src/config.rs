use osdk_cache::CacheConfig;

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use super::error::{Error, Result};

pub const DEFAULT_SUBSCRIPTION_BUFFER: usize = 64;

/// Client settings. Every field has a default, so an empty document is a valid configuration.
///
/// ```toml
/// default_page_size = 500
///
/// [cache]
/// dedupe_interval_ms = 1000
///
/// [subscription]
/// buffer = 128
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
	pub cache: CacheConfig,
	/// Page size sent when a fetch does not ask for one. `None` leaves it to the backend.
	pub default_page_size: Option<u32>,
	pub subscription: SubscriptionConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
	/// Updates a subscription can queue before it stops reading the change feed.
	pub buffer: usize,
}

impl Default for SubscriptionConfig {
	fn default() -> Self {
		Self {
			buffer: DEFAULT_SUBSCRIPTION_BUFFER,
		}
	}
}

impl ClientConfig {
	pub fn from_toml_str(contents: &str) -> Result<Self> {
		let config = toml::from_str::<Self>(contents).map_err(|e| Error::Config(e.to_string()))?;

		if config.subscription.buffer == 0 {
			return Err(Error::Config(
				"subscription.buffer must be greater than zero".to_string(),
			));
		}

		Ok(config)
	}

	pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let contents = fs::read_to_string(path)
			.await
			.map_err(|e| Error::Config(format!("failed to read '{}': {e}", path.display())))?;

		let config = Self::from_toml_str(&contents)?;
		debug!(path = %path.display(), ?config, "loaded client configuration");

		Ok(config)
	}
}
