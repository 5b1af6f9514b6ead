//! Short-lived cache in front of the persisted client configuration.

// self
use crate::{
	_prelude::*,
	config::{ClientConfig, ConfigSource},
	obs,
};

/// Keeps the persisted [`ClientConfig`] hot for a short TTL.
///
/// Reloads are single-flight. A failed reload keeps serving the last good configuration and
/// only surfaces the error when nothing has ever been loaded.
pub struct ConfigCache {
	source: Arc<dyn ConfigSource>,
	ttl: Duration,
	state: RwLock<Option<CachedConfig>>,
	reload_guard: AsyncMutex<()>,
}
impl ConfigCache {
	/// Default lifetime of a loaded configuration.
	pub const DEFAULT_TTL: Duration = Duration::seconds(30);

	/// Creates an empty cache over the provided source.
	pub fn new(source: Arc<dyn ConfigSource>, ttl: Duration) -> Self {
		Self { source, ttl, state: RwLock::new(None), reload_guard: AsyncMutex::new(()) }
	}

	/// Returns the current configuration, reloading when the cached copy is stale.
	pub async fn current(&self) -> Result<Arc<ClientConfig>> {
		self.current_at(OffsetDateTime::now_utc()).await
	}

	/// Same as [`Self::current`] but evaluated at the provided instant.
	pub async fn current_at(&self, now: OffsetDateTime) -> Result<Arc<ClientConfig>> {
		if let Some(config) = self.fresh(now) {
			return Ok(config);
		}

		let _reload = self.reload_guard.lock().await;

		if let Some(config) = self.fresh(now) {
			return Ok(config);
		}

		let loaded = match self.source.load().await {
			Ok(config) => config.validate().map(|_| config).map_err(Error::from),
			Err(e) => Err(e.into()),
		};
		let mut state = self.state.write();

		match (loaded, state.as_mut()) {
			(Ok(config), Some(cached)) => {
				if *cached.config != config {
					cached.config = Arc::new(config);
					cached.generation += 1;

					obs::config_reloaded(cached.config.environment.as_str(), cached.generation);
				}

				cached.loaded_at = now;
				cached.stale = false;

				Ok(cached.config.clone())
			},
			(Ok(config), None) => {
				let config = Arc::new(config);

				obs::config_reloaded(config.environment.as_str(), 1);

				*state = Some(CachedConfig {
					config: config.clone(),
					loaded_at: now,
					generation: 1,
					stale: false,
				});

				Ok(config)
			},
			(Err(e), Some(cached)) => {
				obs::config_reload_failed(&e);

				cached.loaded_at = now;
				cached.stale = false;

				Ok(cached.config.clone())
			},
			(Err(e), None) => Err(e),
		}
	}

	/// Forces the next [`Self::current`] call to reload from the source.
	pub fn invalidate(&self) {
		if let Some(cached) = self.state.write().as_mut() {
			cached.stale = true;
		}
	}

	/// Number of distinct configurations observed so far.
	pub fn generation(&self) -> u64 {
		self.state.read().as_ref().map(|cached| cached.generation).unwrap_or(0)
	}

	fn fresh(&self, now: OffsetDateTime) -> Option<Arc<ClientConfig>> {
		let state = self.state.read();
		let cached = state.as_ref()?;

		(!cached.stale && now - cached.loaded_at < self.ttl).then(|| cached.config.clone())
	}
}
impl Debug for ConfigCache {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("ConfigCache")
			.field("ttl", &self.ttl)
			.field("generation", &self.generation())
			.finish()
	}
}

struct CachedConfig {
	config: Arc<ClientConfig>,
	loaded_at: OffsetDateTime,
	generation: u64,
	stale: bool,
}
