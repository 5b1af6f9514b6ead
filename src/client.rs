//! High-level provider client that ties configuration, tokens, the dispatch queue, and the stores
//! together.
//!
//! [`ProviderClient`] owns one [`TokenManager`] and one [`RequestQueue`]; every outbound call is
//! persisted as a [`CallLog`](crate::calllog::CallLog) before it is dispatched so a crash never
//! loses work. The submodules add the call/retry machinery, typed provider operations, the
//! operator contract, and the background sweeper.

pub mod sweeper;

mod admin;
mod dispatch;
mod operations;

pub use dispatch::*;
pub use operations::*;
pub use sweeper::*;

// self
use crate::{
	_prelude::*,
	auth::TokenManager,
	config::{ClientConfig, ConfigCache, ConfigSource},
	http::ProviderHttpClient,
	queue::{HttpDispatcher, QueueLimits, RequestQueue},
	store::{AccountStore, CallLogStore, LedgerStore},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

#[cfg(feature = "reqwest")]
/// Client specialized for the crate's default reqwest transport.
pub type ReqwestProviderClient = ProviderClient<ReqwestHttpClient>;

/// Process-level knobs that are not part of the persisted configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientOptions {
	/// Jobs that may wait in the queue before submitters are backpressured.
	pub queue_capacity: usize,
	/// Lifetime of a loaded configuration before it is re-read.
	pub config_ttl: Duration,
	/// Upper bound on rows claimed by one sweep.
	pub sweep_batch_size: usize,
	/// Pause between background sweeps.
	pub sweep_interval: StdDuration,
	/// Age after which a `processing` claim is considered abandoned.
	///
	/// A call still waiting in the queue past this age can be claimed again by a sweep. The late
	/// attempt is then recorded in the history but no longer updates the row.
	pub processing_lease: Duration,
}
impl Default for ClientOptions {
	fn default() -> Self {
		Self {
			queue_capacity: RequestQueue::DEFAULT_CAPACITY,
			config_ttl: ConfigCache::DEFAULT_TTL,
			sweep_batch_size: 50,
			sweep_interval: StdDuration::from_secs(60),
			processing_lease: Duration::minutes(10),
		}
	}
}

/// Store handles used by the client.
#[derive(Clone)]
pub struct ClientStores {
	/// Call logs and retry history.
	pub call_logs: Arc<dyn CallLogStore>,
	/// Ledger transactions and account links.
	pub ledger: Arc<dyn LedgerStore>,
	/// Synced provider accounts.
	pub accounts: Arc<dyn AccountStore>,
}
impl ClientStores {
	/// Uses one backend for every contract.
	pub fn shared<S>(store: Arc<S>) -> Self
	where
		S: 'static + CallLogStore + LedgerStore + AccountStore,
	{
		Self { call_logs: store.clone(), ledger: store.clone(), accounts: store }
	}
}
impl Debug for ClientStores {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientStores").finish_non_exhaustive()
	}
}

/// Resilient client for the payment provider's REST API.
///
/// Cloning is cheap; clones share the token cache, the queue coordinator, and the stores.
pub struct ProviderClient<C>
where
	C: ?Sized + ProviderHttpClient,
{
	/// HTTP client wrapper used for every outbound provider request.
	pub http_client: Arc<C>,
	/// Token manager shared with the dispatcher.
	pub tokens: Arc<TokenManager<C>>,
	/// Persistence backends.
	pub stores: ClientStores,
	config: Arc<ConfigCache>,
	queue: RequestQueue,
	options: ClientOptions,
}
impl<C> ProviderClient<C>
where
	C: ?Sized + ProviderHttpClient,
{
	/// Creates a client over the caller-provided transport.
	///
	/// Spawns the queue coordinator, so it must be called from within a Tokio runtime.
	pub fn with_http_client(
		stores: ClientStores,
		config_source: Arc<dyn ConfigSource>,
		http_client: impl Into<Arc<C>>,
		options: ClientOptions,
	) -> Self {
		let http_client = http_client.into();
		let tokens = Arc::new(TokenManager::new(http_client.clone()));
		let dispatcher = Arc::new(HttpDispatcher::new(http_client.clone(), tokens.clone()));
		let queue =
			RequestQueue::spawn(dispatcher, QueueLimits::default(), options.queue_capacity);
		let config = Arc::new(ConfigCache::new(config_source, options.config_ttl));

		Self { http_client, tokens, stores, config, queue, options }
	}

	/// Returns the active configuration and applies its rate limits to the queue.
	pub async fn client_config(&self) -> Result<Arc<ClientConfig>> {
		let config = self.config.current().await?;

		self.queue.set_limits(config.queue_limits());

		Ok(config)
	}

	/// Forces the next call to reload the configuration.
	pub fn reload_config(&self) {
		self.config.invalidate();
	}

	/// The dispatch queue.
	pub fn queue(&self) -> &RequestQueue {
		&self.queue
	}

	/// Process-level knobs.
	pub fn options(&self) -> &ClientOptions {
		&self.options
	}
}
#[cfg(feature = "reqwest")]
impl ProviderClient<ReqwestHttpClient> {
	/// Creates a client with its own reqwest transport.
	///
	/// Spawns the queue coordinator, so it must be called from within a Tokio runtime.
	pub fn new(
		stores: ClientStores,
		config_source: Arc<dyn ConfigSource>,
		options: ClientOptions,
	) -> Result<Self> {
		Ok(Self::with_http_client(stores, config_source, ReqwestHttpClient::new()?, options))
	}
}
impl<C> Clone for ProviderClient<C>
where
	C: ?Sized + ProviderHttpClient,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			tokens: self.tokens.clone(),
			stores: self.stores.clone(),
			config: self.config.clone(),
			queue: self.queue.clone(),
			options: self.options,
		}
	}
}
impl<C> Debug for ProviderClient<C>
where
	C: ?Sized + ProviderHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ProviderClient")
			.field("queue", &self.queue)
			.field("config_generation", &self.config.generation())
			.field("options", &self.options)
			.finish()
	}
}
