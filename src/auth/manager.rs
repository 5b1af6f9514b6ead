//! Client-credentials token manager with caching and single-flight guards.
//!
//! [`TokenManager::get_token`] hands out the cached bearer token while it is still usable and
//! otherwise performs one client-credentials exchange per [`TokenKey`]. Concurrent callers that
//! miss the cache queue behind a per-key flight and share whatever that flight settled with, so
//! a burst of requests costs a single round-trip to the token endpoint whether it succeeds or
//! fails. A failure is only handed to callers that were already waiting; it is never cached.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use oauth2::{
	AuthType, ClientId, ClientSecret, HttpClientError, RequestTokenError, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicRequestTokenError},
};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, TokenKey},
	config::ClientConfig,
	error::{AuthError, ConfigError},
	http::{ProviderHttpClient, ResponseMetadata, ResponseMetadataSlot},
	obs::{self, OpKind, OpOutcome, OpSpan},
};

/// Caches bearer tokens per environment and client id.
pub struct TokenManager<C>
where
	C: ?Sized + ProviderHttpClient,
{
	http_client: Arc<C>,
	tokens: RwLock<HashMap<TokenKey, AccessToken>>,
	flights: Mutex<HashMap<TokenKey, Arc<Flight>>>,
	exchanges: AtomicU64,
}
impl<C> TokenManager<C>
where
	C: ?Sized + ProviderHttpClient,
{
	/// Upper bound on the early-refresh margin.
	pub const MAX_REFRESH_MARGIN: Duration = Duration::seconds(30);

	/// Creates an empty manager over the provided transport.
	pub fn new(http_client: impl Into<Arc<C>>) -> Self {
		Self {
			http_client: http_client.into(),
			tokens: RwLock::new(HashMap::new()),
			flights: Mutex::new(HashMap::new()),
			exchanges: AtomicU64::new(0),
		}
	}

	/// Returns a usable bearer token, exchanging credentials when the cache is empty or stale.
	pub async fn get_token(&self, config: &ClientConfig) -> Result<AccessToken> {
		const KIND: OpKind = OpKind::Token;

		let span = OpSpan::new(KIND, "get_token");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async move {
				let key = TokenKey::for_config(config)?;

				if let Some(token) = self.cached(&key, OffsetDateTime::now_utc()) {
					return Ok(token);
				}

				let flight = self.flight(&key);
				let joined_at = flight.settled.load(Ordering::Acquire);
				let mut last_failure = flight.last_failure.lock().await;

				if let Some(token) = self.cached(&key, OffsetDateTime::now_utc()) {
					return Ok(token);
				}
				// A flight settled while this caller waited and left no token behind.
				if flight.settled.load(Ordering::Acquire) != joined_at
					&& let Some(failure) = last_failure.as_ref()
				{
					return Err(failure.clone().into());
				}

				self.exchanges.fetch_add(1, Ordering::Relaxed);

				let result = self.exchange(key.clone(), config).await;

				*last_failure = match &result {
					Err(Error::Auth(failure)) => Some(failure.clone()),
					_ => None,
				};

				flight.settled.fetch_add(1, Ordering::Release);

				let token = result?;

				self.tokens.write().insert(key, token.clone());

				Ok(token)
			})
			.await;

		match &result {
			Ok(_) => obs::record_op_outcome(KIND, OpOutcome::Success),
			Err(_) => obs::record_op_outcome(KIND, OpOutcome::Failure),
		}

		result
	}

	/// Returns the cached token for `key` if it is still usable at `now`.
	pub fn cached(&self, key: &TokenKey, now: OffsetDateTime) -> Option<AccessToken> {
		let tokens = self.tokens.read();
		let token = tokens.get(key)?;
		let margin = ((token.expires_at - token.issued_at) / 10_i32).min(Self::MAX_REFRESH_MARGIN);

		token.is_usable_at(now, margin).then(|| token.clone())
	}

	/// Drops the cached token for `key`, forcing the next call to exchange again.
	pub fn invalidate(&self, key: &TokenKey) {
		self.tokens.write().remove(key);
	}

	/// Number of exchanges performed against the token endpoint.
	pub fn exchange_count(&self) -> u64 {
		self.exchanges.load(Ordering::Relaxed)
	}

	fn flight(&self, key: &TokenKey) -> Arc<Flight> {
		self.flights.lock().entry(key.clone()).or_default().clone()
	}

	async fn exchange(&self, key: TokenKey, config: &ClientConfig) -> Result<AccessToken> {
		let (client_id, client_secret) =
			config.api_key.credentials().ok_or(ConfigError::MalformedApiKey)?;
		let token_url = TokenUrl::new(config.endpoints.token.to_string()).map_err(|source| {
			ConfigError::InvalidEndpoint { endpoint: config.endpoints.token.to_string(), source }
		})?;
		let oauth_client = BasicClient::new(ClientId::new(client_id.to_owned()))
			.set_client_secret(ClientSecret::new(client_secret.to_owned()))
			.set_token_uri(token_url)
			.set_auth_type(AuthType::BasicAuth);
		let meta = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(meta.clone());
		let request = oauth_client.exchange_client_credentials();
		let response =
			match tokio::time::timeout(config.request_timeout(), request.request_async(&handle))
				.await
			{
				Ok(result) => result.map_err(|err| map_request_error(meta.take(), err))?,
				Err(_) => return Err(AuthError::Timeout.into()),
			};
		let ttl = effective_ttl(config.token_ttl(), response.expires_in());

		Ok(AccessToken::new(
			key,
			response.access_token().secret().to_owned(),
			OffsetDateTime::now_utc(),
			ttl,
		))
	}
}
impl<C> Debug for TokenManager<C>
where
	C: ?Sized + ProviderHttpClient,
{
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("cached", &self.tokens.read().len())
			.field("exchanges", &self.exchange_count())
			.finish()
	}
}

/// Per-key exchange slot. `settled` counts finished exchanges; `last_failure` holds the error of
/// the latest one for callers that queued while it ran.
#[derive(Debug, Default)]
struct Flight {
	settled: AtomicU64,
	last_failure: AsyncMutex<Option<AuthError>>,
}

/// Uses the configured TTL unless the provider promises a shorter lifetime.
fn effective_ttl(fixed: Duration, expires_in: Option<StdDuration>) -> Duration {
	let Some(expires_in) = expires_in else {
		return fixed;
	};
	let provider = Duration::seconds(i64::try_from(expires_in.as_secs()).unwrap_or(i64::MAX));

	if provider.is_positive() && provider < fixed { provider } else { fixed }
}

fn map_request_error<E>(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
) -> AuthError
where
	E: 'static + Send + Sync + StdError,
{
	let status = meta.and_then(|meta| meta.status);

	match err {
		RequestTokenError::ServerResponse(response) => AuthError::Rejected {
			status,
			error: response.error().as_ref().to_owned(),
			description: response.error_description().cloned(),
		},
		RequestTokenError::Request(error) => AuthError::Transport { message: error.to_string() },
		RequestTokenError::Parse(_, body) =>
			AuthError::UnexpectedResponse { status, body: String::from_utf8_lossy(&body).into() },
		RequestTokenError::Other(message) =>
			AuthError::UnexpectedResponse { status, body: message },
	}
}
