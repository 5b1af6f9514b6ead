//! Client configuration: provider environment, credentials, rate-limit and retry knobs.
//!
//! `builder` assembles validated [`ClientConfig`] values in code, while `cache` keeps the
//! persisted settings loaded through a [`ConfigSource`] hot for a short TTL so operators can
//! change limits without restarting the process.

/// Builder API for assembling client configurations.
pub mod builder;
/// Short-TTL cache with hot reload.
pub mod cache;

pub use builder::*;
pub use cache::*;

// self
use crate::{
	_prelude::*,
	auth::ApiKey,
	calllog::RetryPolicy,
	error::ConfigError,
	ingest::{OperationCodeMap, OperationCodeRule},
	queue::QueueLimits,
	store::StoreFuture,
};

/// Provider environment the client talks to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
	#[default]
	/// Provider sandbox.
	Sandbox,
	/// Live provider environment.
	Production,
}
impl Environment {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Environment::Sandbox => "sandbox",
			Environment::Production => "production",
		}
	}
}
impl Display for Environment {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Endpoint set for one provider environment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
	/// OAuth token endpoint used for the client-credentials exchange.
	pub token: Url,
	/// Base URL that relative REST endpoints are joined onto.
	pub api_base: Url,
}
impl ProviderEndpoints {
	/// Resolves a relative endpoint (`accounts/42?x=1`) against [`Self::api_base`].
	pub fn resolve(&self, endpoint: &str) -> Result<Url, ConfigError> {
		let mut base = self.api_base.clone();

		if !base.path().ends_with('/') {
			let path = format!("{}/", base.path());

			base.set_path(&path);
		}

		base.join(endpoint.trim_start_matches('/')).map_err(|source| {
			ConfigError::InvalidEndpoint { endpoint: endpoint.to_owned(), source }
		})
	}
}

/// Persisted client settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
	/// Active provider environment.
	pub environment: Environment,
	/// Endpoints for [`Self::environment`].
	pub endpoints: ProviderEndpoints,
	/// Provider-issued credential used for Basic auth on the token endpoint.
	pub api_key: ApiKey,
	/// Operator's own wallet/account id, used to determine transfer direction.
	pub own_account_id: String,
	/// Upper bound on concurrently running dispatches.
	pub max_concurrent_requests: usize,
	/// Minimum spacing between two dispatch starts.
	#[serde(default)]
	pub min_delay_between_requests_ms: u64,
	/// Delay before a failed call becomes due for retry.
	pub retry_delay_seconds: u64,
	/// Retries allowed before a call is marked as a final failure.
	pub max_retry_attempts: u32,
	/// Whether final failures are flagged for manual retry.
	#[serde(default)]
	pub manual_retry_enabled: bool,
	/// Timeout applied to every HTTP call.
	#[serde(default = "ClientConfig::default_request_timeout_ms")]
	pub request_timeout_ms: u64,
	/// Fixed lifetime of cached bearer tokens.
	#[serde(default = "ClientConfig::default_token_ttl_seconds")]
	pub token_ttl_seconds: u64,
	/// Lookup table from provider method code + direction to ledger operation code.
	#[serde(default)]
	pub operation_codes: Vec<OperationCodeRule>,
}
impl ClientConfig {
	/// Default per-call timeout.
	pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
	/// Default bearer token lifetime.
	pub const DEFAULT_TOKEN_TTL_SECONDS: u64 = 3_000;
	/// Longest accepted retry delay (30 days).
	pub const MAX_RETRY_DELAY_SECONDS: u64 = 30 * 86_400;
	/// Longest accepted bearer token lifetime (1 day).
	pub const MAX_TOKEN_TTL_SECONDS: u64 = 86_400;

	/// Creates a new builder for the provided environment.
	pub fn builder(environment: Environment) -> ClientConfigBuilder {
		ClientConfigBuilder::new(environment)
	}

	/// Minimum delay between dispatch starts.
	pub fn min_delay(&self) -> StdDuration {
		StdDuration::from_millis(self.min_delay_between_requests_ms)
	}

	/// Delay before a failed call is retried.
	pub fn retry_delay(&self) -> Duration {
		Duration::seconds(self.retry_delay_seconds.min(Self::MAX_RETRY_DELAY_SECONDS) as i64)
	}

	/// Timeout applied to every HTTP call.
	pub fn request_timeout(&self) -> StdDuration {
		StdDuration::from_millis(self.request_timeout_ms)
	}

	/// Fixed token lifetime.
	pub fn token_ttl(&self) -> Duration {
		Duration::seconds(self.token_ttl_seconds.min(Self::MAX_TOKEN_TTL_SECONDS) as i64)
	}

	/// Queue limits derived from the rate-limit knobs.
	pub fn queue_limits(&self) -> QueueLimits {
		QueueLimits {
			max_concurrent_requests: self.max_concurrent_requests,
			min_delay: self.min_delay(),
			request_timeout: self.request_timeout(),
		}
	}

	/// Retry policy derived from the retry knobs.
	pub fn retry_policy(&self) -> RetryPolicy {
		RetryPolicy {
			retry_delay: self.retry_delay(),
			max_retry_attempts: self.max_retry_attempts,
			manual_retry_enabled: self.manual_retry_enabled,
		}
	}

	/// Builds the operation-code lookup table.
	pub fn operation_code_map(&self) -> Result<OperationCodeMap, ConfigError> {
		OperationCodeMap::from_rules(self.operation_codes.iter().cloned())
	}

	/// Validates invariants for the configuration.
	pub fn validate(&self) -> Result<(), ConfigError> {
		validate_endpoint("token", &self.endpoints.token)?;
		validate_endpoint("api_base", &self.endpoints.api_base)?;

		if self.api_key.credentials().is_none() {
			return Err(ConfigError::MalformedApiKey);
		}
		if self.own_account_id.trim().is_empty() {
			return Err(ConfigError::MissingSetting("own_account_id"));
		}
		if self.max_concurrent_requests == 0 {
			return Err(ConfigError::OutOfRange {
				setting: "max_concurrent_requests",
				reason: "at least one concurrent request is required",
			});
		}
		if self.request_timeout_ms == 0 {
			return Err(ConfigError::OutOfRange {
				setting: "request_timeout_ms",
				reason: "timeout must be positive",
			});
		}
		if self.token_ttl_seconds == 0 {
			return Err(ConfigError::OutOfRange {
				setting: "token_ttl_seconds",
				reason: "token lifetime must be positive",
			});
		}
		if self.token_ttl_seconds > Self::MAX_TOKEN_TTL_SECONDS {
			return Err(ConfigError::OutOfRange {
				setting: "token_ttl_seconds",
				reason: "token lifetime must not exceed one day",
			});
		}
		if self.retry_delay_seconds > Self::MAX_RETRY_DELAY_SECONDS {
			return Err(ConfigError::OutOfRange {
				setting: "retry_delay_seconds",
				reason: "retry delay must not exceed 30 days",
			});
		}

		self.operation_code_map().map(|_| ())
	}

	fn default_request_timeout_ms() -> u64 {
		Self::DEFAULT_REQUEST_TIMEOUT_MS
	}

	fn default_token_ttl_seconds() -> u64 {
		Self::DEFAULT_TOKEN_TTL_SECONDS
	}
}

/// Loads persisted client settings.
pub trait ConfigSource
where
	Self: Send + Sync,
{
	/// Reads the current settings row.
	fn load(&self) -> StoreFuture<'_, ClientConfig>;
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ConfigError> {
	let loopback = matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));

	match url.scheme() {
		"https" => Ok(()),
		"http" if loopback => Ok(()),
		_ => Err(ConfigError::InsecureEndpoint { endpoint: name, url: url.to_string() }),
	}
}
