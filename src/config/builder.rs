// self
use crate::{
	_prelude::*,
	auth::ApiKey,
	config::{ClientConfig, Environment, ProviderEndpoints},
	error::ConfigError,
	ingest::{Direction, OperationCodeRule},
};

/// Builder for [`ClientConfig`] values.
#[derive(Debug)]
pub struct ClientConfigBuilder {
	/// Environment the configuration targets.
	pub environment: Environment,
	/// OAuth token endpoint.
	pub token_endpoint: Option<Url>,
	/// Base URL for REST endpoints.
	pub api_base: Option<Url>,
	/// Provider credential in `client_id:client_secret` form.
	pub api_key: Option<ApiKey>,
	/// Operator's own account id.
	pub own_account_id: Option<String>,
	/// Upper bound on concurrent dispatches.
	pub max_concurrent_requests: usize,
	/// Minimum spacing between dispatch starts.
	pub min_delay_between_requests_ms: u64,
	/// Delay before a failed call becomes due.
	pub retry_delay_seconds: u64,
	/// Retries allowed before a call is final.
	pub max_retry_attempts: u32,
	/// Whether final failures request manual attention.
	pub manual_retry_enabled: bool,
	/// Per-call timeout.
	pub request_timeout_ms: u64,
	/// Fixed token lifetime.
	pub token_ttl_seconds: u64,
	/// Operation-code lookup rules.
	pub operation_codes: Vec<OperationCodeRule>,
}
impl ClientConfigBuilder {
	/// Creates a new builder seeded with conservative defaults.
	pub fn new(environment: Environment) -> Self {
		Self {
			environment,
			token_endpoint: None,
			api_base: None,
			api_key: None,
			own_account_id: None,
			max_concurrent_requests: 4,
			min_delay_between_requests_ms: 250,
			retry_delay_seconds: 300,
			max_retry_attempts: 3,
			manual_retry_enabled: true,
			request_timeout_ms: ClientConfig::DEFAULT_REQUEST_TIMEOUT_MS,
			token_ttl_seconds: ClientConfig::DEFAULT_TOKEN_TTL_SECONDS,
			operation_codes: Vec::new(),
		}
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Sets the REST base URL.
	pub fn api_base(mut self, url: Url) -> Self {
		self.api_base = Some(url);

		self
	}

	/// Sets the provider credential.
	pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
		self.api_key = Some(ApiKey::new(api_key));

		self
	}

	/// Sets the operator's own account id.
	pub fn own_account_id(mut self, account_id: impl Into<String>) -> Self {
		self.own_account_id = Some(account_id.into());

		self
	}

	/// Overrides the concurrency bound.
	pub fn max_concurrent_requests(mut self, max: usize) -> Self {
		self.max_concurrent_requests = max;

		self
	}

	/// Overrides the spacing between dispatch starts.
	pub fn min_delay_between_requests_ms(mut self, millis: u64) -> Self {
		self.min_delay_between_requests_ms = millis;

		self
	}

	/// Overrides the retry delay.
	pub fn retry_delay_seconds(mut self, seconds: u64) -> Self {
		self.retry_delay_seconds = seconds;

		self
	}

	/// Overrides the retry budget.
	pub fn max_retry_attempts(mut self, max: u32) -> Self {
		self.max_retry_attempts = max;

		self
	}

	/// Enables or disables manual-retry flagging on final failures.
	pub fn manual_retry_enabled(mut self, enabled: bool) -> Self {
		self.manual_retry_enabled = enabled;

		self
	}

	/// Overrides the per-call timeout.
	pub fn request_timeout_ms(mut self, millis: u64) -> Self {
		self.request_timeout_ms = millis;

		self
	}

	/// Overrides the token lifetime.
	pub fn token_ttl_seconds(mut self, seconds: u64) -> Self {
		self.token_ttl_seconds = seconds;

		self
	}

	/// Registers one operation-code mapping.
	pub fn operation_code(
		mut self,
		method_code: impl Into<String>,
		direction: Direction,
		operation_code: impl Into<String>,
	) -> Self {
		self.operation_codes.push(OperationCodeRule {
			method_code: method_code.into(),
			direction,
			operation_code: operation_code.into(),
		});

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<ClientConfig, ConfigError> {
		let token = self.token_endpoint.ok_or(ConfigError::MissingSetting("token_endpoint"))?;
		let api_base = self.api_base.ok_or(ConfigError::MissingSetting("api_base"))?;
		let api_key = self.api_key.ok_or(ConfigError::MissingSetting("api_key"))?;
		let own_account_id =
			self.own_account_id.ok_or(ConfigError::MissingSetting("own_account_id"))?;
		let config = ClientConfig {
			environment: self.environment,
			endpoints: ProviderEndpoints { token, api_base },
			api_key,
			own_account_id,
			max_concurrent_requests: self.max_concurrent_requests,
			min_delay_between_requests_ms: self.min_delay_between_requests_ms,
			retry_delay_seconds: self.retry_delay_seconds,
			max_retry_attempts: self.max_retry_attempts,
			manual_retry_enabled: self.manual_retry_enabled,
			request_timeout_ms: self.request_timeout_ms,
			token_ttl_seconds: self.token_ttl_seconds,
			operation_codes: self.operation_codes,
		};

		config.validate()?;

		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn base() -> ClientConfigBuilder {
		ClientConfigBuilder::new(Environment::Sandbox)
			.token_endpoint(
				Url::parse("https://provider.test/oauth/token").expect("Token URL should parse."),
			)
			.api_base(Url::parse("https://provider.test/api/").expect("API URL should parse."))
			.api_key("client:secret")
			.own_account_id("own-1")
	}

	#[test]
	fn builder_applies_defaults() {
		let config = base().build().expect("Builder should succeed with defaults.");

		assert_eq!(config.max_concurrent_requests, 4);
		assert_eq!(config.min_delay_between_requests_ms, 250);
		assert_eq!(config.retry_delay_seconds, 300);
		assert_eq!(config.max_retry_attempts, 3);
		assert!(config.manual_retry_enabled);
	}

	#[test]
	fn builder_requires_token_endpoint() {
		let err = ClientConfigBuilder::new(Environment::Sandbox)
			.api_key("client:secret")
			.build()
			.expect_err("Missing token endpoint should fail.");

		assert!(matches!(err, ConfigError::MissingSetting("token_endpoint")));
	}

	#[test]
	fn builder_rejects_malformed_api_key() {
		let err = base().api_key("no-separator").build().expect_err("Malformed key should fail.");

		assert!(matches!(err, ConfigError::MalformedApiKey));
	}

	#[test]
	fn builder_rejects_zero_concurrency() {
		let err = base()
			.max_concurrent_requests(0)
			.build()
			.expect_err("Zero concurrency should fail.");

		assert!(matches!(err, ConfigError::OutOfRange { setting: "max_concurrent_requests", .. }));
	}

	#[test]
	fn builder_rejects_duplicate_operation_codes() {
		let err = base()
			.operation_code("CARD", Direction::Credit, "OP-1")
			.operation_code("card", Direction::Credit, "OP-2")
			.build()
			.expect_err("Duplicate mapping should fail.");

		assert!(matches!(err, ConfigError::DuplicateOperationCode { direction: "credit", .. }));
	}
}
