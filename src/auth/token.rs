//! Cached bearer tokens and their lifecycle helpers.

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	config::{ClientConfig, Environment},
	error::ConfigError,
};

/// Current lifecycle status for a cached token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// Token is not yet valid because the issued-at instant is in the future.
	Pending,
	/// Token is currently valid.
	Active,
	/// Token exceeded its expiry instant.
	Expired,
}

/// Cache key for bearer tokens: one token per environment and client id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TokenKey {
	/// Provider environment.
	pub environment: Environment,
	/// Client id half of the API key.
	pub client_id: String,
}
impl TokenKey {
	/// Derives the key for a configuration.
	pub fn for_config(config: &ClientConfig) -> Result<Self, ConfigError> {
		let client_id = config.api_key.client_id().ok_or(ConfigError::MalformedApiKey)?;

		Ok(Self { environment: config.environment, client_id: client_id.to_owned() })
	}
}

/// Bearer token issued by the provider's client-credentials grant.
#[derive(Clone)]
pub struct AccessToken {
	/// Key the token is cached under.
	pub key: TokenKey,
	/// Access token secret; callers must avoid logging it.
	pub secret: TokenSecret,
	/// Instant the exchange completed.
	pub issued_at: OffsetDateTime,
	/// Instant after which the token must not be used.
	pub expires_at: OffsetDateTime,
}
impl AccessToken {
	/// Creates a token valid for `ttl` starting at `issued_at`.
	pub fn new(
		key: TokenKey,
		secret: impl Into<String>,
		issued_at: OffsetDateTime,
		ttl: Duration,
	) -> Self {
		Self { key, secret: TokenSecret::new(secret), issued_at, expires_at: issued_at + ttl }
	}

	/// Computes the lifecycle status at a given instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> TokenStatus {
		if instant < self.issued_at {
			return TokenStatus::Pending;
		}
		if instant >= self.expires_at {
			return TokenStatus::Expired;
		}

		TokenStatus::Active
	}

	/// Returns `true` if the token has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant), TokenStatus::Expired)
	}

	/// Returns `true` if the token is active and stays so for at least `margin`.
	pub fn is_usable_at(&self, instant: OffsetDateTime, margin: Duration) -> bool {
		self.status_at(instant) == TokenStatus::Active && instant + margin < self.expires_at
	}

	/// Value for the `Authorization` header.
	pub fn bearer(&self) -> String {
		format!("Bearer {}", self.secret.expose())
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("key", &self.key)
			.field("secret", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;

	fn token() -> AccessToken {
		AccessToken::new(
			TokenKey { environment: Environment::Sandbox, client_id: "client".into() },
			"bearer-value",
			datetime!(2025-01-01 00:00 UTC),
			Duration::minutes(50),
		)
	}

	#[test]
	fn status_tracks_issue_and_expiry() {
		let token = token();

		assert_eq!(token.status_at(datetime!(2024-12-31 23:59 UTC)), TokenStatus::Pending);
		assert_eq!(token.status_at(datetime!(2025-01-01 00:49 UTC)), TokenStatus::Active);
		assert!(token.is_expired_at(datetime!(2025-01-01 00:50 UTC)));
	}

	#[test]
	fn usable_respects_margin() {
		let token = token();

		assert!(token.is_usable_at(datetime!(2025-01-01 00:40 UTC), Duration::seconds(30)));
		assert!(!token.is_usable_at(datetime!(2025-01-01 00:49:45 UTC), Duration::seconds(30)));
	}

	#[test]
	fn debug_redacts_secret() {
		let rendered = format!("{:?}", token());

		assert!(!rendered.contains("bearer-value"));
		assert_eq!(token().bearer(), "Bearer bearer-value");
	}
}
