//! Secret wrappers that redact sensitive material.

// self
use crate::_prelude::*;

/// Redacted token secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Provider API key in `client_id:client_secret` form.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey(TokenSecret);
impl ApiKey {
	/// Wraps a raw API key.
	pub fn new(value: impl Into<String>) -> Self {
		Self(TokenSecret::new(value))
	}

	/// Splits the key into client id and client secret.
	///
	/// Returns `None` unless both halves are non-empty.
	pub fn credentials(&self) -> Option<(&str, &str)> {
		let (id, secret) = self.0.expose().split_once(':')?;

		(!id.is_empty() && !secret.is_empty()).then_some((id, secret))
	}

	/// Client id half of the key; safe to log.
	pub fn client_id(&self) -> Option<&str> {
		self.credentials().map(|(id, _)| id)
	}
}
impl Debug for ApiKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiKey").field("client_id", &self.client_id()).finish_non_exhaustive()
	}
}
impl Display for ApiKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn secret_formatters_redact() {
		let secret = TokenSecret::new("super-secret");

		assert_eq!(format!("{secret:?}"), "TokenSecret(\"<redacted>\")");
		assert_eq!(format!("{secret}"), "<redacted>");
	}

	#[test]
	fn api_key_splits_on_first_colon() {
		let key = ApiKey::new("client:se:cret");

		assert_eq!(key.credentials(), Some(("client", "se:cret")));
		assert!(!format!("{key:?}").contains("se:cret"));
		assert_eq!(ApiKey::new(":secret").credentials(), None);
		assert_eq!(ApiKey::new("client").credentials(), None);
	}
}
