//! Client-level error types shared across the token manager, queue, stores, and pipelines.

// self
use crate::{_prelude::*, calllog::RetryStatus};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
///
/// Outbound call failures (429, 403, network) never surface here; they are persisted on the
/// call log and read back by callers.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// OAuth client-credentials exchange failed.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// The dispatch queue coordinator has shut down.
	#[error("Request queue is closed.")]
	QueueClosed,
	/// No call log exists for the identifier.
	#[error("Call log {id} does not exist.")]
	CallLogNotFound {
		/// Requested call log identifier.
		id: u64,
	},
	/// The call log is not in a state that accepts a retry.
	#[error("Call log {id} cannot be retried while {status}.")]
	RetryUnavailable {
		/// Requested call log identifier.
		id: u64,
		/// Retry status observed when the claim was attempted.
		status: RetryStatus,
	},
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// An endpoint could not be parsed or joined.
	#[error("Endpoint `{endpoint}` is invalid.")]
	InvalidEndpoint {
		/// Endpoint or path that failed to parse.
		endpoint: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Endpoints must use HTTPS outside loopback hosts.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// A required setting was not supplied.
	#[error("Missing required setting `{0}`.")]
	MissingSetting(&'static str),
	/// The API key is not in `client_id:client_secret` form.
	#[error("API key must have the form `client_id:client_secret`.")]
	MalformedApiKey,
	/// A numeric setting is outside its accepted range.
	#[error("Setting `{setting}` is out of range: {reason}.")]
	OutOfRange {
		/// Setting name.
		setting: &'static str,
		/// Human-readable constraint.
		reason: &'static str,
	},
	/// The operation-code table maps one key twice.
	#[error("Operation code for `{method_code}` ({direction}) is defined more than once.")]
	DuplicateOperationCode {
		/// Provider method code.
		method_code: String,
		/// Transfer direction label.
		direction: &'static str,
	},
	/// No configuration has been loaded yet and the source failed.
	#[error("Client configuration is unavailable.")]
	Unavailable,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// OAuth client-credentials exchange failures. Never cached and never retried by the token
/// manager itself.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum AuthError {
	/// Token endpoint answered with an OAuth error document.
	#[error("Token endpoint rejected the credentials: {error}.")]
	Rejected {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// OAuth `error` code.
		error: String,
		/// OAuth `error_description`, when supplied.
		description: Option<String>,
	},
	/// Token endpoint answered with a body that is not a token response.
	#[error("Token endpoint returned an unexpected response.")]
	UnexpectedResponse {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Raw response body, lossily decoded.
		body: String,
	},
	/// Token endpoint could not be reached.
	#[error("Token endpoint is unreachable: {message}.")]
	Transport {
		/// Transport failure summary.
		message: String,
	},
	/// Token endpoint did not answer within the request timeout.
	#[error("Token endpoint timed out.")]
	Timeout,
}
impl AuthError {
	/// HTTP status returned by the token endpoint, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Rejected { status, .. } | Self::UnexpectedResponse { status, .. } => *status,
			Self::Transport { .. } | Self::Timeout => None,
		}
	}
}

/// Transport-level failures (network, IO, timeout).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the provider.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the provider.")]
	Io(#[from] std::io::Error),
	/// The call exceeded its request timeout.
	#[error("Provider call timed out after {0:?}.")]
	Timeout(StdDuration),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn auth_error_exposes_status() {
		let err = AuthError::Rejected {
			status: Some(401),
			error: "invalid_client".into(),
			description: None,
		};

		assert_eq!(err.status(), Some(401));
		assert_eq!(AuthError::Timeout.status(), None);
		assert!(err.to_string().contains("invalid_client"));
	}

	#[test]
	fn retry_unavailable_mentions_status() {
		let err = Error::RetryUnavailable { id: 7, status: RetryStatus::Processing };

		assert_eq!(err.to_string(), "Call log 7 cannot be retried while processing.");
	}
}
