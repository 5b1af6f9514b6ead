//! Provider REST request and response shapes.
//!
//! Requests are described by a relative endpoint, a method, and an optional JSON payload so they
//! can be persisted on a call log and replayed verbatim by the retry sweeper. Responses are kept
//! as raw bytes; [`ResponseBody::classify`] inspects the `Content-Type` before attempting to
//! parse, so HTML error pages or empty bodies never reach the JSON parser.

// crates.io
use oauth2::{
	HttpResponse,
	http::{Method, header::CONTENT_TYPE},
};
use serde_json::Value;
use url::form_urlencoded::{Serializer, byte_serialize};
// self
use crate::{_prelude::*, http};

/// HTTP verbs used against the provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApiMethod {
	/// `GET`
	Get,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `PATCH`
	Patch,
	/// `DELETE`
	Delete,
}
impl ApiMethod {
	/// Returns the canonical method name.
	pub const fn as_str(self) -> &'static str {
		match self {
			ApiMethod::Get => "GET",
			ApiMethod::Post => "POST",
			ApiMethod::Put => "PUT",
			ApiMethod::Patch => "PATCH",
			ApiMethod::Delete => "DELETE",
		}
	}

	pub(crate) fn to_http(self) -> Method {
		match self {
			ApiMethod::Get => Method::GET,
			ApiMethod::Post => Method::POST,
			ApiMethod::Put => Method::PUT,
			ApiMethod::Patch => Method::PATCH,
			ApiMethod::Delete => Method::DELETE,
		}
	}
}
impl Display for ApiMethod {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Filters accepted by the transaction list endpoints.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionQuery {
	/// Restrict to one wallet/account.
	pub account_id: Option<String>,
	/// Inclusive lower bound on the creation date.
	pub from: Option<Date>,
	/// Inclusive upper bound on the creation date.
	pub to: Option<Date>,
	/// 1-based page index.
	pub page: Option<u32>,
	/// Page size.
	pub per_page: Option<u32>,
}
impl TransactionQuery {
	/// Restricts the listing to one account.
	pub fn account(mut self, account_id: impl Into<String>) -> Self {
		self.account_id = Some(account_id.into());

		self
	}

	/// Restricts the listing to a date range.
	pub fn between(mut self, from: Date, to: Date) -> Self {
		self.from = Some(from);
		self.to = Some(to);

		self
	}

	/// Selects a page.
	pub fn page(mut self, page: u32, per_page: u32) -> Self {
		self.page = Some(page);
		self.per_page = Some(per_page);

		self
	}

	fn encode(&self) -> Option<String> {
		let mut query = Serializer::new(String::new());
		let mut empty = true;

		if let Some(account_id) = &self.account_id {
			query.append_pair("accountId", account_id);
			empty = false;
		}
		if let Some(from) = self.from {
			query.append_pair("from", &format_date(from));
			empty = false;
		}
		if let Some(to) = self.to {
			query.append_pair("to", &format_date(to));
			empty = false;
		}
		if let Some(page) = self.page {
			query.append_pair("page", &page.to_string());
			empty = false;
		}
		if let Some(per_page) = self.per_page {
			query.append_pair("perPage", &per_page.to_string());
			empty = false;
		}

		(!empty).then(|| query.finish())
	}
}

/// Transaction feed exposed by the provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionFeed {
	/// Deposits into the operator's wallets.
	Incoming,
	/// Wallet-to-wallet transfers.
	PeerToPeer,
}
impl TransactionFeed {
	const fn path(self) -> &'static str {
		match self {
			TransactionFeed::Incoming => "transactions/incoming",
			TransactionFeed::PeerToPeer => "transactions/p2p",
		}
	}
}

/// Outbound provider call as persisted on a call log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRequest {
	/// Endpoint relative to the configured API base, including any query string.
	pub endpoint: String,
	/// HTTP method.
	pub method: ApiMethod,
	/// Serialized JSON body, if any.
	pub payload: Option<String>,
}
impl ApiRequest {
	/// Builds a `GET` request.
	pub fn get(endpoint: impl Into<String>) -> Self {
		Self { endpoint: endpoint.into(), method: ApiMethod::Get, payload: None }
	}

	/// Builds a `POST` request with a pre-serialized JSON payload.
	pub fn post(endpoint: impl Into<String>, payload: impl Into<String>) -> Self {
		Self { endpoint: endpoint.into(), method: ApiMethod::Post, payload: Some(payload.into()) }
	}

	/// Builds a `POST` request by serializing `payload`.
	pub fn post_json<T>(endpoint: impl Into<String>, payload: &T) -> Result<Self, serde_json::Error>
	where
		T: ?Sized + Serialize,
	{
		Ok(Self::post(endpoint, serde_json::to_string(payload)?))
	}

	/// `GET accounts/{id}`
	pub fn retrieve_account(account_id: &str) -> Self {
		Self::get(format!("accounts/{}", encode_segment(account_id)))
	}

	/// `GET accounts/{id}/kyc`
	pub fn kyc_status(account_id: &str) -> Self {
		Self::get(format!("accounts/{}/kyc", encode_segment(account_id)))
	}

	/// `GET accounts/{id}/balances`
	pub fn balances(account_id: &str) -> Self {
		Self::get(format!("accounts/{}/balances", encode_segment(account_id)))
	}

	/// `GET transactions/incoming` or `GET transactions/p2p` with optional filters.
	pub fn list_transactions(feed: TransactionFeed, query: &TransactionQuery) -> Self {
		match query.encode() {
			Some(query) => Self::get(format!("{}?{query}", feed.path())),
			None => Self::get(feed.path()),
		}
	}
}

/// Raw provider response captured by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// `Content-Type` header, if present.
	pub content_type: Option<String>,
	/// `Retry-After` hint, if present.
	pub retry_after: Option<Duration>,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl ApiResponse {
	pub(crate) fn from_http(response: HttpResponse) -> Self {
		let content_type = response
			.headers()
			.get(CONTENT_TYPE)
			.and_then(|value| value.to_str().ok())
			.map(str::to_owned);
		let retry_after = http::parse_retry_after(response.headers());

		Self {
			status: response.status().as_u16(),
			content_type,
			retry_after,
			body: response.into_body(),
		}
	}

	/// `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Body decoded as UTF-8, replacing invalid sequences.
	pub fn body_text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Classifies the body according to its content type.
	pub fn parse_body(&self) -> ResponseBody {
		ResponseBody::classify(self.content_type.as_deref(), &self.body)
	}
}

/// Response body classified by content type.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBody {
	/// Body was empty or whitespace.
	Empty,
	/// JSON document.
	Json(Value),
	/// Non-JSON text (HTML error pages, plain text).
	Text(String),
	/// Declared JSON that failed to parse, or non-UTF-8 text.
	Malformed {
		/// Parser failure summary.
		reason: String,
		/// Raw body, lossily decoded.
		raw: String,
	},
}
impl ResponseBody {
	/// Classifies `body` using the declared `content_type`.
	pub fn classify(content_type: Option<&str>, body: &[u8]) -> Self {
		if body.iter().all(u8::is_ascii_whitespace) {
			return Self::Empty;
		}

		if content_type.is_some_and(is_json_media_type) {
			return match serde_json::from_slice(body) {
				Ok(value) => Self::Json(value),
				Err(e) => Self::Malformed {
					reason: e.to_string(),
					raw: String::from_utf8_lossy(body).into_owned(),
				},
			};
		}

		match std::str::from_utf8(body) {
			Ok(text) => Self::Text(text.to_owned()),
			Err(e) => Self::Malformed {
				reason: e.to_string(),
				raw: String::from_utf8_lossy(body).into_owned(),
			},
		}
	}

	/// Returns the JSON document, if any.
	pub fn json(&self) -> Option<&Value> {
		match self {
			Self::Json(value) => Some(value),
			_ => None,
		}
	}
}

/// Converts a provider minor-unit amount (cents) into a major-unit decimal.
pub fn minor_units_to_major(minor: i64) -> Decimal {
	Decimal::new(minor, 2)
}

fn is_json_media_type(content_type: &str) -> bool {
	let media = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();

	media == "application/json" || media.ends_with("+json")
}

fn encode_segment(segment: &str) -> String {
	byte_serialize(segment.as_bytes()).collect()
}

fn format_date(date: Date) -> String {
	format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::date;
	// self
	use super::*;

	#[test]
	fn account_endpoints_escape_identifiers() {
		assert_eq!(ApiRequest::retrieve_account("acc 1/2").endpoint, "accounts/acc+1%2F2");
		assert_eq!(ApiRequest::kyc_status("acc-1").endpoint, "accounts/acc-1/kyc");
		assert_eq!(ApiRequest::balances("acc-1").endpoint, "accounts/acc-1/balances");
	}

	#[test]
	fn transaction_listing_encodes_filters() {
		let query = TransactionQuery::default()
			.account("own-1")
			.between(date!(2025 - 01 - 01), date!(2025 - 01 - 31))
			.page(2, 50);

		assert_eq!(
			ApiRequest::list_transactions(TransactionFeed::PeerToPeer, &query).endpoint,
			"transactions/p2p?accountId=own-1&from=2025-01-01&to=2025-01-31&page=2&perPage=50"
		);
		assert_eq!(
			ApiRequest::list_transactions(TransactionFeed::Incoming, &TransactionQuery::default())
				.endpoint,
			"transactions/incoming"
		);
	}

	#[test]
	fn classification_checks_content_type_before_parsing() {
		assert_eq!(ResponseBody::classify(Some("application/json"), b"  "), ResponseBody::Empty);
		assert_eq!(
			ResponseBody::classify(Some("text/html"), b"<html>oops</html>"),
			ResponseBody::Text("<html>oops</html>".into())
		);
		assert!(matches!(
			ResponseBody::classify(Some("application/json; charset=utf-8"), b"{\"id\":1}"),
			ResponseBody::Json(_)
		));
		assert!(matches!(
			ResponseBody::classify(Some("application/problem+json"), b"{oops"),
			ResponseBody::Malformed { .. }
		));
	}

	#[test]
	fn minor_units_keep_two_decimal_places() {
		assert_eq!(minor_units_to_major(1_050).to_string(), "10.50");
		assert_eq!(minor_units_to_major(-7).to_string(), "-0.07");
	}
}
