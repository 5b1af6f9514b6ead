//! Scripted provider transport and fixtures shared by the integration tests.

#![allow(dead_code)]

// std
use std::{
	collections::{HashMap, VecDeque},
	error::Error as StdError,
	fmt::{Display, Formatter, Result as FmtResult},
	future::Future,
	pin::Pin,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration as StdDuration,
};
// crates.io
use parking_lot::Mutex;
// self
use payments_relay::{
	client::{ClientOptions, ClientStores, ProviderClient},
	config::{ClientConfig, ClientConfigBuilder, Environment},
	http::{ProviderHttpClient, ResponseMetadata, ResponseMetadataSlot},
	ingest::Direction,
	oauth2::{
		AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
		http::{HeaderMap, header::CONTENT_TYPE},
	},
	store::MemoryStore,
	url::Url,
};

pub const TOKEN_PATH: &str = "/oauth/token";
pub const API_PREFIX: &str = "/api/v1/";
pub const OWN_ACCOUNT: &str = "acc-own";

pub type TestClient = ProviderClient<ScriptedHttpClient>;

#[derive(Debug)]
pub struct ScriptedTransportError;
impl Display for ScriptedTransportError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("Scripted connection reset.")
	}
}
impl StdError for ScriptedTransportError {}

/// Canned answer for one request.
#[derive(Clone, Debug)]
pub enum Reply {
	Json(u16, String),
	Text(u16, String),
	Network,
	Delayed(StdDuration, Box<Reply>),
}
impl Reply {
	pub fn ok(body: impl Into<String>) -> Self {
		Self::Json(200, body.into())
	}

	pub fn status(status: u16) -> Self {
		Self::Json(status, format!("{{\"error\":\"scripted {status}\"}}"))
	}

	pub fn after(self, delay: StdDuration) -> Self {
		Self::Delayed(delay, Box::new(self))
	}
}

#[derive(Clone, Debug)]
pub struct RecordedRequest {
	pub method: String,
	pub path: String,
	pub query: Option<String>,
	pub headers: HeaderMap,
	pub body: Vec<u8>,
}
impl RecordedRequest {
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).and_then(|value| value.to_str().ok())
	}
}

#[derive(Default)]
struct Route {
	queue: VecDeque<Reply>,
	fallback: Option<Reply>,
}

#[derive(Default)]
struct ScriptState {
	routes: Mutex<HashMap<String, Route>>,
	requests: Mutex<Vec<RecordedRequest>>,
	token_exchanges: AtomicUsize,
}
impl ScriptState {
	fn record(&self, request: &HttpRequest) -> Reply {
		let path = request.uri().path().to_owned();

		self.requests.lock().push(RecordedRequest {
			method: request.method().as_str().to_owned(),
			path: path.clone(),
			query: request.uri().query().map(str::to_owned),
			headers: request.headers().clone(),
			body: request.body().clone(),
		});

		let exchange =
			(path == TOKEN_PATH).then(|| self.token_exchanges.fetch_add(1, Ordering::SeqCst) + 1);
		let mut routes = self.routes.lock();
		let scripted = routes.get_mut(&path).and_then(|route| {
			route.queue.pop_front().or_else(|| route.fallback.clone())
		});

		match (scripted, exchange) {
			(Some(reply), _) => reply,
			(None, Some(n)) => Reply::ok(format!(
				"{{\"access_token\":\"tok-{n}\",\"token_type\":\"bearer\",\"expires_in\":3600}}"
			)),
			(None, None) => Reply::status(404),
		}
	}
}

/// In-process [`ProviderHttpClient`] that answers from per-path scripts.
///
/// The token endpoint mints `tok-1`, `tok-2`, ... unless scripted otherwise. Unscripted API
/// paths answer 404.
#[derive(Clone, Default)]
pub struct ScriptedHttpClient(Arc<ScriptState>);
impl ScriptedHttpClient {
	pub fn new() -> Self {
		Self::default()
	}

	/// Queues one-shot replies for `endpoint`.
	pub fn script(&self, endpoint: &str, replies: impl IntoIterator<Item = Reply>) -> &Self {
		self.0.routes.lock().entry(route_path(endpoint)).or_default().queue.extend(replies);

		self
	}

	/// Answers `endpoint` with `reply` once its one-shot replies are used up.
	pub fn always(&self, endpoint: &str, reply: Reply) -> &Self {
		self.0.routes.lock().entry(route_path(endpoint)).or_default().fallback = Some(reply);

		self
	}

	pub fn requests(&self) -> Vec<RecordedRequest> {
		self.0.requests.lock().clone()
	}

	pub fn api_requests(&self, endpoint: &str) -> Vec<RecordedRequest> {
		let path = route_path(endpoint);

		self.requests().into_iter().filter(|request| request.path == path).collect()
	}

	pub fn token_exchanges(&self) -> usize {
		self.0.token_exchanges.load(Ordering::SeqCst)
	}
}
impl ProviderHttpClient for ScriptedHttpClient {
	type Handle = ScriptedHandle;
	type TransportError = ScriptedTransportError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		ScriptedHandle { state: self.0.clone(), slot }
	}
}

pub struct ScriptedHandle {
	state: Arc<ScriptState>,
	slot: ResponseMetadataSlot,
}
impl<'c> AsyncHttpClient<'c> for ScriptedHandle {
	type Error = HttpClientError<ScriptedTransportError>;
	type Future = Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let state = self.state.clone();
		let slot = self.slot.clone();

		Box::pin(async move {
			slot.take();

			let mut reply = state.record(&request);

			while let Reply::Delayed(delay, inner) = reply {
				tokio::time::sleep(delay).await;

				reply = *inner;
			}

			let (status, content_type, body) = match reply {
				Reply::Json(status, body) => (status, "application/json", body),
				Reply::Text(status, body) => (status, "text/plain", body),
				Reply::Network | Reply::Delayed(..) =>
					return Err(HttpClientError::Reqwest(Box::new(ScriptedTransportError))),
			};

			slot.store(ResponseMetadata { status: Some(status), retry_after: None });

			Ok(payments_relay::oauth2::http::Response::builder()
				.status(status)
				.header(CONTENT_TYPE, content_type)
				.body(body.into_bytes())?)
		})
	}
}

fn route_path(endpoint: &str) -> String {
	if endpoint.starts_with('/') {
		endpoint.to_owned()
	} else {
		format!("{API_PREFIX}{endpoint}")
	}
}

pub fn url(value: &str) -> Url {
	Url::parse(value).expect("Failed to parse fixture URL.")
}

/// Sandbox configuration with no spacing, no retry delay, and three retries.
pub fn config_builder() -> ClientConfigBuilder {
	ClientConfig::builder(Environment::Sandbox)
		.token_endpoint(url("https://provider.test/oauth/token"))
		.api_base(url("https://provider.test/api/v1/"))
		.api_key("client:secret")
		.own_account_id(OWN_ACCOUNT)
		.max_concurrent_requests(4)
		.min_delay_between_requests_ms(0)
		.retry_delay_seconds(0)
		.max_retry_attempts(3)
		.operation_code("CARD", Direction::Credit, "DEP-CARD")
		.operation_code("P2P", Direction::Credit, "P2P-IN")
		.operation_code("P2P", Direction::Debit, "P2P-OUT")
}

pub fn test_config() -> ClientConfig {
	config_builder().build().expect("Fixture configuration should be valid.")
}

/// Client over a fresh [`MemoryStore`] seeded with `config`.
pub fn build_client(config: ClientConfig) -> (TestClient, ScriptedHttpClient, Arc<MemoryStore>) {
	let store = Arc::new(MemoryStore::new());

	store.put_config(config).expect("Memory store should accept the fixture configuration.");

	let transport = ScriptedHttpClient::new();
	let client: TestClient = ProviderClient::with_http_client(
		ClientStores::shared(store.clone()),
		store.clone(),
		transport.clone(),
		ClientOptions::default(),
	);

	(client, transport, store)
}
