// std
use std::{sync::Arc, time::Duration};
// crates.io
use httpmock::prelude::*;
// self
use payments_relay::{
	auth::TokenManager,
	calllog::RetryStatus,
	client::{ClientOptions, ClientStores, ProviderClient},
	config::{ClientConfig, Environment},
	error::{AuthError, Error},
	http::ReqwestHttpClient,
	store::MemoryStore,
	url::Url,
};

const BASIC_CREDENTIALS: &str = "Basic Y2xpZW50OnNlY3JldA==";
const TOKEN_BODY: &str =
	"{\"access_token\":\"live-token\",\"token_type\":\"bearer\",\"expires_in\":1800}";

fn build_config(server: &MockServer) -> ClientConfig {
	ClientConfig::builder(Environment::Sandbox)
		.token_endpoint(
			Url::parse(&server.url("/oauth/token"))
				.expect("Mock token endpoint should parse successfully."),
		)
		.api_base(
			Url::parse(&server.url("/api/v1/")).expect("Mock API base should parse successfully."),
		)
		.api_key("client:secret")
		.own_account_id("acc-own")
		.build()
		.expect("Client configuration should build successfully.")
}

fn build_manager() -> TokenManager<ReqwestHttpClient> {
	TokenManager::new(ReqwestHttpClient::new().expect("Reqwest client should build."))
}

#[tokio::test]
async fn token_is_cached_after_success() {
	let server = MockServer::start_async().await;
	let config = build_config(&server);
	let manager = build_manager();
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth/token")
				.header("authorization", BASIC_CREDENTIALS)
				.body_includes("grant_type=client_credentials");
			then.status(200).header("content-type", "application/json").body(TOKEN_BODY);
		})
		.await;
	let first = manager.get_token(&config).await.expect("Initial token request should succeed.");
	let second = manager.get_token(&config).await.expect("Cached token request should succeed.");

	assert_eq!(first.secret.expose(), "live-token");
	assert_eq!(second.secret.expose(), "live-token");
	assert_eq!(first.bearer(), "Bearer live-token");
	assert_eq!(manager.exchange_count(), 1);
	assert!(first.expires_at - first.issued_at <= time::Duration::seconds(1_800));

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn concurrent_requests_share_one_exchange() {
	let server = MockServer::start_async().await;
	let config = build_config(&server);
	let manager = build_manager();
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200)
				.header("content-type", "application/json")
				.delay(Duration::from_millis(100))
				.body(TOKEN_BODY);
		})
		.await;
	let (a, b, c, d) = tokio::join!(
		manager.get_token(&config),
		manager.get_token(&config),
		manager.get_token(&config),
		manager.get_token(&config),
	);

	for token in [a, b, c, d] {
		assert_eq!(
			token.expect("Concurrent token request should succeed.").secret.expose(),
			"live-token"
		);
	}

	assert_eq!(manager.exchange_count(), 1);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn concurrent_requests_share_one_failed_exchange() {
	let server = MockServer::start_async().await;
	let config = build_config(&server);
	let manager = build_manager();
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(500)
				.header("content-type", "text/plain")
				.delay(Duration::from_millis(100))
				.body("upstream unavailable");
		})
		.await;
	let (a, b, c, d) = tokio::join!(
		manager.get_token(&config),
		manager.get_token(&config),
		manager.get_token(&config),
		manager.get_token(&config),
	);
	let failures = [a, b, c, d].map(|result| {
		result.expect_err("Every caller should observe the failed exchange.")
	});

	for failure in &failures {
		assert!(matches!(failure, Error::Auth(auth) if auth.status() == Some(500)));
	}

	assert_eq!(manager.exchange_count(), 1);

	mock.assert_calls_async(1).await;

	manager.get_token(&config).await.expect_err("A later caller should exchange again.");

	assert_eq!(manager.exchange_count(), 2);
}

#[tokio::test]
async fn rejected_exchange_is_not_cached() -> color_eyre::Result<()> {
	let server = MockServer::start_async().await;
	let config = build_config(&server);
	let manager = build_manager();
	let mut rejection = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(401)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_client\",\"error_description\":\"Unknown client.\"}");
		})
		.await;
	let err = manager.get_token(&config).await.expect_err("Rejected exchange should fail.");

	match err {
		Error::Auth(AuthError::Rejected { status, error, description }) => {
			assert_eq!(status, Some(401));
			assert_eq!(error, "invalid_client");
			assert_eq!(description.as_deref(), Some("Unknown client."));
		},
		other => panic!("Unexpected token error: {other:?}."),
	}

	rejection.assert_calls_async(1).await;
	rejection.delete_async().await;

	let success = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200).header("content-type", "application/json").body(TOKEN_BODY);
		})
		.await;
	let token = manager.get_token(&config).await?;

	assert_eq!(token.secret.expose(), "live-token");
	assert_eq!(manager.exchange_count(), 2);

	success.assert_calls_async(1).await;

	Ok(())
}

#[tokio::test]
async fn malformed_token_response_is_reported() {
	let server = MockServer::start_async().await;
	let config = build_config(&server);
	let manager = build_manager();

	server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200).header("content-type", "application/json").body("{\"nope\":true}");
		})
		.await;

	let err = manager.get_token(&config).await.expect_err("Malformed token body should fail.");

	assert!(
		matches!(err, Error::Auth(AuthError::UnexpectedResponse { status: Some(200), .. })),
		"Unexpected token error: {err:?}."
	);
}

#[tokio::test]
async fn client_sends_bearer_and_request_id_over_reqwest() {
	let server = MockServer::start_async().await;
	let store = Arc::new(MemoryStore::new());

	store.put_config(build_config(&server)).expect("Memory store should accept the configuration.");

	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200).header("content-type", "application/json").body(TOKEN_BODY);
		})
		.await;
	let account = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/v1/accounts/acc-1")
				.header("authorization", "Bearer live-token")
				.header_exists("x-request-id");
			then.status(200).header("content-type", "application/json").body("{\"id\":\"acc-1\"}");
		})
		.await;
	let client =
		ProviderClient::new(ClientStores::shared(store.clone()), store, ClientOptions::default())
			.expect("Reqwest-backed client should build.");
	let log = client.retrieve_account("acc-1").await.expect("Account call should be logged.");

	assert!(log.success);
	assert_eq!(log.response_status, Some(200));
	assert_eq!(log.retry_status, RetryStatus::None);
	assert_eq!(log.response_payload.as_deref(), Some("{\"id\":\"acc-1\"}"));

	token.assert_calls_async(1).await;
	account.assert_calls_async(1).await;
}
