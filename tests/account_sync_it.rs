mod common;

// std
use std::sync::Arc;
// crates.io
use rust_decimal_macros::dec;
use serde_json::json;
use time::{Duration, OffsetDateTime, macros::date};
// self
use common::*;
use payments_relay::{
	api::ResponseBody,
	calllog::RetryStatus,
	store::{AccountStore, MemoryStore},
	sync::{AccountSync, SyncError},
};

fn account_body(balance: serde_json::Value) -> String {
	json!({
		"id": "acc-1",
		"email": "  Jane.Doe@Example.COM ",
		"status": "active",
		"kycStatus": "verified",
		"balance": balance,
		"currency": "eur",
		"profile": {
			"firstName": "Jane",
			"lastName": " Doe ",
			"birthDate": "07/11/1990",
			"phone": { "countryCode": "+34", "number": "600 123 456" },
			"address": { "line1": "Calle Mayor 1", "city": "Madrid", "country": "es" }
		}
	})
	.to_string()
}

#[tokio::test]
async fn sync_account_normalizes_and_upserts_the_profile() {
	let (client, transport, store) = build_client(test_config());

	transport.script("accounts/acc-1", [Reply::ok(account_body(json!(123_456)))]);

	let run = client.sync_account("acc-1").await.expect("Account sync should succeed.");
	let summary = run.summary.expect("Successful retrieval should be synced.");

	assert!(run.call_log.success);
	assert_eq!((summary.inserted, summary.updated, summary.errors), (1, 0, 0));

	let account = store
		.fetch_account("acc-1")
		.await
		.expect("Account lookup should succeed.")
		.expect("Synced account should be stored.");
	let address = account.address.as_ref().expect("Address should be normalized.");

	assert_eq!(account.email.as_deref(), Some("jane.doe@example.com"));
	assert_eq!(account.last_name.as_deref(), Some("Doe"));
	assert_eq!(account.birth_date, Some(date!(1990 - 11 - 07)));
	assert_eq!(account.phone.as_deref(), Some("+34600123456"));
	assert_eq!(address.city.as_deref(), Some("Madrid"));
	assert_eq!(address.country.as_deref(), Some("ES"));
	assert_eq!(account.balance, dec!(1234.56));
	assert_eq!(account.currency.as_deref(), Some("EUR"));
	assert_eq!(account.kyc_status.as_deref(), Some("verified"));
}

#[tokio::test]
async fn resync_updates_the_existing_row() {
	let (client, transport, store) = build_client(test_config());

	transport.script("accounts/acc-1", [
		Reply::ok(account_body(json!(100))),
		Reply::ok(account_body(json!("250"))),
	]);

	client.sync_account("acc-1").await.expect("First sync should succeed.");

	let second = client
		.sync_account("acc-1")
		.await
		.expect("Second sync should succeed.")
		.summary
		.expect("Successful retrieval should be synced.");
	let account = store
		.fetch_account("acc-1")
		.await
		.expect("Account lookup should succeed.")
		.expect("Synced account should be stored.");

	assert_eq!((second.inserted, second.updated), (0, 1));
	assert_eq!(account.balance, dec!(2.50));
}

#[tokio::test]
async fn failed_retrieval_is_synced_after_its_retry() {
	let (client, transport, store) = build_client(test_config());

	transport.script("accounts/acc-1", [Reply::status(500), Reply::ok(account_body(json!(null)))]);

	let run = client.sync_account("acc-1").await.expect("Failed retrieval should be logged.");

	assert!(run.summary.is_none());
	assert_eq!(run.call_log.retry_status, RetryStatus::Pending);

	client.sweep().await.expect("Sweep should succeed.");

	let summary = client
		.sync_call_log(run.call_log.id)
		.await
		.expect("Syncing the retried call should succeed.")
		.expect("Retried call should carry an account.");
	let account = store
		.fetch_account("acc-1")
		.await
		.expect("Account lookup should succeed.")
		.expect("Synced account should be stored.");

	assert_eq!(summary.inserted, 1);
	assert_eq!(account.balance, dec!(0));
}

#[tokio::test]
async fn bad_fields_degrade_without_dropping_the_account() {
	let store = Arc::new(MemoryStore::new());
	let sync = AccountSync::new(store.clone());
	let body = ResponseBody::Json(json!({
		"accounts": [
			{ "id": "acc-2", "balance": "lots", "profile": { "birthDate": "31/02/1990" } },
			{ "email": "missing-id@example.com" }
		]
	}));
	let summary = sync.sync(&body).await;

	assert_eq!(summary.inserted, 1);
	assert_eq!(summary.errors, 1);
	assert_eq!(summary.issues.len(), 3);
	assert!(
		summary.issues.iter().any(|issue| matches!(issue.error, SyncError::InvalidBirthDate { .. }))
	);
	assert!(
		summary.issues.iter().any(|issue| matches!(issue.error, SyncError::InvalidBalance { .. }))
	);
	assert!(
		summary.issues.iter().any(|issue| matches!(issue.error, SyncError::MalformedAccount { .. }))
	);

	let account = store
		.fetch_account("acc-2")
		.await
		.expect("Account lookup should succeed.")
		.expect("Account with bad fields should still be stored.");

	assert_eq!(account.birth_date, None);
	assert_eq!(account.balance, dec!(0));
}

#[tokio::test]
async fn last_sync_time_never_moves_backwards() {
	let store = Arc::new(MemoryStore::new());
	let sync = AccountSync::new(store.clone());
	let body = ResponseBody::Json(json!({ "id": "acc-3", "balance": 10 }));
	let now = OffsetDateTime::now_utc();

	sync.sync_at(&body, now).await;

	let stale = sync.sync_at(&body, now - Duration::hours(1)).await;
	let account = store
		.fetch_account("acc-3")
		.await
		.expect("Account lookup should succeed.")
		.expect("Synced account should be stored.");

	assert_eq!(stale.updated, 1);
	assert_eq!(account.last_sync_at, now);
}
