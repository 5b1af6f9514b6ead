//! Provider account sync.
//!
//! Normalizes provider profiles (email, phone, birth date, address, balance) into
//! [`AccountSnapshot`] rows and upserts them keyed by external account id. A field that fails
//! to normalize is stored as `None` and reported as an issue; the rest of the account is still
//! written.

pub mod normalize;

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	api::{ResponseBody, minor_units_to_major},
	obs::{self, OpKind, OpOutcome, OpSpan},
	store::{AccountStore, StoreError, UpsertOutcome},
};

/// Account as returned by the provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAccount {
	/// Provider account id.
	pub id: String,
	/// Contact email.
	#[serde(default)]
	pub email: Option<String>,
	/// Provider status label.
	#[serde(default)]
	pub status: Option<String>,
	/// KYC verification state.
	#[serde(default)]
	pub kyc_status: Option<String>,
	/// Balance in minor units, as a number or numeric string.
	#[serde(default)]
	pub balance: Option<Value>,
	/// ISO currency code.
	#[serde(default)]
	pub currency: Option<String>,
	/// Personal details.
	#[serde(default)]
	pub profile: Option<RawProfile>,
}

/// Personal details attached to an account.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProfile {
	/// Given name.
	#[serde(default)]
	pub first_name: Option<String>,
	/// Family name.
	#[serde(default)]
	pub last_name: Option<String>,
	/// Birth date in `dd/mm/yyyy` form.
	#[serde(default)]
	pub birth_date: Option<String>,
	/// Phone number.
	#[serde(default)]
	pub phone: Option<RawPhone>,
	/// Postal address.
	#[serde(default)]
	pub address: Option<RawAddress>,
}

/// Phone number split into country code and local part.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPhone {
	/// International dialing code.
	#[serde(default)]
	pub country_code: Option<String>,
	/// Local number.
	pub number: String,
}

/// Postal address as returned by the provider.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAddress {
	/// First line.
	#[serde(default)]
	pub line1: Option<String>,
	/// Second line.
	#[serde(default)]
	pub line2: Option<String>,
	/// City.
	#[serde(default)]
	pub city: Option<String>,
	/// Postal code.
	#[serde(default)]
	pub postal_code: Option<String>,
	/// ISO country code.
	#[serde(default)]
	pub country: Option<String>,
}

/// Normalized postal address.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
	/// First line.
	pub line1: Option<String>,
	/// Second line.
	pub line2: Option<String>,
	/// City.
	pub city: Option<String>,
	/// Postal code.
	pub postal_code: Option<String>,
	/// Upper-case ISO country code.
	pub country: Option<String>,
}
impl PostalAddress {
	fn from_raw(raw: &RawAddress) -> Option<Self> {
		let address = Self {
			line1: normalize::text(raw.line1.as_deref()),
			line2: normalize::text(raw.line2.as_deref()),
			city: normalize::text(raw.city.as_deref()),
			postal_code: normalize::text(raw.postal_code.as_deref()),
			country: normalize::text(raw.country.as_deref()).map(|c| c.to_ascii_uppercase()),
		};

		(address != Self::default()).then_some(address)
	}
}

/// Normalized account row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
	/// Provider account id.
	pub external_account_id: String,
	/// Lower-cased email.
	pub email: Option<String>,
	/// Given name.
	pub first_name: Option<String>,
	/// Family name.
	pub last_name: Option<String>,
	/// Birth date; `None` when missing or malformed.
	pub birth_date: Option<Date>,
	/// Phone number in `+<digits>` form.
	pub phone: Option<String>,
	/// Postal address.
	pub address: Option<PostalAddress>,
	/// Balance in major units.
	pub balance: Decimal,
	/// ISO currency code.
	pub currency: Option<String>,
	/// Provider status label.
	pub status: Option<String>,
	/// KYC verification state.
	pub kyc_status: Option<String>,
	/// Account as received.
	pub raw_payload: String,
	/// Instant of the latest sync; never moves backwards.
	pub last_sync_at: OffsetDateTime,
}

/// Problems found while syncing.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum SyncError {
	/// The birth date is not a valid `dd/mm/yyyy` date; the account is stored without it.
	#[error("Birth date `{raw}` is not a valid dd/mm/yyyy date.")]
	InvalidBirthDate {
		/// Value received from the provider.
		raw: String,
	},
	/// The balance is not an integer amount of minor units; the account is stored with zero.
	#[error("Balance `{raw}` is not an integer amount of minor units.")]
	InvalidBalance {
		/// Value received from the provider.
		raw: String,
	},
	/// The response is not an account or account list.
	#[error("Account response is malformed: {reason}.")]
	MalformedResponse {
		/// Parser failure summary.
		reason: String,
	},
	/// One account does not match the expected schema; it is skipped.
	#[error("Account entry is malformed: {reason}.")]
	MalformedAccount {
		/// Parser failure summary, including the JSON path.
		reason: String,
	},
	/// Account storage failed; the account is skipped.
	#[error(transparent)]
	Storage(#[from] StoreError),
}
impl SyncError {
	/// Whether the account was skipped rather than stored with a degraded field.
	pub fn is_fatal(&self) -> bool {
		!matches!(self, Self::InvalidBirthDate { .. } | Self::InvalidBalance { .. })
	}
}

/// Problem recorded while syncing one account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncIssue {
	/// Provider account id, when known.
	pub external_account_id: Option<String>,
	/// What went wrong.
	pub error: SyncError,
}

/// Counters for one sync run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncSummary {
	/// Accounts created.
	pub inserted: usize,
	/// Accounts refreshed.
	pub updated: usize,
	/// Accounts skipped.
	pub errors: usize,
	/// Fatal and non-fatal problems.
	pub issues: Vec<SyncIssue>,
}
impl SyncSummary {
	fn record_issue(&mut self, external_account_id: Option<String>, error: SyncError) {
		obs::sync_issue(external_account_id.as_deref(), &error);

		if error.is_fatal() {
			self.errors += 1;
		}

		self.issues.push(SyncIssue { external_account_id, error });
	}
}

/// Normalizes and upserts provider accounts.
pub struct AccountSync {
	accounts: Arc<dyn AccountStore>,
}
impl AccountSync {
	/// Creates a sync over the provided store.
	pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
		Self { accounts }
	}

	/// Syncs every account found in `body`.
	pub async fn sync(&self, body: &ResponseBody) -> SyncSummary {
		self.sync_at(body, OffsetDateTime::now_utc()).await
	}

	/// Same as [`Self::sync`] with an explicit sync instant.
	pub async fn sync_at(&self, body: &ResponseBody, now: OffsetDateTime) -> SyncSummary {
		const KIND: OpKind = OpKind::Sync;

		let span = OpSpan::new(KIND, "sync_accounts");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let summary = span
			.instrument(async move {
				let mut summary = SyncSummary::default();
				let entries = match account_entries(body) {
					Ok(entries) => entries,
					Err(e) => {
						summary.record_issue(None, e);

						return summary;
					},
				};

				for entry in entries {
					self.sync_entry(entry, now, &mut summary).await;
				}

				summary
			})
			.await;

		obs::record_op_outcome(
			KIND,
			if summary.errors == 0 { OpOutcome::Success } else { OpOutcome::Failure },
		);

		summary
	}

	async fn sync_entry(&self, entry: Value, now: OffsetDateTime, summary: &mut SyncSummary) {
		let raw_payload = entry.to_string();
		let fallback_id = entry.get("id").and_then(Value::as_str).map(str::to_owned);
		let raw: RawAccount = match serde_path_to_error::deserialize(entry) {
			Ok(raw) => raw,
			Err(e) => {
				summary.record_issue(fallback_id, SyncError::MalformedAccount {
					reason: e.to_string(),
				});

				return;
			},
		};
		let (snapshot, warnings) = snapshot(raw, raw_payload, now);
		let id = snapshot.external_account_id.clone();

		for warning in warnings {
			summary.record_issue(Some(id.clone()), warning);
		}

		match self.accounts.upsert_account(snapshot).await {
			Ok(UpsertOutcome::Inserted) => summary.inserted += 1,
			Ok(UpsertOutcome::Updated) => summary.updated += 1,
			Err(e) => summary.record_issue(Some(id), e.into()),
		}
	}
}
impl Debug for AccountSync {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("AccountSync").finish_non_exhaustive()
	}
}

/// Builds the normalized row, collecting non-fatal field problems.
pub fn snapshot(
	raw: RawAccount,
	raw_payload: String,
	now: OffsetDateTime,
) -> (AccountSnapshot, Vec<SyncError>) {
	let mut warnings = Vec::new();
	let profile = raw.profile.unwrap_or_default();
	let birth_date = profile.birth_date.as_deref().map(str::trim).filter(|v| !v.is_empty());
	let birth_date = birth_date.and_then(|value| match normalize::birth_date(value) {
		Ok(date) => Some(date),
		Err(e) => {
			warnings.push(e);

			None
		},
	});
	let balance = match &raw.balance {
		None | Some(Value::Null) => Some(0),
		Some(Value::Number(number)) => number.as_i64(),
		Some(Value::String(text)) => normalize::minor_units(text),
		Some(_) => None,
	};
	let balance = match balance {
		Some(minor) => minor_units_to_major(minor),
		None => {
			warnings.push(SyncError::InvalidBalance {
				raw: raw.balance.as_ref().map(Value::to_string).unwrap_or_default(),
			});

			Decimal::ZERO
		},
	};
	let snapshot = AccountSnapshot {
		external_account_id: raw.id,
		email: normalize::email(raw.email.as_deref()),
		first_name: normalize::text(profile.first_name.as_deref()),
		last_name: normalize::text(profile.last_name.as_deref()),
		birth_date,
		phone: profile
			.phone
			.as_ref()
			.and_then(|phone| normalize::phone(phone.country_code.as_deref(), &phone.number)),
		address: profile.address.as_ref().and_then(PostalAddress::from_raw),
		balance,
		currency: normalize::text(raw.currency.as_deref()).map(|c| c.to_ascii_uppercase()),
		status: normalize::text(raw.status.as_deref()),
		kyc_status: normalize::text(raw.kyc_status.as_deref()),
		raw_payload,
		last_sync_at: now,
	};

	(snapshot, warnings)
}

/// Extracts accounts from a single-account, array, or `{"accounts": [...]}` response.
pub fn account_entries(body: &ResponseBody) -> Result<Vec<Value>, SyncError> {
	let value = match body {
		ResponseBody::Json(value) => value,
		ResponseBody::Empty => return Ok(Vec::new()),
		ResponseBody::Text(_) =>
			return Err(SyncError::MalformedResponse { reason: "response is not JSON".into() }),
		ResponseBody::Malformed { reason, .. } =>
			return Err(SyncError::MalformedResponse { reason: reason.clone() }),
	};

	match value {
		Value::Array(items) => Ok(items.clone()),
		Value::Object(map) => match map.get("accounts").and_then(Value::as_array) {
			Some(items) => Ok(items.clone()),
			None if map.contains_key("id") => Ok(vec![value.clone()]),
			None => Err(SyncError::MalformedResponse {
				reason: "object is neither an account nor an account list".into(),
			}),
		},
		_ => Err(SyncError::MalformedResponse { reason: "expected an array or object".into() }),
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use rust_decimal_macros::dec;
	use serde_json::json;
	use time::macros::{date, datetime};
	// self
	use super::*;

	fn raw(value: Value) -> RawAccount {
		serde_json::from_value(value).expect("Account fixture should deserialize.")
	}

	#[test]
	fn snapshot_normalizes_profile() {
		let account = raw(json!({
			"id": "acc-1",
			"email": " Jane@Example.com ",
			"balance": 12_345,
			"currency": "eur",
			"profile": {
				"firstName": "Jane",
				"lastName": " Doe ",
				"birthDate": "25/12/1990",
				"phone": { "countryCode": "+33", "number": "6 12 34 56 78" },
				"address": { "line1": "1 Rue de Rivoli", "city": "Paris", "country": "fr" }
			}
		}));
		let (snapshot, warnings) = snapshot(account, "{}".into(), datetime!(2025-01-01 00:00 UTC));

		assert!(warnings.is_empty());
		assert_eq!(snapshot.email.as_deref(), Some("jane@example.com"));
		assert_eq!(snapshot.last_name.as_deref(), Some("Doe"));
		assert_eq!(snapshot.birth_date, Some(date!(1990 - 12 - 25)));
		assert_eq!(snapshot.phone.as_deref(), Some("+33612345678"));
		assert_eq!(snapshot.balance, dec!(123.45));
		assert_eq!(snapshot.currency.as_deref(), Some("EUR"));
		assert_eq!(
			snapshot.address.and_then(|address| address.country),
			Some("FR".to_owned())
		);
	}

	#[test]
	fn malformed_fields_degrade_to_defaults() {
		let account = raw(json!({
			"id": "acc-2",
			"balance": "lots",
			"profile": { "birthDate": "1990-12-25", "address": { "line1": "  " } }
		}));
		let (snapshot, warnings) = snapshot(account, "{}".into(), datetime!(2025-01-01 00:00 UTC));

		assert_eq!(snapshot.birth_date, None);
		assert_eq!(snapshot.balance, Decimal::ZERO);
		assert_eq!(snapshot.address, None);
		assert_eq!(warnings.len(), 2);
		assert!(warnings.iter().all(|warning| !warning.is_fatal()));
	}

	#[test]
	fn entries_accept_single_account_and_lists() {
		let single = ResponseBody::Json(json!({ "id": "acc-1" }));
		let wrapped = ResponseBody::Json(json!({ "accounts": [{ "id": "a" }, { "id": "b" }] }));

		assert_eq!(account_entries(&single).map(|entries| entries.len()).ok(), Some(1));
		assert_eq!(account_entries(&wrapped).map(|entries| entries.len()).ok(), Some(2));
		assert!(account_entries(&ResponseBody::Json(json!({ "oops": 1 }))).is_err());
	}
}
