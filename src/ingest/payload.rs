//! Provider transaction payloads and their classification.

// crates.io
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
// self
use crate::{
	_prelude::*,
	api::{ResponseBody, minor_units_to_major},
	ingest::IngestError,
};

/// Direction of a transfer relative to the operator's own account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
	/// Money arriving.
	Credit,
	/// Money leaving.
	Debit,
}
impl Direction {
	/// Returns the persisted label.
	pub const fn as_str(self) -> &'static str {
		match self {
			Direction::Credit => "credit",
			Direction::Debit => "debit",
		}
	}
}
impl Display for Direction {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Transaction family a payload belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionClass {
	/// Deposit into one of the operator's wallets.
	Incoming,
	/// Wallet-to-wallet transfer.
	PeerToPeer,
}

/// Transaction entry as returned by the provider's list endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
	/// Provider transaction id.
	pub id: String,
	/// Provider status label.
	#[serde(default)]
	pub status: Option<String>,
	/// RFC 3339 creation timestamp.
	pub created_at: String,
	/// Provider payment method code.
	pub method_code: String,
	/// Present on wallet-to-wallet transfers.
	#[serde(default)]
	pub peer_to_peer: Option<PeerToPeerDetails>,
	/// Present on deposits.
	#[serde(default)]
	pub incoming: Option<IncomingDetails>,
}

/// Wallet-to-wallet transfer details; amounts in minor units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerToPeerDetails {
	/// Paying account.
	pub sender_account_id: String,
	/// Receiving account.
	pub receiver_account_id: String,
	/// Amount taken from the sender.
	pub debit_amount: i64,
	/// Amount given to the receiver.
	pub credit_amount: i64,
	/// Commission charged on the transfer.
	#[serde(default)]
	pub commission: Option<i64>,
}

/// Deposit details; amounts in minor units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingDetails {
	/// Account the deposit landed on.
	pub receiver_account_id: String,
	/// Amount credited.
	pub credit_amount: i64,
	/// Commission kept by the provider.
	#[serde(default)]
	pub provider_commission: Option<ProviderCommission>,
}

/// Commission reported on deposits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCommission {
	/// Amount in minor units.
	pub amount: i64,
	/// ISO currency code, when supplied.
	#[serde(default)]
	pub currency: Option<String>,
}

/// Transaction payload narrowed to exactly one family.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionPayload {
	/// Deposit.
	Incoming(IncomingDetails),
	/// Wallet-to-wallet transfer.
	PeerToPeer(PeerToPeerDetails),
}
impl TransactionPayload {
	/// Picks the variant by which details object is present. Both or neither is malformed.
	pub fn classify(raw: &RawTransaction) -> Result<Self, IngestError> {
		match (&raw.incoming, &raw.peer_to_peer) {
			(Some(incoming), None) => Ok(Self::Incoming(incoming.clone())),
			(None, Some(p2p)) => Ok(Self::PeerToPeer(p2p.clone())),
			(Some(_), Some(_)) => Err(IngestError::MalformedEntry {
				reason: "entry carries both incoming and peerToPeer details".into(),
			}),
			(None, None) => Err(IngestError::MalformedEntry {
				reason: "entry carries neither incoming nor peerToPeer details".into(),
			}),
		}
	}

	/// Transaction family.
	pub fn class(&self) -> TransactionClass {
		match self {
			Self::Incoming(_) => TransactionClass::Incoming,
			Self::PeerToPeer(_) => TransactionClass::PeerToPeer,
		}
	}

	/// Direction relative to `own_account_id`. Transfers sent by the operator are debits.
	pub fn direction(&self, own_account_id: &str) -> Direction {
		match self {
			Self::PeerToPeer(p2p) if p2p.sender_account_id == own_account_id => Direction::Debit,
			_ => Direction::Credit,
		}
	}

	/// Signed major-unit amount: negative for debits.
	pub fn signed_amount(&self, own_account_id: &str) -> Decimal {
		match self {
			Self::Incoming(incoming) => minor_units_to_major(incoming.credit_amount),
			Self::PeerToPeer(p2p) => match self.direction(own_account_id) {
				Direction::Debit => -minor_units_to_major(p2p.debit_amount),
				Direction::Credit => minor_units_to_major(p2p.credit_amount),
			},
		}
	}

	/// Account on the other side of the movement.
	///
	/// Deposits report the receiving wallet, which is the external account they are linked by.
	pub fn counterparty<'a>(&'a self, own_account_id: &str) -> &'a str {
		match self {
			Self::Incoming(incoming) => &incoming.receiver_account_id,
			Self::PeerToPeer(p2p) => match self.direction(own_account_id) {
				Direction::Debit => &p2p.receiver_account_id,
				Direction::Credit => &p2p.sender_account_id,
			},
		}
	}

	/// Commission in major units; zero when absent.
	pub fn commission(&self) -> Decimal {
		let minor = match self {
			Self::Incoming(incoming) =>
				incoming.provider_commission.as_ref().map(|commission| commission.amount),
			Self::PeerToPeer(p2p) => p2p.commission,
		};

		minor.map(minor_units_to_major).unwrap_or_default()
	}
}

/// Parsed entry ready for ingestion.
#[derive(Clone, Debug)]
pub struct ParsedTransaction {
	/// Wire shape.
	pub raw: RawTransaction,
	/// Narrowed payload.
	pub payload: TransactionPayload,
	/// Parsed `createdAt`.
	pub occurred_at: OffsetDateTime,
	/// Entry re-serialized for the ledger's raw column.
	pub raw_payload: String,
}
impl ParsedTransaction {
	/// Parses one list entry, reporting the JSON path of any schema mismatch.
	pub fn parse(entry: Value) -> Result<Self, IngestError> {
		let raw_payload = entry.to_string();
		let raw: RawTransaction = serde_path_to_error::deserialize(entry)
			.map_err(|e| IngestError::MalformedEntry { reason: e.to_string() })?;
		let payload = TransactionPayload::classify(&raw)?;
		let occurred_at = OffsetDateTime::parse(&raw.created_at, &Rfc3339).map_err(|e| {
			IngestError::MalformedEntry { reason: format!("createdAt is not RFC 3339: {e}") }
		})?;

		Ok(Self { raw, payload, occurred_at, raw_payload })
	}
}

/// Extracts the entries of a transaction list response.
///
/// Accepts a bare array or an object wrapping it under `transactions`, `data`, or `items`.
pub fn transaction_entries(body: &ResponseBody) -> Result<Vec<Value>, IngestError> {
	let value = match body {
		ResponseBody::Json(value) => value,
		ResponseBody::Empty => return Ok(Vec::new()),
		ResponseBody::Text(_) =>
			return Err(IngestError::MalformedList { reason: "response is not JSON".into() }),
		ResponseBody::Malformed { reason, .. } =>
			return Err(IngestError::MalformedList { reason: reason.clone() }),
	};

	match value {
		Value::Array(items) => Ok(items.clone()),
		Value::Object(map) => ["transactions", "data", "items"]
			.iter()
			.find_map(|key| map.get(*key).and_then(Value::as_array))
			.cloned()
			.ok_or_else(|| IngestError::MalformedList {
				reason: "object carries no transaction array".into(),
			}),
		_ => Err(IngestError::MalformedList { reason: "expected an array or object".into() }),
	}
}

/// Best-effort `id` of an entry that failed to parse.
pub fn entry_id(entry: &Value) -> Option<String> {
	entry.get("id").and_then(Value::as_str).map(str::to_owned)
}
