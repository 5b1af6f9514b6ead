//! Idempotent ingestion of provider transactions into the ledger.
//!
//! Each entry goes through the same steps: parse and classify, skip when the external id is
//! already recorded, derive the signed amount and counterparty, resolve the linked local
//! account, map the operation code, and insert. One bad entry is counted and reported without
//! aborting the rest of the list.

pub mod opcode;
pub mod payload;

pub use opcode::*;
pub use payload::*;

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	api::ResponseBody,
	obs::{self, OpKind, OpOutcome, OpSpan},
	store::{InsertOutcome, LedgerStore, StoreError},
};

/// Import state of a ledger transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
	/// Recorded by the ingestor; downstream posting has not run yet.
	Imported,
}

/// Transaction row written to the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
	/// Provider transaction id; unique across the ledger.
	pub external_transaction_id: String,
	/// Import batch that recorded the row.
	pub import_run_id: String,
	/// External account on the other side of the movement.
	pub counterparty_account_id: String,
	/// Local account linked to the counterparty, if any.
	pub local_account_id: Option<String>,
	/// Signed major-unit amount; negative for debits.
	pub amount: Decimal,
	/// Commission in major units.
	pub commission: Decimal,
	/// Credit or debit.
	pub direction: Direction,
	/// Transaction family.
	pub class: TransactionClass,
	/// Provider method code.
	pub method_code: String,
	/// Ledger operation code.
	pub operation_code: String,
	/// Provider status label.
	pub provider_status: Option<String>,
	/// Provider creation instant.
	pub occurred_at: OffsetDateTime,
	/// Entry as received.
	pub raw_payload: String,
	/// Import state.
	pub import_status: ImportStatus,
	/// Instant the row was recorded.
	pub imported_at: OffsetDateTime,
}

/// Per-entry ingestion failure.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum IngestError {
	/// No operation code is configured for the method code and direction.
	#[error("No operation code is mapped for method `{method_code}` ({direction}).")]
	UnmappedOperation {
		/// Provider method code.
		method_code: String,
		/// Transfer direction.
		direction: Direction,
	},
	/// The response is not a transaction list.
	#[error("Transaction list is malformed: {reason}.")]
	MalformedList {
		/// Parser failure summary.
		reason: String,
	},
	/// One entry does not match the expected schema.
	#[error("Transaction entry is malformed: {reason}.")]
	MalformedEntry {
		/// Parser failure summary, including the JSON path.
		reason: String,
	},
	/// Ledger access failed.
	#[error(transparent)]
	Storage(#[from] StoreError),
}

/// Problem recorded while ingesting a list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngestIssue {
	/// Provider id of the offending entry, when known.
	pub external_transaction_id: Option<String>,
	/// What went wrong.
	pub error: IngestError,
}

/// Counters for one ingestion run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestSummary {
	/// Batch identifier stamped on inserted rows.
	pub import_run_id: String,
	/// Rows inserted.
	pub inserted: usize,
	/// Entries skipped because their id was already recorded.
	pub duplicated: usize,
	/// Entries that could not be ingested.
	pub errors: usize,
	/// Details for each error.
	pub issues: Vec<IngestIssue>,
}
impl IngestSummary {
	fn record_issue(&mut self, external_transaction_id: Option<String>, error: IngestError) {
		obs::ingest_issue(&self.import_run_id, external_transaction_id.as_deref(), &error);

		self.errors += 1;
		self.issues.push(IngestIssue { external_transaction_id, error });
	}
}

enum EntryOutcome {
	Inserted,
	Duplicated,
}

/// Ingests transaction lists for one operator account.
pub struct Ingestor {
	ledger: Arc<dyn LedgerStore>,
	operation_codes: OperationCodeMap,
	own_account_id: String,
}
impl Ingestor {
	/// Creates an ingestor.
	pub fn new(
		ledger: Arc<dyn LedgerStore>,
		operation_codes: OperationCodeMap,
		own_account_id: impl Into<String>,
	) -> Self {
		Self { ledger, operation_codes, own_account_id: own_account_id.into() }
	}

	/// Ingests every entry of a list response.
	pub async fn ingest(&self, body: &ResponseBody, import_run_id: &str) -> IngestSummary {
		self.ingest_at(body, import_run_id, OffsetDateTime::now_utc()).await
	}

	/// Same as [`Self::ingest`] with an explicit import instant.
	pub async fn ingest_at(
		&self,
		body: &ResponseBody,
		import_run_id: &str,
		now: OffsetDateTime,
	) -> IngestSummary {
		const KIND: OpKind = OpKind::Ingest;

		let span = OpSpan::new(KIND, "ingest");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let summary = span
			.instrument(async move {
				let mut summary =
					IngestSummary { import_run_id: import_run_id.to_owned(), ..Default::default() };
				let entries = match transaction_entries(body) {
					Ok(entries) => entries,
					Err(e) => {
						summary.record_issue(None, e);

						return summary;
					},
				};

				for entry in entries {
					let id = entry_id(&entry);

					match self.ingest_entry(entry, import_run_id, now).await {
						Ok(EntryOutcome::Inserted) => summary.inserted += 1,
						Ok(EntryOutcome::Duplicated) => summary.duplicated += 1,
						Err(e) => summary.record_issue(id, e),
					}
				}

				summary
			})
			.await;

		obs::record_ingest(summary.inserted, summary.duplicated, summary.errors);
		obs::record_op_outcome(
			KIND,
			if summary.errors == 0 { OpOutcome::Success } else { OpOutcome::Failure },
		);

		summary
	}

	async fn ingest_entry(
		&self,
		entry: Value,
		import_run_id: &str,
		now: OffsetDateTime,
	) -> Result<EntryOutcome, IngestError> {
		let parsed = ParsedTransaction::parse(entry)?;

		if self.ledger.transaction_exists(&parsed.raw.id).await? {
			return Ok(EntryOutcome::Duplicated);
		}

		let own = self.own_account_id.as_str();
		let direction = parsed.payload.direction(own);
		let counterparty = parsed.payload.counterparty(own).to_owned();
		let local_account_id = self.ledger.local_account_for(&counterparty).await?;
		let operation_code = self
			.operation_codes
			.resolve(&parsed.raw.method_code, direction)
			.ok_or_else(|| IngestError::UnmappedOperation {
				method_code: parsed.raw.method_code.clone(),
				direction,
			})?
			.to_owned();
		let transaction = LedgerTransaction {
			external_transaction_id: parsed.raw.id.clone(),
			import_run_id: import_run_id.to_owned(),
			counterparty_account_id: counterparty,
			local_account_id,
			amount: parsed.payload.signed_amount(own),
			commission: parsed.payload.commission(),
			direction,
			class: parsed.payload.class(),
			method_code: parsed.raw.method_code,
			operation_code,
			provider_status: parsed.raw.status,
			occurred_at: parsed.occurred_at,
			raw_payload: parsed.raw_payload,
			import_status: ImportStatus::Imported,
			imported_at: now,
		};

		match self.ledger.insert_transaction(transaction).await? {
			InsertOutcome::Inserted => Ok(EntryOutcome::Inserted),
			InsertOutcome::Duplicate => Ok(EntryOutcome::Duplicated),
		}
	}
}
impl Debug for Ingestor {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("Ingestor")
			.field("own_account_id", &self.own_account_id)
			.field("operation_codes", &self.operation_codes.len())
			.finish()
	}
}
