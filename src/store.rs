//! Storage contracts and built-in store implementations for call logs, the ledger, and synced
//! accounts.
//!
//! Claims are the only concurrency-sensitive operations: [`CallLogStore::claim_due`] and
//! [`CallLogStore::claim`] must move rows to `processing` atomically so two workers never run
//! the same call, and [`CallLogStore::complete_attempt`] must refuse to overwrite a row that an
//! operator changed, or another worker re-claimed, while the attempt was in flight.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	calllog::{
		CallLog, CallLogFilter, CallLogId, CallLogPage, NewCallLog, PageRequest,
		RetryHistoryEntry, RetryStatus,
	},
	ingest::LedgerTransaction,
	sync::AccountSnapshot,
};

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Persistence contract for call logs and their retry history.
pub trait CallLogStore
where
	Self: Send + Sync,
{
	/// Inserts a new row in `processing` state and returns it with its identifier.
	fn insert_call_log(&self, draft: NewCallLog) -> StoreFuture<'_, CallLog>;

	/// Fetches a row by identifier.
	fn fetch_call_log(&self, id: CallLogId) -> StoreFuture<'_, Option<CallLog>>;

	/// Atomically claims up to `limit` due rows, oldest first.
	fn claim_due(&self, now: OffsetDateTime, limit: usize) -> StoreFuture<'_, Vec<CallLog>>;

	/// Atomically claims one row for a manual retry.
	fn claim(&self, id: CallLogId, now: OffsetDateTime) -> StoreFuture<'_, ClaimOutcome>;

	/// Appends `entry` and stores `log` if the row is still `processing` under the claim taken at
	/// `claimed_at`.
	fn complete_attempt(
		&self,
		log: CallLog,
		claimed_at: Option<OffsetDateTime>,
		entry: RetryHistoryEntry,
	) -> StoreFuture<'_, CompletionOutcome>;

	/// Returns claimed rows that were never dispatched to `pending`; returns how many changed.
	fn release_claims<'a>(
		&'a self,
		ids: &'a [CallLogId],
		now: OffsetDateTime,
	) -> StoreFuture<'a, usize>;

	/// Releases claims taken at or before `claimed_before`; returns how many were released.
	fn recover_stale(
		&self,
		claimed_before: OffsetDateTime,
		now: OffsetDateTime,
	) -> StoreFuture<'_, usize>;

	/// Soft-deletes rows; returns how many changed.
	fn soft_delete<'a>(
		&'a self,
		ids: &'a [CallLogId],
		now: OffsetDateTime,
	) -> StoreFuture<'a, usize>;

	/// Forces a final failure on `pending` or `processing` rows; returns how many changed.
	fn mark_final_failure<'a>(
		&'a self,
		ids: &'a [CallLogId],
		manual_retry_needed: bool,
		now: OffsetDateTime,
	) -> StoreFuture<'a, usize>;

	/// Audit trail for a row, in attempt order.
	fn retry_history(&self, id: CallLogId) -> StoreFuture<'_, Vec<RetryHistoryEntry>>;

	/// Lists rows matching `filter`, newest first.
	fn list_call_logs<'a>(
		&'a self,
		filter: &'a CallLogFilter,
		page: PageRequest,
	) -> StoreFuture<'a, CallLogPage>;
}

/// Persistence contract for ledger transactions and external account links.
pub trait LedgerStore
where
	Self: Send + Sync,
{
	/// Whether a transaction with this provider id was already recorded.
	fn transaction_exists<'a>(&'a self, external_transaction_id: &'a str)
	-> StoreFuture<'a, bool>;

	/// Inserts a transaction unless its provider id is already recorded.
	fn insert_transaction(&self, transaction: LedgerTransaction) -> StoreFuture<'_, InsertOutcome>;

	/// Local account linked to an external account, if any.
	fn local_account_for<'a>(
		&'a self,
		external_account_id: &'a str,
	) -> StoreFuture<'a, Option<String>>;

	/// Links an external account to a local account.
	fn link_account(
		&self,
		external_account_id: String,
		local_account_id: String,
	) -> StoreFuture<'_, ()>;

	/// Transactions recorded by one import run.
	fn transactions_for_run<'a>(
		&'a self,
		import_run_id: &'a str,
	) -> StoreFuture<'a, Vec<LedgerTransaction>>;
}

/// Persistence contract for synced provider accounts.
pub trait AccountStore
where
	Self: Send + Sync,
{
	/// Inserts or replaces the snapshot keyed by external account id.
	fn upsert_account(&self, snapshot: AccountSnapshot) -> StoreFuture<'_, UpsertOutcome>;

	/// Fetches a snapshot by external account id.
	fn fetch_account<'a>(
		&'a self,
		external_account_id: &'a str,
	) -> StoreFuture<'a, Option<AccountSnapshot>>;
}

/// Result of a manual-retry claim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
	/// The row moved to `processing`.
	Claimed(CallLog),
	/// The row exists but its status does not accept a retry.
	Conflict(RetryStatus),
	/// No row has the identifier.
	Missing,
}

/// Result of storing a finished attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompletionOutcome {
	/// The row was updated.
	Applied,
	/// The row left `processing` or was claimed again meanwhile; it is returned unchanged.
	Superseded(CallLog),
	/// No row has the identifier.
	Missing,
}

/// Result of a ledger insert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsertOutcome {
	/// The row was recorded.
	Inserted,
	/// A row with the same provider id already exists.
	Duplicate,
}

/// Result of an account upsert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpsertOutcome {
	/// The account was new.
	Inserted,
	/// An existing account was refreshed.
	Updated,
}

/// Error type produced by store implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// No configuration row has been stored.
	#[error("No client configuration is stored.")]
	MissingConfig,
}
