//! Thread-safe in-memory stores for local development and tests.
//!
//! [`SnapshotStore`] keeps every table in one [`StoreSnapshot`] behind a lock, so each store
//! operation is atomic with respect to the others. The [`Persistence`] parameter decides what
//! happens after a mutation: [`Volatile`] does nothing, while the file backend writes the
//! snapshot to disk.

// self
use crate::{
	_prelude::*,
	calllog::{
		self, CallLog, CallLogFilter, CallLogId, CallLogPage, NewCallLog, PageRequest,
		RetryHistoryEntry, RetryStatus,
	},
	config::{ClientConfig, ConfigSource},
	ingest::LedgerTransaction,
	store::{
		AccountStore, CallLogStore, ClaimOutcome, CompletionOutcome, InsertOutcome, LedgerStore,
		StoreError, StoreFuture, UpsertOutcome,
	},
	sync::AccountSnapshot,
};

/// In-memory store that forgets everything on drop.
pub type MemoryStore = SnapshotStore<Volatile>;

/// Hook run after every mutation while the write lock is still held.
pub trait Persistence
where
	Self: 'static + Send + Sync,
{
	/// Saves the snapshot.
	fn persist(&self, snapshot: &StoreSnapshot) -> Result<(), StoreError>;
}

/// [`Persistence`] that keeps data in memory only.
#[derive(Clone, Copy, Debug, Default)]
pub struct Volatile;
impl Persistence for Volatile {
	fn persist(&self, _: &StoreSnapshot) -> Result<(), StoreError> {
		Ok(())
	}
}

/// Every table held by a [`SnapshotStore`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
	next_call_log_id: CallLogId,
	call_logs: BTreeMap<CallLogId, CallLog>,
	retry_history: BTreeMap<CallLogId, Vec<RetryHistoryEntry>>,
	transactions: BTreeMap<String, LedgerTransaction>,
	account_links: BTreeMap<String, String>,
	accounts: BTreeMap<String, AccountSnapshot>,
	config: Option<ClientConfig>,
}
impl StoreSnapshot {
	fn insert_call_log(&mut self, draft: NewCallLog) -> CallLog {
		self.next_call_log_id += 1;

		let log = draft.into_log(self.next_call_log_id);

		self.call_logs.insert(log.id, log.clone());

		log
	}

	fn claim_due(&mut self, now: OffsetDateTime, limit: usize) -> Vec<CallLog> {
		let mut due = self
			.call_logs
			.values()
			.filter(|log| log.is_due_at(now))
			.map(|log| (log.created_at, log.id))
			.collect::<Vec<_>>();

		due.sort_unstable();
		due.truncate(limit);

		let mut claimed = Vec::with_capacity(due.len());

		for (_, id) in due {
			if let Some(log) = self.call_logs.get_mut(&id) {
				calllog::claim(log, now);
				claimed.push(log.clone());
			}
		}

		claimed
	}

	fn claim(&mut self, id: CallLogId, now: OffsetDateTime) -> ClaimOutcome {
		match self.call_logs.get_mut(&id) {
			Some(log) if log.retry_status.accepts_manual_retry() => {
				calllog::claim(log, now);

				ClaimOutcome::Claimed(log.clone())
			},
			Some(log) => ClaimOutcome::Conflict(log.retry_status),
			None => ClaimOutcome::Missing,
		}
	}

	fn complete_attempt(
		&mut self,
		log: CallLog,
		claimed_at: Option<OffsetDateTime>,
		entry: RetryHistoryEntry,
	) -> CompletionOutcome {
		let Some(current) = self.call_logs.get_mut(&log.id) else {
			return CompletionOutcome::Missing;
		};

		self.retry_history.entry(log.id).or_default().push(entry);

		if current.retry_status == RetryStatus::Processing && current.claimed_at == claimed_at {
			*current = log;

			CompletionOutcome::Applied
		} else {
			CompletionOutcome::Superseded(current.clone())
		}
	}

	fn recover_stale(&mut self, claimed_before: OffsetDateTime, now: OffsetDateTime) -> usize {
		let mut recovered = 0;

		for log in self.call_logs.values_mut() {
			let stale = log.retry_status == RetryStatus::Processing
				&& log.claimed_at.is_none_or(|at| at <= claimed_before);

			if stale {
				calllog::release_stale_claim(log, now);

				recovered += 1;
			}
		}

		recovered
	}

	fn release_claims(&mut self, ids: &[CallLogId], now: OffsetDateTime) -> usize {
		let mut released = 0;

		for id in ids {
			if let Some(log) = self
				.call_logs
				.get_mut(id)
				.filter(|log| log.retry_status == RetryStatus::Processing)
			{
				calllog::release_stale_claim(log, now);

				released += 1;
			}
		}

		released
	}

	fn soft_delete(&mut self, ids: &[CallLogId], now: OffsetDateTime) -> usize {
		let mut changed = 0;

		for id in ids {
			if let Some(log) =
				self.call_logs.get_mut(id).filter(|log| log.retry_status.is_deletable())
			{
				calllog::soft_delete(log, now);

				changed += 1;
			}
		}

		changed
	}

	fn mark_final_failure(
		&mut self,
		ids: &[CallLogId],
		manual_retry_needed: bool,
		now: OffsetDateTime,
	) -> usize {
		let mut changed = 0;

		for id in ids {
			if let Some(log) =
				self.call_logs.get_mut(id).filter(|log| log.retry_status.accepts_forced_failure())
			{
				calllog::force_final_failure(log, manual_retry_needed, now);

				changed += 1;
			}
		}

		changed
	}

	fn retry_history(&self, id: CallLogId) -> Vec<RetryHistoryEntry> {
		let mut history = self.retry_history.get(&id).cloned().unwrap_or_default();

		history.sort_by_key(|entry| entry.attempt_number);

		history
	}

	fn list_call_logs(&self, filter: &CallLogFilter, page: PageRequest) -> CallLogPage {
		let mut matching =
			self.call_logs.values().filter(|log| filter.matches(log)).collect::<Vec<_>>();

		matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

		let total = matching.len();
		let items = matching
			.into_iter()
			.skip(page.offset())
			.take(page.per_page as usize)
			.cloned()
			.collect();

		CallLogPage { items, total, page }
	}

	fn insert_transaction(&mut self, transaction: LedgerTransaction) -> InsertOutcome {
		if self.transactions.contains_key(&transaction.external_transaction_id) {
			return InsertOutcome::Duplicate;
		}

		self.transactions.insert(transaction.external_transaction_id.clone(), transaction);

		InsertOutcome::Inserted
	}

	fn transactions_for_run(&self, import_run_id: &str) -> Vec<LedgerTransaction> {
		self.transactions.values().filter(|tx| tx.import_run_id == import_run_id).cloned().collect()
	}

	fn upsert_account(&mut self, mut snapshot: AccountSnapshot) -> UpsertOutcome {
		match self.accounts.get_mut(&snapshot.external_account_id) {
			Some(existing) => {
				snapshot.last_sync_at = snapshot.last_sync_at.max(existing.last_sync_at);
				*existing = snapshot;

				UpsertOutcome::Updated
			},
			None => {
				self.accounts.insert(snapshot.external_account_id.clone(), snapshot);

				UpsertOutcome::Inserted
			},
		}
	}
}

/// Store backed by one locked [`StoreSnapshot`].
pub struct SnapshotStore<P>
where
	P: Persistence,
{
	state: Arc<RwLock<StoreSnapshot>>,
	persistence: Arc<P>,
}
impl<P> SnapshotStore<P>
where
	P: Persistence,
{
	pub(crate) fn from_parts(snapshot: StoreSnapshot, persistence: P) -> Self {
		Self { state: Arc::new(RwLock::new(snapshot)), persistence: Arc::new(persistence) }
	}

	/// Stores the configuration returned by [`ConfigSource::load`].
	pub fn put_config(&self, config: ClientConfig) -> Result<(), StoreError> {
		self.write(|state| state.config = Some(config))
	}

	fn read<T>(&self, f: impl FnOnce(&StoreSnapshot) -> T) -> T {
		f(&self.state.read())
	}

	fn write<T>(&self, f: impl FnOnce(&mut StoreSnapshot) -> T) -> Result<T, StoreError> {
		let mut guard = self.state.write();
		let output = f(&mut guard);

		self.persistence.persist(&guard)?;

		Ok(output)
	}
}
impl MemoryStore {
	/// Creates an empty in-memory store.
	pub fn new() -> Self {
		Self::from_parts(StoreSnapshot::default(), Volatile)
	}
}
impl Default for MemoryStore {
	fn default() -> Self {
		Self::new()
	}
}
impl<P> Clone for SnapshotStore<P>
where
	P: Persistence,
{
	fn clone(&self) -> Self {
		Self { state: self.state.clone(), persistence: self.persistence.clone() }
	}
}
impl<P> Debug for SnapshotStore<P>
where
	P: Persistence,
{
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		let state = self.state.read();

		f.debug_struct("SnapshotStore")
			.field("call_logs", &state.call_logs.len())
			.field("transactions", &state.transactions.len())
			.field("accounts", &state.accounts.len())
			.finish()
	}
}
impl<P> CallLogStore for SnapshotStore<P>
where
	P: Persistence,
{
	fn insert_call_log(&self, draft: NewCallLog) -> StoreFuture<'_, CallLog> {
		Box::pin(async move { self.write(|state| state.insert_call_log(draft)) })
	}

	fn fetch_call_log(&self, id: CallLogId) -> StoreFuture<'_, Option<CallLog>> {
		Box::pin(async move { Ok(self.read(|state| state.call_logs.get(&id).cloned())) })
	}

	fn claim_due(&self, now: OffsetDateTime, limit: usize) -> StoreFuture<'_, Vec<CallLog>> {
		Box::pin(async move { self.write(|state| state.claim_due(now, limit)) })
	}

	fn claim(&self, id: CallLogId, now: OffsetDateTime) -> StoreFuture<'_, ClaimOutcome> {
		Box::pin(async move { self.write(|state| state.claim(id, now)) })
	}

	fn complete_attempt(
		&self,
		log: CallLog,
		claimed_at: Option<OffsetDateTime>,
		entry: RetryHistoryEntry,
	) -> StoreFuture<'_, CompletionOutcome> {
		Box::pin(async move { self.write(|state| state.complete_attempt(log, claimed_at, entry)) })
	}

	fn release_claims<'a>(
		&'a self,
		ids: &'a [CallLogId],
		now: OffsetDateTime,
	) -> StoreFuture<'a, usize> {
		Box::pin(async move { self.write(|state| state.release_claims(ids, now)) })
	}

	fn recover_stale(
		&self,
		claimed_before: OffsetDateTime,
		now: OffsetDateTime,
	) -> StoreFuture<'_, usize> {
		Box::pin(async move { self.write(|state| state.recover_stale(claimed_before, now)) })
	}

	fn soft_delete<'a>(
		&'a self,
		ids: &'a [CallLogId],
		now: OffsetDateTime,
	) -> StoreFuture<'a, usize> {
		Box::pin(async move { self.write(|state| state.soft_delete(ids, now)) })
	}

	fn mark_final_failure<'a>(
		&'a self,
		ids: &'a [CallLogId],
		manual_retry_needed: bool,
		now: OffsetDateTime,
	) -> StoreFuture<'a, usize> {
		Box::pin(async move {
			self.write(|state| state.mark_final_failure(ids, manual_retry_needed, now))
		})
	}

	fn retry_history(&self, id: CallLogId) -> StoreFuture<'_, Vec<RetryHistoryEntry>> {
		Box::pin(async move { Ok(self.read(|state| state.retry_history(id))) })
	}

	fn list_call_logs<'a>(
		&'a self,
		filter: &'a CallLogFilter,
		page: PageRequest,
	) -> StoreFuture<'a, CallLogPage> {
		Box::pin(async move { Ok(self.read(|state| state.list_call_logs(filter, page))) })
	}
}
impl<P> LedgerStore for SnapshotStore<P>
where
	P: Persistence,
{
	fn transaction_exists<'a>(
		&'a self,
		external_transaction_id: &'a str,
	) -> StoreFuture<'a, bool> {
		Box::pin(async move {
			Ok(self.read(|state| state.transactions.contains_key(external_transaction_id)))
		})
	}

	fn insert_transaction(&self, transaction: LedgerTransaction) -> StoreFuture<'_, InsertOutcome> {
		Box::pin(async move { self.write(|state| state.insert_transaction(transaction)) })
	}

	fn local_account_for<'a>(
		&'a self,
		external_account_id: &'a str,
	) -> StoreFuture<'a, Option<String>> {
		Box::pin(async move {
			Ok(self.read(|state| state.account_links.get(external_account_id).cloned()))
		})
	}

	fn link_account(
		&self,
		external_account_id: String,
		local_account_id: String,
	) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.write(|state| {
				state.account_links.insert(external_account_id, local_account_id);
			})
		})
	}

	fn transactions_for_run<'a>(
		&'a self,
		import_run_id: &'a str,
	) -> StoreFuture<'a, Vec<LedgerTransaction>> {
		Box::pin(async move { Ok(self.read(|state| state.transactions_for_run(import_run_id))) })
	}
}
impl<P> AccountStore for SnapshotStore<P>
where
	P: Persistence,
{
	fn upsert_account(&self, snapshot: AccountSnapshot) -> StoreFuture<'_, UpsertOutcome> {
		Box::pin(async move { self.write(|state| state.upsert_account(snapshot)) })
	}

	fn fetch_account<'a>(
		&'a self,
		external_account_id: &'a str,
	) -> StoreFuture<'a, Option<AccountSnapshot>> {
		Box::pin(async move {
			Ok(self.read(|state| state.accounts.get(external_account_id).cloned()))
		})
	}
}
impl<P> ConfigSource for SnapshotStore<P>
where
	P: Persistence,
{
	fn load(&self) -> StoreFuture<'_, ClientConfig> {
		Box::pin(async move {
			self.read(|state| state.config.clone()).ok_or(StoreError::MissingConfig)
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;
	use crate::api::ApiRequest;

	const T0: OffsetDateTime = datetime!(2025-01-01 00:00 UTC);

	fn pending(state: &mut StoreSnapshot, created_at: OffsetDateTime) -> CallLogId {
		let draft = NewCallLog::new(ApiRequest::get("accounts/1"), created_at);
		let id = state.insert_call_log(draft).id;
		let log = state.call_logs.get_mut(&id).expect("Inserted log should exist.");

		log.retry_status = RetryStatus::Pending;
		log.claimed_at = None;
		log.next_retry_at = Some(created_at);

		id
	}

	#[test]
	fn claim_due_takes_oldest_first_and_only_once() {
		let mut state = StoreSnapshot::default();
		let newer = pending(&mut state, datetime!(2025-01-01 00:02 UTC));
		let older = pending(&mut state, datetime!(2025-01-01 00:01 UTC));
		let now = datetime!(2025-01-01 01:00 UTC);
		let claimed = state.claim_due(now, 1);

		assert_eq!(claimed.iter().map(|log| log.id).collect::<Vec<_>>(), vec![older]);
		assert_eq!(claimed[0].retry_status, RetryStatus::Processing);

		let second = state.claim_due(now, 10);

		assert_eq!(second.iter().map(|log| log.id).collect::<Vec<_>>(), vec![newer]);
		assert!(state.claim_due(now, 10).is_empty());
	}

	fn success_entry(id: CallLogId) -> RetryHistoryEntry {
		RetryHistoryEntry {
			api_call_log_id: id,
			attempt_number: 1,
			response_status: Some(200),
			success: true,
			error_message: None,
			failure_kind: None,
			duration_ms: 5,
			response_payload: None,
			created_at: T0,
		}
	}

	#[test]
	fn completion_is_refused_after_operator_change() {
		let mut state = StoreSnapshot::default();
		let id = pending(&mut state, T0);
		let claimed = state.claim_due(T0, 1).remove(0);
		let claimed_at = claimed.claimed_at;

		state.soft_delete(&[id], T0);

		let outcome = state.complete_attempt(claimed, claimed_at, success_entry(id));

		assert!(matches!(
			outcome,
			CompletionOutcome::Superseded(log) if log.retry_status == RetryStatus::Deleted
		));
		assert_eq!(state.retry_history(id).len(), 1);
	}

	#[test]
	fn completion_is_refused_after_the_claim_is_taken_again() {
		let mut state = StoreSnapshot::default();
		let id = pending(&mut state, T0);
		let first = state.claim_due(T0, 1).remove(0);
		let first_claim = first.claimed_at;
		let later = datetime!(2025-01-01 00:20 UTC);

		assert_eq!(state.recover_stale(T0, later), 1);

		let second = state.claim_due(later, 1).remove(0);

		assert!(matches!(
			state.complete_attempt(first, first_claim, success_entry(id)),
			CompletionOutcome::Superseded(log) if log.claimed_at == Some(later)
		));

		let second_claim = second.claimed_at;

		assert_eq!(
			state.complete_attempt(second, second_claim, success_entry(id)),
			CompletionOutcome::Applied
		);
		assert_eq!(state.retry_history(id).len(), 2);
	}

	#[test]
	fn released_claims_return_to_pending() {
		let mut state = StoreSnapshot::default();
		let claimed = pending(&mut state, T0);
		let untouched = pending(&mut state, T0);

		state.claim(claimed, T0);

		assert_eq!(state.release_claims(&[claimed, untouched], T0), 1);
		assert_eq!(state.call_logs[&claimed].retry_status, RetryStatus::Pending);
		assert_eq!(state.call_logs[&claimed].claimed_at, None);
		assert_eq!(state.call_logs[&untouched].retry_status, RetryStatus::Pending);
	}

	#[test]
	fn stale_claims_are_released() {
		let mut state = StoreSnapshot::default();
		let id = state.insert_call_log(NewCallLog::new(ApiRequest::get("accounts/1"), T0)).id;
		let now = datetime!(2025-01-01 01:00 UTC);

		assert_eq!(state.recover_stale(datetime!(2024-12-31 23:00 UTC), now), 0);
		assert_eq!(state.recover_stale(datetime!(2025-01-01 00:30 UTC), now), 1);
		assert_eq!(state.call_logs[&id].retry_status, RetryStatus::Pending);
		assert_eq!(state.call_logs[&id].next_retry_at, Some(now));
	}

	#[test]
	fn manual_claim_reports_conflicts() {
		let mut state = StoreSnapshot::default();
		let id = state.insert_call_log(NewCallLog::new(ApiRequest::get("accounts/1"), T0)).id;

		assert_eq!(state.claim(id, T0), ClaimOutcome::Conflict(RetryStatus::Processing));
		assert_eq!(state.claim(id + 1, T0), ClaimOutcome::Missing);
	}

	#[test]
	fn forced_failure_only_touches_open_rows() {
		let mut state = StoreSnapshot::default();
		let open = pending(&mut state, T0);
		let done = pending(&mut state, T0);

		state.call_logs.get_mut(&done).expect("Fixture should exist.").retry_status =
			RetryStatus::Success;

		assert_eq!(state.mark_final_failure(&[open, done], true, T0), 1);
		assert!(state.call_logs[&open].final_failure);
		assert!(state.call_logs[&open].manual_retry_needed);
		assert!(!state.call_logs[&done].final_failure);
	}
}
