//! Typed provider operations and the call-then-ingest pipelines built on them.

// self
use crate::{
	_prelude::*,
	api::{ApiRequest, TransactionFeed, TransactionQuery},
	calllog::{CallLog, CallLogId},
	client::ProviderClient,
	http::ProviderHttpClient,
	ingest::{IngestSummary, Ingestor},
	sync::{AccountSync, SyncSummary},
};

/// A logged call and, when it succeeded, what was derived from its response.
#[derive(Clone, Debug)]
pub struct PipelineRun<S> {
	/// Row for the provider call.
	pub call_log: CallLog,
	/// Pipeline result; `None` while the call has not succeeded.
	pub summary: Option<S>,
}

impl<C> ProviderClient<C>
where
	C: ?Sized + ProviderHttpClient,
{
	/// Fetches an account profile.
	pub async fn retrieve_account(&self, account_id: &str) -> Result<CallLog> {
		self.call(ApiRequest::retrieve_account(account_id)).await
	}

	/// Fetches the KYC status of an account.
	pub async fn kyc_status(&self, account_id: &str) -> Result<CallLog> {
		self.call(ApiRequest::kyc_status(account_id)).await
	}

	/// Fetches the balances of an account.
	pub async fn balances(&self, account_id: &str) -> Result<CallLog> {
		self.call(ApiRequest::balances(account_id)).await
	}

	/// Lists one page of a transaction feed.
	pub async fn list_transactions(
		&self,
		feed: TransactionFeed,
		query: &TransactionQuery,
	) -> Result<CallLog> {
		self.call(ApiRequest::list_transactions(feed, query)).await
	}

	/// Lists incoming (deposit) transactions.
	pub async fn list_incoming_transactions(&self, query: &TransactionQuery) -> Result<CallLog> {
		self.list_transactions(TransactionFeed::Incoming, query).await
	}

	/// Lists peer-to-peer transactions.
	pub async fn list_peer_to_peer_transactions(
		&self,
		query: &TransactionQuery,
	) -> Result<CallLog> {
		self.list_transactions(TransactionFeed::PeerToPeer, query).await
	}

	/// Lists a transaction feed and ingests the page into the ledger.
	///
	/// A failed listing is left to the retry machinery; ingest it later with
	/// [`Self::ingest_call_log`].
	pub async fn import_transactions(
		&self,
		feed: TransactionFeed,
		query: &TransactionQuery,
		import_run_id: &str,
	) -> Result<PipelineRun<IngestSummary>> {
		let call_log = self.list_transactions(feed, query).await?;
		let summary = self.ingest_log(&call_log, import_run_id).await?;

		Ok(PipelineRun { call_log, summary })
	}

	/// Ingests the stored response of a successful listing call.
	///
	/// Returns `None` when the call has not succeeded yet. Re-running is safe: already recorded
	/// transactions count as duplicates.
	pub async fn ingest_call_log(
		&self,
		id: CallLogId,
		import_run_id: &str,
	) -> Result<Option<IngestSummary>> {
		let call_log = self.call_log(id).await?;

		self.ingest_log(&call_log, import_run_id).await
	}

	/// Retrieves an account and upserts its normalized snapshot.
	pub async fn sync_account(&self, account_id: &str) -> Result<PipelineRun<SyncSummary>> {
		let call_log = self.retrieve_account(account_id).await?;
		let summary = self.sync_log(&call_log).await;

		Ok(PipelineRun { call_log, summary })
	}

	/// Syncs accounts from the stored response of a successful retrieval call.
	pub async fn sync_call_log(&self, id: CallLogId) -> Result<Option<SyncSummary>> {
		let call_log = self.call_log(id).await?;

		Ok(self.sync_log(&call_log).await)
	}

	async fn ingest_log(
		&self,
		call_log: &CallLog,
		import_run_id: &str,
	) -> Result<Option<IngestSummary>> {
		let Some(body) = call_log.response_body().filter(|_| call_log.success) else {
			return Ok(None);
		};
		let config = self.client_config().await?;
		let ingestor = Ingestor::new(
			self.stores.ledger.clone(),
			config.operation_code_map()?,
			config.own_account_id.clone(),
		);

		Ok(Some(ingestor.ingest(&body, import_run_id).await))
	}

	async fn sync_log(&self, call_log: &CallLog) -> Option<SyncSummary> {
		let body = call_log.response_body().filter(|_| call_log.success)?;

		Some(AccountSync::new(self.stores.accounts.clone()).sync(&body).await)
	}
}
