//! Operator contract: manual retries, bulk status changes, and call-log inspection.

// self
use crate::{
	_prelude::*,
	calllog::{
		AttemptKind, CallLog, CallLogFilter, CallLogId, CallLogPage, PageRequest,
		RetryHistoryEntry,
	},
	client::{ProviderClient, SweepReport, dispatch},
	http::ProviderHttpClient,
	obs::{self, OpKind, OpOutcome, OpSpan},
	store::ClaimOutcome,
};

impl<C> ProviderClient<C>
where
	C: ?Sized + ProviderHttpClient,
{
	/// Retries one call immediately, ignoring its schedule.
	///
	/// Accepted from `none`, `pending`, `success`, and `failed`; a row that is `processing` or
	/// `deleted` yields [`Error::RetryUnavailable`].
	pub async fn retry_call(&self, id: CallLogId) -> Result<CallLog> {
		const KIND: OpKind = OpKind::ManualRetry;

		let span = OpSpan::new(KIND, "retry_call");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async move {
				let config = self.client_config().await?;
				let now = OffsetDateTime::now_utc();
				let log = match self.stores.call_logs.claim(id, now).await? {
					ClaimOutcome::Claimed(log) => log,
					ClaimOutcome::Conflict(status) =>
						return Err(Error::RetryUnavailable { id, status }),
					ClaimOutcome::Missing => return Err(Error::CallLogNotFound { id }),
				};
				self.dispatch_claimed(log, AttemptKind::Manual, &config).await
			})
			.await;

		dispatch::record_attempt_outcome(KIND, &result);

		result
	}

	/// Soft-deletes calls; returns how many rows changed.
	pub async fn soft_delete(&self, ids: &[CallLogId]) -> Result<usize> {
		Ok(self.stores.call_logs.soft_delete(ids, OffsetDateTime::now_utc()).await?)
	}

	/// Forces `pending` or `processing` calls into final failure; returns how many rows changed.
	///
	/// The rows request manual attention when manual retries are enabled.
	pub async fn mark_final_failure(&self, ids: &[CallLogId]) -> Result<usize> {
		let config = self.client_config().await?;

		Ok(self
			.stores
			.call_logs
			.mark_final_failure(ids, config.manual_retry_enabled, OffsetDateTime::now_utc())
			.await?)
	}

	/// Runs a sweep immediately instead of waiting for the background interval.
	pub async fn requeue_pending(&self) -> Result<SweepReport> {
		self.sweep().await
	}

	/// Fetches a call log.
	pub async fn call_log(&self, id: CallLogId) -> Result<CallLog> {
		self.stores.call_logs.fetch_call_log(id).await?.ok_or(Error::CallLogNotFound { id })
	}

	/// Audit trail of a call, one entry per attempt.
	pub async fn retry_history(&self, id: CallLogId) -> Result<Vec<RetryHistoryEntry>> {
		self.call_log(id).await?;

		Ok(self.stores.call_logs.retry_history(id).await?)
	}

	/// Lists calls matching `filter`, newest first.
	pub async fn list_call_logs(
		&self,
		filter: &CallLogFilter,
		page: PageRequest,
	) -> Result<CallLogPage> {
		Ok(self.stores.call_logs.list_call_logs(filter, page).await?)
	}
}
