//! First dispatch and retry sweeps.
//!
//! Every attempt follows the same path: the claimed row is replayed through the queue, the
//! outcome is folded into the row by the retry state machine, and the store applies it only if
//! the row is still `processing` under the same claim. Sweeps enqueue their whole batch before
//! awaiting any ticket so retries keep creation order in the FIFO while still running
//! concurrently. A row that fails to complete does not stop the rest of its batch.

// self
use crate::{
	_prelude::*,
	api::ApiRequest,
	auth::TokenKey,
	calllog::{self, AttemptKind, AttemptResult, CallLog, NewCallLog, RetryStatus},
	client::ProviderClient,
	config::ClientConfig,
	http::ProviderHttpClient,
	obs::{self, OpKind, OpOutcome, OpSpan},
	queue::{DispatchRequest, Ticket},
	store::CompletionOutcome,
};

/// What one sweep did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
	/// Abandoned `processing` claims returned to `pending`.
	pub recovered: usize,
	/// Due rows claimed by this sweep.
	pub claimed: usize,
	/// Retries that succeeded.
	pub succeeded: usize,
	/// Retries that failed and were scheduled again.
	pub rescheduled: usize,
	/// Retries that failed and exhausted the retry budget.
	pub finalized: usize,
	/// Retries whose result was discarded because the row changed meanwhile.
	pub superseded: usize,
	/// Claimed rows that could not be dispatched and went back to `pending`.
	pub released: usize,
	/// Rows whose attempt could not be recorded; they stay claimed until the processing lease.
	pub errors: usize,
}
impl SweepReport {
	fn tally(&mut self, log: &CallLog) {
		match log.retry_status {
			RetryStatus::None | RetryStatus::Success => self.succeeded += 1,
			RetryStatus::Pending => self.rescheduled += 1,
			RetryStatus::Failed => self.finalized += 1,
			RetryStatus::Processing | RetryStatus::Deleted => self.superseded += 1,
		}
	}
}

impl<C> ProviderClient<C>
where
	C: ?Sized + ProviderHttpClient,
{
	/// Logs `request`, dispatches it through the queue, and returns the updated row.
	///
	/// Provider failures (non-2xx, network, timeout) do not produce an `Err`; they are persisted
	/// on the returned row, which is then `pending` (or `failed` with a zero retry budget).
	pub async fn call(&self, request: ApiRequest) -> Result<CallLog> {
		const KIND: OpKind = OpKind::Call;

		let span = OpSpan::new(KIND, "call");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async move {
				let config = self.client_config().await?;
				let draft = NewCallLog::new(request, OffsetDateTime::now_utc());
				let log = self.stores.call_logs.insert_call_log(draft).await?;
				self.dispatch_claimed(log, AttemptKind::Initial, &config).await
			})
			.await;

		record_attempt_outcome(KIND, &result);

		result
	}

	/// Runs one sweep now.
	pub async fn sweep(&self) -> Result<SweepReport> {
		self.sweep_at(OffsetDateTime::now_utc()).await
	}

	/// Same as [`Self::sweep`] evaluated at `now`.
	///
	/// Abandoned claims older than the processing lease are released first, then up to
	/// `sweep_batch_size` due rows are claimed oldest first and retried.
	pub async fn sweep_at(&self, now: OffsetDateTime) -> Result<SweepReport> {
		const KIND: OpKind = OpKind::Sweep;

		let span = OpSpan::new(KIND, "sweep");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async move {
				let config = self.client_config().await?;
				let call_logs = &self.stores.call_logs;
				let mut report = SweepReport {
					recovered: call_logs
						.recover_stale(now - self.options.processing_lease, now)
						.await?,
					..Default::default()
				};

				if report.recovered > 0 {
					obs::stale_claims_recovered(report.recovered);
				}

				let claimed = call_logs.claim_due(now, self.options.sweep_batch_size).await?;

				report.claimed = claimed.len();

				let mut in_flight = Vec::with_capacity(claimed.len());
				let mut unsent = Vec::new();
				let mut batch = claimed.into_iter();

				for log in batch.by_ref() {
					let queued = self.enqueue(&log, &config).await;

					match queued {
						Ok(ticket) => in_flight.push((log, ticket)),
						Err(e) => {
							obs::sweep_row_failed(log.id, &e);
							unsent.push(log.id);

							break;
						},
					}
				}

				unsent.extend(batch.map(|log| log.id));

				for (log, ticket) in in_flight {
					let id = log.id;

					obs::record_op_outcome(OpKind::Retry, OpOutcome::Attempt);

					let result = self.complete(log, AttemptKind::Retry, ticket, &config).await;

					record_attempt_outcome(OpKind::Retry, &result);

					match result {
						Ok(log) => report.tally(&log),
						Err(e) => {
							obs::sweep_row_failed(id, &e);

							report.errors += 1;
						},
					}
				}

				if !unsent.is_empty() {
					report.released = call_logs.release_claims(&unsent, now).await?;
				}

				Ok(report)
			})
			.await;

		match &result {
			Ok(_) => obs::record_op_outcome(KIND, OpOutcome::Success),
			Err(e) => {
				obs::sweep_failed(e);
				obs::record_op_outcome(KIND, OpOutcome::Failure);
			},
		}

		result
	}

	/// Sends a claimed row and records its outcome, releasing the claim if it never got queued.
	pub(crate) async fn dispatch_claimed(
		&self,
		log: CallLog,
		kind: AttemptKind,
		config: &Arc<ClientConfig>,
	) -> Result<CallLog> {
		let queued = self.enqueue(&log, config).await;

		match queued {
			Ok(ticket) => self.complete(log, kind, ticket, config).await,
			Err(e) => {
				let ids = [log.id];

				self.stores.call_logs.release_claims(&ids, OffsetDateTime::now_utc()).await?;

				Err(e)
			},
		}
	}

	pub(crate) async fn enqueue(
		&self,
		log: &CallLog,
		config: &Arc<ClientConfig>,
	) -> Result<Ticket> {
		self.queue
			.enqueue(DispatchRequest {
				request_id: log.request_id.clone(),
				request: log.request(),
				config: config.clone(),
			})
			.await
	}

	pub(crate) async fn complete(
		&self,
		mut log: CallLog,
		kind: AttemptKind,
		ticket: Ticket,
		config: &ClientConfig,
	) -> Result<CallLog> {
		let claimed_at = log.claimed_at;
		let result = AttemptResult::from_outcome(ticket.wait().await?);

		if result.response_status == Some(401) {
			self.tokens.invalidate(&TokenKey::for_config(config)?);
		}

		let now = OffsetDateTime::now_utc();
		let entry = calllog::apply_attempt(&mut log, kind, &result, &config.retry_policy(), now);

		if let Some((failure, _)) = &result.failure {
			obs::attempt_failed(
				log.id,
				entry.attempt_number,
				failure.as_str(),
				entry.response_status,
			);

			if failure.needs_operator_attention() {
				obs::operator_attention(log.id, failure.as_str());
			}
			if log.final_failure {
				obs::final_failure(log.id, log.retry_count);
			}
		}

		match self.stores.call_logs.complete_attempt(log.clone(), claimed_at, entry).await? {
			CompletionOutcome::Applied => Ok(log),
			CompletionOutcome::Superseded(current) => Ok(current),
			CompletionOutcome::Missing => Err(Error::CallLogNotFound { id: log.id }),
		}
	}
}

pub(crate) fn record_attempt_outcome(kind: OpKind, result: &Result<CallLog>) {
	match result {
		Ok(log) if log.success => obs::record_op_outcome(kind, OpOutcome::Success),
		_ => obs::record_op_outcome(kind, OpOutcome::Failure),
	}
}
