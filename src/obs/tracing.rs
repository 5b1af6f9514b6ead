// self
use crate::{_prelude::*, calllog::CallLogId, obs::OpKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedOp<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOp<F> = F;

/// A span builder used by client operations.
#[derive(Clone, Debug)]
pub struct OpSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OpSpan {
	/// Creates a new span tagged with the provided operation kind + stage.
	pub fn new(kind: OpKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("payments_relay.op", op = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOp<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// A new configuration generation became active.
pub fn config_reloaded(environment: &str, generation: u64) {
	#[cfg(feature = "tracing")]
	{
		tracing::info!(environment, generation, "client configuration loaded");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (environment, generation);
	}
}

/// Reloading configuration failed; the previous configuration stays active.
pub fn config_reload_failed(error: &dyn Display) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(error = %error, "client configuration reload failed, keeping previous");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = error;
	}
}

/// One attempt of a logged call failed.
pub fn attempt_failed(
	log_id: CallLogId,
	attempt_number: u32,
	failure: &str,
	status: Option<u16>,
) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(log_id, attempt_number, failure, status, "provider call attempt failed");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (log_id, attempt_number, failure, status);
	}
}

/// A failure needs an operator before it can succeed (credentials or permissions).
pub fn operator_attention(log_id: CallLogId, reason: &str) {
	#[cfg(feature = "tracing")]
	{
		tracing::error!(log_id, reason, "provider call needs operator attention");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (log_id, reason);
	}
}

/// A logged call exhausted its automatic retries.
pub fn final_failure(log_id: CallLogId, retry_count: u32) {
	#[cfg(feature = "tracing")]
	{
		tracing::error!(log_id, retry_count, "provider call failed permanently");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (log_id, retry_count);
	}
}

/// Abandoned claims were returned to `pending`.
pub fn stale_claims_recovered(count: usize) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(count, "released stale processing claims");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = count;
	}
}

/// A transaction entry could not be ingested.
pub fn ingest_issue(
	import_run_id: &str,
	external_transaction_id: Option<&str>,
	error: &dyn Display,
) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(
			import_run_id,
			external_transaction_id,
			error = %error,
			"transaction skipped"
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (import_run_id, external_transaction_id, error);
	}
}

/// An account entry was skipped or partially synced.
pub fn sync_issue(external_account_id: Option<&str>, error: &dyn Display) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(external_account_id, error = %error, "account sync issue");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (external_account_id, error);
	}
}

/// A sweeper pass aborted.
pub fn sweep_failed(error: &dyn Display) {
	#[cfg(feature = "tracing")]
	{
		tracing::error!(error = %error, "retry sweep failed");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = error;
	}
}

/// One row of a sweep could not be sent or recorded.
pub fn sweep_row_failed(log_id: CallLogId, error: &dyn Display) {
	#[cfg(feature = "tracing")]
	{
		tracing::error!(log_id, error = %error, "retry attempt was not recorded");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (log_id, error);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn events_noop_without_subscriber() {
		config_reloaded("sandbox", 1);
		attempt_failed(7, 2, "upstream", Some(502));
		ingest_issue("run-1", None, &"bad entry");
	}

	#[cfg(feature = "tracing")]
	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = OpSpan::new(OpKind::Call, "instrument_wraps_future");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
