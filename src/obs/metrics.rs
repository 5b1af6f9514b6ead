// self
use crate::obs::{OpKind, OpOutcome};

/// Records an operation outcome via the global metrics recorder (when enabled).
pub fn record_op_outcome(kind: OpKind, outcome: OpOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"payments_relay_op_total",
			"op" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records the per-entry counts of one ingestion run.
pub fn record_ingest(inserted: usize, duplicated: usize, errors: usize) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("payments_relay_ingest_total", "result" => "inserted")
			.increment(inserted as u64);
		metrics::counter!("payments_relay_ingest_total", "result" => "duplicated")
			.increment(duplicated as u64);
		metrics::counter!("payments_relay_ingest_total", "result" => "error")
			.increment(errors as u64);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (inserted, duplicated, errors);
	}
}
