//! Optional observability helpers for client operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `payments_relay.op` with the `op` (operation
//!   kind) and `stage` (call site) fields, plus warning events for failed attempts, operator
//!   attention, and ingestion issues.
//! - Enable `metrics` to increment the `payments_relay_op_total` counter for every
//!   attempt/success/failure, labeled by `op` + `outcome`, and the ingestion counters.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operation kinds observed by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// Access-token exchange.
	Token,
	/// First attempt of a provider call.
	Call,
	/// Automatic retry run by the sweeper.
	Retry,
	/// Operator-triggered retry.
	ManualRetry,
	/// One sweeper pass.
	Sweep,
	/// Transaction ingestion.
	Ingest,
	/// Account synchronization.
	Sync,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::Token => "token",
			OpKind::Call => "call",
			OpKind::Retry => "retry",
			OpKind::ManualRetry => "manual_retry",
			OpKind::Sweep => "sweep",
			OpKind::Ingest => "ingest",
			OpKind::Sync => "sync",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
