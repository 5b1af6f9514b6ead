//! Pure retry state machine.
//!
//! Every function here mutates an in-memory [`CallLog`]; persistence and claim atomicity are the
//! store's job. Transitions:
//!
//! - initial success: `none`
//! - initial failure: `pending`, `retry_count = 0`, due after `retry_delay`
//! - retry or manual success: `success` if the previous attempt failed, otherwise `none`
//! - retry or manual failure: `retry_count` saturates at the maximum; reaching it sets
//!   `final_failure`, `failed`, and `manual_retry_needed` when manual retries are enabled;
//!   otherwise the row goes back to `pending`

// self
use crate::{
	_prelude::*,
	calllog::{CallLog, FailureKind, RetryHistoryEntry, RetryStatus},
	queue::{DispatchError, DispatchOutcome},
};

/// Retry knobs in force when an attempt completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Delay before a failed call becomes due.
	pub retry_delay: Duration,
	/// Retries allowed before the call is final.
	pub max_retry_attempts: u32,
	/// Whether final failures request manual attention.
	pub manual_retry_enabled: bool,
}

/// What triggered an attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttemptKind {
	/// First attempt, made on submission.
	Initial,
	/// Automatic retry made by a sweep.
	Retry,
	/// Operator-triggered retry.
	Manual,
}
impl AttemptKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			AttemptKind::Initial => "initial",
			AttemptKind::Retry => "retry",
			AttemptKind::Manual => "manual",
		}
	}
}

/// Flattened outcome of one dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttemptResult {
	/// When the dispatch started.
	pub sent_at: OffsetDateTime,
	/// Time spent in the dispatch.
	pub duration: StdDuration,
	/// HTTP status, if a response arrived.
	pub response_status: Option<u16>,
	/// Response body, lossily decoded.
	pub response_payload: Option<String>,
	/// Response `Content-Type`.
	pub content_type: Option<String>,
	/// Failure classification and message; `None` on success.
	pub failure: Option<(FailureKind, String)>,
}
impl AttemptResult {
	/// Classifies a queue outcome. Only 2xx responses count as success.
	pub fn from_outcome(outcome: DispatchOutcome) -> Self {
		let DispatchOutcome { sent_at, duration, result } = outcome;
		let mut attempt = Self {
			sent_at,
			duration,
			response_status: None,
			response_payload: None,
			content_type: None,
			failure: None,
		};

		match result {
			Ok(response) => {
				attempt.response_status = Some(response.status);
				attempt.response_payload = Some(response.body_text());
				attempt.content_type = response.content_type.clone();

				if !response.is_success() {
					attempt.failure = Some((
						FailureKind::from_status(response.status),
						format!("Provider responded with HTTP {}.", response.status),
					));
				}
			},
			Err(DispatchError::Auth(e)) => {
				attempt.response_status = e.status();
				attempt.failure = Some((FailureKind::Auth, e.to_string()));
			},
			Err(e @ DispatchError::Transport(_)) =>
				attempt.failure = Some((FailureKind::Transport, e.to_string())),
			Err(e @ DispatchError::Timeout(_)) =>
				attempt.failure = Some((FailureKind::Timeout, e.to_string())),
			Err(e @ DispatchError::Request(_)) =>
				attempt.failure = Some((FailureKind::Request, e.to_string())),
		}

		attempt
	}

	/// Whether the attempt succeeded.
	pub fn is_success(&self) -> bool {
		self.failure.is_none()
	}

	/// Failure classification, if any.
	pub fn failure_kind(&self) -> Option<FailureKind> {
		self.failure.as_ref().map(|(kind, _)| *kind)
	}

	fn duration_ms(&self) -> u64 {
		u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
	}
}

/// Marks a row as claimed by a worker.
pub fn claim(log: &mut CallLog, now: OffsetDateTime) {
	log.retry_status = RetryStatus::Processing;
	log.claimed_at = Some(now);
	log.updated_at = now;
}

/// Applies a finished attempt to `log` and returns the audit entry to append.
pub fn apply_attempt(
	log: &mut CallLog,
	kind: AttemptKind,
	result: &AttemptResult,
	policy: &RetryPolicy,
	now: OffsetDateTime,
) -> RetryHistoryEntry {
	let attempt_number = log.attempts;
	let previous_failed = attempt_number > 0 && !log.success;

	log.attempts = log.attempts.saturating_add(1);
	log.success = result.is_success();
	log.response_status = result.response_status;
	log.response_payload = result.response_payload.clone();
	log.response_content_type = result.content_type.clone();
	log.error_message = result.failure.as_ref().map(|(_, message)| message.clone());
	log.failure_kind = result.failure_kind();
	log.duration_ms = Some(result.duration_ms());
	log.sent_at = Some(result.sent_at);
	log.claimed_at = None;
	log.updated_at = now;

	match (kind, result.is_success()) {
		(AttemptKind::Initial, true) => {
			log.retry_status = RetryStatus::None;
			log.next_retry_at = None;
		},
		(AttemptKind::Initial, false) => {
			log.retry_count = 0;

			schedule_or_finalize(log, policy, now);
		},
		(_, true) => {
			log.retry_count = next_retry_count(log.retry_count, policy);
			log.retry_status =
				if previous_failed { RetryStatus::Success } else { RetryStatus::None };
			log.next_retry_at = None;
			log.final_failure = false;
			log.manual_retry_needed = false;
		},
		(_, false) => {
			log.retry_count = next_retry_count(log.retry_count, policy);

			schedule_or_finalize(log, policy, now);
		},
	}

	RetryHistoryEntry {
		api_call_log_id: log.id,
		attempt_number,
		response_status: result.response_status,
		success: result.is_success(),
		error_message: log.error_message.clone(),
		failure_kind: log.failure_kind,
		duration_ms: result.duration_ms(),
		response_payload: result.response_payload.clone(),
		created_at: now,
	}
}

/// Forces a final failure on an operator's request.
pub fn force_final_failure(log: &mut CallLog, manual_retry_needed: bool, now: OffsetDateTime) {
	log.final_failure = true;
	log.retry_status = RetryStatus::Failed;
	log.manual_retry_needed = manual_retry_needed;
	log.next_retry_at = None;
	log.claimed_at = None;
	log.updated_at = now;
}

/// Moves an abandoned claim back to `pending`, due immediately.
pub fn release_stale_claim(log: &mut CallLog, now: OffsetDateTime) {
	log.retry_status = RetryStatus::Pending;
	log.next_retry_at = Some(now);
	log.claimed_at = None;
	log.updated_at = now;
}

/// Soft-deletes a row.
pub fn soft_delete(log: &mut CallLog, now: OffsetDateTime) {
	log.retry_status = RetryStatus::Deleted;
	log.next_retry_at = None;
	log.claimed_at = None;
	log.updated_at = now;
}

fn next_retry_count(current: u32, policy: &RetryPolicy) -> u32 {
	current.saturating_add(1).min(policy.max_retry_attempts)
}

fn schedule_or_finalize(log: &mut CallLog, policy: &RetryPolicy, now: OffsetDateTime) {
	if log.retry_count >= policy.max_retry_attempts {
		log.final_failure = true;
		log.retry_status = RetryStatus::Failed;
		log.manual_retry_needed = policy.manual_retry_enabled;
		log.next_retry_at = None;
	} else {
		log.final_failure = false;
		log.retry_status = RetryStatus::Pending;
		log.next_retry_at = Some(now + policy.retry_delay);
	}
}
