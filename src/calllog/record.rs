//! Call log rows, retry history entries, and listing filters.

// self
use crate::{
	_prelude::*,
	api::{ApiMethod, ApiRequest, ResponseBody},
	queue,
};

/// Identifier assigned to call logs by the store.
pub type CallLogId = u64;

/// Retry lifecycle of a call log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStatus {
	/// Never needed a retry (first attempt succeeded).
	None,
	/// Failed and waiting for `next_retry_at`.
	Pending,
	/// Claimed by a worker; an attempt is in flight.
	Processing,
	/// Succeeded after at least one failed attempt.
	Success,
	/// Gave up; `final_failure` is set.
	Failed,
	/// Soft-deleted by an operator; excluded from sweeps.
	Deleted,
}
impl RetryStatus {
	/// Returns the persisted label.
	pub const fn as_str(self) -> &'static str {
		match self {
			RetryStatus::None => "none",
			RetryStatus::Pending => "pending",
			RetryStatus::Processing => "processing",
			RetryStatus::Success => "success",
			RetryStatus::Failed => "failed",
			RetryStatus::Deleted => "deleted",
		}
	}

	/// Whether an operator may trigger a manual retry from this status.
	pub const fn accepts_manual_retry(self) -> bool {
		matches!(self, Self::None | Self::Pending | Self::Success | Self::Failed)
	}

	/// Whether an operator may force a final failure from this status.
	pub const fn accepts_forced_failure(self) -> bool {
		matches!(self, Self::Pending | Self::Processing)
	}

	/// Whether the row can be soft-deleted.
	pub const fn is_deletable(self) -> bool {
		!matches!(self, Self::Deleted)
	}
}
impl Display for RetryStatus {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Classification of a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
	/// Bearer token could not be obtained.
	Auth,
	/// Provider answered 429.
	RateLimited,
	/// Provider answered 403.
	Forbidden,
	/// Any other non-2xx provider answer.
	Upstream,
	/// Network failure.
	Transport,
	/// The call exceeded its timeout.
	Timeout,
	/// The request could not be built locally.
	Request,
}
impl FailureKind {
	/// Returns the persisted label.
	pub const fn as_str(self) -> &'static str {
		match self {
			FailureKind::Auth => "auth",
			FailureKind::RateLimited => "rate_limited",
			FailureKind::Forbidden => "forbidden",
			FailureKind::Upstream => "upstream",
			FailureKind::Transport => "transport",
			FailureKind::Timeout => "timeout",
			FailureKind::Request => "request",
		}
	}

	/// Classifies a non-2xx provider status.
	pub const fn from_status(status: u16) -> Self {
		match status {
			403 => Self::Forbidden,
			429 => Self::RateLimited,
			_ => Self::Upstream,
		}
	}

	/// Failures that usually mean misconfigured credentials or permissions.
	pub const fn needs_operator_attention(self) -> bool {
		matches!(self, Self::Auth | Self::Forbidden)
	}
}

/// Persisted record of one logical outbound call and its retry state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallLog {
	/// Store-assigned identifier.
	pub id: CallLogId,
	/// Value sent in `X-Request-Id`; stable across retries.
	pub request_id: String,
	/// Endpoint relative to the API base.
	pub endpoint: String,
	/// HTTP method.
	pub method: ApiMethod,
	/// Request body exactly as sent.
	pub request_payload: Option<String>,
	/// Response body of the latest attempt, lossily decoded.
	pub response_payload: Option<String>,
	/// `Content-Type` of the latest response.
	pub response_content_type: Option<String>,
	/// HTTP status of the latest response.
	pub response_status: Option<u16>,
	/// Whether the latest attempt succeeded.
	pub success: bool,
	/// Failure summary of the latest attempt.
	pub error_message: Option<String>,
	/// Classification of the latest failure.
	pub failure_kind: Option<FailureKind>,
	/// Duration of the latest attempt.
	pub duration_ms: Option<u64>,
	/// Attempts completed so far, including the initial one.
	pub attempts: u32,
	/// Retries executed so far, saturating at the configured maximum.
	pub retry_count: u32,
	/// Retry lifecycle state.
	pub retry_status: RetryStatus,
	/// When the row becomes due for an automatic retry.
	pub next_retry_at: Option<OffsetDateTime>,
	/// Whether an operator should retry the call by hand.
	pub manual_retry_needed: bool,
	/// Whether automatic retries have been exhausted.
	pub final_failure: bool,
	/// Creation instant.
	pub created_at: OffsetDateTime,
	/// When the latest attempt was dispatched.
	pub sent_at: Option<OffsetDateTime>,
	/// When the current claim was taken; set only while processing.
	pub claimed_at: Option<OffsetDateTime>,
	/// Last mutation instant.
	pub updated_at: OffsetDateTime,
}
impl CallLog {
	/// Reconstructs the request for replay.
	pub fn request(&self) -> ApiRequest {
		ApiRequest {
			endpoint: self.endpoint.clone(),
			method: self.method,
			payload: self.request_payload.clone(),
		}
	}

	/// Classifies the stored response body, if any.
	pub fn response_body(&self) -> Option<ResponseBody> {
		let payload = self.response_payload.as_ref()?;

		Some(ResponseBody::classify(self.response_content_type.as_deref(), payload.as_bytes()))
	}

	/// Whether the sweeper may claim this row at `now`.
	pub fn is_due_at(&self, now: OffsetDateTime) -> bool {
		self.retry_status == RetryStatus::Pending
			&& !self.final_failure
			&& self.next_retry_at.is_none_or(|at| at <= now)
	}
}

/// Call log awaiting insertion; the store assigns the identifier.
#[derive(Clone, Debug)]
pub struct NewCallLog {
	/// Value sent in `X-Request-Id`.
	pub request_id: String,
	/// Call being logged.
	pub request: ApiRequest,
	/// Creation instant.
	pub created_at: OffsetDateTime,
}
impl NewCallLog {
	/// Creates a draft with a fresh request id.
	pub fn new(request: ApiRequest, created_at: OffsetDateTime) -> Self {
		Self { request_id: queue::generate_request_id(), request, created_at }
	}

	/// Materializes the row. The initial attempt is already claimed.
	pub fn into_log(self, id: CallLogId) -> CallLog {
		CallLog {
			id,
			request_id: self.request_id,
			endpoint: self.request.endpoint,
			method: self.request.method,
			request_payload: self.request.payload,
			response_payload: None,
			response_content_type: None,
			response_status: None,
			success: false,
			error_message: None,
			failure_kind: None,
			duration_ms: None,
			attempts: 0,
			retry_count: 0,
			retry_status: RetryStatus::Processing,
			next_retry_at: None,
			manual_retry_needed: false,
			final_failure: false,
			created_at: self.created_at,
			sent_at: None,
			claimed_at: Some(self.created_at),
			updated_at: self.created_at,
		}
	}
}

/// Append-only audit row written after every attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryHistoryEntry {
	/// Owning call log.
	pub api_call_log_id: CallLogId,
	/// Zero-based attempt index; 0 is the initial attempt.
	pub attempt_number: u32,
	/// HTTP status, if a response arrived.
	pub response_status: Option<u16>,
	/// Whether the attempt succeeded.
	pub success: bool,
	/// Failure summary.
	pub error_message: Option<String>,
	/// Failure classification.
	pub failure_kind: Option<FailureKind>,
	/// Attempt duration.
	pub duration_ms: u64,
	/// Response body, lossily decoded.
	pub response_payload: Option<String>,
	/// Instant the attempt was recorded.
	pub created_at: OffsetDateTime,
}

/// Filters for listing call logs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallLogFilter {
	/// Match on the latest attempt's outcome.
	pub success: Option<bool>,
	/// Match on the retry status. Deleted rows only appear when asked for explicitly.
	pub retry_status: Option<RetryStatus>,
	/// Match on the retry count.
	pub retry_count: Option<u32>,
	/// Match endpoints starting with this prefix.
	pub endpoint_prefix: Option<String>,
}
impl CallLogFilter {
	/// Restricts to successful or failed rows.
	pub fn success(mut self, success: bool) -> Self {
		self.success = Some(success);

		self
	}

	/// Restricts to one retry status.
	pub fn retry_status(mut self, status: RetryStatus) -> Self {
		self.retry_status = Some(status);

		self
	}

	/// Restricts to one retry count.
	pub fn retry_count(mut self, count: u32) -> Self {
		self.retry_count = Some(count);

		self
	}

	/// Restricts to endpoints with the given prefix.
	pub fn endpoint_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.endpoint_prefix = Some(prefix.into());

		self
	}

	/// Whether `log` passes the filter.
	pub fn matches(&self, log: &CallLog) -> bool {
		match self.retry_status {
			Some(status) if log.retry_status != status => return false,
			None if log.retry_status == RetryStatus::Deleted => return false,
			_ => (),
		}

		self.success.is_none_or(|success| log.success == success)
			&& self.retry_count.is_none_or(|count| log.retry_count == count)
			&& self.endpoint_prefix.as_deref().is_none_or(|prefix| log.endpoint.starts_with(prefix))
	}
}

/// 1-based page selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
	/// Page index starting at 1.
	pub page: u32,
	/// Rows per page.
	pub per_page: u32,
}
impl PageRequest {
	/// Creates a selector; zero values are clamped to 1.
	pub fn new(page: u32, per_page: u32) -> Self {
		Self { page: page.max(1), per_page: per_page.max(1) }
	}

	/// Number of rows to skip.
	pub fn offset(&self) -> usize {
		(self.page.max(1) as usize - 1) * self.per_page as usize
	}
}
impl Default for PageRequest {
	fn default() -> Self {
		Self { page: 1, per_page: 50 }
	}
}

/// One page of call logs, newest first.
#[derive(Clone, Debug)]
pub struct CallLogPage {
	/// Rows on this page.
	pub items: Vec<CallLog>,
	/// Rows matching the filter across all pages.
	pub total: usize,
	/// Selector that produced the page.
	pub page: PageRequest,
}
