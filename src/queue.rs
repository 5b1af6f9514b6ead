//! Rate-limited dispatch queue.
//!
//! A single coordinator task owns the FIFO of pending jobs. It starts a job only when fewer than
//! `max_concurrent_requests` dispatches are running and at least `min_delay` has elapsed since
//! the previous start, then runs the dispatch on its own task under the request timeout. Limits
//! live behind a lock so a configuration reload takes effect for the next job without restarting
//! the coordinator.

// std
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
// crates.io
use oauth2::{
	AsyncHttpClient, HttpRequest,
	http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
};
use rand::{Rng, distr::Alphanumeric};
use tokio::{
	sync::{mpsc, oneshot},
	time::Instant,
};
// self
use crate::{
	_prelude::*,
	api::{ApiRequest, ApiResponse},
	auth::TokenManager,
	config::ClientConfig,
	error::{AuthError, TransportError},
	http::{self, ProviderHttpClient, ResponseMetadataSlot},
};

/// Boxed future returned by [`Dispatch`] implementations.
pub type DispatchFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, DispatchError>> + 'a + Send>>;

/// Executes one provider call.
pub trait Dispatch
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and returns the raw provider response.
	fn dispatch<'a>(&'a self, request: &'a DispatchRequest) -> DispatchFuture<'a>;
}

/// Failure of a single dispatch before a provider response was obtained.
#[derive(Debug, ThisError)]
pub enum DispatchError {
	/// Bearer token could not be obtained.
	#[error(transparent)]
	Auth(AuthError),
	/// Network-level failure.
	#[error(transparent)]
	Transport(TransportError),
	/// The request did not finish within the timeout.
	#[error("Provider call timed out after {0:?}.")]
	Timeout(StdDuration),
	/// The request could not be built locally.
	#[error("Provider request could not be built: {0}.")]
	Request(String),
}

/// Unit of work handed to the queue.
#[derive(Clone, Debug)]
pub struct DispatchRequest {
	/// Value sent in the `X-Request-Id` header.
	pub request_id: String,
	/// Call to perform.
	pub request: ApiRequest,
	/// Configuration snapshot the call runs under.
	pub config: Arc<ClientConfig>,
}

/// Result of running one job.
#[derive(Debug)]
pub struct DispatchOutcome {
	/// Wall-clock instant the dispatch started.
	pub sent_at: OffsetDateTime,
	/// Time spent in the dispatch.
	pub duration: StdDuration,
	/// Provider response or local failure.
	pub result: Result<ApiResponse, DispatchError>,
}

/// Rate-limit knobs applied by the coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueLimits {
	/// Upper bound on concurrently running dispatches.
	pub max_concurrent_requests: usize,
	/// Minimum spacing between dispatch starts.
	pub min_delay: StdDuration,
	/// Timeout applied to each dispatch.
	pub request_timeout: StdDuration,
}
impl Default for QueueLimits {
	fn default() -> Self {
		Self {
			max_concurrent_requests: 1,
			min_delay: StdDuration::ZERO,
			request_timeout: StdDuration::from_millis(ClientConfig::DEFAULT_REQUEST_TIMEOUT_MS),
		}
	}
}

/// Counters describing queue activity.
#[derive(Debug, Default)]
pub struct QueueStats {
	in_flight: AtomicUsize,
	dispatched: AtomicU64,
	peak_in_flight: AtomicUsize,
}
impl QueueStats {
	/// Dispatches currently running.
	pub fn in_flight(&self) -> usize {
		self.in_flight.load(Ordering::Relaxed)
	}

	/// Dispatches started since the queue was spawned.
	pub fn dispatched(&self) -> u64 {
		self.dispatched.load(Ordering::Relaxed)
	}

	/// Highest number of concurrently running dispatches observed.
	pub fn peak_in_flight(&self) -> usize {
		self.peak_in_flight.load(Ordering::Relaxed)
	}

	fn started(&self) {
		let running = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;

		self.dispatched.fetch_add(1, Ordering::Relaxed);
		self.peak_in_flight.fetch_max(running, Ordering::Relaxed);
	}

	fn finished(&self) {
		self.in_flight.fetch_sub(1, Ordering::Relaxed);
	}
}

/// Receipt for an enqueued job.
#[derive(Debug)]
pub struct Ticket(oneshot::Receiver<DispatchOutcome>);
impl Ticket {
	/// Waits for the job to finish.
	pub async fn wait(self) -> Result<DispatchOutcome> {
		self.0.await.map_err(|_| Error::QueueClosed)
	}
}

/// Handle to the rate-limited dispatch queue.
#[derive(Clone)]
pub struct RequestQueue {
	jobs: mpsc::Sender<Job>,
	limits: Arc<RwLock<QueueLimits>>,
	stats: Arc<QueueStats>,
}
impl RequestQueue {
	/// Default number of jobs that may wait before [`Self::enqueue`] applies backpressure.
	pub const DEFAULT_CAPACITY: usize = 1_024;

	/// Spawns the coordinator on the current Tokio runtime.
	pub fn spawn(dispatcher: Arc<dyn Dispatch>, limits: QueueLimits, capacity: usize) -> Self {
		let (jobs_tx, jobs_rx) = mpsc::channel(capacity.max(1));
		let (done_tx, done_rx) = mpsc::unbounded_channel();
		let limits = Arc::new(RwLock::new(limits));
		let stats = Arc::new(QueueStats::default());
		let coordinator = Coordinator {
			jobs: jobs_rx,
			done_tx,
			done_rx,
			limits: limits.clone(),
			stats: stats.clone(),
			dispatcher,
			active: 0,
			last_start: None,
		};

		tokio::spawn(coordinator.run());

		Self { jobs: jobs_tx, limits, stats }
	}

	/// Replaces the limits used for subsequent jobs.
	pub fn set_limits(&self, limits: QueueLimits) {
		let mut current = self.limits.write();

		if *current != limits {
			*current = limits;
		}
	}

	/// Limits currently in force.
	pub fn limits(&self) -> QueueLimits {
		*self.limits.read()
	}

	/// Activity counters.
	pub fn stats(&self) -> &QueueStats {
		&self.stats
	}

	/// Appends a job to the FIFO, waiting for room when the queue is full.
	pub async fn enqueue(&self, request: DispatchRequest) -> Result<Ticket> {
		let (reply, ticket) = oneshot::channel();

		self.jobs.send(Job { request, reply }).await.map_err(|_| Error::QueueClosed)?;

		Ok(Ticket(ticket))
	}

	/// Enqueues a job and waits for its outcome.
	pub async fn submit(&self, request: DispatchRequest) -> Result<DispatchOutcome> {
		self.enqueue(request).await?.wait().await
	}
}
impl Debug for RequestQueue {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("RequestQueue")
			.field("limits", &self.limits())
			.field("stats", &self.stats)
			.finish()
	}
}

struct Job {
	request: DispatchRequest,
	reply: oneshot::Sender<DispatchOutcome>,
}

struct Coordinator {
	jobs: mpsc::Receiver<Job>,
	done_tx: mpsc::UnboundedSender<()>,
	done_rx: mpsc::UnboundedReceiver<()>,
	limits: Arc<RwLock<QueueLimits>>,
	stats: Arc<QueueStats>,
	dispatcher: Arc<dyn Dispatch>,
	active: usize,
	last_start: Option<Instant>,
}
impl Coordinator {
	async fn run(mut self) {
		let mut next = None;

		loop {
			while self.done_rx.try_recv().is_ok() {
				self.active = self.active.saturating_sub(1);
			}

			if next.is_none() {
				tokio::select! {
					job = self.jobs.recv() => match job {
						Some(job) => next = Some(job),
						None => break,
					},
					Some(()) = self.done_rx.recv() => {
						self.active = self.active.saturating_sub(1);

						continue;
					},
				}
			}

			let limits = *self.limits.read();

			if self.active >= limits.max_concurrent_requests.max(1) {
				if self.done_rx.recv().await.is_some() {
					self.active = self.active.saturating_sub(1);
				}

				continue;
			}
			if let Some(last) = self.last_start {
				let ready = last + limits.min_delay;

				if Instant::now() < ready {
					tokio::time::sleep_until(ready).await;

					continue;
				}
			}

			if let Some(job) = next.take() {
				self.last_start = Some(Instant::now());
				self.launch(job, limits.request_timeout);
			}
		}
	}

	fn launch(&mut self, job: Job, timeout: StdDuration) {
		let dispatcher = self.dispatcher.clone();
		let done = self.done_tx.clone();
		let stats = self.stats.clone();

		self.active += 1;
		stats.started();

		tokio::spawn(async move {
			let sent_at = OffsetDateTime::now_utc();
			let started = Instant::now();
			let dispatch = dispatcher.dispatch(&job.request);
			let result = match tokio::time::timeout(timeout, dispatch).await {
				Ok(result) => result,
				Err(_) => Err(DispatchError::Timeout(timeout)),
			};
			let outcome = DispatchOutcome { sent_at, duration: started.elapsed(), result };

			stats.finished();

			let _ = done.send(());
			let _ = job.reply.send(outcome);
		});
	}
}

/// [`Dispatch`] implementation that attaches a bearer token and sends the call over HTTP.
pub struct HttpDispatcher<C>
where
	C: ?Sized + ProviderHttpClient,
{
	http_client: Arc<C>,
	tokens: Arc<TokenManager<C>>,
}
impl<C> HttpDispatcher<C>
where
	C: ?Sized + ProviderHttpClient,
{
	/// Creates a dispatcher sharing the token manager with the rest of the client.
	pub fn new(http_client: Arc<C>, tokens: Arc<TokenManager<C>>) -> Self {
		Self { http_client, tokens }
	}

	fn build_request(
		&self,
		request: &DispatchRequest,
		bearer: String,
	) -> Result<HttpRequest, DispatchError> {
		let url = request
			.config
			.endpoints
			.resolve(&request.request.endpoint)
			.map_err(|e| DispatchError::Request(e.to_string()))?;
		let mut builder = oauth2::http::Request::builder()
			.method(request.request.method.to_http())
			.uri(url.as_str())
			.header(AUTHORIZATION, bearer)
			.header(ACCEPT, "application/json")
			.header("x-request-id", request.request_id.as_str());
		let body = match &request.request.payload {
			Some(payload) => {
				builder = builder.header(CONTENT_TYPE, "application/json");

				payload.clone().into_bytes()
			},
			None => Vec::new(),
		};

		builder.body(body).map_err(|e| DispatchError::Request(e.to_string()))
	}
}
impl<C> Dispatch for HttpDispatcher<C>
where
	C: ?Sized + ProviderHttpClient,
{
	fn dispatch<'a>(&'a self, request: &'a DispatchRequest) -> DispatchFuture<'a> {
		Box::pin(async move {
			let token = self.tokens.get_token(&request.config).await.map_err(|e| match e {
				Error::Auth(e) => DispatchError::Auth(e),
				e => DispatchError::Request(e.to_string()),
			})?;
			let http_request = self.build_request(request, token.bearer())?;
			let handle = self.http_client.with_metadata(ResponseMetadataSlot::default());
			let response = handle
				.call(http_request)
				.await
				.map_err(|e| DispatchError::Transport(http::map_transport_error(e)))?;

			Ok(ApiResponse::from_http(response))
		})
	}
}

/// Generates a value for the `X-Request-Id` header.
pub fn generate_request_id() -> String {
	rand::rng().sample_iter(&Alphanumeric).take(24).map(char::from).collect()
}
