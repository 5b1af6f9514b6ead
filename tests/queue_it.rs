mod common;

// std
use std::{sync::Arc, time::Duration};
// crates.io
use parking_lot::Mutex;
use tokio::time::Instant;
// self
use common::*;
use payments_relay::{
	api::{ApiRequest, ApiResponse},
	config::ClientConfig,
	queue::{
		Dispatch, DispatchError, DispatchFuture, DispatchRequest, QueueLimits, RequestQueue,
		Ticket,
	},
};

/// Records when each job started and holds it for a fixed time.
struct RecordingDispatcher {
	hold: Duration,
	starts: Mutex<Vec<(String, Instant)>>,
}
impl RecordingDispatcher {
	fn new(hold: Duration) -> Arc<Self> {
		Arc::new(Self { hold, starts: Mutex::new(Vec::new()) })
	}

	fn order(&self) -> Vec<String> {
		self.starts.lock().iter().map(|(endpoint, _)| endpoint.clone()).collect()
	}

	fn instants(&self) -> Vec<Instant> {
		self.starts.lock().iter().map(|(_, at)| *at).collect()
	}
}
impl Dispatch for RecordingDispatcher {
	fn dispatch<'a>(&'a self, request: &'a DispatchRequest) -> DispatchFuture<'a> {
		Box::pin(async move {
			self.starts.lock().push((request.request.endpoint.clone(), Instant::now()));

			tokio::time::sleep(self.hold).await;

			Ok(ApiResponse {
				status: 200,
				content_type: Some("application/json".into()),
				retry_after: None,
				body: b"{}".to_vec(),
			})
		})
	}
}

fn limits(max: usize, min_delay_ms: u64, timeout_ms: u64) -> QueueLimits {
	QueueLimits {
		max_concurrent_requests: max,
		min_delay: Duration::from_millis(min_delay_ms),
		request_timeout: Duration::from_millis(timeout_ms),
	}
}

async fn enqueue_all(queue: &RequestQueue, config: &Arc<ClientConfig>, n: usize) -> Vec<Ticket> {
	let mut tickets = Vec::with_capacity(n);

	for i in 0..n {
		let request = DispatchRequest {
			request_id: format!("req-{i}"),
			request: ApiRequest::get(format!("jobs/{i}")),
			config: config.clone(),
		};

		tickets.push(queue.enqueue(request).await.expect("Queue should accept the job."));
	}

	tickets
}

async fn wait_all(tickets: Vec<Ticket>) {
	for ticket in tickets {
		let outcome = ticket.wait().await.expect("Queue should report the outcome.");

		assert!(outcome.result.is_ok());
	}
}

#[tokio::test(start_paused = true)]
async fn concurrency_never_exceeds_the_limit() {
	let config = Arc::new(test_config());
	let dispatcher = RecordingDispatcher::new(Duration::from_millis(100));
	let queue = RequestQueue::spawn(dispatcher.clone(), limits(2, 0, 10_000), 16);
	let started = Instant::now();

	wait_all(enqueue_all(&queue, &config, 6).await).await;

	assert_eq!(queue.stats().peak_in_flight(), 2);
	assert_eq!(queue.stats().dispatched(), 6);
	assert_eq!(queue.stats().in_flight(), 0);
	assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn starts_are_spaced_by_the_minimum_delay() {
	let config = Arc::new(test_config());
	let dispatcher = RecordingDispatcher::new(Duration::ZERO);
	let queue = RequestQueue::spawn(dispatcher.clone(), limits(4, 200, 10_000), 16);

	wait_all(enqueue_all(&queue, &config, 4).await).await;

	let instants = dispatcher.instants();

	assert_eq!(instants.len(), 4);

	for pair in instants.windows(2) {
		assert!(pair[1] - pair[0] >= Duration::from_millis(200));
	}
}

#[tokio::test(start_paused = true)]
async fn jobs_start_in_enqueue_order() {
	let config = Arc::new(test_config());
	let dispatcher = RecordingDispatcher::new(Duration::from_millis(10));
	let queue = RequestQueue::spawn(dispatcher.clone(), limits(1, 0, 10_000), 16);

	wait_all(enqueue_all(&queue, &config, 5).await).await;

	assert_eq!(dispatcher.order(), ["jobs/0", "jobs/1", "jobs/2", "jobs/3", "jobs/4"]);
}

#[tokio::test(start_paused = true)]
async fn slow_dispatch_is_cut_off_by_the_timeout() {
	let config = Arc::new(test_config());
	let dispatcher = RecordingDispatcher::new(Duration::from_secs(5));
	let queue = RequestQueue::spawn(dispatcher, limits(1, 0, 100), 4);
	let outcome = queue
		.submit(DispatchRequest {
			request_id: "req-slow".into(),
			request: ApiRequest::get("jobs/slow"),
			config,
		})
		.await
		.expect("Queue should report the outcome.");

	assert!(matches!(
		outcome.result,
		Err(DispatchError::Timeout(timeout)) if timeout == Duration::from_millis(100)
	));
	assert!(outcome.duration >= Duration::from_millis(100));
	assert_eq!(queue.stats().in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn updated_limits_apply_to_later_jobs() {
	let config = Arc::new(test_config());
	let dispatcher = RecordingDispatcher::new(Duration::from_millis(50));
	let queue = RequestQueue::spawn(dispatcher, limits(1, 0, 10_000), 16);

	wait_all(enqueue_all(&queue, &config, 3).await).await;

	assert_eq!(queue.stats().peak_in_flight(), 1);

	queue.set_limits(limits(3, 0, 10_000));

	assert_eq!(queue.limits().max_concurrent_requests, 3);

	wait_all(enqueue_all(&queue, &config, 3).await).await;

	assert_eq!(queue.stats().peak_in_flight(), 3);
}
