//! Background task that periodically retries due calls.

// crates.io
use tokio::{
	sync::oneshot,
	task::JoinHandle,
	time::{self, MissedTickBehavior},
};
// self
use crate::{_prelude::*, client::ProviderClient, http::ProviderHttpClient};

/// Spawns the periodic retry sweep.
#[derive(Debug)]
pub struct RetrySweeper;
impl RetrySweeper {
	/// Starts sweeping `client` every `interval` on the current Tokio runtime.
	///
	/// The first sweep runs immediately. A failed sweep is reported and the loop keeps going; a
	/// slow sweep delays the next one instead of stacking up.
	pub fn spawn<C>(client: ProviderClient<C>, interval: StdDuration) -> SweeperHandle
	where
		C: ?Sized + ProviderHttpClient,
	{
		let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
		let task = tokio::spawn(async move {
			let mut ticker = time::interval(interval.max(StdDuration::from_millis(1)));

			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

			loop {
				tokio::select! {
					signal = &mut shutdown_rx => match signal {
						Ok(()) => return,
						// Handle dropped: keep sweeping until the runtime goes away.
						Err(_) => break,
					},
					_ = ticker.tick() => {
						// Failures are already reported by the sweep itself.
						let _ = client.sweep().await;
					},
				}
			}

			loop {
				ticker.tick().await;

				let _ = client.sweep().await;
			}
		});

		SweeperHandle { shutdown: Some(shutdown_tx), task }
	}

	/// Same as [`Self::spawn`] using the client's configured sweep interval.
	pub fn spawn_default<C>(client: ProviderClient<C>) -> SweeperHandle
	where
		C: ?Sized + ProviderHttpClient,
	{
		let interval = client.options().sweep_interval;

		Self::spawn(client, interval)
	}
}

/// Handle to a running sweeper.
///
/// Only [`Self::shutdown`] stops the loop. Dropping the handle detaches the task, which then
/// keeps sweeping for the lifetime of the runtime.
#[derive(Debug)]
pub struct SweeperHandle {
	shutdown: Option<oneshot::Sender<()>>,
	task: JoinHandle<()>,
}
impl SweeperHandle {
	/// Stops the loop after the in-progress sweep, if any, and waits for the task to exit.
	pub async fn shutdown(mut self) {
		if let Some(shutdown) = self.shutdown.take() {
			let _ = shutdown.send(());
		}

		let _ = self.task.await;
	}

	/// Whether the task has exited.
	pub fn is_finished(&self) -> bool {
		self.task.is_finished()
	}
}
