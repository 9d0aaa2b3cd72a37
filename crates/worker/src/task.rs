use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::spawn_blocking;

/// Cooperative cancellation signal handed to background work.
///
/// Blocking work polls [`TaskToken::is_cancelled`] between units of work;
/// nothing is interrupted preemptively.
#[derive(Debug, Clone, Default)]
pub struct TaskToken {
	cancel: CancellationToken,
}

impl TaskToken {
	/// Creates a token that has not been cancelled.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns true once cancellation was requested.
	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}

	/// Requests cancellation.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}
}

/// How a background task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
	/// The task ran to completion.
	Completed,
	/// The task observed cancellation, or was aborted before it started.
	Cancelled,
	/// The task panicked.
	Panicked,
	/// The wait timed out while the task was still running.
	TimedOut,
}

/// A one-shot background task with a cancellation handle.
///
/// Dropping the handle detaches the task; it keeps running until it notices
/// cancellation or finishes.
#[derive(Debug)]
pub struct BackgroundTask<T> {
	name: &'static str,
	token: TaskToken,
	handle: JoinHandle<T>,
}

impl<T> BackgroundTask<T>
where
	T: Send + 'static,
{
	/// Runs `f` on the blocking pool, passing it a token to poll.
	pub fn spawn_blocking<F>(name: &'static str, f: F) -> Self
	where
		F: FnOnce(TaskToken) -> T + Send + 'static,
	{
		let token = TaskToken::new();
		let task_token = token.clone();
		tracing::debug!(task = name, "worker.background.start");
		let handle = spawn_blocking(name, move || f(task_token));
		Self { name, token, handle }
	}

	/// Requests cooperative cancellation without waiting.
	pub fn cancel(&self) {
		if !self.handle.is_finished() {
			tracing::debug!(task = self.name, "worker.background.cancel");
		}
		self.token.cancel();
	}

	/// Waits at most `timeout` for the task to finish.
	///
	/// On timeout the task keeps running detached.
	pub async fn join_timeout(self, timeout: Duration) -> (TaskOutcome, Option<T>) {
		let name = self.name;
		match tokio::time::timeout(timeout, self.handle).await {
			Ok(result) => classify(name, result),
			Err(_) => {
				tracing::warn!(task = name, timeout_ms = timeout.as_millis() as u64, "worker.background.timeout");
				(TaskOutcome::TimedOut, None)
			}
		}
	}
}

fn classify<T>(name: &'static str, result: Result<T, JoinError>) -> (TaskOutcome, Option<T>) {
	match result {
		Ok(value) => (TaskOutcome::Completed, Some(value)),
		Err(error) if error.is_cancelled() => (TaskOutcome::Cancelled, None),
		Err(error) => {
			tracing::warn!(task = name, %error, "worker.background.panicked");
			(TaskOutcome::Panicked, None)
		}
	}
}
