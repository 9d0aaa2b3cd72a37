use std::sync::OnceLock;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

/// Handle of the runtime to spawn on.
///
/// Lifecycle hooks are often plain synchronous calls. Outside a tokio context
/// work lands on one lazily built runtime shared by the whole process.
fn runtime_handle() -> Handle {
	if let Ok(handle) = Handle::try_current() {
		return handle;
	}

	static SHARED_RT: OnceLock<Runtime> = OnceLock::new();
	let runtime = SHARED_RT.get_or_init(|| {
		Builder::new_multi_thread()
			.enable_all()
			.worker_threads(1)
			.thread_name("strata-worker")
			.build()
			.expect("failed to build strata-worker shared tokio runtime")
	});
	runtime.handle().clone()
}

/// Runs `f` on the blocking pool of the ambient or shared runtime.
///
/// `name` only labels the trace event.
pub fn spawn_blocking<F, R>(name: &'static str, f: F) -> JoinHandle<R>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	tracing::trace!(task = name, "worker.spawn_blocking");
	runtime_handle().spawn_blocking(f)
}
