//! Task runtime primitives shared by strata services.
//!
//! Work is spawned on the caller's tokio runtime when there is one, and on a
//! small shared runtime otherwise, so synchronous lifecycle hooks can start
//! background work without owning a runtime themselves.

mod spawn;
mod task;

pub use spawn::spawn_blocking;
pub use task::{BackgroundTask, TaskOutcome, TaskToken};
