//! Lifecycle of the superimposing engine.
//!
//! [`SuperimposingManager::activate`] opens the administrative store
//! connection, subscribes to definition changes under every observation path,
//! and starts the bootstrap scan in the background without waiting for it.
//! [`SuperimposingManager::deactivate`] undoes all of that and withdraws every
//! published mapping.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use strata_worker::{BackgroundTask, TaskOutcome, TaskToken};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ManagerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::event::ChangeEvent;
use crate::mapping::MappingRecord;
use crate::registry::Registry;
use crate::resolver::{ResourceProvider, SuperimposingResolver};
use crate::scanner::{self, ScanReport};
use crate::sink::MappingSink;
use crate::store::{ChangeFeed, ChangeListener, ContentStore, StoreConnector, SubscriptionId};

/// Progress of the bootstrap scan for the current activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootstrapState {
	/// Not active, or the engine is disabled.
	#[default]
	Idle,
	Running,
	/// Every discovered definition was registered.
	Finished(ScanReport),
	/// The scan stopped early after cancellation.
	Cancelled,
	/// The scan failed; live events are still processed.
	Failed,
}

impl BootstrapState {
	fn is_settled(&self) -> bool {
		!matches!(self, Self::Running)
	}
}

struct Active {
	store: Arc<dyn ContentStore>,
	subscriptions: Vec<SubscriptionId>,
	bootstrap: BackgroundTask<()>,
}

/// Owns the registry and drives it from the store.
pub struct SuperimposingManager {
	config: ManagerConfig,
	connector: Arc<dyn StoreConnector>,
	feed: Arc<dyn ChangeFeed>,
	registry: Arc<Registry>,
	active: Mutex<Option<Active>>,
	listening: Arc<AtomicBool>,
	/// Activation generation paired with its bootstrap state.
	bootstrap: Arc<watch::Sender<(u64, BootstrapState)>>,
}

impl SuperimposingManager {
	pub fn new(config: ManagerConfig, connector: Arc<dyn StoreConnector>, feed: Arc<dyn ChangeFeed>, sink: Arc<dyn MappingSink>) -> Self {
		let registry = Arc::new(Registry::new(sink));
		registry.seal();
		Self {
			config,
			connector,
			feed,
			registry,
			active: Mutex::new(None),
			listening: Arc::new(AtomicBool::new(false)),
			bootstrap: Arc::new(watch::Sender::new((0, BootstrapState::Idle))),
		}
	}

	/// Starts the engine. A no-op while already active, and when disabled.
	///
	/// Returns once subscriptions are in place; the bootstrap scan continues
	/// in the background.
	pub fn activate(&self) -> Result<()> {
		let mut active = self.active.lock();
		if active.is_some() {
			debug!("superimposing already active");
			return Ok(());
		}
		info!(enabled = self.config.enabled, "superimposing configured");
		if !self.config.enabled {
			return Ok(());
		}

		let observation = self.config.effective_observation_paths()?;
		for warning in &observation.warnings {
			warn!(%warning, "superimposing configuration");
		}

		let store = self.connector.connect()?;
		self.registry.unseal();
		let dispatcher = Dispatcher::new(Arc::clone(&self.registry), Arc::clone(&store), self.config.find_all_queries.clone());
		let listener: Arc<dyn ChangeListener> = Arc::new(DefinitionListener {
			dispatcher,
			listening: Arc::clone(&self.listening),
		});

		let mut subscriptions = Vec::with_capacity(observation.paths.len());
		for path in &observation.paths {
			match self.feed.subscribe(path, Arc::clone(&listener)) {
				Ok(id) => subscriptions.push(id),
				Err(e) => {
					for id in subscriptions {
						self.feed.unsubscribe(id);
					}
					self.registry.seal();
					store.close();
					return Err(e.into());
				}
			}
		}
		self.listening.store(true, Ordering::SeqCst);

		let generation = self.next_generation(BootstrapState::Running);
		let bootstrap = self.spawn_bootstrap(generation, Arc::clone(&store));
		info!(paths = ?observation.paths, queries = ?self.config.find_all_queries, "superimposing activated");

		*active = Some(Active {
			store,
			subscriptions,
			bootstrap,
		});
		Ok(())
	}

	/// Stops the engine and withdraws every mapping.
	///
	/// Requests cancellation of a running bootstrap scan but does not wait for
	/// it; a scan that outlives teardown cannot register anything.
	pub fn deactivate(&self) {
		self.teardown();
	}

	/// Like [`Self::deactivate`], then waits at most `timeout` for the
	/// bootstrap scan to stop. `None` if the manager was not active.
	pub async fn shutdown(&self, timeout: Duration) -> Option<TaskOutcome> {
		let bootstrap = self.teardown()?;
		let (outcome, _) = bootstrap.join_timeout(timeout).await;
		debug!(?outcome, "superimposing bootstrap stopped");
		Some(outcome)
	}

	fn teardown(&self) -> Option<BackgroundTask<()>> {
		let active = self.active.lock().take()?;
		self.listening.store(false, Ordering::SeqCst);
		active.bootstrap.cancel();
		for id in active.subscriptions {
			self.feed.unsubscribe(id);
		}
		self.registry.seal();
		let withdrawn = self.registry.clear();
		self.next_generation(BootstrapState::Idle);
		active.store.close();
		info!(withdrawn, "superimposing deactivated");
		Some(active.bootstrap)
	}

	/// Value of the enabled flag.
	pub fn is_enabled(&self) -> bool {
		self.config.enabled
	}

	/// Returns true between a successful [`Self::activate`] of an enabled
	/// engine and [`Self::deactivate`].
	pub fn is_active(&self) -> bool {
		self.active.lock().is_some()
	}

	/// Active mappings, ordered by root path.
	pub fn registered_mappings(&self) -> Vec<Arc<MappingRecord>> {
		self.registry.enumerate()
	}

	pub fn registry(&self) -> &Arc<Registry> {
		&self.registry
	}

	pub fn config(&self) -> &ManagerConfig {
		&self.config
	}

	/// State of the current activation's bootstrap scan.
	pub fn bootstrap_state(&self) -> BootstrapState {
		self.bootstrap.borrow().1
	}

	/// Returns true once the bootstrap scan registered every definition.
	pub fn is_initialized(&self) -> bool {
		matches!(self.bootstrap_state(), BootstrapState::Finished(_))
	}

	/// Waits until the bootstrap scan settles. Returns whether it finished.
	pub async fn wait_initialized(&self) -> bool {
		let mut rx = self.bootstrap.subscribe();
		match rx.wait_for(|(_, state)| state.is_settled()).await {
			Ok(current) => matches!(current.1, BootstrapState::Finished(_)),
			Err(_) => false,
		}
	}

	/// Resolver over the active mappings, reading through the manager's
	/// connection. `None` while inactive.
	pub fn resolver(&self, parent: Option<Arc<dyn ResourceProvider>>) -> Option<SuperimposingResolver> {
		let active = self.active.lock();
		let store = Arc::clone(&active.as_ref()?.store);
		Some(SuperimposingResolver::new(Arc::clone(&self.registry), store, parent))
	}

	fn next_generation(&self, state: BootstrapState) -> u64 {
		let mut generation = 0;
		self.bootstrap.send_modify(|current| {
			current.0 += 1;
			current.1 = state;
			generation = current.0;
		});
		generation
	}

	fn spawn_bootstrap(&self, generation: u64, store: Arc<dyn ContentStore>) -> BackgroundTask<()> {
		let registry = Arc::clone(&self.registry);
		let queries = self.config.find_all_queries.clone();
		let state = Arc::clone(&self.bootstrap);
		BackgroundTask::spawn_blocking("superimpose.bootstrap", move |token: TaskToken| {
			let next = match scanner::scan(store.as_ref(), &queries, &registry, || token.is_cancelled()) {
				Ok(report) if report.cancelled => {
					debug!(applied = report.applied, "superimposing bootstrap cancelled");
					BootstrapState::Cancelled
				}
				Ok(report) => BootstrapState::Finished(report),
				Err(e) => {
					warn!(error = %e, "superimposing bootstrap scan failed");
					BootstrapState::Failed
				}
			};
			state.send_if_modified(|current| {
				if current.0 != generation {
					return false;
				}
				current.1 = next;
				true
			});
		})
	}
}

impl Drop for SuperimposingManager {
	fn drop(&mut self) {
		self.deactivate();
	}
}

impl std::fmt::Debug for SuperimposingManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SuperimposingManager")
			.field("enabled", &self.config.enabled)
			.field("active", &self.is_active())
			.field("registry", &self.registry)
			.field("bootstrap", &self.bootstrap_state())
			.finish_non_exhaustive()
	}
}

/// Feeds change batches to the dispatcher while the manager is active.
struct DefinitionListener {
	dispatcher: Dispatcher,
	listening: Arc<AtomicBool>,
}

impl ChangeListener for DefinitionListener {
	fn on_changes(&self, batch: &[ChangeEvent]) {
		if !self.listening.load(Ordering::SeqCst) {
			debug!(events = batch.len(), "superimposing inactive, ignoring change batch");
			return;
		}
		self.dispatcher.handle_batch(batch);
	}
}
