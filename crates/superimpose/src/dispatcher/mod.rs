//! Change-batch handling.
//!
//! A batch is processed in two passes: every event is classified first, then
//! the resulting per-path actions are applied. A transaction touching several
//! definition properties of one node therefore re-registers that node once.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, error, warn};

use crate::definition::{CandidateDefinition, DefinitionProperty};
use crate::error::Result;
use crate::event::{ChangeEvent, ChangeKind};
use crate::path;
use crate::registry::Registry;
use crate::scanner::{self, ScanReport};
use crate::store::ContentStore;

/// What to do with one path once the batch is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
	/// Re-read the definition node and register it.
	Register,
	/// Withdraw the mapping rooted at the path.
	Unregister,
}

/// First-pass result for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
	pub node_added: bool,
	pub node_removed: bool,
	/// Last action recorded per path wins.
	pub actions: FxHashMap<String, Action>,
}

impl Classification {
	/// A batch that both adds and removes nodes may be a move, which the
	/// per-path actions cannot follow.
	pub fn needs_rescan(&self) -> bool {
		self.node_added && self.node_removed
	}
}

/// Result of applying one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
	/// Register actions applied, whatever the registry made of them.
	pub registered: usize,
	/// Mappings actually withdrawn.
	pub unregistered: usize,
	/// Report of the full rescan, if the batch needed one.
	pub rescan: Option<ScanReport>,
}

/// Applies change batches to a registry.
pub struct Dispatcher {
	registry: Arc<Registry>,
	store: Arc<dyn ContentStore>,
	queries: Vec<String>,
}

impl Dispatcher {
	/// `queries` drive the full rescan triggered by ambiguous batches.
	pub fn new(registry: Arc<Registry>, store: Arc<dyn ContentStore>, queries: Vec<String>) -> Self {
		Self { registry, store, queries }
	}

	/// Processes one batch, logging instead of returning failures.
	///
	/// A store failure abandons the rest of the batch. Actions applied before
	/// the failure stay applied.
	pub fn handle_batch(&self, batch: &[ChangeEvent]) -> Option<BatchOutcome> {
		match self.process(batch) {
			Ok(outcome) => Some(outcome),
			Err(e) => {
				error!(events = batch.len(), error = %e, "error processing superimposing change batch");
				None
			}
		}
	}

	/// Processes one batch.
	pub fn process(&self, batch: &[ChangeEvent]) -> Result<BatchOutcome> {
		let classification = self.classify(batch);
		let mut outcome = BatchOutcome::default();

		for (node_path, action) in &classification.actions {
			match action {
				Action::Register => {
					if !self.store.exists(node_path)? {
						debug!(node = %node_path, "definition node vanished before it could be registered");
						continue;
					}
					let candidate = CandidateDefinition::read(self.store.as_ref(), node_path);
					self.registry.register(&candidate);
					outcome.registered += 1;
				}
				Action::Unregister => {
					if self.registry.unregister(node_path) {
						outcome.unregistered += 1;
					}
				}
			}
		}

		if classification.needs_rescan() {
			debug!("batch added and removed nodes, rescanning definitions");
			outcome.rescan = Some(scanner::scan(self.store.as_ref(), &self.queries, &self.registry, || false).inspect_err(|e| {
				warn!(error = %e, "rescan after structural change failed");
			})?);
		}
		Ok(outcome)
	}

	/// First pass: records structural flags and the action per path.
	pub fn classify(&self, batch: &[ChangeEvent]) -> Classification {
		let mut classification = Classification::default();
		for event in batch {
			match event.kind {
				ChangeKind::NodeAdded => classification.node_added = true,
				ChangeKind::NodeRemoved => {
					for record in self.registry.enumerate() {
						if path::is_same_or_descendant(record.root_path(), &event.path) {
							classification.node_removed = true;
							classification.actions.insert(record.root_path().to_string(), Action::Unregister);
						}
					}
				}
				ChangeKind::PropertyAdded | ChangeKind::PropertyChanged | ChangeKind::PropertyRemoved => {
					if DefinitionProperty::from_name(path::name(&event.path)).is_none() {
						continue;
					}
					if let Some(node_path) = path::parent(&event.path) {
						classification.actions.insert(node_path.to_string(), Action::Register);
					}
				}
			}
		}
		classification
	}
}

impl std::fmt::Debug for Dispatcher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Dispatcher").field("registry", &self.registry).field("queries", &self.queries).finish_non_exhaustive()
	}
}
