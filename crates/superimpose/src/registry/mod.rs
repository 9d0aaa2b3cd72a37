//! Registry of active mappings, keyed by root path.
//!
//! At most one mapping is active per root path. Each root path owns a slot
//! whose mutex serializes register/unregister for that path, so operations on
//! one root are linearizable while different roots never wait on each other
//! beyond a short map lookup. Readers go through an [`ArcSwap`] snapshot of
//! published records and never take a lock.
//!
//! # Publication order
//!
//! A record leaves the read snapshot before its handle is withdrawn and enters
//! it only after its handle is published, so readers never observe a
//! withdrawn mapping.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::definition::{CandidateDefinition, InvalidDefinition};
use crate::mapping::MappingRecord;
use crate::sink::{MappingSink, PublishedHandle};

/// Result of [`Registry::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
	/// A new or changed mapping was published.
	Applied,
	/// The identical mapping was already active, or the registry is sealed.
	Skipped,
	/// The definition is invalid; any mapping previously active at its root
	/// was withdrawn.
	Rejected(InvalidDefinition),
}

struct Entry {
	record: Arc<MappingRecord>,
	handle: PublishedHandle,
}

#[derive(Default)]
struct SlotState {
	entry: Option<Entry>,
	/// Set once the slot is dropped from the slot map; holders must retry.
	retired: bool,
}

type Slot = Arc<Mutex<SlotState>>;

type Snapshot = FxHashMap<String, Arc<MappingRecord>>;

/// Concurrent registry of active mappings.
pub struct Registry {
	sink: Arc<dyn MappingSink>,
	slots: Mutex<FxHashMap<String, Slot>>,
	published: ArcSwap<Snapshot>,
	sealed: AtomicBool,
}

impl Registry {
	/// Creates an empty registry publishing through `sink`.
	pub fn new(sink: Arc<dyn MappingSink>) -> Self {
		Self {
			sink,
			slots: Mutex::new(FxHashMap::default()),
			published: ArcSwap::from_pointee(Snapshot::default()),
			sealed: AtomicBool::new(false),
		}
	}

	/// Validates `candidate` and makes it the active mapping for its root.
	pub fn register(&self, candidate: &CandidateDefinition) -> RegisterOutcome {
		match candidate.validate() {
			Ok(record) => self.apply(record),
			Err(reason) => {
				if let Some(root) = candidate.root_path() {
					self.unregister(&root);
				}
				warn!(
					node = %candidate.node_path,
					source = candidate.source_path.as_deref().unwrap_or(""),
					%reason,
					"invalid superimposing definition"
				);
				RegisterOutcome::Rejected(reason)
			}
		}
	}

	/// Makes `record` the active mapping for its root path.
	///
	/// An identical active record is left alone. A different one is withdrawn
	/// before `record` is published.
	pub fn apply(&self, record: MappingRecord) -> RegisterOutcome {
		let root = record.root_path().to_string();
		if self.is_sealed() {
			debug!(root = %root, "registry sealed, ignoring registration");
			return RegisterOutcome::Skipped;
		}
		loop {
			let slot = self.slot(&root);
			let mut state = slot.lock();
			if state.retired {
				continue;
			}
			if self.is_sealed() {
				debug!(root = %root, "registry sealed, ignoring registration");
				drop(state);
				self.prune(&root, &slot);
				return RegisterOutcome::Skipped;
			}
			if state.entry.as_ref().is_some_and(|e| *e.record == record) {
				debug!(root = %root, "skipped re-registering superimposition because there were no relevant changes");
				return RegisterOutcome::Skipped;
			}

			debug!(root = %root, "(re-)registering superimposition");
			if let Some(old) = state.entry.take() {
				self.withdraw(old);
			}
			let record = Arc::new(record);
			let handle = self.sink.publish(&record);
			info!(root = %root, source = %record.source_path(), overlayable = record.is_overlayable(), handle = handle.id(), "registered superimposition");
			state.entry = Some(Entry {
				record: Arc::clone(&record),
				handle,
			});
			self.published.rcu(|snapshot| {
				let mut next = Snapshot::clone(snapshot);
				next.insert(root.clone(), Arc::clone(&record));
				next
			});
			return RegisterOutcome::Applied;
		}
	}

	/// Withdraws the mapping at `root_path`. Returns whether one was active.
	pub fn unregister(&self, root_path: &str) -> bool {
		loop {
			let Some(slot) = self.slots.lock().get(root_path).cloned() else {
				return false;
			};
			let mut state = slot.lock();
			if state.retired {
				continue;
			}
			let removed = state.entry.take();
			let was_active = removed.is_some();
			if let Some(entry) = removed {
				self.withdraw(entry);
			}
			drop(state);
			self.prune(root_path, &slot);
			return was_active;
		}
	}

	/// Returns the active mapping at `root_path`.
	pub fn lookup(&self, root_path: &str) -> Option<Arc<MappingRecord>> {
		self.published.load().get(root_path).cloned()
	}

	/// Returns true if a mapping is active at `root_path`.
	pub fn contains(&self, root_path: &str) -> bool {
		self.published.load().contains_key(root_path)
	}

	/// Returns all active mappings, ordered by root path.
	///
	/// Reads one snapshot; registrations racing with the call may or may not
	/// be included.
	pub fn enumerate(&self) -> Vec<Arc<MappingRecord>> {
		let snapshot = self.published.load();
		let mut records: Vec<_> = snapshot.values().cloned().collect();
		records.sort_by(|a, b| a.root_path().cmp(b.root_path()));
		records
	}

	/// Number of active mappings.
	pub fn len(&self) -> usize {
		self.published.load().len()
	}

	/// Returns true if no mapping is active.
	pub fn is_empty(&self) -> bool {
		self.published.load().is_empty()
	}

	/// Withdraws every mapping and empties the registry. Returns how many
	/// were withdrawn.
	pub fn clear(&self) -> usize {
		let slots: Vec<Slot> = self.slots.lock().drain().map(|(_, slot)| slot).collect();
		let mut withdrawn = 0;
		for slot in slots {
			let mut state = slot.lock();
			state.retired = true;
			if let Some(entry) = state.entry.take() {
				self.withdraw(entry);
				withdrawn += 1;
			}
		}
		withdrawn
	}

	/// Rejects further registrations until [`Registry::unseal`].
	///
	/// Unregistration and [`Registry::clear`] keep working.
	pub fn seal(&self) {
		self.sealed.store(true, Ordering::SeqCst);
	}

	/// Accepts registrations again.
	pub fn unseal(&self) {
		self.sealed.store(false, Ordering::SeqCst);
	}

	/// Returns true while registrations are rejected.
	pub fn is_sealed(&self) -> bool {
		self.sealed.load(Ordering::SeqCst)
	}

	fn slot(&self, root_path: &str) -> Slot {
		Arc::clone(self.slots.lock().entry(root_path.to_string()).or_default())
	}

	/// Drops an empty slot from the map unless another caller holds it.
	fn prune(&self, root_path: &str, slot: &Slot) {
		let mut slots = self.slots.lock();
		let Some(current) = slots.get(root_path) else {
			return;
		};
		if !Arc::ptr_eq(current, slot) {
			return;
		}
		if let Some(mut state) = slot.try_lock()
			&& state.entry.is_none()
		{
			state.retired = true;
			drop(state);
			slots.remove(root_path);
		}
	}

	/// Must be called with the entry's slot locked.
	fn withdraw(&self, entry: Entry) {
		let root = entry.record.root_path();
		self.published.rcu(|snapshot| {
			let mut next = Snapshot::clone(snapshot);
			next.remove(root);
			next
		});
		let id = entry.handle.id();
		self.sink.withdraw(entry.handle);
		info!(root = %root, handle = id, "unregistered superimposition");
	}
}

impl std::fmt::Debug for Registry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Registry")
			.field("active", &self.len())
			.field("sealed", &self.is_sealed())
			.finish_non_exhaustive()
	}
}
