//! In-memory collaborators: a content tree with a change feed, and a sink
//! that records what it was asked to publish.
//!
//! Used by the test suites and by embedders that want the engine without a
//! real repository behind it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::definition::{DefinitionProperty, MARKER};
use crate::error::StoreError;
use crate::event::{ChangeEvent, ChangeKind};
use crate::mapping::MappingRecord;
use crate::path;
use crate::sink::{MappingSink, PublishedHandle};
use crate::store::{ChangeFeed, ChangeListener, ContentStore, PropertyMap, PropertyValue, StoreConnector, StoredResource, SubscriptionId};

/// Query syntax understood by [`MemoryStore::query`].
pub const MARKER_SYNTAX: &str = "marker";

#[derive(Debug, Clone, Default)]
struct Node {
	markers: BTreeSet<String>,
	properties: PropertyMap,
}

struct Subscriber {
	id: SubscriptionId,
	prefix: String,
	listener: Arc<dyn ChangeListener>,
}

#[derive(Default)]
struct Shared {
	nodes: RwLock<BTreeMap<String, Node>>,
	subscribers: Mutex<Vec<Subscriber>>,
	/// Serializes batch delivery.
	delivery: Mutex<()>,
	next_subscription: AtomicU64,
	connections: AtomicUsize,
	fail_reads: AtomicBool,
	refuse_connections: AtomicBool,
}

/// Content tree held in memory.
///
/// Cloning yields another handle to the same tree. Every mutation delivers
/// its change events to matching subscribers as one batch, after the tree
/// lock is released. Listeners must not mutate the store from their callback.
#[derive(Clone, Default)]
pub struct MemoryStore {
	shared: Arc<Shared>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates the node at `path` and any missing ancestors.
	pub fn insert_node(&self, path: &str) {
		self.transaction(|tx| tx.insert_node(path));
	}

	/// Creates a definition node in a single batch.
	pub fn insert_definition(&self, path: &str, source_path: &str, register_parent: bool, overlayable: bool) {
		self.transaction(|tx| tx.insert_definition(path, source_path, register_parent, overlayable));
	}

	/// Sets a property, creating the node if needed.
	pub fn set_property(&self, node_path: &str, name: &str, value: impl Into<PropertyValue>) {
		self.transaction(|tx| tx.set_property(node_path, name, value));
	}

	pub fn remove_property(&self, node_path: &str, name: &str) {
		self.transaction(|tx| tx.remove_property(node_path, name));
	}

	/// Tags the node at `path`. Tags are structural metadata and emit no event.
	pub fn add_marker(&self, path: &str, tag: &str) {
		self.transaction(|tx| tx.add_marker(path, tag));
	}

	/// Removes the subtree at `path`.
	pub fn remove_node(&self, path: &str) {
		self.transaction(|tx| tx.remove_node(path));
	}

	/// Moves the subtree at `from` to `to`.
	pub fn move_node(&self, from: &str, to: &str) {
		self.transaction(|tx| tx.move_node(from, to));
	}

	/// Runs several mutations and delivers their events as one batch.
	pub fn transaction<R>(&self, f: impl FnOnce(&mut Transaction<'_>) -> R) -> R {
		let mut tx = Transaction {
			store: self,
			events: Vec::new(),
		};
		let result = f(&mut tx);
		let events = tx.events;
		self.deliver(&events);
		result
	}

	/// Makes every read fail with [`StoreError::Access`] while set.
	pub fn fail_reads(&self, fail: bool) {
		self.shared.fail_reads.store(fail, Ordering::SeqCst);
	}

	/// Makes [`StoreConnector::connect`] fail while set.
	pub fn refuse_connections(&self, refuse: bool) {
		self.shared.refuse_connections.store(refuse, Ordering::SeqCst);
	}

	/// Connections handed out by [`StoreConnector::connect`] and not yet closed.
	pub fn open_connections(&self) -> usize {
		self.shared.connections.load(Ordering::SeqCst)
	}

	/// Number of live subscriptions.
	pub fn subscription_count(&self) -> usize {
		self.shared.subscribers.lock().len()
	}

	fn check_readable(&self, path: &str) -> Result<(), StoreError> {
		if self.shared.fail_reads.load(Ordering::SeqCst) {
			return Err(StoreError::Access {
				path: path.to_string(),
				message: "read failure injected".into(),
			});
		}
		Ok(())
	}

	fn deliver(&self, events: &[ChangeEvent]) {
		if events.is_empty() {
			return;
		}
		let _serial = self.shared.delivery.lock();
		let targets: Vec<(String, Arc<dyn ChangeListener>)> = self
			.shared
			.subscribers
			.lock()
			.iter()
			.map(|s| (s.prefix.clone(), Arc::clone(&s.listener)))
			.collect();
		for (prefix, listener) in targets {
			let batch: Vec<ChangeEvent> = events.iter().filter(|e| path::is_same_or_descendant(&e.path, &prefix)).cloned().collect();
			if !batch.is_empty() {
				listener.on_changes(&batch);
			}
		}
	}
}

impl std::fmt::Debug for MemoryStore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MemoryStore")
			.field("nodes", &self.shared.nodes.read().len())
			.field("subscriptions", &self.subscription_count())
			.finish_non_exhaustive()
	}
}

/// Mutations grouped into a single change batch.
pub struct Transaction<'a> {
	store: &'a MemoryStore,
	events: Vec<ChangeEvent>,
}

impl Transaction<'_> {
	pub fn insert_node(&mut self, path: &str) {
		let Some(path) = path::normalize(path) else {
			return;
		};
		let mut nodes = self.store.shared.nodes.write();
		Self::create_with_ancestors(&mut nodes, &path, &mut self.events);
	}

	pub fn insert_definition(&mut self, path: &str, source_path: &str, register_parent: bool, overlayable: bool) {
		self.insert_node(path);
		self.add_marker(path, MARKER);
		self.set_property(path, DefinitionProperty::SourcePath.name(), source_path);
		if register_parent {
			self.set_property(path, DefinitionProperty::RegisterParent.name(), true);
		}
		if overlayable {
			self.set_property(path, DefinitionProperty::Overlayable.name(), true);
		}
	}

	pub fn set_property(&mut self, node_path: &str, name: &str, value: impl Into<PropertyValue>) {
		let Some(node_path) = path::normalize(node_path) else {
			return;
		};
		let mut nodes = self.store.shared.nodes.write();
		Self::create_with_ancestors(&mut nodes, &node_path, &mut self.events);
		let Some(node) = nodes.get_mut(&node_path) else {
			return;
		};
		let kind = match node.properties.insert(name.to_string(), value.into()) {
			Some(_) => ChangeKind::PropertyChanged,
			None => ChangeKind::PropertyAdded,
		};
		self.events.push(ChangeEvent::property(&node_path, name, kind));
	}

	pub fn remove_property(&mut self, node_path: &str, name: &str) {
		let Some(node_path) = path::normalize(node_path) else {
			return;
		};
		let mut nodes = self.store.shared.nodes.write();
		if let Some(node) = nodes.get_mut(&node_path)
			&& node.properties.remove(name).is_some()
		{
			self.events.push(ChangeEvent::property(&node_path, name, ChangeKind::PropertyRemoved));
		}
	}

	pub fn add_marker(&mut self, path: &str, tag: &str) {
		let Some(path) = path::normalize(path) else {
			return;
		};
		let mut nodes = self.store.shared.nodes.write();
		Self::create_with_ancestors(&mut nodes, &path, &mut self.events);
		if let Some(node) = nodes.get_mut(&path) {
			node.markers.insert(tag.to_string());
		}
	}

	pub fn remove_node(&mut self, path: &str) {
		let Some(path) = path::normalize(path) else {
			return;
		};
		let mut nodes = self.store.shared.nodes.write();
		if Self::take_subtree(&mut nodes, &path).is_empty() {
			return;
		}
		self.events.push(ChangeEvent::node_removed(path));
	}

	pub fn move_node(&mut self, from: &str, to: &str) {
		let (Some(from), Some(to)) = (path::normalize(from), path::normalize(to)) else {
			return;
		};
		if path::is_same_or_descendant(&to, &from) {
			return;
		}
		let mut nodes = self.store.shared.nodes.write();
		let subtree = Self::take_subtree(&mut nodes, &from);
		if subtree.is_empty() {
			return;
		}
		self.events.push(ChangeEvent::node_removed(from.clone()));
		if let Some(parent) = path::parent(&to) {
			Self::create_with_ancestors(&mut nodes, parent, &mut self.events);
		}
		for (old_path, node) in subtree {
			let new_path = match path::strip_descendant(&old_path, &from) {
				Some(rest) => path::join(&to, rest),
				None => to.clone(),
			};
			nodes.insert(new_path, node);
		}
		self.events.push(ChangeEvent::node_added(to));
	}

	fn create_with_ancestors(nodes: &mut BTreeMap<String, Node>, path: &str, events: &mut Vec<ChangeEvent>) {
		let missing: Vec<&str> = path::ancestors(path).take_while(|p| !nodes.contains_key(*p)).collect();
		for p in missing.into_iter().rev() {
			nodes.insert(p.to_string(), Node::default());
			events.push(ChangeEvent::node_added(p));
		}
	}

	fn take_subtree(nodes: &mut BTreeMap<String, Node>, path: &str) -> Vec<(String, Node)> {
		let keys: Vec<String> = nodes.range(path.to_string()..).map(|(k, _)| k).take_while(|k| k.starts_with(path)).filter(|k| path::is_same_or_descendant(k, path)).cloned().collect();
		keys.into_iter().filter_map(|k| nodes.remove(&k).map(|n| (k, n))).collect()
	}
}

impl ContentStore for MemoryStore {
	fn resource(&self, path: &str) -> Result<Option<StoredResource>, StoreError> {
		self.check_readable(path)?;
		Ok(self.shared.nodes.read().get(path).map(|n| StoredResource::new(path, n.properties.clone())))
	}

	fn exists(&self, path: &str) -> Result<bool, StoreError> {
		self.check_readable(path)?;
		Ok(self.shared.nodes.read().contains_key(path))
	}

	fn property(&self, node_path: &str, name: &str) -> Result<Option<PropertyValue>, StoreError> {
		self.check_readable(node_path)?;
		Ok(self.shared.nodes.read().get(node_path).and_then(|n| n.properties.get(name).cloned()))
	}

	fn children(&self, path: &str) -> Result<Vec<StoredResource>, StoreError> {
		self.check_readable(path)?;
		let nodes = self.shared.nodes.read();
		let prefix = format!("{path}{}", path::SEPARATOR);
		Ok(nodes
			.range(prefix.clone()..)
			.take_while(|(k, _)| k.starts_with(&prefix))
			.filter(|(k, _)| !k[prefix.len()..].contains(path::SEPARATOR))
			.map(|(k, n)| StoredResource::new(k.clone(), n.properties.clone()))
			.collect())
	}

	/// Supports the `marker` syntax: `"<tag> [<under-path>]"`.
	fn query(&self, syntax: &str, body: &str) -> Result<Vec<String>, StoreError> {
		if syntax.trim() != MARKER_SYNTAX {
			return Err(StoreError::UnsupportedQuery { syntax: syntax.to_string() });
		}
		let mut words = body.split_whitespace();
		let Some(tag) = words.next() else {
			return Err(StoreError::Query {
				syntax: syntax.to_string(),
				message: "missing marker tag".into(),
			});
		};
		let under = match words.next() {
			Some(p) => Some(path::normalize(p).ok_or_else(|| StoreError::Query {
				syntax: syntax.to_string(),
				message: format!("invalid path '{p}'"),
			})?),
			None => None,
		};
		self.check_readable(under.as_deref().unwrap_or("/"))?;
		let nodes = self.shared.nodes.read();
		Ok(nodes
			.iter()
			.filter(|(p, n)| n.markers.contains(tag) && under.as_deref().is_none_or(|u| path::is_same_or_descendant(p, u)))
			.map(|(p, _)| p.clone())
			.collect())
	}

	fn close(&self) {
		let _ = self.shared.connections.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
	}
}

impl StoreConnector for MemoryStore {
	fn connect(&self) -> Result<Arc<dyn ContentStore>, StoreError> {
		if self.shared.refuse_connections.load(Ordering::SeqCst) {
			return Err(StoreError::Unavailable("connections refused".into()));
		}
		self.shared.connections.fetch_add(1, Ordering::SeqCst);
		Ok(Arc::new(self.clone()))
	}
}

impl ChangeFeed for MemoryStore {
	fn subscribe(&self, path_prefix: &str, listener: Arc<dyn ChangeListener>) -> Result<SubscriptionId, StoreError> {
		let prefix = path::normalize(path_prefix).ok_or_else(|| StoreError::Access {
			path: path_prefix.to_string(),
			message: "not an absolute path".into(),
		})?;
		let id = SubscriptionId(self.shared.next_subscription.fetch_add(1, Ordering::SeqCst));
		self.shared.subscribers.lock().push(Subscriber { id, prefix, listener });
		Ok(id)
	}

	fn unsubscribe(&self, id: SubscriptionId) {
		self.shared.subscribers.lock().retain(|s| s.id != id);
	}
}

/// One call observed by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
	Publish { handle: u64, root: String },
	Withdraw { handle: u64, root: String },
}

/// [`MappingSink`] that records every call in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
	next: AtomicU64,
	calls: Mutex<Vec<SinkCall>>,
	live: Mutex<FxHashMap<u64, MappingRecord>>,
	stray_withdrawals: AtomicUsize,
}

impl RecordingSink {
	pub fn new() -> Self {
		Self::default()
	}

	/// Every call so far, in order.
	pub fn calls(&self) -> Vec<SinkCall> {
		self.calls.lock().clone()
	}

	/// Published and not yet withdrawn records, ordered by root path.
	pub fn live(&self) -> Vec<MappingRecord> {
		let mut records: Vec<_> = self.live.lock().values().cloned().collect();
		records.sort_by(|a, b| a.root_path().cmp(b.root_path()));
		records
	}

	pub fn publish_count(&self) -> usize {
		self.calls.lock().iter().filter(|c| matches!(c, SinkCall::Publish { .. })).count()
	}

	pub fn withdraw_count(&self) -> usize {
		self.calls.lock().iter().filter(|c| matches!(c, SinkCall::Withdraw { .. })).count()
	}

	/// Withdrawals of handles that were never published or already withdrawn.
	pub fn stray_withdrawals(&self) -> usize {
		self.stray_withdrawals.load(Ordering::SeqCst)
	}

	/// Forgets all recorded calls. Live records are kept.
	pub fn reset_calls(&self) {
		self.calls.lock().clear();
	}
}

impl MappingSink for RecordingSink {
	fn publish(&self, record: &MappingRecord) -> PublishedHandle {
		let id = self.next.fetch_add(1, Ordering::SeqCst);
		let mut calls = self.calls.lock();
		self.live.lock().insert(id, record.clone());
		calls.push(SinkCall::Publish {
			handle: id,
			root: record.root_path().to_string(),
		});
		PublishedHandle::new(id)
	}

	fn withdraw(&self, handle: PublishedHandle) {
		let id = handle.id();
		let mut calls = self.calls.lock();
		match self.live.lock().remove(&id) {
			Some(record) => calls.push(SinkCall::Withdraw {
				handle: id,
				root: record.root_path().to_string(),
			}),
			None => {
				self.stray_withdrawals.fetch_add(1, Ordering::SeqCst);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	struct Collect(Mutex<Vec<Vec<ChangeEvent>>>);

	impl ChangeListener for Collect {
		fn on_changes(&self, batch: &[ChangeEvent]) {
			self.0.lock().push(batch.to_vec());
		}
	}

	fn subscribed(store: &MemoryStore, prefix: &str) -> Arc<Collect> {
		let listener = Arc::new(Collect(Mutex::new(Vec::new())));
		store.subscribe(prefix, listener.clone()).unwrap();
		listener
	}

	#[test]
	fn test_insert_emits_ancestors_in_one_batch() {
		let store = MemoryStore::new();
		let seen = subscribed(&store, "/content");
		store.insert_node("/content/site-b/page1");
		assert_eq!(
			*seen.0.lock(),
			vec![vec![
				ChangeEvent::node_added("/content"),
				ChangeEvent::node_added("/content/site-b"),
				ChangeEvent::node_added("/content/site-b/page1"),
			]]
		);
	}

	#[test]
	fn test_property_events() {
		let store = MemoryStore::new();
		store.insert_node("/content/a");
		let seen = subscribed(&store, "/content");
		store.set_property("/content/a", "sourcePath", "/content/x");
		store.set_property("/content/a", "sourcePath", "/content/y");
		store.remove_property("/content/a", "sourcePath");
		store.remove_property("/content/a", "sourcePath");
		let kinds: Vec<ChangeKind> = seen.0.lock().iter().flatten().map(|e| e.kind).collect();
		assert_eq!(kinds, vec![ChangeKind::PropertyAdded, ChangeKind::PropertyChanged, ChangeKind::PropertyRemoved]);
		assert_eq!(seen.0.lock()[0][0].path, "/content/a/sourcePath");
	}

	#[test]
	fn test_subscription_prefix_filters_events() {
		let store = MemoryStore::new();
		let seen = subscribed(&store, "/content/site-b");
		store.insert_node("/content/site-a/page");
		store.insert_node("/content/site-bb");
		assert!(seen.0.lock().is_empty());
		store.insert_node("/content/site-b/page");
		assert_eq!(seen.0.lock().len(), 1);
	}

	#[test]
	fn test_move_is_one_batch() {
		let store = MemoryStore::new();
		store.insert_definition("/content/a/def", "/content/src", false, false);
		let seen = subscribed(&store, "/content");
		store.move_node("/content/a", "/content/b");
		assert_eq!(
			*seen.0.lock(),
			vec![vec![ChangeEvent::node_removed("/content/a"), ChangeEvent::node_added("/content/b")]]
		);
		assert!(store.exists("/content/b/def").unwrap());
		assert!(!store.exists("/content/a/def").unwrap());
		assert_eq!(store.query(MARKER_SYNTAX, "superimpose /content").unwrap(), vec!["/content/b/def".to_string()]);
	}

	#[test]
	fn test_children_are_direct_only() {
		let store = MemoryStore::new();
		store.insert_node("/content/a/one/deep");
		store.insert_node("/content/a/two");
		store.insert_node("/content/ab");
		let names: Vec<String> = store.children("/content/a").unwrap().iter().map(|c| c.name().to_string()).collect();
		assert_eq!(names, vec!["one", "two"]);
	}

	#[test]
	fn test_marker_query() {
		let store = MemoryStore::new();
		store.insert_definition("/content/b", "/content/a", false, false);
		store.insert_definition("/apps/c", "/apps/d", false, false);
		assert_eq!(store.query("marker", "superimpose /content").unwrap(), vec!["/content/b".to_string()]);
		assert_eq!(store.query("marker", "superimpose").unwrap().len(), 2);
		assert!(matches!(store.query("xpath", "//*"), Err(StoreError::UnsupportedQuery { .. })));
		assert!(matches!(store.query("marker", ""), Err(StoreError::Query { .. })));
	}

	#[test]
	fn test_fail_reads() {
		let store = MemoryStore::new();
		store.insert_node("/content/a");
		store.fail_reads(true);
		assert!(store.exists("/content/a").is_err());
		assert!(store.property("/content/a", "x").is_err());
		store.fail_reads(false);
		assert!(store.exists("/content/a").unwrap());
	}

	#[test]
	fn test_connections_are_counted() {
		let store = MemoryStore::new();
		let conn = store.connect().unwrap();
		assert_eq!(store.open_connections(), 1);
		conn.close();
		assert_eq!(store.open_connections(), 0);
		store.refuse_connections(true);
		assert!(store.connect().is_err());
	}

	#[test]
	fn test_recording_sink_tracks_live_handles() {
		let sink = RecordingSink::new();
		let record = MappingRecord::new("/content/b", "/content/a", false).unwrap();
		let handle = sink.publish(&record);
		assert_eq!(sink.live(), vec![record]);
		sink.withdraw(handle);
		assert!(sink.live().is_empty());
		sink.withdraw(PublishedHandle::new(99));
		assert_eq!(sink.stray_withdrawals(), 1);
		assert_eq!(sink.withdraw_count(), 1);
	}
}
