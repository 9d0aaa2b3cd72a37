//! Interfaces to the underlying content store and its change feed.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::StoreError;
use crate::event::ChangeEvent;
use crate::path;

/// A stored property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
	String(String),
	Bool(bool),
	Long(i64),
	Strings(Vec<String>),
}

impl PropertyValue {
	/// String view of a single-valued property.
	///
	/// Booleans and numbers are converted; multi-valued properties are not.
	pub fn as_string(&self) -> Option<String> {
		match self {
			Self::String(s) => Some(s.clone()),
			Self::Bool(b) => Some(b.to_string()),
			Self::Long(n) => Some(n.to_string()),
			Self::Strings(_) => None,
		}
	}

	/// Boolean view. Strings convert case-insensitively from `"true"`; any
	/// other string is `false`.
	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Self::Bool(b) => Some(*b),
			Self::String(s) => Some(s.trim().eq_ignore_ascii_case("true")),
			Self::Long(_) | Self::Strings(_) => None,
		}
	}
}

impl From<&str> for PropertyValue {
	fn from(value: &str) -> Self {
		Self::String(value.to_string())
	}
}

impl From<String> for PropertyValue {
	fn from(value: String) -> Self {
		Self::String(value)
	}
}

impl From<bool> for PropertyValue {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}

impl From<i64> for PropertyValue {
	fn from(value: i64) -> Self {
		Self::Long(value)
	}
}

/// Properties of one node, ordered by name.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// A node read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResource {
	path: String,
	properties: PropertyMap,
}

impl StoredResource {
	pub fn new(path: impl Into<String>, properties: PropertyMap) -> Self {
		Self {
			path: path.into(),
			properties,
		}
	}

	pub fn path(&self) -> &str {
		&self.path
	}

	pub fn name(&self) -> &str {
		path::name(&self.path)
	}

	pub fn properties(&self) -> &PropertyMap {
		&self.properties
	}

	pub fn property(&self, name: &str) -> Option<&PropertyValue> {
		self.properties.get(name)
	}
}

/// Read access to the hierarchical content store.
///
/// Calls may block on I/O; the manager only makes them from background
/// tasks and change-feed callbacks.
pub trait ContentStore: Send + Sync {
	/// Resolves the node at `path`.
	fn resource(&self, path: &str) -> Result<Option<StoredResource>, StoreError>;

	/// Returns true if a node exists at `path`, without reading it.
	fn exists(&self, path: &str) -> Result<bool, StoreError>;

	/// Reads property `name` of the node at `node_path`.
	fn property(&self, node_path: &str, name: &str) -> Result<Option<PropertyValue>, StoreError>;

	/// Lists the children of the node at `path`, in store order.
	fn children(&self, path: &str) -> Result<Vec<StoredResource>, StoreError>;

	/// Runs a query in the given syntax, returning matching node paths.
	fn query(&self, syntax: &str, body: &str) -> Result<Vec<String>, StoreError>;

	/// Releases the connection. Called once when its owner shuts down.
	fn close(&self) {}
}

/// Opens administrative store connections.
pub trait StoreConnector: Send + Sync {
	fn connect(&self) -> Result<Arc<dyn ContentStore>, StoreError>;
}

/// Identifier of one change-feed subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Receives change batches. One call per batch; batches for one subscription
/// never overlap.
pub trait ChangeListener: Send + Sync {
	fn on_changes(&self, batch: &[ChangeEvent]);
}

/// Deep change subscriptions on path prefixes.
pub trait ChangeFeed: Send + Sync {
	/// Subscribes `listener` to every change at or below `path_prefix`.
	fn subscribe(&self, path_prefix: &str, listener: Arc<dyn ChangeListener>) -> Result<SubscriptionId, StoreError>;

	/// Cancels a subscription. Unknown ids are ignored.
	fn unsubscribe(&self, id: SubscriptionId);
}
