//! Change events delivered by a [`crate::store::ChangeFeed`].

/// Kind of change reported by the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
	NodeAdded,
	NodeRemoved,
	PropertyAdded,
	PropertyChanged,
	PropertyRemoved,
}

impl ChangeKind {
	/// Returns true for property add/change/remove.
	pub const fn is_property(self) -> bool {
		matches!(self, Self::PropertyAdded | Self::PropertyChanged | Self::PropertyRemoved)
	}
}

/// One change. For property kinds, `path` is the property path, i.e. the
/// owning node's path joined with the property name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
	pub path: String,
	pub kind: ChangeKind,
}

impl ChangeEvent {
	pub fn new(path: impl Into<String>, kind: ChangeKind) -> Self {
		Self { path: path.into(), kind }
	}

	pub fn node_added(path: impl Into<String>) -> Self {
		Self::new(path, ChangeKind::NodeAdded)
	}

	pub fn node_removed(path: impl Into<String>) -> Self {
		Self::new(path, ChangeKind::NodeRemoved)
	}

	/// Property event for `name` on the node at `node_path`.
	pub fn property(node_path: &str, name: &str, kind: ChangeKind) -> Self {
		Self::new(crate::path::join(node_path, name), kind)
	}
}
