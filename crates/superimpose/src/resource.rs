//! Resources handed out by resolution.

use crate::path;
use crate::store::{PropertyMap, PropertyValue, StoredResource};

/// A read-through view of a source node presented at a root-side path.
///
/// Reads go to the delegate; identity is the logical path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperimposedResource {
	path: String,
	mapped_path: String,
	delegate: StoredResource,
}

impl SuperimposedResource {
	pub fn new(path: impl Into<String>, mapped_path: impl Into<String>, delegate: StoredResource) -> Self {
		Self {
			path: path.into(),
			mapped_path: mapped_path.into(),
			delegate,
		}
	}

	/// Root-side path the resource was requested at.
	pub fn path(&self) -> &str {
		&self.path
	}

	/// Source-side path the content was read from.
	pub fn mapped_path(&self) -> &str {
		&self.mapped_path
	}

	/// The wrapped source node.
	pub fn delegate(&self) -> &StoredResource {
		&self.delegate
	}
}

/// A resolved resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
	/// A node read as-is.
	Stored(StoredResource),
	/// Source content presented under a mapping root.
	Superimposed(SuperimposedResource),
}

impl Resource {
	pub fn path(&self) -> &str {
		match self {
			Self::Stored(r) => r.path(),
			Self::Superimposed(r) => r.path(),
		}
	}

	pub fn name(&self) -> &str {
		path::name(self.path())
	}

	pub fn properties(&self) -> &PropertyMap {
		match self {
			Self::Stored(r) => r.properties(),
			Self::Superimposed(r) => r.delegate().properties(),
		}
	}

	pub fn property(&self, name: &str) -> Option<&PropertyValue> {
		self.properties().get(name)
	}

	pub fn as_superimposed(&self) -> Option<&SuperimposedResource> {
		match self {
			Self::Superimposed(r) => Some(r),
			Self::Stored(_) => None,
		}
	}

	pub fn is_superimposed(&self) -> bool {
		matches!(self, Self::Superimposed(_))
	}
}

impl From<StoredResource> for Resource {
	fn from(resource: StoredResource) -> Self {
		Self::Stored(resource)
	}
}

impl From<SuperimposedResource> for Resource {
	fn from(resource: SuperimposedResource) -> Self {
		Self::Superimposed(resource)
	}
}
