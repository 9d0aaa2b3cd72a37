//! Resolution of root-side paths through the active mappings.
//!
//! [`SuperimposingResolver`] answers reads for paths covered by a mapping and
//! hands everything else, including every write, to its parent provider.

use std::sync::Arc;

use tracing::error;

use crate::error::PersistenceError;
use crate::mapper::{self, StoreOverlayProbe};
use crate::mapping::MappingRecord;
use crate::path;
use crate::registry::Registry;
use crate::resource::{Resource, SuperimposedResource};
use crate::store::{ContentStore, PropertyMap};

/// A link in the resolution chain.
///
/// Write operations default to refusing, for read-only providers.
pub trait ResourceProvider: Send + Sync {
	/// Resolves `path`, or `None` if this provider has nothing there.
	fn resolve(&self, path: &str) -> Option<Resource>;

	/// Lists the children of `parent`.
	fn list_children(&self, parent: &Resource) -> Vec<Resource>;

	fn create(&self, path: &str, _properties: PropertyMap) -> Result<Resource, PersistenceError> {
		Err(PersistenceError::ReadOnly { path: path.to_string() })
	}

	fn delete(&self, path: &str) -> Result<(), PersistenceError> {
		Err(PersistenceError::ReadOnly { path: path.to_string() })
	}

	/// Discards pending changes.
	fn revert(&self) {}

	/// Persists pending changes.
	fn commit(&self) -> Result<(), PersistenceError> {
		Ok(())
	}

	/// Returns true if there are uncommitted changes.
	fn has_changes(&self) -> bool {
		false
	}
}

/// Provider reading straight from a [`ContentStore`].
///
/// This is the natural parent of a [`SuperimposingResolver`]: it finds the
/// overlay nodes that forward mapping steps aside for.
pub struct StoreProvider {
	store: Arc<dyn ContentStore>,
}

impl StoreProvider {
	pub fn new(store: Arc<dyn ContentStore>) -> Self {
		Self { store }
	}
}

impl ResourceProvider for StoreProvider {
	fn resolve(&self, path: &str) -> Option<Resource> {
		match self.store.resource(path) {
			Ok(found) => found.map(Resource::Stored),
			Err(e) => {
				error!(path, error = %e, "failed to resolve resource");
				None
			}
		}
	}

	fn list_children(&self, parent: &Resource) -> Vec<Resource> {
		match self.store.children(parent.path()) {
			Ok(children) => children.into_iter().map(Resource::Stored).collect(),
			Err(e) => {
				error!(path = parent.path(), error = %e, "failed to list children");
				Vec::new()
			}
		}
	}
}

/// Resolves paths below mapping roots to their source content.
pub struct SuperimposingResolver {
	registry: Arc<Registry>,
	store: Arc<dyn ContentStore>,
	parent: Option<Arc<dyn ResourceProvider>>,
}

impl SuperimposingResolver {
	pub fn new(registry: Arc<Registry>, store: Arc<dyn ContentStore>, parent: Option<Arc<dyn ResourceProvider>>) -> Self {
		Self { registry, store, parent }
	}

	/// The mapping whose root is the deepest one at or above `path`.
	pub fn mapping_for(&self, path: &str) -> Option<Arc<MappingRecord>> {
		path::ancestors(path).find_map(|p| self.registry.lookup(p))
	}

	/// Resolves `path` through the covering mapping only, without falling
	/// back to the parent.
	pub fn resolve_superimposed(&self, path: &str) -> Option<SuperimposedResource> {
		let record = self.mapping_for(path)?;
		let mapped = mapper::map_forward(&record, &StoreOverlayProbe(self.store.as_ref()), path)?;
		match self.store.resource(&mapped) {
			Ok(delegate) => delegate.map(|d| SuperimposedResource::new(path, mapped, d)),
			Err(e) => {
				error!(path, mapped = %mapped, error = %e, "failed to read superimposed source");
				None
			}
		}
	}

	fn superimposed_children(&self, parent: &SuperimposedResource) -> Vec<Resource> {
		match self.store.children(parent.mapped_path()) {
			Ok(children) => children
				.into_iter()
				.map(|child| {
					let logical = path::join(parent.path(), child.name());
					let mapped = child.path().to_string();
					Resource::Superimposed(SuperimposedResource::new(logical, mapped, child))
				})
				.collect(),
			Err(e) => {
				error!(path = parent.path(), mapped = parent.mapped_path(), error = %e, "failed to list superimposed children");
				Vec::new()
			}
		}
	}

	fn no_parent(path: &str) -> PersistenceError {
		PersistenceError::ReadOnly { path: path.to_string() }
	}
}

impl ResourceProvider for SuperimposingResolver {
	fn resolve(&self, path: &str) -> Option<Resource> {
		if let Some(resource) = self.resolve_superimposed(path) {
			return Some(Resource::Superimposed(resource));
		}
		self.parent.as_ref()?.resolve(path)
	}

	fn list_children(&self, parent: &Resource) -> Vec<Resource> {
		match (parent, &self.parent) {
			(Resource::Superimposed(resource), _) => self.superimposed_children(resource),
			(Resource::Stored(_), Some(provider)) => provider.list_children(parent),
			(Resource::Stored(_), None) => Vec::new(),
		}
	}

	fn create(&self, path: &str, properties: PropertyMap) -> Result<Resource, PersistenceError> {
		match &self.parent {
			Some(provider) => provider.create(path, properties),
			None => Err(Self::no_parent(path)),
		}
	}

	fn delete(&self, path: &str) -> Result<(), PersistenceError> {
		match &self.parent {
			Some(provider) => provider.delete(path),
			None => Err(Self::no_parent(path)),
		}
	}

	fn revert(&self) {
		if let Some(provider) = &self.parent {
			provider.revert();
		}
	}

	fn commit(&self) -> Result<(), PersistenceError> {
		match &self.parent {
			Some(provider) => provider.commit(),
			None => Ok(()),
		}
	}

	fn has_changes(&self) -> bool {
		self.parent.as_ref().is_some_and(|p| p.has_changes())
	}
}

impl std::fmt::Debug for SuperimposingResolver {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SuperimposingResolver")
			.field("registry", &self.registry)
			.field("has_parent", &self.parent.is_some())
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests;
