use std::fmt;

use crate::definition::InvalidDefinition;
use crate::path;

/// One active superimposition: content under `source_path` appears under
/// `root_path`.
///
/// Records are immutable and compared by value. A changed definition produces
/// a new record that replaces the old one in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MappingRecord {
	root_path: String,
	source_path: String,
	overlayable: bool,
}

impl MappingRecord {
	/// Builds a record, normalizing both paths.
	///
	/// Fails when either path is not absolute, when the paths are equal, or
	/// when one contains the other.
	pub fn new(root_path: &str, source_path: &str, overlayable: bool) -> Result<Self, InvalidDefinition> {
		if source_path.trim().is_empty() {
			return Err(InvalidDefinition::BlankSourcePath {
				root: root_path.to_string(),
			});
		}
		let root = path::normalize(root_path).ok_or_else(|| InvalidDefinition::InvalidPath {
			path: root_path.to_string(),
		})?;
		let source = path::normalize(source_path).ok_or_else(|| InvalidDefinition::InvalidPath {
			path: source_path.to_string(),
		})?;

		if root == source {
			return Err(InvalidDefinition::SelfMapping { root });
		}
		if path::is_descendant(&source, &root) {
			return Err(InvalidDefinition::SourceInsideRoot { root, source_path: source });
		}
		if path::is_descendant(&root, &source) {
			return Err(InvalidDefinition::RootInsideSource { root, source_path: source });
		}

		Ok(Self {
			root_path: root,
			source_path: source,
			overlayable,
		})
	}

	/// Virtual location the source content appears at.
	pub fn root_path(&self) -> &str {
		&self.root_path
	}

	/// Real location whose content is mirrored.
	pub fn source_path(&self) -> &str {
		&self.source_path
	}

	/// Whether real nodes below the root shadow mirrored content.
	pub fn is_overlayable(&self) -> bool {
		self.overlayable
	}
}

impl fmt::Display for MappingRecord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "superimposition [path={}, sourcePath={}, overlayable={}]", self.root_path, self.source_path, self.overlayable)
	}
}
