//! Mapping definitions as stored in the content tree.
//!
//! A definition node carries the [`MARKER`] tag and up to three properties
//! (see [`DefinitionProperty`]). Reading one produces a
//! [`CandidateDefinition`], which only becomes a [`MappingRecord`] after
//! validation.

use thiserror::Error;
use tracing::warn;

use crate::mapping::MappingRecord;
use crate::path;
use crate::store::{ContentStore, PropertyValue};

/// Marker tag identifying a node as a mapping definition.
pub const MARKER: &str = "superimpose";

/// The closed set of properties a definition node may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefinitionProperty {
	/// Source path to mirror. Required.
	SourcePath,
	/// Register the definition node's parent as the root instead of the node.
	RegisterParent,
	/// Let real nodes below the root shadow mirrored content.
	Overlayable,
}

impl DefinitionProperty {
	/// All definition properties.
	pub const ALL: [Self; 3] = [Self::SourcePath, Self::RegisterParent, Self::Overlayable];

	/// Property name as stored.
	pub const fn name(self) -> &'static str {
		match self {
			Self::SourcePath => "sourcePath",
			Self::RegisterParent => "registerParent",
			Self::Overlayable => "overlayable",
		}
	}

	/// Looks up a property by its stored name.
	pub fn from_name(name: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|p| p.name() == name)
	}
}

/// Why a definition cannot become an active mapping.
///
/// This is a validation result, not a failure: the registry withdraws any
/// mapping previously active at the root and reports it as a warning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidDefinition {
	/// The source path property is missing or blank.
	#[error("definition at {root} has no source path")]
	BlankSourcePath { root: String },
	/// A path is not a normalizable absolute path.
	#[error("'{path}' is not a valid absolute path")]
	InvalidPath { path: String },
	/// `registerParent` was set on a node with no mappable parent.
	#[error("definition at {node} asks to register its parent, but it has none")]
	NoParent { node: String },
	/// Root and source are the same path.
	#[error("superimposition at {root} points to itself")]
	SelfMapping { root: String },
	/// The source lies inside the root.
	#[error("superimposition at {root} points to its own descendant {source_path}")]
	SourceInsideRoot { root: String, source_path: String },
	/// The root lies inside the source.
	#[error("superimposition at {root} points to its own ancestor {source_path}")]
	RootInsideSource { root: String, source_path: String },
}

/// Unvalidated definition read from a definition node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateDefinition {
	/// Path of the definition node itself.
	pub node_path: String,
	/// Raw source path property, if present.
	pub source_path: Option<String>,
	/// Whether the node's parent is the mapping root.
	pub register_parent: bool,
	/// Whether overlays are honored.
	pub overlayable: bool,
}

impl CandidateDefinition {
	/// Creates a candidate for `node_path` with no properties set.
	pub fn new(node_path: impl Into<String>) -> Self {
		Self {
			node_path: node_path.into(),
			source_path: None,
			register_parent: false,
			overlayable: false,
		}
	}

	/// Sets the source path property.
	pub fn with_source(mut self, source_path: impl Into<String>) -> Self {
		self.source_path = Some(source_path.into());
		self
	}

	/// Sets the register-parent flag.
	pub fn with_register_parent(mut self, register_parent: bool) -> Self {
		self.register_parent = register_parent;
		self
	}

	/// Sets the overlayable flag.
	pub fn with_overlayable(mut self, overlayable: bool) -> Self {
		self.overlayable = overlayable;
		self
	}

	/// Root path this candidate would register under.
	///
	/// `None` when `registerParent` is set on a top-level node.
	pub fn root_path(&self) -> Option<String> {
		let node = path::normalize(&self.node_path).unwrap_or_else(|| self.node_path.clone());
		if self.register_parent {
			path::parent(&node).map(str::to_string)
		} else {
			Some(node)
		}
	}

	/// Validates the candidate into a mapping record.
	pub fn validate(&self) -> Result<MappingRecord, InvalidDefinition> {
		let root = self.root_path().ok_or_else(|| InvalidDefinition::NoParent {
			node: self.node_path.clone(),
		})?;
		match self.source_path.as_deref() {
			Some(source) if !source.trim().is_empty() => MappingRecord::new(&root, source, self.overlayable),
			_ => Err(InvalidDefinition::BlankSourcePath { root }),
		}
	}

	/// Reads the definition properties stored at `node_path`.
	///
	/// Properties are read from the node itself, never through a mapping, so
	/// a definition inside a superimposed tree cannot inherit values from its
	/// source. Unreadable properties count as absent.
	pub fn read(store: &dyn ContentStore, node_path: &str) -> Self {
		Self {
			node_path: node_path.to_string(),
			source_path: read_string(store, node_path, DefinitionProperty::SourcePath),
			register_parent: read_bool(store, node_path, DefinitionProperty::RegisterParent),
			overlayable: read_bool(store, node_path, DefinitionProperty::Overlayable),
		}
	}
}

fn read_property(store: &dyn ContentStore, node_path: &str, property: DefinitionProperty) -> Option<PropertyValue> {
	match store.property(node_path, property.name()) {
		Ok(value) => value,
		Err(e) => {
			warn!(node = node_path, property = property.name(), error = %e, "failed to read definition property");
			None
		}
	}
}

fn read_string(store: &dyn ContentStore, node_path: &str, property: DefinitionProperty) -> Option<String> {
	read_property(store, node_path, property).and_then(|v| v.as_string())
}

fn read_bool(store: &dyn ContentStore, node_path: &str, property: DefinitionProperty) -> bool {
	read_property(store, node_path, property).and_then(|v| v.as_bool()).unwrap_or(false)
}
