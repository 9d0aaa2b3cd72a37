//! Bidirectional path rewriting between a mapping's root and source trees.
//!
//! Forward mapping turns a requested root-side path into the source-side path
//! to read. With an overlayable mapping, a real node below the root wins over
//! the mirrored content and forward mapping returns `None` so the caller
//! defers to the provider owning the real node. The root itself is never
//! overlaid.

use tracing::error;

use crate::mapping::MappingRecord;
use crate::path;
use crate::store::ContentStore;

/// Existence check for overlay nodes below a mapping root.
pub trait OverlayProbe {
	/// Returns true if a real node exists at `path`.
	fn overlay_exists(&self, path: &str) -> bool;
}

impl<F> OverlayProbe for F
where
	F: Fn(&str) -> bool,
{
	fn overlay_exists(&self, path: &str) -> bool {
		self(path)
	}
}

/// Probes a [`ContentStore`] for overlay nodes.
///
/// Store failures count as "no overlay", so resolution falls through to the
/// mirrored content.
pub struct StoreOverlayProbe<'a>(pub &'a dyn ContentStore);

impl OverlayProbe for StoreOverlayProbe<'_> {
	fn overlay_exists(&self, path: &str) -> bool {
		match self.0.exists(path) {
			Ok(exists) => exists,
			Err(e) => {
				error!(path, error = %e, "overlay probe failed");
				false
			}
		}
	}
}

/// Maps a root-side path to the source-side path to resolve.
pub fn map_forward(record: &MappingRecord, probe: &dyn OverlayProbe, path: &str) -> Option<String> {
	if !record.is_overlayable() || path == record.root_path() {
		return map_plain(record, path);
	}
	if path::is_descendant(path, record.root_path()) {
		if probe.overlay_exists(path) {
			return None;
		}
		return map_plain(record, path);
	}
	None
}

/// Maps a root-side path without consulting overlays.
pub fn map_plain(record: &MappingRecord, path: &str) -> Option<String> {
	if path == record.root_path() {
		return Some(record.source_path().to_string());
	}
	path::strip_descendant(path, record.root_path()).map(|suffix| path::join(record.source_path(), suffix))
}

/// Maps a source-side path back to where it appears under the root.
pub fn map_reverse(record: &MappingRecord, path: &str) -> Option<String> {
	if path == record.source_path() {
		return Some(record.root_path().to_string());
	}
	path::strip_descendant(path, record.source_path()).map(|suffix| path::join(record.root_path(), suffix))
}
