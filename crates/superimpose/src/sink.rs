//! Outbound interface exposing active mappings to the host.

use crate::mapping::MappingRecord;

/// Opaque token for one published mapping.
///
/// Handles are neither `Clone` nor `Copy`: the registry owns each one and
/// hands it back to [`MappingSink::withdraw`] exactly once.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct PublishedHandle(u64);

impl PublishedHandle {
	/// Wraps a sink-defined identifier.
	pub const fn new(id: u64) -> Self {
		Self(id)
	}

	/// Returns the sink-defined identifier.
	pub const fn id(&self) -> u64 {
		self.0
	}
}

/// Host-side registration of mappings.
pub trait MappingSink: Send + Sync {
	/// Exposes `record` to the host, returning a handle to withdraw it later.
	fn publish(&self, record: &MappingRecord) -> PublishedHandle;

	/// Withdraws a previously published mapping.
	fn withdraw(&self, handle: PublishedHandle);
}
