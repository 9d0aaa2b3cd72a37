//! Superimposed content trees.
//!
//! A mapping makes the content under a *source* path appear under a *root*
//! path. Mappings are declared by definition nodes inside the content tree
//! (tagged [`definition::MARKER`], carrying the properties in
//! [`DefinitionProperty`]) and are kept in a [`Registry`] that follows the
//! store: a bootstrap scan registers what exists at activation, and change
//! batches from the store's feed register, replace, and withdraw mappings as
//! definitions come and go. Every active mapping is exposed to the host
//! through a [`MappingSink`].
//!
//! Reads go through [`SuperimposingResolver`], which rewrites root-side paths
//! with [`mapper::map_forward`]. An overlayable mapping lets real nodes below
//! its root win over the mirrored content.
//!
//! [`SuperimposingManager`] ties it together:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use strata_superimpose::memory::{MemoryStore, RecordingSink};
//! use strata_superimpose::{ManagerConfig, SuperimposingManager};
//!
//! let store = MemoryStore::new();
//! store.insert_definition("/content/site-b", "/content/site-a", false, false);
//!
//! let manager = SuperimposingManager::new(
//! 	ManagerConfig::enabled_for(&["/content"]),
//! 	Arc::new(store.clone()),
//! 	Arc::new(store.clone()),
//! 	Arc::new(RecordingSink::new()),
//! );
//! manager.activate()?;
//! # Ok::<(), strata_superimpose::Error>(())
//! ```

pub mod config;
pub mod definition;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod manager;
pub mod mapper;
pub mod mapping;
pub mod memory;
pub mod path;
pub mod registry;
pub mod resolver;
pub mod resource;
pub mod scanner;
pub mod sink;
pub mod store;

pub use config::ManagerConfig;
pub use definition::{CandidateDefinition, DefinitionProperty, InvalidDefinition};
pub use error::{ConfigError, ConfigWarning, Error, PersistenceError, Result, StoreError};
pub use event::{ChangeEvent, ChangeKind};
pub use manager::{BootstrapState, SuperimposingManager};
pub use mapping::MappingRecord;
pub use registry::{RegisterOutcome, Registry};
pub use resolver::{ResourceProvider, StoreProvider, SuperimposingResolver};
pub use resource::{Resource, SuperimposedResource};
pub use scanner::ScanReport;
pub use sink::{MappingSink, PublishedHandle};
pub use store::{ChangeFeed, ChangeListener, ContentStore, PropertyMap, PropertyValue, StoreConnector, StoredResource, SubscriptionId};
pub use strata_worker::TaskOutcome;

#[cfg(test)]
use tracing_subscriber as _;
