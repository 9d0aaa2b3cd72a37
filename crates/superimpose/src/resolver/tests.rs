use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use super::*;
use crate::definition::CandidateDefinition;
use crate::memory::{MemoryStore, RecordingSink};

struct Fixture {
	store: MemoryStore,
	registry: Arc<Registry>,
}

impl Fixture {
	fn new() -> Self {
		let store = MemoryStore::new();
		store.set_property("/content/site-a/page1", "title", "Page one");
		store.set_property("/content/site-a/page2", "title", "Page two");
		store.insert_node("/content/site-a/page1/child");
		Self {
			store,
			registry: Arc::new(Registry::new(Arc::new(RecordingSink::new()))),
		}
	}

	fn map(&self, root: &str, source: &str, overlayable: bool) {
		self.registry
			.register(&CandidateDefinition::new(root).with_source(source).with_overlayable(overlayable));
	}

	fn resolver(&self) -> SuperimposingResolver {
		let store: Arc<dyn ContentStore> = Arc::new(self.store.clone());
		let parent: Arc<dyn ResourceProvider> = Arc::new(StoreProvider::new(Arc::clone(&store)));
		SuperimposingResolver::new(Arc::clone(&self.registry), store, Some(parent))
	}
}

#[test]
fn test_resolves_through_plain_mapping() {
	let f = Fixture::new();
	f.map("/content/site-b", "/content/site-a", false);
	let resource = f.resolver().resolve("/content/site-b/page1").unwrap();
	let superimposed = resource.as_superimposed().unwrap();
	assert_eq!(resource.path(), "/content/site-b/page1");
	assert_eq!(superimposed.mapped_path(), "/content/site-a/page1");
	assert_eq!(resource.property("title").and_then(|v| v.as_string()).as_deref(), Some("Page one"));
}

#[test]
fn test_overlay_defers_to_parent() {
	let f = Fixture::new();
	f.map("/content/site-b", "/content/site-a", true);
	f.store.set_property("/content/site-b/page1", "title", "Overlay");
	let resolver = f.resolver();

	assert_eq!(resolver.resolve_superimposed("/content/site-b/page1"), None);
	let resource = resolver.resolve("/content/site-b/page1").unwrap();
	assert!(!resource.is_superimposed());
	assert_eq!(resource.property("title").and_then(|v| v.as_string()).as_deref(), Some("Overlay"));

	let mirrored = resolver.resolve("/content/site-b/page2").unwrap();
	assert!(mirrored.is_superimposed());
}

#[test]
fn test_root_is_never_overlaid() {
	let f = Fixture::new();
	f.map("/content/site-b", "/content/site-a", true);
	f.store.insert_node("/content/site-b");
	let resource = f.resolver().resolve("/content/site-b").unwrap();
	assert_eq!(resource.as_superimposed().unwrap().mapped_path(), "/content/site-a");
}

#[test]
fn test_missing_source_falls_back_to_parent() {
	let f = Fixture::new();
	f.map("/content/site-b", "/content/site-a", false);
	let resolver = f.resolver();
	assert_eq!(resolver.resolve("/content/site-b/nope"), None);

	f.store.insert_node("/content/site-b/local");
	assert!(!resolver.resolve("/content/site-b/local").unwrap().is_superimposed());
}

#[test]
fn test_unmapped_path_goes_to_parent() {
	let f = Fixture::new();
	let resource = f.resolver().resolve("/content/site-a/page1").unwrap();
	assert!(!resource.is_superimposed());
}

#[test]
fn test_deepest_mapping_wins() {
	let f = Fixture::new();
	f.store.insert_node("/content/other/page1");
	f.map("/content/site-b", "/content/site-a", false);
	f.map("/content/site-b/nested", "/content/other", false);
	let resource = f.resolver().resolve("/content/site-b/nested/page1").unwrap();
	assert_eq!(resource.as_superimposed().unwrap().mapped_path(), "/content/other/page1");
}

#[test]
fn test_children_get_logical_paths() {
	let f = Fixture::new();
	f.map("/content/site-b", "/content/site-a", false);
	let resolver = f.resolver();
	let root = resolver.resolve("/content/site-b").unwrap();
	let children = resolver.list_children(&root);
	let paths: Vec<(&str, &str)> = children
		.iter()
		.map(|c| (c.path(), c.as_superimposed().unwrap().mapped_path()))
		.collect();
	assert_eq!(
		paths,
		vec![
			("/content/site-b/page1", "/content/site-a/page1"),
			("/content/site-b/page2", "/content/site-a/page2"),
		]
	);

	let grandchildren = resolver.list_children(&children[0]);
	assert_eq!(grandchildren.len(), 1);
	assert_eq!(grandchildren[0].path(), "/content/site-b/page1/child");
}

#[test]
fn test_children_of_plain_resource_come_from_parent() {
	let f = Fixture::new();
	let resolver = f.resolver();
	let source = resolver.resolve("/content/site-a").unwrap();
	let children = resolver.list_children(&source);
	let names: Vec<&str> = children.iter().map(|c| c.name()).collect();
	assert_eq!(names, vec!["page1", "page2"]);
	assert!(children.iter().all(|c| !c.is_superimposed()));
}

#[test]
fn test_store_failure_means_no_mapping() {
	let f = Fixture::new();
	f.map("/content/site-b", "/content/site-a", false);
	let resolver = f.resolver();
	f.store.fail_reads(true);
	assert_eq!(resolver.resolve("/content/site-b/page1"), None);
}

#[derive(Default)]
struct WriteLog {
	calls: Mutex<Vec<String>>,
}

impl ResourceProvider for WriteLog {
	fn resolve(&self, _path: &str) -> Option<Resource> {
		None
	}

	fn list_children(&self, _parent: &Resource) -> Vec<Resource> {
		Vec::new()
	}

	fn create(&self, path: &str, properties: PropertyMap) -> Result<Resource, PersistenceError> {
		self.calls.lock().push(format!("create {path}"));
		Ok(Resource::Stored(crate::store::StoredResource::new(path, properties)))
	}

	fn delete(&self, path: &str) -> Result<(), PersistenceError> {
		self.calls.lock().push(format!("delete {path}"));
		Ok(())
	}

	fn revert(&self) {
		self.calls.lock().push("revert".into());
	}

	fn commit(&self) -> Result<(), PersistenceError> {
		self.calls.lock().push("commit".into());
		Err(PersistenceError::Failed {
			path: "/".into(),
			message: "conflict".into(),
		})
	}

	fn has_changes(&self) -> bool {
		true
	}
}

#[test]
fn test_writes_pass_through_to_parent() {
	let f = Fixture::new();
	f.map("/content/site-b", "/content/site-a", false);
	let log = Arc::new(WriteLog::default());
	let resolver = SuperimposingResolver::new(Arc::clone(&f.registry), Arc::new(f.store.clone()), Some(log.clone()));

	resolver.create("/content/site-b/new", PropertyMap::new()).unwrap();
	resolver.delete("/content/site-b/page1").unwrap();
	resolver.revert();
	assert!(resolver.commit().is_err());
	assert!(resolver.has_changes());
	assert_eq!(
		*log.calls.lock(),
		vec!["create /content/site-b/new", "delete /content/site-b/page1", "revert", "commit"]
	);
}

#[test]
fn test_writes_without_parent_are_refused() {
	let f = Fixture::new();
	let resolver = SuperimposingResolver::new(Arc::clone(&f.registry), Arc::new(f.store.clone()), None);
	assert!(matches!(resolver.create("/content/x", PropertyMap::new()), Err(PersistenceError::ReadOnly { .. })));
	assert!(!resolver.has_changes());
	assert!(resolver.commit().is_ok());
}
