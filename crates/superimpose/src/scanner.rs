//! Bulk discovery of definition nodes.

use std::time::{Duration, Instant};

use tracing::info;

use crate::definition::CandidateDefinition;
use crate::error::{ConfigError, Result};
use crate::registry::{RegisterOutcome, Registry};
use crate::store::ContentStore;

/// Separator between query syntax and query body.
pub const QUERY_SEPARATOR: char = '|';

/// A parsed `"<syntax>|<body>"` discovery query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryQuery {
	pub syntax: String,
	pub body: String,
}

impl DiscoveryQuery {
	/// Splits at the first separator.
	pub fn parse(query: &str) -> std::result::Result<Self, ConfigError> {
		let (syntax, body) = query.split_once(QUERY_SEPARATOR).ok_or_else(|| ConfigError::MalformedQuery(query.to_string()))?;
		Ok(Self {
			syntax: syntax.trim().to_string(),
			body: body.trim().to_string(),
		})
	}
}

/// Runs every query and concatenates the node paths found, in query order.
///
/// All queries are parsed before any runs, so one malformed entry fails the
/// whole pass without touching the store.
pub fn find_all(store: &dyn ContentStore, queries: &[String]) -> Result<Vec<String>> {
	let parsed = queries.iter().map(|q| DiscoveryQuery::parse(q)).collect::<std::result::Result<Vec<_>, _>>()?;
	let mut paths = Vec::new();
	for query in parsed {
		paths.extend(store.query(&query.syntax, &query.body)?);
	}
	Ok(paths)
}

/// Counts from one registration pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
	pub applied: usize,
	pub skipped: usize,
	pub rejected: usize,
	pub elapsed: Duration,
	/// The pass stopped before registering every candidate.
	pub cancelled: bool,
}

impl ScanReport {
	fn record(&mut self, outcome: &RegisterOutcome) {
		match outcome {
			RegisterOutcome::Applied => self.applied += 1,
			RegisterOutcome::Skipped => self.skipped += 1,
			RegisterOutcome::Rejected(_) => self.rejected += 1,
		}
	}

	pub fn total(&self) -> usize {
		self.applied + self.skipped + self.rejected
	}
}

/// Discovers every definition and registers it.
///
/// `is_cancelled` is polled before each candidate; once it returns true the
/// pass stops and the report is marked cancelled.
pub fn scan(store: &dyn ContentStore, queries: &[String], registry: &Registry, is_cancelled: impl Fn() -> bool) -> Result<ScanReport> {
	let started = Instant::now();
	let mut report = ScanReport::default();
	for node_path in find_all(store, queries)? {
		if is_cancelled() {
			report.cancelled = true;
			break;
		}
		let candidate = CandidateDefinition::read(store, &node_path);
		report.record(&registry.register(&candidate));
	}
	report.elapsed = started.elapsed();
	info!(
		applied = report.applied,
		skipped = report.skipped,
		rejected = report.rejected,
		elapsed_ms = report.elapsed.as_millis() as u64,
		cancelled = report.cancelled,
		"registered superimposing definitions"
	);
	Ok(report)
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;
	use std::sync::atomic::{AtomicUsize, Ordering};

	use pretty_assertions::assert_eq;

	use super::*;
	use crate::error::{Error, StoreError};
	use crate::memory::{MemoryStore, RecordingSink};

	fn queries(list: &[&str]) -> Vec<String> {
		list.iter().map(|q| q.to_string()).collect()
	}

	#[test]
	fn test_parse_query() {
		assert_eq!(
			DiscoveryQuery::parse("marker|superimpose /content").unwrap(),
			DiscoveryQuery {
				syntax: "marker".into(),
				body: "superimpose /content".into()
			}
		);
		assert!(matches!(DiscoveryQuery::parse("superimpose /content"), Err(ConfigError::MalformedQuery(_))));
	}

	#[test]
	fn test_find_all_concatenates_in_order() {
		let store = MemoryStore::new();
		store.insert_definition("/content/b", "/content/a", false, false);
		store.insert_definition("/apps/c", "/apps/d", false, false);
		let found = find_all(&store, &queries(&["marker|superimpose /apps", "marker|superimpose /content"])).unwrap();
		assert_eq!(found, vec!["/apps/c".to_string(), "/content/b".to_string()]);
	}

	#[test]
	fn test_malformed_query_fails_whole_pass() {
		let store = MemoryStore::new();
		let err = find_all(&store, &queries(&["marker|superimpose", "no separator"])).unwrap_err();
		assert!(matches!(err, Error::Config(ConfigError::MalformedQuery(q)) if q == "no separator"));
	}

	#[test]
	fn test_unsupported_syntax_is_store_error() {
		let store = MemoryStore::new();
		let err = find_all(&store, &queries(&["sql2|SELECT * FROM [nt:base]"])).unwrap_err();
		assert!(matches!(err, Error::Store(StoreError::UnsupportedQuery { .. })));
	}

	#[test]
	fn test_scan_reports_outcomes() {
		let store = MemoryStore::new();
		store.insert_definition("/content/b", "/content/a", false, false);
		store.insert_definition("/content/c", "/content/c/inner", false, false);
		let registry = Registry::new(Arc::new(RecordingSink::new()));
		let q = queries(&["marker|superimpose /content"]);

		let first = scan(&store, &q, &registry, || false).unwrap();
		assert_eq!((first.applied, first.skipped, first.rejected), (1, 0, 1));

		let second = scan(&store, &q, &registry, || false).unwrap();
		assert_eq!((second.applied, second.skipped, second.rejected), (0, 1, 1));
		assert!(!second.cancelled);
	}

	#[test]
	fn test_overlapping_queries_register_once() {
		let store = MemoryStore::new();
		store.insert_definition("/content/b", "/content/a", false, false);
		let sink = Arc::new(RecordingSink::new());
		let registry = Registry::new(sink.clone());
		let report = scan(&store, &queries(&["marker|superimpose /content", "marker|superimpose"]), &registry, || false).unwrap();
		assert_eq!((report.applied, report.skipped), (1, 1));
		assert_eq!(sink.publish_count(), 1);
	}

	#[test]
	fn test_register_parent_collision_is_last_write_wins() {
		let store = MemoryStore::new();
		store.insert_definition("/content/b", "/content/x", false, false);
		store.insert_definition("/content/b/jcr:content", "/content/y", true, false);
		let registry = Registry::new(Arc::new(RecordingSink::new()));
		scan(&store, &queries(&["marker|superimpose /content"]), &registry, || false).unwrap();
		assert_eq!(registry.len(), 1);
		assert_eq!(registry.lookup("/content/b").unwrap().source_path(), "/content/y");
	}

	#[test]
	fn test_scan_stops_when_cancelled() {
		let store = MemoryStore::new();
		for i in 0..10 {
			store.insert_definition(&format!("/content/r{i}"), "/content/source", false, false);
		}
		let registry = Registry::new(Arc::new(RecordingSink::new()));
		let polled = AtomicUsize::new(0);
		let report = scan(&store, &queries(&["marker|superimpose /content"]), &registry, || polled.fetch_add(1, Ordering::SeqCst) >= 3).unwrap();
		assert!(report.cancelled);
		assert_eq!(report.total(), 3);
		assert_eq!(registry.len(), 3);
	}
}
