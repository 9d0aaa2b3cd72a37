//! Manager configuration, read from TOML.
//!
//! ```toml
//! enabled = true
//! observation-paths = ["/content"]
//! find-all-queries = ["marker|superimpose /content"]
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::{ConfigError, ConfigWarning};
use crate::path;

/// Key of the observation path list.
pub const OBSERVATION_PATHS_KEY: &str = "observation-paths";

/// Misspelled historical key, still honored.
pub const LEGACY_OBSERVATION_PATHS_KEY: &str = "obervation-paths";

/// Default observation root.
pub const DEFAULT_OBSERVATION_PATH: &str = "/content";

/// Default discovery query: every definition-tagged node under `/content`.
pub const DEFAULT_FIND_ALL_QUERY: &str = "marker|superimpose /content";

/// Settings for [`crate::SuperimposingManager`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ManagerConfig {
	/// When false the engine stays inert.
	pub enabled: bool,
	/// Path prefixes watched for definition changes.
	pub observation_paths: Vec<String>,
	/// Paths from the legacy key, merged into `observation_paths`. Setting
	/// the key at all, even to an empty list, triggers a deprecation warning.
	#[serde(rename = "obervation-paths")]
	pub legacy_observation_paths: Option<Vec<String>>,
	/// `"<syntax>|<body>"` queries used to find every definition.
	pub find_all_queries: Vec<String>,
}

impl Default for ManagerConfig {
	fn default() -> Self {
		Self {
			enabled: false,
			observation_paths: vec![DEFAULT_OBSERVATION_PATH.to_string()],
			legacy_observation_paths: None,
			find_all_queries: vec![DEFAULT_FIND_ALL_QUERY.to_string()],
		}
	}
}

/// Observation paths after merging and normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservationPaths {
	pub paths: Vec<String>,
	pub warnings: Vec<ConfigWarning>,
}

impl ManagerConfig {
	/// Parses a TOML document. Missing keys take their defaults.
	pub fn parse(content: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(content)?)
	}

	/// Reads and parses a TOML file.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::parse(&content)
	}

	/// Enabled config with the given observation paths and default queries.
	pub fn enabled_for(observation_paths: &[&str]) -> Self {
		Self {
			enabled: true,
			observation_paths: observation_paths.iter().map(|p| p.to_string()).collect(),
			..Self::default()
		}
	}

	/// Merges the legacy key into the observation paths, normalizing and
	/// de-duplicating them in order.
	pub fn effective_observation_paths(&self) -> Result<ObservationPaths, ConfigError> {
		let mut merged = ObservationPaths::default();
		let legacy = self.legacy_observation_paths.as_deref().unwrap_or_default();
		let sources = [(OBSERVATION_PATHS_KEY, self.observation_paths.as_slice()), (LEGACY_OBSERVATION_PATHS_KEY, legacy)];
		for (key, paths) in sources {
			for raw in paths {
				let normalized = path::normalize(raw).ok_or_else(|| ConfigError::InvalidPath { key, path: raw.clone() })?;
				if !merged.paths.contains(&normalized) {
					merged.paths.push(normalized);
				}
			}
		}
		if self.legacy_observation_paths.is_some() {
			merged.warnings.push(ConfigWarning::DeprecatedKey {
				used: LEGACY_OBSERVATION_PATHS_KEY,
				replacement: OBSERVATION_PATHS_KEY,
			});
		}
		Ok(merged)
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn test_empty_document_is_default() {
		let config = ManagerConfig::parse("").unwrap();
		assert_eq!(config, ManagerConfig::default());
		assert!(!config.enabled);
		assert_eq!(config.find_all_queries, vec![DEFAULT_FIND_ALL_QUERY.to_string()]);
	}

	#[test]
	fn test_parse_keys() {
		let config = ManagerConfig::parse(
			r#"
enabled = true
observation-paths = ["/content/sites", "/apps"]
find-all-queries = ["marker|superimpose /content/sites", "marker|superimpose /apps"]
"#,
		)
		.unwrap();
		assert!(config.enabled);
		assert_eq!(config.observation_paths, vec!["/content/sites", "/apps"]);
		assert_eq!(config.find_all_queries.len(), 2);
		assert!(config.effective_observation_paths().unwrap().warnings.is_empty());
	}

	#[test]
	fn test_legacy_key_is_merged_with_warning() {
		let config = ManagerConfig::parse(
			r#"
observation-paths = ["/content"]
obervation-paths = ["/content/", "/conf"]
"#,
		)
		.unwrap();
		let effective = config.effective_observation_paths().unwrap();
		assert_eq!(effective.paths, vec!["/content", "/conf"]);
		assert_eq!(
			effective.warnings,
			vec![ConfigWarning::DeprecatedKey {
				used: "obervation-paths",
				replacement: "observation-paths"
			}]
		);
	}

	#[test]
	fn test_empty_legacy_key_still_warns() {
		let config = ManagerConfig::parse("obervation-paths = []").unwrap();
		let effective = config.effective_observation_paths().unwrap();
		assert_eq!(effective.paths, vec![DEFAULT_OBSERVATION_PATH]);
		assert_eq!(effective.warnings.len(), 1);
	}

	#[test]
	fn test_invalid_observation_path() {
		let config = ManagerConfig {
			observation_paths: vec!["content".into()],
			..ManagerConfig::default()
		};
		assert!(matches!(
			config.effective_observation_paths(),
			Err(ConfigError::InvalidPath {
				key: OBSERVATION_PATHS_KEY,
				..
			})
		));
	}

	#[test]
	fn test_unknown_key_is_rejected() {
		assert!(matches!(ManagerConfig::parse("enable = true"), Err(ConfigError::Toml(_))));
	}

	#[test]
	fn test_load_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "enabled = true").unwrap();
		let config = ManagerConfig::load(file.path()).unwrap();
		assert!(config.enabled);

		let missing = file.path().with_extension("missing");
		assert!(matches!(ManagerConfig::load(&missing), Err(ConfigError::Io { .. })));
	}
}
