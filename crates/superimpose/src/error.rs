//! Error types.

use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by the content store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
	/// No connection could be established, or it was closed.
	#[error("content store unavailable: {0}")]
	Unavailable(String),
	/// The store does not understand the query syntax.
	#[error("unsupported query syntax '{syntax}'")]
	UnsupportedQuery { syntax: String },
	/// A query was rejected or failed while running.
	#[error("{syntax} query failed: {message}")]
	Query { syntax: String, message: String },
	/// Reading the item at `path` failed.
	#[error("cannot access {path}: {message}")]
	Access { path: String, message: String },
}

/// Configuration problems.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// A discovery query lacks the `<syntax>|<body>` separator.
	#[error("query string does not contain query syntax separated by '|': {0}")]
	MalformedQuery(String),
	/// TOML syntax or schema error.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),
	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},
	/// An observation path is not an absolute path.
	#[error("invalid {key} entry: '{path}'")]
	InvalidPath { key: &'static str, path: String },
}

/// Non-fatal configuration findings, logged when the manager activates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
	/// A deprecated key was used and merged into its replacement.
	DeprecatedKey { used: &'static str, replacement: &'static str },
}

impl std::fmt::Display for ConfigWarning {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::DeprecatedKey { used, replacement } => {
				write!(f, "using deprecated configuration key '{used}', please switch to '{replacement}'")
			}
		}
	}
}

/// Write failures passed through from the parent provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
	/// The provider rejected or failed the write.
	#[error("cannot persist {path}: {message}")]
	Failed { path: String, message: String },
	/// No provider in the chain accepts writes.
	#[error("{path} is read-only")]
	ReadOnly { path: String },
}

/// Top-level error for manager operations.
#[derive(Debug, Error)]
pub enum Error {
	/// Configuration error.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Content store error.
	#[error(transparent)]
	Store(#[from] StoreError),
}

/// Result type for manager operations.
pub type Result<T> = std::result::Result<T, Error>;
