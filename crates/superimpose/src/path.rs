//! Absolute, `/`-separated content paths.
//!
//! Paths are plain strings. Comparisons are exact; a path is a descendant of
//! another only across a separator boundary, so `/a/bb` is not below `/a/b`.

/// Path separator.
pub const SEPARATOR: char = '/';

/// Normalizes an absolute path.
///
/// Collapses repeated separators and strips a trailing one. Returns `None`
/// for relative paths, the bare root `/`, and paths containing `.` or `..`
/// segments.
pub fn normalize(path: &str) -> Option<String> {
	let path = path.trim();
	if !path.starts_with(SEPARATOR) {
		return None;
	}
	let mut out = String::with_capacity(path.len());
	for segment in path.split(SEPARATOR).filter(|s| !s.is_empty()) {
		if segment == "." || segment == ".." {
			return None;
		}
		out.push(SEPARATOR);
		out.push_str(segment);
	}
	if out.is_empty() { None } else { Some(out) }
}

/// Returns true if `path` is already in normalized form.
pub fn is_normalized(path: &str) -> bool {
	normalize(path).is_some_and(|n| n == path)
}

/// Returns the parent of `path`, or `None` for a top-level path.
///
/// `/content/a` has parent `/content`; `/content` has no parent this crate
/// can map, since the bare root is never a valid mapping path.
pub fn parent(path: &str) -> Option<&str> {
	match path.rfind(SEPARATOR) {
		Some(0) | None => None,
		Some(idx) => Some(&path[..idx]),
	}
}

/// Returns the last segment of `path`.
pub fn name(path: &str) -> &str {
	match path.rfind(SEPARATOR) {
		Some(idx) => &path[idx + 1..],
		None => path,
	}
}

/// Joins a child name onto a path.
pub fn join(path: &str, name: &str) -> String {
	let mut out = String::with_capacity(path.len() + 1 + name.len());
	out.push_str(path);
	out.push(SEPARATOR);
	out.push_str(name);
	out
}

/// Returns the part of `path` strictly below `ancestor`, without the leading
/// separator.
pub fn strip_descendant<'a>(path: &'a str, ancestor: &str) -> Option<&'a str> {
	path.strip_prefix(ancestor)?.strip_prefix(SEPARATOR).filter(|rest| !rest.is_empty())
}

/// Returns true if `path` lies strictly below `ancestor`.
pub fn is_descendant(path: &str, ancestor: &str) -> bool {
	strip_descendant(path, ancestor).is_some()
}

/// Returns true if `path` equals `ancestor` or lies below it.
pub fn is_same_or_descendant(path: &str, ancestor: &str) -> bool {
	path == ancestor || is_descendant(path, ancestor)
}

/// Iterates `path` and then each of its ancestors, deepest first.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
	std::iter::successors(Some(path), |p| parent(p))
}
