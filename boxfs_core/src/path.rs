//! Path normalization.
//!
//! Every path handed to boxfs is normalized before it is used as a cache key
//! or walked: `/` is the only separator, empty and `.` segments are dropped,
//! and there is no leading or trailing separator. The root is the empty
//! string.

/// The normalized spelling of the root path.
pub const ROOT: &str = "";

pub fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for segment in segments(path) {
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(segment);
    }
    out
}

pub fn is_root(path: &str) -> bool {
    segments(path).next().is_none()
}

/// Iterates the non-empty segments of `path`, skipping `.` components.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty() && *s != ".")
}

/// Joins a normalized parent path with a single segment.
pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_owned()
    } else {
        format!("{parent}/{name}")
    }
}

/// A non-root path split into its parent directory and last segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Normalized parent path, empty when the parent is the root.
    pub parent: String,
    pub base_name: String,
}

impl ResolvedPath {
    /// Splits `path`; the root has no parent and yields `None`.
    pub fn split(path: &str) -> Option<Self> {
        let norm = normalize(path);
        if norm.is_empty() {
            return None;
        }
        Some(match norm.rfind('/') {
            Some(idx) => Self {
                parent: norm[..idx].to_owned(),
                base_name: norm[idx + 1..].to_owned(),
            },
            None => Self {
                parent: String::new(),
                base_name: norm,
            },
        })
    }

    pub fn full_path(&self) -> String {
        join(&self.parent, &self.base_name)
    }
}

/// Strict ancestors of a normalized path, nearest first, excluding the root.
///
/// `"a/b/c"` yields `"a/b"` then `"a"`.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    let mut current = path;
    std::iter::from_fn(move || {
        let idx = current.rfind('/')?;
        current = &current[..idx];
        Some(current)
    })
}

/// Cumulative prefixes of a normalized path, outermost first.
///
/// `"a/b/c"` yields `"a"`, `"a/b"`, `"a/b/c"`.
pub fn prefixes(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/')
        .map(move |(idx, _)| &path[..idx])
        .chain((!path.is_empty()).then_some(path))
}

/// True if `path` lies strictly below `ancestor`.
pub fn is_descendant(path: &str, ancestor: &str) -> bool {
    if ancestor.is_empty() {
        return !path.is_empty();
    }
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}
