//! Cached name paths from the tree root down to an element.

use std::fmt::Display;

/// Default separator used when a path is rendered or parsed.
pub const DEFAULT_SEPARATOR: &str = "/";

/// Ordered list of names from the root down to and including one element.
///
/// Every element keeps one of these cached. It is refreshed by
/// [`ElementPath::refresh`] from the parent's cached path whenever the element
/// is renamed or reparented; [`crate::Model`] propagates the refresh through
/// the moved subtree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ElementPath {
    segments: Vec<String>,
    /// Whether the first segment is the root model's own name.
    rooted: bool,
}

impl ElementPath {
    /// Path of the root element itself.
    pub(crate) fn root(name: &str) -> Self {
        Self {
            segments: vec![name.to_string()],
            rooted: true,
        }
    }

    /// Recomputes this path from the parent's cached path and the current name.
    pub(crate) fn refresh(&mut self, parent: &ElementPath, name: &str) {
        self.segments.clear();
        self.segments.extend(parent.segments.iter().cloned());
        self.segments.push(name.to_string());
        self.rooted = parent.rooted;
    }

    /// Builds a detached path for lookups. Empty segments are dropped, so
    /// leading, trailing and doubled separators are tolerated.
    ///
    /// # Example
    /// ```rust
    /// use locmodel::path::ElementPath;
    /// let path = ElementPath::parse("/Errors/Network/Timeout", "/");
    /// assert_eq!(path.segments(), ["Errors", "Network", "Timeout"]);
    /// ```
    pub fn parse(path: &str, separator: &str) -> Self {
        let segments = if separator.is_empty() {
            vec![path.to_string()]
        } else {
            path.split(separator)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        };
        Self {
            segments,
            rooted: false,
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Segments below the root. Detached paths are returned whole.
    pub fn relative_segments(&self) -> &[String] {
        if self.rooted && !self.segments.is_empty() {
            &self.segments[1..]
        } else {
            &self.segments
        }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Name of the element this path points at.
    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Joins the names with `separator`, each segment prefixed by it.
    ///
    /// With `include_root == false` the root model's own name is dropped.
    /// Returns an empty string when nothing is left to join.
    pub fn parent_path(&self, separator: &str, include_root: bool) -> String {
        let segments = if include_root {
            &self.segments[..]
        } else {
            self.relative_segments()
        };
        segments
            .iter()
            .map(|segment| format!("{separator}{segment}"))
            .collect()
    }

    /// Independent snapshot that survives later edits of the source element.
    ///
    /// Without the root segment the snapshot is detached and can be resolved
    /// against any other tree's root.
    pub fn clone_path(&self, include_root: bool) -> Self {
        if include_root {
            self.clone()
        } else {
            Self {
                segments: self.relative_segments().to_vec(),
                rooted: false,
            }
        }
    }
}

impl Display for ElementPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.parent_path(DEFAULT_SEPARATOR, true))
    }
}
